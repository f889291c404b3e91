pub mod ranging;
pub mod service;
pub mod simulated;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::beacon::{BeaconLayout, Region};
use crate::error::{BeaconError, Result};
use crate::notify::BeaconNotifier;

pub use ranging::{Advertisement, RangingEngine};
pub use service::BluerBeaconService;
pub use simulated::SimulatedBeaconService;

/// 默认前台扫描周期
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(1100);
/// 默认区域离开判定时间
pub const DEFAULT_EXIT_PERIOD: Duration = Duration::from_secs(10);

/// 信标扫描能力
///
/// 对应一个可绑定/解绑的扫描服务。未绑定时启动或停止监控/测距返回
/// [`BeaconError::NotBound`]。
#[async_trait::async_trait]
pub trait BeaconService: Send {
    /// 注册广播布局，必须在 `bind` 之前调用
    fn configure(&mut self, layout: BeaconLayout);

    /// 绑定扫描服务，已绑定时直接返回
    async fn bind(&mut self) -> Result<()>;

    /// 解绑并清空所有区域
    fn unbind(&mut self);

    fn is_bound(&self) -> bool;

    fn start_monitoring(&mut self, region: &Region) -> Result<()>;
    fn stop_monitoring(&mut self, region: &Region) -> Result<()>;
    fn start_ranging(&mut self, region: &Region) -> Result<()>;
    fn stop_ranging(&mut self, region: &Region) -> Result<()>;

    /// 设置事件接收者，替换之前的接收者
    fn subscribe(&mut self, notifier: Arc<dyn BeaconNotifier>);
}

/// 扫描任务与控制调用之间共享的状态
pub(crate) struct Shared {
    engine: Mutex<RangingEngine>,
    notifier: Mutex<Option<Arc<dyn BeaconNotifier>>>,
}

impl Shared {
    fn new(exit_period: Duration) -> Self {
        Self {
            engine: Mutex::new(RangingEngine::new(exit_period)),
            notifier: Mutex::new(None),
        }
    }

    fn engine(&self) -> MutexGuard<'_, RangingEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.engine().is_active()
    }

    pub(crate) fn observe(&self, adv: &Advertisement) {
        self.engine().observe(adv);
    }

    /// 结束周期并投递事件（投递时不持有引擎锁）
    pub(crate) fn end_cycle(&self, now: i64) {
        let events = self.engine().end_cycle(now);
        let notifier = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(notifier) = notifier {
            for event in events {
                notifier.deliver(event);
            }
        }
    }
}

/// 两种后端共用的绑定/区域管理
pub(crate) struct ServiceCore {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ServiceCore {
    pub(crate) fn new(exit_period: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::new(exit_period)),
            task: None,
        }
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    pub(crate) fn configure(&mut self, layout: BeaconLayout) {
        self.shared.engine().add_layout(layout);
    }

    pub(crate) fn has_layouts(&self) -> bool {
        !self.shared.engine().layouts().is_empty()
    }

    pub(crate) fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub(crate) fn unbind(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.engine().clear_regions();
    }

    fn ensure_bound(&self) -> Result<()> {
        if self.is_bound() {
            Ok(())
        } else {
            Err(BeaconError::NotBound)
        }
    }

    pub(crate) fn start_monitoring(&mut self, region: &Region) -> Result<()> {
        self.ensure_bound()?;
        self.shared.engine().start_monitoring(region.clone());
        Ok(())
    }

    pub(crate) fn stop_monitoring(&mut self, region: &Region) -> Result<()> {
        self.ensure_bound()?;
        self.shared.engine().stop_monitoring(region)
    }

    pub(crate) fn start_ranging(&mut self, region: &Region) -> Result<()> {
        self.ensure_bound()?;
        self.shared.engine().start_ranging(region.clone());
        Ok(())
    }

    pub(crate) fn stop_ranging(&mut self, region: &Region) -> Result<()> {
        self.ensure_bound()?;
        self.shared.engine().stop_ranging(region)
    }

    pub(crate) fn subscribe(&mut self, notifier: Arc<dyn BeaconNotifier>) {
        *self
            .shared
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(notifier);
    }
}

impl Drop for ServiceCore {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 从某个时间点开始、按固定周期触发的定时器（不立即触发第一次）
pub(crate) fn cycle_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer
}
