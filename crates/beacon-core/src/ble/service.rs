//! BlueZ 扫描服务
//!
//! 使用 bluer (BlueZ D-Bus) 进行 LE 扫描。绑定后启动后台任务：
//! - 持续读取 `discover_devices_with_changes()` 上报的设备变化
//! - 读取厂商数据和 RSSI 交给测距引擎
//! - 每个扫描周期结束时投递事件

use std::sync::Arc;
use std::time::Duration;

use bluer::{AdapterEvent, DiscoveryFilter, DiscoveryTransport};
use futures_util::StreamExt;
use log::{debug, error, info, trace};

use super::{Advertisement, BeaconService, ServiceCore, Shared, cycle_timer, now_millis};
use crate::beacon::{BeaconLayout, Region};
use crate::error::Result;
use crate::notify::BeaconNotifier;

pub struct BluerBeaconService {
    core: ServiceCore,
    scan_period: Duration,
}

impl BluerBeaconService {
    pub fn new(scan_period: Duration, exit_period: Duration) -> Self {
        Self {
            core: ServiceCore::new(exit_period),
            scan_period,
        }
    }
}

#[async_trait::async_trait]
impl BeaconService for BluerBeaconService {
    fn configure(&mut self, layout: BeaconLayout) {
        self.core.configure(layout);
    }

    async fn bind(&mut self) -> Result<()> {
        if self.core.is_bound() {
            debug!("Beacon service already bound");
            return Ok(());
        }
        if !self.core.has_layouts() {
            log::warn!("Binding without any beacon layout; no advertisement will be recognised");
        }

        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        debug!("Powering on adapter '{}' for beacon scan", adapter.name());
        adapter.set_powered(true).await?;
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..Default::default()
            })
            .await?;

        let shared = self.core.shared();
        let period = self.scan_period;
        let task = tokio::spawn(async move {
            // session 必须在扫描期间保持存活
            let _session = session;
            if let Err(e) = run_scan(&adapter, &shared, period).await {
                error!("Beacon scan task failed: {}", e);
            }
        });
        self.core.attach(task);

        info!(
            "Beacon service bound (scan period {} ms)",
            self.scan_period.as_millis()
        );
        Ok(())
    }

    fn unbind(&mut self) {
        if self.core.is_bound() {
            info!("Beacon service unbound");
        }
        self.core.unbind();
    }

    fn is_bound(&self) -> bool {
        self.core.is_bound()
    }

    fn start_monitoring(&mut self, region: &Region) -> Result<()> {
        self.core.start_monitoring(region)
    }

    fn stop_monitoring(&mut self, region: &Region) -> Result<()> {
        self.core.stop_monitoring(region)
    }

    fn start_ranging(&mut self, region: &Region) -> Result<()> {
        self.core.start_ranging(region)
    }

    fn stop_ranging(&mut self, region: &Region) -> Result<()> {
        self.core.stop_ranging(region)
    }

    fn subscribe(&mut self, notifier: Arc<dyn BeaconNotifier>) {
        self.core.subscribe(notifier);
    }
}

async fn run_scan(adapter: &bluer::Adapter, shared: &Shared, period: Duration) -> bluer::Result<()> {
    let events = adapter.discover_devices_with_changes().await?;
    tokio::pin!(events);
    let mut cycle = cycle_timer(period);

    info!("Starting LE discovery on '{}'", adapter.name());

    loop {
        tokio::select! {
            _ = cycle.tick() => {
                shared.end_cycle(now_millis());
            }
            event = events.next() => {
                match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        if !shared.is_active() {
                            continue;
                        }
                        let device = adapter.device(addr)?;
                        match read_advertisements(&device).await {
                            Ok(advs) => {
                                for adv in &advs {
                                    shared.observe(adv);
                                }
                            }
                            Err(e) => trace!("Skipping device {}: {}", addr, e),
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    debug!("Discovery stream ended");
    Ok(())
}

/// 读取设备当前的所有厂商数据；没有 RSSI（缓存设备）时返回空
async fn read_advertisements(device: &bluer::Device) -> bluer::Result<Vec<Advertisement>> {
    let Some(rssi) = device.rssi().await? else {
        return Ok(Vec::new());
    };
    let manufacturer_data = device.manufacturer_data().await?.unwrap_or_default();
    let address = device.address().to_string();
    let timestamp = now_millis();

    Ok(manufacturer_data
        .into_iter()
        .map(|(company_id, data)| Advertisement {
            address: address.clone(),
            company_id,
            data,
            rssi,
            timestamp,
        })
        .collect())
}
