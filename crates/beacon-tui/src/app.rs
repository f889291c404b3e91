//! Application state

use std::time::{Duration, Instant};

use beacon_core::logging::{LogEntry, LogLevel};
use beacon_core::{
    BeaconEvent, BeaconService, Dispatcher, RowStyle, ScanSession, ScanState, StartOutcome,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;

/// 日志面板最多保留的条数
const MAX_LOGS: usize = 500;

/// 进入/离开区域提示的显示时长
const TOAST_DURATION: Duration = Duration::from_secs(2);

/// 发往 UI 循环的异步事件
#[derive(Debug, Clone)]
pub enum AppEvent {
    LogMessage { level: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Beacons,
    Log,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    expires_at: Instant,
}

pub struct App<S: BeaconService> {
    session: ScanSession<S>,
    dispatcher: Dispatcher,
    beacon_rx: mpsc::Receiver<BeaconEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
    pub tab: Tab,
    pub logs: Vec<LogEntry>,
    pub log_level: LogLevel,
    pub toast: Option<Toast>,
    pub show_perm_warning: bool,
    pub perm_message: String,
    pub list_state: ListState,
    /// 自动跟随最新一行
    pub follow: bool,
}

impl<S: BeaconService> App<S> {
    pub fn new(
        session: ScanSession<S>,
        beacon_rx: mpsc::Receiver<BeaconEvent>,
        event_rx: mpsc::Receiver<AppEvent>,
        style: RowStyle,
        log_level: LogLevel,
    ) -> Self {
        let mut app = Self {
            session,
            dispatcher: Dispatcher::new(style),
            beacon_rx,
            event_rx,
            tab: Tab::Beacons,
            logs: Vec::new(),
            log_level,
            toast: None,
            show_perm_warning: false,
            perm_message: String::new(),
            list_state: ListState::default(),
            follow: true,
        };
        app.add_log(LogLevel::Info, "iBeacon 扫描器启动");
        app.add_log(
            LogLevel::Info,
            "按 's' 开始扫描, 'x' 停止, 'r' 清空列表, 'q' 退出",
        );
        app
    }

    pub fn rows(&self) -> &[String] {
        self.dispatcher.list().rows()
    }

    pub fn row_style(&self) -> RowStyle {
        self.dispatcher.style()
    }

    pub fn session(&self) -> &ScanSession<S> {
        &self.session
    }

    pub fn state(&self) -> ScanState {
        self.session.state()
    }

    pub async fn start(&mut self) {
        match self.session.start().await {
            StartOutcome::Started => {
                self.add_log(LogLevel::Info, format!("开始扫描区域 {}", self.session.region()));
            }
            StartOutcome::PermissionDenied(status) => {
                if let Some(notice) = status.notice() {
                    self.perm_message = notice.to_string();
                    self.show_perm_warning = true;
                }
            }
            StartOutcome::Unavailable => {
                self.add_log(LogLevel::Error, "扫描服务不可用，详见日志");
            }
        }
    }

    pub fn stop(&mut self) {
        self.session.stop();
        self.add_log(LogLevel::Info, "停止扫描");
    }

    pub async fn resume(&mut self) {
        self.session.resume().await;
    }

    pub fn pause(&mut self) {
        self.session.pause();
    }

    pub fn destroy(&mut self) {
        self.session.destroy();
    }

    /// 清空信标列表
    pub fn reset(&mut self) {
        self.dispatcher.reset();
        self.list_state.select(None);
        self.follow = true;
    }

    pub fn dismiss_warning(&mut self) {
        self.show_perm_warning = false;
        self.perm_message.clear();
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Beacons => Tab::Log,
            Tab::Log => Tab::Beacons,
        };
    }

    pub fn previous_row(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        let current = self.list_state.selected().unwrap_or(len - 1);
        self.list_state.select(Some(current.saturating_sub(1)));
        self.follow = false;
    }

    pub fn next_row(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        let next = self.list_state.selected().map_or(len - 1, |i| i + 1);
        self.list_state.select(Some(next.min(len - 1)));
        self.follow = next + 1 >= len;
    }

    pub fn follow_latest(&mut self) {
        self.follow = true;
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn toggle_log_level(&mut self) {
        self.log_level = self.log_level.toggle_verbose();
        self.add_log(LogLevel::Info, format!("日志级别: {}", self.log_level));
    }

    /// 当前级别下可见的日志
    pub fn visible_logs(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| e.level <= self.log_level)
    }

    /// 处理异步事件，每次绘制前调用
    pub fn tick(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::LogMessage { level, message } => {
                    let level = level.parse().unwrap_or(LogLevel::Info);
                    self.add_log(level, message);
                }
            }
        }

        while let Ok(event) = self.beacon_rx.try_recv() {
            if let Some(message) = self.dispatcher.handle(event) {
                self.toast = Some(Toast {
                    message,
                    expires_at: Instant::now() + TOAST_DURATION,
                });
            }
        }

        if self
            .toast
            .as_ref()
            .is_some_and(|t| Instant::now() >= t.expires_at)
        {
            self.toast = None;
        }

        if self.follow && !self.rows().is_empty() {
            self.list_state.select(Some(self.rows().len() - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{
        AlwaysGranted, Beacon, BeaconLayout, BeaconNotifier, ChannelNotifier, Identifier,
        LifecycleBinding, Region, RegionEvent, SimulatedBeaconService,
    };
    use std::sync::Arc;

    fn app() -> (App<SimulatedBeaconService>, Arc<ChannelNotifier>) {
        let (notifier, beacon_rx) = ChannelNotifier::new(16);
        let notifier = Arc::new(notifier);
        let service =
            SimulatedBeaconService::new(Duration::from_millis(100), Duration::from_secs(5));
        let session = ScanSession::new(
            service,
            Box::new(AlwaysGranted),
            BeaconLayout::ibeacon(),
            Region::any("iBeacon"),
            LifecycleBinding::OnStart,
            notifier.clone(),
        );
        let (_event_tx, event_rx) = mpsc::channel(16);
        let app = App::new(
            session,
            beacon_rx,
            event_rx,
            RowStyle::Timestamped,
            LogLevel::Info,
        );
        (app, notifier)
    }

    fn beacon(minor: u16) -> Beacon {
        Beacon {
            identifiers: vec![
                Identifier::from_bytes([0x11; 16]),
                Identifier::from_u16(1),
                Identifier::from_u16(minor),
            ],
            rssi: -60,
            tx_power: -59,
            distance: 1.2,
            last_seen: 0,
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            company_id: 0x004c,
        }
    }

    #[test]
    fn test_tick_appends_rows_and_follows() {
        let (mut app, notifier) = app();
        notifier.on_range(vec![beacon(1), beacon(2)], Region::any("iBeacon"));
        app.tick();

        assert_eq!(app.rows().len(), 2);
        assert_eq!(app.list_state.selected(), Some(1));

        app.previous_row();
        assert!(!app.follow);
        notifier.on_range(vec![beacon(3)], Region::any("iBeacon"));
        app.tick();
        assert_eq!(app.list_state.selected(), Some(0));
    }

    #[test]
    fn test_region_event_shows_toast() {
        let (mut app, notifier) = app();
        notifier.on_region_event(RegionEvent::Entered(Region::any("iBeacon")));
        app.tick();
        assert_eq!(
            app.toast.as_ref().map(|t| t.message.as_str()),
            Some("Enter Region")
        );
    }

    #[test]
    fn test_reset_clears_rows() {
        let (mut app, notifier) = app();
        notifier.on_range(vec![beacon(1)], Region::any("iBeacon"));
        app.tick();
        app.reset();
        assert!(app.rows().is_empty());
        assert_eq!(app.list_state.selected(), None);
    }

    #[test]
    fn test_log_filter_and_cap() {
        let (mut app, _notifier) = app();
        app.clear_logs();
        app.add_log(LogLevel::Debug, "hidden");
        app.add_log(LogLevel::Warn, "shown");
        assert_eq!(app.visible_logs().count(), 1);

        app.toggle_log_level();
        assert_eq!(app.log_level, LogLevel::Debug);
        assert_eq!(app.visible_logs().count(), 3);

        for i in 0..MAX_LOGS + 10 {
            app.add_log(LogLevel::Info, format!("line {i}"));
        }
        assert_eq!(app.logs.len(), MAX_LOGS);
    }
}
