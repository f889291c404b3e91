//! Beacon TUI - 交互式 iBeacon 扫描界面
//!
//! 使用 ratatui 实时显示测距到的信标以及进入/离开区域提示。
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p beacon-tui 2>> /tmp/beacon.log
//! ```
//!
//! 没有蓝牙硬件时可使用 `--simulate` 运行内置的模拟信标。

mod app;
mod tui_log;
mod ui;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_core::logging::LogLevel;
use beacon_core::{
    AlwaysGranted, AppSettings, BeaconService, BluerBeaconService, BluezPermission,
    ChannelNotifier, PermissionCheck, ScanSession, SimulatedBeaconService,
};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, AppEvent, Tab};
use tui_log::TuiLogLayer;

#[derive(Parser)]
#[command(name = "beacon-tui", about = "iBeacon 扫描终端界面")]
struct Args {
    /// 使用模拟信标代替蓝牙适配器
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = AppSettings::load();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (event_tx, event_rx) = mpsc::channel(1000);
    init_logging(event_tx, settings.verbose);

    let res = if args.simulate {
        let service =
            SimulatedBeaconService::new(settings.scan_period(), settings.region_exit_period());
        run(&mut terminal, service, Box::new(AlwaysGranted), &settings, event_rx).await
    } else {
        let service =
            BluerBeaconService::new(settings.scan_period(), settings.region_exit_period());
        run(&mut terminal, service, Box::new(BluezPermission), &settings, event_rx).await
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: mpsc::Sender<AppEvent>, verbose: bool) {
    // 桥接 log crate（beacon-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);

    // 面板自己按级别过滤，这里保留 debug 以便运行时切换
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,bluer=info")
        } else {
            EnvFilter::new("info,beacon_core=debug")
        }
    });

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run<S: BeaconService, B: Backend>(
    terminal: &mut Terminal<B>,
    service: S,
    permission: Box<dyn PermissionCheck>,
    settings: &AppSettings,
    event_rx: mpsc::Receiver<AppEvent>,
) -> Result<()> {
    let (notifier, beacon_rx) = ChannelNotifier::new(256);
    let session = ScanSession::new(
        service,
        permission,
        settings.layout()?,
        settings.region()?,
        settings.lifecycle,
        Arc::new(notifier),
    );

    let log_level = if settings.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let mut app = App::new(session, beacon_rx, event_rx, settings.row_style, log_level);

    app.resume().await;
    let res = run_app(terminal, &mut app).await;
    app.destroy();
    res
}

async fn run_app<S: BeaconService, B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> Result<()> {
    loop {
        // Update app state (handle async events)
        app.tick();
        terminal.draw(|f| ui::draw(f, app))?;

        // 使用 poll 避免阻塞扫描事件的显示
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                // 如果正在显示权限警告弹窗，拦截所有按键以关闭它
                if app.show_perm_warning {
                    app.dismiss_warning();
                    continue;
                }

                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('s') => app.start().await,
                    KeyCode::Char('x') => app.stop(),
                    KeyCode::Char('r') => app.reset(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous_row(),
                    KeyCode::Down | KeyCode::Char('j') => app.next_row(),
                    KeyCode::End | KeyCode::Char('G') => app.follow_latest(),
                    KeyCode::Tab => app.next_tab(),
                    KeyCode::Char('1') => app.tab = Tab::Beacons,
                    KeyCode::Char('2') => app.tab = Tab::Log,
                    KeyCode::Char('d') => app.toggle_log_level(),
                    KeyCode::Char('c') => app.clear_logs(),
                    _ => {}
                }
            }
            Event::FocusLost => app.pause(),
            Event::FocusGained => app.resume().await,
            _ => {}
        }
    }
}
