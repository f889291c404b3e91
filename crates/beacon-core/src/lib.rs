//! Beacon Core Library
//!
//! iBeacon 扫描的核心实现库
//!
//! # 模块
//!
//! - **beacon**: 标识符、区域、布局解析、距离估算
//! - **ble**: 扫描服务接口、测距引擎、BlueZ 与模拟后端
//! - **notify**: 区域事件 / 测距批次及其通知接口
//! - **display**: 事件分发与行文本格式化
//! - **session**: 扫描会话生命周期与权限检查
//!
//! # 使用示例
//!
//! ```ignore
//! use beacon_core::{AppSettings, BluerBeaconService, BluezPermission, ChannelNotifier, Dispatcher, ScanSession};
//!
//! let settings = AppSettings::load();
//! let (notifier, mut events) = ChannelNotifier::new(64);
//! let service = BluerBeaconService::new(settings.scan_period(), settings.region_exit_period());
//! let mut session = ScanSession::new(
//!     service,
//!     Box::new(BluezPermission),
//!     settings.layout()?,
//!     settings.region()?,
//!     settings.lifecycle,
//!     Arc::new(notifier),
//! );
//!
//! session.start().await;
//! let mut dispatcher = Dispatcher::new(settings.row_style);
//! while let Some(event) = events.recv().await {
//!     dispatcher.handle(event);
//! }
//! ```

pub mod beacon;
pub mod ble;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod notify;
pub mod permission;
pub mod session;

// Beacon re-exports
pub use beacon::{Beacon, BeaconLayout, IBEACON_LAYOUT, Identifier, Region};

// BLE re-exports
pub use ble::{Advertisement, BeaconService, BluerBeaconService, RangingEngine, SimulatedBeaconService};

pub use config::AppSettings;
pub use display::{BeaconList, Dispatcher, RowStyle, format_beacon, format_timestamp};
pub use error::BeaconError;
pub use notify::{BeaconEvent, BeaconNotifier, ChannelNotifier, RegionEvent, RegionState};
pub use permission::{AlwaysGranted, BluezPermission, PermissionCheck, PermissionStatus};
pub use session::{LifecycleBinding, ScanSession, ScanState, StartOutcome};
