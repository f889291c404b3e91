//! 扫描权限检查
//!
//! 开始扫描前先确认当前用户能访问蓝牙适配器。

use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    /// 本次不可用，用户可以自行处理后重试
    Denied,
    /// 需要到系统设置中授权
    DeniedPermanently,
}

impl PermissionStatus {
    /// 拒绝时显示给用户的提示
    pub fn notice(self) -> Option<&'static str> {
        match self {
            PermissionStatus::Granted => None,
            PermissionStatus::Denied => Some("蓝牙不可用：无法访问适配器"),
            PermissionStatus::DeniedPermanently => {
                Some("没有蓝牙访问权限，请在系统设置中授权（例如将当前用户加入 bluetooth 组）")
            }
        }
    }
}

#[async_trait::async_trait]
pub trait PermissionCheck: Send + Sync {
    async fn request(&self) -> PermissionStatus;
}

/// 模拟模式使用
pub struct AlwaysGranted;

#[async_trait::async_trait]
impl PermissionCheck for AlwaysGranted {
    async fn request(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

/// 通过 BlueZ 检查默认适配器是否可访问
pub struct BluezPermission;

#[async_trait::async_trait]
impl PermissionCheck for BluezPermission {
    async fn request(&self) -> PermissionStatus {
        let session = match bluer::Session::new().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Cannot open BlueZ session: {}", e);
                return PermissionStatus::DeniedPermanently;
            }
        };
        let adapter = match session.default_adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("No usable Bluetooth adapter: {}", e);
                return classify(&e);
            }
        };

        match adapter.is_powered().await {
            Ok(powered) => {
                debug!(
                    "Adapter '{}' is accessible (powered: {})",
                    adapter.name(),
                    powered
                );
                power_status(powered)
            }
            Err(e) => {
                warn!("Cannot query adapter '{}': {}", adapter.name(), e);
                classify(&e)
            }
        }
    }
}

/// 适配器可访问即视为授权；未开启时由服务绑定时打开电源
fn power_status(powered: bool) -> PermissionStatus {
    if !powered {
        debug!("Adapter is powered off, it will be powered on when the service binds");
    }
    PermissionStatus::Granted
}

fn classify(e: &bluer::Error) -> PermissionStatus {
    match e.kind {
        bluer::ErrorKind::NotAuthorized | bluer::ErrorKind::NotPermitted => {
            PermissionStatus::DeniedPermanently
        }
        _ => PermissionStatus::Denied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices() {
        assert!(PermissionStatus::Granted.notice().is_none());
        assert!(PermissionStatus::Denied.notice().is_some());
        assert!(
            PermissionStatus::DeniedPermanently
                .notice()
                .unwrap()
                .contains("系统设置")
        );
    }

    #[test]
    fn test_powered_off_adapter_is_granted() {
        assert_eq!(power_status(true), PermissionStatus::Granted);
        assert_eq!(power_status(false), PermissionStatus::Granted);
    }

    #[test]
    fn test_classify_errors() {
        let error = |kind| bluer::Error {
            kind,
            message: String::new(),
        };
        assert_eq!(
            classify(&error(bluer::ErrorKind::NotAuthorized)),
            PermissionStatus::DeniedPermanently
        );
        assert_eq!(
            classify(&error(bluer::ErrorKind::NotPermitted)),
            PermissionStatus::DeniedPermanently
        );
        assert_eq!(
            classify(&error(bluer::ErrorKind::NotReady)),
            PermissionStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_always_granted() {
        assert_eq!(AlwaysGranted.request().await, PermissionStatus::Granted);
    }
}
