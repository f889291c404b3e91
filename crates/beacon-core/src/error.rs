//! 错误类型
//!
//! 库内统一使用 [`BeaconError`]，二进制程序侧使用 `anyhow` 包装。

use crate::beacon::layout::LayoutError;

/// 信标服务错误
#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    /// 服务尚未绑定（对应远程调用失败）
    #[error("Beacon service is not bound; call bind() first")]
    NotBound,

    #[error("Region '{0}' is not being monitored or ranged")]
    RegionNotActive(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid beacon layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
