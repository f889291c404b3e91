//! 应用配置和持久化
//!
//! 提供目标区域、信标布局、扫描周期等设置的存储和读取。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::beacon::{BeaconLayout, IBEACON_LAYOUT, Identifier, Region};
use crate::ble::{DEFAULT_EXIT_PERIOD, DEFAULT_SCAN_PERIOD};
use crate::display::RowStyle;
use crate::error::BeaconError;
use crate::session::LifecycleBinding;

/// 区域设置
///
/// 未设置的标识符表示不限制。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    pub unique_id: String,
    pub uuid: Option<String>,
    pub major: Option<String>,
    pub minor: Option<String>,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            unique_id: "iBeacon".to_string(),
            uuid: None,
            major: None,
            minor: None,
        }
    }
}

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 监控/测距的区域
    pub region: RegionSettings,
    /// 信标布局描述
    pub beacon_layout: String,
    /// 扫描周期（毫秒）
    pub scan_period_ms: u64,
    /// 多久未检测到信标视为离开区域（毫秒）
    pub region_exit_period_ms: u64,
    /// 列表行格式
    pub row_style: RowStyle,
    /// 绑定时机
    pub lifecycle: LifecycleBinding,
    /// 详细日志模式
    pub verbose: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            region: RegionSettings::default(),
            beacon_layout: IBEACON_LAYOUT.to_string(),
            scan_period_ms: DEFAULT_SCAN_PERIOD.as_millis() as u64,
            region_exit_period_ms: DEFAULT_EXIT_PERIOD.as_millis() as u64,
            row_style: RowStyle::default(),
            lifecycle: LifecycleBinding::default(),
            verbose: false,
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("beacon-handson");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 构造目标区域
    pub fn region(&self) -> Result<Region, BeaconError> {
        let parse = |s: &Option<String>| s.as_deref().map(Identifier::parse).transpose();
        Ok(Region::new(
            self.region.unique_id.clone(),
            parse(&self.region.uuid)?,
            parse(&self.region.major)?,
            parse(&self.region.minor)?,
        ))
    }

    pub fn layout(&self) -> Result<BeaconLayout, BeaconError> {
        Ok(BeaconLayout::parse(&self.beacon_layout)?)
    }

    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_period_ms.max(100))
    }

    pub fn region_exit_period(&self) -> Duration {
        Duration::from_millis(self.region_exit_period_ms)
    }
}
