//! 日志模块
//!
//! 提供跨 UI 的统一日志级别和条目定义。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 日志级别
///
/// 实现了 `PartialOrd` 以便过滤。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// 获取对应的 Emoji 图标
    pub fn icon(&self) -> &'static str {
        match self {
            LogLevel::Error => "❌",
            LogLevel::Warn => "⚠️",
            LogLevel::Info => "ℹ️",
            LogLevel::Debug => "🔍",
            LogLevel::Trace => "📝",
        }
    }

    /// 获取显示名称
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// 在 Info 和 Debug 之间切换（用于 UI 的详细模式开关）
    #[must_use]
    pub fn toggle_verbose(self) -> Self {
        if self >= LogLevel::Debug {
            LogLevel::Info
        } else {
            LogLevel::Debug
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // 未知级别宽容处理为 Info
        match s.to_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" => Ok(LogLevel::Warn),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Ok(LogLevel::Info),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 全局日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// epoch ms
    pub timestamp: i64,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing_and_order() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("bogus".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert!(LogLevel::Error < LogLevel::Debug);
    }

    #[test]
    fn test_toggle_verbose() {
        assert_eq!(LogLevel::Info.toggle_verbose(), LogLevel::Debug);
        assert_eq!(LogLevel::Debug.toggle_verbose(), LogLevel::Info);
        assert_eq!(LogLevel::Trace.toggle_verbose(), LogLevel::Info);
    }
}
