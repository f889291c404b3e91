//! TUI 日志层
//!
//! 自定义 tracing Layer，将日志转发到 TUI 的日志面板。
//! `log` crate 的记录经 tracing-log 桥接后，使用还原后的元数据（真实目标模块）。

use crate::app::AppEvent;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

pub struct TuiLogLayer {
    tx: mpsc::Sender<AppEvent>,
}

impl TuiLogLayer {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for TuiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        let level = metadata.level().to_string();

        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        if message.is_empty() {
            message = metadata.target().to_string();
        }

        // 只标注扫描服务内部的模块，例如 [ble::ranging]
        if let Some(module) = metadata.target().strip_prefix("beacon_core::") {
            message = format!("[{}] {}", module, message);
        }

        // 面板来不及消费时直接丢弃
        let _ = self.tx.try_send(AppEvent::LogMessage { level, message });
    }
}

/// 只提取 message 字段，忽略 tracing-log 附加的 log.* 字段
struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.0 = value.to_string();
        }
    }
}
