//! 扫描会话生命周期
//!
//! ```text
//! Unbound ──start/resume──▶ BoundIdle ──start──▶ BoundScanning
//!    ▲                          │   ▲                 │
//!    └──────destroy/pause───────┘   └──────stop───────┘
//! ```
//!
//! 绑定时机由 [`LifecycleBinding`] 决定：
//! - `OnStart`: start 时绑定，destroy 时解绑
//! - `OnResume`: resume 时绑定，pause 时解绑，start 只负责开启监控/测距

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::beacon::{BeaconLayout, Region};
use crate::ble::BeaconService;
use crate::notify::BeaconNotifier;
use crate::permission::{PermissionCheck, PermissionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unbound,
    BoundIdle,
    BoundScanning,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Unbound => write!(f, "unbound"),
            ScanState::BoundIdle => write!(f, "idle"),
            ScanState::BoundScanning => write!(f, "scanning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleBinding {
    #[default]
    OnStart,
    OnResume,
}

/// start 请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    PermissionDenied(PermissionStatus),
    /// 服务未绑定或无法绑定（已记录日志）
    Unavailable,
}

pub struct ScanSession<S: BeaconService> {
    service: S,
    permission: Box<dyn PermissionCheck>,
    region: Region,
    binding: LifecycleBinding,
    scanning: bool,
}

impl<S: BeaconService> ScanSession<S> {
    pub fn new(
        mut service: S,
        permission: Box<dyn PermissionCheck>,
        layout: BeaconLayout,
        region: Region,
        binding: LifecycleBinding,
        notifier: Arc<dyn BeaconNotifier>,
    ) -> Self {
        service.configure(layout);
        service.subscribe(notifier);
        Self {
            service,
            permission,
            region,
            binding,
            scanning: false,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn state(&self) -> ScanState {
        match (self.service.is_bound(), self.scanning) {
            (false, _) => ScanState::Unbound,
            (true, false) => ScanState::BoundIdle,
            (true, true) => ScanState::BoundScanning,
        }
    }

    /// 开始扫描
    ///
    /// 先检查权限；`OnStart` 模式下未绑定时先绑定。监控/测距启动失败只记录日志。
    pub async fn start(&mut self) -> StartOutcome {
        let status = self.permission.request().await;
        if status != PermissionStatus::Granted {
            warn!("Scan permission not granted: {:?}", status);
            return StartOutcome::PermissionDenied(status);
        }

        if self.binding == LifecycleBinding::OnStart && !self.bind().await {
            return StartOutcome::Unavailable;
        }
        if !self.service.is_bound() {
            error!("Cannot start scanning: beacon service is not bound");
            return StartOutcome::Unavailable;
        }

        let monitoring = self.service.start_monitoring(&self.region);
        if let Err(e) = &monitoring {
            error!("Failed to start monitoring {}: {}", self.region, e);
        }
        let ranging = self.service.start_ranging(&self.region);
        if let Err(e) = &ranging {
            error!("Failed to start ranging {}: {}", self.region, e);
        }

        self.scanning = monitoring.is_ok() && ranging.is_ok();
        if self.scanning {
            info!("Scanning region {}", self.region);
        }
        StartOutcome::Started
    }

    /// 停止监控和测距，不解绑；失败只记录日志
    pub fn stop(&mut self) {
        if let Err(e) = self.service.stop_monitoring(&self.region) {
            error!("Failed to stop monitoring {}: {}", self.region, e);
        }
        if let Err(e) = self.service.stop_ranging(&self.region) {
            error!("Failed to stop ranging {}: {}", self.region, e);
        }
        if self.scanning {
            info!("Stopped scanning region {}", self.region.unique_id());
        }
        self.scanning = false;
    }

    pub async fn resume(&mut self) {
        if self.binding == LifecycleBinding::OnResume {
            self.bind().await;
        }
    }

    pub fn pause(&mut self) {
        if self.binding == LifecycleBinding::OnResume {
            self.teardown();
        }
    }

    pub fn destroy(&mut self) {
        self.teardown();
    }

    async fn bind(&mut self) -> bool {
        if self.service.is_bound() {
            debug!("Already bound, skipping bind");
            return true;
        }
        match self.service.bind().await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to bind beacon service: {}", e);
                false
            }
        }
    }

    fn teardown(&mut self) {
        self.service.unbind();
        self.scanning = false;
    }
}
