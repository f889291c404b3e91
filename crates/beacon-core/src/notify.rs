//! 信标事件与通知接口
//!
//! 扫描服务在自己的任务中产生事件，通过 [`BeaconNotifier`] 投递。
//! UI 一般使用 [`ChannelNotifier`]，在主循环中统一取出处理。

use std::fmt;

use tokio::sync::mpsc;

use crate::beacon::{Beacon, Region};

/// 区域状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Outside = 0,
    Inside = 1,
}

impl RegionState {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionState::Outside => write!(f, "OUTSIDE"),
            RegionState::Inside => write!(f, "INSIDE"),
        }
    }
}

/// 区域进入/离开/状态确定
#[derive(Debug, Clone, PartialEq)]
pub enum RegionEvent {
    Entered(Region),
    Exited(Region),
    Determined { state: RegionState, region: Region },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeaconEvent {
    RegionTransition(RegionEvent),
    /// 一个测距周期内可见的信标，可能为空
    RangeBatch { beacons: Vec<Beacon>, region: Region },
}

/// 扫描事件回调
///
/// 在扫描任务上同步调用，实现不得阻塞。
pub trait BeaconNotifier: Send + Sync {
    fn on_region_event(&self, event: RegionEvent);
    fn on_range(&self, beacons: Vec<Beacon>, region: Region);

    fn deliver(&self, event: BeaconEvent) {
        match event {
            BeaconEvent::RegionTransition(e) => self.on_region_event(e),
            BeaconEvent::RangeBatch { beacons, region } => self.on_range(beacons, region),
        }
    }
}

/// 将事件转发到 mpsc 通道的通知器
///
/// 通道满时丢弃事件并记录警告，保证不阻塞扫描任务。
pub struct ChannelNotifier {
    tx: mpsc::Sender<BeaconEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BeaconEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn send(&self, event: BeaconEvent) {
        if let Err(e) = self.tx.try_send(event) {
            log::warn!("Dropping beacon event: {}", e);
        }
    }
}

impl BeaconNotifier for ChannelNotifier {
    fn on_region_event(&self, event: RegionEvent) {
        self.send(BeaconEvent::RegionTransition(event));
    }

    fn on_range(&self, beacons: Vec<Beacon>, region: Region) {
        self.send(BeaconEvent::RangeBatch { beacons, region });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes() {
        assert_eq!(RegionState::Outside.code(), 0);
        assert_eq!(RegionState::Inside.code(), 1);
    }

    #[test]
    fn test_channel_notifier_forwards_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new(8);
        let region = Region::any("iBeacon");

        notifier.on_region_event(RegionEvent::Entered(region.clone()));
        notifier.on_range(vec![], region.clone());

        assert_eq!(
            rx.try_recv().unwrap(),
            BeaconEvent::RegionTransition(RegionEvent::Entered(region.clone()))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BeaconEvent::RangeBatch {
                beacons: vec![],
                region
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (notifier, mut rx) = ChannelNotifier::new(1);
        let region = Region::any("iBeacon");

        notifier.on_range(vec![], region.clone());
        notifier.on_range(vec![], region.clone());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
