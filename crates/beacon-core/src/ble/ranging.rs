//! 测距引擎
//!
//! 与蓝牙后端无关的纯逻辑部分：按布局解析广播、在一个周期内聚合同一信标的多次检测、
//! 周期结束时生成测距批次和区域进出事件。时间由调用方传入，便于测试。

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, trace};

use crate::beacon::{Beacon, BeaconLayout, Identifier, ParsedBeacon, Region, estimate_distance};
use crate::error::{BeaconError, Result};
use crate::notify::{BeaconEvent, RegionEvent, RegionState};

/// 一条原始的厂商自定义广播
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub company_id: u16,
    /// 不含厂商 ID 的载荷
    pub data: Vec<u8>,
    pub rssi: i16,
    /// epoch ms
    pub timestamp: i64,
}

struct CycleEntry {
    parsed: ParsedBeacon,
    address: String,
    rssi_sum: i64,
    samples: i64,
    last_seen: i64,
    order: usize,
}

impl CycleEntry {
    fn to_beacon(&self) -> Beacon {
        let rssi = (self.rssi_sum as f64 / self.samples as f64).round() as i32;
        let tx_power = self.parsed.tx_power.map_or(0, i32::from);
        Beacon {
            identifiers: self.parsed.identifiers.clone(),
            rssi,
            tx_power,
            distance: estimate_distance(tx_power, f64::from(rssi)),
            last_seen: self.last_seen,
            address: self.address.clone(),
            company_id: self.parsed.company_id,
        }
    }
}

#[derive(Default)]
struct MonitorState {
    state: Option<RegionState>,
    /// 开始监控后的第一个周期结束时间
    since: Option<i64>,
    last_match: Option<i64>,
}

pub struct RangingEngine {
    layouts: Vec<BeaconLayout>,
    monitored: Vec<(Region, MonitorState)>,
    ranged: Vec<Region>,
    cycle: HashMap<(Vec<Identifier>, String), CycleEntry>,
    exit_period_ms: i64,
}

impl RangingEngine {
    pub fn new(exit_period: Duration) -> Self {
        Self {
            layouts: Vec::new(),
            monitored: Vec::new(),
            ranged: Vec::new(),
            cycle: HashMap::new(),
            exit_period_ms: i64::try_from(exit_period.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn add_layout(&mut self, layout: BeaconLayout) {
        if !self.layouts.contains(&layout) {
            debug!("Registered beacon layout: {}", layout);
            self.layouts.push(layout);
        }
    }

    pub fn layouts(&self) -> &[BeaconLayout] {
        &self.layouts
    }

    /// 开始监控
    ///
    /// 同一区域重复调用保留已有的进出状态；同名但条件不同的区域会替换旧区域并重置状态。
    pub fn start_monitoring(&mut self, region: Region) {
        if self.monitored.iter().any(|(r, _)| *r == region) {
            debug!("Region {} already monitored", region.unique_id());
            return;
        }
        self.monitored
            .retain(|(r, _)| r.unique_id() != region.unique_id());
        self.monitored.push((region, MonitorState::default()));
    }

    pub fn stop_monitoring(&mut self, region: &Region) -> Result<()> {
        let before = self.monitored.len();
        self.monitored
            .retain(|(r, _)| r.unique_id() != region.unique_id());
        if self.monitored.len() == before {
            return Err(BeaconError::RegionNotActive(region.unique_id().to_string()));
        }
        Ok(())
    }

    pub fn start_ranging(&mut self, region: Region) {
        self.ranged.retain(|r| r.unique_id() != region.unique_id());
        self.ranged.push(region);
    }

    pub fn stop_ranging(&mut self, region: &Region) -> Result<()> {
        let before = self.ranged.len();
        self.ranged.retain(|r| r.unique_id() != region.unique_id());
        if self.ranged.len() == before {
            return Err(BeaconError::RegionNotActive(region.unique_id().to_string()));
        }
        Ok(())
    }

    /// 停止所有区域并丢弃当前周期（布局保留）
    pub fn clear_regions(&mut self) {
        self.monitored.clear();
        self.ranged.clear();
        self.cycle.clear();
    }

    /// 是否有任何活动区域（无活动区域时扫描任务可以跳过广播解析）
    pub fn is_active(&self) -> bool {
        !self.monitored.is_empty() || !self.ranged.is_empty()
    }

    /// 记录一条广播，返回是否被某个布局识别
    pub fn observe(&mut self, adv: &Advertisement) -> bool {
        let Some(parsed) = self
            .layouts
            .iter()
            .find_map(|l| l.parse_advertisement(adv.company_id, &adv.data))
        else {
            return false;
        };

        trace!(
            "Beacon advertisement from {}: {:?} rssi={}",
            adv.address, parsed.identifiers, adv.rssi
        );

        let next_order = self.cycle.len();
        let entry = self
            .cycle
            .entry((parsed.identifiers.clone(), adv.address.clone()))
            .or_insert_with(|| CycleEntry {
                parsed,
                address: adv.address.clone(),
                rssi_sum: 0,
                samples: 0,
                last_seen: adv.timestamp,
                order: next_order,
            });
        entry.rssi_sum += i64::from(adv.rssi);
        entry.samples += 1;
        entry.last_seen = entry.last_seen.max(adv.timestamp);
        true
    }

    /// 结束当前周期并生成事件
    ///
    /// 区域事件在前，测距批次在后；每个测距区域每周期都会产生一个批次（可能为空）。
    pub fn end_cycle(&mut self, now: i64) -> Vec<BeaconEvent> {
        let mut entries: Vec<&CycleEntry> = self.cycle.values().collect();
        entries.sort_by_key(|e| e.order);
        let beacons: Vec<Beacon> = entries.into_iter().map(CycleEntry::to_beacon).collect();

        let mut events = Vec::new();

        for (region, monitor) in &mut self.monitored {
            let since = *monitor.since.get_or_insert(now);
            let latest = beacons
                .iter()
                .filter(|b| region.matches(b))
                .map(|b| b.last_seen)
                .max();

            if let Some(seen) = latest {
                monitor.last_match = Some(seen.max(monitor.last_match.unwrap_or(seen)));
                if monitor.state != Some(RegionState::Inside) {
                    monitor.state = Some(RegionState::Inside);
                    events.push(BeaconEvent::RegionTransition(RegionEvent::Entered(
                        region.clone(),
                    )));
                    events.push(BeaconEvent::RegionTransition(RegionEvent::Determined {
                        state: RegionState::Inside,
                        region: region.clone(),
                    }));
                }
                continue;
            }

            let quiet_since = monitor.last_match.unwrap_or(since);
            if now - quiet_since < self.exit_period_ms {
                continue;
            }
            match monitor.state {
                Some(RegionState::Inside) => {
                    events.push(BeaconEvent::RegionTransition(RegionEvent::Exited(
                        region.clone(),
                    )));
                }
                Some(RegionState::Outside) => continue,
                None => {}
            }
            monitor.state = Some(RegionState::Outside);
            events.push(BeaconEvent::RegionTransition(RegionEvent::Determined {
                state: RegionState::Outside,
                region: region.clone(),
            }));
        }

        for region in &self.ranged {
            events.push(BeaconEvent::RangeBatch {
                beacons: beacons.iter().filter(|b| region.matches(b)).cloned().collect(),
                region: region.clone(),
            });
        }

        self.cycle.clear();
        events
    }
}
