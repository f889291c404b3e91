//! 模拟扫描服务
//!
//! 没有蓝牙硬件时用于演示和调试：按周期生成若干 iBeacon 广播，RSSI 随机抖动，
//! 其中一个信标周期性消失以触发区域进出事件。

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;

use super::{Advertisement, BeaconService, ServiceCore, Shared, cycle_timer, now_millis};
use crate::beacon::{BeaconLayout, Region};
use crate::error::Result;
use crate::notify::BeaconNotifier;

/// 模拟信标的 proximity UUID
pub const SIMULATED_UUID: [u8; 16] = [
    0x48, 0x53, 0x4f, 0x4e, 0x2d, 0x42, 0x45, 0x41, 0x43, 0x4f, 0x4e, 0x2d, 0x44, 0x45, 0x4d, 0x4f,
];

/// 每个周期内每个信标广播的次数
const SAMPLES_PER_CYCLE: u32 = 4;

#[derive(Debug, Clone)]
struct FakeBeacon {
    address: &'static str,
    major: u16,
    minor: u16,
    base_rssi: i16,
    tx_power: i8,
    /// 每 N 个周期切换一次可见性，0 表示总是可见
    blink_cycles: u32,
}

impl FakeBeacon {
    fn visible(&self, cycle: u32) -> bool {
        self.blink_cycles == 0 || (cycle / self.blink_cycles) % 2 == 0
    }

    fn payload(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(23);
        data.extend_from_slice(&[0x02, 0x15]);
        data.extend_from_slice(&SIMULATED_UUID);
        data.extend_from_slice(&self.major.to_be_bytes());
        data.extend_from_slice(&self.minor.to_be_bytes());
        data.extend_from_slice(&self.tx_power.to_be_bytes());
        data
    }
}

fn fake_beacons() -> Vec<FakeBeacon> {
    vec![
        FakeBeacon {
            address: "AA:BB:CC:DD:EE:01",
            major: 1,
            minor: 1,
            base_rssi: -52,
            tx_power: -59,
            blink_cycles: 0,
        },
        FakeBeacon {
            address: "AA:BB:CC:DD:EE:02",
            major: 1,
            minor: 2,
            base_rssi: -68,
            tx_power: -59,
            blink_cycles: 0,
        },
        FakeBeacon {
            address: "AA:BB:CC:DD:EE:03",
            major: 2,
            minor: 1,
            base_rssi: -81,
            tx_power: -65,
            blink_cycles: 20,
        },
    ]
}

pub struct SimulatedBeaconService {
    core: ServiceCore,
    scan_period: Duration,
}

impl SimulatedBeaconService {
    pub fn new(scan_period: Duration, exit_period: Duration) -> Self {
        Self {
            core: ServiceCore::new(exit_period),
            scan_period,
        }
    }
}

#[async_trait::async_trait]
impl BeaconService for SimulatedBeaconService {
    fn configure(&mut self, layout: BeaconLayout) {
        self.core.configure(layout);
    }

    async fn bind(&mut self) -> Result<()> {
        if self.core.is_bound() {
            debug!("Simulated beacon service already bound");
            return Ok(());
        }
        let shared = self.core.shared();
        let period = self.scan_period;
        self.core.attach(tokio::spawn(async move {
            run_simulation(&shared, period).await;
        }));
        info!("Simulated beacon service bound");
        Ok(())
    }

    fn unbind(&mut self) {
        self.core.unbind();
    }

    fn is_bound(&self) -> bool {
        self.core.is_bound()
    }

    fn start_monitoring(&mut self, region: &Region) -> Result<()> {
        self.core.start_monitoring(region)
    }

    fn stop_monitoring(&mut self, region: &Region) -> Result<()> {
        self.core.stop_monitoring(region)
    }

    fn start_ranging(&mut self, region: &Region) -> Result<()> {
        self.core.start_ranging(region)
    }

    fn stop_ranging(&mut self, region: &Region) -> Result<()> {
        self.core.stop_ranging(region)
    }

    fn subscribe(&mut self, notifier: Arc<dyn BeaconNotifier>) {
        self.core.subscribe(notifier);
    }
}

async fn run_simulation(shared: &Shared, period: Duration) {
    let beacons = fake_beacons();
    let mut cycles = cycle_timer(period);
    let mut samples = cycle_timer(period / SAMPLES_PER_CYCLE);
    let mut cycle = 0u32;

    loop {
        tokio::select! {
            _ = cycles.tick() => {
                shared.end_cycle(now_millis());
                cycle = cycle.wrapping_add(1);
            }
            _ = samples.tick() => {
                if !shared.is_active() {
                    continue;
                }
                for adv in sample(&beacons, cycle) {
                    shared.observe(&adv);
                }
            }
        }
    }
}

fn sample(beacons: &[FakeBeacon], cycle: u32) -> Vec<Advertisement> {
    let mut rng = rand::thread_rng();
    let timestamp = now_millis();
    beacons
        .iter()
        .filter(|b| b.visible(cycle))
        .map(|b| Advertisement {
            address: b.address.to_string(),
            company_id: 0x004c,
            data: b.payload(),
            rssi: b.base_rssi + rng.gen_range(-4..=4),
            timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_payload_parses_as_ibeacon() {
        let layout = BeaconLayout::ibeacon();
        for beacon in fake_beacons() {
            let parsed = layout
                .parse_advertisement(0x004c, &beacon.payload())
                .expect("fake beacon should match iBeacon layout");
            assert_eq!(parsed.identifiers[1].to_int(), Some(beacon.major));
            assert_eq!(parsed.identifiers[2].to_int(), Some(beacon.minor));
            assert_eq!(parsed.tx_power, Some(beacon.tx_power));
        }
    }

    #[test]
    fn test_blinking_beacon_visibility() {
        let beacons = fake_beacons();
        assert_eq!(sample(&beacons, 0).len(), 3);
        assert_eq!(sample(&beacons, 20).len(), 2);
        assert_eq!(sample(&beacons, 40).len(), 3);
    }

    #[test]
    fn test_rssi_jitter_bounds() {
        let beacons = fake_beacons();
        for adv in sample(&beacons, 0) {
            let base = beacons
                .iter()
                .find(|b| b.address == adv.address)
                .unwrap()
                .base_rssi;
            assert!((adv.rssi - base).abs() <= 4);
        }
    }

    #[tokio::test]
    async fn test_bind_is_idempotent_and_unbind_clears() {
        let mut service =
            SimulatedBeaconService::new(Duration::from_millis(50), Duration::from_secs(1));
        service.configure(BeaconLayout::ibeacon());
        let region = Region::any("iBeacon");

        assert!(service.start_ranging(&region).is_err());

        service.bind().await.unwrap();
        service.bind().await.unwrap();
        assert!(service.is_bound());
        service.start_ranging(&region).unwrap();

        service.unbind();
        assert!(!service.is_bound());
        assert!(service.stop_ranging(&region).is_err());
    }
}
