//! 信标事件分发与显示
//!
//! 把扫描服务投递的事件转换为可见效果：
//! - 区域事件: 日志，进入/离开时额外产生一条短暂提示
//! - 测距批次: 每个信标格式化为多行文本，追加到只增不减的列表中
//!
//! 列表只能通过 [`BeaconList::reset`] 手动清空。

use chrono::{Local, TimeZone, Timelike};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::beacon::Beacon;
use crate::notify::{BeaconEvent, RegionEvent};


/// 行文本格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowStyle {
    /// 距离保留两位小数 + 最后观测时间
    #[default]
    Timestamped,
    /// 发射功率 + 原始距离，不含时间
    RawPower,
}

/// epoch 毫秒转换为本地时间 `YYYY/MM/DD hh:mm:ss`
///
/// 小时取 1-24，午夜显示为 `24`，日期不变。
pub fn format_timestamp(epoch_millis: i64) -> String {
    format_timestamp_in(epoch_millis, &Local)
}

pub fn format_timestamp_in<Tz: TimeZone>(epoch_millis: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match tz.timestamp_millis_opt(epoch_millis).single() {
        Some(dt) => {
            let hour = match dt.hour() {
                0 => 24,
                h => h,
            };
            format!("{} {:02}:{}", dt.format("%Y/%m/%d"), hour, dt.format("%M:%S"))
        }
        None => epoch_millis.to_string(),
    }
}

/// 小数总是带小数点，例如 `1.0`、`1.2`、`-1.0`
fn decimal_text(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

fn identifier_text(beacon: &Beacon, n: usize) -> String {
    beacon.id(n).map_or_else(String::new, ToString::to_string)
}

/// 格式化单个信标
pub fn format_beacon(beacon: &Beacon, style: RowStyle) -> String {
    format_beacon_with(beacon, style, format_timestamp)
}

fn format_beacon_with(beacon: &Beacon, style: RowStyle, timestamp: impl Fn(i64) -> String) -> String {
    let header = format!(
        "UUID（固有ID）: {}\nMajor（メジャー値）: {}\nMinor（マイナー値）: {}\nRSSI（電波強度）: {}\n",
        identifier_text(beacon, 1),
        identifier_text(beacon, 2),
        identifier_text(beacon, 3),
        beacon.rssi,
    );
    match style {
        RowStyle::Timestamped => format!(
            "{header}Accuracy（距離）: {}m\nTimeStamp（最終観測時刻）: {}\n",
            decimal_text((beacon.distance * 100.0).floor() / 100.0),
            timestamp(beacon.last_seen),
        ),
        RowStyle::RawPower => format!(
            "{header}TxPower: {}\nDistance: {}\n",
            beacon.tx_power,
            decimal_text(beacon.distance)
        ),
    }
}

/// 只追加的行列表
#[derive(Debug, Default, Clone)]
pub struct BeaconList {
    rows: Vec<String>,
}

impl BeaconList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn append(&mut self, row: String) {
        self.rows.push(row);
    }

    /// 清空全部行
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}

/// 事件分发器
///
/// 所有调用必须来自同一个 UI 上下文。
pub struct Dispatcher {
    list: BeaconList,
    style: RowStyle,
}

impl Dispatcher {
    pub fn new(style: RowStyle) -> Self {
        Self {
            list: BeaconList::new(),
            style,
        }
    }

    pub fn list(&self) -> &BeaconList {
        &self.list
    }

    pub fn style(&self) -> RowStyle {
        self.style
    }

    pub fn reset(&mut self) {
        self.list.reset();
    }

    /// 处理一个事件，返回需要短暂显示给用户的提示（如果有）
    pub fn handle(&mut self, event: BeaconEvent) -> Option<String> {
        match event {
            BeaconEvent::RegionTransition(event) => Self::handle_region(&event),
            BeaconEvent::RangeBatch { beacons, region } => {
                debug!(
                    "Ranged {} beacon(s) in region '{}'",
                    beacons.len(),
                    region.unique_id()
                );
                for beacon in &beacons {
                    self.list.append(format_beacon(beacon, self.style));
                }
                None
            }
        }
    }

    fn handle_region(event: &RegionEvent) -> Option<String> {
        match event {
            RegionEvent::Entered(region) => {
                info!("Entered region {}", region);
                Some("Enter Region".to_string())
            }
            RegionEvent::Exited(region) => {
                info!("Exited region {}", region);
                Some("Exit Region".to_string())
            }
            RegionEvent::Determined { state, region } => {
                debug!("Determine State{}, Region{}", state.code(), region);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::{Identifier, Region};
    use crate::notify::RegionState;
    use chrono::{FixedOffset, Utc};

    fn beacon(minor: u16) -> Beacon {
        Beacon {
            identifiers: vec![
                Identifier::parse("2f234454-cf6d-4a0f-adf2-f4911ba9ffa6").unwrap(),
                Identifier::from_u16(1000),
                Identifier::from_u16(minor),
            ],
            rssi: -67,
            tx_power: -59,
            distance: 1.23789,
            last_seen: 0,
            address: "AA:BB:CC:DD:EE:01".to_string(),
            company_id: 0x004c,
        }
    }

    fn batch(beacons: Vec<Beacon>) -> BeaconEvent {
        BeaconEvent::RangeBatch {
            beacons,
            region: Region::any("iBeacon"),
        }
    }

    #[test]
    fn test_epoch_zero_utc() {
        assert_eq!(format_timestamp_in(0, &Utc), "1970/01/01 24:00:00");
    }

    #[test]
    fn test_midnight_hour_is_24() {
        let utc = FixedOffset::east_opt(0).unwrap();
        // 2021-03-05 00:59:59 UTC
        assert_eq!(
            format_timestamp_in(1_614_905_999_000, &utc),
            "2021/03/05 24:59:59"
        );
        // 一秒后
        assert_eq!(
            format_timestamp_in(1_614_906_000_000, &utc),
            "2021/03/05 01:00:00"
        );
    }

    #[test]
    fn test_timestamp_24_hour_with_offset() {
        // 2021-03-04 15:06:07 UTC
        let ms = 1_614_870_367_000;
        assert_eq!(format_timestamp_in(ms, &Utc), "2021/03/04 15:06:07");
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        assert_eq!(format_timestamp_in(ms, &jst), "2021/03/05 24:06:07");
    }

    #[test]
    fn test_timestamped_row() {
        let text = format_beacon_with(&beacon(42), RowStyle::Timestamped, |ms| {
            format_timestamp_in(ms, &Utc)
        });
        assert_eq!(
            text,
            "UUID（固有ID）: 2f234454-cf6d-4a0f-adf2-f4911ba9ffa6\n\
             Major（メジャー値）: 1000\n\
             Minor（マイナー値）: 42\n\
             RSSI（電波強度）: -67\n\
             Accuracy（距離）: 1.23m\n\
             TimeStamp（最終観測時刻）: 1970/01/01 24:00:00\n"
        );
    }

    #[test]
    fn test_accuracy_drops_trailing_zeros() {
        let mut b = beacon(1);
        b.distance = 1.20_f64;
        assert!(format_beacon(&b, RowStyle::Timestamped).contains("Accuracy（距離）: 1.2m\n"));
        b.distance = 3.0;
        assert!(format_beacon(&b, RowStyle::Timestamped).contains("Accuracy（距離）: 3.0m\n"));
        b.distance = -1.0;
        assert!(format_beacon(&b, RowStyle::Timestamped).contains("Accuracy（距離）: -1.0m\n"));
        assert!(format_beacon(&b, RowStyle::RawPower).contains("Distance: -1.0\n"));
    }

    #[test]
    fn test_raw_power_row() {
        let text = format_beacon(&beacon(42), RowStyle::RawPower);
        assert!(text.contains("TxPower: -59\n"));
        assert!(text.contains("Distance: 1.23789\n"));
        assert!(!text.contains("TimeStamp"));
    }

    #[test]
    fn test_empty_batch_appends_nothing() {
        let mut dispatcher = Dispatcher::new(RowStyle::RawPower);
        dispatcher.handle(batch(vec![beacon(1)]));
        assert_eq!(dispatcher.list().len(), 1);

        assert!(dispatcher.handle(batch(vec![])).is_none());
        assert_eq!(dispatcher.list().len(), 1);
    }

    #[test]
    fn test_batch_appends_in_order() {
        let mut dispatcher = Dispatcher::new(RowStyle::RawPower);
        dispatcher.handle(batch(vec![beacon(1), beacon(2), beacon(3)]));
        dispatcher.handle(batch(vec![beacon(4)]));

        let minors: Vec<_> = dispatcher
            .list()
            .rows()
            .iter()
            .map(|r| r.lines().nth(2).unwrap().to_string())
            .collect();
        assert_eq!(
            minors,
            [
                "Minor（マイナー値）: 1",
                "Minor（マイナー値）: 2",
                "Minor（マイナー値）: 3",
                "Minor（マイナー値）: 4"
            ]
        );
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut dispatcher = Dispatcher::new(RowStyle::Timestamped);
        dispatcher.reset();
        assert!(dispatcher.list().is_empty());

        dispatcher.handle(batch(vec![beacon(1), beacon(2)]));
        dispatcher.reset();
        assert!(dispatcher.list().is_empty());
        dispatcher.reset();
        assert!(dispatcher.list().is_empty());

        dispatcher.handle(batch(vec![beacon(3)]));
        assert_eq!(dispatcher.list().len(), 1);
    }

    #[test]
    fn test_region_notices() {
        let mut dispatcher = Dispatcher::new(RowStyle::Timestamped);
        let region = Region::any("iBeacon");

        let enter = BeaconEvent::RegionTransition(RegionEvent::Entered(region.clone()));
        assert_eq!(dispatcher.handle(enter).as_deref(), Some("Enter Region"));

        let exit = BeaconEvent::RegionTransition(RegionEvent::Exited(region.clone()));
        assert_eq!(dispatcher.handle(exit).as_deref(), Some("Exit Region"));

        let determined = BeaconEvent::RegionTransition(RegionEvent::Determined {
            state: RegionState::Inside,
            region,
        });
        assert!(dispatcher.handle(determined).is_none());
        assert!(dispatcher.list().is_empty());
    }
}
