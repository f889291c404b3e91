pub mod distance;
pub mod identifier;
pub mod layout;
pub mod region;

pub use distance::estimate_distance;
pub use identifier::Identifier;
pub use layout::{BeaconLayout, IBEACON_LAYOUT, LayoutError, ParsedBeacon};
pub use region::Region;

/// 单次测距周期中检测到的一个信标
///
/// 每个周期重新生成，不跨周期追踪身份。
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub identifiers: Vec<Identifier>,
    /// 周期内 RSSI 平均值
    pub rssi: i32,
    pub tx_power: i32,
    /// 估算距离（米）
    pub distance: f64,
    /// 周期内最后一次检测的时间戳 (epoch ms)
    pub last_seen: i64,
    pub address: String,
    pub company_id: u16,
}

impl Beacon {
    /// 第 n 个标识符 (从 1 开始)
    pub fn id(&self, n: usize) -> Option<&Identifier> {
        n.checked_sub(1).and_then(|i| self.identifiers.get(i))
    }
}
