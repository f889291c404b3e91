//! 区域 (Region) - 监控/测距的信标过滤条件

use std::fmt;

use super::{Beacon, Identifier};

/// 由唯一名称和可选标识符约束组成的过滤器
///
/// 未设置的约束视为通配。区域在扫描会话期间不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    unique_id: String,
    identifiers: [Option<Identifier>; 3],
}

impl Region {
    pub fn new(
        unique_id: impl Into<String>,
        id1: Option<Identifier>,
        id2: Option<Identifier>,
        id3: Option<Identifier>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            identifiers: [id1, id2, id3],
        }
    }

    /// 匹配所有信标的区域
    pub fn any(unique_id: impl Into<String>) -> Self {
        Self::new(unique_id, None, None, None)
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// 第 n 个约束 (从 1 开始)
    pub fn identifier(&self, n: usize) -> Option<&Identifier> {
        n.checked_sub(1)
            .and_then(|i| self.identifiers.get(i))
            .and_then(Option::as_ref)
    }

    pub fn matches(&self, beacon: &Beacon) -> bool {
        self.identifiers.iter().enumerate().all(|(i, constraint)| {
            constraint
                .as_ref()
                .is_none_or(|c| beacon.identifiers.get(i) == Some(c))
        })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |id: Option<&Identifier>| id.map_or_else(|| "*".to_string(), ToString::to_string);
        write!(
            f,
            "{} [id1: {}, id2: {}, id3: {}]",
            self.unique_id,
            show(self.identifier(1)),
            show(self.identifier(2)),
            show(self.identifier(3)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon(major: u16, minor: u16) -> Beacon {
        Beacon {
            identifiers: vec![
                Identifier::parse("2f234454-cf6d-4a0f-adf2-f4911ba9ffa6").unwrap(),
                Identifier::from_u16(major),
                Identifier::from_u16(minor),
            ],
            rssi: -60,
            tx_power: -59,
            distance: 1.0,
            last_seen: 0,
            address: "AA:BB:CC:DD:EE:01".to_string(),
            company_id: 0x004c,
        }
    }

    #[test]
    fn test_wildcard_region_matches_everything() {
        let region = Region::any("iBeacon");
        assert!(region.matches(&beacon(1, 2)));
        assert!(region.matches(&beacon(100, 200)));
    }

    #[test]
    fn test_partial_constraints() {
        let region = Region::new("r", None, Some(Identifier::from_u16(1)), None);
        assert!(region.matches(&beacon(1, 2)));
        assert!(region.matches(&beacon(1, 99)));
        assert!(!region.matches(&beacon(2, 2)));
    }

    #[test]
    fn test_display() {
        let region = Region::new("r", None, Some(Identifier::from_u16(7)), None);
        assert_eq!(region.to_string(), "r [id1: *, id2: 7, id3: *]");
    }
}
