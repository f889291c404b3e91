//! 信标布局描述解析
//!
//! 布局字符串描述厂商自定义广播数据中各字段的字节位置，例如 iBeacon:
//!
//! ```text
//! m:2-3=0215,i:4-19,i:20-21,i:22-23,p:24-24
//! ```
//!
//! - `m:S-E=HEX`  匹配前缀，S..=E 位置的字节必须等于 HEX
//! - `i:S-E[l]`   标识符 (l = 小端序)
//! - `p:S-E`      校准发射功率 (单字节，有符号)
//! - `d:S-E[l]`   附加数据字段 (最多 8 字节)
//!
//! 偏移量包含 2 字节小端序的厂商 ID。

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::Identifier;

/// iBeacon 布局
pub const IBEACON_LAYOUT: &str = "m:2-3=0215,i:4-19,i:20-21,i:22-23,p:24-24";

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z]):(\d+)-(\d+)(?:=([0-9A-Fa-f]+))?(l?)$").expect("valid term regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout is empty")]
    Empty,

    #[error("malformed term '{0}'")]
    MalformedTerm(String),

    #[error("unsupported term type in '{0}'")]
    UnsupportedTerm(String),

    #[error("invalid byte range in '{0}'")]
    InvalidRange(String),

    #[error("matcher value length does not match its range in '{0}'")]
    MatcherLength(String),

    #[error("layout must contain exactly one matcher term")]
    MatcherCount,

    #[error("layout contains more than one power term")]
    DuplicatePower,

    #[error("layout contains no identifier terms")]
    NoIdentifiers,
}

/// 广播载荷的最大字节偏移
const MAX_OFFSET: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldRange {
    start: usize,
    end: usize,
    little_endian: bool,
}

impl FieldRange {
    fn len(self) -> usize {
        self.end - self.start + 1
    }

    fn read(self, payload: &[u8]) -> Option<Vec<u8>> {
        let mut bytes = payload.get(self.start..=self.end)?.to_vec();
        if self.little_endian {
            bytes.reverse();
        }
        Some(bytes)
    }
}

/// 按布局解析后的单个广播
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBeacon {
    pub company_id: u16,
    pub identifiers: Vec<Identifier>,
    pub tx_power: Option<i8>,
    pub data_fields: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconLayout {
    source: String,
    matcher: (FieldRange, Vec<u8>),
    identifiers: Vec<FieldRange>,
    power: Option<FieldRange>,
    data_fields: Vec<FieldRange>,
}

impl BeaconLayout {
    pub fn parse(layout: &str) -> Result<Self, LayoutError> {
        let layout = layout.trim();
        if layout.is_empty() {
            return Err(LayoutError::Empty);
        }

        let mut matchers = Vec::new();
        let mut identifiers = Vec::new();
        let mut power = None;
        let mut data_fields = Vec::new();

        for term in layout.split(',').map(str::trim) {
            let caps = TERM_RE
                .captures(term)
                .ok_or_else(|| LayoutError::MalformedTerm(term.to_string()))?;

            let start: usize = caps[2]
                .parse()
                .map_err(|_| LayoutError::InvalidRange(term.to_string()))?;
            let end: usize = caps[3]
                .parse()
                .map_err(|_| LayoutError::InvalidRange(term.to_string()))?;
            if end < start || end > MAX_OFFSET {
                return Err(LayoutError::InvalidRange(term.to_string()));
            }
            let range = FieldRange {
                start,
                end,
                little_endian: !caps[5].is_empty(),
            };
            let value = caps.get(4).map(|m| m.as_str());

            match (&caps[1], value) {
                ("m", Some(hex)) if !range.little_endian => {
                    let bytes = decode_hex(hex)
                        .ok_or_else(|| LayoutError::MalformedTerm(term.to_string()))?;
                    if bytes.len() != range.len() {
                        return Err(LayoutError::MatcherLength(term.to_string()));
                    }
                    matchers.push((range, bytes));
                }
                ("i", None) => identifiers.push(range),
                ("d", None) => {
                    if range.len() > 8 {
                        return Err(LayoutError::InvalidRange(term.to_string()));
                    }
                    data_fields.push(range);
                }
                ("p", None) if !range.little_endian => {
                    if range.len() != 1 {
                        return Err(LayoutError::InvalidRange(term.to_string()));
                    }
                    if power.replace(range).is_some() {
                        return Err(LayoutError::DuplicatePower);
                    }
                }
                ("m" | "i" | "d" | "p", _) => {
                    return Err(LayoutError::MalformedTerm(term.to_string()));
                }
                _ => return Err(LayoutError::UnsupportedTerm(term.to_string())),
            }
        }

        if matchers.len() != 1 {
            return Err(LayoutError::MatcherCount);
        }
        if identifiers.is_empty() {
            return Err(LayoutError::NoIdentifiers);
        }

        Ok(Self {
            source: layout.to_string(),
            matcher: matchers.remove(0),
            identifiers,
            power,
            data_fields,
        })
    }

    pub fn ibeacon() -> Self {
        Self::parse(IBEACON_LAYOUT).expect("built-in iBeacon layout is valid")
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers.len()
    }

    /// 解析厂商自定义数据
    ///
    /// `data` 为去掉厂商 ID 之后的载荷；布局偏移量从厂商 ID 开始计算。
    /// 不匹配或长度不足时返回 `None`。
    pub fn parse_advertisement(&self, company_id: u16, data: &[u8]) -> Option<ParsedBeacon> {
        let mut payload = Vec::with_capacity(data.len() + 2);
        payload.extend_from_slice(&company_id.to_le_bytes());
        payload.extend_from_slice(data);

        let (range, expected) = &self.matcher;
        if payload.get(range.start..=range.end)? != expected.as_slice() {
            return None;
        }

        let identifiers = self
            .identifiers
            .iter()
            .map(|r| r.read(&payload).map(Identifier::from_bytes))
            .collect::<Option<Vec<_>>>()?;

        let tx_power = match self.power {
            Some(r) => Some(i8::from_be_bytes([*payload.get(r.start)?])),
            None => None,
        };

        let data_fields = self
            .data_fields
            .iter()
            .map(|r| {
                r.read(&payload)
                    .map(|bytes| bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
            })
            .collect::<Option<Vec<_>>>()?;

        Some(ParsedBeacon {
            company_id,
            identifiers,
            tx_power,
            data_fields,
        })
    }
}

impl FromStr for BeaconLayout {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BeaconLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0215 + UUID + major 1000 + minor 42 + txPower -59
    fn ibeacon_payload() -> Vec<u8> {
        let mut data = vec![0x02, 0x15];
        data.extend_from_slice(&[
            0x2f, 0x23, 0x44, 0x54, 0xcf, 0x6d, 0x4a, 0x0f, 0xad, 0xf2, 0xf4, 0x91, 0x1b, 0xa9,
            0xff, 0xa6,
        ]);
        data.extend_from_slice(&[0x03, 0xe8, 0x00, 0x2a, 0xc5]);
        data
    }

    #[test]
    fn test_parse_ibeacon_layout() {
        let layout = BeaconLayout::parse(IBEACON_LAYOUT).unwrap();
        assert_eq!(layout.identifier_count(), 3);
        assert_eq!(layout.to_string(), IBEACON_LAYOUT);
    }

    #[test]
    fn test_parse_ibeacon_advertisement() {
        let layout = BeaconLayout::ibeacon();
        let parsed = layout
            .parse_advertisement(0x004c, &ibeacon_payload())
            .expect("iBeacon payload should match");

        assert_eq!(parsed.company_id, 0x004c);
        assert_eq!(
            parsed.identifiers[0].to_string(),
            "2f234454-cf6d-4a0f-adf2-f4911ba9ffa6"
        );
        assert_eq!(parsed.identifiers[1].to_string(), "1000");
        assert_eq!(parsed.identifiers[2].to_string(), "42");
        assert_eq!(parsed.tx_power, Some(-59));
        assert!(parsed.data_fields.is_empty());
    }

    #[test]
    fn test_non_matching_payloads() {
        let layout = BeaconLayout::ibeacon();

        let mut wrong_prefix = ibeacon_payload();
        wrong_prefix[1] = 0x16;
        assert!(layout.parse_advertisement(0x004c, &wrong_prefix).is_none());

        let truncated = &ibeacon_payload()[..20];
        assert!(layout.parse_advertisement(0x004c, truncated).is_none());

        assert!(layout.parse_advertisement(0x004c, &[]).is_none());
    }

    #[test]
    fn test_little_endian_and_data_fields() {
        let layout = BeaconLayout::parse("m:2-2=be,i:3-4l,d:5-6").unwrap();
        let parsed = layout
            .parse_advertisement(0x0118, &[0xbe, 0x01, 0x02, 0x12, 0x34])
            .unwrap();
        assert_eq!(parsed.identifiers[0].as_bytes(), &[0x02, 0x01]);
        assert_eq!(parsed.tx_power, None);
        assert_eq!(parsed.data_fields, vec![0x1234]);
    }

    #[test]
    fn test_layout_errors() {
        assert_eq!(BeaconLayout::parse("  "), Err(LayoutError::Empty));
        assert!(matches!(
            BeaconLayout::parse("m:2-3=0215,i:4"),
            Err(LayoutError::MalformedTerm(_))
        ));
        assert!(matches!(
            BeaconLayout::parse("m:2-3=0215,i:19-4"),
            Err(LayoutError::InvalidRange(_))
        ));
        assert!(matches!(
            BeaconLayout::parse("m:0-18446744073709551615=00,i:1-2"),
            Err(LayoutError::InvalidRange(_))
        ));
        assert!(matches!(
            BeaconLayout::parse("m:2-3=0215,i:4-256"),
            Err(LayoutError::InvalidRange(_))
        ));
        assert!(matches!(
            BeaconLayout::parse("m:2-3=02,i:4-19"),
            Err(LayoutError::MatcherLength(_))
        ));
        assert!(matches!(
            BeaconLayout::parse("m:2-3=0215,i:4-19,x:20-21"),
            Err(LayoutError::UnsupportedTerm(_))
        ));
        assert_eq!(BeaconLayout::parse("i:4-19"), Err(LayoutError::MatcherCount));
        assert_eq!(
            BeaconLayout::parse("m:2-3=0215,p:24-24"),
            Err(LayoutError::NoIdentifiers)
        );
        assert_eq!(
            BeaconLayout::parse("m:2-3=0215,i:4-19,p:24-24,p:25-25"),
            Err(LayoutError::DuplicatePower)
        );
    }
}
