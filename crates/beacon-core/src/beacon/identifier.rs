//! 信标标识符
//!
//! 标识符是广播载荷中的一段原始字节，显示格式由长度决定：
//! - 16 字节: UUID (小写带连字符)
//! - 1~2 字节: 无符号十进制整数 (Major / Minor)
//! - 其他: `0x` 前缀的小写十六进制

use std::fmt;
use std::str::FromStr;

use crate::error::BeaconError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Vec<u8>);

impl Identifier {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_u16(value: u16) -> Self {
        Self(value.to_be_bytes().to_vec())
    }

    /// 解析用户输入的标识符
    ///
    /// 支持 UUID 文本、十进制 (0..=65535) 和 `0x` 十六进制三种形式。
    pub fn parse(s: &str) -> Result<Self, BeaconError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BeaconError::InvalidIdentifier("empty".to_string()));
        }

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return decode_hex(hex)
                .map(Self)
                .ok_or_else(|| BeaconError::InvalidIdentifier(s.to_string()));
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u16>()
                .map(Self::from_u16)
                .map_err(|_| BeaconError::InvalidIdentifier(format!("{s} (out of range)")));
        }

        uuid::Uuid::parse_str(s)
            .map(|u| Self(u.as_bytes().to_vec()))
            .map_err(|_| BeaconError::InvalidIdentifier(s.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 以整数形式读取（仅限 2 字节及以下）
    pub fn to_int(&self) -> Option<u16> {
        match self.0.as_slice() {
            [b] => Some(u16::from(*b)),
            [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

impl FromStr for Identifier {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(bytes) = <[u8; 16]>::try_from(self.0.as_slice()) {
            return write!(f, "{}", uuid::Uuid::from_bytes(bytes).hyphenated());
        }
        if let Some(n) = self.to_int() {
            return write!(f, "{n}");
        }
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || !hex.is_ascii() {
        return None;
    }
    // 奇数长度时补齐前导 0
    let padded = if hex.len() % 2 == 1 {
        format!("0{hex}")
    } else {
        hex.to_string()
    };
    (0..padded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&padded[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_display() {
        let id = Identifier::parse("2F234454-CF6D-4A0F-ADF2-F4911BA9FFA6").unwrap();
        assert_eq!(id.as_bytes().len(), 16);
        assert_eq!(id.to_string(), "2f234454-cf6d-4a0f-adf2-f4911ba9ffa6");
    }

    #[test]
    fn test_major_minor_decimal() {
        let id = Identifier::parse("1000").unwrap();
        assert_eq!(id.as_bytes(), &[0x03, 0xE8]);
        assert_eq!(id.to_string(), "1000");
        assert_eq!(id, Identifier::from_u16(1000));
    }

    #[test]
    fn test_hex_identifier() {
        let id = Identifier::parse("0xabc").unwrap();
        assert_eq!(id.as_bytes(), &[0x0a, 0xbc]);
        // 2 字节以十进制显示
        assert_eq!(id.to_string(), "2748");

        let long = Identifier::from_bytes(vec![0x01, 0x02, 0x03]);
        assert_eq!(long.to_string(), "0x010203");
    }

    #[test]
    fn test_invalid_identifier() {
        assert!(Identifier::parse("").is_err());
        assert!(Identifier::parse("70000").is_err());
        assert!(Identifier::parse("not-a-uuid").is_err());
        assert!(Identifier::parse("0xzz").is_err());
    }
}
