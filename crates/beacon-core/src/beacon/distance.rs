//! 距离估算
//!
//! 使用曲线拟合模型: `d = A * (rssi / txPower)^B + C`，系数取自 Nexus 5 的实测数据。

const COEFFICIENT_A: f64 = 0.420_93;
const COEFFICIENT_B: f64 = 6.947_6;
const COEFFICIENT_C: f64 = 0.549_92;

/// 根据 RSSI 和校准功率估算距离（米）
///
/// RSSI 为 0 表示无有效读数，返回 -1.0。
pub fn estimate_distance(tx_power: i32, rssi: f64) -> f64 {
    if rssi == 0.0 || tx_power == 0 {
        return -1.0;
    }

    let ratio = rssi / f64::from(tx_power);
    if ratio < 1.0 {
        ratio.powi(10)
    } else {
        COEFFICIENT_A * ratio.powf(COEFFICIENT_B) + COEFFICIENT_C
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_reading() {
        assert!((estimate_distance(-59, 0.0) + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stronger_than_calibration_is_close() {
        let d = estimate_distance(-59, -50.0);
        assert!(d > 0.0 && d < 1.0, "distance = {d}");
    }

    #[test]
    fn test_at_calibration_power() {
        let d = estimate_distance(-59, -59.0);
        assert!((d - (COEFFICIENT_A + COEFFICIENT_C)).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_with_weaker_signal() {
        let near = estimate_distance(-59, -65.0);
        let far = estimate_distance(-59, -85.0);
        assert!(far > near);
    }
}
