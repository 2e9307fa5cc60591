//! 深度标定：原始码值 -> 米
//!
//! 使用 Kinect v1 的经验倒数拟合。`>= 2047` 为无回波哨兵，输出 0.0。

use contracts::NO_RETURN_RAW;

const SLOPE: f64 = -0.0030711016;
const INTERCEPT: f64 = 3.3309495161;

/// 原始码值是否代表有效回波
#[inline]
pub fn is_valid(raw: u16) -> bool {
    raw < NO_RETURN_RAW
}

/// 原始码值转距离 (米)
#[inline]
pub fn to_meters(raw: u16) -> f64 {
    if !is_valid(raw) {
        return 0.0;
    }
    1.0 / (raw as f64 * SLOPE + INTERCEPT)
}
