//! 数值表示转换模块
//!
//! 序列化器在内存类型与线上表示不一致时(例如 `i64` 字段以
//! Int32 表示存储)通过 `RepresentationConverter` 完成数值换算。
//! 转换器携带两个独立开关:
//! - `allow_overflow`: 超出目标范围时饱和而非报错
//! - `allow_truncation`: 丢失小数精度时截断而非报错
//!
//! 检查顺序固定为先范围后精度,范围越界的值不再做精度检查。
//! NaN 与无穷大转整数一律视为溢出,不受开关影响。

use crate::decimal128::Decimal128;
use crate::{BsonError, BsonResult};
use half::f16;
use rust_decimal::prelude::ToPrimitive;

/// 表示转换器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RepresentationConverter {
    allow_overflow: bool,
    allow_truncation: bool,
}

impl RepresentationConverter {
    /// 严格模式: 任何溢出或截断都报错
    pub const STRICT: Self = Self::new(false, false);

    pub const fn new(allow_overflow: bool, allow_truncation: bool) -> Self {
        Self {
            allow_overflow,
            allow_truncation,
        }
    }

    pub const fn allow_overflow(&self) -> bool {
        self.allow_overflow
    }

    pub const fn allow_truncation(&self) -> bool {
        self.allow_truncation
    }

    fn overflow(value: impl std::fmt::Display, target: &'static str) -> BsonError {
        BsonError::Overflow {
            value: value.to_string(),
            target,
        }
    }

    fn truncation(value: impl std::fmt::Display, target: &'static str) -> BsonError {
        BsonError::Truncation {
            value: value.to_string(),
            target,
        }
    }

    /// f64 转 i32
    ///
    /// # Brief
    /// 越界时按 `allow_overflow` 饱和或报错;有小数部分时按
    /// `allow_truncation` 截断或报错
    pub fn double_to_int32(&self, value: f64) -> BsonResult<i32> {
        if !value.is_finite() {
            return Err(Self::overflow(value, "i32"));
        }
        if value < i32::MIN as f64 || value > i32::MAX as f64 {
            if !self.allow_overflow {
                return Err(Self::overflow(value, "i32"));
            }
        } else if value != (value as i32) as f64 && !self.allow_truncation {
            return Err(Self::truncation(value, "i32"));
        }
        Ok(value as i32)
    }

    /// f64 转 i64
    pub fn double_to_int64(&self, value: f64) -> BsonResult<i64> {
        if !value.is_finite() {
            return Err(Self::overflow(value, "i64"));
        }
        if value < i64::MIN as f64 || value >= i64::MAX as f64 {
            if !self.allow_overflow {
                return Err(Self::overflow(value, "i64"));
            }
        } else if value != (value as i64) as f64 && !self.allow_truncation {
            return Err(Self::truncation(value, "i64"));
        }
        Ok(value as i64)
    }

    /// f64 转 Decimal128
    ///
    /// # Brief
    /// 经由最短十进制表示转换,非有限值直接映射为
    /// Decimal128 的 NaN / 无穷大,不会失败
    pub fn double_to_decimal128(&self, value: f64) -> BsonResult<Decimal128> {
        if value.is_nan() {
            return Ok(Decimal128::NAN);
        }
        if value.is_infinite() {
            return Ok(if value > 0.0 {
                Decimal128::POSITIVE_INFINITY
            } else {
                Decimal128::NEGATIVE_INFINITY
            });
        }
        Decimal128::parse(&format!("{}", value))
    }

    /// f64 转半精度浮点
    pub fn double_to_f16(&self, value: f64) -> BsonResult<f16> {
        let half = f16::from_f64(value);
        if value.is_finite() && half.is_infinite() {
            if !self.allow_overflow {
                return Err(Self::overflow(value, "f16"));
            }
        } else if half.to_f64() != value && !value.is_nan() && !self.allow_truncation {
            return Err(Self::truncation(value, "f16"));
        }
        Ok(half)
    }

    /// i64 转 i32
    pub fn int64_to_int32(&self, value: i64) -> BsonResult<i32> {
        match i32::try_from(value) {
            Ok(v) => Ok(v),
            Err(_) => {
                if self.allow_overflow {
                    Ok(if value < 0 { i32::MIN } else { i32::MAX })
                } else {
                    Err(Self::overflow(value, "i32"))
                }
            }
        }
    }

    /// i64 转 f64
    ///
    /// # Brief
    /// 绝对值超过 2^53 的整数在 f64 中不可精确表示,视为截断
    pub fn int64_to_double(&self, value: i64) -> BsonResult<f64> {
        let converted = value as f64;
        if converted as i64 != value && !self.allow_truncation {
            return Err(Self::truncation(value, "f64"));
        }
        Ok(converted)
    }

    /// i64 转 Decimal128,总是精确
    pub fn int64_to_decimal128(&self, value: i64) -> BsonResult<Decimal128> {
        Decimal128::from_parts(value < 0, 0, value.unsigned_abs() as u128)
    }

    /// i32 转 i64,总是精确
    pub fn int32_to_int64(&self, value: i32) -> BsonResult<i64> {
        Ok(value as i64)
    }

    /// i32 转 f64,总是精确
    pub fn int32_to_double(&self, value: i32) -> BsonResult<f64> {
        Ok(value as f64)
    }

    /// i32 转 Decimal128,总是精确
    pub fn int32_to_decimal128(&self, value: i32) -> BsonResult<Decimal128> {
        Decimal128::from_parts(value < 0, 0, value.unsigned_abs() as u128)
    }

    /// i32 转半精度浮点
    pub fn int32_to_f16(&self, value: i32) -> BsonResult<f16> {
        self.double_to_f16(value as f64)
    }

    /// Decimal128 转 i32
    pub fn decimal128_to_int32(&self, value: Decimal128) -> BsonResult<i32> {
        let wide = self.decimal128_to_int64(value).map_err(|e| match e {
            BsonError::Overflow { value, .. } => BsonError::Overflow {
                value,
                target: "i32",
            },
            BsonError::Truncation { value, .. } => BsonError::Truncation {
                value,
                target: "i32",
            },
            other => other,
        })?;
        self.int64_to_int32(wide)
    }

    /// Decimal128 转 i64
    pub fn decimal128_to_int64(&self, value: Decimal128) -> BsonResult<i64> {
        if !value.is_finite() {
            return Err(Self::overflow(value, "i64"));
        }
        let dec = match value.to_decimal() {
            Ok(d) => d,
            Err(_) => {
                if self.allow_overflow {
                    return Ok(if value.is_negative() { i64::MIN } else { i64::MAX });
                }
                return Err(Self::overflow(value, "i64"));
            }
        };
        let truncated = dec.trunc();
        match truncated.to_i64() {
            Some(v) => {
                if dec != truncated && !self.allow_truncation {
                    return Err(Self::truncation(value, "i64"));
                }
                Ok(v)
            }
            None => {
                if self.allow_overflow {
                    Ok(if dec.is_sign_negative() {
                        i64::MIN
                    } else {
                        i64::MAX
                    })
                } else {
                    Err(Self::overflow(value, "i64"))
                }
            }
        }
    }

    /// Decimal128 转 f64
    ///
    /// # Brief
    /// NaN 与无穷大直接映射;有限值超出 f64 范围视为溢出,
    /// 无法精确表示时视为截断
    pub fn decimal128_to_double(&self, value: Decimal128) -> BsonResult<f64> {
        if value.is_nan() {
            return Ok(f64::NAN);
        }
        if value.is_infinity() {
            return Ok(if value.is_negative() {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            });
        }
        let text = value.to_string();
        let converted: f64 = text
            .parse()
            .map_err(|e| BsonError::Format(format!("Invalid decimal text {:?}: {}", text, e)))?;
        if converted.is_infinite() {
            if !self.allow_overflow {
                return Err(Self::overflow(value, "f64"));
            }
            return Ok(converted);
        }
        if !self.allow_truncation {
            let back = Decimal128::parse(&format!("{}", converted))?;
            if back != value {
                return Err(Self::truncation(value, "f64"));
            }
        }
        Ok(converted)
    }

    /// 半精度浮点转 f64,总是精确
    pub fn f16_to_double(&self, value: f16) -> BsonResult<f64> {
        Ok(value.to_f64())
    }

    /// 半精度浮点转 i32
    pub fn f16_to_int32(&self, value: f16) -> BsonResult<i32> {
        self.double_to_int32(value.to_f64())
    }

    /// 半精度浮点转 i64
    pub fn f16_to_int64(&self, value: f16) -> BsonResult<i64> {
        self.double_to_int64(value.to_f64())
    }
}

impl Default for RepresentationConverter {
    fn default() -> Self {
        Self::STRICT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_to_int32_exact() {
        let c = RepresentationConverter::STRICT;
        assert_eq!(c.double_to_int32(42.0).unwrap(), 42);
        assert_eq!(c.double_to_int32(-1.0).unwrap(), -1);
    }

    #[test]
    fn test_double_to_int32_truncation() {
        let strict = RepresentationConverter::STRICT;
        assert!(matches!(
            strict.double_to_int32(1.5),
            Err(BsonError::Truncation { .. })
        ));
        let lossy = RepresentationConverter::new(false, true);
        assert_eq!(lossy.double_to_int32(1.5).unwrap(), 1);
        assert_eq!(lossy.double_to_int32(-1.5).unwrap(), -1);
    }

    #[test]
    fn test_double_to_int32_overflow() {
        let strict = RepresentationConverter::STRICT;
        assert!(matches!(
            strict.double_to_int32(1e10),
            Err(BsonError::Overflow { .. })
        ));
        let saturating = RepresentationConverter::new(true, false);
        assert_eq!(saturating.double_to_int32(1e10).unwrap(), i32::MAX);
        assert_eq!(saturating.double_to_int32(-1e10).unwrap(), i32::MIN);
    }

    #[test]
    fn test_non_finite_to_integer_always_overflows() {
        let permissive = RepresentationConverter::new(true, true);
        assert!(permissive.double_to_int32(f64::NAN).is_err());
        assert!(permissive.double_to_int64(f64::INFINITY).is_err());
        assert!(permissive
            .decimal128_to_int64(Decimal128::NEGATIVE_INFINITY)
            .is_err());
    }

    #[test]
    fn test_int64_to_double_precision() {
        let strict = RepresentationConverter::STRICT;
        assert_eq!(strict.int64_to_double(1 << 53).unwrap(), 9007199254740992.0);
        assert!(matches!(
            strict.int64_to_double((1 << 53) + 1),
            Err(BsonError::Truncation { .. })
        ));
        let lossy = RepresentationConverter::new(false, true);
        assert_eq!(lossy.int64_to_double((1 << 53) + 1).unwrap(), 9007199254740992.0);
    }

    #[test]
    fn test_int64_to_int32_range() {
        let strict = RepresentationConverter::STRICT;
        assert_eq!(strict.int64_to_int32(-5).unwrap(), -5);
        assert!(strict.int64_to_int32(i64::from(i32::MAX) + 1).is_err());
        let saturating = RepresentationConverter::new(true, false);
        assert_eq!(
            saturating.int64_to_int32(i64::from(i32::MIN) - 1).unwrap(),
            i32::MIN
        );
    }

    #[test]
    fn test_decimal128_integer_roundtrip() {
        let c = RepresentationConverter::STRICT;
        let d = c.int64_to_decimal128(-1234567890123).unwrap();
        assert_eq!(c.decimal128_to_int64(d).unwrap(), -1234567890123);
        let d = c.int32_to_decimal128(77).unwrap();
        assert_eq!(c.decimal128_to_int32(d).unwrap(), 77);
    }

    #[test]
    fn test_decimal128_to_int64_truncation() {
        let strict = RepresentationConverter::STRICT;
        let half = Decimal128::parse("2.5").unwrap();
        assert!(matches!(
            strict.decimal128_to_int64(half),
            Err(BsonError::Truncation { .. })
        ));
        let lossy = RepresentationConverter::new(false, true);
        assert_eq!(lossy.decimal128_to_int64(half).unwrap(), 2);
    }

    #[test]
    fn test_decimal128_double_roundtrip() {
        let c = RepresentationConverter::STRICT;
        let d = c.double_to_decimal128(0.25).unwrap();
        assert_eq!(c.decimal128_to_double(d).unwrap(), 0.25);
    }

    #[test]
    fn test_decimal128_to_double_overflow() {
        let strict = RepresentationConverter::STRICT;
        let huge = Decimal128::parse("1E+1000").unwrap();
        assert!(matches!(
            strict.decimal128_to_double(huge),
            Err(BsonError::Overflow { .. })
        ));
        let saturating = RepresentationConverter::new(true, true);
        assert!(saturating.decimal128_to_double(huge).unwrap().is_infinite());
    }

    #[test]
    fn test_f16_lane() {
        let strict = RepresentationConverter::STRICT;
        let h = strict.double_to_f16(1.5).unwrap();
        assert_eq!(strict.f16_to_double(h).unwrap(), 1.5);
        assert!(matches!(
            strict.double_to_f16(1e6),
            Err(BsonError::Overflow { .. })
        ));
        assert!(matches!(
            strict.double_to_f16(1.0 + 1e-6),
            Err(BsonError::Truncation { .. })
        ));
    }
}
