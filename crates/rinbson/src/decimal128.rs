//! Decimal128 线格式类型
//!
//! IEEE 754-2008 decimal128 的 BID(二进制整数十进制)编码,
//! 即 BSON `0x13` 元素的 16 字节负载。内存中的十进制计算使用
//! `rust_decimal::Decimal`,本模块负责两者间的转换:
//! `Decimal` 的 96 位尾数与 0..=28 的小数位数总能精确放入
//! decimal128 的 34 位十进制有效数字,反方向则可能溢出或丢失精度。

use crate::{BsonError, BsonResult};
use rust_decimal::Decimal;

/// 指数偏移量
const EXPONENT_BIAS: i32 = 6176;
/// 最小/最大无偏指数
const MIN_EXPONENT: i32 = -6176;
const MAX_EXPONENT: i32 = 6111;
/// 最大系数: 10^34 - 1
const MAX_COEFFICIENT: u128 = 9_999_999_999_999_999_999_999_999_999_999_999;

const SIGN_BIT: u128 = 1 << 127;
/// 组合字段为 11111 表示 NaN,11110 表示无穷
const COMBINATION_MASK: u128 = 0x1F << 122;
const COMBINATION_NAN: u128 = 0x1F << 122;
const COMBINATION_INFINITY: u128 = 0x1E << 122;
/// 组合字段高两位为 11 时进入第二编码形式(系数带隐含前缀,
/// 超出 34 位十进制数字,按规范视为非规范零)
const FORM2_MASK: u128 = 0b11 << 125;

/// 128 位十进制浮点数(BID 编码位模式)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128 {
    bits: u128,
}

impl Decimal128 {
    pub const ZERO: Decimal128 = Decimal128 {
        bits: (EXPONENT_BIAS as u128) << 113,
    };
    pub const NAN: Decimal128 = Decimal128 {
        bits: COMBINATION_NAN,
    };
    pub const POSITIVE_INFINITY: Decimal128 = Decimal128 {
        bits: COMBINATION_INFINITY,
    };
    pub const NEGATIVE_INFINITY: Decimal128 = Decimal128 {
        bits: SIGN_BIT | COMBINATION_INFINITY,
    };

    /// 从符号、无偏指数和系数构造
    ///
    /// # Brief
    /// 按第一编码形式组装位模式;系数不得超过 34 位十进制数字,
    /// 指数必须在 [-6176, 6111] 内。
    pub fn from_parts(negative: bool, exponent: i32, coefficient: u128) -> BsonResult<Self> {
        if coefficient > MAX_COEFFICIENT {
            return Err(BsonError::Overflow {
                value: coefficient.to_string(),
                target: "Decimal128",
            });
        }
        if exponent < MIN_EXPONENT || exponent > MAX_EXPONENT {
            return Err(BsonError::Overflow {
                value: format!("E{}", exponent),
                target: "Decimal128",
            });
        }
        let mut bits = ((exponent + EXPONENT_BIAS) as u128) << 113 | coefficient;
        if negative {
            bits |= SIGN_BIT;
        }
        Ok(Self { bits })
    }

    pub fn from_bits(bits: u128) -> Self {
        Self { bits }
    }

    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// 小端 16 字节(线格式字节序)
    pub fn to_le_bytes(&self) -> [u8; 16] {
        self.bits.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Self {
            bits: u128::from_le_bytes(bytes),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.bits & SIGN_BIT != 0
    }

    pub fn is_nan(&self) -> bool {
        self.bits & COMBINATION_MASK == COMBINATION_NAN
    }

    pub fn is_infinity(&self) -> bool {
        self.bits & COMBINATION_MASK == COMBINATION_INFINITY
    }

    pub fn is_finite(&self) -> bool {
        !self.is_nan() && !self.is_infinity()
    }

    pub fn is_zero(&self) -> bool {
        match self.parts() {
            Some((_, _, coefficient)) => coefficient == 0,
            None => false,
        }
    }

    /// 拆解为 (符号, 无偏指数, 系数);NaN/无穷返回 None
    fn parts(&self) -> Option<(bool, i32, u128)> {
        if !self.is_finite() {
            return None;
        }
        let negative = self.is_negative();
        if self.bits & FORM2_MASK == FORM2_MASK {
            // 第二形式的系数必然超过 10^34-1,规范要求按零处理
            let exponent = ((self.bits >> 111) & 0x3FFF) as i32 - EXPONENT_BIAS;
            return Some((negative, exponent, 0));
        }
        let exponent = ((self.bits >> 113) & 0x3FFF) as i32 - EXPONENT_BIAS;
        let coefficient = self.bits & ((1u128 << 113) - 1);
        if coefficient > MAX_COEFFICIENT {
            return Some((negative, exponent, 0));
        }
        Some((negative, exponent, coefficient))
    }

    /// 从 `rust_decimal::Decimal` 精确转换
    pub fn from_decimal(value: Decimal) -> Self {
        let coefficient = value.mantissa().unsigned_abs();
        let exponent = -(value.scale() as i32);
        // 96 位尾数与 0..=28 的小数位数总在 decimal128 的值域内
        match Self::from_parts(value.is_sign_negative(), exponent, coefficient) {
            Ok(d) => d,
            Err(_) => unreachable!("Decimal mantissa always fits Decimal128"),
        }
    }

    /// 转换为 `rust_decimal::Decimal`
    ///
    /// # Brief
    /// NaN/无穷或值域外的有限值返回溢出错误;
    /// 能通过去除尾部零容纳的值会被无损规约。
    pub fn to_decimal(&self) -> BsonResult<Decimal> {
        let (negative, mut exponent, mut coefficient) =
            self.parts().ok_or_else(|| BsonError::Overflow {
                value: self.to_string(),
                target: "Decimal",
            })?;
        // Decimal 的小数位数限制为 0..=28,尾数限制为 96 位
        while exponent < -28 && coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        while exponent > 0 && coefficient <= u128::MAX / 10 {
            coefficient = coefficient.checked_mul(10).ok_or_else(|| BsonError::Overflow {
                value: self.to_string(),
                target: "Decimal",
            })?;
            exponent -= 1;
            if coefficient >> 96 != 0 {
                return Err(BsonError::Overflow {
                    value: self.to_string(),
                    target: "Decimal",
                });
            }
        }
        if exponent < -28 || exponent > 0 || coefficient >> 96 != 0 {
            return Err(BsonError::Overflow {
                value: self.to_string(),
                target: "Decimal",
            });
        }
        let mut signed = coefficient as i128;
        if negative {
            signed = -signed;
        }
        Ok(Decimal::from_i128_with_scale(signed, (-exponent) as u32))
    }

    /// 按十进制字符串解析(支持 NaN/Infinity 字面量和 E 指数)
    pub fn parse(s: &str) -> BsonResult<Self> {
        match s {
            "NaN" => return Ok(Self::NAN),
            "Infinity" | "+Infinity" => return Ok(Self::POSITIVE_INFINITY),
            "-Infinity" => return Ok(Self::NEGATIVE_INFINITY),
            _ => {}
        }
        let (mantissa_str, exp_extra) = match s.find(['e', 'E']) {
            Some(pos) => {
                let exp: i32 = s[pos + 1..].parse().map_err(|_| {
                    BsonError::Format(format!("Invalid Decimal128 string: {}", s))
                })?;
                (&s[..pos], exp)
            }
            None => (s, 0),
        };
        let negative = mantissa_str.starts_with('-');
        let unsigned = mantissa_str.trim_start_matches(['+', '-']);
        let (int_part, frac_part) = match unsigned.find('.') {
            Some(pos) => (&unsigned[..pos], &unsigned[pos + 1..]),
            None => (unsigned, ""),
        };
        let digits: String = format!("{}{}", int_part, frac_part);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BsonError::Format(format!(
                "Invalid Decimal128 string: {}",
                s
            )));
        }
        let coefficient: u128 = digits.parse().map_err(|_| BsonError::Overflow {
            value: s.to_string(),
            target: "Decimal128",
        })?;
        let exponent = exp_extra - frac_part.len() as i32;
        Self::from_parts(negative, exponent, coefficient)
    }
}

impl From<Decimal> for Decimal128 {
    fn from(value: Decimal) -> Self {
        Self::from_decimal(value)
    }
}

impl std::fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nan() {
            return write!(f, "NaN");
        }
        if self.is_infinity() {
            return write!(f, "{}", if self.is_negative() { "-Infinity" } else { "Infinity" });
        }
        let (negative, exponent, coefficient) = match self.parts() {
            Some(parts) => parts,
            None => unreachable!("finite value always has parts"),
        };
        if negative {
            write!(f, "-")?;
        }
        let digits = coefficient.to_string();
        if exponent == 0 {
            write!(f, "{}", digits)
        } else if exponent > 0 {
            write!(f, "{}E+{}", digits, exponent)
        } else if (-exponent as usize) < digits.len() {
            let split = digits.len() - (-exponent as usize);
            write!(f, "{}.{}", &digits[..split], &digits[split..])
        } else {
            write!(f, "0.{}{}", "0".repeat((-exponent as usize) - digits.len()), digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_from_decimal_roundtrip() {
        for s in ["0", "1", "-1", "123.456", "-0.00001", "79228162514264337593543950335"] {
            let d = Decimal::from_str(s).unwrap();
            let wire = Decimal128::from_decimal(d);
            assert_eq!(wire.to_decimal().unwrap(), d, "value {}", s);
        }
    }

    #[test]
    fn test_wire_bytes_roundtrip() {
        let d = Decimal128::from_decimal(Decimal::from_str("42.5").unwrap());
        let bytes = d.to_le_bytes();
        assert_eq!(Decimal128::from_le_bytes(bytes), d);
    }

    #[test]
    fn test_special_values() {
        assert!(Decimal128::NAN.is_nan());
        assert!(Decimal128::POSITIVE_INFINITY.is_infinity());
        assert!(!Decimal128::POSITIVE_INFINITY.is_negative());
        assert!(Decimal128::NEGATIVE_INFINITY.is_negative());
        assert!(Decimal128::NAN.to_decimal().is_err());
        assert!(Decimal128::POSITIVE_INFINITY.to_decimal().is_err());
        assert_eq!(Decimal128::NAN.to_string(), "NaN");
        assert_eq!(Decimal128::NEGATIVE_INFINITY.to_string(), "-Infinity");
    }

    #[test]
    fn test_parse_literals() {
        assert!(Decimal128::parse("NaN").unwrap().is_nan());
        assert!(Decimal128::parse("-Infinity").unwrap().is_infinity());
        let d = Decimal128::parse("12.30").unwrap();
        assert_eq!(d.to_decimal().unwrap(), Decimal::from_str("12.30").unwrap());
        let d = Decimal128::parse("5E+3").unwrap();
        assert_eq!(d.to_string(), "5E+3");
        assert!(Decimal128::parse("abc").is_err());
    }

    #[test]
    fn test_exponent_out_of_decimal_range() {
        // 10^-40 的系数无法去零规约,超出 Decimal 的 28 位小数限制
        let d = Decimal128::from_parts(false, -40, 7).unwrap();
        assert!(matches!(
            d.to_decimal(),
            Err(BsonError::Overflow { .. })
        ));
        // 尾部零可以规约
        let d = Decimal128::from_parts(false, -30, 700).unwrap();
        assert_eq!(
            d.to_decimal().unwrap(),
            Decimal::from_i128_with_scale(7, 28)
        );
    }

    #[test]
    fn test_zero_display() {
        assert_eq!(Decimal128::ZERO.to_string(), "0");
        assert!(Decimal128::ZERO.is_zero());
    }
}
