//! 数值序列化器
//!
//! 每个数值序列化器由两部分配置组成: 线上表示(写出时用哪个
//! BSON 标记)和表示转换器(跨表示换算时的溢出/截断策略)。
//! 反序列化是宽容的: 不论配置的表示是什么,遇到任何数值标记
//! 都尝试经转换器读入,标记完全不是数值时才报格式错误。

use crate::convert::RepresentationConverter;
use crate::decimal128::Decimal128;
use crate::reader::BsonReader;
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::ElementType;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use half::f16;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

fn invalid_representation(rep: ElementType, target: &'static str) -> BsonError {
    BsonError::Configuration(format!(
        "{} is not a valid representation for {}",
        rep, target
    ))
}

fn not_numeric(tag: Option<ElementType>, target: &'static str) -> BsonError {
    match tag {
        Some(tag) => BsonError::Format(format!("Cannot deserialize {} from {}", target, tag)),
        None => BsonError::Format("No pending element".to_string()),
    }
}

/// i32 序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int32Serializer {
    representation: ElementType,
    converter: RepresentationConverter,
}

impl Int32Serializer {
    /// 指定线上表示
    ///
    /// # Brief
    /// 允许 Int32 / Int64 / Double / Decimal128 / String
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Int32
            | ElementType::Int64
            | ElementType::Double
            | ElementType::Decimal128
            | ElementType::String => Ok(Self {
                representation,
                converter: RepresentationConverter::STRICT,
            }),
            other => Err(invalid_representation(other, "i32")),
        }
    }

    pub fn with_converter(mut self, converter: RepresentationConverter) -> Self {
        self.converter = converter;
        self
    }
}

impl Default for Int32Serializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Int32,
            converter: RepresentationConverter::STRICT,
        }
    }
}

impl BsonSerializer<i32> for Int32Serializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &i32) -> BsonResult<()> {
        match self.representation {
            ElementType::Int32 => writer.write_int32(*value),
            ElementType::Int64 => writer.write_int64(i64::from(*value)),
            ElementType::Double => writer.write_double(f64::from(*value)),
            ElementType::Decimal128 => {
                writer.write_decimal128(self.converter.int32_to_decimal128(*value)?)
            }
            ElementType::String => writer.write_string(&value.to_string()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<i32> {
        match reader.current_type() {
            Some(ElementType::Int32) => reader.read_int32(),
            Some(ElementType::Int64) => self.converter.int64_to_int32(reader.read_int64()?),
            Some(ElementType::Double) => self.converter.double_to_int32(reader.read_double()?),
            Some(ElementType::Decimal128) => {
                self.converter.decimal128_to_int32(reader.read_decimal128()?)
            }
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                text.parse().map_err(|e| {
                    BsonError::Deserialization(format!("Invalid i32 string {:?}: {}", text, e))
                })
            }
            other => Err(not_numeric(other, "i32")),
        }
    }
}

impl HasSerializer for i32 {
    type Serializer = Int32Serializer;

    fn serializer() -> Self::Serializer {
        Int32Serializer::default()
    }
}

/// i64 序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int64Serializer {
    representation: ElementType,
    converter: RepresentationConverter,
}

impl Int64Serializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Int32
            | ElementType::Int64
            | ElementType::Double
            | ElementType::Decimal128
            | ElementType::String => Ok(Self {
                representation,
                converter: RepresentationConverter::STRICT,
            }),
            other => Err(invalid_representation(other, "i64")),
        }
    }

    pub fn with_converter(mut self, converter: RepresentationConverter) -> Self {
        self.converter = converter;
        self
    }
}

impl Default for Int64Serializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Int64,
            converter: RepresentationConverter::STRICT,
        }
    }
}

impl BsonSerializer<i64> for Int64Serializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &i64) -> BsonResult<()> {
        match self.representation {
            ElementType::Int32 => writer.write_int32(self.converter.int64_to_int32(*value)?),
            ElementType::Int64 => writer.write_int64(*value),
            ElementType::Double => writer.write_double(self.converter.int64_to_double(*value)?),
            ElementType::Decimal128 => {
                writer.write_decimal128(self.converter.int64_to_decimal128(*value)?)
            }
            ElementType::String => writer.write_string(&value.to_string()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<i64> {
        match reader.current_type() {
            Some(ElementType::Int32) => Ok(i64::from(reader.read_int32()?)),
            Some(ElementType::Int64) => reader.read_int64(),
            Some(ElementType::Double) => self.converter.double_to_int64(reader.read_double()?),
            Some(ElementType::Decimal128) => {
                self.converter.decimal128_to_int64(reader.read_decimal128()?)
            }
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                text.parse().map_err(|e| {
                    BsonError::Deserialization(format!("Invalid i64 string {:?}: {}", text, e))
                })
            }
            other => Err(not_numeric(other, "i64")),
        }
    }
}

impl HasSerializer for i64 {
    type Serializer = Int64Serializer;

    fn serializer() -> Self::Serializer {
        Int64Serializer::default()
    }
}

/// f64 序列化器
///
/// String 表示下非有限值写出 `NaN` / `Infinity` / `-Infinity` 字面量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleSerializer {
    representation: ElementType,
    converter: RepresentationConverter,
}

impl DoubleSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Int32
            | ElementType::Int64
            | ElementType::Double
            | ElementType::Decimal128
            | ElementType::String => Ok(Self {
                representation,
                converter: RepresentationConverter::STRICT,
            }),
            other => Err(invalid_representation(other, "f64")),
        }
    }

    pub fn with_converter(mut self, converter: RepresentationConverter) -> Self {
        self.converter = converter;
        self
    }

    fn format(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value == f64::INFINITY {
            "Infinity".to_string()
        } else if value == f64::NEG_INFINITY {
            "-Infinity".to_string()
        } else {
            value.to_string()
        }
    }
}

impl Default for DoubleSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Double,
            converter: RepresentationConverter::STRICT,
        }
    }
}

impl BsonSerializer<f64> for DoubleSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &f64) -> BsonResult<()> {
        match self.representation {
            ElementType::Int32 => writer.write_int32(self.converter.double_to_int32(*value)?),
            ElementType::Int64 => writer.write_int64(self.converter.double_to_int64(*value)?),
            ElementType::Double => writer.write_double(*value),
            ElementType::Decimal128 => {
                writer.write_decimal128(self.converter.double_to_decimal128(*value)?)
            }
            ElementType::String => writer.write_string(&Self::format(*value)),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<f64> {
        match reader.current_type() {
            Some(ElementType::Int32) => Ok(f64::from(reader.read_int32()?)),
            Some(ElementType::Int64) => self.converter.int64_to_double(reader.read_int64()?),
            Some(ElementType::Double) => reader.read_double(),
            Some(ElementType::Decimal128) => {
                self.converter.decimal128_to_double(reader.read_decimal128()?)
            }
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                match text.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "Infinity" => Ok(f64::INFINITY),
                    "-Infinity" => Ok(f64::NEG_INFINITY),
                    other => other.parse().map_err(|e| {
                        BsonError::Deserialization(format!(
                            "Invalid f64 string {:?}: {}",
                            other, e
                        ))
                    }),
                }
            }
            other => Err(not_numeric(other, "f64")),
        }
    }
}

impl HasSerializer for f64 {
    type Serializer = DoubleSerializer;

    fn serializer() -> Self::Serializer {
        DoubleSerializer::default()
    }
}

/// rust_decimal 定点数序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalSerializer {
    representation: ElementType,
    converter: RepresentationConverter,
}

impl DecimalSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Int32
            | ElementType::Int64
            | ElementType::Double
            | ElementType::Decimal128
            | ElementType::String => Ok(Self {
                representation,
                converter: RepresentationConverter::STRICT,
            }),
            other => Err(invalid_representation(other, "Decimal")),
        }
    }

    pub fn with_converter(mut self, converter: RepresentationConverter) -> Self {
        self.converter = converter;
        self
    }
}

impl Default for DecimalSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Decimal128,
            converter: RepresentationConverter::STRICT,
        }
    }
}

impl BsonSerializer<Decimal> for DecimalSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Decimal) -> BsonResult<()> {
        let wide = Decimal128::from_decimal(*value);
        match self.representation {
            ElementType::Int32 => writer.write_int32(self.converter.decimal128_to_int32(wide)?),
            ElementType::Int64 => writer.write_int64(self.converter.decimal128_to_int64(wide)?),
            ElementType::Double => writer.write_double(self.converter.decimal128_to_double(wide)?),
            ElementType::Decimal128 => writer.write_decimal128(wide),
            ElementType::String => writer.write_string(&value.to_string()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Decimal> {
        match reader.current_type() {
            Some(ElementType::Int32) => Ok(Decimal::from(reader.read_int32()?)),
            Some(ElementType::Int64) => Ok(Decimal::from(reader.read_int64()?)),
            Some(ElementType::Double) => {
                let value = reader.read_double()?;
                Decimal::from_f64(value).ok_or_else(|| BsonError::Overflow {
                    value: value.to_string(),
                    target: "Decimal",
                })
            }
            Some(ElementType::Decimal128) => reader.read_decimal128()?.to_decimal(),
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                text.parse().map_err(|e| {
                    BsonError::Deserialization(format!("Invalid decimal string {:?}: {}", text, e))
                })
            }
            other => Err(not_numeric(other, "Decimal")),
        }
    }
}

impl HasSerializer for Decimal {
    type Serializer = DecimalSerializer;

    fn serializer() -> Self::Serializer {
        DecimalSerializer::default()
    }
}

/// Decimal128 序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal128Serializer {
    representation: ElementType,
}

impl Decimal128Serializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Decimal128 | ElementType::String => Ok(Self { representation }),
            other => Err(invalid_representation(other, "Decimal128")),
        }
    }
}

impl Default for Decimal128Serializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Decimal128,
        }
    }
}

impl BsonSerializer<Decimal128> for Decimal128Serializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Decimal128) -> BsonResult<()> {
        match self.representation {
            ElementType::Decimal128 => writer.write_decimal128(*value),
            ElementType::String => writer.write_string(&value.to_string()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Decimal128> {
        match reader.current_type() {
            Some(ElementType::Decimal128) => reader.read_decimal128(),
            Some(ElementType::String) => Decimal128::parse(&reader.read_string()?),
            Some(ElementType::Int32) => {
                RepresentationConverter::STRICT.int32_to_decimal128(reader.read_int32()?)
            }
            Some(ElementType::Int64) => {
                RepresentationConverter::STRICT.int64_to_decimal128(reader.read_int64()?)
            }
            other => Err(not_numeric(other, "Decimal128")),
        }
    }
}

impl HasSerializer for Decimal128 {
    type Serializer = Decimal128Serializer;

    fn serializer() -> Self::Serializer {
        Decimal128Serializer::default()
    }
}

/// 半精度浮点序列化器
///
/// BSON 没有 16 位浮点标记,默认以 Double 存储
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfSerializer {
    representation: ElementType,
    converter: RepresentationConverter,
}

impl HalfSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Double | ElementType::Decimal128 | ElementType::String => Ok(Self {
                representation,
                converter: RepresentationConverter::STRICT,
            }),
            other => Err(invalid_representation(other, "f16")),
        }
    }

    pub fn with_converter(mut self, converter: RepresentationConverter) -> Self {
        self.converter = converter;
        self
    }
}

impl Default for HalfSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Double,
            converter: RepresentationConverter::STRICT,
        }
    }
}

impl BsonSerializer<f16> for HalfSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &f16) -> BsonResult<()> {
        match self.representation {
            ElementType::Double => writer.write_double(value.to_f64()),
            ElementType::Decimal128 => {
                writer.write_decimal128(self.converter.double_to_decimal128(value.to_f64())?)
            }
            ElementType::String => writer.write_string(&DoubleSerializer::format(value.to_f64())),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<f16> {
        match reader.current_type() {
            Some(ElementType::Double) => self.converter.double_to_f16(reader.read_double()?),
            Some(ElementType::Decimal128) => {
                let wide = self.converter.decimal128_to_double(reader.read_decimal128()?)?;
                self.converter.double_to_f16(wide)
            }
            Some(ElementType::Int32) => self.converter.int32_to_f16(reader.read_int32()?),
            Some(ElementType::Int64) => {
                let wide = reader.read_int64()?;
                let narrowed = self.converter.int64_to_double(wide)?;
                self.converter.double_to_f16(narrowed)
            }
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                let value: f64 = match text.as_str() {
                    "NaN" => f64::NAN,
                    "Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    other => other.parse().map_err(|e| {
                        BsonError::Deserialization(format!(
                            "Invalid f16 string {:?}: {}",
                            other, e
                        ))
                    })?,
                };
                self.converter.double_to_f16(value)
            }
            other => Err(not_numeric(other, "f16")),
        }
    }
}

impl HasSerializer for f16 {
    type Serializer = HalfSerializer;

    fn serializer() -> Self::Serializer {
        HalfSerializer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DocumentReader;
    use crate::value::BsonValue;
    use crate::writer::DocumentWriter;

    fn write_with<T>(serializer: &impl BsonSerializer<T>, value: &T) -> BsonValue {
        let mut writer = DocumentWriter::new();
        serializer.serialize(&mut writer, value).unwrap();
        writer.finish().unwrap()
    }

    fn read_with<T>(serializer: &impl BsonSerializer<T>, value: &BsonValue) -> BsonResult<T> {
        let mut reader = DocumentReader::for_value(value);
        serializer.deserialize(&mut reader)
    }

    #[test]
    fn test_int32_default_representation() {
        let s = Int32Serializer::default();
        assert_eq!(write_with(&s, &42), BsonValue::Int32(42));
        assert_eq!(read_with(&s, &BsonValue::Int32(42)).unwrap(), 42);
    }

    #[test]
    fn test_int32_cross_representation_reads() {
        let s = Int32Serializer::default();
        assert_eq!(read_with(&s, &BsonValue::Int64(7)).unwrap(), 7);
        assert_eq!(read_with(&s, &BsonValue::Double(7.0)).unwrap(), 7);
        assert_eq!(read_with(&s, &BsonValue::String("7".into())).unwrap(), 7);
        assert!(matches!(
            read_with(&s, &BsonValue::Double(7.5)),
            Err(BsonError::Truncation { .. })
        ));
        assert!(matches!(
            read_with(&s, &BsonValue::Boolean(true)),
            Err(BsonError::Format(_))
        ));
    }

    #[test]
    fn test_int32_as_string_representation() {
        let s = Int32Serializer::with_representation(ElementType::String).unwrap();
        assert_eq!(write_with(&s, &-7), BsonValue::String("-7".into()));
    }

    #[test]
    fn test_invalid_representation_rejected() {
        assert!(matches!(
            Int32Serializer::with_representation(ElementType::Boolean),
            Err(BsonError::Configuration(_))
        ));
    }

    #[test]
    fn test_int64_to_int32_representation_overflow() {
        let s = Int64Serializer::with_representation(ElementType::Int32).unwrap();
        assert_eq!(write_with(&s, &5), BsonValue::Int32(5));
        let mut writer = DocumentWriter::new();
        assert!(matches!(
            s.serialize(&mut writer, &(i64::MAX)),
            Err(BsonError::Overflow { .. })
        ));
    }

    #[test]
    fn test_double_string_tokens() {
        let s = DoubleSerializer::with_representation(ElementType::String).unwrap();
        assert_eq!(write_with(&s, &f64::INFINITY), BsonValue::String("Infinity".into()));
        assert_eq!(write_with(&s, &f64::NEG_INFINITY), BsonValue::String("-Infinity".into()));
        assert_eq!(write_with(&s, &f64::NAN), BsonValue::String("NaN".into()));
        assert!(read_with(&s, &BsonValue::String("NaN".into()))
            .unwrap()
            .is_nan());
        assert_eq!(
            read_with(&s, &BsonValue::String("-Infinity".into())).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_decimal_roundtrip_through_decimal128() {
        let s = DecimalSerializer::default();
        let value = Decimal::new(-123456, 3);
        let written = write_with(&s, &value);
        assert!(matches!(written, BsonValue::Decimal128(_)));
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }

    #[test]
    fn test_half_roundtrip() {
        let s = HalfSerializer::default();
        let value = f16::from_f64(0.5);
        let written = write_with(&s, &value);
        assert_eq!(written, BsonValue::Double(0.5));
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }

    #[test]
    fn test_half_decimal128_representation() {
        let s = HalfSerializer::with_representation(ElementType::Decimal128).unwrap();
        let value = f16::from_f64(1.5);
        let written = write_with(&s, &value);
        assert!(matches!(written, BsonValue::Decimal128(_)));
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }
}
