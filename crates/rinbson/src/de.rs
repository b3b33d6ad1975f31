//! serde 反序列化桥接模块
//!
//! 把 `BsonValue` 树还原成任意实现 `serde::Deserialize` 的 Rust 类型。
//!
//! 数值读取是宽容的: Int32/Int64 互相补位,浮点可从整数提升;
//! 超出目标范围仍然报错。Binary 读作字节串时忽略子类型,
//! DateTime 可读作 Int64 毫秒数。

use crate::value::BsonValue;
use crate::BsonError;
use compact_str::CompactString;
use serde::de::{self, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

pub struct Deserializer<'de> {
    input: &'de BsonValue,
}

impl<'de> Deserializer<'de> {
    pub fn from_bson(input: &'de BsonValue) -> Self {
        Deserializer { input }
    }
}

/// 把一个 BsonValue 解码为 serde 可反序列化类型
pub fn from_bson<'a, T: Deserialize<'a>>(value: &'a BsonValue) -> Result<T, BsonError> {
    let deserializer = Deserializer::from_bson(value);
    T::deserialize(deserializer)
}

impl de::Error for BsonError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        BsonError::Deserialization(msg.to_string())
    }
}

impl<'de> de::Deserializer<'de> for Deserializer<'de> {
    type Error = BsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Null | BsonValue::Undefined => visitor.visit_unit(),
            BsonValue::Boolean(b) => visitor.visit_bool(*b),
            BsonValue::Int32(n) => visitor.visit_i32(*n),
            BsonValue::Int64(n) => visitor.visit_i64(*n),
            BsonValue::Double(n) => visitor.visit_f64(*n),
            BsonValue::String(s) | BsonValue::Symbol(s) => visitor.visit_str(s.as_str()),
            BsonValue::Binary(b) => visitor.visit_bytes(&b.bytes),
            BsonValue::DateTime(dt) => visitor.visit_i64(dt.timestamp_millis()),
            BsonValue::Array(arr) => visitor.visit_seq(SeqDeserializer::new(arr.iter())),
            BsonValue::Document(doc) => visitor.visit_map(MapDeserializer::new(doc.iter())),
            _ => Err(BsonError::Deserialization(format!(
                "Cannot deserialize {} as any",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Boolean(b) => visitor.visit_bool(*b),
            _ => Err(BsonError::Deserialization(format!(
                "Expected boolean, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i32(visitor)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_i32(visitor)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Int32(n) => visitor.visit_i32(*n),
            BsonValue::Int64(n) => visitor.visit_i64(*n),
            _ => Err(BsonError::Deserialization(format!(
                "Expected integer, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Int32(n) => visitor.visit_i64(*n as i64),
            BsonValue::Int64(n) => visitor.visit_i64(*n),
            BsonValue::DateTime(dt) => visitor.visit_i64(dt.timestamp_millis()),
            _ => Err(BsonError::Deserialization(format!(
                "Expected integer, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u32(visitor)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_u32(visitor)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Int32(n) if *n >= 0 => visitor.visit_u32(*n as u32),
            BsonValue::Int64(n) if *n >= 0 && *n <= u32::MAX as i64 => {
                visitor.visit_u32(*n as u32)
            }
            _ => Err(BsonError::Deserialization(format!(
                "Expected unsigned integer, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Int32(n) if *n >= 0 => visitor.visit_u64(*n as u64),
            BsonValue::Int64(n) if *n >= 0 => visitor.visit_u64(*n as u64),
            BsonValue::Timestamp(n) => visitor.visit_u64(*n),
            _ => Err(BsonError::Deserialization(format!(
                "Expected unsigned integer, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Double(n) => visitor.visit_f32(*n as f32),
            BsonValue::Int32(n) => visitor.visit_f32(*n as f32),
            _ => Err(BsonError::Deserialization(format!(
                "Expected float, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Double(n) => visitor.visit_f64(*n),
            BsonValue::Int32(n) => visitor.visit_f64(*n as f64),
            BsonValue::Int64(n) => visitor.visit_f64(*n as f64),
            _ => Err(BsonError::Deserialization(format!(
                "Expected float, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::String(s) if s.chars().count() == 1 => {
                // 上面的分支保证恰有一个字符
                visitor.visit_char(s.chars().next().unwrap())
            }
            _ => Err(BsonError::Deserialization(format!(
                "Expected char, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::String(s) | BsonValue::Symbol(s) => visitor.visit_str(s.as_str()),
            _ => Err(BsonError::Deserialization(format!(
                "Expected string, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Binary(b) => visitor.visit_bytes(&b.bytes),
            _ => Err(BsonError::Deserialization(format!(
                "Expected binary, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Null | BsonValue::Undefined => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Null | BsonValue::Undefined => visitor.visit_unit(),
            _ => Err(BsonError::Deserialization(format!(
                "Expected null, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Array(arr) => visitor.visit_seq(SeqDeserializer::new(arr.iter())),
            _ => Err(BsonError::Deserialization(format!(
                "Expected array, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::Document(doc) => visitor.visit_map(MapDeserializer::new(doc.iter())),
            _ => Err(BsonError::Deserialization(format!(
                "Expected document, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.input {
            BsonValue::String(s) => visitor.visit_enum(s.as_str().into_deserializer()),
            BsonValue::Document(doc) if doc.len() == 1 => {
                let (key, value) = match doc.iter().next() {
                    Some(entry) => entry,
                    None => unreachable!(),
                };
                visitor.visit_enum(EnumDeserializer {
                    variant: key.as_str(),
                    value,
                })
            }
            _ => Err(BsonError::Deserialization(format!(
                "Expected string or single-entry document for enum, got {}",
                self.input.type_name()
            ))),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

struct SeqDeserializer<'de, I> {
    iter: I,
    _marker: std::marker::PhantomData<&'de ()>,
}

impl<'de, I: Iterator<Item = &'de BsonValue>> SeqDeserializer<'de, I> {
    fn new(iter: I) -> Self {
        Self {
            iter,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'de, I: Iterator<Item = &'de BsonValue>> SeqAccess<'de> for SeqDeserializer<'de, I> {
    type Error = BsonError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.iter.next() {
            Some(value) => seed.deserialize(Deserializer::from_bson(value)).map(Some),
            None => Ok(None),
        }
    }
}

struct MapDeserializer<'de, I> {
    iter: I,
    value: Option<&'de BsonValue>,
    _marker: std::marker::PhantomData<&'de ()>,
}

impl<'de, I: Iterator<Item = (&'de CompactString, &'de BsonValue)>> MapDeserializer<'de, I> {
    fn new(iter: I) -> Self {
        Self {
            iter,
            value: None,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'de, I: Iterator<Item = (&'de CompactString, &'de BsonValue)>> MapAccess<'de>
    for MapDeserializer<'de, I>
{
    type Error = BsonError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(key.as_str().into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let value = self
            .value
            .take()
            .ok_or_else(|| BsonError::Deserialization("No value".to_string()))?;
        seed.deserialize(Deserializer::from_bson(value))
    }
}

struct EnumDeserializer<'de> {
    variant: &'de str,
    value: &'de BsonValue,
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer<'de> {
    type Error = BsonError;
    type Variant = VariantDeserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        use serde::de::value::StrDeserializer;
        let deserializer: StrDeserializer<'de, BsonError> = self.variant.into_deserializer();
        let variant: V::Value = seed.deserialize(deserializer)?;
        Ok((variant, VariantDeserializer { value: self.value }))
    }
}

struct VariantDeserializer<'de> {
    value: &'de BsonValue,
}

impl<'de> de::VariantAccess<'de> for VariantDeserializer<'de> {
    type Error = BsonError;

    fn unit_variant(self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        seed.deserialize(Deserializer::from_bson(self.value))
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        de::Deserializer::deserialize_seq(Deserializer::from_bson(self.value), visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        de::Deserializer::deserialize_map(Deserializer::from_bson(self.value), visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        score: i32,
        active: bool,
        tags: Vec<String>,
        nickname: Option<String>,
    }

    #[test]
    fn test_roundtrip_struct() {
        let original = Profile {
            name: "rin".to_string(),
            score: 42,
            active: true,
            tags: vec!["x".to_string()],
            nickname: None,
        };
        let value = crate::ser::to_bson(&original).unwrap();
        let restored: Profile = from_bson(&value).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_integer_widening_and_narrowing() {
        let wide: i64 = from_bson(&bson!(7)).unwrap();
        assert_eq!(wide, 7);
        let narrow: i32 = from_bson(&bson!(7i64)).unwrap();
        assert_eq!(narrow, 7);
        assert!(from_bson::<i32>(&bson!(i64::MAX)).is_err());
    }

    #[test]
    fn test_float_from_integer() {
        let f: f64 = from_bson(&bson!(3)).unwrap();
        assert_eq!(f, 3.0);
    }

    #[test]
    fn test_enum_forms() {
        #[derive(Debug, PartialEq, Deserialize)]
        enum Shape {
            Point,
            Circle(f64),
            Rect { w: i32, h: i32 },
        }
        assert_eq!(from_bson::<Shape>(&bson!("Point")).unwrap(), Shape::Point);
        assert_eq!(
            from_bson::<Shape>(&bson!({ "Circle": 2.0 })).unwrap(),
            Shape::Circle(2.0)
        );
        assert_eq!(
            from_bson::<Shape>(&bson!({ "Rect": { "w": 1, "h": 2 } })).unwrap(),
            Shape::Rect { w: 1, h: 2 }
        );
    }

    #[test]
    fn test_option_from_null_and_undefined() {
        assert_eq!(from_bson::<Option<i32>>(&bson!(null)).unwrap(), None);
        assert_eq!(
            from_bson::<Option<i32>>(&BsonValue::Undefined).unwrap(),
            None
        );
        assert_eq!(from_bson::<Option<i32>>(&bson!(5)).unwrap(), Some(5));
    }

    #[test]
    fn test_type_mismatch_reports_name() {
        let err = from_bson::<bool>(&bson!(1)).unwrap_err();
        assert!(err.to_string().contains("int32"));
    }
}
