//! 标量序列化器
//!
//! 布尔、字符串、正则、版本号以及枚举的序列化实现。

use crate::reader::BsonReader;
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::ElementType;
use crate::value::RegexValue;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use rinbson_common::{ObjectId, Version};
use std::marker::PhantomData;

fn wrong_tag(tag: Option<ElementType>, target: &'static str) -> BsonError {
    match tag {
        Some(tag) => BsonError::Format(format!("Cannot deserialize {} from {}", target, tag)),
        None => BsonError::Format("No pending element".to_string()),
    }
}

/// 布尔序列化器
///
/// 反序列化接受数值标记,非零即真
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BooleanSerializer {
    representation: ElementType,
}

impl BooleanSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Boolean
            | ElementType::Int32
            | ElementType::Int64
            | ElementType::Double
            | ElementType::String => Ok(Self { representation }),
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for bool",
                other
            ))),
        }
    }
}

impl Default for BooleanSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::Boolean,
        }
    }
}

impl BsonSerializer<bool> for BooleanSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &bool) -> BsonResult<()> {
        match self.representation {
            ElementType::Boolean => writer.write_boolean(*value),
            ElementType::Int32 => writer.write_int32(i32::from(*value)),
            ElementType::Int64 => writer.write_int64(i64::from(*value)),
            ElementType::Double => writer.write_double(if *value { 1.0 } else { 0.0 }),
            ElementType::String => writer.write_string(if *value { "true" } else { "false" }),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<bool> {
        match reader.current_type() {
            Some(ElementType::Boolean) => reader.read_boolean(),
            Some(ElementType::Int32) => Ok(reader.read_int32()? != 0),
            Some(ElementType::Int64) => Ok(reader.read_int64()? != 0),
            Some(ElementType::Double) => Ok(reader.read_double()? != 0.0),
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                match text.as_str() {
                    "true" => Ok(true),
                    "false" => Ok(false),
                    other => Err(BsonError::Deserialization(format!(
                        "Invalid bool string {:?}",
                        other
                    ))),
                }
            }
            other => Err(wrong_tag(other, "bool")),
        }
    }
}

impl HasSerializer for bool {
    type Serializer = BooleanSerializer;

    fn serializer() -> Self::Serializer {
        BooleanSerializer::default()
    }
}

/// 字符串序列化器
///
/// ObjectId 表示要求值是 24 位十六进制文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSerializer {
    representation: ElementType,
}

impl StringSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::String
            | ElementType::Symbol
            | ElementType::ObjectId
            | ElementType::Int32
            | ElementType::Int64 => Ok(Self { representation }),
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for String",
                other
            ))),
        }
    }
}

impl Default for StringSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::String,
        }
    }
}

impl BsonSerializer<String> for StringSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &String) -> BsonResult<()> {
        match self.representation {
            ElementType::String => writer.write_string(value),
            ElementType::Symbol => writer.write_symbol(value),
            ElementType::ObjectId => {
                let id = ObjectId::from_hex(value).map_err(|e| {
                    BsonError::Serialization(format!("Invalid ObjectId string {:?}: {}", value, e))
                })?;
                writer.write_object_id(&id)
            }
            ElementType::Int32 => {
                let parsed: i32 = value.parse().map_err(|e| {
                    BsonError::Serialization(format!("Invalid Int32 string {:?}: {}", value, e))
                })?;
                writer.write_int32(parsed)
            }
            ElementType::Int64 => {
                let parsed: i64 = value.parse().map_err(|e| {
                    BsonError::Serialization(format!("Invalid Int64 string {:?}: {}", value, e))
                })?;
                writer.write_int64(parsed)
            }
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<String> {
        match reader.current_type() {
            Some(ElementType::String) => Ok(reader.read_string()?.into()),
            Some(ElementType::Symbol) => Ok(reader.read_symbol()?.into()),
            Some(ElementType::ObjectId) => Ok(reader.read_object_id()?.to_hex()),
            Some(ElementType::Int32) => Ok(reader.read_int32()?.to_string()),
            Some(ElementType::Int64) => Ok(reader.read_int64()?.to_string()),
            other => Err(wrong_tag(other, "String")),
        }
    }
}

impl HasSerializer for String {
    type Serializer = StringSerializer;

    fn serializer() -> Self::Serializer {
        StringSerializer::default()
    }
}

/// 正则表达式序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegexSerializer;

impl BsonSerializer<RegexValue> for RegexSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &RegexValue) -> BsonResult<()> {
        writer.write_regex(value)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<RegexValue> {
        match reader.current_type() {
            Some(ElementType::RegularExpression) => reader.read_regex(),
            // 裸字符串当作无选项的模式
            Some(ElementType::String) => Ok(RegexValue::new(reader.read_string()?, "")),
            other => Err(wrong_tag(other, "RegexValue")),
        }
    }
}

impl HasSerializer for RegexValue {
    type Serializer = RegexSerializer;

    fn serializer() -> Self::Serializer {
        RegexSerializer
    }
}

/// 版本号序列化器
///
/// String 表示写 `major.minor[.build[.revision]]`,
/// Document 表示写逐字段的 Int32 文档
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSerializer {
    representation: ElementType,
}

impl VersionSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::String | ElementType::Document => Ok(Self { representation }),
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for Version",
                other
            ))),
        }
    }
}

impl Default for VersionSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::String,
        }
    }
}

impl BsonSerializer<Version> for VersionSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Version) -> BsonResult<()> {
        match self.representation {
            ElementType::String => writer.write_string(&value.to_string()),
            ElementType::Document => {
                writer.write_start_document()?;
                writer.write_name("Major")?;
                writer.write_int32(value.major as i32)?;
                writer.write_name("Minor")?;
                writer.write_int32(value.minor as i32)?;
                if let Some(build) = value.build {
                    writer.write_name("Build")?;
                    writer.write_int32(build as i32)?;
                    if let Some(revision) = value.revision {
                        writer.write_name("Revision")?;
                        writer.write_int32(revision as i32)?;
                    }
                }
                writer.write_end_document()
            }
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Version> {
        match reader.current_type() {
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                text.parse().map_err(|e| {
                    BsonError::Deserialization(format!("Invalid version {:?}: {}", text, e))
                })
            }
            Some(ElementType::Document) => {
                reader.read_start_document()?;
                let mut major = None;
                let mut minor = None;
                let mut build = None;
                let mut revision = None;
                while reader.read_element_type()?.is_some() {
                    let name = reader.read_name()?;
                    let value = reader.read_int32()? as u32;
                    match name.as_str() {
                        "Major" => major = Some(value),
                        "Minor" => minor = Some(value),
                        "Build" => build = Some(value),
                        "Revision" => revision = Some(value),
                        other => {
                            return Err(BsonError::Deserialization(format!(
                                "Unexpected version field {:?}",
                                other
                            )))
                        }
                    }
                }
                reader.read_end_document()?;
                match (major, minor) {
                    (Some(major), Some(minor)) => Ok(Version {
                        major,
                        minor,
                        build,
                        revision,
                    }),
                    _ => Err(BsonError::Deserialization(
                        "Version document missing Major or Minor".to_string(),
                    )),
                }
            }
            other => Err(wrong_tag(other, "Version")),
        }
    }
}

impl HasSerializer for Version {
    type Serializer = VersionSerializer;

    fn serializer() -> Self::Serializer {
        VersionSerializer::default()
    }
}

/// 可做 BSON 枚举的类型
///
/// # Brief
/// 提供底层整数值和名称两种映射,分别服务整数表示和
/// 字符串表示
pub trait BsonEnum: Copy + Send + Sync + 'static {
    fn to_i32(self) -> i32;
    fn from_i32(value: i32) -> BsonResult<Self>;
    fn name(self) -> &'static str;
    fn from_name(name: &str) -> BsonResult<Self>;
}

/// 枚举序列化器
pub struct EnumSerializer<E> {
    representation: ElementType,
    _marker: PhantomData<fn() -> E>,
}

impl<E: BsonEnum> EnumSerializer<E> {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Int32 | ElementType::Int64 | ElementType::String => Ok(Self {
                representation,
                _marker: PhantomData,
            }),
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for an enum",
                other
            ))),
        }
    }
}

impl<E> Default for EnumSerializer<E> {
    fn default() -> Self {
        Self {
            representation: ElementType::Int32,
            _marker: PhantomData,
        }
    }
}

impl<E> Clone for EnumSerializer<E> {
    fn clone(&self) -> Self {
        Self {
            representation: self.representation,
            _marker: PhantomData,
        }
    }
}

impl<E> PartialEq for EnumSerializer<E> {
    fn eq(&self, other: &Self) -> bool {
        self.representation == other.representation
    }
}

impl<E: BsonEnum> BsonSerializer<E> for EnumSerializer<E> {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &E) -> BsonResult<()> {
        match self.representation {
            ElementType::Int32 => writer.write_int32(value.to_i32()),
            ElementType::Int64 => writer.write_int64(i64::from(value.to_i32())),
            ElementType::String => writer.write_string(value.name()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<E> {
        match reader.current_type() {
            Some(ElementType::Int32) => E::from_i32(reader.read_int32()?),
            Some(ElementType::Int64) => {
                let wide = reader.read_int64()?;
                let narrow = i32::try_from(wide).map_err(|_| BsonError::Overflow {
                    value: wide.to_string(),
                    target: "i32",
                })?;
                E::from_i32(narrow)
            }
            Some(ElementType::String) => E::from_name(&reader.read_string()?),
            other => Err(wrong_tag(other, "enum")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DocumentReader;
    use crate::value::BsonValue;
    use crate::writer::DocumentWriter;
    use crate::{bson, doc};

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
    fn test_boolean_flexible_reads() {
        let s = BooleanSerializer::default();
        assert!(read_with(&s, &BsonValue::Int32(2)).unwrap());
        assert!(!read_with(&s, &BsonValue::Double(0.0)).unwrap());
        assert!(read_with(&s, &BsonValue::String("true".into())).unwrap());
        assert!(read_with(&s, &BsonValue::String("yes".into())).is_err());
    }

    #[test]
    fn test_string_object_id_representation() {
        let s = StringSerializer::with_representation(ElementType::ObjectId).unwrap();
        let hex = "0102030405060708090a0b0c".to_string();
        let written = write_with(&s, &hex);
        assert!(matches!(written, BsonValue::ObjectId(_)));
        assert_eq!(read_with(&s, &written).unwrap(), hex);
        let mut writer = DocumentWriter::new();
        assert!(s.serialize(&mut writer, &"not-hex".to_string()).is_err());
    }

    #[test]
    fn test_string_int64_representation() {
        let s = StringSerializer::with_representation(ElementType::Int64).unwrap();
        let text = "9007199254740993".to_string();
        let written = write_with(&s, &text);
        assert_eq!(written, BsonValue::Int64(9007199254740993));
        assert_eq!(read_with(&s, &written).unwrap(), text);
        let mut writer = DocumentWriter::new();
        assert!(s.serialize(&mut writer, &"twelve".to_string()).is_err());
    }

    #[test]
    fn test_regex_from_bare_string() {
        let s = RegexSerializer;
        let value = read_with(&s, &BsonValue::String("^x$".into())).unwrap();
        assert_eq!(value, RegexValue::new("^x$", ""));
    }

    #[test]
    fn test_version_string_roundtrip() {
        let s = VersionSerializer::default();
        let v: Version = "1.2.3".parse().unwrap();
        let written = write_with(&s, &v);
        assert_eq!(written, BsonValue::String("1.2.3".into()));
        assert_eq!(read_with(&s, &written).unwrap(), v);
    }

    #[test]
    fn test_version_document_representation() {
        let s = VersionSerializer::with_representation(ElementType::Document).unwrap();
        let v: Version = "4.2.0.18".parse().unwrap();
        let written = write_with(&s, &v);
        assert_eq!(
            written,
            bson!({ "Major": 4, "Minor": 2, "Build": 0, "Revision": 18 })
        );
        assert_eq!(read_with(&s, &written).unwrap(), v);
        assert!(read_with(&s, &doc! { "Major": 1 }.to_value()).is_err());
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Color {
        Red,
        Green,
    }

    impl BsonEnum for Color {
        fn to_i32(self) -> i32 {
            match self {
                Color::Red => 0,
                Color::Green => 1,
            }
        }

        fn from_i32(value: i32) -> BsonResult<Self> {
            match value {
                0 => Ok(Color::Red),
                1 => Ok(Color::Green),
                other => Err(BsonError::Deserialization(format!(
                    "Invalid Color value {}",
                    other
                ))),
            }
        }

        fn name(self) -> &'static str {
            match self {
                Color::Red => "Red",
                Color::Green => "Green",
            }
        }

        fn from_name(name: &str) -> BsonResult<Self> {
            match name {
                "Red" => Ok(Color::Red),
                "Green" => Ok(Color::Green),
                other => Err(BsonError::Deserialization(format!(
                    "Invalid Color name {:?}",
                    other
                ))),
            }
        }
    }

    #[test]
    fn test_enum_representations() {
        let int = EnumSerializer::<Color>::default();
        assert_eq!(write_with(&int, &Color::Green), BsonValue::Int32(1));
        assert_eq!(read_with(&int, &BsonValue::Int32(0)).unwrap(), Color::Red);

        let string = EnumSerializer::<Color>::with_representation(ElementType::String).unwrap();
        assert_eq!(write_with(&string, &Color::Red), BsonValue::String("Red".into()));
        assert_eq!(
            read_with(&string, &BsonValue::String("Green".into())).unwrap(),
            Color::Green
        );
        assert!(read_with(&int, &BsonValue::Int32(9)).is_err());
    }
}
