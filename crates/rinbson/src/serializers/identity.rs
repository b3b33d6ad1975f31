//! 标识类型序列化器
//!
//! ObjectId 与 UUID。UUID 的二进制布局历史上有多种驱动方言,
//! `GuidRepresentation` 枚举逐一支持: Standard 使用 RFC 4122
//! 字节序和子类型 0x04,三种 legacy 方言使用子类型 0x03 并各自
//! 调换字节序。读取时子类型必须与配置的方言一致。

use crate::reader::BsonReader;
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::{BinarySubtype, ElementType};
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use rinbson_common::ObjectId;
use uuid::Uuid;

fn wrong_tag(tag: Option<ElementType>, target: &'static str) -> BsonError {
    match tag {
        Some(tag) => BsonError::Format(format!("Cannot deserialize {} from {}", target, tag)),
        None => BsonError::Format("No pending element".to_string()),
    }
}

/// ObjectId 序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectIdSerializer {
    representation: ElementType,
}

impl ObjectIdSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::ObjectId | ElementType::String => Ok(Self { representation }),
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for ObjectId",
                other
            ))),
        }
    }
}

impl Default for ObjectIdSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::ObjectId,
        }
    }
}

impl BsonSerializer<ObjectId> for ObjectIdSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &ObjectId) -> BsonResult<()> {
        match self.representation {
            ElementType::ObjectId => writer.write_object_id(value),
            ElementType::String => writer.write_string(&value.to_hex()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<ObjectId> {
        match reader.current_type() {
            Some(ElementType::ObjectId) => reader.read_object_id(),
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                ObjectId::from_hex(&text).map_err(|e| {
                    BsonError::Deserialization(format!("Invalid ObjectId string {:?}: {}", text, e))
                })
            }
            other => Err(wrong_tag(other, "ObjectId")),
        }
    }
}

impl HasSerializer for ObjectId {
    type Serializer = ObjectIdSerializer;

    fn serializer() -> Self::Serializer {
        ObjectIdSerializer::default()
    }
}

/// UUID 二进制方言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidRepresentation {
    /// 构造期合法,但序列化前必须改为具体方言
    Unspecified,
    /// RFC 4122 字节序,子类型 0x04
    Standard,
    /// 前三段按小端存放,子类型 0x03
    CSharpLegacy,
    /// 前后各 8 字节分别反转,子类型 0x03
    JavaLegacy,
    /// RFC 4122 字节序但使用子类型 0x03
    PythonLegacy,
}

impl GuidRepresentation {
    fn subtype(self) -> BsonResult<BinarySubtype> {
        match self {
            GuidRepresentation::Standard => Ok(BinarySubtype::Uuid),
            GuidRepresentation::CSharpLegacy
            | GuidRepresentation::JavaLegacy
            | GuidRepresentation::PythonLegacy => Ok(BinarySubtype::UuidLegacy),
            GuidRepresentation::Unspecified => Err(BsonError::Configuration(
                "GuidRepresentation is unspecified".to_string(),
            )),
        }
    }

    fn to_bytes(self, uuid: &Uuid) -> BsonResult<[u8; 16]> {
        let mut bytes = *uuid.as_bytes();
        match self {
            GuidRepresentation::Standard | GuidRepresentation::PythonLegacy => {}
            GuidRepresentation::CSharpLegacy => {
                bytes[0..4].reverse();
                bytes[4..6].reverse();
                bytes[6..8].reverse();
            }
            GuidRepresentation::JavaLegacy => {
                bytes[0..8].reverse();
                bytes[8..16].reverse();
            }
            GuidRepresentation::Unspecified => {
                return Err(BsonError::Configuration(
                    "GuidRepresentation is unspecified".to_string(),
                ))
            }
        }
        Ok(bytes)
    }

    fn from_bytes(self, mut bytes: [u8; 16]) -> BsonResult<Uuid> {
        match self {
            GuidRepresentation::Standard | GuidRepresentation::PythonLegacy => {}
            GuidRepresentation::CSharpLegacy => {
                bytes[0..4].reverse();
                bytes[4..6].reverse();
                bytes[6..8].reverse();
            }
            GuidRepresentation::JavaLegacy => {
                bytes[0..8].reverse();
                bytes[8..16].reverse();
            }
            GuidRepresentation::Unspecified => {
                return Err(BsonError::Configuration(
                    "GuidRepresentation is unspecified".to_string(),
                ))
            }
        }
        Ok(Uuid::from_bytes(bytes))
    }
}

/// UUID 序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidSerializer {
    representation: ElementType,
    guid_representation: GuidRepresentation,
}

impl UuidSerializer {
    pub fn new(guid_representation: GuidRepresentation) -> Self {
        Self {
            representation: ElementType::Binary,
            guid_representation,
        }
    }

    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::Binary | ElementType::String => Ok(Self {
                representation,
                guid_representation: GuidRepresentation::Standard,
            }),
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for Uuid",
                other
            ))),
        }
    }

    pub fn guid_representation(&self) -> GuidRepresentation {
        self.guid_representation
    }
}

impl Default for UuidSerializer {
    fn default() -> Self {
        Self::new(GuidRepresentation::Standard)
    }
}

impl BsonSerializer<Uuid> for UuidSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Uuid) -> BsonResult<()> {
        match self.representation {
            ElementType::Binary => {
                let subtype = self.guid_representation.subtype()?;
                let bytes = self.guid_representation.to_bytes(value)?;
                writer.write_binary(subtype, &bytes)
            }
            ElementType::String => writer.write_string(&value.hyphenated().to_string()),
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Uuid> {
        match reader.current_type() {
            Some(ElementType::Binary) => {
                let binary = reader.read_binary()?;
                let expected = self.guid_representation.subtype()?;
                if binary.subtype != expected {
                    return Err(BsonError::Format(format!(
                        "UUID binary subtype mismatch: expected {:?}, got {:?}",
                        expected, binary.subtype
                    )));
                }
                let bytes: [u8; 16] = binary.bytes.as_slice().try_into().map_err(|_| {
                    BsonError::Format(format!(
                        "UUID binary must be 16 bytes, got {}",
                        binary.bytes.len()
                    ))
                })?;
                self.guid_representation.from_bytes(bytes)
            }
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                Uuid::parse_str(&text).map_err(|e| {
                    BsonError::Deserialization(format!("Invalid UUID string {:?}: {}", text, e))
                })
            }
            other => Err(wrong_tag(other, "Uuid")),
        }
    }
}

impl HasSerializer for Uuid {
    type Serializer = UuidSerializer;

    fn serializer() -> Self::Serializer {
        UuidSerializer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DocumentReader;
    use crate::value::{Binary, BsonValue};
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

    fn sample() -> Uuid {
        Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap()
    }

    #[test]
    fn test_object_id_string_representation() {
        let s = ObjectIdSerializer::with_representation(ElementType::String).unwrap();
        let id = ObjectId::from_bytes([0xab; 12]);
        let written = write_with(&s, &id);
        assert_eq!(written, BsonValue::String(id.to_hex().into()));
        assert_eq!(read_with(&s, &written).unwrap(), id);
    }

    #[test]
    fn test_uuid_standard_layout() {
        let s = UuidSerializer::default();
        let written = write_with(&s, &sample());
        match &written {
            BsonValue::Binary(b) => {
                assert_eq!(b.subtype, BinarySubtype::Uuid);
                assert_eq!(b.bytes, sample().as_bytes().to_vec());
            }
            other => panic!("expected binary, got {:?}", other),
        }
        assert_eq!(read_with(&s, &written).unwrap(), sample());
    }

    #[test]
    fn test_uuid_csharp_legacy_layout() {
        let s = UuidSerializer::new(GuidRepresentation::CSharpLegacy);
        let written = write_with(&s, &sample());
        match &written {
            BsonValue::Binary(b) => {
                assert_eq!(b.subtype, BinarySubtype::UuidLegacy);
                assert_eq!(
                    b.bytes,
                    vec![
                        0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb,
                        0xcc, 0xdd, 0xee, 0xff
                    ]
                );
            }
            other => panic!("expected binary, got {:?}", other),
        }
        assert_eq!(read_with(&s, &written).unwrap(), sample());
    }

    #[test]
    fn test_uuid_java_legacy_roundtrip() {
        let s = UuidSerializer::new(GuidRepresentation::JavaLegacy);
        let written = write_with(&s, &sample());
        assert_eq!(read_with(&s, &written).unwrap(), sample());
    }

    #[test]
    fn test_uuid_subtype_mismatch_rejected() {
        let s = UuidSerializer::default();
        let legacy = BsonValue::Binary(Binary {
            subtype: BinarySubtype::UuidLegacy,
            bytes: vec![0; 16],
        });
        assert!(matches!(
            read_with(&s, &legacy),
            Err(BsonError::Format(_))
        ));
    }

    #[test]
    fn test_unspecified_representation_rejected() {
        let s = UuidSerializer::new(GuidRepresentation::Unspecified);
        let mut writer = DocumentWriter::new();
        assert!(matches!(
            s.serialize(&mut writer, &sample()),
            Err(BsonError::Configuration(_))
        ));
    }
}
