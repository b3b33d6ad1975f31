//! 时间序列化器

use crate::reader::BsonReader;
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::ElementType;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use chrono::{DateTime, SecondsFormat, Utc};

/// UTC 时间序列化器
///
/// # Brief
/// 默认以 BSON DateTime(UTC 毫秒)存储;Int64 表示写裸毫秒数,
/// String 表示写 RFC 3339 文本。BSON DateTime 精度为毫秒,
/// 亚毫秒部分在写出时即被舍弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeSerializer {
    representation: ElementType,
}

impl DateTimeSerializer {
    pub fn with_representation(representation: ElementType) -> BsonResult<Self> {
        match representation {
            ElementType::DateTime | ElementType::Int64 | ElementType::String => {
                Ok(Self { representation })
            }
            other => Err(BsonError::Configuration(format!(
                "{} is not a valid representation for DateTime",
                other
            ))),
        }
    }

    fn from_millis(millis: i64) -> BsonResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            BsonError::Format(format!("DateTime millis out of range: {}", millis))
        })
    }
}

impl Default for DateTimeSerializer {
    fn default() -> Self {
        Self {
            representation: ElementType::DateTime,
        }
    }
}

impl BsonSerializer<DateTime<Utc>> for DateTimeSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &DateTime<Utc>) -> BsonResult<()> {
        match self.representation {
            ElementType::DateTime => writer.write_datetime(value.timestamp_millis()),
            ElementType::Int64 => writer.write_int64(value.timestamp_millis()),
            ElementType::String => {
                writer.write_string(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            _ => unreachable!("representation validated at construction"),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<DateTime<Utc>> {
        match reader.current_type() {
            Some(ElementType::DateTime) => Self::from_millis(reader.read_datetime()?),
            Some(ElementType::Int64) => Self::from_millis(reader.read_int64()?),
            Some(ElementType::String) => {
                let text = reader.read_string()?;
                DateTime::parse_from_rfc3339(&text)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        BsonError::Deserialization(format!(
                            "Invalid RFC 3339 datetime {:?}: {}",
                            text, e
                        ))
                    })
            }
            Some(other) => Err(BsonError::Format(format!(
                "Cannot deserialize DateTime from {}",
                other
            ))),
            None => Err(BsonError::Format("No pending element".to_string())),
        }
    }
}

impl HasSerializer for DateTime<Utc> {
    type Serializer = DateTimeSerializer;

    fn serializer() -> Self::Serializer {
        DateTimeSerializer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DocumentReader;
    use crate::value::BsonValue;
    use crate::writer::DocumentWriter;
    use chrono::TimeZone;

    fn sample() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()
    }

    #[test]
    fn test_datetime_default_roundtrip() {
        let s = DateTimeSerializer::default();
        let mut writer = DocumentWriter::new();
        s.serialize(&mut writer, &sample()).unwrap();
        let written = writer.finish().unwrap();
        assert_eq!(written, BsonValue::DateTime(sample()));
        let mut reader = DocumentReader::for_value(&written);
        assert_eq!(s.deserialize(&mut reader).unwrap(), sample());
    }

    #[test]
    fn test_datetime_string_representation() {
        let s = DateTimeSerializer::with_representation(ElementType::String).unwrap();
        let mut writer = DocumentWriter::new();
        s.serialize(&mut writer, &sample()).unwrap();
        let written = writer.finish().unwrap();
        assert_eq!(
            written,
            BsonValue::String("2023-11-14T22:13:20.123Z".into())
        );
        let mut reader = DocumentReader::for_value(&written);
        assert_eq!(s.deserialize(&mut reader).unwrap(), sample());
    }

    #[test]
    fn test_datetime_from_int64_millis() {
        let s = DateTimeSerializer::default();
        let written = BsonValue::Int64(1_700_000_000_123);
        let mut reader = DocumentReader::for_value(&written);
        assert_eq!(s.deserialize(&mut reader).unwrap(), sample());
    }
}
