//! 动态值序列化器
//!
//! `BsonValue` 与 `Document` 自身的序列化实现,额外元素捕获和
//! 无模式数据都经由这两个序列化器。

use crate::document::Document;
use crate::reader::{read_value, BsonReader};
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::ElementType;
use crate::value::BsonValue;
use crate::writer::{write_value, BsonWriter};
use crate::{BsonError, BsonResult};

/// 任意 BSON 值的序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BsonValueSerializer;

impl BsonSerializer<BsonValue> for BsonValueSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &BsonValue) -> BsonResult<()> {
        write_value(writer, value)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<BsonValue> {
        read_value(reader)
    }
}

impl HasSerializer for BsonValue {
    type Serializer = BsonValueSerializer;

    fn serializer() -> Self::Serializer {
        BsonValueSerializer
    }
}

/// 文档序列化器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocumentSerializer;

impl BsonSerializer<Document> for DocumentSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Document) -> BsonResult<()> {
        writer.write_start_document()?;
        for (name, field) in value.iter() {
            writer.write_name(name)?;
            write_value(writer, field)?;
        }
        writer.write_end_document()
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Document> {
        match reader.current_type() {
            Some(ElementType::Document) | None => {}
            Some(other) => {
                return Err(BsonError::Format(format!(
                    "Cannot deserialize Document from {}",
                    other
                )))
            }
        }
        reader.read_start_document()?;
        let mut doc = Document::new();
        while reader.read_element_type()?.is_some() {
            let name = reader.read_name()?;
            doc.insert(name, read_value(reader)?);
        }
        reader.read_end_document()?;
        Ok(doc)
    }
}

impl HasSerializer for Document {
    type Serializer = DocumentSerializer;

    fn serializer() -> Self::Serializer {
        DocumentSerializer
    }
}
