//! 字典序列化器
//!
//! 三种线上表示:
//! - `Document`: 键作为元素名,要求键序列化结果是字符串
//! - `ArrayOfArrays`: `[[k, v], ...]`
//! - `ArrayOfDocuments`: `[{ "k": ..., "v": ... }, ...]`
//!
//! Document 表示下键先经键序列化器写入一个文档树写入器,
//! 标量根不是字符串就报序列化错误;读回时键从元素名经同一个
//! 序列化器还原,整数键等非字符串键因此可以走 Document 表示。

use crate::reader::{BsonReader, DocumentReader};
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::ElementType;
use crate::value::BsonValue;
use crate::writer::{BsonWriter, DocumentWriter};
use crate::{BsonError, BsonResult};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

/// 字典的线上表示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryRepresentation {
    Document,
    ArrayOfArrays,
    ArrayOfDocuments,
}

/// 字典序列化器,覆盖 `HashMap<K, V>` 与 `IndexMap<K, V>`
pub struct MapSerializer<K, V, KS, VS> {
    representation: DictionaryRepresentation,
    key: KS,
    value: VS,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, KS, VS> MapSerializer<K, V, KS, VS> {
    pub fn new(representation: DictionaryRepresentation, key: KS, value: VS) -> Self {
        Self {
            representation,
            key,
            value,
            _marker: PhantomData,
        }
    }

    pub fn representation(&self) -> DictionaryRepresentation {
        self.representation
    }
}

impl<K, V, KS: PartialEq, VS: PartialEq> PartialEq for MapSerializer<K, V, KS, VS> {
    fn eq(&self, other: &Self) -> bool {
        self.representation == other.representation
            && self.key == other.key
            && self.value == other.value
    }
}

impl<K, V, KS, VS> MapSerializer<K, V, KS, VS>
where
    K: Any + Send + Sync,
    KS: BsonSerializer<K>,
{
    fn key_to_name(&self, key: &K) -> BsonResult<String> {
        let mut writer = DocumentWriter::new();
        self.key.serialize(&mut writer, key)?;
        match writer.finish()? {
            BsonValue::String(name) => Ok(name.into()),
            other => Err(BsonError::Serialization(format!(
                "Document representation requires string keys, got {}",
                other.type_name()
            ))),
        }
    }

    fn key_from_name(&self, name: &str) -> BsonResult<K> {
        let value = BsonValue::String(name.into());
        let mut reader = DocumentReader::for_value(&value);
        self.key.deserialize(&mut reader)
    }
}

macro_rules! map_serializer_impl {
    ($map:ident) => {
        impl<K, V, KS, VS> BsonSerializer<$map<K, V>> for MapSerializer<K, V, KS, VS>
        where
            K: Any + Send + Sync + Eq + Hash,
            V: Any + Send + Sync,
            KS: BsonSerializer<K>,
            VS: BsonSerializer<V>,
        {
            fn serialize(&self, writer: &mut dyn BsonWriter, value: &$map<K, V>) -> BsonResult<()> {
                match self.representation {
                    DictionaryRepresentation::Document => {
                        writer.write_start_document()?;
                        for (k, v) in value {
                            let name = self.key_to_name(k)?;
                            writer.write_name(&name)?;
                            self.value.serialize(writer, v)?;
                        }
                        writer.write_end_document()
                    }
                    DictionaryRepresentation::ArrayOfArrays => {
                        writer.write_start_array()?;
                        for (k, v) in value {
                            writer.write_start_array()?;
                            self.key.serialize(writer, k)?;
                            self.value.serialize(writer, v)?;
                            writer.write_end_array()?;
                        }
                        writer.write_end_array()
                    }
                    DictionaryRepresentation::ArrayOfDocuments => {
                        writer.write_start_array()?;
                        for (k, v) in value {
                            writer.write_start_document()?;
                            writer.write_name("k")?;
                            self.key.serialize(writer, k)?;
                            writer.write_name("v")?;
                            self.value.serialize(writer, v)?;
                            writer.write_end_document()?;
                        }
                        writer.write_end_array()
                    }
                }
            }

            fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<$map<K, V>> {
                let mut map = $map::new();
                match reader.current_type() {
                    Some(ElementType::Document) => {
                        reader.read_start_document()?;
                        while reader.read_element_type()?.is_some() {
                            let name = reader.read_name()?;
                            let key = self.key_from_name(&name)?;
                            let value = self.value.deserialize(reader)?;
                            map.insert(key, value);
                        }
                        reader.read_end_document()?;
                    }
                    Some(ElementType::Array) => {
                        reader.read_start_array()?;
                        while let Some(tag) = reader.read_element_type()? {
                            let (key, value) = match tag {
                                ElementType::Array => self.read_pair(reader)?,
                                ElementType::Document => self.read_entry_document(reader)?,
                                other => {
                                    return Err(BsonError::Format(format!(
                                        "Dictionary entry must be an array or document, got {}",
                                        other
                                    )))
                                }
                            };
                            map.insert(key, value);
                        }
                        reader.read_end_array()?;
                    }
                    Some(other) => {
                        return Err(BsonError::Format(format!(
                            "Cannot deserialize a dictionary from {}",
                            other
                        )))
                    }
                    None => return Err(BsonError::Format("No pending element".to_string())),
                }
                Ok(map)
            }
        }
    };
}

map_serializer_impl!(HashMap);
map_serializer_impl!(IndexMap);

impl<K, V, KS, VS> MapSerializer<K, V, KS, VS>
where
    K: Any + Send + Sync,
    V: Any + Send + Sync,
    KS: BsonSerializer<K>,
    VS: BsonSerializer<V>,
{
    fn read_pair(&self, reader: &mut dyn BsonReader) -> BsonResult<(K, V)> {
        reader.read_start_array()?;
        if reader.read_element_type()?.is_none() {
            return Err(BsonError::Format(
                "Dictionary entry array requires 2 elements".to_string(),
            ));
        }
        let key = self.key.deserialize(reader)?;
        if reader.read_element_type()?.is_none() {
            return Err(BsonError::Format(
                "Dictionary entry array requires 2 elements".to_string(),
            ));
        }
        let value = self.value.deserialize(reader)?;
        if reader.read_element_type()?.is_some() {
            return Err(BsonError::Format(
                "Dictionary entry array requires 2 elements".to_string(),
            ));
        }
        reader.read_end_array()?;
        Ok((key, value))
    }

    fn read_entry_document(&self, reader: &mut dyn BsonReader) -> BsonResult<(K, V)> {
        reader.read_start_document()?;
        let mut key = None;
        let mut value = None;
        while reader.read_element_type()?.is_some() {
            let name = reader.read_name()?;
            match name.as_str() {
                "k" => key = Some(self.key.deserialize(reader)?),
                "v" => value = Some(self.value.deserialize(reader)?),
                other => {
                    return Err(BsonError::Format(format!(
                        "Unexpected dictionary entry field {:?}",
                        other
                    )))
                }
            }
        }
        reader.read_end_document()?;
        match (key, value) {
            (Some(key), Some(value)) => Ok((key, value)),
            _ => Err(BsonError::Format(
                "Dictionary entry document requires k and v".to_string(),
            )),
        }
    }
}

macro_rules! map_has_serializer {
    ($map:ident) => {
        impl<K, V> HasSerializer for $map<K, V>
        where
            K: HasSerializer + Eq + Hash,
            V: HasSerializer,
        {
            type Serializer = MapSerializer<K, V, K::Serializer, V::Serializer>;

            fn serializer() -> Self::Serializer {
                MapSerializer::new(
                    DictionaryRepresentation::Document,
                    K::serializer(),
                    V::serializer(),
                )
            }
        }
    };
}

map_has_serializer!(HashMap);
map_has_serializer!(IndexMap);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson;

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
    fn test_document_representation_roundtrip() {
        let s = HashMap::<String, i32>::serializer();
        let mut map = HashMap::new();
        map.insert("one".to_string(), 1);
        let written = write_with(&s, &map);
        assert_eq!(written, bson!({ "one": 1 }));
        let back: HashMap<String, i32> = read_with(&s, &written).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_index_map_preserves_insertion_order() {
        let s = IndexMap::<String, i32>::serializer();
        let mut map = IndexMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let written = write_with(&s, &map);
        assert_eq!(written, bson!({ "b": 2, "a": 1 }));
        let back: IndexMap<String, i32> = read_with(&s, &written).unwrap();
        assert_eq!(back.get_index(0), Some((&"b".to_string(), &2)));
        assert_eq!(back, map);
    }

    #[test]
    fn test_integer_keys_through_document_representation() {
        let mut map = HashMap::new();
        map.insert(7, true);
        // i32 键经 String 表示进入元素名
        let int_as_string =
            crate::serializers::numeric::Int32Serializer::with_representation(
                ElementType::String,
            )
            .unwrap();
        let s = MapSerializer::new(
            DictionaryRepresentation::Document,
            int_as_string,
            crate::serializers::scalar::BooleanSerializer::default(),
        );
        let written = write_with(&s, &map);
        assert_eq!(written, bson!({ "7": true }));
        let back: HashMap<i32, bool> = read_with(&s, &written).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_non_string_keys_rejected_in_document_representation() {
        let s = HashMap::<i32, bool>::serializer();
        let mut map = HashMap::new();
        map.insert(7, true);
        let mut writer = DocumentWriter::new();
        assert!(matches!(
            s.serialize(&mut writer, &map),
            Err(BsonError::Serialization(_))
        ));
    }

    #[test]
    fn test_array_of_arrays_roundtrip() {
        let s = MapSerializer::new(
            DictionaryRepresentation::ArrayOfArrays,
            crate::serializers::numeric::Int32Serializer::default(),
            crate::serializers::scalar::StringSerializer::default(),
        );
        let mut map = HashMap::new();
        map.insert(1, "a".to_string());
        let written = write_with(&s, &map);
        assert_eq!(written, bson!([[1, "a"]]));
        let back: HashMap<i32, String> = read_with(&s, &written).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_array_of_documents_roundtrip() {
        let s = MapSerializer::new(
            DictionaryRepresentation::ArrayOfDocuments,
            crate::serializers::numeric::Int32Serializer::default(),
            crate::serializers::scalar::StringSerializer::default(),
        );
        let mut map = HashMap::new();
        map.insert(2, "b".to_string());
        let written = write_with(&s, &map);
        assert_eq!(written, bson!([{ "k": 2, "v": "b" }]));
        let back: HashMap<i32, String> = read_with(&s, &written).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_malformed_entry_rejected() {
        let s = MapSerializer::new(
            DictionaryRepresentation::ArrayOfArrays,
            crate::serializers::numeric::Int32Serializer::default(),
            crate::serializers::scalar::StringSerializer::default(),
        );
        let short: BsonResult<HashMap<i32, String>> = read_with(&s, &bson!([[1]]));
        assert!(matches!(short, Err(BsonError::Format(_))));
        let long: BsonResult<HashMap<i32, String>> = read_with(&s, &bson!([[1, "a", 2]]));
        assert!(matches!(long, Err(BsonError::Format(_))));
    }
}
