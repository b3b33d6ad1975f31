//! BSON 文档结构模块
//!
//! 提供高级 Document API,包装有序键值对并提供便捷的文档操作方法。
//! 使用 `IndexMap` 保持字段插入顺序,这是 BSON 逐字节往返的前提。

use crate::value::BsonValue;
use crate::BsonResult;
use compact_str::CompactString;
use indexmap::IndexMap;

/// BSON 文档结构
///
/// 表示一个完整的 BSON 文档。字段顺序即线格式中的元素顺序,
/// 序列化-反序列化-再序列化必须逐字节一致。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: IndexMap<CompactString, BsonValue>,
}

impl Document {
    /// 创建空文档
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    /// 插入字段
    ///
    /// # Brief
    /// 向文档中插入或更新一个字段,保持首次插入的位置
    ///
    /// # Arguments
    /// * `key` - 字段名
    /// * `value` - 字段值
    pub fn insert(&mut self, key: impl Into<CompactString>, value: impl Into<BsonValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// 获取字段值
    pub fn get(&self, key: &str) -> Option<&BsonValue> {
        self.fields.get(key)
    }

    /// 获取字段的可变引用
    pub fn get_mut(&mut self, key: &str) -> Option<&mut BsonValue> {
        self.fields.get_mut(key)
    }

    /// 移除字段
    ///
    /// # Brief
    /// 从文档中移除指定字段并返回其值,后续字段前移
    pub fn remove(&mut self, key: &str) -> Option<BsonValue> {
        self.fields.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &BsonValue> {
        self.fields.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BsonValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.fields.get(key).and_then(|v| v.as_i32())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<BsonValue>> {
        self.fields.get(key).and_then(|v| v.as_array())
    }

    pub fn get_document(&self, key: &str) -> Option<&IndexMap<CompactString, BsonValue>> {
        self.fields.get(key).and_then(|v| v.as_document())
    }

    /// 按路径获取嵌套值
    ///
    /// # Brief
    /// 使用点分隔的路径访问嵌套文档中的值,数组段按十进制索引解释
    ///
    /// # Arguments
    /// * `path` - 点分隔的路径,如 "user.address.city"
    pub fn get_path(&self, path: &str) -> Option<&BsonValue> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// 转换为 BsonValue::Document
    pub fn into_value(self) -> BsonValue {
        BsonValue::Document(self.fields)
    }

    /// 转换为 BsonValue::Document(克隆)
    pub fn to_value(&self) -> BsonValue {
        BsonValue::Document(self.fields.clone())
    }

    /// 从 BsonValue 创建文档
    ///
    /// # Brief
    /// 要求值是 BsonValue::Document 类型,否则返回格式错误
    pub fn from_value(value: BsonValue) -> BsonResult<Self> {
        match value {
            BsonValue::Document(fields) => Ok(Self { fields }),
            other => Err(crate::BsonError::Format(format!(
                "Expected document, got {}",
                other.type_name()
            ))),
        }
    }

    /// 序列化为 BSON 字节
    pub fn to_bytes(&self) -> BsonResult<Vec<u8>> {
        crate::writer::encode_document(self)
    }

    /// 从 BSON 字节反序列化
    pub fn from_bytes(data: &[u8]) -> BsonResult<Self> {
        crate::reader::decode_document(data)
    }
}

impl From<IndexMap<CompactString, BsonValue>> for Document {
    fn from(fields: IndexMap<CompactString, BsonValue>) -> Self {
        Self { fields }
    }
}

impl From<Document> for BsonValue {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl FromIterator<(CompactString, BsonValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (CompactString, BsonValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// 构造 BsonValue 的便捷宏
///
/// 支持 `null` 字面量、数组、嵌套文档和任何实现 `Into<BsonValue>` 的表达式。
#[macro_export]
macro_rules! bson {
    (null) => {
        $crate::BsonValue::Null
    };
    ([ $($item:tt),* $(,)? ]) => {
        $crate::BsonValue::Array(vec![ $( $crate::bson!($item) ),* ])
    };
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            let mut doc = $crate::Document::new();
            $(
                doc.insert($key, $crate::bson!($value));
            )*
            doc.into_value()
        }
    };
    ($other:expr) => {
        $crate::BsonValue::from($other)
    };
}

/// 构造 Document 的便捷宏
///
/// # 示例
///
/// ```rust,ignore
/// use rinbson::doc;
///
/// let empty = doc!();
/// let doc = doc! {
///     "name": "test",
///     "value": 123
/// };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut doc = $crate::Document::new();
            $(
                doc.insert($key, $crate::bson!($value));
            )*
            doc
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut doc = Document::new();
        doc.insert("b", 1);
        doc.insert("a", 2);
        doc.insert("c", 3);
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_doc_macro() {
        let doc = doc! {
            "name": "test",
            "count": 3,
            "nested": { "flag": true },
            "list": [1, 2, 3],
            "missing": null
        };
        assert_eq!(doc.get_str("name"), Some("test"));
        assert_eq!(doc.get_i32("count"), Some(3));
        assert_eq!(doc.get_path("nested.flag"), Some(&BsonValue::Boolean(true)));
        assert_eq!(doc.get_path("list.1"), Some(&BsonValue::Int32(2)));
        assert!(doc.get("missing").unwrap().is_null());
    }

    #[test]
    fn test_from_value_rejects_non_document() {
        assert!(Document::from_value(BsonValue::Int32(1)).is_err());
    }

    #[test]
    fn test_get_path_missing() {
        let doc = doc! { "a": { "b": 1 } };
        assert!(doc.get_path("a.c").is_none());
        assert!(doc.get_path("x.b").is_none());
    }
}
