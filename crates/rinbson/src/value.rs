//! BSON 值类型定义模块
//!
//! 定义 BSON 线格式支持的所有数据类型,每个变体对应一个元素类型标记。
//! 使用 `CompactString` 优化短字符串与元素名的内存占用。

use crate::decimal128::Decimal128;
use crate::spec::{BinarySubtype, ElementType};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use rinbson_common::ObjectId;
use uuid::Uuid;

/// BSON 值的枚举类型
///
/// 表示 BSON 规范支持的所有数据类型,是一个封闭集合:
/// 每个变体与 `ElementType` 中的一个线格式标记一一对应
/// (JavaScript 与 JavaScriptWithScope 共用一个变体,以 scope 是否存在区分)。
#[derive(Debug, Clone, PartialEq)]
pub enum BsonValue {
    /// 64 位浮点数
    Double(f64),
    /// UTF-8 字符串
    String(CompactString),
    /// 嵌套文档(有序键值对)
    Document(IndexMap<CompactString, BsonValue>),
    /// 值数组
    Array(Vec<BsonValue>),
    /// 带子类型的二进制数据
    Binary(Binary),
    /// 已废弃的 undefined 值
    Undefined,
    /// 12 字节唯一对象标识符
    ObjectId(ObjectId),
    /// 布尔值
    Boolean(bool),
    /// UTC 日期时间(毫秒精度)
    DateTime(DateTime<Utc>),
    /// 空值
    Null,
    /// 正则表达式
    RegularExpression(RegexValue),
    /// JavaScript 代码(可带作用域)
    JavaScript(JavaScriptValue),
    /// 符号(已废弃,等价于字符串)
    Symbol(CompactString),
    /// 32 位有符号整数
    Int32(i32),
    /// 内部时间戳(高 32 位秒数,低 32 位递增序号)
    Timestamp(u64),
    /// 64 位有符号整数
    Int64(i64),
    /// 128 位十进制浮点数
    Decimal128(Decimal128),
    /// 排序最小键
    MinKey,
    /// 排序最大键
    MaxKey,
}

/// 二进制值
///
/// 负载字节加一个子类型标记,子类型决定负载的解释方式。
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn generic(bytes: Vec<u8>) -> Self {
        Self {
            subtype: BinarySubtype::Generic,
            bytes,
        }
    }
}

/// 正则表达式值
///
/// 包含正则表达式的模式和选项(如 i, m, s 等)
#[derive(Debug, Clone, PartialEq)]
pub struct RegexValue {
    pub pattern: CompactString,
    pub options: CompactString,
}

impl RegexValue {
    pub fn new(pattern: impl Into<CompactString>, options: impl Into<CompactString>) -> Self {
        Self {
            pattern: pattern.into(),
            options: options.into(),
        }
    }
}

/// JavaScript 代码值
///
/// 包含 JavaScript 代码字符串和可选的作用域(变量绑定)
#[derive(Debug, Clone, PartialEq)]
pub struct JavaScriptValue {
    pub code: CompactString,
    pub scope: Option<IndexMap<CompactString, BsonValue>>,
}

impl JavaScriptValue {
    pub fn new(code: impl Into<CompactString>) -> Self {
        Self {
            code: code.into(),
            scope: None,
        }
    }

    pub fn with_scope(
        code: impl Into<CompactString>,
        scope: IndexMap<CompactString, BsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            scope: Some(scope),
        }
    }
}

impl BsonValue {
    /// 返回值对应的线格式元素类型标记
    pub fn element_type(&self) -> ElementType {
        match self {
            BsonValue::Double(_) => ElementType::Double,
            BsonValue::String(_) => ElementType::String,
            BsonValue::Document(_) => ElementType::Document,
            BsonValue::Array(_) => ElementType::Array,
            BsonValue::Binary(_) => ElementType::Binary,
            BsonValue::Undefined => ElementType::Undefined,
            BsonValue::ObjectId(_) => ElementType::ObjectId,
            BsonValue::Boolean(_) => ElementType::Boolean,
            BsonValue::DateTime(_) => ElementType::DateTime,
            BsonValue::Null => ElementType::Null,
            BsonValue::RegularExpression(_) => ElementType::RegularExpression,
            BsonValue::JavaScript(js) => {
                if js.scope.is_some() {
                    ElementType::JavaScriptWithScope
                } else {
                    ElementType::JavaScript
                }
            }
            BsonValue::Symbol(_) => ElementType::Symbol,
            BsonValue::Int32(_) => ElementType::Int32,
            BsonValue::Timestamp(_) => ElementType::Timestamp,
            BsonValue::Int64(_) => ElementType::Int64,
            BsonValue::Decimal128(_) => ElementType::Decimal128,
            BsonValue::MinKey => ElementType::MinKey,
            BsonValue::MaxKey => ElementType::MaxKey,
        }
    }

    /// 返回类型名称(用于错误信息)
    pub fn type_name(&self) -> &'static str {
        match self {
            BsonValue::Double(_) => "double",
            BsonValue::String(_) => "string",
            BsonValue::Document(_) => "document",
            BsonValue::Array(_) => "array",
            BsonValue::Binary(_) => "binary",
            BsonValue::Undefined => "undefined",
            BsonValue::ObjectId(_) => "objectId",
            BsonValue::Boolean(_) => "boolean",
            BsonValue::DateTime(_) => "dateTime",
            BsonValue::Null => "null",
            BsonValue::RegularExpression(_) => "regex",
            BsonValue::JavaScript(_) => "javascript",
            BsonValue::Symbol(_) => "symbol",
            BsonValue::Int32(_) => "int32",
            BsonValue::Timestamp(_) => "timestamp",
            BsonValue::Int64(_) => "int64",
            BsonValue::Decimal128(_) => "decimal128",
            BsonValue::MinKey => "minKey",
            BsonValue::MaxKey => "maxKey",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BsonValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            BsonValue::Int32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BsonValue::Int32(n) => Some(*n as i64),
            BsonValue::Int64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BsonValue::Double(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BsonValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<BsonValue>> {
        match self {
            BsonValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&IndexMap<CompactString, BsonValue>> {
        match self {
            BsonValue::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            BsonValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            BsonValue::ObjectId(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            BsonValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BsonValue::Null)
    }

    /// 按键访问嵌套文档成员,或按十进制索引访问数组元素
    pub fn get(&self, key: &str) -> Option<&BsonValue> {
        match self {
            BsonValue::Document(doc) => doc.get(key),
            BsonValue::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        }
    }
}

impl From<bool> for BsonValue {
    fn from(v: bool) -> Self {
        BsonValue::Boolean(v)
    }
}

impl From<i32> for BsonValue {
    fn from(v: i32) -> Self {
        BsonValue::Int32(v)
    }
}

impl From<i64> for BsonValue {
    fn from(v: i64) -> Self {
        BsonValue::Int64(v)
    }
}

impl From<f64> for BsonValue {
    fn from(v: f64) -> Self {
        BsonValue::Double(v)
    }
}

impl From<&str> for BsonValue {
    fn from(v: &str) -> Self {
        BsonValue::String(CompactString::from(v))
    }
}

impl From<String> for BsonValue {
    fn from(v: String) -> Self {
        BsonValue::String(CompactString::from(v))
    }
}

impl From<CompactString> for BsonValue {
    fn from(v: CompactString) -> Self {
        BsonValue::String(v)
    }
}

impl From<ObjectId> for BsonValue {
    fn from(v: ObjectId) -> Self {
        BsonValue::ObjectId(v)
    }
}

impl From<DateTime<Utc>> for BsonValue {
    fn from(v: DateTime<Utc>) -> Self {
        BsonValue::DateTime(v)
    }
}

impl From<Decimal128> for BsonValue {
    fn from(v: Decimal128) -> Self {
        BsonValue::Decimal128(v)
    }
}

impl From<Uuid> for BsonValue {
    fn from(v: Uuid) -> Self {
        BsonValue::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: v.as_bytes().to_vec(),
        })
    }
}

impl From<Binary> for BsonValue {
    fn from(v: Binary) -> Self {
        BsonValue::Binary(v)
    }
}

impl From<Vec<BsonValue>> for BsonValue {
    fn from(v: Vec<BsonValue>) -> Self {
        BsonValue::Array(v)
    }
}

impl From<IndexMap<CompactString, BsonValue>> for BsonValue {
    fn from(v: IndexMap<CompactString, BsonValue>) -> Self {
        BsonValue::Document(v)
    }
}

impl<T: Into<BsonValue>> From<Option<T>> for BsonValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => BsonValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_mapping() {
        assert_eq!(BsonValue::Int32(1).element_type(), ElementType::Int32);
        assert_eq!(BsonValue::Null.element_type(), ElementType::Null);
        assert_eq!(BsonValue::MinKey.element_type(), ElementType::MinKey);
        assert_eq!(
            BsonValue::JavaScript(JavaScriptValue::new("x")).element_type(),
            ElementType::JavaScript
        );
        assert_eq!(
            BsonValue::JavaScript(JavaScriptValue::with_scope("x", IndexMap::new()))
                .element_type(),
            ElementType::JavaScriptWithScope
        );
    }

    #[test]
    fn test_as_i64_widens_int32() {
        assert_eq!(BsonValue::Int32(7).as_i64(), Some(7));
        assert_eq!(BsonValue::Int64(7).as_i64(), Some(7));
        assert_eq!(BsonValue::Double(7.0).as_i64(), None);
    }

    #[test]
    fn test_get_indexes_arrays() {
        let arr = BsonValue::Array(vec![BsonValue::Int32(1), BsonValue::Int32(2)]);
        assert_eq!(arr.get("1"), Some(&BsonValue::Int32(2)));
        assert_eq!(arr.get("2"), None);
    }

    #[test]
    fn test_uuid_becomes_standard_binary() {
        let uuid = Uuid::from_bytes([7u8; 16]);
        match BsonValue::from(uuid) {
            BsonValue::Binary(b) => {
                assert_eq!(b.subtype, BinarySubtype::Uuid);
                assert_eq!(b.bytes, [7u8; 16]);
            }
            other => panic!("expected binary, got {}", other.type_name()),
        }
    }
}
