//! # RinBSON - BSON 序列化引擎
//!
//! RinBSON 是一个完整的 BSON (Binary JSON) 序列化引擎,按照 BSON 规范
//! 逐字节实现标准二进制文档编码。核心能力:
//!
//! - **值模型**: 覆盖全部 BSON 类型标记的 `BsonValue` 枚举与有序 `Document`
//! - **读写抽象**: 拉取式游标 `BsonReader`/`BsonWriter`,同时支持二进制流
//!   和文档树两种后端
//! - **表示转换**: 数值/时间类型在 Int32/Int64/Double/Decimal128/String
//!   之间的可配置转换,带溢出/截断策略
//! - **序列化器注册表**: 进程级类型到序列化器的查找表,按配置值判等去重
//! - **多态文档序列化**: 基于判别符(`_t`)的继承层级分发、额外元素捕获、
//!   现有实例复用
//! - **二进制向量**: Float32/Int8/PackedBit 定宽向量子格式,含填充位校验
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use rinbson::{doc, encode_document, decode_document};
//!
//! let document = doc! {
//!     "name": "Rin",
//!     "version": 1
//! };
//!
//! let bytes = encode_document(&document).unwrap();
//! let restored = decode_document(&bytes).unwrap();
//! assert_eq!(document, restored);
//! ```

pub mod classmap;
pub mod convert;
pub mod de;
pub mod decimal128;
pub mod document;
pub mod extjson;
pub mod hierarchy;
pub mod reader;
pub mod registry;
pub mod ser;
pub mod serializer;
pub mod serializers;
pub mod spec;
pub mod value;
pub mod vector;
pub mod writer;

pub use classmap::{ClassMapBuilder, ClassMapSerializer};
pub use convert::RepresentationConverter;
pub use de::from_bson;
pub use decimal128::Decimal128;
pub use document::Document;
pub use extjson::{from_extjson, to_extjson, ExtJsonMode};
pub use hierarchy::{HierarchyOptions, HierarchyRegistry, PolymorphicSerializer};
pub use reader::{decode_document, BinaryReader, BsonReader, DocumentReader};
pub use registry::{HasSerializer, SerializerRegistry};
pub use ser::to_bson;
pub use serializer::BsonSerializer;
pub use spec::{BinarySubtype, ElementType};
pub use value::BsonValue;
pub use vector::{
    BinaryVector, BinaryVectorSerializer, Float32VectorSerializer, Int8VectorSerializer,
    PackedBitVectorSerializer,
};
pub use writer::{encode_document, BinaryWriter, BsonWriter, DocumentWriter};

use thiserror::Error;

/// BSON 操作的错误类型
///
/// 按照来源分为四类:
/// - 配置错误(构造期,如非法的表示选项)
/// - 格式错误(反序列化期,数据相关)
/// - 数值转换错误(溢出/截断,与一般格式错误区分)
/// - IO/编码错误
#[derive(Error, Debug)]
pub enum BsonError {
    /// IO 操作错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 无效的 BSON 类型标记字节
    #[error("Invalid BSON type tag: 0x{0:02x}")]
    InvalidTypeTag(u8),

    /// 字符串不是有效的 UTF-8 编码
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// 意外的输入结束
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// 构造期配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 反序列化期格式错误
    #[error("Invalid BSON: {0}")]
    Format(String),

    /// 数值转换溢出
    #[error("Value {value} overflows {target}")]
    Overflow { value: String, target: &'static str },

    /// 数值转换截断
    #[error("Value {value} would be truncated converting to {target}")]
    Truncation { value: String, target: &'static str },

    /// 不支持的操作
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// 序列化过程错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 反序列化过程错误
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// BSON 操作的 Result 类型别名
pub type BsonResult<T> = Result<T, BsonError>;
