//! BSON 线格式常量定义
//!
//! 定义 BSON 规范中的元素类型标记、二进制子类型和文档限制。

use crate::{BsonError, BsonResult};

pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;
pub const MAX_NESTING_DEPTH: usize = 100;

/// BSON 元素类型标记
///
/// 每个序列化值前恰好有一个该集合中的标记字节,
/// 未知标记是硬错误。
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Double = 0x01,
    String = 0x02,
    Document = 0x03,
    Array = 0x04,
    Binary = 0x05,
    Undefined = 0x06,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    RegularExpression = 0x0B,
    JavaScript = 0x0D,
    Symbol = 0x0E,
    JavaScriptWithScope = 0x0F,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
    Decimal128 = 0x13,
    MinKey = 0xFF,
    MaxKey = 0x7F,
}

impl ElementType {
    pub fn from_u8(byte: u8) -> BsonResult<Self> {
        match byte {
            0x01 => Ok(Self::Double),
            0x02 => Ok(Self::String),
            0x03 => Ok(Self::Document),
            0x04 => Ok(Self::Array),
            0x05 => Ok(Self::Binary),
            0x06 => Ok(Self::Undefined),
            0x07 => Ok(Self::ObjectId),
            0x08 => Ok(Self::Boolean),
            0x09 => Ok(Self::DateTime),
            0x0A => Ok(Self::Null),
            0x0B => Ok(Self::RegularExpression),
            0x0D => Ok(Self::JavaScript),
            0x0E => Ok(Self::Symbol),
            0x0F => Ok(Self::JavaScriptWithScope),
            0x10 => Ok(Self::Int32),
            0x11 => Ok(Self::Timestamp),
            0x12 => Ok(Self::Int64),
            0x13 => Ok(Self::Decimal128),
            0xFF => Ok(Self::MinKey),
            0x7F => Ok(Self::MaxKey),
            other => Err(BsonError::InvalidTypeTag(other)),
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// BSON 二进制负载子类型
///
/// 0x80-0xFF 区间是用户自定义子类型,原始字节保留在变体内,
/// 重新编码时原样写回。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    BinaryOld,
    UuidLegacy,
    Uuid,
    Md5,
    Encrypted,
    Column,
    Sensitive,
    Vector,
    UserDefined(u8),
}

impl BinarySubtype {
    pub fn from_u8(byte: u8) -> BsonResult<Self> {
        match byte {
            0x00 => Ok(Self::Generic),
            0x01 => Ok(Self::Function),
            0x02 => Ok(Self::BinaryOld),
            0x03 => Ok(Self::UuidLegacy),
            0x04 => Ok(Self::Uuid),
            0x05 => Ok(Self::Md5),
            0x06 => Ok(Self::Encrypted),
            0x07 => Ok(Self::Column),
            0x08 => Ok(Self::Sensitive),
            0x09 => Ok(Self::Vector),
            b if b >= 0x80 => Ok(Self::UserDefined(b)),
            other => Err(BsonError::Format(format!(
                "Invalid binary subtype: 0x{:02x}",
                other
            ))),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Generic => 0x00,
            Self::Function => 0x01,
            Self::BinaryOld => 0x02,
            Self::UuidLegacy => 0x03,
            Self::Uuid => 0x04,
            Self::Md5 => 0x05,
            Self::Encrypted => 0x06,
            Self::Column => 0x07,
            Self::Sensitive => 0x08,
            Self::Vector => 0x09,
            Self::UserDefined(byte) => byte,
        }
    }
}
