//! 内置序列化器集合
//!
//! 按负责的类型族分文件: 数值、标量、时间、标识、容器、字典。
//! 每个序列化器是只含不可变配置的小结构体,实现 `PartialEq`
//! 以支持注册表去重;类型到默认序列化器的绑定见各文件中的
//! `HasSerializer` 实现。

pub mod any;
pub mod container;
pub mod identity;
pub mod map;
pub mod numeric;
pub mod scalar;
pub mod temporal;

pub use any::{BsonValueSerializer, DocumentSerializer};
pub use container::{
    Array2, Array2Serializer, Array3, Array3Serializer, BoxSerializer, FixedArraySerializer,
    OptionSerializer, OrderedVec, OrderedVecSerializer, VecSerializer,
};
pub use identity::{GuidRepresentation, ObjectIdSerializer, UuidSerializer};
pub use map::{DictionaryRepresentation, MapSerializer};
pub use numeric::{
    Decimal128Serializer, DecimalSerializer, DoubleSerializer, HalfSerializer, Int32Serializer,
    Int64Serializer,
};
pub use scalar::{BooleanSerializer, BsonEnum, EnumSerializer, RegexSerializer, StringSerializer, VersionSerializer};
pub use temporal::DateTimeSerializer;
