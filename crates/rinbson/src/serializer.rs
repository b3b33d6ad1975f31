//! 序列化器抽象模块
//!
//! `BsonSerializer<T>` 是类型化的序列化协议;注册表和多态分发
//! 需要按 `TypeId` 统一存放,因此用 `Erased` 把类型化序列化器
//! 擦除为对象安全的 `ErasedSerializer`。去重依赖 `config_eq`:
//! 两个配置相等的序列化器视为同一个,哈希恒定,相等性为准。

use crate::reader::BsonReader;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

/// 擦除后的动态值
pub type DynValue = Box<dyn Any + Send + Sync>;

/// 类型化的 BSON 序列化器
///
/// # Brief
/// 一个实现负责单个 Rust 类型与其线上表示之间的双向转换。
/// 实现必须无状态或只含不可变配置,并实现 `PartialEq`
/// 以支持注册表去重。
pub trait BsonSerializer<T>: Send + Sync + 'static {
    /// 把值写入当前元素位置
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &T) -> BsonResult<()>;

    /// 从当前元素位置读出一个新值
    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<T>;

    /// 就地反序列化,默认实现为整体替换
    ///
    /// # Brief
    /// 容器与类映射序列化器覆盖此方法以复用既有实例
    fn deserialize_into(&self, reader: &mut dyn BsonReader, target: &mut T) -> BsonResult<()> {
        *target = self.deserialize(reader)?;
        Ok(())
    }
}

/// 对象安全的擦除序列化器
pub trait ErasedSerializer: Send + Sync {
    /// 本序列化器负责的值类型
    fn value_type(&self) -> TypeId;

    /// 值类型名,用于错误信息
    fn value_type_name(&self) -> &'static str;

    /// 序列化 `&dyn Any` 形式的值,类型不匹配时报错
    fn serialize_any(&self, writer: &mut dyn BsonWriter, value: &dyn Any) -> BsonResult<()>;

    /// 反序列化为装箱的动态值
    fn deserialize_any(&self, reader: &mut dyn BsonReader) -> BsonResult<DynValue>;

    /// 配置相等性,跨具体类型比较
    fn config_eq(&self, other: &dyn ErasedSerializer) -> bool;

    /// 配置哈希,恒为 0,去重以 `config_eq` 为准
    fn config_hash(&self) -> u64 {
        0
    }

    fn as_any(&self) -> &dyn Any;
}

/// 类型化序列化器的擦除包装
pub struct Erased<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Erased<T, S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<T, S> ErasedSerializer for Erased<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T> + PartialEq + Any,
{
    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize_any(&self, writer: &mut dyn BsonWriter, value: &dyn Any) -> BsonResult<()> {
        let value = value.downcast_ref::<T>().ok_or_else(|| {
            BsonError::Serialization(format!(
                "Value is not a {}",
                std::any::type_name::<T>()
            ))
        })?;
        self.inner.serialize(writer, value)
    }

    fn deserialize_any(&self, reader: &mut dyn BsonReader) -> BsonResult<DynValue> {
        Ok(Box::new(self.inner.deserialize(reader)?))
    }

    fn config_eq(&self, other: &dyn ErasedSerializer) -> bool {
        match other.as_any().downcast_ref::<Self>() {
            Some(other) => self.inner == other.inner,
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 把类型化序列化器擦除并装入 `Arc`
pub fn erase<T, S>(serializer: S) -> Arc<dyn ErasedSerializer>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T> + PartialEq + Any,
{
    Arc::new(Erased::<T, S>::new(serializer))
}

/// 延迟解析的序列化器
///
/// # Brief
/// 注册期占位用:构造时不解析 `T` 的序列化器,每次调用时
/// 才向注册表查询,从而允许递归类型的注册先于其成员完成。
pub struct DeferredSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DeferredSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for DeferredSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DeferredSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> PartialEq for DeferredSerializer<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> BsonSerializer<T> for DeferredSerializer<T>
where
    T: crate::registry::HasSerializer + Any + Send + Sync,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &T) -> BsonResult<()> {
        crate::registry::SerializerRegistry::global()
            .resolve::<T>()?
            .serialize_any(writer, value)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<T> {
        let boxed = crate::registry::SerializerRegistry::global()
            .resolve::<T>()?
            .deserialize_any(reader)?;
        boxed.downcast::<T>().map(|b| *b).map_err(|_| {
            BsonError::Deserialization(format!(
                "Resolved serializer produced a value that is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::numeric::Int32Serializer;
    use crate::writer::DocumentWriter;

    #[test]
    fn test_erased_rejects_wrong_type() {
        let erased = erase::<i32, _>(Int32Serializer::default());
        let mut writer = DocumentWriter::new();
        let err = erased.serialize_any(&mut writer, &"not an i32").unwrap_err();
        assert!(matches!(err, BsonError::Serialization(_)));
    }

    #[test]
    fn test_config_eq_same_config() {
        let a = erase::<i32, _>(Int32Serializer::default());
        let b = erase::<i32, _>(Int32Serializer::default());
        assert!(a.config_eq(b.as_ref()));
        assert_eq!(a.config_hash(), b.config_hash());
    }
}
