//! 序列化器注册表模块
//!
//! 按 `TypeId` 缓存擦除后的序列化器,进程内共享一个全局实例。
//! 解析采用两阶段协议: 构造某类型的序列化器之前先在表中放入
//! 占位,期间对同一类型的递归解析得到 `DeferredSerializer`,
//! 从而支持自引用类型;构造完成后占位升级为就绪。

use crate::serializer::{erase, BsonSerializer, DeferredSerializer, ErasedSerializer};
use crate::{BsonError, BsonResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// 能通过编译期链条解析出序列化器的类型
///
/// # Brief
/// `Vec<T>`、`Option<T>` 等组合类型的实现递归要求元素类型
/// 也实现本 trait,由此形成静态的序列化器构造链。
pub trait HasSerializer: Any + Send + Sync + Sized {
    type Serializer: BsonSerializer<Self> + PartialEq + Any;

    /// 构造默认配置的序列化器
    fn serializer() -> Self::Serializer;
}

enum Slot {
    /// 正在构造,递归解析返回延迟序列化器
    Reserved,
    Ready(Arc<dyn ErasedSerializer>),
}

/// 序列化器注册表
pub struct SerializerRegistry {
    slots: RwLock<HashMap<TypeId, Slot>>,
}

static GLOBAL: Lazy<SerializerRegistry> = Lazy::new(SerializerRegistry::new);

impl SerializerRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// 进程级全局注册表
    pub fn global() -> &'static SerializerRegistry {
        &GLOBAL
    }

    /// 显式注册 `T` 的序列化器
    ///
    /// # Brief
    /// 同类型重复注册时,配置相等则复用已注册实例,
    /// 配置不同则报配置错误
    pub fn register<T, S>(&self, serializer: S) -> BsonResult<Arc<dyn ErasedSerializer>>
    where
        T: Any + Send + Sync,
        S: BsonSerializer<T> + PartialEq + Any,
    {
        let id = TypeId::of::<T>();
        let erased = erase::<T, S>(serializer);
        let mut slots = self.slots.write();
        match slots.get(&id) {
            Some(Slot::Ready(existing)) => {
                if existing.config_eq(erased.as_ref()) {
                    return Ok(existing.clone());
                }
                return Err(BsonError::Configuration(format!(
                    "A different serializer is already registered for {}",
                    std::any::type_name::<T>()
                )));
            }
            Some(Slot::Reserved) | None => {}
        }
        tracing::debug!(value_type = std::any::type_name::<T>(), "serializer registered");
        slots.insert(id, Slot::Ready(erased.clone()));
        Ok(erased)
    }

    /// 按 `TypeId` 查找已就绪的序列化器
    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<dyn ErasedSerializer>> {
        match self.slots.read().get(&type_id) {
            Some(Slot::Ready(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// 解析 `T` 的序列化器,必要时构造并缓存
    pub fn resolve<T: HasSerializer>(&self) -> BsonResult<Arc<dyn ErasedSerializer>> {
        let id = TypeId::of::<T>();
        {
            let slots = self.slots.read();
            match slots.get(&id) {
                Some(Slot::Ready(s)) => return Ok(s.clone()),
                Some(Slot::Reserved) => {
                    return Ok(erase::<T, _>(DeferredSerializer::<T>::new()))
                }
                None => {}
            }
        }
        {
            let mut slots = self.slots.write();
            match slots.get(&id) {
                Some(Slot::Ready(s)) => return Ok(s.clone()),
                Some(Slot::Reserved) => {
                    return Ok(erase::<T, _>(DeferredSerializer::<T>::new()))
                }
                None => {
                    slots.insert(id, Slot::Reserved);
                }
            }
        }
        // 构造期间不持锁,成员类型可以自由递归解析
        let built = erase::<T, _>(T::serializer());
        let mut slots = self.slots.write();
        if let Some(Slot::Ready(existing)) = slots.get(&id) {
            // 并发构造时先完成者胜出
            return Ok(existing.clone());
        }
        tracing::debug!(value_type = std::any::type_name::<T>(), "serializer resolved");
        slots.insert(id, Slot::Ready(built.clone()));
        Ok(built)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.read().len()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::numeric::{DoubleSerializer, Int32Serializer};
    use crate::spec::ElementType;

    #[test]
    fn test_resolve_caches() {
        let registry = SerializerRegistry::new();
        let a = registry.resolve::<i32>().unwrap();
        let b = registry.resolve::<i32>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_dedups_equal_config() {
        let registry = SerializerRegistry::new();
        let a = registry.register::<i32, _>(Int32Serializer::default()).unwrap();
        let b = registry.register::<i32, _>(Int32Serializer::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_register_conflicting_config_rejected() {
        let registry = SerializerRegistry::new();
        registry.register::<i32, _>(Int32Serializer::default()).unwrap();
        let conflicting = Int32Serializer::with_representation(ElementType::Int64).unwrap();
        assert!(matches!(
            registry.register::<i32, _>(conflicting),
            Err(BsonError::Configuration(_))
        ));
    }

    #[test]
    fn test_lookup_by_type_id() {
        let registry = SerializerRegistry::new();
        assert!(registry.lookup(TypeId::of::<f64>()).is_none());
        registry.register::<f64, _>(DoubleSerializer::default()).unwrap();
        let found = registry.lookup(TypeId::of::<f64>()).unwrap();
        assert_eq!(found.value_type(), TypeId::of::<f64>());
    }

    #[test]
    fn test_resolve_composite() {
        let registry = SerializerRegistry::new();
        let s = registry.resolve::<Vec<Option<i64>>>().unwrap();
        assert_eq!(s.value_type(), TypeId::of::<Vec<Option<i64>>>());
    }
}
