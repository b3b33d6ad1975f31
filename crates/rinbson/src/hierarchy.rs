//! 继承层级与判别符模块
//!
//! 把一组相关类型登记进 `HierarchyRegistry`: 每个类型携带
//! 判别符名、可选的父类型、根标记与强制标记。序列化时比较
//! 名义类型与实际类型决定是否写出判别符元素 `_t`;带根标记的
//! 谱系写出根起始的判别符链(数组形式),否则写单个字符串。
//! 反序列化用书签预读首元素 `_t`,按判别符分发到实际类型的
//! 序列化器,读完后书签回退保证实际反序列化从文档头开始。

use crate::classmap::{ClassMapSerializer, DISCRIMINATOR_ELEMENT};
use crate::reader::BsonReader;
use crate::serializer::{BsonSerializer, DynValue};
use crate::spec::ElementType;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use compact_str::CompactString;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// 层级内类型的对象安全序列化接口
pub trait DynClassSerializer: Send + Sync {
    /// 在已打开的文档里写出成员
    fn serialize_members_dyn(&self, writer: &mut dyn BsonWriter, value: &dyn Any)
        -> BsonResult<()>;

    /// 完整反序列化为装箱的动态值
    fn deserialize_dyn(&self, reader: &mut dyn BsonReader) -> BsonResult<DynValue>;
}

impl<T: Any + Send + Sync> DynClassSerializer for ClassMapSerializer<T> {
    fn serialize_members_dyn(
        &self,
        writer: &mut dyn BsonWriter,
        value: &dyn Any,
    ) -> BsonResult<()> {
        let value = value.downcast_ref::<T>().ok_or_else(|| {
            BsonError::Serialization(format!("Value is not a {}", std::any::type_name::<T>()))
        })?;
        self.serialize_members(writer, value)
    }

    fn deserialize_dyn(&self, reader: &mut dyn BsonReader) -> BsonResult<DynValue> {
        Ok(Box::new(BsonSerializer::deserialize(self, reader)?))
    }
}

/// 登记选项
#[derive(Debug, Clone)]
pub struct HierarchyOptions {
    discriminator: CompactString,
    parent: Option<TypeId>,
    root: bool,
    required: bool,
}

impl HierarchyOptions {
    pub fn new(discriminator: &str) -> Self {
        Self {
            discriminator: CompactString::from(discriminator),
            parent: None,
            root: false,
            required: false,
        }
    }

    /// 标记为谱系根,根起的判别符链以数组形式写出
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    /// 即使名义类型与实际类型一致也写判别符
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 指定父类型,父类型必须先登记
    pub fn parent<P: Any>(mut self) -> Self {
        self.parent = Some(TypeId::of::<P>());
        self
    }
}

#[derive(Clone)]
struct Entry {
    discriminator: CompactString,
    /// 根起始的判别符链,谱系无根标记时只含自身
    chain: Arc<[CompactString]>,
    rooted: bool,
    required: bool,
    type_name: &'static str,
    serializer: Arc<dyn DynClassSerializer>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TypeId, Entry>,
    by_name: HashMap<CompactString, TypeId>,
}

/// 继承层级注册表
pub struct HierarchyRegistry {
    inner: RwLock<Inner>,
}

static GLOBAL: Lazy<HierarchyRegistry> = Lazy::new(HierarchyRegistry::new);

impl HierarchyRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn global() -> &'static HierarchyRegistry {
        &GLOBAL
    }

    /// 登记一个层级成员
    ///
    /// # Brief
    /// 判别符必须唯一;父类型必须已登记,判别符链在登记时
    /// 沿父链算好并缓存
    pub fn register<T: Any + Send + Sync>(
        &self,
        options: HierarchyOptions,
        serializer: ClassMapSerializer<T>,
    ) -> BsonResult<()> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&options.discriminator) {
            return Err(BsonError::Configuration(format!(
                "Discriminator {:?} is already registered",
                options.discriminator
            )));
        }
        let type_id = TypeId::of::<T>();
        if inner.entries.contains_key(&type_id) {
            return Err(BsonError::Configuration(format!(
                "{} is already registered in the hierarchy",
                std::any::type_name::<T>()
            )));
        }
        let (chain, rooted) = match options.parent {
            Some(parent) => {
                let parent_entry = inner.entries.get(&parent).ok_or_else(|| {
                    BsonError::Configuration(format!(
                        "Parent of {} is not registered",
                        std::any::type_name::<T>()
                    ))
                })?;
                if options.root {
                    (vec![options.discriminator.clone()], true)
                } else if parent_entry.rooted {
                    let mut chain = parent_entry.chain.to_vec();
                    chain.push(options.discriminator.clone());
                    (chain, true)
                } else {
                    (vec![options.discriminator.clone()], false)
                }
            }
            None => (vec![options.discriminator.clone()], options.root),
        };
        tracing::debug!(
            value_type = std::any::type_name::<T>(),
            discriminator = %options.discriminator,
            rooted,
            "hierarchy member registered"
        );
        inner.by_name.insert(options.discriminator.clone(), type_id);
        inner.entries.insert(
            type_id,
            Entry {
                discriminator: options.discriminator,
                chain: chain.into(),
                rooted,
                required: options.required,
                type_name: std::any::type_name::<T>(),
                serializer: Arc::new(serializer),
            },
        );
        Ok(())
    }

    fn entry(&self, type_id: TypeId) -> Option<Entry> {
        self.inner.read().entries.get(&type_id).cloned()
    }

    fn type_for(&self, discriminator: &str) -> Option<TypeId> {
        self.inner.read().by_name.get(discriminator).copied()
    }
}

impl Default for HierarchyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn write_discriminator(writer: &mut dyn BsonWriter, entry: &Entry) -> BsonResult<()> {
    writer.write_name(DISCRIMINATOR_ELEMENT)?;
    if entry.rooted {
        writer.write_start_array()?;
        for part in entry.chain.iter() {
            writer.write_string(part)?;
        }
        writer.write_end_array()
    } else {
        writer.write_string(&entry.discriminator)
    }
}

/// 非多态路径的判别符写出
///
/// # Brief
/// 类映射序列化器直接序列化时调用;类型未登记或未要求
/// 判别符时什么都不写
pub(crate) fn write_nominal_discriminator(
    writer: &mut dyn BsonWriter,
    type_id: TypeId,
) -> BsonResult<()> {
    if let Some(entry) = HierarchyRegistry::global().entry(type_id) {
        if entry.required || entry.rooted {
            write_discriminator(writer, &entry)?;
        }
    }
    Ok(())
}

/// 按实际类型序列化一个层级成员
pub fn serialize(writer: &mut dyn BsonWriter, nominal: TypeId, value: &dyn Any) -> BsonResult<()> {
    let actual = value.type_id();
    let entry = HierarchyRegistry::global().entry(actual).ok_or_else(|| {
        BsonError::Serialization("Actual type is not registered in the hierarchy".to_string())
    })?;
    writer.write_start_document()?;
    if actual != nominal || entry.required || entry.rooted {
        write_discriminator(writer, &entry)?;
    }
    entry.serializer.serialize_members_dyn(writer, value)?;
    writer.write_end_document()
}

/// 预读判别符并分发到实际类型
///
/// # Brief
/// 只有首元素位置的 `_t` 被当作判别符;数组形式取最末一项
/// (最具体的类型)。预读后回退书签,实际反序列化从文档头
/// 重新开始。
pub fn deserialize(reader: &mut dyn BsonReader, nominal: TypeId) -> BsonResult<DynValue> {
    let registry = HierarchyRegistry::global();
    let mark = reader.bookmark();
    reader.read_start_document()?;
    let discriminator = match reader.read_element_type()? {
        Some(tag) => {
            let name = reader.read_name()?;
            if name == DISCRIMINATOR_ELEMENT {
                Some(read_discriminator(reader, tag)?)
            } else {
                None
            }
        }
        None => None,
    };
    reader.return_to_bookmark(mark)?;
    let type_id = match &discriminator {
        Some(name) => registry.type_for(name).ok_or_else(|| {
            BsonError::Deserialization(format!("Unknown discriminator {:?}", name))
        })?,
        None => nominal,
    };
    let entry = registry.entry(type_id).ok_or_else(|| {
        BsonError::Deserialization("Nominal type is not registered in the hierarchy".to_string())
    })?;
    entry.serializer.deserialize_dyn(reader)
}

fn read_discriminator(
    reader: &mut dyn BsonReader,
    tag: ElementType,
) -> BsonResult<CompactString> {
    match tag {
        ElementType::String => reader.read_string(),
        ElementType::Array => {
            reader.read_start_array()?;
            let mut last = None;
            while let Some(part) = reader.read_element_type()? {
                if part != ElementType::String {
                    return Err(BsonError::Format(format!(
                        "Discriminator array element must be a string, got {}",
                        part
                    )));
                }
                last = Some(reader.read_string()?);
            }
            reader.read_end_array()?;
            last.ok_or_else(|| {
                BsonError::Format("Discriminator array must not be empty".to_string())
            })
        }
        other => Err(BsonError::Format(format!(
            "Discriminator must be a string or array of strings, got {}",
            other
        ))),
    }
}

/// 多态成员序列化器
///
/// 成员以 `DynValue` 持有实际值,名义类型在构造时固定
pub struct PolymorphicSerializer {
    nominal: TypeId,
    nominal_name: &'static str,
}

impl PolymorphicSerializer {
    pub fn new<T: Any>() -> Self {
        Self {
            nominal: TypeId::of::<T>(),
            nominal_name: std::any::type_name::<T>(),
        }
    }

    pub fn nominal(&self) -> TypeId {
        self.nominal
    }
}

impl PartialEq for PolymorphicSerializer {
    fn eq(&self, other: &Self) -> bool {
        self.nominal == other.nominal
    }
}

impl std::fmt::Debug for PolymorphicSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolymorphicSerializer")
            .field("nominal", &self.nominal_name)
            .finish()
    }
}

impl BsonSerializer<DynValue> for PolymorphicSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &DynValue) -> BsonResult<()> {
        serialize(writer, self.nominal, &**value)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<DynValue> {
        deserialize(reader, self.nominal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classmap::ClassMapBuilder;
    use crate::reader::DocumentReader;
    use crate::serializers::numeric::Int32Serializer;
    use crate::value::BsonValue;
    use crate::writer::DocumentWriter;
    use crate::{bson, doc};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Animal {
        age: i32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Dog {
        age: i32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct GuideDog {
        age: i32,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct HerdingDog {
        age: i32,
        flock: i32,
    }

    fn age_map<T: Any + Send + Sync + Default>(
        get: impl Fn(&T) -> &i32 + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut i32 + Send + Sync + 'static,
    ) -> ClassMapSerializer<T> {
        ClassMapBuilder::for_default()
            .member("age", get, get_mut, Int32Serializer::default())
            .build()
    }

    fn setup() -> &'static HierarchyRegistry {
        static ONCE: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();
        ONCE.get_or_init(|| {
            let registry = HierarchyRegistry::global();
            registry
                .register::<Animal>(
                    HierarchyOptions::new("Animal~"),
                    age_map(|a: &Animal| &a.age, |a: &mut Animal| &mut a.age),
                )
                .unwrap();
            registry
                .register::<Dog>(
                    HierarchyOptions::new("Dog~").parent::<Animal>().root(),
                    age_map(|d: &Dog| &d.age, |d: &mut Dog| &mut d.age),
                )
                .unwrap();
            registry
                .register::<GuideDog>(
                    HierarchyOptions::new("GuideDog~").parent::<Dog>(),
                    age_map(|d: &GuideDog| &d.age, |d: &mut GuideDog| &mut d.age),
                )
                .unwrap();
            registry
                .register::<HerdingDog>(
                    HierarchyOptions::new("HerdingDog~").parent::<GuideDog>(),
                    ClassMapBuilder::for_default()
                        .member(
                            "age",
                            |d: &HerdingDog| &d.age,
                            |d: &mut HerdingDog| &mut d.age,
                            Int32Serializer::default(),
                        )
                        .member(
                            "flock",
                            |d: &HerdingDog| &d.flock,
                            |d: &mut HerdingDog| &mut d.flock,
                            Int32Serializer::default(),
                        )
                        .build(),
                )
                .unwrap();
        });
        HierarchyRegistry::global()
    }

    fn serialize_as<T: Any>(value: &dyn Any) -> BsonValue {
        setup();
        let mut writer = DocumentWriter::new();
        serialize(&mut writer, TypeId::of::<T>(), value).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_rooted_chain_written_for_all_nominals() {
        let dog = HerdingDog { age: 3, flock: 40 };
        let expected = bson!({
            "_t": ["Dog~", "GuideDog~", "HerdingDog~"],
            "age": 3,
            "flock": 40
        });
        assert_eq!(serialize_as::<Animal>(&dog), expected);
        assert_eq!(serialize_as::<Dog>(&dog), expected);
        assert_eq!(serialize_as::<GuideDog>(&dog), expected);
        // 名义类型等于实际类型时,带根谱系仍写链
        assert_eq!(serialize_as::<HerdingDog>(&dog), expected);
    }

    #[test]
    fn test_unrooted_single_discriminator() {
        setup();
        let animal = Animal { age: 7 };
        let mut writer = DocumentWriter::new();
        serialize(&mut writer, TypeId::of::<Dog>(), &animal).unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            bson!({ "_t": "Animal~", "age": 7 })
        );
        // 名义等于实际且未要求时不写判别符
        let mut writer = DocumentWriter::new();
        serialize(&mut writer, TypeId::of::<Animal>(), &animal).unwrap();
        assert_eq!(writer.finish().unwrap(), bson!({ "age": 7 }));
    }

    #[test]
    fn test_deserialize_dispatches_on_discriminator() {
        setup();
        let value = bson!({
            "_t": ["Dog~", "GuideDog~", "HerdingDog~"],
            "age": 3,
            "flock": 40
        });
        let mut reader = DocumentReader::for_value(&value);
        let boxed = deserialize(&mut reader, TypeId::of::<Dog>()).unwrap();
        let dog = boxed.downcast::<HerdingDog>().unwrap();
        assert_eq!(*dog, HerdingDog { age: 3, flock: 40 });
    }

    #[test]
    fn test_deserialize_without_discriminator_uses_nominal() {
        setup();
        let value = bson!({ "age": 5 });
        let mut reader = DocumentReader::for_value(&value);
        let boxed = deserialize(&mut reader, TypeId::of::<Animal>()).unwrap();
        assert_eq!(*boxed.downcast::<Animal>().unwrap(), Animal { age: 5 });
    }

    #[test]
    fn test_unknown_discriminator_rejected() {
        setup();
        let value = bson!({ "_t": "Cat~", "age": 1 });
        let mut reader = DocumentReader::for_value(&value);
        assert!(matches!(
            deserialize(&mut reader, TypeId::of::<Animal>()),
            Err(BsonError::Deserialization(_))
        ));
    }

    #[test]
    fn test_polymorphic_serializer_roundtrip() {
        setup();
        let s = PolymorphicSerializer::new::<Dog>();
        let value: DynValue = Box::new(GuideDog { age: 2 });
        let mut writer = DocumentWriter::new();
        s.serialize(&mut writer, &value).unwrap();
        let written = writer.finish().unwrap();
        assert_eq!(written, bson!({ "_t": ["Dog~", "GuideDog~"], "age": 2 }));
        let mut reader = DocumentReader::for_value(&written);
        let restored = s.deserialize(&mut reader).unwrap();
        assert_eq!(
            *restored.downcast::<GuideDog>().unwrap(),
            GuideDog { age: 2 }
        );
    }

    #[test]
    fn test_discriminator_not_first_is_plain_element() {
        setup();
        // 非首位 _t 被当普通元素,此处类映射没有额外元素槽,报错
        let value = doc! { "age": 1, "_t": "Dog~" }.to_value();
        let mut reader = DocumentReader::for_value(&value);
        assert!(deserialize(&mut reader, TypeId::of::<Dog>()).is_err());
    }
}
