//! 类映射模块
//!
//! `ClassMapBuilder` 用闭包把结构体成员登记为文档元素:
//! 每个成员持有读访问、写访问和元素序列化器,序列化按登记
//! 顺序写出,反序列化按元素名分发。额外能力:
//! - 跳过谓词: 成员值满足谓词时不写出
//! - 额外元素收集: 未登记的元素按到达顺序存入 `Document` 槽,
//!   序列化时追加在已登记成员之后
//! - 创建器: 不可变类型先把成员值收进记录,再一次性构造实例
//! - 实例复用: `deserialize_into` 只覆盖流中出现的成员,
//!   嵌套成员递归合并
//!
//! 判别符元素 `_t` 只在首位时被识别,由层级注册表决定是否写出。

use crate::reader::{read_value, BsonReader};
use crate::serializer::{BsonSerializer, DynValue};
use crate::writer::{write_value, BsonWriter};
use crate::{BsonError, BsonResult};
use compact_str::CompactString;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// 判别符元素名
pub const DISCRIMINATOR_ELEMENT: &str = "_t";

type SerializeFn<T> = Box<dyn Fn(&mut dyn BsonWriter, &T) -> BsonResult<()> + Send + Sync>;
type ApplyFn<T> = Box<dyn Fn(&mut dyn BsonReader, &mut T) -> BsonResult<()> + Send + Sync>;
type ReadBoxedFn = Box<dyn Fn(&mut dyn BsonReader) -> BsonResult<DynValue> + Send + Sync>;
type SkipFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type FactoryFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type CreatorFn<T> = Box<dyn Fn(&mut MemberValues) -> BsonResult<T> + Send + Sync>;
type ExtraGetFn<T> = Box<dyn Fn(&T) -> &crate::document::Document + Send + Sync>;
type ExtraGetMutFn<T> = Box<dyn Fn(&mut T) -> &mut crate::document::Document + Send + Sync>;

/// 单个成员的映射
struct MemberMap<T> {
    element_name: CompactString,
    serialize: SerializeFn<T>,
    apply: ApplyFn<T>,
    read_boxed: ReadBoxedFn,
    skip: Option<SkipFn<T>>,
}

/// 创建器的输入: 按元素名暂存的成员值
pub struct MemberValues {
    values: HashMap<CompactString, DynValue>,
}

impl MemberValues {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// 取出并还原指定成员,缺失或类型不符都报错
    pub fn take<M: Any>(&mut self, name: &str) -> BsonResult<M> {
        let boxed = self.values.remove(name).ok_or_else(|| {
            BsonError::Deserialization(format!("Missing member {:?} for creator", name))
        })?;
        boxed.downcast::<M>().map(|b| *b).map_err(|_| {
            BsonError::Deserialization(format!(
                "Member {:?} is not a {}",
                name,
                std::any::type_name::<M>()
            ))
        })
    }

    /// 取出成员,缺失时用默认值
    pub fn take_or<M: Any>(&mut self, name: &str, default: M) -> BsonResult<M> {
        if self.values.contains_key(name) {
            self.take(name)
        } else {
            Ok(default)
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// 完整的类映射
pub struct ClassMap<T> {
    members: Vec<MemberMap<T>>,
    by_name: HashMap<CompactString, usize>,
    factory: Option<FactoryFn<T>>,
    creator: Option<CreatorFn<T>>,
    extra_get: Option<ExtraGetFn<T>>,
    extra_get_mut: Option<ExtraGetMutFn<T>>,
    ignore_unknown: bool,
}

/// 类映射构造器
pub struct ClassMapBuilder<T> {
    map: ClassMap<T>,
}

impl<T: Any + Send + Sync> ClassMapBuilder<T> {
    pub fn new() -> Self {
        Self {
            map: ClassMap {
                members: Vec::new(),
                by_name: HashMap::new(),
                factory: None,
                creator: None,
                extra_get: None,
                extra_get_mut: None,
                ignore_unknown: false,
            },
        }
    }

    /// 以 `Default` 作为基础实例工厂
    pub fn for_default() -> Self
    where
        T: Default,
    {
        Self::new().with_factory(T::default)
    }

    /// 指定基础实例工厂
    pub fn with_factory(mut self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.map.factory = Some(Box::new(factory));
        self
    }

    /// 指定创建器
    ///
    /// # Brief
    /// 创建器模式下成员值先收集进 `MemberValues`,全部读完后
    /// 一次性构造实例,适用于没有可变 setter 的类型
    pub fn with_creator(
        mut self,
        creator: impl Fn(&mut MemberValues) -> BsonResult<T> + Send + Sync + 'static,
    ) -> Self {
        self.map.creator = Some(Box::new(creator));
        self
    }

    /// 登记一个成员
    pub fn member<M, S>(
        self,
        name: &str,
        get: impl Fn(&T) -> &M + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut M + Send + Sync + 'static,
        serializer: S,
    ) -> Self
    where
        M: Any + Send + Sync,
        S: BsonSerializer<M>,
    {
        self.member_inner(name, get, get_mut, serializer, None)
    }

    /// 登记一个带跳过谓词的成员
    ///
    /// # Brief
    /// 谓词为真时成员不写出;流中缺席的成员保持基础实例的值
    pub fn member_with_skip<M, S>(
        self,
        name: &str,
        get: impl Fn(&T) -> &M + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut M + Send + Sync + 'static,
        serializer: S,
        skip: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        M: Any + Send + Sync,
        S: BsonSerializer<M>,
    {
        self.member_inner(name, get, get_mut, serializer, Some(Box::new(skip) as SkipFn<T>))
    }

    fn member_inner<M, S>(
        mut self,
        name: &str,
        get: impl Fn(&T) -> &M + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut M + Send + Sync + 'static,
        serializer: S,
        skip: Option<SkipFn<T>>,
    ) -> Self
    where
        M: Any + Send + Sync,
        S: BsonSerializer<M>,
    {
        let serializer = Arc::new(serializer);
        let ser = serializer.clone();
        let app = serializer.clone();
        let member = MemberMap {
            element_name: CompactString::from(name),
            serialize: Box::new(move |writer, value| ser.serialize(writer, get(value))),
            apply: Box::new(move |reader, target| {
                app.deserialize_into(reader, get_mut(target))
            }),
            read_boxed: Box::new(move |reader| {
                Ok(Box::new(serializer.deserialize(reader)?) as DynValue)
            }),
            skip,
        };
        self.map
            .by_name
            .insert(member.element_name.clone(), self.map.members.len());
        self.map.members.push(member);
        self
    }

    /// 登记额外元素槽
    ///
    /// # Brief
    /// 未登记的元素按到达顺序进入该 `Document`,序列化时追加
    /// 在已登记成员之后
    pub fn extra_elements(
        mut self,
        get: impl Fn(&T) -> &crate::document::Document + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut crate::document::Document + Send + Sync + 'static,
    ) -> Self {
        self.map.extra_get = Some(Box::new(get));
        self.map.extra_get_mut = Some(Box::new(get_mut));
        self
    }

    /// 静默跳过未登记的元素而不是报错
    pub fn ignore_unknown_elements(mut self) -> Self {
        self.map.ignore_unknown = true;
        self
    }

    pub fn build(self) -> ClassMapSerializer<T> {
        ClassMapSerializer {
            map: Arc::new(self.map),
        }
    }
}

impl<T: Any + Send + Sync> Default for ClassMapBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 类映射序列化器
///
/// 相等性按映射实例的指针判断: 同一个 `build` 产物的克隆
/// 视为同一配置
pub struct ClassMapSerializer<T> {
    map: Arc<ClassMap<T>>,
}

impl<T> std::fmt::Debug for ClassMapSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassMapSerializer")
            .field("map", &Arc::as_ptr(&self.map))
            .finish()
    }
}

impl<T> Clone for ClassMapSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<T> PartialEq for ClassMapSerializer<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.map, &other.map)
    }
}

impl<T: Any + Send + Sync> ClassMapSerializer<T> {
    /// 在已打开的文档里写出全部成员与额外元素
    pub(crate) fn serialize_members(
        &self,
        writer: &mut dyn BsonWriter,
        value: &T,
    ) -> BsonResult<()> {
        for member in &self.map.members {
            if let Some(skip) = &member.skip {
                if skip(value) {
                    continue;
                }
            }
            writer.write_name(&member.element_name)?;
            (member.serialize)(writer, value)?;
        }
        if let Some(extra_get) = &self.map.extra_get {
            for (name, extra) in extra_get(value).iter() {
                writer.write_name(name)?;
                write_value(writer, extra)?;
            }
        }
        Ok(())
    }

    fn handle_unknown(
        &self,
        reader: &mut dyn BsonReader,
        name: &CompactString,
        extra: &mut Option<crate::document::Document>,
    ) -> BsonResult<()> {
        if self.map.extra_get_mut.is_some() {
            let value = read_value(reader)?;
            extra
                .get_or_insert_with(crate::document::Document::new)
                .insert(name.clone(), value);
            Ok(())
        } else if self.map.ignore_unknown {
            reader.skip_value()
        } else {
            Err(BsonError::Deserialization(format!(
                "Unknown element {:?} for {}",
                name,
                std::any::type_name::<T>()
            )))
        }
    }

    fn deserialize_with_creator(&self, reader: &mut dyn BsonReader) -> BsonResult<T> {
        let creator = self
            .map
            .creator
            .as_ref()
            .ok_or_else(|| BsonError::Configuration("No creator configured".to_string()))?;
        reader.read_start_document()?;
        let mut record = MemberValues::new();
        let mut extra = None;
        let mut first = true;
        while reader.read_element_type()?.is_some() {
            let name = reader.read_name()?;
            if first && name == DISCRIMINATOR_ELEMENT {
                first = false;
                reader.skip_value()?;
                continue;
            }
            first = false;
            match self.map.by_name.get(&name) {
                Some(&idx) => {
                    let boxed = (self.map.members[idx].read_boxed)(reader)?;
                    record.values.insert(name, boxed);
                }
                None => self.handle_unknown(reader, &name, &mut extra)?,
            }
        }
        reader.read_end_document()?;
        let mut instance = creator(&mut record)?;
        if let (Some(extra_get_mut), Some(extra)) = (&self.map.extra_get_mut, extra) {
            *extra_get_mut(&mut instance) = extra;
        }
        Ok(instance)
    }

    fn apply_elements(&self, reader: &mut dyn BsonReader, target: &mut T) -> BsonResult<()> {
        reader.read_start_document()?;
        let mut extra = None;
        let mut first = true;
        while reader.read_element_type()?.is_some() {
            let name = reader.read_name()?;
            if first && name == DISCRIMINATOR_ELEMENT {
                first = false;
                reader.skip_value()?;
                continue;
            }
            first = false;
            match self.map.by_name.get(&name) {
                Some(&idx) => (self.map.members[idx].apply)(reader, target)?,
                None => self.handle_unknown(reader, &name, &mut extra)?,
            }
        }
        reader.read_end_document()?;
        if let (Some(extra_get_mut), Some(extra)) = (&self.map.extra_get_mut, extra) {
            *extra_get_mut(target) = extra;
        }
        Ok(())
    }
}

impl<T: Any + Send + Sync> BsonSerializer<T> for ClassMapSerializer<T> {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &T) -> BsonResult<()> {
        writer.write_start_document()?;
        crate::hierarchy::write_nominal_discriminator(writer, TypeId::of::<T>())?;
        self.serialize_members(writer, value)?;
        writer.write_end_document()
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<T> {
        if self.map.creator.is_some() {
            return self.deserialize_with_creator(reader);
        }
        let factory = self.map.factory.as_ref().ok_or_else(|| {
            BsonError::Configuration(format!(
                "Class map for {} has neither factory nor creator",
                std::any::type_name::<T>()
            ))
        })?;
        let mut instance = factory();
        self.apply_elements(reader, &mut instance)?;
        Ok(instance)
    }

    /// 就地合并: 只覆盖流中出现的成员
    fn deserialize_into(&self, reader: &mut dyn BsonReader, target: &mut T) -> BsonResult<()> {
        if self.map.creator.is_some() {
            *target = self.deserialize_with_creator(reader)?;
            return Ok(());
        }
        self.apply_elements(reader, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::reader::DocumentReader;
    use crate::value::BsonValue;
    use crate::serializers::numeric::Int32Serializer;
    use crate::serializers::scalar::StringSerializer;
    use crate::writer::DocumentWriter;
    use crate::{bson, doc};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Player {
        name: String,
        score: i32,
        extras: Document,
    }

    fn player_serializer() -> ClassMapSerializer<Player> {
        ClassMapBuilder::for_default()
            .member(
                "name",
                |p: &Player| &p.name,
                |p: &mut Player| &mut p.name,
                StringSerializer::default(),
            )
            .member_with_skip(
                "score",
                |p: &Player| &p.score,
                |p: &mut Player| &mut p.score,
                Int32Serializer::default(),
                |p: &Player| p.score == 0,
            )
            .extra_elements(|p: &Player| &p.extras, |p: &mut Player| &mut p.extras)
            .build()
    }

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
    fn test_roundtrip() {
        let s = player_serializer();
        let player = Player {
            name: "rin".to_string(),
            score: 9,
            extras: Document::new(),
        };
        let written = write_with(&s, &player);
        assert_eq!(written, bson!({ "name": "rin", "score": 9 }));
        assert_eq!(read_with(&s, &written).unwrap(), player);
    }

    #[test]
    fn test_skip_predicate_omits_member() {
        let s = player_serializer();
        let player = Player {
            name: "rin".to_string(),
            score: 0,
            extras: Document::new(),
        };
        assert_eq!(write_with(&s, &player), bson!({ "name": "rin" }));
    }

    #[test]
    fn test_extra_elements_arrival_order() {
        let s = player_serializer();
        let written = bson!({ "name": "rin", "z": 1, "a": 2 });
        let player = read_with(&s, &written).unwrap();
        assert_eq!(player.extras, doc! { "z": 1, "a": 2 });
        // 额外元素追加在已登记成员之后,保持到达顺序
        assert_eq!(
            write_with(&s, &player),
            bson!({ "name": "rin", "z": 1, "a": 2 })
        );
    }

    #[test]
    fn test_unknown_element_rejected_without_sink() {
        let s = ClassMapBuilder::<Player>::for_default()
            .member(
                "name",
                |p: &Player| &p.name,
                |p: &mut Player| &mut p.name,
                StringSerializer::default(),
            )
            .build();
        assert!(matches!(
            read_with(&s, &bson!({ "name": "x", "stray": 1 })),
            Err(BsonError::Deserialization(_))
        ));
        let lenient = ClassMapBuilder::<Player>::for_default()
            .member(
                "name",
                |p: &Player| &p.name,
                |p: &mut Player| &mut p.name,
                StringSerializer::default(),
            )
            .ignore_unknown_elements()
            .build();
        let player = read_with(&lenient, &bson!({ "name": "x", "stray": 1 })).unwrap();
        assert_eq!(player.name, "x");
    }

    #[test]
    fn test_deserialize_into_merges() {
        let s = player_serializer();
        let mut target = Player {
            name: "old".to_string(),
            score: 42,
            extras: Document::new(),
        };
        let written = bson!({ "name": "new" });
        let mut reader = DocumentReader::for_value(&written);
        s.deserialize_into(&mut reader, &mut target).unwrap();
        assert_eq!(target.name, "new");
        // 流中缺席的成员保持原值
        assert_eq!(target.score, 42);
    }

    #[test]
    fn test_discriminator_only_honored_first() {
        let s = player_serializer();
        // 非首位的 _t 不是判别符,进入额外元素槽
        let written = bson!({ "name": "x", "_t": "Player" });
        let player = read_with(&s, &written).unwrap();
        assert_eq!(player.extras, doc! { "_t": "Player" });
        // 首位的 _t 被跳过
        let written = bson!({ "_t": "Player", "name": "x" });
        let player = read_with(&s, &written).unwrap();
        assert!(player.extras.is_empty());
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Frozen {
        id: i32,
        label: String,
    }

    #[test]
    fn test_creator_for_immutable_type() {
        let s = ClassMapBuilder::<Frozen>::new()
            .with_creator(|values| {
                Ok(Frozen {
                    id: values.take("id")?,
                    label: values.take_or("label", String::new())?,
                })
            })
            .member(
                "id",
                |f: &Frozen| &f.id,
                |f: &mut Frozen| &mut f.id,
                Int32Serializer::default(),
            )
            .member(
                "label",
                |f: &Frozen| &f.label,
                |f: &mut Frozen| &mut f.label,
                StringSerializer::default(),
            )
            .build();
        let frozen = Frozen {
            id: 5,
            label: "x".to_string(),
        };
        let written = write_with(&s, &frozen);
        assert_eq!(read_with(&s, &written).unwrap(), frozen);
        // label 缺席时取默认
        let partial = read_with(&s, &bson!({ "id": 5 })).unwrap();
        assert_eq!(partial.label, "");
        // id 缺席是错误
        assert!(read_with(&s, &bson!({ "label": "x" })).is_err());
    }

    #[test]
    fn test_nested_class_maps() {
        #[derive(Debug, Default, Clone, PartialEq)]
        struct Team {
            captain: Player,
            size: i32,
        }
        let s = ClassMapBuilder::<Team>::for_default()
            .member(
                "captain",
                |t: &Team| &t.captain,
                |t: &mut Team| &mut t.captain,
                player_serializer(),
            )
            .member(
                "size",
                |t: &Team| &t.size,
                |t: &mut Team| &mut t.size,
                Int32Serializer::default(),
            )
            .build();
        let team = Team {
            captain: Player {
                name: "rin".to_string(),
                score: 3,
                extras: Document::new(),
            },
            size: 11,
        };
        let written = write_with(&s, &team);
        assert_eq!(
            written,
            bson!({ "captain": { "name": "rin", "score": 3 }, "size": 11 })
        );
        assert_eq!(read_with(&s, &written).unwrap(), team);
    }

    #[test]
    fn test_ptr_equality() {
        let a = player_serializer();
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, player_serializer());
    }

    #[test]
    fn test_registry_accepts_class_map() {
        let registry = crate::registry::SerializerRegistry::new();
        let s = player_serializer();
        registry.register::<Player, _>(s.clone()).unwrap();
        let found = registry
            .lookup(std::any::TypeId::of::<Player>())
            .unwrap();
        assert_eq!(found.value_type(), std::any::TypeId::of::<Player>());
    }
}
