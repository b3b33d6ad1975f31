//! 容器序列化器
//!
//! `Option`、`Vec`、定长数组、矩形二维/三维数组、元组与有序
//! 集合。容器序列化器持有元素序列化器,组合关系在编译期经
//! `HasSerializer` 链条成型,运行时没有查表开销。

use crate::reader::BsonReader;
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::ElementType;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};
use std::any::Any;
use std::marker::PhantomData;

fn expect_array(reader: &dyn BsonReader, target: &str) -> BsonResult<()> {
    match reader.current_type() {
        Some(ElementType::Array) => Ok(()),
        Some(other) => Err(BsonError::Format(format!(
            "Cannot deserialize {} from {}",
            target, other
        ))),
        None => Err(BsonError::Format("No pending element".to_string())),
    }
}

/// `Option<T>` 序列化器
///
/// `None` 写 Null;读到 Null 或 Undefined 得 `None`
pub struct OptionSerializer<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> OptionSerializer<T, S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, S: PartialEq> PartialEq for OptionSerializer<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, S> BsonSerializer<Option<T>> for OptionSerializer<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Option<T>) -> BsonResult<()> {
        match value {
            Some(inner) => self.inner.serialize(writer, inner),
            None => writer.write_null(),
        }
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Option<T>> {
        match reader.current_type() {
            Some(ElementType::Null) => {
                reader.read_null()?;
                Ok(None)
            }
            Some(ElementType::Undefined) => {
                reader.read_undefined()?;
                Ok(None)
            }
            _ => Ok(Some(self.inner.deserialize(reader)?)),
        }
    }
}

impl<T: HasSerializer> HasSerializer for Option<T> {
    type Serializer = OptionSerializer<T, T::Serializer>;

    fn serializer() -> Self::Serializer {
        OptionSerializer::new(T::serializer())
    }
}

/// `Box<T>` 序列化器,纯转发
pub struct BoxSerializer<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> BoxSerializer<T, S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, S: PartialEq> PartialEq for BoxSerializer<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, S> BsonSerializer<Box<T>> for BoxSerializer<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Box<T>) -> BsonResult<()> {
        self.inner.serialize(writer, value)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Box<T>> {
        Ok(Box::new(self.inner.deserialize(reader)?))
    }

    fn deserialize_into(&self, reader: &mut dyn BsonReader, target: &mut Box<T>) -> BsonResult<()> {
        self.inner.deserialize_into(reader, target)
    }
}

impl<T: HasSerializer> HasSerializer for Box<T> {
    type Serializer = BoxSerializer<T, T::Serializer>;

    fn serializer() -> Self::Serializer {
        BoxSerializer::new(T::serializer())
    }
}

/// `Vec<T>` 序列化器
pub struct VecSerializer<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> VecSerializer<T, S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, S: PartialEq> PartialEq for VecSerializer<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, S> BsonSerializer<Vec<T>> for VecSerializer<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Vec<T>) -> BsonResult<()> {
        writer.write_start_array()?;
        for item in value {
            self.inner.serialize(writer, item)?;
        }
        writer.write_end_array()
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Vec<T>> {
        let mut items = Vec::new();
        self.deserialize_into(reader, &mut items)?;
        Ok(items)
    }

    /// 清空后重新填充,复用已分配的容量
    fn deserialize_into(&self, reader: &mut dyn BsonReader, target: &mut Vec<T>) -> BsonResult<()> {
        expect_array(reader, "Vec")?;
        reader.read_start_array()?;
        target.clear();
        while reader.read_element_type()?.is_some() {
            target.push(self.inner.deserialize(reader)?);
        }
        reader.read_end_array()
    }
}

impl<T: HasSerializer> HasSerializer for Vec<T> {
    type Serializer = VecSerializer<T, T::Serializer>;

    fn serializer() -> Self::Serializer {
        VecSerializer::new(T::serializer())
    }
}

/// 定长数组序列化器
///
/// 元素个数必须与数组长度一致,多一个少一个都是格式错误
pub struct FixedArraySerializer<T, S, const N: usize> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, const N: usize> FixedArraySerializer<T, S, N> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    fn arity_error(found: usize) -> BsonError {
        BsonError::Format(format!("Expected {} array elements, got {}", N, found))
    }
}

impl<T, S: PartialEq, const N: usize> PartialEq for FixedArraySerializer<T, S, N> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, S, const N: usize> BsonSerializer<[T; N]> for FixedArraySerializer<T, S, N>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &[T; N]) -> BsonResult<()> {
        writer.write_start_array()?;
        for item in value {
            self.inner.serialize(writer, item)?;
        }
        writer.write_end_array()
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<[T; N]> {
        expect_array(reader, "array")?;
        reader.read_start_array()?;
        let mut items = Vec::with_capacity(N);
        while reader.read_element_type()?.is_some() {
            if items.len() == N {
                return Err(Self::arity_error(N + 1));
            }
            items.push(self.inner.deserialize(reader)?);
        }
        reader.read_end_array()?;
        if items.len() != N {
            return Err(Self::arity_error(items.len()));
        }
        match items.try_into() {
            Ok(array) => Ok(array),
            Err(_) => Err(Self::arity_error(N)),
        }
    }

    fn deserialize_into(
        &self,
        reader: &mut dyn BsonReader,
        target: &mut [T; N],
    ) -> BsonResult<()> {
        expect_array(reader, "array")?;
        reader.read_start_array()?;
        let mut read = 0usize;
        // 就地覆盖前缀,来源不足 N 个时尾部槽位保持原值
        while reader.read_element_type()?.is_some() {
            if read == N {
                return Err(Self::arity_error(N + 1));
            }
            self.inner.deserialize_into(reader, &mut target[read])?;
            read += 1;
        }
        reader.read_end_array()
    }
}

impl<T: HasSerializer, const N: usize> HasSerializer for [T; N] {
    type Serializer = FixedArraySerializer<T, T::Serializer, N>;

    fn serializer() -> Self::Serializer {
        FixedArraySerializer::new(T::serializer())
    }
}

/// 矩形二维数组
///
/// 行优先存储,所有行等长。线上形式是数组的数组,
/// 行数为零时列数信息不进入线上表示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array2<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> Array2<T> {
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> BsonResult<Self> {
        if data.len() != rows * cols {
            return Err(BsonError::Configuration(format!(
                "Array2 of {}x{} requires {} elements, got {}",
                rows,
                cols,
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn row(&self, row: usize) -> Option<&[T]> {
        if row < self.rows {
            Some(&self.data[row * self.cols..(row + 1) * self.cols])
        } else {
            None
        }
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}

/// `Array2<T>` 序列化器
pub struct Array2Serializer<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Array2Serializer<T, S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, S: PartialEq> PartialEq for Array2Serializer<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, S> BsonSerializer<Array2<T>> for Array2Serializer<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Array2<T>) -> BsonResult<()> {
        writer.write_start_array()?;
        for row in 0..value.rows {
            writer.write_start_array()?;
            for col in 0..value.cols {
                // 行列都在界内,get 不会失败
                if let Some(item) = value.get(row, col) {
                    self.inner.serialize(writer, item)?;
                }
            }
            writer.write_end_array()?;
        }
        writer.write_end_array()
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Array2<T>> {
        expect_array(reader, "Array2")?;
        reader.read_start_array()?;
        let mut data = Vec::new();
        let mut rows = 0usize;
        let mut cols = None;
        while reader.read_element_type()?.is_some() {
            expect_array(reader, "Array2 row")?;
            reader.read_start_array()?;
            let mut row_len = 0usize;
            while reader.read_element_type()?.is_some() {
                data.push(self.inner.deserialize(reader)?);
                row_len += 1;
            }
            reader.read_end_array()?;
            match cols {
                None => cols = Some(row_len),
                Some(expected) if expected == row_len => {}
                Some(expected) => {
                    return Err(BsonError::Format(format!(
                        "Jagged rows in rectangular array: {} vs {}",
                        expected, row_len
                    )))
                }
            }
            rows += 1;
        }
        reader.read_end_array()?;
        Array2::new(rows, cols.unwrap_or(0), data)
    }
}

impl<T: HasSerializer> HasSerializer for Array2<T> {
    type Serializer = Array2Serializer<T, T::Serializer>;

    fn serializer() -> Self::Serializer {
        Array2Serializer::new(T::serializer())
    }
}

/// 矩形三维数组,最外层维度优先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array3<T> {
    dims: [usize; 3],
    data: Vec<T>,
}

impl<T> Array3<T> {
    pub fn new(dims: [usize; 3], data: Vec<T>) -> BsonResult<Self> {
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(BsonError::Configuration(format!(
                "Array3 of {}x{}x{} requires {} elements, got {}",
                dims[0],
                dims[1],
                dims[2],
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<&T> {
        if i < self.dims[0] && j < self.dims[1] && k < self.dims[2] {
            self.data
                .get((i * self.dims[1] + j) * self.dims[2] + k)
        } else {
            None
        }
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}

/// `Array3<T>` 序列化器
pub struct Array3Serializer<T, S> {
    inner: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Array3Serializer<T, S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T, S: PartialEq> PartialEq for Array3Serializer<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T, S> BsonSerializer<Array3<T>> for Array3Serializer<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Array3<T>) -> BsonResult<()> {
        writer.write_start_array()?;
        for i in 0..value.dims[0] {
            writer.write_start_array()?;
            for j in 0..value.dims[1] {
                writer.write_start_array()?;
                for k in 0..value.dims[2] {
                    if let Some(item) = value.get(i, j, k) {
                        self.inner.serialize(writer, item)?;
                    }
                }
                writer.write_end_array()?;
            }
            writer.write_end_array()?;
        }
        writer.write_end_array()
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Array3<T>> {
        expect_array(reader, "Array3")?;
        reader.read_start_array()?;
        let mut data = Vec::new();
        let mut dim0 = 0usize;
        let mut dim1 = None;
        let mut dim2 = None;
        while reader.read_element_type()?.is_some() {
            expect_array(reader, "Array3 plane")?;
            reader.read_start_array()?;
            let mut plane_rows = 0usize;
            while reader.read_element_type()?.is_some() {
                expect_array(reader, "Array3 row")?;
                reader.read_start_array()?;
                let mut row_len = 0usize;
                while reader.read_element_type()?.is_some() {
                    data.push(self.inner.deserialize(reader)?);
                    row_len += 1;
                }
                reader.read_end_array()?;
                match dim2 {
                    None => dim2 = Some(row_len),
                    Some(expected) if expected == row_len => {}
                    Some(expected) => {
                        return Err(BsonError::Format(format!(
                            "Jagged rows in rectangular array: {} vs {}",
                            expected, row_len
                        )))
                    }
                }
                plane_rows += 1;
            }
            reader.read_end_array()?;
            match dim1 {
                None => dim1 = Some(plane_rows),
                Some(expected) if expected == plane_rows => {}
                Some(expected) => {
                    return Err(BsonError::Format(format!(
                        "Jagged planes in rectangular array: {} vs {}",
                        expected, plane_rows
                    )))
                }
            }
            dim0 += 1;
        }
        reader.read_end_array()?;
        Array3::new([dim0, dim1.unwrap_or(0), dim2.unwrap_or(0)], data)
    }
}

impl<T: HasSerializer> HasSerializer for Array3<T> {
    type Serializer = Array3Serializer<T, T::Serializer>;

    fn serializer() -> Self::Serializer {
        Array3Serializer::new(T::serializer())
    }
}

/// 已按主键排序的集合
///
/// 包装器只保证构造时排序完成,线上形式与普通数组一致,
/// 读回时保持流中顺序
#[derive(Debug, Clone)]
pub struct OrderedVec<T> {
    items: Vec<T>,
    then_by_message: String,
}

const DEFAULT_THEN_BY_MESSAGE: &str =
    "then_by_key on an ordered collection; sort with a composite key instead";

impl<T> OrderedVec<T> {
    /// 按主键排序构造
    pub fn sorted_by_key<K: Ord>(mut items: Vec<T>, mut key: impl FnMut(&T) -> K) -> Self {
        items.sort_by_key(|item| key(item));
        Self {
            items,
            then_by_message: DEFAULT_THEN_BY_MESSAGE.to_string(),
        }
    }

    /// 从已经有序的数据构造,不再排序
    pub fn from_sorted(items: Vec<T>) -> Self {
        Self {
            items,
            then_by_message: DEFAULT_THEN_BY_MESSAGE.to_string(),
        }
    }

    /// 替换二级排序报错文本
    pub fn with_then_by_message(mut self, message: impl Into<String>) -> Self {
        self.then_by_message = message.into();
        self
    }

    /// 二级排序不受支持
    ///
    /// # Brief
    /// 次级键无法在已排序的包装上稳定施加,报错文本在构造
    /// 侧配置
    pub fn then_by_key<K: Ord>(self, _key: impl FnMut(&T) -> K) -> BsonResult<Self> {
        Err(BsonError::NotSupported(self.then_by_message))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: PartialEq> PartialEq for OrderedVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Eq> Eq for OrderedVec<T> {}

/// `OrderedVec<T>` 序列化器
///
/// 构造时携带二级排序的报错文本,读出的集合沿用该文本
pub struct OrderedVecSerializer<T, S> {
    inner: VecSerializer<T, S>,
    then_by_message: String,
}

impl<T, S> OrderedVecSerializer<T, S> {
    pub fn new(inner: S, then_by_message: impl Into<String>) -> Self {
        Self {
            inner: VecSerializer::new(inner),
            then_by_message: then_by_message.into(),
        }
    }
}

impl<T, S: PartialEq> PartialEq for OrderedVecSerializer<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner && self.then_by_message == other.then_by_message
    }
}

impl<T, S> BsonSerializer<OrderedVec<T>> for OrderedVecSerializer<T, S>
where
    T: Any + Send + Sync,
    S: BsonSerializer<T>,
{
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &OrderedVec<T>) -> BsonResult<()> {
        self.inner.serialize(writer, &value.items)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<OrderedVec<T>> {
        Ok(OrderedVec {
            items: self.inner.deserialize(reader)?,
            then_by_message: self.then_by_message.clone(),
        })
    }
}

impl<T: HasSerializer> HasSerializer for OrderedVec<T> {
    type Serializer = OrderedVecSerializer<T, T::Serializer>;

    fn serializer() -> Self::Serializer {
        OrderedVecSerializer::new(T::serializer(), DEFAULT_THEN_BY_MESSAGE)
    }
}

macro_rules! tuple_serializer {
    ($name:ident, $len:expr, $(($t:ident, $s:ident, $idx:tt)),+) => {
        /// 元组序列化器,线上形式是定长数组
        pub struct $name<$($t,)+ $($s,)+> {
            serializers: ($($s,)+),
            _marker: PhantomData<fn() -> ($($t,)+)>,
        }

        impl<$($t,)+ $($s,)+> $name<$($t,)+ $($s,)+> {
            pub fn new(serializers: ($($s,)+)) -> Self {
                Self {
                    serializers,
                    _marker: PhantomData,
                }
            }
        }

        impl<$($t,)+ $($s: PartialEq,)+> PartialEq for $name<$($t,)+ $($s,)+> {
            fn eq(&self, other: &Self) -> bool {
                self.serializers == other.serializers
            }
        }

        impl<$($t,)+ $($s,)+> BsonSerializer<($($t,)+)> for $name<$($t,)+ $($s,)+>
        where
            $($t: Any + Send + Sync,)+
            $($s: BsonSerializer<$t>,)+
        {
            fn serialize(
                &self,
                writer: &mut dyn BsonWriter,
                value: &($($t,)+),
            ) -> BsonResult<()> {
                writer.write_start_array()?;
                $(self.serializers.$idx.serialize(writer, &value.$idx)?;)+
                writer.write_end_array()
            }

            fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<($($t,)+)> {
                expect_array(reader, "tuple")?;
                reader.read_start_array()?;
                let value = ($(
                    {
                        if reader.read_element_type()?.is_none() {
                            return Err(BsonError::Format(format!(
                                "Tuple requires {} array elements",
                                $len
                            )));
                        }
                        self.serializers.$idx.deserialize(reader)?
                    },
                )+);
                if reader.read_element_type()?.is_some() {
                    return Err(BsonError::Format(format!(
                        "Tuple requires {} array elements",
                        $len
                    )));
                }
                reader.read_end_array()?;
                Ok(value)
            }
        }

        impl<$($t: HasSerializer,)+> HasSerializer for ($($t,)+) {
            type Serializer = $name<$($t,)+ $($t::Serializer,)+>;

            fn serializer() -> Self::Serializer {
                $name::new(($($t::serializer(),)+))
            }
        }
    };
}

tuple_serializer!(Tuple1Serializer, 1, (T0, S0, 0));
tuple_serializer!(Tuple2Serializer, 2, (T0, S0, 0), (T1, S1, 1));
tuple_serializer!(Tuple3Serializer, 3, (T0, S0, 0), (T1, S1, 1), (T2, S2, 2));
tuple_serializer!(
    Tuple4Serializer,
    4,
    (T0, S0, 0),
    (T1, S1, 1),
    (T2, S2, 2),
    (T3, S3, 3)
);
tuple_serializer!(
    Tuple5Serializer,
    5,
    (T0, S0, 0),
    (T1, S1, 1),
    (T2, S2, 2),
    (T3, S3, 3),
    (T4, S4, 4)
);
tuple_serializer!(
    Tuple6Serializer,
    6,
    (T0, S0, 0),
    (T1, S1, 1),
    (T2, S2, 2),
    (T3, S3, 3),
    (T4, S4, 4),
    (T5, S5, 5)
);
tuple_serializer!(
    Tuple7Serializer,
    7,
    (T0, S0, 0),
    (T1, S1, 1),
    (T2, S2, 2),
    (T3, S3, 3),
    (T4, S4, 4),
    (T5, S5, 5),
    (T6, S6, 6)
);
tuple_serializer!(
    Tuple8Serializer,
    8,
    (T0, S0, 0),
    (T1, S1, 1),
    (T2, S2, 2),
    (T3, S3, 3),
    (T4, S4, 4),
    (T5, S5, 5),
    (T6, S6, 6),
    (T7, S7, 7)
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson;
    use crate::reader::DocumentReader;
    use crate::value::BsonValue;
    use crate::writer::DocumentWriter;

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
    fn test_option_null_roundtrip() {
        let s = <Option<i32>>::serializer();
        assert_eq!(write_with(&s, &None), BsonValue::Null);
        assert_eq!(write_with(&s, &Some(3)), BsonValue::Int32(3));
        assert_eq!(read_with(&s, &BsonValue::Null).unwrap(), None);
        assert_eq!(read_with(&s, &BsonValue::Undefined).unwrap(), None);
        assert_eq!(read_with(&s, &BsonValue::Int32(3)).unwrap(), Some(3));
    }

    #[test]
    fn test_vec_roundtrip() {
        let s = <Vec<i64>>::serializer();
        let value = vec![1i64, 2, 3];
        let written = write_with(&s, &value);
        assert_eq!(written, bson!([1i64, 2i64, 3i64]));
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }

    #[test]
    fn test_vec_deserialize_into_clears_target() {
        let s = <Vec<i32>>::serializer();
        let written = bson!([5, 6]);
        let mut target = vec![9, 9, 9, 9];
        let mut reader = DocumentReader::for_value(&written);
        s.deserialize_into(&mut reader, &mut target).unwrap();
        assert_eq!(target, vec![5, 6]);
    }

    #[test]
    fn test_fixed_array_exact_arity() {
        let s = <[i32; 3]>::serializer();
        let written = write_with(&s, &[1, 2, 3]);
        assert_eq!(read_with(&s, &written).unwrap(), [1, 2, 3]);
        assert!(matches!(
            read_with(&s, &bson!([1, 2])),
            Err(BsonError::Format(_))
        ));
        assert!(matches!(
            read_with(&s, &bson!([1, 2, 3, 4])),
            Err(BsonError::Format(_))
        ));
    }

    #[test]
    fn test_fixed_array_deserialize_into_prefix() {
        let s = <[i32; 3]>::serializer();
        let mut target = [9, 9, 9];
        let value = bson!([1, 2]);
        let mut reader = DocumentReader::for_value(&value);
        s.deserialize_into(&mut reader, &mut target).unwrap();
        assert_eq!(target, [1, 2, 9]);

        let value = bson!([1, 2, 3, 4]);
        let mut reader = DocumentReader::for_value(&value);
        assert!(matches!(
            s.deserialize_into(&mut reader, &mut target),
            Err(BsonError::Format(_))
        ));
    }

    #[test]
    fn test_array2_roundtrip() {
        let s = Array2::<i32>::serializer();
        let value = Array2::new(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let written = write_with(&s, &value);
        assert_eq!(written, bson!([[1, 2, 3], [4, 5, 6]]));
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }

    #[test]
    fn test_array2_zero_columns() {
        let s = Array2::<i32>::serializer();
        let value = Array2::new(2, 0, vec![]).unwrap();
        let written = write_with(&s, &value);
        assert_eq!(written, bson!([[], []]));
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }

    #[test]
    fn test_array2_jagged_rejected() {
        let s = Array2::<i32>::serializer();
        assert!(matches!(
            read_with(&s, &bson!([[1, 2], [3]])),
            Err(BsonError::Format(_))
        ));
    }

    #[test]
    fn test_array3_roundtrip() {
        let s = Array3::<i32>::serializer();
        let value = Array3::new([2, 2, 2], (1..=8).collect()).unwrap();
        let written = write_with(&s, &value);
        assert_eq!(
            written,
            bson!([[[1, 2], [3, 4]], [[5, 6], [7, 8]]])
        );
        let back = read_with(&s, &written).unwrap();
        assert_eq!(back, value);
        assert_eq!(back.get(1, 0, 1), Some(&6));
    }

    #[test]
    fn test_tuple_roundtrip_and_arity() {
        let s = <(i32, String, bool)>::serializer();
        let value = (7, "x".to_string(), true);
        let written = write_with(&s, &value);
        assert_eq!(written, bson!([7, "x", true]));
        assert_eq!(read_with(&s, &written).unwrap(), value);
        assert!(matches!(
            read_with(&s, &bson!([7, "x"])),
            Err(BsonError::Format(_))
        ));
        assert!(matches!(
            read_with(&s, &bson!([7, "x", true, 0])),
            Err(BsonError::Format(_))
        ));
    }

    #[test]
    fn test_ordered_vec() {
        let value = OrderedVec::sorted_by_key(vec![3, 1, 2], |v| *v);
        assert_eq!(value.as_slice(), &[1, 2, 3]);
        assert!(matches!(
            value.clone().then_by_key(|v| *v),
            Err(BsonError::NotSupported(_))
        ));
        let s = OrderedVec::<i32>::serializer();
        let written = write_with(&s, &value);
        assert_eq!(read_with(&s, &written).unwrap(), value);
    }

    #[test]
    fn test_ordered_vec_configured_then_by_message() {
        let s = OrderedVecSerializer::<i32, _>::new(
            crate::serializers::numeric::Int32Serializer::default(),
            "ranked results cannot be re-sorted",
        );
        let value = OrderedVec::sorted_by_key(vec![2, 1], |v| *v);
        let written = write_with(&s, &value);
        let back = read_with(&s, &written).unwrap();
        match back.then_by_key(|v| *v) {
            Err(BsonError::NotSupported(message)) => {
                assert_eq!(message, "ranked results cannot be re-sorted");
            }
            other => panic!("expected NotSupported, got {:?}", other),
        }

        let configured = OrderedVec::from_sorted(vec![1, 2])
            .with_then_by_message("custom text");
        match configured.then_by_key(|v| *v) {
            Err(BsonError::NotSupported(message)) => assert_eq!(message, "custom text"),
            other => panic!("expected NotSupported, got {:?}", other),
        }
    }

    #[test]
    fn test_boxed_roundtrip() {
        let s = <Box<i32>>::serializer();
        let written = write_with(&s, &Box::new(11));
        assert_eq!(read_with(&s, &written).unwrap(), Box::new(11));
    }
}
