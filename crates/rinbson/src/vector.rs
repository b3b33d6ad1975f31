//! 二进制向量子格式模块
//!
//! Vector 子类型 (0x09) 的载荷固定为 `[dataType, padding, elements...]`:
//! 首字节是元素类型标记,次字节是末尾填充位数,其余是紧密排列的元素。
//! 只有 PackedBit 允许非零填充,且填充只作用于最后一个字节的低位。

use crate::reader::BsonReader;
use crate::registry::HasSerializer;
use crate::serializer::BsonSerializer;
use crate::spec::{BinarySubtype, ElementType};
use crate::value::Binary;
use crate::writer::BsonWriter;
use crate::{BsonError, BsonResult};

const DATA_TYPE_INT8: u8 = 0x03;
const DATA_TYPE_PACKED_BIT: u8 = 0x10;
const DATA_TYPE_FLOAT32: u8 = 0x27;

/// 定宽数值向量
///
/// PackedBit 变体持有打包后的字节与填充位数,位序为高位在前
/// (MSB-first),填充位必须在末字节低位。
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryVector {
    Float32(Vec<f32>),
    Int8(Vec<i8>),
    PackedBit { data: Vec<u8>, padding: u8 },
}

impl BinaryVector {
    /// 从布尔序列打包出 PackedBit 向量
    pub fn pack_bits(bits: &[bool]) -> Self {
        let mut data = Vec::with_capacity(bits.len().div_ceil(8));
        for chunk in bits.chunks(8) {
            let mut byte = 0u8;
            for (i, bit) in chunk.iter().enumerate() {
                if *bit {
                    byte |= 1 << (7 - i);
                }
            }
            data.push(byte);
        }
        let padding = ((8 - bits.len() % 8) % 8) as u8;
        BinaryVector::PackedBit { data, padding }
    }

    /// 把 PackedBit 向量解包成布尔序列
    pub fn unpack_bits(&self) -> BsonResult<Vec<bool>> {
        match self {
            BinaryVector::PackedBit { data, padding } => {
                let total = data.len() * 8;
                let count = total - *padding as usize;
                let mut bits = Vec::with_capacity(count);
                for i in 0..count {
                    let byte = data[i / 8];
                    bits.push(byte & (1 << (7 - i % 8)) != 0);
                }
                Ok(bits)
            }
            other => Err(BsonError::NotSupported(format!(
                "unpack_bits on a {} vector",
                other.data_type_name()
            ))),
        }
    }

    fn data_type_name(&self) -> &'static str {
        match self {
            BinaryVector::Float32(_) => "Float32",
            BinaryVector::Int8(_) => "Int8",
            BinaryVector::PackedBit { .. } => "PackedBit",
        }
    }

    /// 向量元素个数
    pub fn len(&self) -> usize {
        match self {
            BinaryVector::Float32(items) => items.len(),
            BinaryVector::Int8(items) => items.len(),
            BinaryVector::PackedBit { data, padding } => data.len() * 8 - *padding as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 编码为 Vector 子类型的二进制载荷
    pub fn to_bytes(&self) -> BsonResult<Vec<u8>> {
        match self {
            BinaryVector::Float32(items) => {
                let mut bytes = Vec::with_capacity(2 + items.len() * 4);
                bytes.push(DATA_TYPE_FLOAT32);
                bytes.push(0);
                for item in items {
                    bytes.extend_from_slice(&item.to_le_bytes());
                }
                Ok(bytes)
            }
            BinaryVector::Int8(items) => {
                let mut bytes = Vec::with_capacity(2 + items.len());
                bytes.push(DATA_TYPE_INT8);
                bytes.push(0);
                bytes.extend(items.iter().map(|v| *v as u8));
                Ok(bytes)
            }
            BinaryVector::PackedBit { data, padding } => {
                validate_padding(DATA_TYPE_PACKED_BIT, *padding, data.len())?;
                let mut bytes = Vec::with_capacity(2 + data.len());
                bytes.push(DATA_TYPE_PACKED_BIT);
                bytes.push(*padding);
                bytes.extend_from_slice(data);
                Ok(bytes)
            }
        }
    }

    /// 从 Vector 子类型的二进制载荷解码
    ///
    /// # Brief
    /// 校验数据类型标记、填充字节与元素宽度对齐;未知的数据
    /// 类型标记报不支持错误
    pub fn from_bytes(bytes: &[u8]) -> BsonResult<Self> {
        if bytes.len() < 2 {
            return Err(BsonError::Format(
                "Vector payload must be at least 2 bytes".to_string(),
            ));
        }
        let data_type = bytes[0];
        let padding = bytes[1];
        let elements = &bytes[2..];
        validate_padding(data_type, padding, elements.len())?;
        match data_type {
            DATA_TYPE_FLOAT32 => {
                if elements.len() % 4 != 0 {
                    return Err(BsonError::Format(format!(
                        "Float32 vector payload length {} is not a multiple of 4",
                        elements.len()
                    )));
                }
                let items = elements
                    .chunks_exact(4)
                    .map(|chunk| {
                        f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
                    })
                    .collect();
                Ok(BinaryVector::Float32(items))
            }
            DATA_TYPE_INT8 => Ok(BinaryVector::Int8(
                elements.iter().map(|b| *b as i8).collect(),
            )),
            DATA_TYPE_PACKED_BIT => Ok(BinaryVector::PackedBit {
                data: elements.to_vec(),
                padding,
            }),
            other => Err(BsonError::NotSupported(format!(
                "Vector data type 0x{:02x}",
                other
            ))),
        }
    }
}

fn validate_padding(data_type: u8, padding: u8, data_len: usize) -> BsonResult<()> {
    if data_type != DATA_TYPE_PACKED_BIT {
        if padding != 0 {
            return Err(BsonError::Format(format!(
                "Vector data type 0x{:02x} requires zero padding, got {}",
                data_type, padding
            )));
        }
        return Ok(());
    }
    if padding > 7 {
        return Err(BsonError::Format(format!(
            "Vector padding must be at most 7, got {}",
            padding
        )));
    }
    if data_len == 0 && padding != 0 {
        return Err(BsonError::Format(
            "Empty vector must have zero padding".to_string(),
        ));
    }
    Ok(())
}

fn read_vector(reader: &mut dyn BsonReader) -> BsonResult<BinaryVector> {
    let binary = reader.read_binary()?;
    if binary.subtype != BinarySubtype::Vector {
        return Err(BsonError::Format(format!(
            "Expected binary subtype Vector, got {:?}",
            binary.subtype
        )));
    }
    BinaryVector::from_bytes(&binary.bytes)
}

fn write_vector(writer: &mut dyn BsonWriter, vector: &BinaryVector) -> BsonResult<()> {
    writer.write_binary(BinarySubtype::Vector, &vector.to_bytes()?)
}

fn expect_binary(reader: &dyn BsonReader, target: &'static str) -> BsonResult<()> {
    match reader.current_type() {
        Some(ElementType::Binary) => Ok(()),
        Some(other) => Err(BsonError::Deserialization(format!(
            "Cannot deserialize {} from a {} element",
            target, other
        ))),
        None => Err(BsonError::Deserialization(format!(
            "No current element to deserialize {} from",
            target
        ))),
    }
}

/// BinaryVector 的序列化器,保留线上的数据类型变体
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinaryVectorSerializer;

impl BsonSerializer<BinaryVector> for BinaryVectorSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &BinaryVector) -> BsonResult<()> {
        write_vector(writer, value)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<BinaryVector> {
        expect_binary(reader, "BinaryVector")?;
        read_vector(reader)
    }
}

impl HasSerializer for BinaryVector {
    type Serializer = BinaryVectorSerializer;

    fn serializer() -> Self::Serializer {
        BinaryVectorSerializer
    }
}

/// `Vec<f32>` 与 Float32 向量之间的编解码
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Float32VectorSerializer;

impl BsonSerializer<Vec<f32>> for Float32VectorSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Vec<f32>) -> BsonResult<()> {
        let mut bytes = Vec::with_capacity(2 + value.len() * 4);
        bytes.push(DATA_TYPE_FLOAT32);
        bytes.push(0);
        for item in value {
            bytes.extend_from_slice(&item.to_le_bytes());
        }
        writer.write_binary(BinarySubtype::Vector, &bytes)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Vec<f32>> {
        expect_binary(reader, "Vec<f32>")?;
        match read_vector(reader)? {
            BinaryVector::Float32(items) => Ok(items),
            other => Err(BsonError::NotSupported(format!(
                "Cannot deserialize Vec<f32> from a {} vector",
                other.data_type_name()
            ))),
        }
    }
}

/// `Vec<i8>` 与 Int8 向量之间的编解码
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Int8VectorSerializer;

impl BsonSerializer<Vec<i8>> for Int8VectorSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Vec<i8>) -> BsonResult<()> {
        let mut bytes = Vec::with_capacity(2 + value.len());
        bytes.push(DATA_TYPE_INT8);
        bytes.push(0);
        bytes.extend(value.iter().map(|v| *v as u8));
        writer.write_binary(BinarySubtype::Vector, &bytes)
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Vec<i8>> {
        expect_binary(reader, "Vec<i8>")?;
        match read_vector(reader)? {
            BinaryVector::Int8(items) => Ok(items),
            other => Err(BsonError::NotSupported(format!(
                "Cannot deserialize Vec<i8> from a {} vector",
                other.data_type_name()
            ))),
        }
    }
}

/// `Vec<bool>` 与 PackedBit 向量之间的编解码,高位在前打包
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PackedBitVectorSerializer;

impl BsonSerializer<Vec<bool>> for PackedBitVectorSerializer {
    fn serialize(&self, writer: &mut dyn BsonWriter, value: &Vec<bool>) -> BsonResult<()> {
        write_vector(writer, &BinaryVector::pack_bits(value))
    }

    fn deserialize(&self, reader: &mut dyn BsonReader) -> BsonResult<Vec<bool>> {
        expect_binary(reader, "Vec<bool>")?;
        match read_vector(reader)? {
            packed @ BinaryVector::PackedBit { .. } => packed.unpack_bits(),
            other => Err(BsonError::NotSupported(format!(
                "Cannot deserialize Vec<bool> from a {} vector",
                other.data_type_name()
            ))),
        }
    }
}

impl TryFrom<&BinaryVector> for Binary {
    type Error = BsonError;

    fn try_from(vector: &BinaryVector) -> BsonResult<Self> {
        Ok(Binary {
            subtype: BinarySubtype::Vector,
            bytes: vector.to_bytes()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DocumentReader;
    use crate::value::BsonValue;
    use crate::writer::DocumentWriter;

    fn roundtrip(vector: &BinaryVector) -> BinaryVector {
        let mut writer = DocumentWriter::new();
        BinaryVectorSerializer
            .serialize(&mut writer, vector)
            .unwrap();
        let value = writer.finish().unwrap();
        let mut reader = DocumentReader::for_value(&value);
        BinaryVectorSerializer.deserialize(&mut reader).unwrap()
    }

    #[test]
    fn test_float32_roundtrip() {
        let vector = BinaryVector::Float32(vec![1.5, -2.25, 0.0]);
        assert_eq!(roundtrip(&vector), vector);
        assert_eq!(vector.len(), 3);
    }

    #[test]
    fn test_int8_roundtrip() {
        let vector = BinaryVector::Int8(vec![-128, -1, 0, 127]);
        assert_eq!(roundtrip(&vector), vector);
    }

    #[test]
    fn test_packed_bit_layout() {
        // [true, false, true] 打包成 1010_0000,填充 5 位
        let vector = BinaryVector::pack_bits(&[true, false, true]);
        assert_eq!(
            vector,
            BinaryVector::PackedBit {
                data: vec![0b1010_0000],
                padding: 5
            }
        );
        assert_eq!(vector.to_bytes().unwrap(), vec![0x10, 5, 0b1010_0000]);
    }

    #[test]
    fn test_two_bools_padding_one_roundtrip() {
        let bits = vec![true, false];
        let mut writer = DocumentWriter::new();
        PackedBitVectorSerializer
            .serialize(&mut writer, &bits)
            .unwrap();
        let value = writer.finish().unwrap();
        let mut reader = DocumentReader::for_value(&value);
        let restored = PackedBitVectorSerializer.deserialize(&mut reader).unwrap();
        // 填充 6 位被忽略,只还原 2 个元素
        assert_eq!(restored, bits);
    }

    #[test]
    fn test_nonzero_padding_rejected_for_non_packed() {
        let err = BinaryVector::from_bytes(&[DATA_TYPE_FLOAT32, 3]).unwrap_err();
        assert!(err.to_string().contains("padding"));
        let err = BinaryVector::from_bytes(&[DATA_TYPE_INT8, 1, 0xff]).unwrap_err();
        assert!(err.to_string().contains("padding"));
    }

    #[test]
    fn test_padding_bounds() {
        assert!(BinaryVector::from_bytes(&[DATA_TYPE_PACKED_BIT, 8, 0xff]).is_err());
        assert!(BinaryVector::from_bytes(&[DATA_TYPE_PACKED_BIT, 1]).is_err());
        assert!(BinaryVector::from_bytes(&[DATA_TYPE_PACKED_BIT, 0]).is_ok());
    }

    #[test]
    fn test_unknown_data_type_rejected() {
        assert!(matches!(
            BinaryVector::from_bytes(&[0x42, 0, 1, 2]),
            Err(BsonError::NotSupported(_))
        ));
    }

    #[test]
    fn test_misaligned_float32_payload_rejected() {
        assert!(BinaryVector::from_bytes(&[DATA_TYPE_FLOAT32, 0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_element_type_mismatch_names_both_types() {
        let vector = BinaryVector::Int8(vec![1, 2]);
        let mut writer = DocumentWriter::new();
        BinaryVectorSerializer
            .serialize(&mut writer, &vector)
            .unwrap();
        let value = writer.finish().unwrap();
        let mut reader = DocumentReader::for_value(&value);
        let err = Float32VectorSerializer.deserialize(&mut reader).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Vec<f32>") && message.contains("Int8"));
    }

    #[test]
    fn test_wrong_subtype_rejected() {
        let value = BsonValue::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![DATA_TYPE_INT8, 0, 1],
        });
        let mut reader = DocumentReader::for_value(&value);
        assert!(BinaryVectorSerializer.deserialize(&mut reader).is_err());
    }
}
