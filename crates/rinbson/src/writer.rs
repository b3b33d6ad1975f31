//! BSON 写入器模块
//!
//! 提供推进式的 `BsonWriter` 抽象和两种实现:
//! - `BinaryWriter`: 写出规范的 BSON 二进制流,文档长度前缀在
//!   `write_end_document` 时回填
//! - `DocumentWriter`: 构建 `BsonValue` 树,用于文档后端的令牌流
//!   (字典键、额外元素捕获等场景)
//!
//! 数组上下文中的元素名("0"、"1"、...)由写入器自动合成。

use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::spec::{BinarySubtype, ElementType, MAX_DOCUMENT_SIZE, MAX_NESTING_DEPTH};
use crate::value::{BsonValue, JavaScriptValue, RegexValue};
use crate::{BsonError, BsonResult};
use bytes::{BufMut, BytesMut};
use compact_str::CompactString;
use indexmap::IndexMap;
use rinbson_common::ObjectId;

/// BSON 写入抽象
///
/// 文档内的每个值由一次 `write_name`(数组内省略)加一次
/// `write_*` 调用构成;嵌套结构由 start/end 括号方法界定。
pub trait BsonWriter {
    fn write_start_document(&mut self) -> BsonResult<()>;
    fn write_end_document(&mut self) -> BsonResult<()>;
    fn write_start_array(&mut self) -> BsonResult<()>;
    fn write_end_array(&mut self) -> BsonResult<()>;
    fn write_name(&mut self, name: &str) -> BsonResult<()>;

    fn write_double(&mut self, value: f64) -> BsonResult<()>;
    fn write_string(&mut self, value: &str) -> BsonResult<()>;
    fn write_symbol(&mut self, value: &str) -> BsonResult<()>;
    fn write_boolean(&mut self, value: bool) -> BsonResult<()>;
    fn write_int32(&mut self, value: i32) -> BsonResult<()>;
    fn write_int64(&mut self, value: i64) -> BsonResult<()>;
    fn write_decimal128(&mut self, value: Decimal128) -> BsonResult<()>;
    /// UTC 毫秒时间戳
    fn write_datetime(&mut self, millis: i64) -> BsonResult<()>;
    fn write_timestamp(&mut self, value: u64) -> BsonResult<()>;
    fn write_object_id(&mut self, value: &ObjectId) -> BsonResult<()>;
    fn write_binary(&mut self, subtype: BinarySubtype, bytes: &[u8]) -> BsonResult<()>;
    fn write_regex(&mut self, value: &RegexValue) -> BsonResult<()>;
    fn write_javascript(&mut self, value: &JavaScriptValue) -> BsonResult<()>;
    fn write_null(&mut self) -> BsonResult<()>;
    fn write_undefined(&mut self) -> BsonResult<()>;
    fn write_min_key(&mut self) -> BsonResult<()>;
    fn write_max_key(&mut self) -> BsonResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    Document,
    Array,
}

struct Frame {
    kind: FrameKind,
    len_offset: usize,
    next_index: u32,
}

/// 二进制 BSON 写入器
///
/// 基于 `BytesMut` 的追加式编码器。文档/数组的 int32 长度前缀
/// 先写占位,在对应的 end 调用时按实际字节数回填。
pub struct BinaryWriter {
    buf: BytesMut,
    stack: Vec<Frame>,
    pending_name: Option<CompactString>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            stack: Vec::new(),
            pending_name: None,
        }
    }

    /// 取出编码完成的字节
    ///
    /// # Brief
    /// 所有打开的文档/数组必须已关闭,否则返回序列化错误
    pub fn into_bytes(self) -> BsonResult<Vec<u8>> {
        if !self.stack.is_empty() {
            return Err(BsonError::Serialization(
                "Unclosed document or array".to_string(),
            ));
        }
        if self.buf.len() > MAX_DOCUMENT_SIZE {
            return Err(BsonError::Serialization(format!(
                "Document size {} exceeds max {}",
                self.buf.len(),
                MAX_DOCUMENT_SIZE
            )));
        }
        Ok(self.buf.to_vec())
    }

    fn write_cstring(&mut self, s: &str) -> BsonResult<()> {
        if s.as_bytes().contains(&0) {
            return Err(BsonError::Serialization(format!(
                "BSON cstring must not contain a null byte: {:?}",
                s
            )));
        }
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    fn write_lp_string(&mut self, s: &str) {
        self.buf.put_i32_le(s.len() as i32 + 1);
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
    }

    /// 写出元素头(类型标记 + 元素名)
    fn begin_element(&mut self, tag: ElementType) -> BsonResult<()> {
        let frame = self.stack.last_mut().ok_or_else(|| {
            BsonError::Serialization("Value written outside of a document".to_string())
        })?;
        let synthesized;
        let name = match frame.kind {
            FrameKind::Array => {
                synthesized = frame.next_index.to_string();
                frame.next_index += 1;
                if self.pending_name.take().is_some() {
                    return Err(BsonError::Serialization(
                        "Element names are synthesized inside arrays".to_string(),
                    ));
                }
                CompactString::from(synthesized.as_str())
            }
            FrameKind::Document => self.pending_name.take().ok_or_else(|| {
                BsonError::Serialization("write_name must be called before a value".to_string())
            })?,
        };
        self.buf.put_u8(tag as u8);
        self.write_cstring(&name)
    }

    fn start_container(&mut self, kind: FrameKind) -> BsonResult<()> {
        if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(BsonError::Serialization(format!(
                "Nesting too deep: max {}",
                MAX_NESTING_DEPTH
            )));
        }
        if self.stack.is_empty() {
            if kind != FrameKind::Document {
                return Err(BsonError::Serialization(
                    "Top-level BSON value must be a document".to_string(),
                ));
            }
        } else {
            let tag = match kind {
                FrameKind::Document => ElementType::Document,
                FrameKind::Array => ElementType::Array,
            };
            self.begin_element(tag)?;
        }
        self.stack.push(Frame {
            kind,
            len_offset: self.buf.len(),
            next_index: 0,
        });
        self.buf.put_i32_le(0);
        Ok(())
    }

    fn end_container(&mut self, kind: FrameKind) -> BsonResult<()> {
        let frame = self.stack.pop().ok_or_else(|| {
            BsonError::Serialization("No open document or array to close".to_string())
        })?;
        if frame.kind != kind {
            return Err(BsonError::Serialization(
                "Mismatched document/array close".to_string(),
            ));
        }
        self.buf.put_u8(0);
        self.patch_length(frame.len_offset);
        Ok(())
    }

    fn patch_length(&mut self, offset: usize) {
        let len = (self.buf.len() - offset) as i32;
        self.buf[offset..offset + 4].copy_from_slice(&len.to_le_bytes());
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BsonWriter for BinaryWriter {
    fn write_start_document(&mut self) -> BsonResult<()> {
        self.start_container(FrameKind::Document)
    }

    fn write_end_document(&mut self) -> BsonResult<()> {
        self.end_container(FrameKind::Document)
    }

    fn write_start_array(&mut self) -> BsonResult<()> {
        self.start_container(FrameKind::Array)
    }

    fn write_end_array(&mut self) -> BsonResult<()> {
        self.end_container(FrameKind::Array)
    }

    fn write_name(&mut self, name: &str) -> BsonResult<()> {
        if self.pending_name.is_some() {
            return Err(BsonError::Serialization(format!(
                "write_name called twice before a value: {}",
                name
            )));
        }
        self.pending_name = Some(CompactString::from(name));
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> BsonResult<()> {
        self.begin_element(ElementType::Double)?;
        self.buf.put_f64_le(value);
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> BsonResult<()> {
        self.begin_element(ElementType::String)?;
        self.write_lp_string(value);
        Ok(())
    }

    fn write_symbol(&mut self, value: &str) -> BsonResult<()> {
        self.begin_element(ElementType::Symbol)?;
        self.write_lp_string(value);
        Ok(())
    }

    fn write_boolean(&mut self, value: bool) -> BsonResult<()> {
        self.begin_element(ElementType::Boolean)?;
        self.buf.put_u8(value as u8);
        Ok(())
    }

    fn write_int32(&mut self, value: i32) -> BsonResult<()> {
        self.begin_element(ElementType::Int32)?;
        self.buf.put_i32_le(value);
        Ok(())
    }

    fn write_int64(&mut self, value: i64) -> BsonResult<()> {
        self.begin_element(ElementType::Int64)?;
        self.buf.put_i64_le(value);
        Ok(())
    }

    fn write_decimal128(&mut self, value: Decimal128) -> BsonResult<()> {
        self.begin_element(ElementType::Decimal128)?;
        self.buf.put_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_datetime(&mut self, millis: i64) -> BsonResult<()> {
        self.begin_element(ElementType::DateTime)?;
        self.buf.put_i64_le(millis);
        Ok(())
    }

    fn write_timestamp(&mut self, value: u64) -> BsonResult<()> {
        self.begin_element(ElementType::Timestamp)?;
        self.buf.put_u64_le(value);
        Ok(())
    }

    fn write_object_id(&mut self, value: &ObjectId) -> BsonResult<()> {
        self.begin_element(ElementType::ObjectId)?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    fn write_binary(&mut self, subtype: BinarySubtype, bytes: &[u8]) -> BsonResult<()> {
        self.begin_element(ElementType::Binary)?;
        self.buf.put_i32_le(bytes.len() as i32);
        self.buf.put_u8(subtype.to_u8());
        self.buf.put_slice(bytes);
        Ok(())
    }

    fn write_regex(&mut self, value: &RegexValue) -> BsonResult<()> {
        self.begin_element(ElementType::RegularExpression)?;
        self.write_cstring(&value.pattern)?;
        self.write_cstring(&value.options)
    }

    fn write_javascript(&mut self, value: &JavaScriptValue) -> BsonResult<()> {
        match &value.scope {
            None => {
                self.begin_element(ElementType::JavaScript)?;
                self.write_lp_string(&value.code);
                Ok(())
            }
            Some(scope) => {
                self.begin_element(ElementType::JavaScriptWithScope)?;
                let total_offset = self.buf.len();
                self.buf.put_i32_le(0);
                self.write_lp_string(&value.code);
                // 作用域是一个完整的嵌套文档
                self.stack.push(Frame {
                    kind: FrameKind::Document,
                    len_offset: self.buf.len(),
                    next_index: 0,
                });
                self.buf.put_i32_le(0);
                for (name, item) in scope {
                    self.write_name(name)?;
                    write_value(self, item)?;
                }
                self.end_container(FrameKind::Document)?;
                self.patch_length(total_offset);
                Ok(())
            }
        }
    }

    fn write_null(&mut self) -> BsonResult<()> {
        self.begin_element(ElementType::Null)
    }

    fn write_undefined(&mut self) -> BsonResult<()> {
        self.begin_element(ElementType::Undefined)
    }

    fn write_min_key(&mut self) -> BsonResult<()> {
        self.begin_element(ElementType::MinKey)
    }

    fn write_max_key(&mut self) -> BsonResult<()> {
        self.begin_element(ElementType::MaxKey)
    }
}

enum ValueFrame {
    Document(IndexMap<CompactString, BsonValue>),
    Array(Vec<BsonValue>),
}

/// 文档树写入器
///
/// 不产生字节,而是把写入的令牌流收集为一棵 `BsonValue`。
/// 顶层可以是任意单值,这使它也适合序列化字典键等标量场景。
pub struct DocumentWriter {
    stack: Vec<ValueFrame>,
    pending_name: Option<CompactString>,
    root: Option<BsonValue>,
}

impl DocumentWriter {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            pending_name: None,
            root: None,
        }
    }

    /// 取出构建完成的值
    pub fn finish(self) -> BsonResult<BsonValue> {
        if !self.stack.is_empty() {
            return Err(BsonError::Serialization(
                "Unclosed document or array".to_string(),
            ));
        }
        self.root
            .ok_or_else(|| BsonError::Serialization("No value was written".to_string()))
    }

    fn set_value(&mut self, value: BsonValue) -> BsonResult<()> {
        match self.stack.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(BsonError::Serialization(
                        "Multiple top-level values".to_string(),
                    ));
                }
                self.root = Some(value);
                Ok(())
            }
            Some(ValueFrame::Array(items)) => {
                if self.pending_name.take().is_some() {
                    return Err(BsonError::Serialization(
                        "Element names are synthesized inside arrays".to_string(),
                    ));
                }
                items.push(value);
                Ok(())
            }
            Some(ValueFrame::Document(fields)) => {
                let name = self.pending_name.take().ok_or_else(|| {
                    BsonError::Serialization(
                        "write_name must be called before a value".to_string(),
                    )
                })?;
                fields.insert(name, value);
                Ok(())
            }
        }
    }
}

impl Default for DocumentWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BsonWriter for DocumentWriter {
    fn write_start_document(&mut self) -> BsonResult<()> {
        if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(BsonError::Serialization(format!(
                "Nesting too deep: max {}",
                MAX_NESTING_DEPTH
            )));
        }
        self.stack.push(ValueFrame::Document(IndexMap::new()));
        Ok(())
    }

    fn write_end_document(&mut self) -> BsonResult<()> {
        match self.stack.pop() {
            Some(ValueFrame::Document(fields)) => self.set_value(BsonValue::Document(fields)),
            _ => Err(BsonError::Serialization(
                "No open document to close".to_string(),
            )),
        }
    }

    fn write_start_array(&mut self) -> BsonResult<()> {
        if self.stack.len() >= MAX_NESTING_DEPTH {
            return Err(BsonError::Serialization(format!(
                "Nesting too deep: max {}",
                MAX_NESTING_DEPTH
            )));
        }
        self.stack.push(ValueFrame::Array(Vec::new()));
        Ok(())
    }

    fn write_end_array(&mut self) -> BsonResult<()> {
        match self.stack.pop() {
            Some(ValueFrame::Array(items)) => self.set_value(BsonValue::Array(items)),
            _ => Err(BsonError::Serialization(
                "No open array to close".to_string(),
            )),
        }
    }

    fn write_name(&mut self, name: &str) -> BsonResult<()> {
        if self.pending_name.is_some() {
            return Err(BsonError::Serialization(format!(
                "write_name called twice before a value: {}",
                name
            )));
        }
        self.pending_name = Some(CompactString::from(name));
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> BsonResult<()> {
        self.set_value(BsonValue::Double(value))
    }

    fn write_string(&mut self, value: &str) -> BsonResult<()> {
        self.set_value(BsonValue::String(CompactString::from(value)))
    }

    fn write_symbol(&mut self, value: &str) -> BsonResult<()> {
        self.set_value(BsonValue::Symbol(CompactString::from(value)))
    }

    fn write_boolean(&mut self, value: bool) -> BsonResult<()> {
        self.set_value(BsonValue::Boolean(value))
    }

    fn write_int32(&mut self, value: i32) -> BsonResult<()> {
        self.set_value(BsonValue::Int32(value))
    }

    fn write_int64(&mut self, value: i64) -> BsonResult<()> {
        self.set_value(BsonValue::Int64(value))
    }

    fn write_decimal128(&mut self, value: Decimal128) -> BsonResult<()> {
        self.set_value(BsonValue::Decimal128(value))
    }

    fn write_datetime(&mut self, millis: i64) -> BsonResult<()> {
        let dt = chrono::DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            BsonError::Format(format!("DateTime millis out of range: {}", millis))
        })?;
        self.set_value(BsonValue::DateTime(dt))
    }

    fn write_timestamp(&mut self, value: u64) -> BsonResult<()> {
        self.set_value(BsonValue::Timestamp(value))
    }

    fn write_object_id(&mut self, value: &ObjectId) -> BsonResult<()> {
        self.set_value(BsonValue::ObjectId(*value))
    }

    fn write_binary(&mut self, subtype: BinarySubtype, bytes: &[u8]) -> BsonResult<()> {
        self.set_value(BsonValue::Binary(crate::value::Binary {
            subtype,
            bytes: bytes.to_vec(),
        }))
    }

    fn write_regex(&mut self, value: &RegexValue) -> BsonResult<()> {
        self.set_value(BsonValue::RegularExpression(value.clone()))
    }

    fn write_javascript(&mut self, value: &JavaScriptValue) -> BsonResult<()> {
        self.set_value(BsonValue::JavaScript(value.clone()))
    }

    fn write_null(&mut self) -> BsonResult<()> {
        self.set_value(BsonValue::Null)
    }

    fn write_undefined(&mut self) -> BsonResult<()> {
        self.set_value(BsonValue::Undefined)
    }

    fn write_min_key(&mut self) -> BsonResult<()> {
        self.set_value(BsonValue::MinKey)
    }

    fn write_max_key(&mut self) -> BsonResult<()> {
        self.set_value(BsonValue::MaxKey)
    }
}

/// 将 BsonValue 写入任意写入器
///
/// # Brief
/// 递归展开文档与数组,标量按对应的 write_* 方法写出;
/// 调用前元素名必须已经就位(或处于数组上下文)。
pub fn write_value(writer: &mut dyn BsonWriter, value: &BsonValue) -> BsonResult<()> {
    match value {
        BsonValue::Double(v) => writer.write_double(*v),
        BsonValue::String(v) => writer.write_string(v),
        BsonValue::Document(fields) => {
            writer.write_start_document()?;
            for (name, item) in fields {
                writer.write_name(name)?;
                write_value(writer, item)?;
            }
            writer.write_end_document()
        }
        BsonValue::Array(items) => {
            writer.write_start_array()?;
            for item in items {
                write_value(writer, item)?;
            }
            writer.write_end_array()
        }
        BsonValue::Binary(b) => writer.write_binary(b.subtype, &b.bytes),
        BsonValue::Undefined => writer.write_undefined(),
        BsonValue::ObjectId(id) => writer.write_object_id(id),
        BsonValue::Boolean(v) => writer.write_boolean(*v),
        BsonValue::DateTime(dt) => writer.write_datetime(dt.timestamp_millis()),
        BsonValue::Null => writer.write_null(),
        BsonValue::RegularExpression(re) => writer.write_regex(re),
        BsonValue::JavaScript(js) => writer.write_javascript(js),
        BsonValue::Symbol(s) => writer.write_symbol(s),
        BsonValue::Int32(v) => writer.write_int32(*v),
        BsonValue::Timestamp(v) => writer.write_timestamp(*v),
        BsonValue::Int64(v) => writer.write_int64(*v),
        BsonValue::Decimal128(v) => writer.write_decimal128(*v),
        BsonValue::MinKey => writer.write_min_key(),
        BsonValue::MaxKey => writer.write_max_key(),
    }
}

/// 编码文档为 BSON 字节
///
/// # Brief
/// 标准 BSON 线格式: int32 小端总长度 + 元素序列 + 0x00 结尾
///
/// # Arguments
/// * `doc` - 要编码的文档
///
/// # Returns
/// 成功返回字节向量,失败返回错误
pub fn encode_document(doc: &Document) -> BsonResult<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    writer.write_start_document()?;
    for (name, value) in doc.iter() {
        writer.write_name(name)?;
        write_value(&mut writer, value)?;
    }
    writer.write_end_document()?;
    writer.into_bytes()
}
