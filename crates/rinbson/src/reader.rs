//! BSON 读取器模块
//!
//! 提供拉取式的 `BsonReader` 抽象和两种实现:
//! - `BinaryReader`: 解析规范的 BSON 二进制流
//! - `DocumentReader`: 在 `BsonValue` 树上推进,即文档后端的令牌流
//!
//! 读取协议: `read_element_type` 消费类型标记和元素名并返回标记
//! (文档结束时返回 `None`),随后用匹配的 `read_*` 消费负载,
//! 游标停在下一个兄弟元素之前。`bookmark`/`return_to_bookmark`
//! 支持判别符探测所需的回退。

use crate::decimal128::Decimal128;
use crate::document::Document;
use crate::spec::{BinarySubtype, ElementType, MAX_DOCUMENT_SIZE, MAX_NESTING_DEPTH};
use crate::value::{Binary, BsonValue, JavaScriptValue, RegexValue};
use crate::{BsonError, BsonResult};
use compact_str::CompactString;
use indexmap::IndexMap;
use rinbson_common::ObjectId;

/// 读取器游标位置的不透明快照
#[derive(Clone)]
pub struct Bookmark(Repr);

#[derive(Clone)]
enum Repr {
    Binary {
        pos: usize,
        current: Option<ElementType>,
        name: CompactString,
        frames: Vec<BinFrame>,
    },
    Tree {
        indices: Vec<usize>,
        has_current: bool,
    },
}

/// BSON 读取抽象
pub trait BsonReader {
    /// 消费下一个元素的类型标记与元素名
    ///
    /// # Returns
    /// `Some(tag)` 表示游标停在该元素的负载前;`None` 表示当前
    /// 文档/数组已读完,应调用对应的 end 方法。
    fn read_element_type(&mut self) -> BsonResult<Option<ElementType>>;

    /// 最近一次 `read_element_type` 消费的元素名
    fn read_name(&mut self) -> BsonResult<CompactString>;

    /// 最近一次 `read_element_type` 返回的标记(负载未消费时)
    fn current_type(&self) -> Option<ElementType>;

    fn read_start_document(&mut self) -> BsonResult<()>;
    fn read_end_document(&mut self) -> BsonResult<()>;
    fn read_start_array(&mut self) -> BsonResult<()>;
    fn read_end_array(&mut self) -> BsonResult<()>;

    fn read_double(&mut self) -> BsonResult<f64>;
    fn read_string(&mut self) -> BsonResult<CompactString>;
    fn read_symbol(&mut self) -> BsonResult<CompactString>;
    fn read_boolean(&mut self) -> BsonResult<bool>;
    fn read_int32(&mut self) -> BsonResult<i32>;
    fn read_int64(&mut self) -> BsonResult<i64>;
    fn read_decimal128(&mut self) -> BsonResult<Decimal128>;
    /// UTC 毫秒时间戳
    fn read_datetime(&mut self) -> BsonResult<i64>;
    fn read_timestamp(&mut self) -> BsonResult<u64>;
    fn read_object_id(&mut self) -> BsonResult<ObjectId>;
    fn read_binary(&mut self) -> BsonResult<Binary>;
    fn read_regex(&mut self) -> BsonResult<RegexValue>;
    fn read_javascript(&mut self) -> BsonResult<JavaScriptValue>;
    fn read_null(&mut self) -> BsonResult<()>;
    fn read_undefined(&mut self) -> BsonResult<()>;
    fn read_min_key(&mut self) -> BsonResult<()>;
    fn read_max_key(&mut self) -> BsonResult<()>;

    /// 跳过当前元素的负载
    fn skip_value(&mut self) -> BsonResult<()>;

    fn bookmark(&self) -> Bookmark;
    fn return_to_bookmark(&mut self, bookmark: Bookmark) -> BsonResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    Document,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct BinFrame {
    kind: FrameKind,
    end: usize,
}

/// 二进制 BSON 读取器
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    frames: Vec<BinFrame>,
    current: Option<ElementType>,
    current_name: CompactString,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            frames: Vec::new(),
            current: None,
            current_name: CompactString::default(),
        }
    }

    /// 游标是否已消费全部输入
    pub fn is_exhausted(&self) -> bool {
        self.frames.is_empty() && self.pos == self.data.len()
    }

    fn take(&mut self, n: usize) -> BsonResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(BsonError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_i32(&mut self) -> BsonResult<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_cstring(&mut self) -> BsonResult<CompactString> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(BsonError::UnexpectedEof)?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|e| BsonError::Format(format!("Invalid UTF-8 in cstring: {}", e)))?;
        self.pos += nul + 1;
        Ok(CompactString::from(s))
    }

    fn take_lp_string(&mut self) -> BsonResult<CompactString> {
        let len = self.take_i32()?;
        if len < 1 {
            return Err(BsonError::Format(format!("Invalid string length: {}", len)));
        }
        let bytes = self.take(len as usize)?;
        if bytes[len as usize - 1] != 0 {
            return Err(BsonError::Format(
                "String is not null-terminated".to_string(),
            ));
        }
        let s = std::str::from_utf8(&bytes[..len as usize - 1])
            .map_err(|e| BsonError::Format(format!("Invalid UTF-8 in string: {}", e)))?;
        Ok(CompactString::from(s))
    }

    /// 校验并清除当前元素标记
    fn expect(&mut self, expected: ElementType) -> BsonResult<()> {
        match self.current.take() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(BsonError::Format(format!(
                "Expected {} element, got {}",
                expected, t
            ))),
            None => Err(BsonError::Format(format!(
                "No pending {} element to read",
                expected
            ))),
        }
    }

    fn start_container(&mut self, kind: FrameKind) -> BsonResult<()> {
        if self.frames.len() >= MAX_NESTING_DEPTH {
            return Err(BsonError::Format(format!(
                "Nesting too deep: max {}",
                MAX_NESTING_DEPTH
            )));
        }
        if self.frames.is_empty() {
            if kind != FrameKind::Document {
                return Err(BsonError::Format(
                    "Top-level BSON value must be a document".to_string(),
                ));
            }
        } else {
            self.expect(match kind {
                FrameKind::Document => ElementType::Document,
                FrameKind::Array => ElementType::Array,
            })?;
        }
        let start = self.pos;
        let len = self.take_i32()?;
        if len < 5 {
            return Err(BsonError::Format(format!("Invalid document length: {}", len)));
        }
        if self.frames.is_empty() && len as usize > MAX_DOCUMENT_SIZE {
            return Err(BsonError::Format(format!(
                "Document size {} exceeds max {}",
                len, MAX_DOCUMENT_SIZE
            )));
        }
        let end = start + len as usize;
        if end > self.data.len() {
            return Err(BsonError::UnexpectedEof);
        }
        self.frames.push(BinFrame { kind, end });
        Ok(())
    }

    fn end_container(&mut self, kind: FrameKind) -> BsonResult<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| BsonError::Format("No open document or array to close".to_string()))?;
        if frame.kind != kind {
            return Err(BsonError::Format(
                "Mismatched document/array close".to_string(),
            ));
        }
        if self.pos != frame.end {
            return Err(BsonError::Format(
                "Document not fully consumed".to_string(),
            ));
        }
        Ok(())
    }
}

impl<'a> BsonReader for BinaryReader<'a> {
    fn read_element_type(&mut self) -> BsonResult<Option<ElementType>> {
        let frame = *self
            .frames
            .last()
            .ok_or_else(|| BsonError::Format("Not inside a document".to_string()))?;
        if self.current.is_some() {
            return Err(BsonError::Format(
                "Previous element payload not consumed".to_string(),
            ));
        }
        let byte = self.take(1)?[0];
        if byte == 0 {
            if self.pos != frame.end {
                return Err(BsonError::Format(
                    "Premature document terminator".to_string(),
                ));
            }
            return Ok(None);
        }
        let tag = ElementType::from_u8(byte)?;
        self.current_name = self.take_cstring()?;
        self.current = Some(tag);
        Ok(Some(tag))
    }

    fn read_name(&mut self) -> BsonResult<CompactString> {
        if self.current.is_none() {
            return Err(BsonError::Format("No pending element".to_string()));
        }
        Ok(self.current_name.clone())
    }

    fn current_type(&self) -> Option<ElementType> {
        self.current
    }

    fn read_start_document(&mut self) -> BsonResult<()> {
        self.start_container(FrameKind::Document)
    }

    fn read_end_document(&mut self) -> BsonResult<()> {
        self.end_container(FrameKind::Document)
    }

    fn read_start_array(&mut self) -> BsonResult<()> {
        self.start_container(FrameKind::Array)
    }

    fn read_end_array(&mut self) -> BsonResult<()> {
        self.end_container(FrameKind::Array)
    }

    fn read_double(&mut self) -> BsonResult<f64> {
        self.expect(ElementType::Double)?;
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().map_err(|_| BsonError::UnexpectedEof)?))
    }

    fn read_string(&mut self) -> BsonResult<CompactString> {
        self.expect(ElementType::String)?;
        self.take_lp_string()
    }

    fn read_symbol(&mut self) -> BsonResult<CompactString> {
        self.expect(ElementType::Symbol)?;
        self.take_lp_string()
    }

    fn read_boolean(&mut self) -> BsonResult<bool> {
        self.expect(ElementType::Boolean)?;
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BsonError::Format(format!("Invalid boolean byte: {}", other))),
        }
    }

    fn read_int32(&mut self) -> BsonResult<i32> {
        self.expect(ElementType::Int32)?;
        self.take_i32()
    }

    fn read_int64(&mut self) -> BsonResult<i64> {
        self.expect(ElementType::Int64)?;
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().map_err(|_| BsonError::UnexpectedEof)?))
    }

    fn read_decimal128(&mut self) -> BsonResult<Decimal128> {
        self.expect(ElementType::Decimal128)?;
        let bytes = self.take(16)?;
        Ok(Decimal128::from_le_bytes(
            bytes.try_into().map_err(|_| BsonError::UnexpectedEof)?,
        ))
    }

    fn read_datetime(&mut self) -> BsonResult<i64> {
        self.expect(ElementType::DateTime)?;
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().map_err(|_| BsonError::UnexpectedEof)?))
    }

    fn read_timestamp(&mut self) -> BsonResult<u64> {
        self.expect(ElementType::Timestamp)?;
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().map_err(|_| BsonError::UnexpectedEof)?))
    }

    fn read_object_id(&mut self) -> BsonResult<ObjectId> {
        self.expect(ElementType::ObjectId)?;
        let bytes = self.take(12)?;
        let mut arr = [0u8; 12];
        arr.copy_from_slice(bytes);
        Ok(ObjectId::from_bytes(arr))
    }

    fn read_binary(&mut self) -> BsonResult<Binary> {
        self.expect(ElementType::Binary)?;
        let len = self.take_i32()?;
        if len < 0 {
            return Err(BsonError::Format(format!("Invalid binary length: {}", len)));
        }
        let subtype = BinarySubtype::from_u8(self.take(1)?[0])?;
        let mut bytes = self.take(len as usize)?.to_vec();
        if subtype == BinarySubtype::BinaryOld {
            // 旧式二进制在负载前多带一个 int32 内部长度
            if bytes.len() < 4 {
                return Err(BsonError::Format(
                    "Old binary payload too short".to_string(),
                ));
            }
            let inner = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if inner as usize != bytes.len() - 4 {
                return Err(BsonError::Format(
                    "Old binary inner length mismatch".to_string(),
                ));
            }
            bytes.drain(..4);
        }
        Ok(Binary { subtype, bytes })
    }

    fn read_regex(&mut self) -> BsonResult<RegexValue> {
        self.expect(ElementType::RegularExpression)?;
        let pattern = self.take_cstring()?;
        let options = self.take_cstring()?;
        Ok(RegexValue { pattern, options })
    }

    fn read_javascript(&mut self) -> BsonResult<JavaScriptValue> {
        match self.current {
            Some(ElementType::JavaScript) => {
                self.current = None;
                let code = self.take_lp_string()?;
                Ok(JavaScriptValue::new(code))
            }
            Some(ElementType::JavaScriptWithScope) => {
                self.current = None;
                let start = self.pos;
                let total = self.take_i32()?;
                let code = self.take_lp_string()?;
                // 作用域文档紧跟在代码串之后
                let scope_start = self.pos;
                let scope_len = self.take_i32()?;
                if scope_len < 5 {
                    return Err(BsonError::Format(format!(
                        "Invalid scope document length: {}",
                        scope_len
                    )));
                }
                let scope_end = scope_start + scope_len as usize;
                if scope_end > self.data.len() {
                    return Err(BsonError::UnexpectedEof);
                }
                self.frames.push(BinFrame {
                    kind: FrameKind::Document,
                    end: scope_end,
                });
                let mut scope = IndexMap::new();
                loop {
                    match self.read_element_type()? {
                        Some(_) => {
                            let name = self.read_name()?;
                            let value = read_value(self)?;
                            scope.insert(name, value);
                        }
                        None => break,
                    }
                }
                self.end_container(FrameKind::Document)?;
                if self.pos != start + total as usize {
                    return Err(BsonError::Format(
                        "JavaScript-with-scope length mismatch".to_string(),
                    ));
                }
                Ok(JavaScriptValue {
                    code,
                    scope: Some(scope),
                })
            }
            Some(other) => Err(BsonError::Format(format!(
                "Expected JavaScript element, got {}",
                other
            ))),
            None => Err(BsonError::Format("No pending element".to_string())),
        }
    }

    fn read_null(&mut self) -> BsonResult<()> {
        self.expect(ElementType::Null)
    }

    fn read_undefined(&mut self) -> BsonResult<()> {
        self.expect(ElementType::Undefined)
    }

    fn read_min_key(&mut self) -> BsonResult<()> {
        self.expect(ElementType::MinKey)
    }

    fn read_max_key(&mut self) -> BsonResult<()> {
        self.expect(ElementType::MaxKey)
    }

    fn skip_value(&mut self) -> BsonResult<()> {
        let tag = self
            .current
            .take()
            .ok_or_else(|| BsonError::Format("No pending element to skip".to_string()))?;
        match tag {
            ElementType::Double
            | ElementType::DateTime
            | ElementType::Timestamp
            | ElementType::Int64 => {
                self.take(8)?;
            }
            ElementType::Int32 => {
                self.take(4)?;
            }
            ElementType::Decimal128 => {
                self.take(16)?;
            }
            ElementType::ObjectId => {
                self.take(12)?;
            }
            ElementType::Boolean => {
                self.take(1)?;
            }
            ElementType::Null
            | ElementType::Undefined
            | ElementType::MinKey
            | ElementType::MaxKey => {}
            ElementType::String | ElementType::Symbol | ElementType::JavaScript => {
                let len = self.take_i32()?;
                if len < 1 {
                    return Err(BsonError::Format(format!("Invalid string length: {}", len)));
                }
                self.take(len as usize)?;
            }
            ElementType::Document | ElementType::Array | ElementType::JavaScriptWithScope => {
                let start = self.pos;
                let total = self.take_i32()?;
                if total < 5 {
                    return Err(BsonError::Format(format!(
                        "Invalid document length: {}",
                        total
                    )));
                }
                self.pos = start;
                self.take(total as usize)?;
            }
            ElementType::Binary => {
                let len = self.take_i32()?;
                if len < 0 {
                    return Err(BsonError::Format(format!("Invalid binary length: {}", len)));
                }
                self.take(1 + len as usize)?;
            }
            ElementType::RegularExpression => {
                self.take_cstring()?;
                self.take_cstring()?;
            }
        }
        Ok(())
    }

    fn bookmark(&self) -> Bookmark {
        Bookmark(Repr::Binary {
            pos: self.pos,
            current: self.current,
            name: self.current_name.clone(),
            frames: self.frames.clone(),
        })
    }

    fn return_to_bookmark(&mut self, bookmark: Bookmark) -> BsonResult<()> {
        match bookmark.0 {
            Repr::Binary {
                pos,
                current,
                name,
                frames,
            } => {
                self.pos = pos;
                self.current = current;
                self.current_name = name;
                self.frames = frames;
                Ok(())
            }
            Repr::Tree { .. } => Err(BsonError::Deserialization(
                "Bookmark belongs to a different reader".to_string(),
            )),
        }
    }
}

#[derive(Clone, Copy)]
enum TreeFrame<'a> {
    Document {
        fields: &'a IndexMap<CompactString, BsonValue>,
        idx: usize,
    },
    Array {
        items: &'a [BsonValue],
        idx: usize,
    },
}

/// 文档树读取器
///
/// 在已有的 `BsonValue` 上产生与二进制读取器相同的令牌流。
/// 顶层允许任意单值,以支持标量场景(如字典键解析)。
pub struct DocumentReader<'a> {
    root: &'a BsonValue,
    frames: Vec<TreeFrame<'a>>,
    current: Option<&'a BsonValue>,
    current_name: CompactString,
    /// 顶层标量模式: 根值本身即当前元素
    scalar_root: bool,
}

impl<'a> DocumentReader<'a> {
    pub fn new(root: &'a BsonValue) -> Self {
        Self {
            root,
            frames: Vec::new(),
            current: None,
            current_name: CompactString::default(),
            scalar_root: false,
        }
    }

    /// 以根值为当前元素创建(标量模式)
    ///
    /// # Brief
    /// 使根值可以直接用 `read_*` 消费,无需外层文档
    pub fn for_value(root: &'a BsonValue) -> Self {
        Self {
            root,
            frames: Vec::new(),
            current: Some(root),
            current_name: CompactString::default(),
            scalar_root: true,
        }
    }

    fn current_value(&mut self, expected: ElementType) -> BsonResult<&'a BsonValue> {
        match self.current.take() {
            Some(v) if v.element_type() == expected => Ok(v),
            Some(v) => Err(BsonError::Format(format!(
                "Expected {} element, got {}",
                expected,
                v.type_name()
            ))),
            None => Err(BsonError::Format(format!(
                "No pending {} element to read",
                expected
            ))),
        }
    }

    fn rebuild_frames(&mut self, indices: &[usize], has_current: bool) -> BsonResult<()> {
        self.frames.clear();
        self.current = None;
        if indices.is_empty() && has_current {
            // 标量根模式: 根值本身就是当前元素
            if !self.scalar_root {
                return Err(BsonError::Deserialization(
                    "Bookmark does not match reader state".to_string(),
                ));
            }
            self.current = Some(self.root);
            return Ok(());
        }
        let mut container = self.root;
        for (level, &idx) in indices.iter().enumerate() {
            let frame = match container {
                BsonValue::Document(fields) => TreeFrame::Document { fields, idx },
                BsonValue::Array(items) => TreeFrame::Array { items, idx },
                _ => {
                    return Err(BsonError::Deserialization(
                        "Bookmark does not match reader state".to_string(),
                    ))
                }
            };
            self.frames.push(frame);
            let needs_child = level + 1 < indices.len() || has_current;
            if needs_child {
                let (child, name) = match frame {
                    TreeFrame::Document { fields, idx } => {
                        let (k, v) = fields.get_index(idx - 1).ok_or_else(|| {
                            BsonError::Deserialization(
                                "Bookmark does not match reader state".to_string(),
                            )
                        })?;
                        (v, k.clone())
                    }
                    TreeFrame::Array { items, idx } => (
                        items.get(idx - 1).ok_or_else(|| {
                            BsonError::Deserialization(
                                "Bookmark does not match reader state".to_string(),
                            )
                        })?,
                        CompactString::from((idx - 1).to_string().as_str()),
                    ),
                };
                if level + 1 == indices.len() {
                    self.current = Some(child);
                    self.current_name = name;
                } else {
                    container = child;
                }
            }
        }
        Ok(())
    }
}

impl<'a> BsonReader for DocumentReader<'a> {
    fn read_element_type(&mut self) -> BsonResult<Option<ElementType>> {
        if self.current.is_some() {
            return Err(BsonError::Format(
                "Previous element payload not consumed".to_string(),
            ));
        }
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| BsonError::Format("Not inside a document".to_string()))?;
        match frame {
            TreeFrame::Document { fields, idx } => match fields.get_index(*idx) {
                Some((name, value)) => {
                    *idx += 1;
                    self.current_name = name.clone();
                    self.current = Some(value);
                    Ok(Some(value.element_type()))
                }
                None => Ok(None),
            },
            TreeFrame::Array { items, idx } => match items.get(*idx) {
                Some(value) => {
                    self.current_name = CompactString::from(idx.to_string().as_str());
                    *idx += 1;
                    self.current = Some(value);
                    Ok(Some(value.element_type()))
                }
                None => Ok(None),
            },
        }
    }

    fn read_name(&mut self) -> BsonResult<CompactString> {
        if self.current.is_none() {
            return Err(BsonError::Format("No pending element".to_string()));
        }
        Ok(self.current_name.clone())
    }

    fn current_type(&self) -> Option<ElementType> {
        self.current.map(|v| v.element_type())
    }

    fn read_start_document(&mut self) -> BsonResult<()> {
        let container = if self.frames.is_empty() && !self.scalar_root {
            self.root
        } else {
            self.current_value(ElementType::Document)?
        };
        match container {
            BsonValue::Document(fields) => {
                self.frames.push(TreeFrame::Document { fields, idx: 0 });
                Ok(())
            }
            other => Err(BsonError::Format(format!(
                "Expected document, got {}",
                other.type_name()
            ))),
        }
    }

    fn read_end_document(&mut self) -> BsonResult<()> {
        match self.frames.pop() {
            Some(TreeFrame::Document { fields, idx }) if idx == fields.len() => Ok(()),
            Some(TreeFrame::Document { .. }) => Err(BsonError::Format(
                "Document not fully consumed".to_string(),
            )),
            _ => Err(BsonError::Format(
                "No open document to close".to_string(),
            )),
        }
    }

    fn read_start_array(&mut self) -> BsonResult<()> {
        let value = self.current_value(ElementType::Array)?;
        match value {
            BsonValue::Array(items) => {
                self.frames.push(TreeFrame::Array { items, idx: 0 });
                Ok(())
            }
            _ => unreachable!("current_value checked the element type"),
        }
    }

    fn read_end_array(&mut self) -> BsonResult<()> {
        match self.frames.pop() {
            Some(TreeFrame::Array { items, idx }) if idx == items.len() => Ok(()),
            Some(TreeFrame::Array { .. }) => Err(BsonError::Format(
                "Array not fully consumed".to_string(),
            )),
            _ => Err(BsonError::Format("No open array to close".to_string())),
        }
    }

    fn read_double(&mut self) -> BsonResult<f64> {
        match self.current_value(ElementType::Double)? {
            BsonValue::Double(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    fn read_string(&mut self) -> BsonResult<CompactString> {
        match self.current_value(ElementType::String)? {
            BsonValue::String(s) => Ok(s.clone()),
            _ => unreachable!(),
        }
    }

    fn read_symbol(&mut self) -> BsonResult<CompactString> {
        match self.current_value(ElementType::Symbol)? {
            BsonValue::Symbol(s) => Ok(s.clone()),
            _ => unreachable!(),
        }
    }

    fn read_boolean(&mut self) -> BsonResult<bool> {
        match self.current_value(ElementType::Boolean)? {
            BsonValue::Boolean(b) => Ok(*b),
            _ => unreachable!(),
        }
    }

    fn read_int32(&mut self) -> BsonResult<i32> {
        match self.current_value(ElementType::Int32)? {
            BsonValue::Int32(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    fn read_int64(&mut self) -> BsonResult<i64> {
        match self.current_value(ElementType::Int64)? {
            BsonValue::Int64(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    fn read_decimal128(&mut self) -> BsonResult<Decimal128> {
        match self.current_value(ElementType::Decimal128)? {
            BsonValue::Decimal128(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    fn read_datetime(&mut self) -> BsonResult<i64> {
        match self.current_value(ElementType::DateTime)? {
            BsonValue::DateTime(dt) => Ok(dt.timestamp_millis()),
            _ => unreachable!(),
        }
    }

    fn read_timestamp(&mut self) -> BsonResult<u64> {
        match self.current_value(ElementType::Timestamp)? {
            BsonValue::Timestamp(v) => Ok(*v),
            _ => unreachable!(),
        }
    }

    fn read_object_id(&mut self) -> BsonResult<ObjectId> {
        match self.current_value(ElementType::ObjectId)? {
            BsonValue::ObjectId(id) => Ok(*id),
            _ => unreachable!(),
        }
    }

    fn read_binary(&mut self) -> BsonResult<Binary> {
        match self.current_value(ElementType::Binary)? {
            BsonValue::Binary(b) => Ok(b.clone()),
            _ => unreachable!(),
        }
    }

    fn read_regex(&mut self) -> BsonResult<RegexValue> {
        match self.current_value(ElementType::RegularExpression)? {
            BsonValue::RegularExpression(re) => Ok(re.clone()),
            _ => unreachable!(),
        }
    }

    fn read_javascript(&mut self) -> BsonResult<JavaScriptValue> {
        match self.current.take() {
            Some(BsonValue::JavaScript(js)) => Ok(js.clone()),
            Some(other) => Err(BsonError::Format(format!(
                "Expected JavaScript element, got {}",
                other.type_name()
            ))),
            None => Err(BsonError::Format("No pending element".to_string())),
        }
    }

    fn read_null(&mut self) -> BsonResult<()> {
        self.current_value(ElementType::Null).map(|_| ())
    }

    fn read_undefined(&mut self) -> BsonResult<()> {
        self.current_value(ElementType::Undefined).map(|_| ())
    }

    fn read_min_key(&mut self) -> BsonResult<()> {
        self.current_value(ElementType::MinKey).map(|_| ())
    }

    fn read_max_key(&mut self) -> BsonResult<()> {
        self.current_value(ElementType::MaxKey).map(|_| ())
    }

    fn skip_value(&mut self) -> BsonResult<()> {
        if self.current.take().is_none() {
            return Err(BsonError::Format("No pending element to skip".to_string()));
        }
        Ok(())
    }

    fn bookmark(&self) -> Bookmark {
        let indices = self
            .frames
            .iter()
            .map(|f| match f {
                TreeFrame::Document { idx, .. } => *idx,
                TreeFrame::Array { idx, .. } => *idx,
            })
            .collect();
        Bookmark(Repr::Tree {
            indices,
            has_current: self.current.is_some(),
        })
    }

    fn return_to_bookmark(&mut self, bookmark: Bookmark) -> BsonResult<()> {
        match bookmark.0 {
            Repr::Tree {
                indices,
                has_current,
            } => self.rebuild_frames(&indices, has_current),
            Repr::Binary { .. } => Err(BsonError::Deserialization(
                "Bookmark belongs to a different reader".to_string(),
            )),
        }
    }
}

/// 从任意读取器读出当前元素为 BsonValue
///
/// # Brief
/// 调用前 `read_element_type` 必须已返回 `Some`;
/// 递归消费文档与数组,返回后游标停在下一个兄弟元素之前。
pub fn read_value(reader: &mut dyn BsonReader) -> BsonResult<BsonValue> {
    let tag = reader
        .current_type()
        .ok_or_else(|| BsonError::Format("No pending element".to_string()))?;
    match tag {
        ElementType::Double => Ok(BsonValue::Double(reader.read_double()?)),
        ElementType::String => Ok(BsonValue::String(reader.read_string()?)),
        ElementType::Document => {
            reader.read_start_document()?;
            let mut fields = IndexMap::new();
            while reader.read_element_type()?.is_some() {
                let name = reader.read_name()?;
                fields.insert(name, read_value(reader)?);
            }
            reader.read_end_document()?;
            Ok(BsonValue::Document(fields))
        }
        ElementType::Array => {
            reader.read_start_array()?;
            let mut items = Vec::new();
            while reader.read_element_type()?.is_some() {
                items.push(read_value(reader)?);
            }
            reader.read_end_array()?;
            Ok(BsonValue::Array(items))
        }
        ElementType::Binary => Ok(BsonValue::Binary(reader.read_binary()?)),
        ElementType::Undefined => {
            reader.read_undefined()?;
            Ok(BsonValue::Undefined)
        }
        ElementType::ObjectId => Ok(BsonValue::ObjectId(reader.read_object_id()?)),
        ElementType::Boolean => Ok(BsonValue::Boolean(reader.read_boolean()?)),
        ElementType::DateTime => {
            let millis = reader.read_datetime()?;
            let dt = chrono::DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                BsonError::Format(format!("DateTime millis out of range: {}", millis))
            })?;
            Ok(BsonValue::DateTime(dt))
        }
        ElementType::Null => {
            reader.read_null()?;
            Ok(BsonValue::Null)
        }
        ElementType::RegularExpression => {
            Ok(BsonValue::RegularExpression(reader.read_regex()?))
        }
        ElementType::JavaScript | ElementType::JavaScriptWithScope => {
            Ok(BsonValue::JavaScript(reader.read_javascript()?))
        }
        ElementType::Symbol => Ok(BsonValue::Symbol(reader.read_symbol()?)),
        ElementType::Int32 => Ok(BsonValue::Int32(reader.read_int32()?)),
        ElementType::Timestamp => Ok(BsonValue::Timestamp(reader.read_timestamp()?)),
        ElementType::Int64 => Ok(BsonValue::Int64(reader.read_int64()?)),
        ElementType::Decimal128 => Ok(BsonValue::Decimal128(reader.read_decimal128()?)),
        ElementType::MinKey => {
            reader.read_min_key()?;
            Ok(BsonValue::MinKey)
        }
        ElementType::MaxKey => {
            reader.read_max_key()?;
            Ok(BsonValue::MaxKey)
        }
    }
}

/// 解码 BSON 字节为文档
///
/// # Brief
/// 解析标准 BSON 线格式,要求输入被完整消费
///
/// # Arguments
/// * `data` - 要解码的字节切片
///
/// # Returns
/// 成功返回 Document,失败返回错误
pub fn decode_document(data: &[u8]) -> BsonResult<Document> {
    let mut reader = BinaryReader::new(data);
    reader.read_start_document()?;
    let mut doc = Document::new();
    while reader.read_element_type()?.is_some() {
        let name = reader.read_name()?;
        doc.insert(name, read_value(&mut reader)?);
    }
    reader.read_end_document()?;
    if !reader.is_exhausted() {
        return Err(BsonError::Format(
            "Trailing bytes after document".to_string(),
        ));
    }
    Ok(doc)
}
