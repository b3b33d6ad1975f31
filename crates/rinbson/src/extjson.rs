//! Extended JSON 转换模块
//!
//! `BsonValue` 与 `serde_json::Value` 之间的值级转换,支持 MongoDB
//! Extended JSON 的 canonical 与 relaxed 两种输出模式。canonical 模式
//! 保留全部类型信息(数值一律包成 `$numberXxx` 字符串),relaxed 模式
//! 把普通数值和在 RFC3339 可表示范围内的日期写成原生 JSON 形式。
//! 解析方向对两种模式统一接受。

use crate::decimal128::Decimal128;
use crate::spec::BinarySubtype;
use crate::value::{Binary, BsonValue, JavaScriptValue, RegexValue};
use crate::{BsonError, BsonResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use rinbson_common::ObjectId;
use serde_json::{json, Map, Number, Value as Json};

/// Extended JSON 输出模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtJsonMode {
    /// 全部类型信息显式包装
    Canonical,
    /// 数值与可表示的日期用原生 JSON 形式
    #[default]
    Relaxed,
}

/// RFC3339 能表示的 $date 毫秒范围: 0001-01-01 到 9999-12-31
const DATE_STRING_MIN: i64 = -62_135_596_800_000;
const DATE_STRING_MAX: i64 = 253_402_300_799_999;

/// 把 BsonValue 编码为 Extended JSON
pub fn to_extjson(value: &BsonValue, mode: ExtJsonMode) -> Json {
    match value {
        BsonValue::Double(v) => double_to_json(*v, mode),
        BsonValue::String(s) => Json::String(s.to_string()),
        BsonValue::Document(doc) => Json::Object(
            doc.iter()
                .map(|(k, v)| (k.to_string(), to_extjson(v, mode)))
                .collect(),
        ),
        BsonValue::Array(arr) => {
            Json::Array(arr.iter().map(|v| to_extjson(v, mode)).collect())
        }
        BsonValue::Binary(b) => json!({
            "$binary": {
                "base64": BASE64.encode(&b.bytes),
                "subType": format!("{:02x}", b.subtype.to_u8()),
            }
        }),
        BsonValue::Undefined => json!({ "$undefined": true }),
        BsonValue::ObjectId(id) => json!({ "$oid": id.to_hex() }),
        BsonValue::Boolean(b) => Json::Bool(*b),
        BsonValue::DateTime(dt) => datetime_to_json(dt, mode),
        BsonValue::Null => Json::Null,
        BsonValue::RegularExpression(re) => json!({
            "$regularExpression": {
                "pattern": re.pattern.as_str(),
                "options": re.options.as_str(),
            }
        }),
        BsonValue::JavaScript(js) => match &js.scope {
            Some(scope) => {
                let scope_json: Map<String, Json> = scope
                    .iter()
                    .map(|(k, v)| (k.to_string(), to_extjson(v, mode)))
                    .collect();
                json!({ "$code": js.code.as_str(), "$scope": scope_json })
            }
            None => json!({ "$code": js.code.as_str() }),
        },
        BsonValue::Symbol(s) => json!({ "$symbol": s.as_str() }),
        BsonValue::Int32(v) => match mode {
            ExtJsonMode::Canonical => json!({ "$numberInt": v.to_string() }),
            ExtJsonMode::Relaxed => Json::Number(Number::from(*v)),
        },
        BsonValue::Timestamp(v) => json!({
            "$timestamp": { "t": (v >> 32) as u32, "i": (v & 0xffff_ffff) as u32 }
        }),
        BsonValue::Int64(v) => match mode {
            ExtJsonMode::Canonical => json!({ "$numberLong": v.to_string() }),
            ExtJsonMode::Relaxed => Json::Number(Number::from(*v)),
        },
        BsonValue::Decimal128(d) => json!({ "$numberDecimal": d.to_string() }),
        BsonValue::MinKey => json!({ "$minKey": 1 }),
        BsonValue::MaxKey => json!({ "$maxKey": 1 }),
    }
}

fn double_to_json(v: f64, mode: ExtJsonMode) -> Json {
    if v.is_nan() {
        return json!({ "$numberDouble": "NaN" });
    }
    if v.is_infinite() {
        let token = if v > 0.0 { "Infinity" } else { "-Infinity" };
        return json!({ "$numberDouble": token });
    }
    match mode {
        ExtJsonMode::Canonical => {
            json!({ "$numberDouble": format_double(v) })
        }
        ExtJsonMode::Relaxed => match Number::from_f64(v) {
            Some(n) => Json::Number(n),
            // from_f64 只对非有限值返回 None,上面已处理
            None => Json::Null,
        },
    }
}

fn format_double(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

fn datetime_to_json(dt: &DateTime<Utc>, mode: ExtJsonMode) -> Json {
    let millis = dt.timestamp_millis();
    match mode {
        ExtJsonMode::Relaxed if (DATE_STRING_MIN..=DATE_STRING_MAX).contains(&millis) => {
            json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::Millis, true) })
        }
        _ => json!({ "$date": { "$numberLong": millis.to_string() } }),
    }
}

/// 把 Extended JSON 解码回 BsonValue
///
/// # Brief
/// canonical 与 relaxed 两种输入统一接受;首键以 `$` 开头的对象按
/// 类型包装解释,未知的 `$` 键名报格式错误。纯数值按是否整数与
/// 范围落到 Int32/Int64/Double。
pub fn from_extjson(json: &Json) -> BsonResult<BsonValue> {
    match json {
        Json::Null => Ok(BsonValue::Null),
        Json::Bool(b) => Ok(BsonValue::Boolean(*b)),
        Json::Number(n) => number_to_bson(n),
        Json::String(s) => Ok(BsonValue::String(CompactString::from(s.as_str()))),
        Json::Array(arr) => {
            let items: BsonResult<Vec<BsonValue>> = arr.iter().map(from_extjson).collect();
            Ok(BsonValue::Array(items?))
        }
        Json::Object(map) => object_to_bson(map),
    }
}

fn number_to_bson(n: &Number) -> BsonResult<BsonValue> {
    if let Some(v) = n.as_i64() {
        if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            return Ok(BsonValue::Int32(v as i32));
        }
        return Ok(BsonValue::Int64(v));
    }
    match n.as_f64() {
        Some(v) => Ok(BsonValue::Double(v)),
        None => Err(BsonError::Format(format!("Unrepresentable number {}", n))),
    }
}

fn object_to_bson(map: &Map<String, Json>) -> BsonResult<BsonValue> {
    let wrapper_key = map.keys().find(|k| k.starts_with('$'));
    let Some(key) = wrapper_key else {
        let mut doc = IndexMap::with_capacity(map.len());
        for (k, v) in map {
            doc.insert(CompactString::from(k.as_str()), from_extjson(v)?);
        }
        return Ok(BsonValue::Document(doc));
    };
    match key.as_str() {
        "$numberInt" => {
            let s = expect_str(map, "$numberInt")?;
            let v = s
                .parse::<i32>()
                .map_err(|_| BsonError::Format(format!("Invalid $numberInt {:?}", s)))?;
            Ok(BsonValue::Int32(v))
        }
        "$numberLong" => {
            let s = expect_str(map, "$numberLong")?;
            let v = s
                .parse::<i64>()
                .map_err(|_| BsonError::Format(format!("Invalid $numberLong {:?}", s)))?;
            Ok(BsonValue::Int64(v))
        }
        "$numberDouble" => {
            let s = expect_str(map, "$numberDouble")?;
            let v = match s {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other
                    .parse::<f64>()
                    .map_err(|_| BsonError::Format(format!("Invalid $numberDouble {:?}", other)))?,
            };
            Ok(BsonValue::Double(v))
        }
        "$numberDecimal" => {
            let s = expect_str(map, "$numberDecimal")?;
            Ok(BsonValue::Decimal128(Decimal128::parse(s)?))
        }
        "$oid" => {
            let s = expect_str(map, "$oid")?;
            let id = ObjectId::from_hex(s)
                .map_err(|e| BsonError::Format(format!("Invalid $oid: {}", e)))?;
            Ok(BsonValue::ObjectId(id))
        }
        "$date" => match &map["$date"] {
            Json::String(s) => {
                let dt = DateTime::parse_from_rfc3339(s)
                    .map_err(|_| BsonError::Format(format!("Invalid $date {:?}", s)))?;
                Ok(BsonValue::DateTime(dt.with_timezone(&Utc)))
            }
            other => match from_extjson(other)? {
                BsonValue::Int64(millis) => millis_to_datetime(millis),
                BsonValue::Int32(millis) => millis_to_datetime(millis as i64),
                _ => Err(BsonError::Format(
                    "$date must be a string or $numberLong".to_string(),
                )),
            },
        },
        "$binary" => {
            let body = map["$binary"].as_object().ok_or_else(|| {
                BsonError::Format("$binary must be an object".to_string())
            })?;
            let encoded = body
                .get("base64")
                .and_then(Json::as_str)
                .ok_or_else(|| BsonError::Format("$binary.base64 missing".to_string()))?;
            let subtype_hex = body
                .get("subType")
                .and_then(Json::as_str)
                .ok_or_else(|| BsonError::Format("$binary.subType missing".to_string()))?;
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| BsonError::Format(format!("Invalid base64: {}", e)))?;
            let subtype = u8::from_str_radix(subtype_hex, 16)
                .map_err(|_| BsonError::Format(format!("Invalid subType {:?}", subtype_hex)))?;
            Ok(BsonValue::Binary(Binary {
                subtype: BinarySubtype::from_u8(subtype)?,
                bytes,
            }))
        }
        "$uuid" => {
            let s = expect_str(map, "$uuid")?;
            let uuid = uuid::Uuid::parse_str(s)
                .map_err(|_| BsonError::Format(format!("Invalid $uuid {:?}", s)))?;
            Ok(BsonValue::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: uuid.as_bytes().to_vec(),
            }))
        }
        "$regularExpression" => {
            let body = map["$regularExpression"].as_object().ok_or_else(|| {
                BsonError::Format("$regularExpression must be an object".to_string())
            })?;
            let pattern = body.get("pattern").and_then(Json::as_str).ok_or_else(|| {
                BsonError::Format("$regularExpression.pattern missing".to_string())
            })?;
            let options = body.get("options").and_then(Json::as_str).unwrap_or("");
            Ok(BsonValue::RegularExpression(RegexValue::new(
                pattern, options,
            )))
        }
        "$symbol" => {
            let s = expect_str(map, "$symbol")?;
            Ok(BsonValue::Symbol(CompactString::from(s)))
        }
        "$code" => {
            let code = expect_str(map, "$code")?;
            match map.get("$scope") {
                Some(Json::Object(scope_map)) => {
                    let mut scope = IndexMap::with_capacity(scope_map.len());
                    for (k, v) in scope_map {
                        scope.insert(CompactString::from(k.as_str()), from_extjson(v)?);
                    }
                    Ok(BsonValue::JavaScript(JavaScriptValue::with_scope(
                        code, scope,
                    )))
                }
                Some(_) => Err(BsonError::Format("$scope must be an object".to_string())),
                None => Ok(BsonValue::JavaScript(JavaScriptValue::new(code))),
            }
        }
        "$timestamp" => {
            let body = map["$timestamp"]
                .as_object()
                .ok_or_else(|| BsonError::Format("$timestamp must be an object".to_string()))?;
            let t = body
                .get("t")
                .and_then(Json::as_u64)
                .ok_or_else(|| BsonError::Format("$timestamp.t missing".to_string()))?;
            let i = body
                .get("i")
                .and_then(Json::as_u64)
                .ok_or_else(|| BsonError::Format("$timestamp.i missing".to_string()))?;
            if t > u32::MAX as u64 || i > u32::MAX as u64 {
                return Err(BsonError::Format(
                    "$timestamp components must fit in 32 bits".to_string(),
                ));
            }
            Ok(BsonValue::Timestamp((t << 32) | i))
        }
        "$undefined" => Ok(BsonValue::Undefined),
        "$minKey" => Ok(BsonValue::MinKey),
        "$maxKey" => Ok(BsonValue::MaxKey),
        other => Err(BsonError::Format(format!(
            "Unknown Extended JSON wrapper {:?}",
            other
        ))),
    }
}

fn expect_str<'a>(map: &'a Map<String, Json>, key: &str) -> BsonResult<&'a str> {
    map[key]
        .as_str()
        .ok_or_else(|| BsonError::Format(format!("{} must be a string", key)))
}

fn millis_to_datetime(millis: i64) -> BsonResult<BsonValue> {
    match Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => Ok(BsonValue::DateTime(dt)),
        _ => Err(BsonError::Format(format!(
            "Millisecond timestamp {} out of range",
            millis
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson;

    #[test]
    fn test_canonical_wraps_numbers() {
        let value = bson!({ "a": 1, "b": 2i64, "c": 1.5 });
        let json = to_extjson(&value, ExtJsonMode::Canonical);
        assert_eq!(
            json,
            json!({
                "a": { "$numberInt": "1" },
                "b": { "$numberLong": "2" },
                "c": { "$numberDouble": "1.5" }
            })
        );
    }

    #[test]
    fn test_relaxed_uses_native_numbers() {
        let value = bson!({ "a": 1, "b": 2i64, "c": 1.5 });
        let json = to_extjson(&value, ExtJsonMode::Relaxed);
        assert_eq!(json, json!({ "a": 1, "b": 2, "c": 1.5 }));
    }

    #[test]
    fn test_non_finite_double_always_wrapped() {
        let json = to_extjson(&bson!(f64::NAN), ExtJsonMode::Relaxed);
        assert_eq!(json, json!({ "$numberDouble": "NaN" }));
        let back = from_extjson(&json).unwrap();
        assert!(matches!(back, BsonValue::Double(v) if v.is_nan()));
    }

    #[test]
    fn test_datetime_modes() {
        let dt = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let value = BsonValue::DateTime(dt);
        assert_eq!(
            to_extjson(&value, ExtJsonMode::Relaxed),
            json!({ "$date": "2023-11-14T22:13:20.123Z" })
        );
        assert_eq!(
            to_extjson(&value, ExtJsonMode::Canonical),
            json!({ "$date": { "$numberLong": "1700000000123" } })
        );
        assert_eq!(
            from_extjson(&json!({ "$date": "2023-11-14T22:13:20.123Z" })).unwrap(),
            value
        );
        assert_eq!(
            from_extjson(&json!({ "$date": { "$numberLong": "1700000000123" } })).unwrap(),
            value
        );
    }

    #[test]
    fn test_binary_roundtrip() {
        let value = BsonValue::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: vec![0xde, 0xad, 0xbe, 0xef],
        });
        let json = to_extjson(&value, ExtJsonMode::Canonical);
        assert_eq!(
            json,
            json!({ "$binary": { "base64": "3q2+7w==", "subType": "04" } })
        );
        assert_eq!(from_extjson(&json).unwrap(), value);
    }

    #[test]
    fn test_oid_and_exotic_types() {
        let id = ObjectId::from_hex("507f1f77bcf86cd799439011").unwrap();
        let value = bson!({
            "id": (BsonValue::ObjectId(id)),
            "re": (BsonValue::RegularExpression(RegexValue::new("^a", "i"))),
            "min": (BsonValue::MinKey),
            "sym": (BsonValue::Symbol("s".into()))
        });
        let json = to_extjson(&value, ExtJsonMode::Canonical);
        assert_eq!(from_extjson(&json).unwrap(), value);
    }

    #[test]
    fn test_code_with_scope_roundtrip() {
        let mut scope = IndexMap::new();
        scope.insert(CompactString::from("x"), BsonValue::Int32(1));
        let value = BsonValue::JavaScript(JavaScriptValue::with_scope("return x", scope));
        let json = to_extjson(&value, ExtJsonMode::Relaxed);
        assert_eq!(from_extjson(&json).unwrap(), value);
    }

    #[test]
    fn test_timestamp_split() {
        let value = BsonValue::Timestamp((5u64 << 32) | 9);
        let json = to_extjson(&value, ExtJsonMode::Canonical);
        assert_eq!(json, json!({ "$timestamp": { "t": 5, "i": 9 } }));
        assert_eq!(from_extjson(&json).unwrap(), value);
    }

    #[test]
    fn test_plain_json_number_narrowing() {
        assert_eq!(from_extjson(&json!(7)).unwrap(), BsonValue::Int32(7));
        assert_eq!(
            from_extjson(&json!(5_000_000_000i64)).unwrap(),
            BsonValue::Int64(5_000_000_000)
        );
        assert_eq!(from_extjson(&json!(0.25)).unwrap(), BsonValue::Double(0.25));
    }

    #[test]
    fn test_unknown_wrapper_rejected() {
        assert!(from_extjson(&json!({ "$bogus": 1 })).is_err());
    }

    #[test]
    fn test_uuid_wrapper() {
        let json = json!({ "$uuid": "00112233-4455-6677-8899-aabbccddeeff" });
        match from_extjson(&json).unwrap() {
            BsonValue::Binary(b) => {
                assert_eq!(b.subtype, BinarySubtype::Uuid);
                assert_eq!(b.bytes.len(), 16);
            }
            other => panic!("expected binary, got {}", other.type_name()),
        }
    }
}
