//! Apache Avro codec
//!
//! Compiles schema documents with the `apache-avro` crate and converts
//! between Avro binary datums and `serde_json::Value`.
//!
//! JSON mapping:
//!
//! | Avro | JSON |
//! |------|------|
//! | `null`, `boolean`, `string` | same |
//! | `int`, `long`, `float`, `double` | number |
//! | `bytes`, `fixed` | base64 string |
//! | `enum` | symbol string |
//! | `record`, `map` | object |
//! | `array` | array |
//! | `union` | the branch value (`{"<type>": v}` also accepted on encode) |
//! | `date`, `time-*`, `timestamp-*`, `local-timestamp-*` | number |
//! | `uuid` | hyphenated string |
//! | `decimal`, `duration` | base64 string of the raw bytes |
//! | `big-decimal` | decimal string |
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_avro::avro::{AvroCodec, AvroCompiler, SchemaCompiler};
//!
//! let codec = AvroCompiler.compile(&r#"{"type": "record", "name": "User",
//!     "fields": [{"name": "id", "type": "long"}]}"#.into())?;
//! let bytes = codec.encode(&serde_json::json!({"id": 1}))?;
//! assert_eq!(codec.decode(&bytes)?, serde_json::json!({"id": 1}));
//! ```

use crate::error::{Result, TranscodeError};
use crate::types::SchemaDocument;
use apache_avro::{
    from_avro_datum, to_avro_datum, types::Value as AvroValue, BigDecimal, Decimal,
    Duration as AvroDuration, Schema as AvroSchemaInner, Uuid,
};
use serde_json::{Number, Value as JsonValue};
use std::collections::HashMap;
use std::io::Cursor;
use std::str::FromStr;

/// Turns schema documents into codecs
///
/// Compilation is the expensive step the codec cache exists to avoid.
pub trait SchemaCompiler: Send + Sync {
    fn compile(&self, document: &SchemaDocument) -> Result<AvroCodec>;
}

/// Compiles documents with `apache-avro`
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroCompiler;

impl SchemaCompiler for AvroCompiler {
    fn compile(&self, document: &SchemaDocument) -> Result<AvroCodec> {
        AvroCodec::compile(document)
    }
}

/// A compiled writer schema
///
/// Immutable once built; share it behind an `Arc`.
pub struct AvroCodec {
    schema: AvroSchemaInner,
    document: SchemaDocument,
}

impl std::fmt::Debug for AvroCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroCodec")
            .field("document", &self.document.as_str())
            .finish()
    }
}

impl AvroCodec {
    /// Parse and compile a schema document
    pub fn compile(document: &SchemaDocument) -> Result<Self> {
        let schema = AvroSchemaInner::parse_str(document.as_str())
            .map_err(|e| TranscodeError::SchemaCompileError(e.to_string()))?;

        Ok(Self {
            schema,
            document: document.clone(),
        })
    }

    /// The document this codec was compiled from
    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    /// The compiled `apache-avro` schema
    pub fn schema(&self) -> &AvroSchemaInner {
        &self.schema
    }

    /// Fully qualified name of a named top-level type
    pub fn fullname(&self) -> Option<String> {
        let name = match &self.schema {
            AvroSchemaInner::Record(r) => &r.name,
            AvroSchemaInner::Enum(e) => &e.name,
            AvroSchemaInner::Fixed(f) => &f.name,
            _ => return None,
        };
        Some(match &name.namespace {
            Some(ns) => format!("{}.{}", ns, name.name),
            None => name.name.clone(),
        })
    }

    /// Encode a value to an Avro binary datum (no header)
    pub fn encode(&self, value: &JsonValue) -> Result<Vec<u8>> {
        let avro_value = json_to_avro(value, &self.schema)?;
        to_avro_datum(&self.schema, avro_value).map_err(|e| TranscodeError::Encode(e.to_string()))
    }

    /// Decode an Avro binary datum (no header)
    ///
    /// Trailing bytes after the datum are ignored; see [`AvroCodec::decode_datum`].
    pub fn decode(&self, data: &[u8]) -> Result<JsonValue> {
        self.decode_datum(data).map(|(value, _)| value)
    }

    /// Decode one datum, returning it with the number of bytes consumed
    pub fn decode_datum(&self, data: &[u8]) -> Result<(JsonValue, usize)> {
        let mut cursor = Cursor::new(data);
        let avro_value = from_avro_datum(&self.schema, &mut cursor, None)
            .map_err(|e| TranscodeError::Decode(e.to_string()))?;
        // position never exceeds data.len(), which fits in usize
        let consumed = cursor.position() as usize;
        Ok((avro_to_json(&avro_value)?, consumed))
    }
}

/// Name a JSON union wrapper key has to carry to select `variant`
fn union_branch_name(variant: &AvroSchemaInner) -> Option<&str> {
    Some(match variant {
        AvroSchemaInner::Null => "null",
        AvroSchemaInner::Boolean => "boolean",
        AvroSchemaInner::Int => "int",
        AvroSchemaInner::Long => "long",
        AvroSchemaInner::Float => "float",
        AvroSchemaInner::Double => "double",
        AvroSchemaInner::String => "string",
        AvroSchemaInner::Bytes => "bytes",
        AvroSchemaInner::Array(_) => "array",
        AvroSchemaInner::Map(_) => "map",
        AvroSchemaInner::Record(r) => r.name.name.as_str(),
        AvroSchemaInner::Enum(e) => e.name.name.as_str(),
        AvroSchemaInner::Fixed(f) => f.name.name.as_str(),
        AvroSchemaInner::Decimal(d) => return union_branch_name(&d.inner),
        AvroSchemaInner::Date | AvroSchemaInner::TimeMillis => "int",
        AvroSchemaInner::TimeMicros
        | AvroSchemaInner::TimestampMillis
        | AvroSchemaInner::TimestampMicros
        | AvroSchemaInner::TimestampNanos
        | AvroSchemaInner::LocalTimestampMillis
        | AvroSchemaInner::LocalTimestampMicros
        | AvroSchemaInner::LocalTimestampNanos => "long",
        AvroSchemaInner::Uuid => "string",
        AvroSchemaInner::BigDecimal => "bytes",
        _ => return None,
    })
}

fn type_name(schema: &AvroSchemaInner) -> &'static str {
    match schema {
        AvroSchemaInner::Null => "null",
        AvroSchemaInner::Boolean => "boolean",
        AvroSchemaInner::Int => "int",
        AvroSchemaInner::Long => "long",
        AvroSchemaInner::Float => "float",
        AvroSchemaInner::Double => "double",
        AvroSchemaInner::Bytes => "bytes",
        AvroSchemaInner::String => "string",
        AvroSchemaInner::Array(_) => "array",
        AvroSchemaInner::Map(_) => "map",
        AvroSchemaInner::Union(_) => "union",
        AvroSchemaInner::Record(_) => "record",
        AvroSchemaInner::Enum(_) => "enum",
        AvroSchemaInner::Fixed(_) => "fixed",
        AvroSchemaInner::Decimal(_) => "decimal",
        AvroSchemaInner::BigDecimal => "big-decimal",
        AvroSchemaInner::Uuid => "uuid",
        AvroSchemaInner::Date => "date",
        AvroSchemaInner::TimeMillis => "time-millis",
        AvroSchemaInner::TimeMicros => "time-micros",
        AvroSchemaInner::TimestampMillis => "timestamp-millis",
        AvroSchemaInner::TimestampMicros => "timestamp-micros",
        AvroSchemaInner::TimestampNanos => "timestamp-nanos",
        AvroSchemaInner::LocalTimestampMillis => "local-timestamp-millis",
        AvroSchemaInner::LocalTimestampMicros => "local-timestamp-micros",
        AvroSchemaInner::LocalTimestampNanos => "local-timestamp-nanos",
        AvroSchemaInner::Duration => "duration",
        AvroSchemaInner::Ref { .. } => "ref",
    }
}

fn decode_base64(s: &str) -> Result<Vec<u8>> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
        .map_err(|e| TranscodeError::Encode(format!("Invalid base64: {}", e)))
}

fn encode_base64(bytes: &[u8]) -> JsonValue {
    JsonValue::String(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        bytes,
    ))
}

/// Length of a big-endian two's complement integer without redundant sign bytes
fn significant_len(bytes: &[u8]) -> usize {
    let mut start = 0;
    while start + 1 < bytes.len() {
        let (lead, next) = (bytes[start], bytes[start + 1]);
        if (lead == 0x00 && next & 0x80 == 0) || (lead == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    (bytes.len() - start).max(1)
}

fn to_int(n: &Number, schema: &AvroSchemaInner) -> Result<i32> {
    let i = to_long(n, schema)?;
    i32::try_from(i).map_err(|_| {
        TranscodeError::Encode(format!("Value {} out of {} range", i, type_name(schema)))
    })
}

fn to_long(n: &Number, schema: &AvroSchemaInner) -> Result<i64> {
    n.as_i64().ok_or_else(|| {
        TranscodeError::Encode(format!("Expected {}, got {}", type_name(schema), n))
    })
}

/// Convert JSON value to Avro value
fn json_to_avro(json: &JsonValue, schema: &AvroSchemaInner) -> Result<AvroValue> {
    match (schema, json) {
        (AvroSchemaInner::Null, JsonValue::Null) => Ok(AvroValue::Null),

        (AvroSchemaInner::Boolean, JsonValue::Bool(b)) => Ok(AvroValue::Boolean(*b)),

        (AvroSchemaInner::Int, JsonValue::Number(n)) => Ok(AvroValue::Int(to_int(n, schema)?)),

        (AvroSchemaInner::Long, JsonValue::Number(n)) => Ok(AvroValue::Long(to_long(n, schema)?)),

        (AvroSchemaInner::Date, JsonValue::Number(n)) => Ok(AvroValue::Date(to_int(n, schema)?)),

        (AvroSchemaInner::TimeMillis, JsonValue::Number(n)) => {
            Ok(AvroValue::TimeMillis(to_int(n, schema)?))
        }

        (AvroSchemaInner::TimeMicros, JsonValue::Number(n)) => {
            Ok(AvroValue::TimeMicros(to_long(n, schema)?))
        }

        (AvroSchemaInner::TimestampMillis, JsonValue::Number(n)) => {
            Ok(AvroValue::TimestampMillis(to_long(n, schema)?))
        }

        (AvroSchemaInner::TimestampMicros, JsonValue::Number(n)) => {
            Ok(AvroValue::TimestampMicros(to_long(n, schema)?))
        }

        (AvroSchemaInner::TimestampNanos, JsonValue::Number(n)) => {
            Ok(AvroValue::TimestampNanos(to_long(n, schema)?))
        }

        (AvroSchemaInner::LocalTimestampMillis, JsonValue::Number(n)) => {
            Ok(AvroValue::LocalTimestampMillis(to_long(n, schema)?))
        }

        (AvroSchemaInner::LocalTimestampMicros, JsonValue::Number(n)) => {
            Ok(AvroValue::LocalTimestampMicros(to_long(n, schema)?))
        }

        (AvroSchemaInner::LocalTimestampNanos, JsonValue::Number(n)) => {
            Ok(AvroValue::LocalTimestampNanos(to_long(n, schema)?))
        }

        (AvroSchemaInner::Uuid, JsonValue::String(s)) => Uuid::parse_str(s)
            .map(AvroValue::Uuid)
            .map_err(|e| TranscodeError::Encode(format!("Invalid uuid {}: {}", s, e))),

        (AvroSchemaInner::Decimal(decimal_schema), JsonValue::String(s)) => {
            let bytes = decode_base64(s)?;
            // a fixed-backed decimal must fit its size once sign padding is stripped
            if let AvroSchemaInner::Fixed(fixed) = decimal_schema.inner.as_ref() {
                let needed = significant_len(&bytes);
                if needed > fixed.size {
                    return Err(TranscodeError::Encode(format!(
                        "Decimal needs {} bytes, fixed size is {}",
                        needed, fixed.size
                    )));
                }
            }
            Ok(AvroValue::Decimal(Decimal::from(bytes)))
        }

        (AvroSchemaInner::BigDecimal, JsonValue::String(s)) => BigDecimal::from_str(s)
            .map(AvroValue::BigDecimal)
            .map_err(|e| TranscodeError::Encode(format!("Invalid decimal {}: {}", s, e))),

        (AvroSchemaInner::Duration, JsonValue::String(s)) => {
            let bytes: [u8; 12] = decode_base64(s)?.try_into().map_err(|b: Vec<u8>| {
                TranscodeError::Encode(format!("Duration needs 12 bytes, got {}", b.len()))
            })?;
            Ok(AvroValue::Duration(AvroDuration::from(bytes)))
        }

        (AvroSchemaInner::Float, JsonValue::Number(n)) => {
            let f = n
                .as_f64()
                .ok_or_else(|| TranscodeError::Encode(format!("Expected float, got {}", n)))?;
            Ok(AvroValue::Float(f as f32))
        }

        (AvroSchemaInner::Double, JsonValue::Number(n)) => {
            let f = n
                .as_f64()
                .ok_or_else(|| TranscodeError::Encode(format!("Expected double, got {}", n)))?;
            Ok(AvroValue::Double(f))
        }

        (AvroSchemaInner::String, JsonValue::String(s)) => Ok(AvroValue::String(s.clone())),

        (AvroSchemaInner::Bytes, JsonValue::String(s)) => Ok(AvroValue::Bytes(decode_base64(s)?)),

        (AvroSchemaInner::Array(array_schema), JsonValue::Array(arr)) => {
            let items = arr
                .iter()
                .map(|item| json_to_avro(item, &array_schema.items))
                .collect::<Result<Vec<_>>>()?;
            Ok(AvroValue::Array(items))
        }

        (AvroSchemaInner::Map(map_schema), JsonValue::Object(obj)) => {
            let mut map = HashMap::with_capacity(obj.len());
            for (k, v) in obj {
                map.insert(k.clone(), json_to_avro(v, &map_schema.types)?);
            }
            Ok(AvroValue::Map(map))
        }

        (AvroSchemaInner::Union(union_schema), json) => {
            // explicit {"<branch>": value} wrapper first
            if let JsonValue::Object(obj) = json {
                if let Some((key, value)) = obj.iter().next().filter(|_| obj.len() == 1) {
                    for (idx, variant) in union_schema.variants().iter().enumerate() {
                        if union_branch_name(variant) == Some(key.as_str()) {
                            if let Ok(v) = json_to_avro(value, variant) {
                                return Ok(AvroValue::Union(idx as u32, Box::new(v)));
                            }
                        }
                    }
                }
            }

            for (idx, variant) in union_schema.variants().iter().enumerate() {
                if let Ok(v) = json_to_avro(json, variant) {
                    return Ok(AvroValue::Union(idx as u32, Box::new(v)));
                }
            }
            Err(TranscodeError::Encode(format!(
                "No matching union variant for: {}",
                json
            )))
        }

        (AvroSchemaInner::Record(record_schema), JsonValue::Object(obj)) => {
            let mut fields = Vec::with_capacity(record_schema.fields.len());
            for field in &record_schema.fields {
                let value = if let Some(v) = obj.get(&field.name) {
                    json_to_avro(v, &field.schema)?
                } else if let Some(default) = &field.default {
                    json_to_avro(default, &field.schema)?
                } else {
                    return Err(TranscodeError::Encode(format!(
                        "Missing required field: {}",
                        field.name
                    )));
                };
                fields.push((field.name.clone(), value));
            }
            Ok(AvroValue::Record(fields))
        }

        (AvroSchemaInner::Enum(enum_schema), JsonValue::String(s)) => {
            match enum_schema.symbols.iter().position(|sym| sym == s) {
                Some(pos) => Ok(AvroValue::Enum(pos as u32, s.clone())),
                None => Err(TranscodeError::Encode(format!(
                    "Invalid enum symbol: {}",
                    s
                ))),
            }
        }

        (AvroSchemaInner::Fixed(fixed_schema), JsonValue::String(s)) => {
            let bytes = decode_base64(s)?;
            if bytes.len() != fixed_schema.size {
                return Err(TranscodeError::Encode(format!(
                    "Fixed size mismatch: expected {}, got {}",
                    fixed_schema.size,
                    bytes.len()
                )));
            }
            Ok(AvroValue::Fixed(fixed_schema.size, bytes))
        }

        _ => Err(TranscodeError::Encode(format!(
            "Type mismatch: expected {}, got {}",
            type_name(schema),
            json
        ))),
    }
}

/// Convert Avro value to JSON
fn avro_to_json(avro: &AvroValue) -> Result<JsonValue> {
    match avro {
        AvroValue::Null => Ok(JsonValue::Null),
        AvroValue::Boolean(b) => Ok(JsonValue::Bool(*b)),
        AvroValue::Int(i) | AvroValue::Date(i) | AvroValue::TimeMillis(i) => {
            Ok(JsonValue::Number((*i).into()))
        }
        AvroValue::Long(l)
        | AvroValue::TimeMicros(l)
        | AvroValue::TimestampMillis(l)
        | AvroValue::TimestampMicros(l)
        | AvroValue::TimestampNanos(l)
        | AvroValue::LocalTimestampMillis(l)
        | AvroValue::LocalTimestampMicros(l)
        | AvroValue::LocalTimestampNanos(l) => Ok(JsonValue::Number((*l).into())),
        AvroValue::Float(f) => Ok(serde_json::json!(*f)),
        AvroValue::Double(d) => Ok(serde_json::json!(*d)),
        AvroValue::String(s) => Ok(JsonValue::String(s.clone())),
        AvroValue::Uuid(u) => Ok(JsonValue::String(u.to_string())),
        AvroValue::Bytes(b) | AvroValue::Fixed(_, b) => Ok(encode_base64(b)),
        AvroValue::Decimal(d) => {
            let bytes = <Vec<u8>>::try_from(d).map_err(|e| TranscodeError::Decode(e.to_string()))?;
            Ok(encode_base64(&bytes))
        }
        AvroValue::BigDecimal(d) => Ok(JsonValue::String(d.to_string())),
        AvroValue::Duration(d) => {
            let bytes: [u8; 12] = (*d).into();
            Ok(encode_base64(&bytes))
        }
        AvroValue::Array(arr) => {
            let items = arr.iter().map(avro_to_json).collect::<Result<Vec<_>>>()?;
            Ok(JsonValue::Array(items))
        }
        AvroValue::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), avro_to_json(v)?);
            }
            Ok(JsonValue::Object(obj))
        }
        AvroValue::Union(_idx, inner) => avro_to_json(inner),
        AvroValue::Record(fields) => {
            let mut obj = serde_json::Map::new();
            for (name, value) in fields {
                obj.insert(name.clone(), avro_to_json(value)?);
            }
            Ok(JsonValue::Object(obj))
        }
        AvroValue::Enum(_idx, symbol) => Ok(JsonValue::String(symbol.clone())),
        _ => Err(TranscodeError::Decode(format!(
            "Unsupported Avro value: {:?}",
            avro
        ))),
    }
}
