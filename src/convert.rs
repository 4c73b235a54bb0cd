//! Type Conversion - streams, strings, bytes and JSON
//!
//! Bindings move data between the wire (byte streams) and the values a
//! function body sees. This module holds the conversion rules:
//!
//! - `to_stream` / `from_stream` for binary sinks and sources
//! - `convert` to a binding's declared `dataType`
//! - `normalize_to_many` for collector (batch) outputs
//! - `convert_item` to a collector's element type
//!
//! Scalars written to a binary sink use their fixed-width little-endian
//! encoding (int32: 4 bytes, bool: 1 byte, float64: 8 bytes).

use std::fmt;
use std::io::Cursor;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, WeftError};

/// Readable byte stream handed across binding boundaries
pub type ByteStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Declared `dataType` of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    String,
    Binary,
    Stream,
}

impl DataKind {
    /// Parse a `dataType` discriminator (case-insensitive)
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "binary" => Ok(Self::Binary),
            "stream" => Ok(Self::Stream),
            _ => Err(WeftError::unsupported(format!("dataType '{}'", raw), "string|binary|stream")),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Binary => f.write_str("binary"),
            Self::Stream => f.write_str("stream"),
        }
    }
}

/// Element type accepted by a collector sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    String,
    Json,
    Bytes,
}

impl ElementKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "json" | "object" => Ok(Self::Json),
            "binary" | "bytes" => Ok(Self::Bytes),
            _ => Err(WeftError::unsupported(format!("element type '{}'", raw), "string|json|bytes")),
        }
    }

    /// Collector element matching a declared `dataType`
    pub fn for_data_kind(kind: Option<DataKind>, default: ElementKind) -> Self {
        match kind {
            Some(DataKind::String) => Self::String,
            Some(DataKind::Binary) | Some(DataKind::Stream) => Self::Bytes,
            None => default,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Json => f.write_str("json"),
            Self::Bytes => f.write_str("bytes"),
        }
    }
}

/// A value crossing a binding boundary
pub enum DomainValue {
    Bytes(Vec<u8>),
    String(String),
    Json(Value),
    Int32(i32),
    Bool(bool),
    Float64(f64),
    Stream(ByteStream),
}

impl DomainValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::Json(_) => "json",
            Self::Int32(_) => "int32",
            Self::Bool(_) => "bool",
            Self::Float64(_) => "float64",
            Self::Stream(_) => "stream",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Best-effort JSON snapshot for logging; streams render as null
    pub fn to_json_lossy(&self) -> Value {
        match self {
            Self::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Self::String(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::Int32(n) => Value::from(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Float64(n) => Value::from(*n),
            Self::Stream(_) => Value::Null,
        }
    }
}

impl fmt::Debug for DomainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::String(s) => f.debug_tuple("String").field(s).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Int32(n) => f.debug_tuple("Int32").field(n).finish(),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Float64(n) => f.debug_tuple("Float64").field(n).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&str> for DomainValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for DomainValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for DomainValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Value> for DomainValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

/// Encode a value for a binary sink
pub fn to_stream(value: DomainValue) -> Result<ByteStream> {
    let bytes = match value {
        DomainValue::Stream(stream) => return Ok(stream),
        other => encode_bytes(other)?,
    };
    Ok(Box::new(Cursor::new(bytes)))
}

/// Read a stream into the requested kind
pub async fn from_stream(mut stream: ByteStream, target: DataKind) -> Result<DomainValue> {
    match target {
        DataKind::Stream => Ok(DomainValue::Stream(stream)),
        DataKind::Binary => {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            Ok(DomainValue::Bytes(buf))
        }
        DataKind::String => {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            utf8(buf).map(DomainValue::String)
        }
    }
}

/// Convert a value to a binding's declared data kind
pub async fn convert(value: DomainValue, target: DataKind) -> Result<DomainValue> {
    match (value, target) {
        (DomainValue::Stream(stream), target) => from_stream(stream, target).await,
        (value, DataKind::Stream) => to_stream(value).map(DomainValue::Stream),
        (value, DataKind::Binary) => encode_bytes(value).map(DomainValue::Bytes),
        (DomainValue::Bytes(b), DataKind::String) => utf8(b).map(DomainValue::String),
        (value, DataKind::String) => Ok(DomainValue::String(render_text(&value)?)),
    }
}

/// Read a value fully into bytes
pub async fn into_bytes(value: DomainValue) -> Result<Vec<u8>> {
    match value {
        DomainValue::Stream(mut stream) => {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            Ok(buf)
        }
        other => encode_bytes(other),
    }
}

/// Split a single output value into collector items
///
/// - text that parses as a JSON array → one item per element
/// - text that parses as a JSON object → one item (the parsed object)
/// - any other text → one item (the raw string)
/// - a JSON array value → one item per element
/// - anything else → one item
pub async fn normalize_to_many(value: DomainValue) -> Result<Vec<DomainValue>> {
    let items = match value {
        DomainValue::String(text) => match parse_json_text(&text) {
            Some(Value::Array(items)) => items.into_iter().map(DomainValue::Json).collect(),
            Some(parsed) => vec![DomainValue::Json(parsed)],
            None => vec![DomainValue::String(text)],
        },
        DomainValue::Json(Value::Array(items)) => {
            items.into_iter().map(DomainValue::Json).collect()
        }
        DomainValue::Stream(mut stream) => {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            vec![DomainValue::Bytes(buf)]
        }
        other => vec![other],
    };
    Ok(items)
}

/// Convert one collector item to the collector's element type
pub fn convert_item(item: DomainValue, target: ElementKind) -> Result<DomainValue> {
    match target {
        ElementKind::String => match item {
            DomainValue::String(s) => Ok(DomainValue::String(s)),
            DomainValue::Json(Value::String(s)) => Ok(DomainValue::String(s)),
            DomainValue::Bytes(b) => utf8(b).map(DomainValue::String),
            DomainValue::Stream(_) => Err(WeftError::unsupported("stream", "string item")),
            other => render_text(&other).map(DomainValue::String),
        },
        ElementKind::Json => match item {
            DomainValue::Json(Value::Object(map)) => Ok(DomainValue::Json(Value::Object(map))),
            DomainValue::String(s) => parse_object(&s),
            DomainValue::Bytes(b) => parse_object(&utf8(b)?),
            other => Err(WeftError::unsupported(other.kind_name(), "json object item")),
        },
        ElementKind::Bytes => match item {
            DomainValue::Bytes(b) => Ok(DomainValue::Bytes(b)),
            DomainValue::Stream(_) => Err(WeftError::unsupported("stream", "bytes item")),
            other => Ok(DomainValue::Bytes(render_text(&other)?.into_bytes())),
        },
    }
}

/// Parse text as JSON only when it looks like an object or array
fn parse_json_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !looks_like_json {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn parse_object(text: &str) -> Result<DomainValue> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(DomainValue::Json(Value::Object(map))),
        Ok(other) => Err(WeftError::data_format(format!(
            "expected a JSON object, got {}",
            crate::binding::value_kind(&other)
        ))),
        Err(e) => Err(WeftError::data_format(format!("malformed JSON: {}", e))),
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| WeftError::data_format(format!("invalid UTF-8: {}", e)))
}

fn render_text(value: &DomainValue) -> Result<String> {
    match value {
        DomainValue::String(s) => Ok(s.clone()),
        DomainValue::Json(Value::String(s)) => Ok(s.clone()),
        DomainValue::Json(v) => Ok(v.to_string()),
        DomainValue::Int32(n) => Ok(n.to_string()),
        DomainValue::Bool(b) => Ok(b.to_string()),
        DomainValue::Float64(n) => Ok(n.to_string()),
        DomainValue::Bytes(_) => Err(WeftError::unsupported("bytes", "text")),
        DomainValue::Stream(_) => Err(WeftError::unsupported("stream", "text")),
    }
}

fn encode_bytes(value: DomainValue) -> Result<Vec<u8>> {
    match value {
        DomainValue::Bytes(b) => Ok(b),
        DomainValue::String(s) => Ok(s.into_bytes()),
        DomainValue::Json(Value::String(s)) => Ok(s.into_bytes()),
        DomainValue::Json(v) => Ok(serde_json::to_vec(&v)?),
        DomainValue::Int32(n) => Ok(n.to_le_bytes().to_vec()),
        DomainValue::Bool(b) => Ok(vec![u8::from(b)]),
        DomainValue::Float64(n) => Ok(n.to_le_bytes().to_vec()),
        DomainValue::Stream(_) => Err(WeftError::unsupported("stream", "bytes")),
    }
}
