//! Candidate and result value types
//!
//! Values are scalars (string, int, float, bool, null), sequences (arrays)
//! or mappings (objects). The path resolver builds a candidate `Value` from
//! the environment and the materializer turns it into the final result.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Property names the deep-set utility refuses to traverse into or write.
pub const RESERVED_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// A configuration value, either under construction or fully materialized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value (every raw environment value starts out as one)
    String(String),
    /// Sequence of values
    Sequence(Vec<Value>),
    /// Mapping of string keys to values
    Mapping(IndexMap<String, Value>),
}

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if this value is an integer
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    /// Check if this value is a float
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// Check if this value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if this value is a sequence
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    /// Check if this value is a mapping
    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Mapping(_))
    }

    /// Get as boolean if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float or Integer
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as str if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as slice if this is a Sequence
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Get as mapping if this is a Mapping
    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Get a value by path (e.g., "database.host", "servers.0" or "servers[0]")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.get_segments(&split_path(path))
    }

    /// Get a value by pre-split path segments
    pub fn get_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let mut current = self;
        for segment in segments {
            let segment = segment.as_ref();
            current = match current {
                Value::Mapping(map) => map.get(segment)?,
                Value::Sequence(seq) => seq.get(index_of(segment)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at a `.`-joined path, creating intermediate containers
    ///
    /// Returns `false` when the path contains a reserved segment, in which
    /// case nothing is written.
    pub fn set_path(&mut self, path: &str, value: Value) -> bool {
        self.set_segments(&split_path(path), value)
    }

    /// Write `value` at the location addressed by `segments`
    ///
    /// Intermediate rules:
    /// - an existing mapping is reused
    /// - an existing sequence is reused only if the next segment is numeric
    /// - anything else is replaced by a sequence (numeric next segment) or
    ///   a mapping
    ///
    /// Numeric segments inside a sequence pad it with nulls up to the index.
    /// The final segment is always overwritten. An empty path replaces `self`.
    pub fn set_segments<S: AsRef<str>>(&mut self, segments: &[S], value: Value) -> bool {
        if let Some(reserved) = segments
            .iter()
            .map(AsRef::as_ref)
            .find(|s| RESERVED_SEGMENTS.contains(s))
        {
            log::warn!("Refusing to write through reserved property name '{}'", reserved);
            return false;
        }

        let Some((last, parents)) = segments.split_last() else {
            *self = value;
            return true;
        };

        let mut current = self;
        for (i, segment) in parents.iter().enumerate() {
            let next_is_index = index_of(segments[i + 1].as_ref()).is_some();
            current = current.child_container(segment.as_ref(), next_is_index);
        }
        *current.slot(last.as_ref()) = value;
        true
    }

    /// Returns the child slot for `key`, turning `self` into a container first
    fn slot(&mut self, key: &str) -> &mut Value {
        let index = match self {
            Value::Sequence(_) => index_of(key),
            _ => None,
        };
        if index.is_none() && !self.is_mapping() {
            *self = Value::Mapping(IndexMap::new());
        }

        match (self, index) {
            (Value::Sequence(seq), Some(idx)) => {
                if seq.len() <= idx {
                    seq.resize(idx + 1, Value::Null);
                }
                &mut seq[idx]
            }
            (Value::Mapping(map), _) => map.entry(key.to_string()).or_insert(Value::Null),
            (other, _) => other,
        }
    }

    /// Returns the child slot for `key`, ensuring it holds a suitable container
    fn child_container(&mut self, key: &str, next_is_index: bool) -> &mut Value {
        let slot = self.slot(key);
        let reusable = match &*slot {
            Value::Mapping(_) => true,
            Value::Sequence(_) => next_is_index,
            _ => false,
        };
        if !reusable {
            *slot = if next_is_index {
                Value::Sequence(Vec::new())
            } else {
                Value::Mapping(IndexMap::new())
            };
        }
        slot
    }

    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Merge another value into this one
    ///
    /// Merge semantics:
    /// - Mappings: Deep merge recursively
    /// - Anything else: `other` wins (last-writer-wins)
    pub fn merge(&mut self, other: Value) {
        match (self, other) {
            (Value::Mapping(base), Value::Mapping(overlay)) => {
                for (key, overlay_value) in overlay {
                    match base.get_mut(&key) {
                        Some(base_value) => base_value.merge(overlay_value),
                        None => {
                            base.insert(key, overlay_value);
                        }
                    }
                }
            }
            (this, other) => {
                *this = other;
            }
        }
    }

    /// Convert to a `serde_json::Value`
    ///
    /// Non-finite floats have no JSON representation and become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Sequence(seq) => serde_json::Value::Array(seq.iter().map(Value::to_json).collect()),
            Value::Mapping(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from a `serde_json::Value`
    ///
    /// Integers outside the i64 range are kept as floats.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(obj) => Value::Mapping(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Sequence(seq) => {
                write!(f, "[")?;
                for (i, v) in seq.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Convenient From implementations
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Mapping(m)
    }
}

/// Split a path into segments
/// Supports: "key", "key.subkey", "key.0", "key[0]", "key[0].subkey"
pub fn split_path(path: &str) -> Vec<String> {
    path.split(['.', '[', ']'])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a segment as a sequence index if it is all ASCII digits
fn index_of(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
