//! Schema annotators
//!
//! `as_json` and `split_array` decorate schema nodes with metadata telling
//! the resolver how to read a raw environment string. The decorated node
//! validates exactly like the undecorated one.

use crate::error::{Error, Result};
use crate::schema::SchemaNode;
use crate::value::Value;

/// Delimiter used by [`split_array`] when none is given
pub const DEFAULT_DELIMITER: &str = ",";

/// Options for [`split_array`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    pub delimiter: String,
}

impl SplitOptions {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

/// What to do when an embedded-JSON value does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFallback {
    /// Use `{}` for objects and records, `[]` for arrays, null otherwise
    #[default]
    Empty,
    /// Keep the raw string, so validation rejects it
    Strict,
}

/// Mark a node as embedded JSON
///
/// The environment supplies the node's entire value as a single JSON
/// string under the node's own key; nested keys are not consulted.
///
/// ```rust
/// use envshape_core::{as_json, ObjectSchema, SchemaNode};
///
/// let node = as_json(SchemaNode::object(
///     ObjectSchema::new().property("foo", SchemaNode::string()),
/// ));
/// assert!(node.is_json());
/// ```
pub fn as_json(mut node: SchemaNode) -> SchemaNode {
    node.json = true;
    node
}

/// Build an array of `items` read from a single delimited string
///
/// ```rust
/// use envshape_core::{split_array, SchemaNode, SplitOptions};
///
/// let hosts = split_array(SchemaNode::string(), SplitOptions::default());
/// assert_eq!(hosts.split_delimiter(), Some(","));
/// ```
pub fn split_array(items: SchemaNode, options: SplitOptions) -> SchemaNode {
    let mut node = SchemaNode::array(items);
    node.split = Some(options.delimiter);
    node
}

impl SchemaNode {
    /// Mark this node as embedded JSON (see [`as_json`])
    pub fn json(self) -> Self {
        as_json(self)
    }

    /// Mark an existing array node for delimiter splitting
    ///
    /// Fails with a usage error on anything but an array node.
    pub fn split(mut self, delimiter: impl Into<String>) -> Result<Self> {
        if !self.is_array() {
            return Err(Error::usage(format!(
                "Cannot split a non-array schema ({})",
                self.to_json_schema()
            )));
        }
        self.split = Some(delimiter.into());
        Ok(self)
    }
}

/// Split a string value on `delimiter`
///
/// Sequences and every other non-string value pass through unchanged. An
/// empty delimiter splits into single characters.
pub fn split_value(value: Value, delimiter: &str) -> Value {
    match value {
        Value::String(s) if delimiter.is_empty() => {
            Value::Sequence(s.chars().map(|c| Value::String(c.to_string())).collect())
        }
        Value::String(s) => Value::Sequence(
            s.split(delimiter)
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        other => other,
    }
}

/// Decode the raw string of an embedded-JSON node
pub fn parse_embedded_json(node: &SchemaNode, raw: &str, fallback: JsonFallback) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(json),
        Err(e) => {
            log::debug!("Embedded JSON did not parse ({}), fallback {:?}", e, fallback);
            match fallback {
                JsonFallback::Strict => Value::String(raw.to_string()),
                JsonFallback::Empty if node.is_object_like() => Value::Mapping(Default::default()),
                JsonFallback::Empty if node.is_array() => Value::Sequence(Vec::new()),
                JsonFallback::Empty => Value::Null,
            }
        }
    }
}
