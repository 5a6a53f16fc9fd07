//! Schema nodes and validation
//!
//! A [`SchemaNode`] is a closed tree describing the expected shape of the
//! configuration. It is compiled to a JSON Schema document and validated
//! with the `jsonschema` crate; the materializer walks the node tree itself
//! for defaults, cleaning and coercion.
//!
//! Two annotations ride along on a node without changing its kind:
//! - `x-json`: the environment supplies the whole subtree as one JSON string
//! - `x-split`: the environment supplies an array as one delimited string

use std::path::Path;
use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result};
use crate::value::Value;

/// JSON Schema keyword carrying the embedded-JSON annotation
pub const JSON_KEYWORD: &str = "x-json";
/// JSON Schema keyword carrying the split delimiter annotation
pub const SPLIT_KEYWORD: &str = "x-split";

/// Primitive types a scalar node can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl ScalarKind {
    /// The JSON Schema `type` name
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Number => "number",
            ScalarKind::Integer => "integer",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Null => "null",
        }
    }

    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ScalarKind::String),
            "number" => Some(ScalarKind::Number),
            "integer" => Some(ScalarKind::Integer),
            "boolean" => Some(ScalarKind::Boolean),
            "null" => Some(ScalarKind::Null),
            _ => None,
        }
    }
}

/// Declared properties of an object node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    properties: IndexMap<String, SchemaNode>,
    required: IndexSet<String>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required property
    pub fn property(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        let name = name.into();
        self.required.insert(name.clone());
        self.properties.insert(name, node);
        self
    }

    /// Add an optional property
    pub fn optional(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        let name = name.into();
        self.required.shift_remove(&name);
        self.properties.insert(name, node);
        self
    }

    /// Declared properties in declaration order
    pub fn properties(&self) -> &IndexMap<String, SchemaNode> {
        &self.properties
    }

    /// Names of required properties
    pub fn required(&self) -> &IndexSet<String> {
        &self.required
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.properties.get(name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }
}

/// The shape a schema node describes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Anything goes
    Any,
    /// A single primitive value
    Scalar(ScalarKind),
    /// A mapping with declared properties
    Object(ObjectSchema),
    /// A mapping with arbitrary keys and a uniform value schema
    Record(Box<SchemaNode>),
    /// A sequence of elements sharing one schema
    Array(Box<SchemaNode>),
    /// At least one alternative must match
    Union(Vec<SchemaNode>),
    /// Every member must match
    Intersection(Vec<SchemaNode>),
}

/// A node in the schema tree
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub(crate) kind: NodeKind,
    pub(crate) default: Option<Value>,
    pub(crate) json: bool,
    pub(crate) split: Option<String>,
    pub(crate) keywords: serde_json::Map<String, serde_json::Value>,
    validator: NodeValidator,
}

/// Validator for a single node, compiled on first use by [`SchemaNode::accepts`]
///
/// `None` once set means the node failed to compile.
#[derive(Clone, Default)]
struct NodeValidator(OnceLock<Option<Arc<jsonschema::Validator>>>);

impl NodeValidator {
    fn is_compiled(&self) -> bool {
        self.0.get().is_some()
    }
}

impl fmt::Debug for NodeValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeValidator")
            .field(&self.is_compiled())
            .finish()
    }
}

// Compiled state is a cache, not part of the node's identity
impl PartialEq for NodeValidator {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl SchemaNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            default: None,
            json: false,
            split: None,
            keywords: serde_json::Map::new(),
            validator: NodeValidator::default(),
        }
    }

    pub fn any() -> Self {
        Self::new(NodeKind::Any)
    }

    pub fn string() -> Self {
        Self::new(NodeKind::Scalar(ScalarKind::String))
    }

    pub fn number() -> Self {
        Self::new(NodeKind::Scalar(ScalarKind::Number))
    }

    pub fn integer() -> Self {
        Self::new(NodeKind::Scalar(ScalarKind::Integer))
    }

    pub fn boolean() -> Self {
        Self::new(NodeKind::Scalar(ScalarKind::Boolean))
    }

    pub fn null() -> Self {
        Self::new(NodeKind::Scalar(ScalarKind::Null))
    }

    pub fn object(object: ObjectSchema) -> Self {
        Self::new(NodeKind::Object(object))
    }

    pub fn record(values: SchemaNode) -> Self {
        Self::new(NodeKind::Record(Box::new(values)))
    }

    pub fn array(items: SchemaNode) -> Self {
        Self::new(NodeKind::Array(Box::new(items)))
    }

    pub fn union(alternatives: Vec<SchemaNode>) -> Self {
        Self::new(NodeKind::Union(alternatives))
    }

    pub fn intersection(members: Vec<SchemaNode>) -> Self {
        Self::new(NodeKind::Intersection(members))
    }

    /// Set the value used when the environment provides none
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Attach an extra JSON Schema keyword (e.g. `minimum`, `pattern`, `enum`)
    ///
    /// Keywords are only seen by the validator; they never affect how the
    /// environment is resolved.
    pub fn with_keyword(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.keywords.insert(name.into(), value);
        self.validator = NodeValidator::default();
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Whether the node is marked as embedded JSON
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// The split delimiter, if the node is marked for splitting
    pub fn split_delimiter(&self) -> Option<&str> {
        self.split.as_deref()
    }

    pub fn keywords(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.keywords
    }

    /// Objects and records
    pub fn is_object_like(&self) -> bool {
        matches!(self.kind, NodeKind::Object(_) | NodeKind::Record(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, NodeKind::Array(_))
    }

    /// Render this node as a JSON Schema document
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        match &self.kind {
            NodeKind::Any => {}
            NodeKind::Scalar(scalar) => {
                out.insert("type".into(), scalar.type_name().into());
            }
            NodeKind::Object(object) => {
                out.insert("type".into(), "object".into());
                let properties: serde_json::Map<String, serde_json::Value> = object
                    .properties
                    .iter()
                    .map(|(name, node)| (name.clone(), node.to_json_schema()))
                    .collect();
                out.insert("properties".into(), properties.into());
                if !object.required.is_empty() {
                    let required: Vec<serde_json::Value> =
                        object.required.iter().map(|n| n.as_str().into()).collect();
                    out.insert("required".into(), required.into());
                }
            }
            NodeKind::Record(values) => {
                out.insert("type".into(), "object".into());
                out.insert("additionalProperties".into(), values.to_json_schema());
            }
            NodeKind::Array(items) => {
                out.insert("type".into(), "array".into());
                out.insert("items".into(), items.to_json_schema());
            }
            NodeKind::Union(alternatives) => {
                let any_of: Vec<serde_json::Value> =
                    alternatives.iter().map(SchemaNode::to_json_schema).collect();
                out.insert("anyOf".into(), any_of.into());
            }
            NodeKind::Intersection(members) => {
                let all_of: Vec<serde_json::Value> =
                    members.iter().map(SchemaNode::to_json_schema).collect();
                out.insert("allOf".into(), all_of.into());
            }
        }

        if let Some(default) = &self.default {
            out.insert("default".into(), default.to_json());
        }
        if self.json {
            out.insert(JSON_KEYWORD.into(), true.into());
        }
        if let Some(delimiter) = &self.split {
            out.insert(SPLIT_KEYWORD.into(), delimiter.as_str().into());
        }
        for (name, value) in &self.keywords {
            out.entry(name.clone()).or_insert_with(|| value.clone());
        }

        serde_json::Value::Object(out)
    }

    /// Build a node tree from a JSON Schema document
    ///
    /// Understands `type` (including scalar type lists), `properties`,
    /// `required`, `additionalProperties`, `items`, `anyOf`, `oneOf`, `allOf`,
    /// `default` and the `x-json`/`x-split` annotations. Any other keyword
    /// is kept and handed to the validator untouched.
    pub fn from_json_schema(schema: &serde_json::Value) -> Result<Self> {
        parse_node(schema, &mut Vec::new())
    }

    /// Check a value against this node alone
    ///
    /// The node's validator is compiled on the first call and reused after.
    pub fn accepts(&self, value: &Value) -> bool {
        let validator = self.validator.0.get_or_init(|| {
            match jsonschema::validator_for(&self.to_json_schema()) {
                Ok(validator) => Some(Arc::new(validator)),
                Err(e) => {
                    log::debug!("Schema node failed to compile: {}", e);
                    None
                }
            }
        });
        validator
            .as_ref()
            .is_some_and(|validator| validator.is_valid(&value.to_json()))
    }
}

fn parse_node(schema: &serde_json::Value, path: &mut Vec<String>) -> Result<SchemaNode> {
    let mut keywords = schema
        .as_object()
        .cloned()
        .ok_or_else(|| parse_error("Schema node must be an object", path))?;

    let kind = parse_kind(&mut keywords, path)?;
    let default = keywords.remove("default").map(Value::from_json);

    let json = match keywords.remove(JSON_KEYWORD) {
        None => false,
        Some(serde_json::Value::Bool(b)) => b,
        Some(other) => {
            return Err(parse_error(
                format!("'{}' must be a boolean, got {}", JSON_KEYWORD, other),
                path,
            ))
        }
    };

    let split = match keywords.remove(SPLIT_KEYWORD) {
        None => None,
        Some(serde_json::Value::String(delimiter)) => Some(delimiter),
        Some(other) => {
            return Err(parse_error(
                format!("'{}' must be a string, got {}", SPLIT_KEYWORD, other),
                path,
            ))
        }
    };
    if split.is_some() && !matches!(kind, NodeKind::Array(_)) {
        return Err(Error::usage(format!(
            "'{}' is only valid on array schemas",
            SPLIT_KEYWORD
        ))
        .with_path(path.join(".")));
    }

    Ok(SchemaNode {
        kind,
        default,
        json,
        split,
        keywords,
        validator: NodeValidator::default(),
    })
}

fn parse_kind(
    keywords: &mut serde_json::Map<String, serde_json::Value>,
    path: &mut Vec<String>,
) -> Result<NodeKind> {
    if let Some(any_of) = keywords.remove("anyOf") {
        return parse_list(&any_of, "anyOf", path).map(NodeKind::Union);
    }
    // oneOf stays in the keywords so validation still demands exactly one match
    if let Some(one_of) = keywords.get("oneOf").cloned() {
        return parse_list(&one_of, "oneOf", path).map(NodeKind::Union);
    }
    if let Some(all_of) = keywords.remove("allOf") {
        return parse_list(&all_of, "allOf", path).map(NodeKind::Intersection);
    }

    match keywords.remove("type") {
        Some(serde_json::Value::String(name)) => parse_typed(&name, keywords, path),
        Some(serde_json::Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .and_then(ScalarKind::from_type_name)
                    .map(|scalar| SchemaNode::new(NodeKind::Scalar(scalar)))
                    .ok_or_else(|| {
                        parse_error(
                            format!("Type lists may only contain scalar types, got {}", name),
                            path,
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map(NodeKind::Union),
        Some(other) => Err(parse_error(format!("Invalid 'type': {}", other), path)),
        None if keywords.contains_key("properties") => parse_typed("object", keywords, path),
        None if keywords.contains_key("items") => parse_typed("array", keywords, path),
        None => Ok(NodeKind::Any),
    }
}

fn parse_typed(
    name: &str,
    keywords: &mut serde_json::Map<String, serde_json::Value>,
    path: &mut Vec<String>,
) -> Result<NodeKind> {
    if let Some(scalar) = ScalarKind::from_type_name(name) {
        return Ok(NodeKind::Scalar(scalar));
    }

    match name {
        "object" => {
            let Some(properties) = keywords.remove("properties") else {
                return match keywords.remove("additionalProperties") {
                    Some(values @ serde_json::Value::Object(_)) => {
                        path.push("*".into());
                        let node = parse_node(&values, path);
                        path.pop();
                        Ok(NodeKind::Record(Box::new(node?)))
                    }
                    Some(serde_json::Value::Bool(false)) => {
                        keywords.insert("additionalProperties".into(), false.into());
                        Ok(NodeKind::Object(ObjectSchema::new()))
                    }
                    Some(serde_json::Value::Bool(true)) | None => {
                        Ok(NodeKind::Record(Box::new(SchemaNode::any())))
                    }
                    Some(other) => Err(parse_error(
                        format!("Invalid 'additionalProperties': {}", other),
                        path,
                    )),
                };
            };

            let properties = properties
                .as_object()
                .ok_or_else(|| parse_error("'properties' must be an object", path))?;
            let mut object = ObjectSchema::new();
            for (prop_name, prop_schema) in properties {
                path.push(prop_name.clone());
                let node = parse_node(prop_schema, path);
                path.pop();
                object.properties.insert(prop_name.clone(), node?);
            }

            if let Some(required) = keywords.remove("required") {
                let names = required
                    .as_array()
                    .ok_or_else(|| parse_error("'required' must be an array", path))?;
                for name in names {
                    let name = name
                        .as_str()
                        .ok_or_else(|| parse_error("'required' entries must be strings", path))?;
                    object.required.insert(name.to_string());
                }
            }

            Ok(NodeKind::Object(object))
        }
        "array" => {
            let items = match keywords.remove("items") {
                Some(items) => {
                    path.push("*".into());
                    let node = parse_node(&items, path);
                    path.pop();
                    node?
                }
                None => SchemaNode::any(),
            };
            Ok(NodeKind::Array(Box::new(items)))
        }
        other => Err(parse_error(format!("Unsupported type '{}'", other), path)),
    }
}

fn parse_list(
    list: &serde_json::Value,
    keyword: &str,
    path: &mut Vec<String>,
) -> Result<Vec<SchemaNode>> {
    let items = list
        .as_array()
        .ok_or_else(|| parse_error(format!("'{}' must be an array", keyword), path))?;
    items.iter().map(|item| parse_node(item, path)).collect()
}

fn parse_error(message: impl Into<String>, path: &[String]) -> Error {
    let err = Error::parse(message);
    if path.is_empty() {
        err
    } else {
        err.with_path(path.join("."))
    }
}

/// A schema compiled for validation
#[derive(Debug, Clone)]
pub struct Schema {
    /// The node tree driving resolution and materialization
    node: SchemaNode,
    /// The JSON Schema rendering of `node`
    schema: serde_json::Value,
    /// Compiled JSON Schema validator (wrapped in Arc for Clone)
    compiled: Arc<jsonschema::Validator>,
}

impl Schema {
    /// Compile a node tree
    pub fn new(node: SchemaNode) -> Result<Self> {
        let schema = node.to_json_schema();
        let compiled = jsonschema::validator_for(&schema)
            .map_err(|e| Error::parse(format!("Invalid JSON Schema: {}", e)))?;
        Ok(Self {
            node,
            schema,
            compiled: Arc::new(compiled),
        })
    }

    /// Load a schema from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::parse(format!("Invalid JSON schema: {}", e)))?;
        Self::new(SchemaNode::from_json_schema(&schema)?)
    }

    /// Load a schema from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let schema: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::parse(format!("Invalid YAML schema: {}", e)))?;
        Self::new(SchemaNode::from_json_schema(&schema)?)
    }

    /// Load a schema from a file (JSON or YAML based on extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), e.to_string()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_yaml(&content), // Default to YAML
        }
    }

    /// The root schema node
    pub fn node(&self) -> &SchemaNode {
        &self.node
    }

    /// Get the JSON Schema document
    pub fn as_value(&self) -> &serde_json::Value {
        &self.schema
    }

    /// Validate a Value against this schema
    ///
    /// Returns Ok(()) if valid, or an error with details about the first validation failure.
    pub fn validate(&self, value: &Value) -> Result<()> {
        let json_value = value.to_json();

        let mut errors = self.compiled.iter_errors(&json_value);
        if let Some(error) = errors.next() {
            let path = pointer_to_path(&error.instance_path.to_string());
            return Err(Error::validation(path, error.to_string()));
        }
        Ok(())
    }

    /// Validate and collect all errors (instead of failing on first)
    pub fn validate_collect(&self, value: &Value) -> Vec<ValidationError> {
        let json_value = value.to_json();

        self.compiled
            .iter_errors(&json_value)
            .map(|e| ValidationError::new(pointer_to_path(&e.instance_path.to_string()), e.to_string()))
            .collect()
    }
}

impl TryFrom<SchemaNode> for Schema {
    type Error = Error;

    fn try_from(node: SchemaNode) -> Result<Self> {
        Schema::new(node)
    }
}

/// A single validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    /// Dotted path to the invalid value (e.g., "database.port"), `<root>` for the root
    pub path: String,
    /// Error message
    pub message: String,
}

impl ValidationError {
    fn new(path: String, message: String) -> Self {
        let path = if path.is_empty() {
            "<root>".to_string()
        } else {
            path
        };
        Self { path, message }
    }
}

/// Turn a JSON pointer ("/DEEP/BAR") into a dotted path ("DEEP.BAR")
fn pointer_to_path(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}
