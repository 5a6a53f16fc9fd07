//! Path resolver
//!
//! Walks the schema tree depth first and, for every node the environment can
//! address, copies the matching raw string into a candidate tree. Every
//! schema path is visited exactly once, whether or not the environment
//! defines it.
//!
//! A node's environment key is its path joined with the separator (`_` by
//! default), its candidate address is the same path joined with `.`. Both
//! come from one segment list so they never drift apart.
//!
//! When several union alternatives or intersection members write the same
//! address, the last one in declaration order wins.

use std::collections::{BTreeMap, HashMap};

use crate::annotate::{parse_embedded_json, split_value};
use crate::parse::ParseOptions;
use crate::schema::{NodeKind, SchemaNode};
use crate::value::Value;

/// Build the candidate value for `node` from a raw environment map
///
/// The candidate starts as a copy of the (prefix-filtered) environment at
/// the root; unknown keys are left for the materializer to clean away.
pub fn resolve(node: &SchemaNode, env: &HashMap<String, String>, options: &ParseOptions) -> Value {
    let working = working_env(env, options);
    let candidate = Value::Mapping(
        working
            .iter()
            .map(|(key, raw)| (key.clone(), Value::String(raw.clone())))
            .collect(),
    );

    let mut resolver = PathResolver {
        env: &working,
        options,
        candidate,
    };
    resolver.visit(node, &mut Vec::new());
    resolver.candidate
}

/// Copy of the environment restricted to the configured prefix, prefix stripped
fn working_env(env: &HashMap<String, String>, options: &ParseOptions) -> BTreeMap<String, String> {
    let prefix = options.prefix.as_deref().unwrap_or("");
    env.iter()
        .filter_map(|(key, raw)| {
            key.strip_prefix(prefix)
                .map(|stripped| (stripped.to_string(), raw.clone()))
        })
        .collect()
}

struct PathResolver<'a> {
    env: &'a BTreeMap<String, String>,
    options: &'a ParseOptions,
    candidate: Value,
}

impl<'a> PathResolver<'a> {
    fn visit(&mut self, node: &SchemaNode, path: &mut Vec<String>) {
        if node.is_json() {
            if let Some(raw) = self.raw(path) {
                let value = parse_embedded_json(node, raw, self.options.json_fallback);
                self.write(path, value);
            }
            return;
        }

        if let Some(delimiter) = node.split_delimiter() {
            if let Some(raw) = self.raw(path) {
                let value = split_value(Value::String(raw.to_string()), delimiter);
                self.write(path, value);
            }
            return;
        }

        match node.kind() {
            NodeKind::Object(object) => {
                for (name, property) in object.properties() {
                    path.push(name.clone());
                    self.visit(property, path);
                    path.pop();
                }
            }
            NodeKind::Union(nodes) | NodeKind::Intersection(nodes) => {
                for inner in nodes {
                    self.visit(inner, path);
                }
            }
            NodeKind::Any | NodeKind::Scalar(_) | NodeKind::Record(_) | NodeKind::Array(_) => {
                if let Some(raw) = self.raw(path) {
                    let value = Value::String(raw.to_string());
                    self.write(path, value);
                }
            }
        }
    }

    fn raw(&self, path: &[String]) -> Option<&'a str> {
        let env: &'a BTreeMap<String, String> = self.env;
        env.get(&path.join(self.options.separator.as_str()))
            .map(String::as_str)
    }

    fn write(&mut self, path: &[String], value: Value) {
        log::trace!(
            "{} -> {}",
            path.join(self.options.separator.as_str()),
            path.join(".")
        );
        self.candidate.set_segments(path, value);
    }
}

/// Flatten a materialized value back into environment variables
///
/// This is the inverse of [`resolve`]: embedded-JSON nodes are serialised,
/// split arrays are joined with their delimiter and scalars are rendered as
/// strings. Keys carry the configured prefix, so the result can be fed back
/// into the parser.
pub fn flatten(node: &SchemaNode, value: &Value, options: &ParseOptions) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_node(node, value, &mut Vec::new(), options, &mut out);
    out
}

fn flatten_node(
    node: &SchemaNode,
    value: &Value,
    path: &mut Vec<String>,
    options: &ParseOptions,
    out: &mut BTreeMap<String, String>,
) {
    let key = format!(
        "{}{}",
        options.prefix.as_deref().unwrap_or(""),
        path.join(options.separator.as_str())
    );

    if node.is_json() {
        out.insert(key, value.to_json().to_string());
        return;
    }

    if let Some(delimiter) = node.split_delimiter() {
        let raw = match value {
            Value::Sequence(items) => items
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(delimiter),
            other => other.to_string(),
        };
        out.insert(key, raw);
        return;
    }

    match node.kind() {
        NodeKind::Object(object) => {
            let Value::Mapping(map) = value else {
                return;
            };
            for (name, property) in object.properties() {
                if let Some(child) = map.get(name) {
                    path.push(name.clone());
                    flatten_node(property, child, path, options, out);
                    path.pop();
                }
            }
        }
        NodeKind::Union(alternatives) => {
            let matching: Vec<&SchemaNode> = alternatives
                .iter()
                .filter(|alternative| alternative.accepts(value))
                .collect();
            let chosen = if matching.is_empty() {
                alternatives.iter().collect()
            } else {
                matching
            };
            for alternative in chosen {
                flatten_node(alternative, value, path, options, out);
            }
        }
        NodeKind::Intersection(members) => {
            for member in members {
                flatten_node(member, value, path, options, out);
            }
        }
        NodeKind::Any | NodeKind::Scalar(_) | NodeKind::Record(_) | NodeKind::Array(_) => {
            let raw = match value {
                Value::Sequence(_) | Value::Mapping(_) => value.to_json().to_string(),
                scalar => scalar.to_string(),
            };
            out.insert(key, raw);
        }
    }
}
