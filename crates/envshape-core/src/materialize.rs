//! Materializer
//!
//! Turns a resolved candidate into the final value in four passes:
//! default-fill, clean, convert and assert. The first three are total; only
//! the assert pass can fail, and when it does no partial value is returned.

use indexmap::{IndexMap, IndexSet};

use crate::annotate::split_value;
use crate::error::Result;
use crate::schema::{NodeKind, ObjectSchema, ScalarKind, Schema, SchemaNode};
use crate::value::Value;

/// Run all four passes over `candidate`
pub fn materialize(schema: &Schema, candidate: Value) -> Result<Value> {
    let node = schema.node();

    let value = default_fill(node, Some(candidate)).unwrap_or_default();
    let value = clean(node, value);
    let value = convert(node, value);

    if let Err(e) = assert_valid(schema, &value) {
        log::debug!("Materialized value rejected: {}", e);
        return Err(e);
    }
    Ok(value)
}

/// Inject schema defaults wherever the value is absent
///
/// An absent object is only created through its own default; the defaults
/// of its properties apply once it exists. Union alternatives are tried in
/// order and the first that accepts its defaulted, converted value wins.
pub fn default_fill(node: &SchemaNode, value: Option<Value>) -> Option<Value> {
    let value = value.or_else(|| node.default_value().cloned());

    match node.kind() {
        NodeKind::Object(object) => match value {
            Some(Value::Mapping(map)) => Some(Value::Mapping(fill_properties(object, map))),
            other => other,
        },
        NodeKind::Record(values) => match value {
            Some(Value::Mapping(map)) => Some(Value::Mapping(
                map.into_iter()
                    .map(|(key, v)| (key, fill_present(values, v)))
                    .collect(),
            )),
            other => other,
        },
        NodeKind::Array(items) => match value {
            Some(Value::Sequence(seq)) => Some(Value::Sequence(
                seq.into_iter().map(|v| fill_present(items, v)).collect(),
            )),
            other => other,
        },
        NodeKind::Union(alternatives) => {
            for alternative in alternatives {
                if let Some(filled) = default_fill(alternative, value.clone()) {
                    if alternative.accepts(&convert(alternative, filled.clone())) {
                        return Some(filled);
                    }
                }
            }
            value
        }
        NodeKind::Intersection(members) => members
            .iter()
            .fold(value, |acc, member| default_fill(member, acc)),
        NodeKind::Any | NodeKind::Scalar(_) => value,
    }
}

fn fill_present(node: &SchemaNode, value: Value) -> Value {
    // A present value is never dropped by default_fill
    default_fill(node, Some(value)).unwrap_or_default()
}

fn fill_properties(object: &ObjectSchema, mut map: IndexMap<String, Value>) -> IndexMap<String, Value> {
    for (name, property) in object.properties() {
        match map.get_mut(name) {
            Some(slot) => {
                let current = std::mem::take(slot);
                *slot = fill_present(property, current);
            }
            None => {
                if let Some(filled) = default_fill(property, None) {
                    map.insert(name.clone(), filled);
                }
            }
        }
    }
    map
}

/// Drop every value the schema does not declare
///
/// Object properties come out in declaration order. A union is cleaned with
/// the first alternative that accepts the converted value; when none does,
/// only keys declared by some alternative are kept.
pub fn clean(node: &SchemaNode, value: Value) -> Value {
    match node.kind() {
        NodeKind::Object(object) => match value {
            Value::Mapping(map) => Value::Mapping(clean_properties(object, map)),
            other => other,
        },
        NodeKind::Record(values) => match value {
            Value::Mapping(map) => Value::Mapping(
                map.into_iter()
                    .map(|(key, v)| (key, clean(values, v)))
                    .collect(),
            ),
            other => other,
        },
        NodeKind::Array(items) => match value {
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(|v| clean(items, v)).collect())
            }
            other => other,
        },
        NodeKind::Union(alternatives) => {
            let chosen = alternatives
                .iter()
                .find(|alternative| alternative.accepts(&convert(alternative, value.clone())));
            match (chosen, value) {
                (Some(alternative), value) => clean(alternative, value),
                (None, Value::Mapping(mut map)) => match declared_keys(node) {
                    Some(keys) => {
                        map.retain(|key, _| keys.contains(key));
                        Value::Mapping(map)
                    }
                    None => Value::Mapping(map),
                },
                (None, other) => other,
            }
        }
        NodeKind::Intersection(members) => {
            if !value.is_mapping() {
                return members.iter().fold(value, |acc, member| clean(member, acc));
            }
            let mut merged = Value::Mapping(IndexMap::new());
            for member in members {
                merged.merge(clean(member, value.clone()));
            }
            merged
        }
        NodeKind::Any | NodeKind::Scalar(_) => value,
    }
}

fn clean_properties(object: &ObjectSchema, mut map: IndexMap<String, Value>) -> IndexMap<String, Value> {
    let mut cleaned = IndexMap::with_capacity(object.properties().len());
    for (name, property) in object.properties() {
        if let Some(value) = map.swap_remove(name) {
            cleaned.insert(name.clone(), clean(property, value));
        }
    }
    if !map.is_empty() {
        log::trace!("Dropping undeclared keys: {:?}", map.keys().collect::<Vec<_>>());
    }
    cleaned
}

/// Property names `node` declares, `None` when it allows any key
fn declared_keys(node: &SchemaNode) -> Option<IndexSet<String>> {
    match node.kind() {
        NodeKind::Object(object) => Some(object.properties().keys().cloned().collect()),
        NodeKind::Union(nodes) | NodeKind::Intersection(nodes) => {
            nodes.iter().try_fold(IndexSet::new(), |mut keys, inner| {
                keys.extend(declared_keys(inner)?);
                Some(keys)
            })
        }
        NodeKind::Record(_) | NodeKind::Any => None,
        NodeKind::Scalar(_) | NodeKind::Array(_) => Some(IndexSet::new()),
    }
}

/// Coerce values towards the declared scalar types
///
/// Conversions are lossless where possible; anything that cannot be
/// converted is passed through for the assert pass to reject. Split arrays
/// are split again here, which covers split arrays nested inside embedded
/// JSON.
pub fn convert(node: &SchemaNode, value: Value) -> Value {
    match node.kind() {
        NodeKind::Scalar(scalar) => convert_scalar(*scalar, value),
        NodeKind::Object(object) => match value {
            Value::Mapping(mut map) => {
                for (name, property) in object.properties() {
                    if let Some(slot) = map.get_mut(name) {
                        let current = std::mem::take(slot);
                        *slot = convert(property, current);
                    }
                }
                Value::Mapping(map)
            }
            other => other,
        },
        NodeKind::Record(values) => match value {
            Value::Mapping(map) => Value::Mapping(
                map.into_iter()
                    .map(|(key, v)| (key, convert(values, v)))
                    .collect(),
            ),
            other => other,
        },
        NodeKind::Array(items) => {
            let value = match node.split_delimiter() {
                Some(delimiter) => split_value(value, delimiter),
                None => value,
            };
            match value {
                Value::Sequence(seq) => {
                    Value::Sequence(seq.into_iter().map(|v| convert(items, v)).collect())
                }
                other => other,
            }
        }
        NodeKind::Union(alternatives) => {
            for alternative in alternatives {
                let converted = convert(alternative, value.clone());
                if alternative.accepts(&converted) {
                    return converted;
                }
            }
            value
        }
        NodeKind::Intersection(members) => members
            .iter()
            .fold(value, |acc, member| convert(member, acc)),
        NodeKind::Any => value,
    }
}

fn convert_scalar(kind: ScalarKind, value: Value) -> Value {
    match (kind, value) {
        (ScalarKind::String, Value::Integer(i)) => Value::String(i.to_string()),
        (ScalarKind::String, Value::Float(f)) => Value::String(f.to_string()),
        (ScalarKind::String, Value::Bool(b)) => Value::String(b.to_string()),

        (ScalarKind::Number, Value::String(s)) => parse_number(&s).unwrap_or(Value::String(s)),
        (ScalarKind::Number, Value::Bool(b)) => Value::Integer(i64::from(b)),

        (ScalarKind::Integer, Value::String(s)) => match parse_number(&s) {
            Some(Value::Float(f)) => float_to_integer(f).unwrap_or(Value::String(s)),
            Some(integer) => integer,
            None => Value::String(s),
        },
        (ScalarKind::Integer, Value::Float(f)) => {
            float_to_integer(f).unwrap_or(Value::Float(f))
        }
        (ScalarKind::Integer, Value::Bool(b)) => Value::Integer(i64::from(b)),

        (ScalarKind::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::String(s),
        },
        (ScalarKind::Boolean, Value::Integer(1)) => Value::Bool(true),
        (ScalarKind::Boolean, Value::Integer(0)) => Value::Bool(false),

        (ScalarKind::Null, Value::String(s)) if s == "null" => Value::Null,

        (_, other) => other,
    }
}

/// Integer when the text is integral, float otherwise
fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

fn float_to_integer(f: f64) -> Option<Value> {
    // i64::MAX as f64 rounds up to 2^63, which does not fit
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::Integer(f as i64))
    } else {
        None
    }
}

/// Validate the converted value against the full schema
pub fn assert_valid(schema: &Schema, value: &Value) -> Result<()> {
    schema.validate(value)
}
