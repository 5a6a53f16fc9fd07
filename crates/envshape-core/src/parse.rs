//! Environment parsing pipeline
//!
//! `parse_env` resolves the environment against the schema and materializes
//! the candidate. Inputs are only borrowed; each call builds its own
//! working copy, so concurrent calls never share state.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::annotate::JsonFallback;
use crate::error::{Error, Result};
use crate::materialize::materialize;
use crate::resolver::resolve;
use crate::schema::Schema;
use crate::value::Value;

/// Separator joining path segments into environment keys
pub const DEFAULT_SEPARATOR: &str = "_";

/// Options controlling how environment keys are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Only keys starting with this prefix are read; the prefix is stripped
    pub prefix: Option<String>,
    /// Joins path segments into environment keys (default `_`)
    pub separator: String,
    /// What to do with embedded JSON that does not parse
    pub json_fallback: JsonFallback,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            separator: DEFAULT_SEPARATOR.to_string(),
            json_fallback: JsonFallback::default(),
        }
    }
}

impl ParseOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_json_fallback(mut self, fallback: JsonFallback) -> Self {
        self.json_fallback = fallback;
        self
    }
}

/// Parse an environment map against a schema with default options
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use envshape_core::{parse_env, ObjectSchema, Schema, SchemaNode, Value};
///
/// let schema = Schema::new(SchemaNode::object(
///     ObjectSchema::new().property(
///         "DB",
///         SchemaNode::object(ObjectSchema::new().property("PORT", SchemaNode::integer())),
///     ),
/// ))
/// .unwrap();
///
/// let env = HashMap::from([("DB_PORT".to_string(), "5432".to_string())]);
/// let config = parse_env(&schema, &env).unwrap();
/// assert_eq!(config.get_path("DB.PORT"), Some(&Value::Integer(5432)));
/// ```
pub fn parse_env(schema: &Schema, env: &HashMap<String, String>) -> Result<Value> {
    parse_env_with_options(schema, env, &ParseOptions::default())
}

/// Parse an environment map against a schema
pub fn parse_env_with_options(
    schema: &Schema,
    env: &HashMap<String, String>,
    options: &ParseOptions,
) -> Result<Value> {
    log::debug!(
        "Parsing {} environment entries (prefix: {:?})",
        env.len(),
        options.prefix
    );
    let candidate = resolve(schema.node(), env, options);
    materialize(schema, candidate)
}

/// Parse an environment map and deserialize the result into `T`
pub fn parse_env_as<T: DeserializeOwned>(
    schema: &Schema,
    env: &HashMap<String, String>,
    options: &ParseOptions,
) -> Result<T> {
    let value = parse_env_with_options(schema, env, options)?;
    serde_json::from_value(value.to_json()).map_err(|e| Error::deserialize(e.to_string()))
}

/// Parse a snapshot of the current process environment
///
/// Variables that are not valid unicode are skipped.
pub fn parse_process_env(schema: &Schema, options: &ParseOptions) -> Result<Value> {
    let env: HashMap<String, String> = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect();
    parse_env_with_options(schema, &env, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{as_json, split_array, SplitOptions};
    use crate::error::ErrorKind;
    use crate::resolver::flatten;
    use crate::schema::{ObjectSchema, SchemaNode};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn mapping(entries: Vec<(&str, Value)>) -> Value {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn object(props: Vec<(&str, SchemaNode)>) -> SchemaNode {
        let mut object = ObjectSchema::new();
        for (name, node) in props {
            object = object.property(name, node);
        }
        SchemaNode::object(object)
    }

    fn foo_bar() -> SchemaNode {
        object(vec![
            ("foo", SchemaNode::string()),
            ("bar", SchemaNode::string()),
        ])
    }

    fn full_schema() -> Schema {
        Schema::new(object(vec![
            ("FOO_BAR", split_array(SchemaNode::string(), SplitOptions::default())),
            ("BAZ", SchemaNode::string()),
            ("JSON", as_json(foo_bar())),
            (
                "DEEP",
                object(vec![
                    ("NESTED", object(vec![("FOO", SchemaNode::string())])),
                    ("BAR", SchemaNode::string()),
                ]),
            ),
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_env_full_example() {
        let env = env(&[
            ("FOO_BAR", "a,b,c"),
            ("BAZ", "qux"),
            ("JSON", r#"{"foo":"bar","bar":"baz"}"#),
            ("DEEP_NESTED_FOO", "qux"),
            ("DEEP_BAR", "baz"),
        ]);

        let result = parse_env(&full_schema(), &env).unwrap();

        assert_eq!(
            result,
            mapping(vec![
                ("FOO_BAR", Value::from(vec!["a", "b", "c"])),
                ("BAZ", Value::from("qux")),
                (
                    "JSON",
                    mapping(vec![("foo", Value::from("bar")), ("bar", Value::from("baz"))])
                ),
                (
                    "DEEP",
                    mapping(vec![
                        ("NESTED", mapping(vec![("FOO", Value::from("qux"))])),
                        ("BAR", Value::from("baz")),
                    ])
                ),
            ])
        );
        let keys: Vec<&String> = result.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, vec!["FOO_BAR", "BAZ", "JSON", "DEEP"]);
    }

    #[test]
    fn test_parse_env_leaves_input_untouched() {
        let input = env(&[("FOO_BAR", "a,b"), ("BAZ", "qux"), ("JSON", "{}"), ("OTHER", "x")]);
        let before = input.clone();

        let _ = parse_env(&full_schema(), &input);
        assert_eq!(input, before);
    }

    #[test]
    fn test_parse_env_nested_scenario() {
        let schema = Schema::new(object(vec![(
            "DEEP",
            object(vec![
                ("NESTED", object(vec![("FOO", SchemaNode::string())])),
                ("BAR", SchemaNode::string()),
            ]),
        )]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("DEEP_NESTED_FOO", "qux"), ("DEEP_BAR", "baz")]))
            .unwrap();

        assert_eq!(
            result,
            mapping(vec![(
                "DEEP",
                mapping(vec![
                    ("NESTED", mapping(vec![("FOO", Value::from("qux"))])),
                    ("BAR", Value::from("baz")),
                ])
            )])
        );
    }

    #[test]
    fn test_parse_env_union_scenario() {
        let schema = Schema::new(object(vec![(
            "UNION",
            SchemaNode::union(vec![
                object(vec![("FOO", SchemaNode::string())]),
                object(vec![("BAR", SchemaNode::string())]),
            ]),
        )]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("UNION_FOO", "a")])).unwrap();

        assert_eq!(
            result,
            mapping(vec![("UNION", mapping(vec![("FOO", Value::from("a"))]))])
        );
    }

    #[test]
    fn test_parse_env_union_at_root() {
        let schema = Schema::new(SchemaNode::union(vec![
            object(vec![("FOO", SchemaNode::string())]),
            object(vec![("BAR", SchemaNode::string())]),
        ]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("FOO", "a")])).unwrap();
        assert_eq!(result, mapping(vec![("FOO", Value::from("a"))]));
    }

    #[test]
    fn test_parse_env_union_at_root_drops_unknown_keys() {
        let schema = Schema::new(SchemaNode::union(vec![
            object(vec![("PORT", SchemaNode::integer())]),
            object(vec![("NAME", SchemaNode::string())]),
        ]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("PORT", "80"), ("HOME", "/root")])).unwrap();
        assert_eq!(result, mapping(vec![("PORT", Value::Integer(80))]));
    }

    #[test]
    fn test_parse_env_one_of_from_json_schema() {
        let schema = Schema::from_json(
            r#"{
                "type": "object",
                "properties": {
                    "U": {
                        "oneOf": [
                            {"type": "object", "properties": {"FOO": {"type": "string"}}, "required": ["FOO"]},
                            {"type": "object", "properties": {"BAR": {"type": "string"}}, "required": ["BAR"]}
                        ]
                    }
                },
                "required": ["U"]
            }"#,
        )
        .unwrap();

        let result = parse_env(&schema, &env(&[("U_FOO", "a")])).unwrap();
        assert_eq!(
            result,
            mapping(vec![("U", mapping(vec![("FOO", Value::from("a"))]))])
        );
    }

    #[test]
    fn test_parse_env_boolean_digits() {
        let schema = Schema::new(object(vec![
            ("DEBUG", SchemaNode::boolean()),
            ("QUIET", SchemaNode::boolean()),
        ]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("DEBUG", "1"), ("QUIET", "0")])).unwrap();
        assert_eq!(
            result,
            mapping(vec![("DEBUG", Value::Bool(true)), ("QUIET", Value::Bool(false))])
        );

        let err = parse_env(&schema, &env(&[("DEBUG", "yes"), ("QUIET", "0")])).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_parse_env_type_coercion_scenario() {
        let schema = Schema::new(object(vec![("NUM", SchemaNode::number())])).unwrap();

        let result = parse_env(&schema, &env(&[("NUM", "123")])).unwrap();
        assert_eq!(result, mapping(vec![("NUM", Value::Integer(123))]));
    }

    #[test]
    fn test_parse_env_malformed_json_default_policy_fails_on_required() {
        let schema = Schema::new(object(vec![("JSON", as_json(foo_bar()))])).unwrap();

        let err = parse_env(&schema, &env(&[("JSON", r#"{"foo":"bar","bar":"baz""#)]))
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.path.as_deref(), Some("JSON"));
    }

    #[test]
    fn test_parse_env_malformed_json_default_policy_yields_empty_object() {
        let optional = SchemaNode::object(
            ObjectSchema::new()
                .optional("foo", SchemaNode::string())
                .optional("bar", SchemaNode::string()),
        );
        let schema = Schema::new(object(vec![("JSON", as_json(optional))])).unwrap();

        let result = parse_env(&schema, &env(&[("JSON", r#"{"foo":"bar","bar":"baz""#)]))
            .unwrap();
        assert_eq!(result, mapping(vec![("JSON", Value::Mapping(IndexMap::new()))]));
    }

    #[test]
    fn test_parse_env_malformed_json_strict_policy_fails() {
        let optional = SchemaNode::object(ObjectSchema::new().optional("foo", SchemaNode::string()));
        let schema = Schema::new(object(vec![("JSON", as_json(optional))])).unwrap();
        let options = ParseOptions::default().with_json_fallback(JsonFallback::Strict);

        let err = parse_env_with_options(&schema, &env(&[("JSON", r#"{"foo":"#)]), &options)
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.path.as_deref(), Some("JSON"));
    }

    #[test]
    fn test_parse_env_malformed_json_array_and_scalar() {
        let schema = Schema::new(object(vec![
            ("LIST", as_json(SchemaNode::array(SchemaNode::string()))),
            (
                "MAYBE",
                as_json(SchemaNode::union(vec![SchemaNode::number(), SchemaNode::null()])),
            ),
        ]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("LIST", "[oops"), ("MAYBE", "{oops")])).unwrap();
        assert_eq!(
            result,
            mapping(vec![("LIST", Value::Sequence(vec![])), ("MAYBE", Value::Null)])
        );
    }

    #[test]
    fn test_parse_env_split_nested_in_json() {
        let inner = object(vec![(
            "tags",
            split_array(SchemaNode::string(), SplitOptions::new("|")),
        )]);
        let schema = Schema::new(object(vec![("META", as_json(inner))])).unwrap();

        let result = parse_env(&schema, &env(&[("META", r#"{"tags":"a|b"}"#)])).unwrap();
        assert_eq!(
            result.get_path("META.tags"),
            Some(&Value::from(vec!["a", "b"]))
        );
    }

    #[test]
    fn test_parse_env_defaults_and_unknown_keys() {
        let schema = Schema::new(SchemaNode::object(
            ObjectSchema::new()
                .property("HOST", SchemaNode::string())
                .optional("PORT", SchemaNode::integer().with_default(8080))
                .optional("DEBUG", SchemaNode::boolean()),
        ))
        .unwrap();

        let result = parse_env(
            &schema,
            &env(&[("HOST", "localhost"), ("PATH", "/usr/bin"), ("HOME", "/root")]),
        )
        .unwrap();

        assert_eq!(
            result,
            mapping(vec![
                ("HOST", Value::from("localhost")),
                ("PORT", Value::Integer(8080)),
            ])
        );
    }

    #[test]
    fn test_parse_env_missing_required() {
        let schema = Schema::new(object(vec![(
            "DB",
            object(vec![("HOST", SchemaNode::string())]),
        )]))
        .unwrap();

        let err = parse_env(&schema, &HashMap::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.to_string().contains("DB"));
    }

    #[test]
    fn test_parse_env_intersection() {
        let schema = Schema::new(object(vec![(
            "SVC",
            SchemaNode::intersection(vec![
                object(vec![("NAME", SchemaNode::string())]),
                object(vec![("PORT", SchemaNode::integer())]),
            ]),
        )]))
        .unwrap();

        let result = parse_env(&schema, &env(&[("SVC_NAME", "api"), ("SVC_PORT", "80")])).unwrap();
        assert_eq!(
            result,
            mapping(vec![(
                "SVC",
                mapping(vec![("NAME", Value::from("api")), ("PORT", Value::Integer(80))])
            )])
        );
    }

    #[test]
    fn test_parse_env_record_root_takes_everything() {
        let schema = Schema::new(SchemaNode::record(SchemaNode::string())).unwrap();
        let result = parse_env(&schema, &env(&[("A", "1"), ("B", "2")])).unwrap();

        assert_eq!(
            result,
            mapping(vec![("A", Value::from("1")), ("B", Value::from("2"))])
        );
    }

    #[test]
    fn test_parse_env_with_prefix() {
        let schema = Schema::new(object(vec![("PORT", SchemaNode::integer())])).unwrap();
        let options = ParseOptions::default().with_prefix("APP_");

        let result = parse_env_with_options(
            &schema,
            &env(&[("APP_PORT", "1"), ("PORT", "2")]),
            &options,
        )
        .unwrap();
        assert_eq!(result, mapping(vec![("PORT", Value::Integer(1))]));
    }

    #[test]
    fn test_parse_env_idempotent_through_flatten() {
        let schema = full_schema();
        let env = env(&[
            ("FOO_BAR", "a,b,c"),
            ("BAZ", "qux"),
            ("JSON", r#"{"foo":"bar","bar":"baz"}"#),
            ("DEEP_NESTED_FOO", "qux"),
            ("DEEP_BAR", "baz"),
        ]);
        let options = ParseOptions::default();

        let first = parse_env(&schema, &env).unwrap();
        let flat: HashMap<String, String> = flatten(schema.node(), &first, &options)
            .into_iter()
            .collect();
        let second = parse_env(&schema, &flat).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_env_as_struct() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Db {
            #[serde(rename = "HOST")]
            host: String,
            #[serde(rename = "PORT")]
            port: u16,
        }

        #[derive(Debug, Deserialize, PartialEq)]
        struct Config {
            #[serde(rename = "DB")]
            db: Db,
            #[serde(rename = "TAGS")]
            tags: Vec<String>,
        }

        let schema = Schema::new(object(vec![
            (
                "DB",
                object(vec![
                    ("HOST", SchemaNode::string()),
                    ("PORT", SchemaNode::integer()),
                ]),
            ),
            ("TAGS", split_array(SchemaNode::string(), SplitOptions::default())),
        ]))
        .unwrap();

        let config: Config = parse_env_as(
            &schema,
            &env(&[("DB_HOST", "db"), ("DB_PORT", "5432"), ("TAGS", "x,y")]),
            &ParseOptions::default(),
        )
        .unwrap();

        assert_eq!(
            config,
            Config {
                db: Db {
                    host: "db".into(),
                    port: 5432
                },
                tags: vec!["x".into(), "y".into()],
            }
        );
    }

    #[test]
    fn test_parse_env_as_mismatched_type() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrong {
            missing: String,
        }

        let schema = Schema::new(object(vec![("A", SchemaNode::string())])).unwrap();
        let err = parse_env_as::<Wrong>(&schema, &env(&[("A", "x")]), &ParseOptions::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Deserialize);
    }

    #[test]
    fn test_parse_process_env() {
        std::env::set_var("ENVSHAPE_TEST_PROCESS_PORT", "9090");

        let schema = Schema::new(object(vec![("PORT", SchemaNode::integer())])).unwrap();
        let options = ParseOptions::default().with_prefix("ENVSHAPE_TEST_PROCESS_");
        let result = parse_process_env(&schema, &options);

        std::env::remove_var("ENVSHAPE_TEST_PROCESS_PORT");
        assert_eq!(result.unwrap(), mapping(vec![("PORT", Value::Integer(9090))]));
    }
}
