//! envshape-core: Schema-driven parsing of environment variables
//!
//! This crate turns a flat map of environment variables into a nested,
//! typed and validated configuration value. The schema decides which keys
//! are read: a property at path `DB.HOST` is read from `DB_HOST`, nodes
//! marked with [`as_json`] read a whole JSON document from one key, and
//! arrays built with [`split_array`] read a delimited list.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use envshape_core::{as_json, parse_env, split_array, ObjectSchema, Schema, SchemaNode, SplitOptions, Value};
//!
//! let schema = Schema::new(SchemaNode::object(
//!     ObjectSchema::new()
//!         .property("HOSTS", split_array(SchemaNode::string(), SplitOptions::default()))
//!         .property("DB", SchemaNode::object(
//!             ObjectSchema::new()
//!                 .property("PORT", SchemaNode::integer())
//!                 .optional("TLS", SchemaNode::boolean().with_default(false)),
//!         ))
//!         .optional("EXTRA", as_json(SchemaNode::record(SchemaNode::string()))),
//! ))
//! .unwrap();
//!
//! let env = HashMap::from([
//!     ("HOSTS".to_string(), "a,b".to_string()),
//!     ("DB_PORT".to_string(), "5432".to_string()),
//!     ("EXTRA".to_string(), r#"{"region":"eu"}"#.to_string()),
//! ]);
//!
//! let config = parse_env(&schema, &env).unwrap();
//! assert_eq!(config.get_path("HOSTS[1]").and_then(|v| v.as_str()), Some("b"));
//! assert_eq!(config.get_path("DB.PORT"), Some(&Value::Integer(5432)));
//! assert_eq!(config.get_path("DB.TLS"), Some(&Value::Bool(false)));
//! assert_eq!(config.get_path("EXTRA.region").and_then(|v| v.as_str()), Some("eu"));
//! ```

pub mod annotate;
pub mod error;
pub mod materialize;
pub mod resolver;
pub mod schema;
pub mod value;

mod parse;

pub use annotate::{as_json, split_array, split_value, JsonFallback, SplitOptions};
pub use error::{Error, ErrorKind, Result};
pub use parse::{
    parse_env, parse_env_as, parse_env_with_options, parse_process_env, ParseOptions,
    DEFAULT_SEPARATOR,
};
pub use schema::{NodeKind, ObjectSchema, ScalarKind, Schema, SchemaNode, ValidationError};
pub use value::Value;
