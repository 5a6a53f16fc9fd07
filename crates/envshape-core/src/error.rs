//! Error types for envshape
//!
//! Errors are structured: a kind, the dotted path of the offending value
//! when one is known, the underlying cause and an actionable help message.

use std::fmt;

/// Result type alias for envshape operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for envshape operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Dotted path of the value the error refers to (e.g., "database.port")
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A schema document could not be parsed or understood
    Parse,
    /// An annotator was applied to a node it does not support
    Usage,
    /// The materialized value does not conform to the schema
    Validation,
    /// The validated value could not be deserialized into the requested type
    Deserialize,
    /// I/O error (schema file not readable, etc.)
    Io,
    /// Internal error (bug in envshape)
    Internal,
}

impl Error {
    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            path: None,
            help: None,
            cause: Some(message.into()),
        }
    }

    /// Create a usage error for an annotator applied to the wrong kind of node
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Usage,
            path: None,
            help: Some("Delimiter splitting only applies to array schemas".into()),
            cause: Some(message.into()),
        }
    }

    /// Create a validation error
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        let p = path.into();
        Self {
            kind: ErrorKind::Validation,
            path: if p.is_empty() || p == "<root>" {
                None
            } else {
                Some(p)
            },
            help: Some("Check the environment variables that feed this value".into()),
            cause: Some(message.into()),
        }
    }

    /// Create a deserialization error
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Deserialize,
            path: None,
            help: Some("Make sure the target type matches the schema".into()),
            cause: Some(message.into()),
        }
    }

    /// Create an I/O error for a file that could not be read
    pub fn io(path: impl Into<String>, message: impl Into<String>) -> Self {
        let p = path.into();
        Self {
            kind: ErrorKind::Io,
            path: None,
            help: Some(format!("Check that '{}' exists and is readable", p)),
            cause: Some(message.into()),
        }
    }

    /// Create an internal error (bug in envshape)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            path: None,
            help: Some("This is likely a bug in envshape. Please report it.".into()),
            cause: Some(message.into()),
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether this is a schema validation failure
    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Parse => write!(f, "Parse error")?,
            ErrorKind::Usage => write!(f, "Invalid schema annotation")?,
            ErrorKind::Validation => write!(f, "Validation error")?,
            ErrorKind::Deserialize => write!(f, "Deserialization error")?,
            ErrorKind::Io => write!(f, "I/O error")?,
            ErrorKind::Internal => write!(f, "Internal error")?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
