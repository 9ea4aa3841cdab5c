//! Error types for the schema compiler

use thiserror::Error;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Compiler errors.
///
/// Every schema-level variant carries the dotted path from the tree root to
/// the offending node. All of them are terminal for the compile unit.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{path}: missing required field '{field}'")]
    MissingField { path: String, field: String },

    #[error("{path}: field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("{path}: invalid value '{value}'{}", index_suffix(.index))]
    InvalidEnumValue {
        path: String,
        index: Option<usize>,
        value: String,
    },

    #[error("{path}: duplicate name '{name}'")]
    DuplicateName { path: String, name: String },

    #[error("{path}: attribute '{field}' cannot be overridden for target '{target}'")]
    UnknownOverrideField {
        path: String,
        field: String,
        target: String,
    },

    #[error("{path}: illegal override: {reason}")]
    IllegalOverride { path: String, reason: String },

    #[error("{path}: override names unknown property '{name}'")]
    UnknownProperty { path: String, name: String },

    #[error("{path}: override names unknown resource '{name}'")]
    UnknownResource { path: String, name: String },

    #[error("{path}: reference to unknown resource '{resource}'")]
    UnresolvedReference { path: String, resource: String },

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" at index {}", i)).unwrap_or_default()
}

impl CompileError {
    /// The dotted path of the offending node, if this is a schema error.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::MissingField { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::InvalidEnumValue { path, .. }
            | Self::DuplicateName { path, .. }
            | Self::UnknownOverrideField { path, .. }
            | Self::IllegalOverride { path, .. }
            | Self::UnknownProperty { path, .. }
            | Self::UnknownResource { path, .. }
            | Self::UnresolvedReference { path, .. } => Some(path),
            _ => None,
        }
    }
}
