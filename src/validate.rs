//! Contract checking
//!
//! A generic, recursive checker every schema node runs after construction.
//! Checks fail fast: the first violation aborts validation of the whole tree
//! and carries the dotted path of the node it was found at.
//!
//! Defaults are applied here rather than at construction time, so a freshly
//! deserialized tree can still be inspected in its raw form. Running
//! validation twice over the same tree is a no-op the second time.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;
use tracing::trace;

use crate::error::{CompileError, Result};
use crate::path::NodePath;

/// A node that can check (and complete) itself.
pub trait Validate {
    fn validate(&mut self, validator: &Validator, path: &NodePath) -> Result<()>;
}

/// JSON-level kind of a raw value, used for type checks on free-form fields
/// such as `default_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
    Double,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Double,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Null,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::Array => "Array",
            Self::Object => "Object",
            Self::Null => "null",
        }
    }

    /// Whether a value of kind `actual` is acceptable where `self` is declared.
    /// Integers are accepted for doubles.
    pub fn accepts(&self, actual: ValueKind) -> bool {
        *self == actual || (*self == Self::Double && actual == Self::Integer)
    }
}

/// Validation context and check helpers.
///
/// A standalone validator checks nodes in isolation. One built for a product
/// additionally knows the product's resource names and versions, so
/// references and version markers can be resolved.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    resources: Option<BTreeSet<String>>,
    versions: Option<Vec<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(resources: BTreeSet<String>, versions: Vec<String>) -> Self {
        Self {
            resources: Some(resources),
            versions: Some(versions),
        }
    }

    /// Require an optional field to be present
    pub fn check_required<'a, T>(
        &self,
        path: &NodePath,
        field: &str,
        value: &'a Option<T>,
    ) -> Result<&'a T> {
        trace!(path = %path, field, "checking required field");
        value.as_ref().ok_or_else(|| CompileError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
        })
    }

    /// Require a string field to be present and non-empty
    pub fn check_required_str(&self, path: &NodePath, field: &str, value: &Option<String>) -> Result<()> {
        match value.as_deref() {
            Some(s) if !s.is_empty() => Ok(()),
            _ => Err(CompileError::MissingField {
                path: path.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Substitute a default when the field is absent
    pub fn check_default<T>(&self, slot: &mut Option<T>, default: impl FnOnce() -> T) {
        if slot.is_none() {
            *slot = Some(default());
        }
    }

    /// Require a scalar value to be one of an allowed set
    pub fn check_oneof<S: AsRef<str>>(
        &self,
        path: &NodePath,
        field: &str,
        value: &str,
        allowed: &[S],
    ) -> Result<()> {
        if allowed.iter().any(|a| a.as_ref() == value) {
            return Ok(());
        }
        Err(CompileError::InvalidEnumValue {
            path: path.field(field).to_string(),
            index: None,
            value: value.to_string(),
        })
    }

    /// Require every element of a list to be one of an allowed set
    pub fn check_list_allowed<I, S>(
        &self,
        path: &NodePath,
        field: &str,
        items: &[I],
        allowed: &[S],
    ) -> Result<()>
    where
        I: AsRef<str>,
        S: AsRef<str>,
    {
        for (index, item) in items.iter().enumerate() {
            let item = item.as_ref();
            if !allowed.iter().any(|a| a.as_ref() == item) {
                return Err(CompileError::InvalidEnumValue {
                    path: path.field(field).index(index).to_string(),
                    index: Some(index),
                    value: item.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Require a raw value to be of the declared kind
    pub fn check_value_kind(
        &self,
        path: &NodePath,
        field: &str,
        value: &Value,
        expected: ValueKind,
    ) -> Result<()> {
        let actual = ValueKind::of(value);
        if expected.accepts(actual) {
            return Ok(());
        }
        Err(CompileError::TypeMismatch {
            path: path.to_string(),
            field: field.to_string(),
            expected: expected.name().to_string(),
            actual: actual.name().to_string(),
        })
    }

    /// Require names within one list to be unique
    pub fn check_unique_names<'a>(
        &self,
        path: &NodePath,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(CompileError::DuplicateName {
                    path: path.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Require a version marker to name a version the product declares.
    /// A standalone validator accepts any marker.
    pub fn check_version(&self, path: &NodePath, field: &str, version: &Option<String>) -> Result<()> {
        match (&self.versions, version) {
            (Some(versions), Some(v)) => self.check_oneof(path, field, v, versions),
            _ => Ok(()),
        }
    }

    /// Require a referenced resource to exist in the product.
    /// A standalone validator accepts any reference.
    pub fn check_reference(&self, path: &NodePath, resource: &str) -> Result<()> {
        match &self.resources {
            Some(names) if !names.contains(resource) => Err(CompileError::UnresolvedReference {
                path: path.to_string(),
                resource: resource.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
