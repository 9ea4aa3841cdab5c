//! Property types
//!
//! A property is one typed field on a resource or nested object. The kind of a
//! property is a closed sum type; every kind-specific payload lives on its
//! variant, so a property can never carry two payloads at once.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::path::NodePath;
use crate::validate::{Validate, Validator, ValueKind};

/// Field exported by a referenced resource when none is named
pub const DEFAULT_IMPORT: &str = "selfLink";

/// Identity field of a resource
pub const NAME_FIELD: &str = "name";

/// Scalar type names accepted for map keys and values
pub const SCALAR_TYPES: [&str; 4] = ["String", "Integer", "Double", "Boolean"];

/// A typed field on a resource or nested object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Field name; array items inherit the name of their array
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub kind: PropertyKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Server-assigned, never sent on create or update
    #[serde(default, skip_serializing_if = "is_false")]
    pub output: bool,

    /// Only settable at creation time
    #[serde(default, skip_serializing_if = "is_false")]
    pub input: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    /// Target-specific attributes, only ever set by an override merge
    #[serde(default, skip_serializing_if = "PropertyCustomization::is_empty")]
    pub customization: PropertyCustomization,
}

/// The closed set of property kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropertyKind {
    String,
    Integer,
    Double,
    Boolean,
    Enum {
        #[serde(default)]
        values: Vec<String>,
    },
    Array {
        item_type: Box<Property>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_size: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_size: Option<u32>,
    },
    NestedObject {
        #[serde(default)]
        properties: Vec<Property>,
    },
    KeyValuePairs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_type: Option<String>,
    },
    ResourceRef {
        #[serde(default)]
        resources: Vec<ReferenceTarget>,
    },
}

/// One resource a `ResourceRef` property may point at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTarget {
    /// Name of the referenced resource
    pub resource: String,
    /// Field of the referenced resource whose value is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<String>,
}

impl ReferenceTarget {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            imports: None,
        }
    }

    pub fn imports(&self) -> &str {
        self.imports.as_deref().unwrap_or(DEFAULT_IMPORT)
    }
}

/// Regex or function based value validation attached by a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Target-specific property attributes.
///
/// These never appear in a base schema; the override engine copies them from
/// a target's override document after checking them against that target's
/// attribute whitelist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCustomization {
    /// Set semantics instead of list semantics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_set: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unordered_list: Option<bool>,
    /// Hoist the nested object's fields into its parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatten_object: Option<bool>,
    /// Take the default from the API response instead of a literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_from_api: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_suppress_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_expand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_flatten: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_hash_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_expander: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts_with: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_least_one_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exactly_one_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mask_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValueValidation>,
}

impl PropertyCustomization {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl PropertyKind {
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array_of(item: PropertyKind) -> Self {
        Self::Array {
            item_type: Box::new(Property::new("", item)),
            min_size: None,
            max_size: None,
        }
    }

    pub fn nested(properties: Vec<Property>) -> Self {
        Self::NestedObject { properties }
    }

    pub fn map(value_type: impl Into<String>) -> Self {
        Self::KeyValuePairs {
            key_type: None,
            value_type: Some(value_type.into()),
        }
    }

    pub fn reference(resource: impl Into<String>) -> Self {
        Self::ResourceRef {
            resources: vec![ReferenceTarget::new(resource)],
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::Enum { .. } => "Enum",
            Self::Array { .. } => "Array",
            Self::NestedObject { .. } => "NestedObject",
            Self::KeyValuePairs { .. } => "KeyValuePairs",
            Self::ResourceRef { .. } => "ResourceRef",
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Array { .. } | Self::KeyValuePairs { .. })
    }

    /// Child properties of a nested object, or of an array of nested objects
    pub fn nested_properties(&self) -> Option<&[Property]> {
        match self {
            Self::NestedObject { properties } => Some(properties),
            Self::Array { item_type, .. } => item_type.kind.nested_properties(),
            _ => None,
        }
    }

    pub fn nested_properties_mut(&mut self) -> Option<&mut Vec<Property>> {
        match self {
            Self::NestedObject { properties } => Some(properties),
            Self::Array { item_type, .. } => item_type.kind.nested_properties_mut(),
            _ => None,
        }
    }

    /// Check a raw value (a declared default) against this kind
    fn check_value(&self, v: &Validator, path: &NodePath, field: &str, value: &Value) -> Result<()> {
        match self {
            Self::String | Self::ResourceRef { .. } => {
                v.check_value_kind(path, field, value, ValueKind::String)
            }
            Self::Integer => v.check_value_kind(path, field, value, ValueKind::Integer),
            Self::Double => v.check_value_kind(path, field, value, ValueKind::Double),
            Self::Boolean => v.check_value_kind(path, field, value, ValueKind::Boolean),
            Self::Enum { values } => {
                v.check_value_kind(path, field, value, ValueKind::String)?;
                let s = value.as_str().unwrap_or_default();
                v.check_oneof(path, field, s, values)
            }
            Self::Array { item_type, .. } => {
                v.check_value_kind(path, field, value, ValueKind::Array)?;
                let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
                if let Self::Enum { values } = &item_type.kind {
                    let strings = items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| {
                            v.check_value_kind(&path.field(field).index(i), field, item, ValueKind::String)?;
                            Ok(item.as_str().unwrap_or_default())
                        })
                        .collect::<Result<Vec<_>>>()?;
                    return v.check_list_allowed(path, field, &strings, values);
                }
                for (i, item) in items.iter().enumerate() {
                    item_type.kind.check_value(v, &path.field(field).index(i), field, item)?;
                }
                Ok(())
            }
            Self::NestedObject { .. } => v.check_value_kind(path, field, value, ValueKind::Object),
            Self::KeyValuePairs { key_type, value_type } => {
                v.check_value_kind(path, field, value, ValueKind::Object)?;
                let expected = match value_type.as_deref() {
                    Some("Integer") => ValueKind::Integer,
                    Some("Double") => ValueKind::Double,
                    Some("Boolean") => ValueKind::Boolean,
                    _ => ValueKind::String,
                };
                if let Some(map) = value.as_object() {
                    for (key, item) in map {
                        check_key(path.field(field), key, key_type.as_deref())?;
                        v.check_value_kind(&path.field(field).field(key), key, item, expected)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Map keys arrive as strings; non-String key types must parse
fn check_key(path: NodePath, key: &str, key_type: Option<&str>) -> Result<()> {
    let parses = match key_type {
        Some("Integer") => key.parse::<i64>().is_ok(),
        Some("Double") => key.parse::<f64>().is_ok(),
        Some("Boolean") => matches!(key, "true" | "false"),
        _ => true,
    };
    if parses {
        return Ok(());
    }
    Err(CompileError::TypeMismatch {
        path: path.to_string(),
        field: key.to_string(),
        expected: key_type.unwrap_or("String").to_string(),
        actual: "String".to_string(),
    })
}

impl Property {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: false,
            output: false,
            input: false,
            exclude: false,
            min_version: None,
            default_value: None,
            customization: PropertyCustomization::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.output = true;
        self
    }

    pub fn is_name(&self) -> bool {
        self.name == NAME_FIELD
    }

    /// Nested properties, excluding those marked `exclude`
    pub fn properties(&self) -> Vec<&Property> {
        self.kind
            .nested_properties()
            .map(|props| props.iter().filter(|p| !p.exclude).collect())
            .unwrap_or_default()
    }

    /// First declared reference target, for a reference or an array of references
    pub fn reference_target(&self) -> Option<&ReferenceTarget> {
        match &self.kind {
            PropertyKind::ResourceRef { resources } => resources.first(),
            PropertyKind::Array { item_type, .. } => item_type.reference_target(),
            _ => None,
        }
    }
}

impl Validate for Property {
    fn validate(&mut self, v: &Validator, path: &NodePath) -> Result<()> {
        if self.name.is_empty() {
            return Err(CompileError::MissingField {
                path: path.to_string(),
                field: "name".to_string(),
            });
        }
        let here = path.field(&self.name);

        v.check_version(&here, "min_version", &self.min_version)?;

        match &mut self.kind {
            PropertyKind::Enum { values } => {
                if values.is_empty() {
                    return Err(CompileError::MissingField {
                        path: here.to_string(),
                        field: "values".to_string(),
                    });
                }
            }
            PropertyKind::Array { item_type, min_size, max_size } => {
                if item_type.name.is_empty() {
                    item_type.name = self.name.clone();
                }
                if let (Some(min), Some(max)) = (*min_size, *max_size) {
                    if min > max {
                        return Err(CompileError::TypeMismatch {
                            path: here.to_string(),
                            field: "min_size".to_string(),
                            expected: format!("at most max_size ({})", max),
                            actual: min.to_string(),
                        });
                    }
                }
                if matches!(item_type.kind, PropertyKind::Array { .. }) {
                    return Err(CompileError::TypeMismatch {
                        path: here.to_string(),
                        field: "item_type".to_string(),
                        expected: "scalar, Enum, NestedObject or ResourceRef".to_string(),
                        actual: "Array".to_string(),
                    });
                }
                item_type.validate(v, path)?;
            }
            PropertyKind::NestedObject { properties } => {
                validate_properties(v, &here, properties)?;
            }
            PropertyKind::KeyValuePairs { key_type, value_type } => {
                v.check_default(key_type, || "String".to_string());
                let value_type = v.check_required(&here, "value_type", value_type)?;
                for (field, ty) in [("key_type", key_type.as_deref().unwrap_or_default()), ("value_type", value_type.as_str())] {
                    if !SCALAR_TYPES.contains(&ty) {
                        return Err(CompileError::TypeMismatch {
                            path: here.to_string(),
                            field: field.to_string(),
                            expected: "scalar type (String, Integer, Double, Boolean)".to_string(),
                            actual: ty.to_string(),
                        });
                    }
                }
            }
            PropertyKind::ResourceRef { resources } => {
                if resources.is_empty() {
                    return Err(CompileError::MissingField {
                        path: here.to_string(),
                        field: "resources".to_string(),
                    });
                }
                for (i, target) in resources.iter_mut().enumerate() {
                    v.check_default(&mut target.imports, || DEFAULT_IMPORT.to_string());
                    v.check_reference(&here.field("resources").index(i), &target.resource)?;
                }
            }
            PropertyKind::String | PropertyKind::Integer | PropertyKind::Double | PropertyKind::Boolean => {}
        }

        if let Some(value) = &self.default_value {
            self.kind.check_value(v, &here, "default_value", value)?;
        }
        Ok(())
    }
}

/// Validate a property list: names unique, then every property in order
pub fn validate_properties(v: &Validator, path: &NodePath, properties: &mut [Property]) -> Result<()> {
    v.check_unique_names(path, properties.iter().map(|p| p.name.as_str()))?;
    for property in properties.iter_mut() {
        property.validate(v, path)?;
    }
    Ok(())
}
