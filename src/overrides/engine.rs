//! Override merge
//!
//! Merging never touches the base product: the engine works on a deep copy,
//! applies attribute overrides top-down, checks the target-specific markers
//! and revalidates the merged tree before handing it back.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::api::{Product, Property, PropertyKind, Resource};
use crate::error::{CompileError, Result};
use crate::overrides::targets::{
    TargetProfile, PROPERTY_CUSTOMIZATION_FIELDS, RESOURCE_CUSTOMIZATION_FIELDS,
};
use crate::overrides::{OverrideSet, PropertyOverride, ResourceOverride, TargetRegistry};
use crate::path::NodePath;
use crate::validate::{Validator, ValueKind};

pub struct OverrideEngine<'a> {
    targets: &'a TargetRegistry,
}

impl<'a> OverrideEngine<'a> {
    pub fn new(targets: &'a TargetRegistry) -> Self {
        Self { targets }
    }

    /// Merge `overrides` onto a copy of `base` for `target`.
    pub fn apply(&self, base: &Product, overrides: &OverrideSet, target: &str) -> Result<Product> {
        let profile = self.targets.get(target)?;
        let overrides = overrides.normalized()?;
        check_whitelist(profile, &overrides)?;

        let mut merged = base.clone();
        if let Some(product) = &overrides.product {
            let resources = std::mem::take(&mut merged.resources);
            let mut updated: Product = merge_fields(&merged, &product.fields, &[], &NodePath::root())?;
            updated.resources = resources;
            merged = updated;
        }

        for (name, resource_override) in &overrides.resources {
            let resource = merged
                .resource_mut(name)
                .ok_or_else(|| CompileError::UnknownResource {
                    path: NodePath::root().to_string(),
                    name: name.clone(),
                })?;
            merge_resource(resource, resource_override)?;
            debug!(target_id = target, resource = %name, "Merged resource overrides");
        }

        merged.validate()?;
        info!(target_id = target, product = %merged.name, "Applied overrides");
        Ok(merged)
    }
}

// =============================================================================
// Whitelist
// =============================================================================

fn unknown_field(path: &NodePath, field: &str, profile: &TargetProfile) -> CompileError {
    CompileError::UnknownOverrideField {
        path: path.to_string(),
        field: field.to_string(),
        target: profile.id.clone(),
    }
}

fn check_whitelist(profile: &TargetProfile, overrides: &OverrideSet) -> Result<()> {
    let root = NodePath::root();
    if let Some(product) = &overrides.product {
        if let Some(field) = product.fields.keys().find(|f| !profile.allows_product_field(f)) {
            return Err(unknown_field(&root, field, profile));
        }
        check_attributes(&root, &product.fields)?;
    }
    for (name, resource) in &overrides.resources {
        let path = NodePath::new(name.as_str());
        if let Some(field) = resource.fields.keys().find(|f| !profile.allows_resource_field(f)) {
            return Err(unknown_field(&path, field, profile));
        }
        check_attributes(&path, &resource.fields)?;
        check_property_whitelist(profile, &path, &resource.properties)?;
    }
    Ok(())
}

fn check_property_whitelist(
    profile: &TargetProfile,
    parent: &NodePath,
    properties: &BTreeMap<String, PropertyOverride>,
) -> Result<()> {
    for (name, property) in properties {
        let path = parent.field(name.as_str());
        if let Some(field) = property.fields.keys().find(|f| !profile.allows_property_field(f)) {
            return Err(unknown_field(&path, field, profile));
        }
        check_attributes(&path, &property.fields)?;
        check_property_whitelist(profile, &path, &property.properties)?;
    }
    Ok(())
}

/// Names accepted for a property's `type`
const PROPERTY_TYPES: [&str; 9] = [
    "String",
    "Integer",
    "Double",
    "Boolean",
    "Enum",
    "Array",
    "NestedObject",
    "KeyValuePairs",
    "ResourceRef",
];

/// Declared kind of an overridable attribute; `None` for free-form values
fn attribute_kind(field: &str) -> Option<ValueKind> {
    match field {
        "default_value" => None,
        "exclude" | "required" | "output" | "input" | "skip_delete" | "is_set" | "unordered_list"
        | "flatten_object" | "default_from_api" | "sensitive" | "ignore_read" => Some(ValueKind::Boolean),
        "identity" | "values" | "resources" | "import_format" | "conflicts_with" | "at_least_one_of"
        | "exactly_one_of" | "update_mask_fields" => Some(ValueKind::Array),
        "async" | "validation" => Some(ValueKind::Object),
        "min_size" | "max_size" => Some(ValueKind::Integer),
        _ => Some(ValueKind::String),
    }
}

/// Attributes that cannot be unset with `null`
fn is_mandatory(field: &str) -> bool {
    matches!(
        field,
        "name" | "type" | "exclude" | "required" | "output" | "input" | "values" | "resources"
    )
}

/// Type-check attribute overrides before anything is merged
fn check_attributes(path: &NodePath, fields: &BTreeMap<String, Value>) -> Result<()> {
    let v = Validator::new();
    for (field, value) in fields {
        let Some(expected) = attribute_kind(field) else {
            continue;
        };
        if value.is_null() && !is_mandatory(field) {
            continue;
        }
        v.check_value_kind(path, field, value, expected)?;
        if field == "type" {
            v.check_oneof(path, field, value.as_str().unwrap_or_default(), &PROPERTY_TYPES)?;
        }
    }
    Ok(())
}

// =============================================================================
// Merge
// =============================================================================

fn merge_resource(resource: &mut Resource, overrides: &ResourceOverride) -> Result<()> {
    let path = NodePath::new(resource.name.as_str());
    if !overrides.fields.is_empty() {
        let parameters = std::mem::take(&mut resource.parameters);
        let properties = std::mem::take(&mut resource.properties);
        let mut updated: Resource =
            merge_fields(&*resource, &overrides.fields, &RESOURCE_CUSTOMIZATION_FIELDS, &path)?;
        updated.parameters = parameters;
        updated.properties = properties;
        *resource = updated;
    }

    for (name, property_override) in &overrides.properties {
        let property = resource
            .property_mut(name)
            .ok_or_else(|| CompileError::UnknownProperty {
                path: path.to_string(),
                name: name.clone(),
            })?;
        merge_property(property, property_override, &path)?;
    }
    Ok(())
}

fn merge_property(property: &mut Property, overrides: &PropertyOverride, parent: &NodePath) -> Result<()> {
    let here = parent.field(property.name.as_str());
    if !overrides.fields.is_empty() {
        *property = merge_fields(&*property, &overrides.fields, &PROPERTY_CUSTOMIZATION_FIELDS, &here)?;
    }
    check_markers(property, &here)?;

    for (name, child_override) in &overrides.properties {
        let child = property
            .kind
            .nested_properties_mut()
            .and_then(|children| children.iter_mut().find(|p| p.name == *name))
            .ok_or_else(|| CompileError::UnknownProperty {
                path: here.to_string(),
                name: name.clone(),
            })?;
        merge_property(child, child_override, &here)?;
    }
    Ok(())
}

/// Reject target markers that contradict the merged property
fn check_markers(property: &Property, path: &NodePath) -> Result<()> {
    let custom = &property.customization;
    let kind = property.kind.type_name();
    let illegal = |reason: String| CompileError::IllegalOverride {
        path: path.to_string(),
        reason,
    };

    if !property.kind.is_collection() {
        if custom.is_set == Some(true) {
            return Err(illegal(format!("is_set on {}, expected Array or KeyValuePairs", kind)));
        }
        if custom.unordered_list == Some(true) {
            return Err(illegal(format!(
                "unordered_list on {}, expected Array or KeyValuePairs",
                kind
            )));
        }
    }
    if custom.flatten_object == Some(true) && !matches!(property.kind, PropertyKind::NestedObject { .. }) {
        return Err(illegal(format!("flatten_object on {}, expected NestedObject", kind)));
    }
    if property.default_value.is_some() && custom.default_from_api == Some(true) {
        return Err(illegal("default_value together with default_from_api".to_string()));
    }
    Ok(())
}

/// Apply attribute overrides to a node through its serialized form.
///
/// Attributes listed in `customization` land in the node's `customization`
/// table. String values have `{{field}}` replaced by the node's prior value
/// of that same attribute.
fn merge_fields<T>(
    node: &T,
    fields: &BTreeMap<String, Value>,
    customization: &[&str],
    path: &NodePath,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut doc = serde_json::to_value(node)?;
    if let Value::Object(map) = &mut doc {
        for (field, value) in fields {
            if customization.contains(&field.as_str()) {
                let entry = map
                    .entry("customization")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(inner) = entry {
                    set_field(inner, field, value);
                }
            } else {
                set_field(map, field, value);
            }
        }
    }
    serde_json::from_value(doc).map_err(|e| CompileError::IllegalOverride {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn set_field(map: &mut Map<String, Value>, field: &str, value: &Value) {
    let prior = match map.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    map.insert(field.to_string(), interpolate(field, value, &prior));
}

/// Replace `{{field}}` in a string override with the prior value
pub fn interpolate(field: &str, value: &Value, prior: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(&format!("{{{{{}}}}}", field), prior)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ReferenceTarget, Version};
    use serde_json::json;

    fn storage() -> Product {
        let bucket = Resource::new("Bucket")
            .with_description("Creates a bucket.")
            .with_base_url("b?project={{project}}")
            .with_property(Property::new("name", PropertyKind::String).required())
            .with_property(Property::new("storageClass", PropertyKind::enumeration(["STANDARD", "NEARLINE"])))
            .with_property(Property::new("labels", PropertyKind::map("String")))
            .with_property(Property::new(
                "versioning",
                PropertyKind::nested(vec![Property::new("enabled", PropertyKind::Boolean)]),
            ))
            .with_property(Property::new(
                "lifecycle",
                PropertyKind::nested(vec![Property::new(
                    "rule",
                    PropertyKind::array_of(PropertyKind::nested(vec![Property::new(
                        "action",
                        PropertyKind::nested(vec![Property::new("type", PropertyKind::String)]),
                    )])),
                )]),
            ));
        let mut product = Product::new("storage")
            .with_version(Version::new("ga"))
            .with_resource(bucket);
        product.validate().unwrap();
        product
    }

    fn bucket_override(property: &str, field: &str, value: Value) -> OverrideSet {
        OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default().property(property, PropertyOverride::default().field(field, value)),
        )
    }

    fn apply(base: &Product, overrides: &OverrideSet, target: &str) -> Result<Product> {
        let registry = TargetRegistry::builtin();
        OverrideEngine::new(&registry).apply(base, overrides, target)
    }

    #[test]
    fn test_description_interpolation() {
        let base = storage();
        let overrides = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default().field("description", json!("{{description}} Supports versioning.")),
        );
        let merged = apply(&base, &overrides, "terraform").unwrap();
        assert_eq!(
            merged.resource("Bucket").unwrap().description.as_deref(),
            Some("Creates a bucket. Supports versioning.")
        );
    }

    #[test]
    fn test_base_not_mutated() {
        let base = storage();
        let before = base.clone();
        let overrides = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default()
                .field("description", json!("Replaced."))
                .field("mutex", json!("buckets/{{name}}"))
                .property("labels", PropertyOverride::default().field("is_set", json!(true))),
        );
        let merged = apply(&base, &overrides, "terraform").unwrap();
        assert_eq!(base, before);
        assert_ne!(merged, base);

        let bucket = merged.resource("Bucket").unwrap();
        assert_eq!(bucket.customization.mutex.as_deref(), Some("buckets/{{name}}"));
        assert_eq!(bucket.property("labels").unwrap().customization.is_set, Some(true));
    }

    #[test]
    fn test_is_set_rejected_on_non_collections() {
        let kinds = vec![
            PropertyKind::String,
            PropertyKind::Integer,
            PropertyKind::Double,
            PropertyKind::Boolean,
            PropertyKind::enumeration(["A"]),
            PropertyKind::nested(vec![Property::new("inner", PropertyKind::String)]),
            PropertyKind::ResourceRef {
                resources: vec![ReferenceTarget::new("Bucket")],
            },
        ];
        for kind in kinds {
            let type_name = kind.type_name();
            let mut base = storage();
            base.resources[0].properties.push(Property::new("probe", kind));
            base.validate().unwrap();
            let err = apply(&base, &bucket_override("probe", "is_set", json!(true)), "terraform").unwrap_err();
            match err {
                CompileError::IllegalOverride { path, reason } => {
                    assert_eq!(path, "Bucket.probe");
                    assert!(reason.contains(type_name), "{}", reason);
                }
                other => panic!("Expected IllegalOverride for {}, got {:?}", type_name, other),
            }
        }

        let base = storage();
        assert!(apply(&base, &bucket_override("labels", "is_set", json!(true)), "terraform").is_ok());
    }

    #[test]
    fn test_mistyped_override_values() {
        let base = storage();
        let err = apply(&base, &bucket_override("name", "required", json!("yes")), "terraform").unwrap_err();
        match err {
            CompileError::TypeMismatch { path, field, expected, actual } => {
                assert_eq!(path, "Bucket.name");
                assert_eq!(field, "required");
                assert_eq!(expected, "Boolean");
                assert_eq!(actual, "String");
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }

        let mutex = OverrideSet::default()
            .with_resource("Bucket", ResourceOverride::default().field("mutex", json!(3)));
        assert!(matches!(
            apply(&base, &mutex, "terraform"),
            Err(CompileError::TypeMismatch { ref path, ref field, .. }) if path == "Bucket" && field == "mutex"
        ));

        assert!(matches!(
            apply(&base, &bucket_override("name", "type", json!("Widget")), "terraform"),
            Err(CompileError::InvalidEnumValue { ref path, ref value, .. })
                if path == "Bucket.name.type" && value == "Widget"
        ));
        assert!(matches!(
            apply(&base, &bucket_override("name", "required", Value::Null), "terraform"),
            Err(CompileError::TypeMismatch { .. })
        ));
        assert!(apply(&base, &bucket_override("labels", "description", Value::Null), "terraform").is_ok());
    }

    #[test]
    fn test_flatten_object_requires_nested_object() {
        let base = storage();
        assert!(matches!(
            apply(&base, &bucket_override("name", "flatten_object", json!(true)), "terraform"),
            Err(CompileError::IllegalOverride { .. })
        ));
        let merged = apply(&base, &bucket_override("versioning", "flatten_object", json!(true)), "terraform").unwrap();
        let versioning = merged.resource("Bucket").unwrap().property("versioning").unwrap();
        assert_eq!(versioning.customization.flatten_object, Some(true));
    }

    #[test]
    fn test_default_conflicts_with_default_from_api() {
        let base = storage();
        let overrides = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default().property(
                "storageClass",
                PropertyOverride::default()
                    .field("default_value", json!("STANDARD"))
                    .field("default_from_api", json!(true)),
            ),
        );
        assert!(matches!(
            apply(&base, &overrides, "terraform"),
            Err(CompileError::IllegalOverride { ref path, .. }) if path == "Bucket.storageClass"
        ));
    }

    #[test]
    fn test_field_outside_whitelist() {
        let base = storage();
        match apply(&base, &bucket_override("labels", "is_set", json!(true)), "ansible").unwrap_err() {
            CompileError::UnknownOverrideField { path, field, target } => {
                assert_eq!(path, "Bucket.labels");
                assert_eq!(field, "is_set");
                assert_eq!(target, "ansible");
            }
            other => panic!("Expected UnknownOverrideField, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_names() {
        let base = storage();
        assert!(matches!(
            apply(&base, &bucket_override("acl", "description", json!("x")), "terraform"),
            Err(CompileError::UnknownProperty { ref name, .. }) if name == "acl"
        ));

        let overrides = OverrideSet::default().with_resource(
            "Object",
            ResourceOverride::default().field("description", json!("x")),
        );
        assert!(matches!(
            apply(&base, &overrides, "terraform"),
            Err(CompileError::UnknownResource { ref name, .. }) if name == "Object"
        ));

        assert!(matches!(
            apply(&base, &OverrideSet::default(), "pulumi"),
            Err(CompileError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_nested_and_array_paths() {
        let base = storage();
        let overrides = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default()
                .property(
                    "versioning.enabled",
                    PropertyOverride::default().field("default_value", json!(true)),
                )
                .property(
                    "lifecycle.rule[].action",
                    PropertyOverride::default().field("flatten_object", json!(true)),
                ),
        );
        let merged = apply(&base, &overrides, "terraform").unwrap();
        let bucket = merged.resource("Bucket").unwrap();

        let enabled = bucket.property("versioning").unwrap().properties()[0];
        assert_eq!(enabled.default_value, Some(json!(true)));

        let rule = bucket.property("lifecycle").unwrap().properties()[0];
        let action = rule.properties()[0];
        assert_eq!(action.name, "action");
        assert_eq!(action.customization.flatten_object, Some(true));

        let missing = bucket_override("versioning.missing", "description", json!("x"));
        match apply(&base, &missing, "terraform").unwrap_err() {
            CompileError::UnknownProperty { path, name } => {
                assert_eq!(path, "Bucket.versioning");
                assert_eq!(name, "missing");
            }
            other => panic!("Expected UnknownProperty, got {:?}", other),
        }
    }

    #[test]
    fn test_type_override() {
        let base = storage();
        let merged = apply(&base, &bucket_override("name", "type", json!("Integer")), "inspec").unwrap();
        assert_eq!(
            merged.resource("Bucket").unwrap().property("name").unwrap().kind,
            PropertyKind::Integer
        );
    }

    #[test]
    fn test_merged_tree_is_revalidated() {
        let base = storage();
        let overrides = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default().field("create_verb", json!("GET")),
        );
        assert!(matches!(
            apply(&base, &overrides, "terraform"),
            Err(CompileError::InvalidEnumValue { ref path, .. }) if path == "Bucket.create_verb"
        ));
    }

    #[test]
    fn test_product_override() {
        let base = storage();
        let mut overrides = OverrideSet::default();
        overrides.product = Some(crate::overrides::ProductOverride {
            fields: [("display_name".to_string(), json!("Cloud Storage"))].into_iter().collect(),
        });
        let merged = apply(&base, &overrides, "ansible").unwrap();
        assert_eq!(merged.display_name.as_deref(), Some("Cloud Storage"));
        assert_eq!(merged.resources.len(), 1);
    }

    #[test]
    fn test_interpolate_absent_prior() {
        assert_eq!(
            interpolate("mutex", &json!("lock/{{mutex}}/x"), ""),
            json!("lock//x")
        );
        assert_eq!(interpolate("required", &json!(true), "false"), json!(true));
    }
}
