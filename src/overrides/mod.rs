//! Target Overrides
//!
//! An override set is a partial tree mirroring a product, addressed by
//! resource and property names. Each downstream target supplies one; the
//! [`OverrideEngine`] layers it onto a copy of the base product.
//!
//! ```yaml
//! product:
//!   display_name: Cloud Storage
//! resources:
//!   Bucket:
//!     description: "{{description}} Supports versioning."
//!     properties:
//!       labels:
//!         is_set: false
//!       versioning.enabled:
//!         default_value: true
//!       lifecycle.rule[].action:
//!         flatten_object: true
//! ```
//!
//! Property keys may be dotted paths; `a[].b` addresses `b` inside the
//! objects of array `a`. Keys other than `properties` are attribute
//! overrides and are checked against the target's whitelist.

pub mod engine;
pub mod targets;

pub use engine::OverrideEngine;
pub use targets::{TargetProfile, TargetRegistry};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::path::NodePath;

/// Overrides for one target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductOverride>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductOverride {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOverride {
    /// Overrides of properties and parameters, keyed by name or dotted path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyOverride>,

    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyOverride {
    /// Overrides of nested properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyOverride>,

    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl OverrideSet {
    pub fn is_empty(&self) -> bool {
        self.product.as_ref().map_or(true, |p| p.fields.is_empty()) && self.resources.is_empty()
    }

    pub fn with_resource(mut self, name: impl Into<String>, resource: ResourceOverride) -> Self {
        self.resources.insert(name.into(), resource);
        self
    }

    /// Copy with every dotted property key expanded into nested overrides
    pub fn normalized(&self) -> Result<OverrideSet> {
        let mut resources = BTreeMap::new();
        for (name, resource) in &self.resources {
            let path = NodePath::new(name.as_str());
            resources.insert(
                name.clone(),
                ResourceOverride {
                    properties: normalize_properties(&path, &resource.properties)?,
                    fields: resource.fields.clone(),
                },
            );
        }
        Ok(OverrideSet {
            product: self.product.clone(),
            resources,
        })
    }
}

impl ResourceOverride {
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: PropertyOverride) -> Self {
        self.properties.insert(name.into(), property);
        self
    }
}

impl PropertyOverride {
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn property(mut self, name: impl Into<String>, property: PropertyOverride) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Fold another override for the same property into this one
    fn absorb(&mut self, other: PropertyOverride) {
        self.fields.extend(other.fields);
        for (name, child) in other.properties {
            self.properties.entry(name).or_default().absorb(child);
        }
    }
}

/// Split `a[].b.c` into `["a", "b", "c"]`
fn split_key(path: &NodePath, key: &str) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    for raw in key.split('.') {
        let segment = raw.strip_suffix("[]").unwrap_or(raw);
        if segment.is_empty() {
            return Err(CompileError::IllegalOverride {
                path: path.to_string(),
                reason: format!("empty segment in property key '{}'", key),
            });
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

fn normalize_properties(
    path: &NodePath,
    properties: &BTreeMap<String, PropertyOverride>,
) -> Result<BTreeMap<String, PropertyOverride>> {
    let mut out: BTreeMap<String, PropertyOverride> = BTreeMap::new();
    for (key, overrides) in properties {
        let segments = split_key(path, key)?;
        let leaf_path = segments.iter().fold(path.clone(), |p, s| p.field(s.as_str()));
        let leaf = PropertyOverride {
            properties: normalize_properties(&leaf_path, &overrides.properties)?,
            fields: overrides.fields.clone(),
        };
        let nested = segments
            .iter()
            .skip(1)
            .rev()
            .fold(leaf, |child, name| PropertyOverride::default().property(name.as_str(), child));
        out.entry(segments[0].clone()).or_default().absorb(nested);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_keys_nest() {
        let set = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default()
                .property("versioning", PropertyOverride::default().field("description", json!("top")))
                .property(
                    "versioning.enabled",
                    PropertyOverride::default().field("default_value", json!(true)),
                )
                .property(
                    "lifecycle.rule[].action",
                    PropertyOverride::default().field("flatten_object", json!(true)),
                ),
        );
        let normalized = set.normalized().unwrap();
        let bucket = &normalized.resources["Bucket"];

        let versioning = &bucket.properties["versioning"];
        assert_eq!(versioning.fields["description"], json!("top"));
        assert_eq!(versioning.properties["enabled"].fields["default_value"], json!(true));

        let action = &bucket.properties["lifecycle"].properties["rule"].properties["action"];
        assert_eq!(action.fields["flatten_object"], json!(true));
        assert!(!bucket.properties.contains_key("versioning.enabled"));
    }

    #[test]
    fn test_empty_segment_rejected() {
        let set = OverrideSet::default().with_resource(
            "Bucket",
            ResourceOverride::default().property("a..b", PropertyOverride::default()),
        );
        assert!(matches!(
            set.normalized(),
            Err(CompileError::IllegalOverride { .. })
        ));
    }

    #[test]
    fn test_deserialize_captures_fields() {
        let yaml = r#"
product:
  display_name: Cloud Storage
resources:
  Bucket:
    mutex: "buckets/{{name}}"
    properties:
      storageClass:
        is_set: true
        bogus_field: 1
"#;
        let set: OverrideSet = serde_yaml::from_str(yaml).unwrap();
        let bucket = &set.resources["Bucket"];
        assert_eq!(bucket.fields["mutex"], json!("buckets/{{name}}"));
        let storage = &bucket.properties["storageClass"];
        assert_eq!(storage.fields.len(), 2);
        assert!(storage.fields.contains_key("bogus_field"));
        assert_eq!(
            set.product.unwrap().fields["display_name"],
            json!("Cloud Storage")
        );
    }
}
