//! Target profiles
//!
//! A target profile is the whitelist of attributes a downstream target may
//! override. Profiles are built once, held by a [`TargetRegistry`] and passed
//! explicitly to the engine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Product attributes every target may override
pub const PRODUCT_FIELDS: [&str; 2] = ["name", "display_name"];

/// Resource attributes every target may override
pub const BASE_RESOURCE_FIELDS: [&str; 13] = [
    "description",
    "kind",
    "base_url",
    "self_link",
    "exclude",
    "min_version",
    "create_verb",
    "read_verb",
    "update_verb",
    "delete_verb",
    "collection_url_key",
    "identity",
    "async",
];

/// Property attributes every target may override
pub const BASE_PROPERTY_FIELDS: [&str; 14] = [
    "type",
    "description",
    "required",
    "output",
    "input",
    "exclude",
    "min_version",
    "default_value",
    "values",
    "min_size",
    "max_size",
    "key_type",
    "value_type",
    "resources",
];

/// Resource attributes stored under `customization`
pub const RESOURCE_CUSTOMIZATION_FIELDS: [&str; 5] =
    ["id_format", "import_format", "mutex", "legacy_name", "skip_delete"];

/// Property attributes stored under `customization`
pub const PROPERTY_CUSTOMIZATION_FIELDS: [&str; 17] = [
    "is_set",
    "unordered_list",
    "flatten_object",
    "default_from_api",
    "sensitive",
    "ignore_read",
    "diff_suppress_func",
    "state_func",
    "custom_expand",
    "custom_flatten",
    "set_hash_func",
    "key_expander",
    "conflicts_with",
    "at_least_one_of",
    "exactly_one_of",
    "update_mask_fields",
    "validation",
];

/// Attribute whitelist of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfile {
    pub id: String,
    pub resource_fields: BTreeSet<String>,
    pub property_fields: BTreeSet<String>,
}

impl TargetProfile {
    /// Profile allowing only the attributes common to every target
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_fields: BASE_RESOURCE_FIELDS.iter().map(|s| s.to_string()).collect(),
            property_fields: BASE_PROPERTY_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_resource_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_property_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn allows_product_field(&self, field: &str) -> bool {
        PRODUCT_FIELDS.contains(&field)
    }

    pub fn allows_resource_field(&self, field: &str) -> bool {
        self.resource_fields.contains(field)
    }

    pub fn allows_property_field(&self, field: &str) -> bool {
        self.property_fields.contains(field)
    }

    pub fn terraform() -> Self {
        Self::new("terraform")
            .with_resource_fields(RESOURCE_CUSTOMIZATION_FIELDS)
            .with_property_fields(PROPERTY_CUSTOMIZATION_FIELDS)
    }

    pub fn ansible() -> Self {
        Self::new("ansible")
            .with_resource_fields(["legacy_name"])
            .with_property_fields([
                "unordered_list",
                "default_from_api",
                "sensitive",
                "ignore_read",
            ])
    }

    pub fn inspec() -> Self {
        Self::new("inspec")
            .with_resource_fields(["legacy_name"])
            .with_property_fields(["flatten_object"])
    }
}

/// Target profiles keyed by id
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    profiles: BTreeMap<String, TargetProfile>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `terraform`, `ansible` and `inspec` profiles
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(TargetProfile::terraform());
        registry.register(TargetProfile::ansible());
        registry.register(TargetProfile::inspec());
        registry
    }

    /// Add a profile, replacing any profile with the same id
    pub fn register(&mut self, profile: TargetProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, id: &str) -> Result<&TargetProfile> {
        self.profiles
            .get(id)
            .ok_or_else(|| CompileError::UnknownTarget(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &TargetProfile> {
        self.profiles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let registry = TargetRegistry::builtin();
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["ansible", "inspec", "terraform"]);

        let terraform = registry.get("terraform").unwrap();
        assert!(terraform.allows_property_field("is_set"));
        assert!(terraform.allows_resource_field("mutex"));

        let ansible = registry.get("ansible").unwrap();
        assert!(ansible.allows_property_field("description"));
        assert!(!ansible.allows_property_field("is_set"));
    }

    #[test]
    fn test_unknown_target() {
        let registry = TargetRegistry::builtin();
        assert!(matches!(
            registry.get("pulumi"),
            Err(CompileError::UnknownTarget(ref id)) if id == "pulumi"
        ));
    }

    #[test]
    fn test_register_custom_profile() {
        let mut registry = TargetRegistry::builtin();
        registry.register(TargetProfile::new("pulumi").with_property_fields(["sensitive"]));
        let pulumi = registry.get("pulumi").unwrap();
        assert!(pulumi.allows_property_field("sensitive"));
        assert!(pulumi.allows_property_field("default_value"));
        assert!(!pulumi.allows_resource_field("mutex"));
    }
}
