//! Products
//!
//! A product groups the resources of one API together with the versions the
//! API is published at. Validating a product validates every resource in it
//! with references and version markers resolved against the product.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::resource::Resource;
use crate::api::types::Property;
use crate::error::{CompileError, Result};
use crate::path::NodePath;
use crate::validate::{Validate, Validator};

/// Version every product is published at when none are declared
pub const DEFAULT_VERSION: &str = "ga";

/// A published API version, ordered from most to least stable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Version {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub versions: Vec<Version>,

    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            versions: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.versions.push(version);
        self
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.iter_mut().find(|r| r.name == name)
    }

    /// Resources not marked `exclude`, in declaration order
    pub fn active_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.exclude)
    }

    pub fn version_names(&self) -> Vec<String> {
        if self.versions.is_empty() {
            return vec![DEFAULT_VERSION.to_string()];
        }
        self.versions.iter().map(|v| v.name.clone()).collect()
    }

    /// Validate the whole tree, applying defaults.
    pub fn validate(&mut self) -> Result<()> {
        let root = NodePath::root();
        if self.name.is_empty() {
            return Err(CompileError::MissingField {
                path: root.to_string(),
                field: "name".to_string(),
            });
        }
        if self.versions.is_empty() {
            self.versions.push(Version::new(DEFAULT_VERSION));
        }
        let validator = Validator::with_context(
            self.resources.iter().map(|r| r.name.clone()).collect::<BTreeSet<_>>(),
            self.version_names(),
        );
        validator.check_unique_names(&root.field("versions"), self.versions.iter().map(|v| v.name.as_str()))?;
        validator.check_unique_names(&root, self.resources.iter().map(|r| r.name.as_str()))?;

        for resource in self.resources.iter_mut() {
            resource.validate(&validator, &root)?;
        }
        debug!(product = %self.name, resources = self.resources.len(), "Validated product");
        Ok(())
    }

    /// Copy of this product as published at `version`.
    ///
    /// Resources and properties introduced at a less stable version are
    /// marked `exclude`. Versions are ordered as the product lists them.
    pub fn for_version(&self, version: &str) -> Result<Product> {
        let versions = self.version_names();
        let rank = |name: &str| versions.iter().position(|v| v == name);
        let target = rank(version).ok_or_else(|| CompileError::InvalidEnumValue {
            path: NodePath::root().field("versions").to_string(),
            index: None,
            value: version.to_string(),
        })?;
        let newer = |min: &Option<String>| {
            min.as_deref()
                .and_then(|m| rank(m))
                .map(|r| r > target)
                .unwrap_or(false)
        };

        fn mark(properties: &mut [Property], newer: &dyn Fn(&Option<String>) -> bool) {
            for property in properties.iter_mut() {
                if newer(&property.min_version) {
                    property.exclude = true;
                }
                if let Some(children) = property.kind.nested_properties_mut() {
                    mark(children, newer);
                }
            }
        }

        let mut copy = self.clone();
        for resource in copy.resources.iter_mut() {
            if newer(&resource.min_version) {
                resource.exclude = true;
            }
            mark(&mut resource.parameters, &newer);
            mark(&mut resource.properties, &newer);
        }
        Ok(copy)
    }
}
