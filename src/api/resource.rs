//! Resources
//!
//! A resource is one manageable API object: its URLs, the verbs used to drive
//! it, its ordered properties and, for eventually consistent APIs, the
//! descriptor of the long-running operation its mutations return.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::types::{validate_properties, Property};
use crate::error::{CompileError, Result};
use crate::path::NodePath;
use crate::validate::{Validate, Validator};

pub const CREATE_VERBS: [&str; 3] = ["POST", "PUT", "PATCH"];
pub const READ_VERBS: [&str; 2] = ["GET", "POST"];
pub const UPDATE_VERBS: [&str; 3] = ["POST", "PUT", "PATCH"];
pub const DELETE_VERBS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

/// Default interval between two polls of an async operation
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// A manageable API object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// API kind, e.g. `compute#network`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Collection URL relative to the product base URL, with `{{placeholders}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Identity URL; defaults to `{base_url}/{{name}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclude: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_verb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_verb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_verb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_verb: Option<String>,

    /// Key of the item list in a collection response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_url_key: Option<String>,

    /// Properties that identify an instance; `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Vec<String>>,

    #[serde(rename = "async", default, skip_serializing_if = "Option::is_none")]
    pub async_operation: Option<AsyncOperation>,

    /// URL parameters that are not part of the request body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Property>,

    #[serde(default)]
    pub properties: Vec<Property>,

    /// Target-specific attributes, only ever set by an override merge
    #[serde(default, skip_serializing_if = "ResourceCustomization::is_empty")]
    pub customization: ResourceCustomization,
}

/// Target-specific resource attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCustomization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_format: Option<Vec<String>>,
    /// Lock name serializing mutations of instances sharing it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_delete: Option<bool>,
}

impl ResourceCustomization {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Long-running operation returned by mutations of an async resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncOperation {
    #[serde(default)]
    pub operation: Option<OperationSpec>,
    #[serde(default)]
    pub result: Option<ResultSpec>,
    #[serde(default)]
    pub status: Option<StatusSpec>,
    #[serde(default)]
    pub error: Option<ErrorSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Field of the operation holding its id
    #[serde(default)]
    pub id_field: Option<String>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSpec {
    #[serde(default)]
    pub field: Option<String>,
    /// Whether the result field holds the resource itself rather than a link
    #[serde(default)]
    pub returns_resource: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSpec {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub complete_value: Option<String>,
    #[serde(default)]
    pub possible_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSpec {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub message_field: Option<String>,
}

impl Validate for AsyncOperation {
    fn validate(&mut self, v: &Validator, path: &NodePath) -> Result<()> {
        let operation = self.operation.as_mut().ok_or_else(|| CompileError::MissingField {
            path: path.to_string(),
            field: "operation".to_string(),
        })?;
        let op_path = path.field("operation");
        v.check_required_str(&op_path, "id_field", &operation.id_field)?;
        v.check_default(&mut operation.poll_interval_ms, || DEFAULT_POLL_INTERVAL_MS);

        v.check_default(&mut self.result, || ResultSpec {
            field: None,
            returns_resource: false,
        });

        let status = v.check_required(path, "status", &self.status)?;
        let status_path = path.field("status");
        v.check_required_str(&status_path, "field", &status.field)?;
        let complete = v.check_required(&status_path, "complete_value", &status.complete_value)?;
        if !status.possible_values.is_empty() {
            v.check_oneof(&status_path, "complete_value", complete, &status.possible_values)?;
        }

        let error = v.check_required(path, "error", &self.error)?;
        let error_path = path.field("error");
        v.check_required_str(&error_path, "field", &error.field)?;
        v.check_required_str(&error_path, "message_field", &error.message_field)?;
        Ok(())
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").unwrap())
}

/// Placeholder names in a URL template, in order of first appearance
pub fn template_variables(template: &str) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    for cap in placeholder_pattern().captures_iter(template) {
        let name = cap[1].to_string();
        if !vars.contains(&name) {
            vars.push(name);
        }
    }
    vars
}

/// `Network` -> `networks`, `Policy` -> `policies`, `Address` -> `addresses`
pub fn collection_key(name: &str) -> String {
    let mut chars = name.chars();
    let mut camel = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => return String::new(),
    };
    let vowel_before_y = camel
        .chars()
        .rev()
        .nth(1)
        .map(|c| "aeiou".contains(c))
        .unwrap_or(false);
    if camel.ends_with('y') && !vowel_before_y {
        camel.pop();
        camel.push_str("ies");
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| camel.ends_with(s)) {
        camel.push_str("es");
    } else {
        camel.push('s');
    }
    camel
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: None,
            base_url: None,
            self_link: None,
            exclude: false,
            min_version: None,
            create_verb: None,
            read_verb: None,
            update_verb: None,
            delete_verb: None,
            collection_url_key: None,
            identity: None,
            async_operation: None,
            parameters: Vec::new(),
            properties: Vec::new(),
            customization: ResourceCustomization::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_parameter(mut self, parameter: Property) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Parameters followed by properties, excluding those marked `exclude`
    pub fn all_user_properties(&self) -> impl Iterator<Item = &Property> {
        self.parameters
            .iter()
            .chain(self.properties.iter())
            .filter(|p| !p.exclude)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.parameters
            .iter()
            .chain(self.properties.iter())
            .find(|p| p.name == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.parameters
            .iter_mut()
            .chain(self.properties.iter_mut())
            .find(|p| p.name == name)
    }

    /// Placeholders referenced by the collection and identity URLs
    pub fn url_variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for template in [&self.base_url, &self.self_link].into_iter().flatten() {
            for var in template_variables(template) {
                if !vars.contains(&var) {
                    vars.push(var);
                }
            }
        }
        vars
    }

    pub fn is_async(&self) -> bool {
        self.async_operation.is_some()
    }
}

impl Validate for Resource {
    fn validate(&mut self, v: &Validator, path: &NodePath) -> Result<()> {
        if self.name.is_empty() {
            return Err(CompileError::MissingField {
                path: path.to_string(),
                field: "name".to_string(),
            });
        }
        let here = path.field(&self.name);

        v.check_required_str(&here, "description", &self.description)?;
        let base_url = v.check_required(&here, "base_url", &self.base_url)?.clone();
        v.check_version(&here, "min_version", &self.min_version)?;

        v.check_default(&mut self.self_link, || format!("{}/{{{{name}}}}", base_url));
        v.check_default(&mut self.create_verb, || "POST".to_string());
        v.check_default(&mut self.read_verb, || "GET".to_string());
        v.check_default(&mut self.update_verb, || "PUT".to_string());
        v.check_default(&mut self.delete_verb, || "DELETE".to_string());
        let name = self.name.clone();
        v.check_default(&mut self.collection_url_key, || collection_key(&name));

        for (field, value, allowed) in [
            ("create_verb", &self.create_verb, &CREATE_VERBS[..]),
            ("read_verb", &self.read_verb, &READ_VERBS[..]),
            ("update_verb", &self.update_verb, &UPDATE_VERBS[..]),
            ("delete_verb", &self.delete_verb, &DELETE_VERBS[..]),
        ] {
            if let Some(verb) = value {
                v.check_oneof(&here, field, verb, allowed)?;
            }
        }

        v.check_unique_names(
            &here,
            self.parameters
                .iter()
                .chain(self.properties.iter())
                .map(|p| p.name.as_str()),
        )?;
        validate_properties(v, &here, &mut self.parameters)?;
        validate_properties(v, &here, &mut self.properties)?;

        if let Some(identity) = &self.identity {
            let names: Vec<&str> = self
                .parameters
                .iter()
                .chain(self.properties.iter())
                .map(|p| p.name.as_str())
                .collect();
            v.check_list_allowed(&here, "identity", identity.as_slice(), &names)?;
        }

        if let Some(op) = &mut self.async_operation {
            op.validate(v, &here.field("async"))?;
        }
        Ok(())
    }
}
