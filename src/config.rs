//! Configuration management for the schema compiler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-compiler.toml)
//! - Environment variables (SCHEMA_COMPILER__*)
//!
//! ## Example config file (schema-compiler.toml):
//! ```toml
//! [fixtures]
//! seed = 0
//! array_size = "fixed"
//! fixed_size = 1
//!
//! [output]
//! directory = "generated"
//! format = "pretty"
//!
//! [targets]
//! enabled = ["terraform", "ansible"]
//!
//! [targets.profiles.pulumi]
//! property_fields = ["sensitive", "is_set"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::fixtures::{ArraySizer, FixedSize, SeededSize};
use crate::overrides::{TargetProfile, TargetRegistry};

/// Main configuration for the compiler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Fixture generation settings
    #[serde(default)]
    pub fixtures: FixturesConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Target selection and whitelist extensions
    #[serde(default)]
    pub targets: TargetsConfig,
}

/// Fixture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturesConfig {
    /// Seed used when none is given on the command line
    #[serde(default)]
    pub seed: u64,

    /// How many entries synthesized arrays get
    #[serde(default)]
    pub array_size: ArraySizePolicy,

    /// Entry count under the `fixed` policy
    #[serde(default = "default_fixed_size")]
    pub fixed_size: usize,
}

/// Array sizing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArraySizePolicy {
    #[default]
    Fixed,
    Seeded,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory rendered targets are written to
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// Output format (pretty or compact)
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// Targets compiled when none are named explicitly
    #[serde(default = "default_enabled_targets")]
    pub enabled: Vec<String>,

    /// Extra whitelist entries, keyed by target id. An unknown id declares a
    /// new target allowing the common attributes plus these.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileExtension>,
}

/// Whitelist additions for one target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileExtension {
    #[serde(default)]
    pub resource_fields: Vec<String>,
    #[serde(default)]
    pub property_fields: Vec<String>,
}

// Default value functions
fn default_fixed_size() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated")
}

fn default_enabled_targets() -> Vec<String> {
    vec!["terraform".to_string(), "ansible".to_string(), "inspec".to_string()]
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            array_size: ArraySizePolicy::Fixed,
            fixed_size: default_fixed_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            format: OutputFormat::Pretty,
        }
    }
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_targets(),
            profiles: BTreeMap::new(),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "schema-compiler.toml",
            ".schema-compiler.toml",
            "config/schema-compiler.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "schema-compiler", "schema-compiler") {
            let xdg_config = config_dir.config_dir().join("schema-compiler.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (SCHEMA_COMPILER__*)
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_COMPILER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the output directory (resolves relative paths)
    pub fn output_dir(&self) -> PathBuf {
        if self.output.directory.is_absolute() {
            self.output.directory.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.output.directory)
        }
    }

    /// Built-in target profiles with the configured extensions applied
    pub fn target_registry(&self) -> TargetRegistry {
        let mut registry = TargetRegistry::builtin();
        for (id, extension) in &self.targets.profiles {
            let base = registry
                .get(id)
                .cloned()
                .unwrap_or_else(|_| TargetProfile::new(id.as_str()));
            registry.register(
                base.with_resource_fields(extension.resource_fields.iter().cloned())
                    .with_property_fields(extension.property_fields.iter().cloned()),
            );
        }
        registry
    }

    /// Array sizer selected by `[fixtures]`
    pub fn sizer(&self) -> Box<dyn ArraySizer> {
        match self.fixtures.array_size {
            ArraySizePolicy::Fixed => Box::new(FixedSize(self.fixtures.fixed_size)),
            ArraySizePolicy::Seeded => Box::new(SeededSize),
        }
    }

    pub fn pretty(&self) -> bool {
        self.output.format == OutputFormat::Pretty
    }
}
