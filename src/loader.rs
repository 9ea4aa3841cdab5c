//! Schema document loading
//!
//! A product lives in its own directory:
//!
//! ```text
//! products/
//! └── compute/
//!     ├── product.yaml      # product, optionally with inline resources
//!     ├── resources/        # one resource per file, appended in file-name order
//!     │   ├── Network.yaml
//!     │   └── Subnetwork.yaml
//!     ├── terraform.yaml    # override set for target `terraform`
//!     └── ansible.yaml
//! ```
//!
//! Any other top-level `*.yaml` file is the override set of the target named
//! by its file stem.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::api::{Product, Resource};
use crate::error::Result;
use crate::overrides::OverrideSet;

pub const PRODUCT_FILE: &str = "product.yaml";
pub const RESOURCES_DIR: &str = "resources";

/// A product directory as loaded from disk, not yet validated
#[derive(Debug, Clone)]
pub struct ProductSource {
    pub dir: PathBuf,
    pub product: Product,
    /// Override sets keyed by target id
    pub overrides: BTreeMap<String, OverrideSet>,
}

pub fn parse_product(text: &str) -> Result<Product> {
    Ok(serde_yaml::from_str(text)?)
}

pub fn parse_resource(text: &str) -> Result<Resource> {
    Ok(serde_yaml::from_str(text)?)
}

pub fn parse_overrides(text: &str) -> Result<OverrideSet> {
    if text.trim().is_empty() {
        return Ok(OverrideSet::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

pub fn load_product(path: &Path) -> Result<Product> {
    debug!(path = %path.display(), "Loading product");
    parse_product(&fs::read_to_string(path)?)
}

pub fn load_overrides(path: &Path) -> Result<OverrideSet> {
    debug!(path = %path.display(), "Loading overrides");
    parse_overrides(&fs::read_to_string(path)?)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

/// Load one product directory
pub fn load_dir(dir: &Path) -> Result<ProductSource> {
    let mut product = load_product(&dir.join(PRODUCT_FILE))?;

    let resources_dir = dir.join(RESOURCES_DIR);
    if resources_dir.is_dir() {
        for entry in WalkDir::new(&resources_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || !is_yaml(path) {
                continue;
            }
            debug!(path = %path.display(), "Loading resource");
            product.resources.push(parse_resource(&fs::read_to_string(path)?)?);
        }
    }

    let mut overrides = BTreeMap::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_yaml(path) || entry.file_name() == PRODUCT_FILE {
            continue;
        }
        if let Some(target) = path.file_stem().and_then(|s| s.to_str()) {
            overrides.insert(target.to_string(), load_overrides(path)?);
        }
    }

    info!(
        product = %product.name,
        resources = product.resources.len(),
        targets = overrides.len(),
        "Loaded product"
    );
    Ok(ProductSource {
        dir: dir.to_path_buf(),
        product,
        overrides,
    })
}

/// Find every product directory below `root`, in path order
pub fn discover(root: &Path) -> Result<Vec<ProductSource>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && entry.file_name() == PRODUCT_FILE {
            if let Some(dir) = entry.path().parent() {
                sources.push(load_dir(dir)?);
            }
        }
    }
    Ok(sources)
}
