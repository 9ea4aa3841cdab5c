//! Rendering
//!
//! A renderer turns one fully merged, validated product into the files of a
//! target. The compiler only ever hands a renderer a tree that passed
//! validation; producing target syntax is the renderer's business.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::api::Product;
use crate::error::Result;
use crate::fixtures::values::snake_case;

/// Files produced for one target, keyed by path relative to the output root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTarget {
    pub target: String,
    pub files: BTreeMap<PathBuf, String>,
}

impl RenderedTarget {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            files: BTreeMap::new(),
        }
    }

    /// Write every file below `root`, creating directories as needed
    pub fn write_to(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.files.len());
        for (relative, contents) in &self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents)?;
            debug!(path = %path.display(), "Wrote rendered file");
            written.push(path);
        }
        Ok(written)
    }
}

pub trait Renderer {
    fn render(&self, target: &str, product: &Product) -> Result<RenderedTarget>;
}

/// Renders the merged tree itself as JSON: one file per active resource
/// plus a product file, under `{target}/{product}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRenderer {
    pub pretty: bool,
}

impl Default for SnapshotRenderer {
    fn default() -> Self {
        Self { pretty: true }
    }
}

#[derive(Serialize)]
struct ProductSnapshot<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    versions: Vec<&'a str>,
    resources: Vec<&'a str>,
}

impl SnapshotRenderer {
    fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let mut text = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        text.push('\n');
        Ok(text)
    }
}

impl Renderer for SnapshotRenderer {
    fn render(&self, target: &str, product: &Product) -> Result<RenderedTarget> {
        let mut rendered = RenderedTarget::new(target);
        let dir = PathBuf::from(target).join(&product.name);

        let summary = ProductSnapshot {
            name: &product.name,
            display_name: product.display_name.as_deref(),
            versions: product.versions.iter().map(|v| v.name.as_str()).collect(),
            resources: product.active_resources().map(|r| r.name.as_str()).collect(),
        };
        rendered.files.insert(dir.join("product.json"), self.to_json(&summary)?);

        for resource in product.active_resources() {
            let file = format!("{}.json", snake_case(&resource.name));
            rendered.files.insert(dir.join(file), self.to_json(resource)?);
        }
        Ok(rendered)
    }
}
