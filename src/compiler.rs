//! Compile pipeline
//!
//! For one product and a set of targets:
//!
//! ```text
//! base ──validate──▶ base' ──┬─ merge(terraform) ─ revalidate ─ render
//!                            ├─ merge(ansible)   ─ revalidate ─ render
//!                            └─ merge(inspec)    ─ revalidate ─ render
//! ```
//!
//! Every target is merged from the same validated base. Nothing is returned
//! for a run in which any target fails; callers write output only after the
//! whole run succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::api::Product;
use crate::checksum::Checksum;
use crate::error::Result;
use crate::overrides::{OverrideEngine, OverrideSet, TargetRegistry};
use crate::render::{RenderedTarget, Renderer};

/// Result of compiling one target
#[derive(Debug, Clone)]
pub struct CompiledTarget {
    pub target: String,
    pub product: Product,
    pub rendered: RenderedTarget,
    pub fingerprint: Checksum,
}

pub struct Compiler<'a> {
    targets: &'a TargetRegistry,
    renderer: &'a dyn Renderer,
}

impl<'a> Compiler<'a> {
    pub fn new(targets: &'a TargetRegistry, renderer: &'a dyn Renderer) -> Self {
        Self { targets, renderer }
    }

    /// Validated copy of a base product
    pub fn prepare(&self, base: &Product) -> Result<Product> {
        let mut prepared = base.clone();
        prepared.validate()?;
        Ok(prepared)
    }

    /// Merge and render a single target against an already validated base
    pub fn compile_target(
        &self,
        base: &Product,
        overrides: &OverrideSet,
        target: &str,
    ) -> Result<CompiledTarget> {
        let merged = OverrideEngine::new(self.targets).apply(base, overrides, target)?;
        let rendered = self.renderer.render(target, &merged)?;
        let fingerprint = Checksum::of(&merged)?;
        debug!(target_id = target, fingerprint = %fingerprint.short(), files = rendered.files.len(), "Compiled target");
        Ok(CompiledTarget {
            target: target.to_string(),
            product: merged,
            rendered,
            fingerprint,
        })
    }

    /// Compile every listed target. Targets without an override set are
    /// compiled from the base alone.
    pub fn compile(
        &self,
        base: &Product,
        targets: &[String],
        overrides: &BTreeMap<String, OverrideSet>,
    ) -> Result<Vec<CompiledTarget>> {
        let prepared = self.prepare(base)?;
        let empty = OverrideSet::default();
        let compiled = targets
            .iter()
            .map(|target| {
                let set = overrides.get(target).unwrap_or(&empty);
                self.compile_target(&prepared, set, target)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(product = %prepared.name, targets = compiled.len(), "Compiled product");
        Ok(compiled)
    }
}

/// Write every compiled target below `root`
pub fn write_all(compiled: &[CompiledTarget], root: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for target in compiled {
        written.extend(target.rendered.write_to(root)?);
    }
    Ok(written)
}
