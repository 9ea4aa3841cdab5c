//! Schema Compiler
//!
//! Compiles declarative resource schemas (an API surface described as
//! products, resources and typed properties) into trees ready for several
//! infrastructure-as-code targets.
//!
//! ## Features
//!
//! - **Self-validating model**: every node checks itself, applies defaults and
//!   reports the first violation with its dotted path
//! - **Target overrides**: per-target customizations merged onto a copy of the
//!   base, checked against the target's attribute whitelist
//! - **Fixture planning**: the minimal set of seeded instances needed to
//!   exercise a resource, ordered dependencies first
//! - **Fingerprints**: SHA256 checksums of merged trees and fixture plans
//!
//! ## Pipeline
//!
//! ```text
//! product.yaml ──▶ Product ──validate──▶ ┬─ OverrideEngine(terraform) ─▶ Renderer
//!                                        ├─ OverrideEngine(ansible)   ─▶ Renderer
//!                                        └─ FixtureBuilder ─▶ FixturePlan ─▶ bodies
//! ```

pub mod api;
pub mod checksum;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod loader;
pub mod overrides;
pub mod path;
pub mod render;
pub mod validate;

pub use api::{Product, Property, PropertyKind, Resource};
pub use checksum::Checksum;
pub use compiler::{CompiledTarget, Compiler};
pub use config::CompilerConfig;
pub use error::{CompileError, Result};
pub use fixtures::{FixtureBuilder, FixturePlan, Instance, Scope, TypeBucket};
pub use overrides::{OverrideEngine, OverrideSet, TargetProfile, TargetRegistry};
pub use path::NodePath;
pub use render::{RenderedTarget, Renderer, SnapshotRenderer};
pub use validate::{Validate, Validator};
