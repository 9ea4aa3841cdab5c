//! Schema Object Model
//!
//! Products, resources and properties as loaded from schema documents.
//! Every node implements [`Validate`](crate::validate::Validate); a product is
//! validated as a whole with [`Product::validate`].

pub mod product;
pub mod resource;
pub mod types;

pub use product::{Product, Version, DEFAULT_VERSION};
pub use resource::{
    AsyncOperation, ErrorSpec, OperationSpec, Resource, ResourceCustomization, ResultSpec,
    StatusSpec,
};
pub use types::{
    Property, PropertyCustomization, PropertyKind, ReferenceTarget, ValueValidation,
    DEFAULT_IMPORT, NAME_FIELD,
};
