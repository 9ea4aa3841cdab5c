//! Fixture Dependency Graph
//!
//! Builds the smallest self-consistent set of instances needed to exercise
//! one resource: the resource itself plus every resource it transitively
//! references. Instances are grouped into one bucket per resource type and
//! buckets are emitted dependencies first.
//!
//! Every instance carries a seed. Identical `(product, root, seed)` input
//! always yields an identical plan.

pub mod values;

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::api::{Product, Property, PropertyKind, ReferenceTarget, Resource};
use crate::error::{CompileError, Result};
use crate::path::NodePath;

pub use values::{materialize, MaterializedInstance};

/// Number of distinct instances a referenced type is bounded to
pub const REFERENCE_MODULUS: u64 = 3;

// =============================================================================
// Instances and buckets
// =============================================================================

/// One generated object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub resource: String,
    pub seed: u64,
    /// Property whose reference created the instance; `None` for the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

/// All instances of one resource type, sorted and deduplicated by seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeBucket {
    pub resource: String,
    pub instances: Vec<Instance>,
    /// Types referenced from this one, in discovery order
    pub children: Vec<String>,
}

impl TypeBucket {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            instances: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Insert keeping seed order. An instance whose seed is already present
    /// is the same logical instance and is dropped; returns whether it was new.
    pub fn insert(&mut self, instance: Instance) -> bool {
        match self.instances.binary_search_by_key(&instance.seed, |i| i.seed) {
            Ok(_) => false,
            Err(pos) => {
                self.instances.insert(pos, instance);
                true
            }
        }
    }

    fn add_child(&mut self, child: &str) {
        if !self.children.iter().any(|c| c == child) {
            self.children.push(child.to_string());
        }
    }
}

// =============================================================================
// Property selection
// =============================================================================

/// Which properties of an instance are expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Full create of the root: every non-output property
    Present,
    /// Referenced instance: required properties plus `name`
    Resource,
    /// Array item: required properties except `name`
    Title,
    /// Deletion: required properties plus `name`
    Absent,
}

impl Scope {
    pub fn selects(&self, property: &Property) -> bool {
        if property.exclude {
            return false;
        }
        match self {
            Self::Present => !property.output,
            Self::Resource | Self::Absent => property.required || property.is_name(),
            Self::Title => property.required && !property.is_name(),
        }
    }
}

// =============================================================================
// Array sizing
// =============================================================================

/// Number of synthesized entries for an array property
pub trait ArraySizer {
    fn size(&self, property: &Property, seed: u64) -> usize;
}

/// Every array gets the same number of entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSize(pub usize);

impl Default for FixedSize {
    fn default() -> Self {
        Self(1)
    }
}

impl ArraySizer for FixedSize {
    fn size(&self, _property: &Property, _seed: u64) -> usize {
        self.0
    }
}

/// Size derived from the property name and seed, between 2 and 5.
/// Arrays that hold references are kept within [`REFERENCE_MODULUS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeededSize;

impl ArraySizer for SeededSize {
    fn size(&self, property: &Property, seed: u64) -> usize {
        let size = 2 + (values::integer_value(&property.name, seed).unsigned_abs() % 4) as usize;
        if holds_references(property) {
            1 + size % REFERENCE_MODULUS as usize
        } else {
            size
        }
    }
}

/// Whether a property is, or transitively contains, a reference
pub fn holds_references(property: &Property) -> bool {
    match &property.kind {
        PropertyKind::ResourceRef { .. } => true,
        PropertyKind::Array { item_type, .. } => holds_references(item_type),
        PropertyKind::NestedObject { properties } => properties.iter().any(holds_references),
        _ => false,
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Ordered output of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixturePlan {
    pub root: String,
    pub seed: u64,
    pub scope: Scope,
    /// Buckets, every one after the buckets it references
    pub buckets: Vec<TypeBucket>,
}

impl FixturePlan {
    /// Flattened instance sequence
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.buckets.iter().flat_map(|b| b.instances.iter())
    }

    pub fn bucket_names(&self) -> Vec<&str> {
        self.buckets.iter().map(|b| b.resource.as_str()).collect()
    }

    pub fn bucket(&self, resource: &str) -> Option<&TypeBucket> {
        self.buckets.iter().find(|b| b.resource == resource)
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct FixtureBuilder<'a> {
    product: &'a Product,
    sizer: Box<dyn ArraySizer + 'a>,
}

impl<'a> FixtureBuilder<'a> {
    pub fn new(product: &'a Product) -> Self {
        Self {
            product,
            sizer: Box::new(FixedSize::default()),
        }
    }

    pub fn with_sizer(mut self, sizer: impl ArraySizer + 'a) -> Self {
        self.sizer = Box::new(sizer);
        self
    }

    /// Sizer chosen at runtime, e.g. from configuration
    pub fn with_boxed_sizer(mut self, sizer: Box<dyn ArraySizer + 'a>) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn sizer(&self) -> &dyn ArraySizer {
        self.sizer.as_ref()
    }

    /// Plan for a full create of `root`
    pub fn build(&self, root: &str, seed: u64) -> Result<FixturePlan> {
        self.build_scoped(root, seed, Scope::Present)
    }

    pub fn build_scoped(&self, root: &str, seed: u64, scope: Scope) -> Result<FixturePlan> {
        let resource = self.resolve(&NodePath::root(), root)?;
        let mut expansion = Expansion::new(self.product, self.sizer.as_ref());
        expansion.bucket(root).insert(Instance {
            resource: root.to_string(),
            seed,
            property: None,
        });
        expansion.expand_resource(resource, seed, scope)?;

        let buckets = expansion.into_ordered(root);
        debug!(root, seed, buckets = buckets.len(), "Built fixture plan");
        Ok(FixturePlan {
            root: root.to_string(),
            seed,
            scope,
            buckets,
        })
    }

    /// Plan materialized into request bodies
    pub fn materialize(&self, plan: &FixturePlan) -> Result<Vec<MaterializedInstance>> {
        materialize(self.product, plan, self.sizer.as_ref())
    }

    fn resolve(&self, path: &NodePath, name: &str) -> Result<&'a Resource> {
        self.product
            .resource(name)
            .ok_or_else(|| CompileError::UnresolvedReference {
                path: path.to_string(),
                resource: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Mutable state of one build pass
struct Expansion<'p, 's> {
    product: &'p Product,
    sizer: &'s dyn ArraySizer,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    buckets: BTreeMap<String, TypeBucket>,
    /// Resource types currently being expanded, innermost last
    stack: Vec<String>,
}

impl<'p, 's> Expansion<'p, 's> {
    fn new(product: &'p Product, sizer: &'s dyn ArraySizer) -> Self {
        Self {
            product,
            sizer,
            graph: DiGraph::new(),
            nodes: HashMap::new(),
            buckets: BTreeMap::new(),
            stack: Vec::new(),
        }
    }

    fn node(&mut self, resource: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(resource) {
            return *idx;
        }
        let idx = self.graph.add_node(resource.to_string());
        self.nodes.insert(resource.to_string(), idx);
        idx
    }

    fn bucket(&mut self, resource: &str) -> &mut TypeBucket {
        self.node(resource);
        self.buckets
            .entry(resource.to_string())
            .or_insert_with(|| TypeBucket::new(resource))
    }

    fn expand_resource(&mut self, resource: &'p Resource, seed: u64, scope: Scope) -> Result<()> {
        trace!(resource = %resource.name, seed, ?scope, "Expanding instance");
        self.stack.push(resource.name.clone());
        let path = NodePath::new(resource.name.as_str());
        for property in resource.all_user_properties().filter(|p| scope.selects(p)) {
            self.expand_property(&resource.name, property, seed, scope, &path)?;
        }
        self.stack.pop();
        Ok(())
    }

    fn expand_property(
        &mut self,
        owner: &str,
        property: &'p Property,
        seed: u64,
        scope: Scope,
        parent: &NodePath,
    ) -> Result<()> {
        let here = parent.field(property.name.as_str());
        match &property.kind {
            PropertyKind::ResourceRef { resources } => {
                if let Some(target) = resources.first() {
                    self.reference(owner, target, seed % REFERENCE_MODULUS, &here)?;
                }
            }
            PropertyKind::NestedObject { properties } => {
                for child in properties.iter().filter(|p| scope.selects(p)) {
                    self.expand_property(owner, child, seed, scope, &here)?;
                }
            }
            PropertyKind::Array { item_type, .. } => match &item_type.kind {
                PropertyKind::NestedObject { properties } => {
                    let k = self.sizer.size(property, seed) as u64;
                    for index in 1..=k {
                        let item_seed = seed.wrapping_add(index - 1);
                        let item_path = here.index((index - 1) as usize);
                        for child in properties.iter().filter(|p| Scope::Title.selects(p)) {
                            self.expand_property(owner, child, item_seed, Scope::Title, &item_path)?;
                        }
                    }
                }
                PropertyKind::ResourceRef { resources } => {
                    if let Some(target) = resources.first() {
                        let k = self.sizer.size(property, seed) as u64;
                        for j in 0..k {
                            let ref_seed = seed.wrapping_add(k - 1 - j) % REFERENCE_MODULUS;
                            self.reference(owner, target, ref_seed, &here.index(j as usize))?;
                        }
                    }
                }
                _ => {}
            },
            PropertyKind::String
            | PropertyKind::Integer
            | PropertyKind::Double
            | PropertyKind::Boolean
            | PropertyKind::Enum { .. }
            | PropertyKind::KeyValuePairs { .. } => {}
        }
        Ok(())
    }

    fn reference(
        &mut self,
        owner: &str,
        target: &ReferenceTarget,
        seed: u64,
        path: &NodePath,
    ) -> Result<()> {
        let product = self.product;
        let resource = product
            .resource(&target.resource)
            .ok_or_else(|| CompileError::UnresolvedReference {
                path: path.to_string(),
                resource: target.resource.clone(),
            })?;

        let parent = self.node(owner);
        let child = self.node(&resource.name);
        self.graph.update_edge(parent, child, ());
        self.bucket(owner).add_child(&resource.name);

        let inserted = self.bucket(&resource.name).insert(Instance {
            resource: resource.name.clone(),
            seed,
            property: Some(path.to_string()),
        });

        if resource.name == owner {
            trace!(resource = %owner, "Self reference, not expanding");
            return Ok(());
        }
        if self.stack.iter().any(|r| *r == resource.name) {
            debug!(from = %owner, to = %resource.name, "Reference cycle, not expanding");
            return Ok(());
        }
        if inserted {
            self.expand_resource(resource, seed, Scope::Resource)?;
        }
        Ok(())
    }

    /// Depth-first post-order from the root: every bucket after its children.
    /// A node revisited while in progress closes a cycle and is skipped.
    fn into_ordered(mut self, root: &str) -> Vec<TypeBucket> {
        let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
        let mut order: Vec<NodeIndex> = Vec::new();

        let root_idx = self.node(root);
        let mut starts = vec![root_idx];
        starts.extend(self.graph.node_indices().filter(|i| *i != root_idx));
        for start in starts {
            self.visit(start, &mut marks, &mut order);
        }

        order
            .into_iter()
            .filter_map(|idx| self.buckets.remove(&self.graph[idx]))
            .collect()
    }

    fn visit(&self, node: NodeIndex, marks: &mut HashMap<NodeIndex, Mark>, order: &mut Vec<NodeIndex>) {
        match marks.get(&node) {
            Some(Mark::Done) => return,
            Some(Mark::InProgress) => {
                debug!(resource = %self.graph[node], "Cycle in fixture graph");
                return;
            }
            None => {}
        }
        marks.insert(node, Mark::InProgress);

        let mut children: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        children.sort();
        for child in children {
            self.visit(child, marks, order);
        }

        marks.insert(node, Mark::Done);
        order.push(node);
    }
}
