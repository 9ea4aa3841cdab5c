//! Fixture values
//!
//! Turns a [`FixturePlan`] into request bodies. Values are pure functions of
//! the property and the instance seed, so the same plan always materializes
//! to the same bodies. A declared default always wins.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::api::{Product, Property, PropertyKind};
use crate::error::{CompileError, Result};
use crate::fixtures::{ArraySizer, FixturePlan, Scope, REFERENCE_MODULUS};
use crate::path::NodePath;

/// An instance with its generated body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedInstance {
    pub resource: String,
    pub seed: u64,
    pub body: Value,
}

/// Materialize every instance of a plan, in plan order.
///
/// The root instance gets the plan's scope; every other instance only the
/// properties a referenced resource needs.
pub fn materialize(
    product: &Product,
    plan: &FixturePlan,
    sizer: &dyn ArraySizer,
) -> Result<Vec<MaterializedInstance>> {
    let mut out = Vec::new();
    for bucket in &plan.buckets {
        let resource = product
            .resource(&bucket.resource)
            .ok_or_else(|| CompileError::UnresolvedReference {
                path: NodePath::root().to_string(),
                resource: bucket.resource.clone(),
            })?;
        for instance in &bucket.instances {
            let scope = if instance.property.is_none() && bucket.resource == plan.root {
                plan.scope
            } else {
                Scope::Resource
            };
            let body = object_value(resource.all_user_properties(), instance.seed, scope, sizer);
            out.push(MaterializedInstance {
                resource: bucket.resource.clone(),
                seed: instance.seed,
                body,
            });
        }
    }
    Ok(out)
}

fn object_value<'p>(
    properties: impl Iterator<Item = &'p Property>,
    seed: u64,
    scope: Scope,
    sizer: &dyn ArraySizer,
) -> Value {
    let mut map = Map::new();
    for property in properties.filter(|p| scope.selects(p)) {
        map.insert(property.name.clone(), property_value(property, seed, scope, sizer));
    }
    Value::Object(map)
}

/// Value of one property at `seed`
pub fn property_value(property: &Property, seed: u64, scope: Scope, sizer: &dyn ArraySizer) -> Value {
    if let Some(default) = &property.default_value {
        return default.clone();
    }
    let name = property.name.as_str();
    match &property.kind {
        PropertyKind::String => json!(string_value(name, seed)),
        PropertyKind::Integer => json!(integer_value(name, seed)),
        PropertyKind::Double => json!(double_value(name, seed)),
        PropertyKind::Boolean => json!(seed % 2 == 0),
        PropertyKind::Enum { values } => {
            if values.is_empty() {
                Value::Null
            } else {
                json!(values[(seed % values.len() as u64) as usize])
            }
        }
        PropertyKind::ResourceRef { resources } => resources
            .first()
            .map(|t| json!(reference_value(&t.resource, seed % REFERENCE_MODULUS)))
            .unwrap_or(Value::Null),
        PropertyKind::NestedObject { properties } => object_value(properties.iter(), seed, scope, sizer),
        PropertyKind::Array { item_type, .. } => {
            let k = sizer.size(property, seed) as u64;
            let items: Vec<Value> = match &item_type.kind {
                PropertyKind::NestedObject { properties } => (0..k)
                    .map(|i| object_value(properties.iter(), seed.wrapping_add(i), Scope::Title, sizer))
                    .collect(),
                PropertyKind::ResourceRef { resources } => match resources.first() {
                    Some(target) => (0..k)
                        .map(|j| {
                            json!(reference_value(
                                &target.resource,
                                seed.wrapping_add(k - 1 - j) % REFERENCE_MODULUS
                            ))
                        })
                        .collect(),
                    None => Vec::new(),
                },
                _ => {
                    // scalar items are named after their array
                    let mut item = (**item_type).clone();
                    item.name = property.name.clone();
                    (0..k)
                        .map(|i| property_value(&item, seed.wrapping_add(i), scope, sizer))
                        .collect()
                }
            };
            Value::Array(items)
        }
        PropertyKind::KeyValuePairs { value_type, .. } => {
            let k = sizer.size(property, seed) as u64;
            let mut map = Map::new();
            for i in 1..=k {
                let entry_seed = seed.wrapping_add(i);
                let value = match value_type.as_deref() {
                    Some("Integer") => json!(integer_value(name, entry_seed)),
                    Some("Double") => json!(double_value(name, entry_seed)),
                    Some("Boolean") => json!(entry_seed % 2 == 0),
                    _ => json!(string_value(name, entry_seed)),
                };
                map.insert(string_value(name, entry_seed), value);
            }
            Value::Object(map)
        }
    }
}

pub fn string_value(name: &str, seed: u64) -> String {
    format!("test {}#{} data", name, seed)
}

/// Stable 32-bit hash of a property name
fn name_hash(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub fn integer_value(name: &str, seed: u64) -> i64 {
    let scaled = (name_hash(name) as u64)
        .saturating_mul(seed.saturating_add(1))
        .saturating_mul(67)
        / 100;
    scaled.min(i64::MAX as u64) as i64
}

pub fn double_value(name: &str, seed: u64) -> f64 {
    integer_value(name, seed) as f64 / 100.0
}

/// `resource(backend_service,1)` for `BackendService` at seed 1
pub fn reference_value(resource: &str, seed: u64) -> String {
    format!("resource({},{})", snake_case(resource), seed)
}

/// `BackendService` -> `backend_service`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Resource, Version};
    use crate::fixtures::{FixedSize, FixtureBuilder};

    fn product() -> Product {
        let network = Resource::new("Network")
            .with_description("A network.")
            .with_base_url("projects/{{project}}/global/networks")
            .with_property(Property::new("name", PropertyKind::String).required())
            .with_property(Property::new("autoCreateSubnetworks", PropertyKind::Boolean));
        let subnetwork = Resource::new("Subnetwork")
            .with_description("A subnetwork.")
            .with_base_url("projects/{{project}}/regions/{{region}}/subnetworks")
            .with_property(Property::new("name", PropertyKind::String).required())
            .with_property(Property::new("network", PropertyKind::reference("Network")).required())
            .with_property(
                Property::new("purpose", PropertyKind::enumeration(["PRIVATE", "INTERNAL_HTTPS_LOAD_BALANCER"]))
                    .with_default(json!("PRIVATE")),
            )
            .with_property(Property::new("mtu", PropertyKind::Integer))
            .with_property(Property::new("id", PropertyKind::Integer).output());
        let mut product = Product::new("compute")
            .with_version(Version::new("ga"))
            .with_resource(network)
            .with_resource(subnetwork);
        product.validate().unwrap();
        product
    }

    #[test]
    fn test_materialize_network_subnetwork() {
        let product = product();
        let builder = FixtureBuilder::new(&product);
        let plan = builder.build("Subnetwork", 4).unwrap();
        let bodies = builder.materialize(&plan).unwrap();

        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].resource, "Network");
        assert_eq!(bodies[0].body, json!({"name": "test name#1 data"}));

        let subnetwork = &bodies[1].body;
        assert_eq!(subnetwork["name"], json!("test name#4 data"));
        assert_eq!(subnetwork["network"], json!("resource(network,1)"));
        assert_eq!(subnetwork["purpose"], json!("PRIVATE"));
        assert_eq!(subnetwork["mtu"], json!(integer_value("mtu", 4)));
        assert!(subnetwork.get("id").is_none());
    }

    #[test]
    fn test_scalar_values() {
        let sizer = FixedSize(2);
        let flag = Property::new("enabled", PropertyKind::Boolean);
        assert_eq!(property_value(&flag, 2, Scope::Present, &sizer), json!(true));
        assert_eq!(property_value(&flag, 3, Scope::Present, &sizer), json!(false));

        let mode = Property::new("mode", PropertyKind::enumeration(["A", "B", "C"]));
        assert_eq!(property_value(&mode, 4, Scope::Present, &sizer), json!("B"));

        let tags = Property::new("tags", PropertyKind::array_of(PropertyKind::String));
        assert_eq!(
            property_value(&tags, 0, Scope::Present, &sizer),
            json!(["test tags#0 data", "test tags#1 data"])
        );
    }

    #[test]
    fn test_item_seeds_wrap_at_max() {
        let sizer = FixedSize(2);
        let tags = Property::new("tags", PropertyKind::array_of(PropertyKind::String));
        assert_eq!(
            property_value(&tags, u64::MAX, Scope::Present, &sizer),
            json!([format!("test tags#{} data", u64::MAX), "test tags#0 data"])
        );
        let labels = Property::new("labels", PropertyKind::map("Integer"));
        let map = property_value(&labels, u64::MAX, Scope::Present, &sizer);
        assert!(map.get("test labels#0 data").is_some());
        assert!(map.get("test labels#1 data").is_some());
    }

    #[test]
    fn test_values_are_stable() {
        assert_eq!(integer_value("sizeGb", 3), integer_value("sizeGb", 3));
        assert_ne!(integer_value("sizeGb", 3), integer_value("sizeGb", 4));
        assert_eq!(reference_value("BackendService", 1), "resource(backend_service,1)");
    }
}
