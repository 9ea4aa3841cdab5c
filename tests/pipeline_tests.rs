//! Pipeline Tests
//!
//! Loads the product directories under tests/fixtures/products and runs them
//! through validation, target merges, rendering and fixture planning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use schema_compiler::compiler::write_all;
use schema_compiler::fixtures::FixedSize;
use schema_compiler::loader::{self, ProductSource};
use schema_compiler::{
    Checksum, CompileError, Compiler, FixtureBuilder, OverrideEngine, OverrideSet, Product, Scope,
    SnapshotRenderer, TargetRegistry,
};
use serde_json::json;

fn products_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/products")
}

fn source(name: &str) -> ProductSource {
    loader::load_dir(&products_path().join(name)).unwrap()
}

fn validated(name: &str) -> Product {
    let mut product = source(name).product;
    product.validate().unwrap();
    product
}

fn all_targets() -> Vec<String> {
    vec!["terraform".to_string(), "ansible".to_string(), "inspec".to_string()]
}

// =============================================================================
// Loading and validation
// =============================================================================

#[test]
fn test_discover_fixture_products() {
    let sources = loader::discover(&products_path()).unwrap();
    let names: Vec<&str> = sources.iter().map(|s| s.product.name.as_str()).collect();
    assert_eq!(names, vec!["compute", "storage"]);

    let compute = &sources[0];
    assert_eq!(
        compute.product.resources.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["Network", "Subnetwork"]
    );
    assert_eq!(compute.overrides.keys().collect::<Vec<_>>(), vec!["ansible", "terraform"]);
    assert_eq!(sources[1].overrides.keys().collect::<Vec<_>>(), vec!["terraform"]);
}

#[test]
fn test_validation_applies_defaults() {
    let compute = validated("compute");
    let network = compute.resource("Network").unwrap();
    assert_eq!(network.self_link.as_deref(), Some("projects/{{project}}/global/networks/{{name}}"));
    assert_eq!(network.create_verb.as_deref(), Some("POST"));
    assert_eq!(network.delete_verb.as_deref(), Some("DELETE"));
    assert_eq!(network.collection_url_key.as_deref(), Some("networks"));

    let subnetwork = compute.resource("Subnetwork").unwrap();
    assert!(subnetwork.is_async());
    let operation = subnetwork
        .async_operation
        .as_ref()
        .and_then(|op| op.operation.as_ref())
        .unwrap();
    assert_eq!(operation.poll_interval_ms, Some(1000));

    let storage = validated("storage");
    assert_eq!(storage.version_names(), vec!["ga"]);
}

#[test]
fn test_validation_is_idempotent() {
    let once = validated("compute");
    let mut twice = once.clone();
    twice.validate().unwrap();
    assert_eq!(once, twice);
    assert_eq!(Checksum::of(&once).unwrap(), Checksum::of(&twice).unwrap());
}

#[test]
fn test_fingerprint_stable_across_loads() {
    let first = Checksum::of(&validated("compute")).unwrap();
    let second = validated("compute");
    assert!(first.verify(&second).unwrap());
    assert_ne!(first, Checksum::of(&validated("storage")).unwrap());
}

#[test]
fn test_for_version_excludes_newer_properties() {
    let compute = validated("compute");
    let ga = compute.for_version("ga").unwrap();
    let beta = compute.for_version("beta").unwrap();

    let access = |p: &Product| {
        p.resource("Subnetwork")
            .unwrap()
            .properties
            .iter()
            .find(|prop| prop.name == "privateIpv6GoogleAccess")
            .unwrap()
            .exclude
    };
    assert!(access(&ga));
    assert!(!access(&beta));
    assert!(compute.for_version("alpha").is_err());
}

// =============================================================================
// Target compilation
// =============================================================================

#[test]
fn test_compile_compute_for_all_targets() {
    let source = source("compute");
    let registry = TargetRegistry::builtin();
    let renderer = SnapshotRenderer::default();
    let compiler = Compiler::new(&registry, &renderer);

    let compiled = compiler
        .compile(&source.product, &all_targets(), &source.overrides)
        .unwrap();
    let by_target: BTreeMap<&str, &Product> =
        compiled.iter().map(|c| (c.target.as_str(), &c.product)).collect();

    let terraform = by_target["terraform"];
    let subnetwork = terraform.resource("Subnetwork").unwrap();
    assert_eq!(
        subnetwork.description.as_deref(),
        Some("A VPC network is a virtual version of a physical network. Each subnetwork belongs to exactly one network.")
    );
    let ranges = subnetwork.property("secondaryIpRanges").unwrap();
    assert_eq!(ranges.customization.is_set, Some(true));
    let range_name = &ranges.kind.nested_properties().unwrap()[0];
    assert_eq!(
        range_name.description.as_deref(),
        Some("The name associated with this subnetwork secondary range.")
    );
    assert_eq!(
        subnetwork.property("logConfig").unwrap().customization.flatten_object,
        Some(true)
    );

    let network = terraform.resource("Network").unwrap();
    assert_eq!(
        network.customization.mutex.as_deref(),
        Some("projects/{{project}}/global/networks")
    );
    let auto_create = network.property("autoCreateSubnetworks").unwrap();
    assert_eq!(auto_create.default_value, None);
    assert_eq!(auto_create.customization.default_from_api, Some(true));

    let ansible = by_target["ansible"].resource("Subnetwork").unwrap();
    assert_eq!(ansible.customization.legacy_name.as_deref(), Some("gcp_compute_subnetwork"));
    assert_eq!(
        ansible.property("secondaryIpRanges").unwrap().customization.unordered_list,
        Some(true)
    );
    assert_eq!(
        ansible.description.as_deref(),
        Some("A VPC network is a virtual version of a physical network.")
    );

    // No override set: the target sees the validated base
    assert_eq!(by_target["inspec"], &validated("compute"));
}

#[test]
fn test_compile_leaves_base_untouched() {
    let source = source("compute");
    let before = source.product.clone();
    let registry = TargetRegistry::builtin();
    let renderer = SnapshotRenderer::default();
    Compiler::new(&registry, &renderer)
        .compile(&source.product, &all_targets(), &source.overrides)
        .unwrap();
    assert_eq!(source.product, before);
}

#[test]
fn test_product_override_and_customizations() {
    let source = source("storage");
    let registry = TargetRegistry::builtin();
    let merged = OverrideEngine::new(&registry)
        .apply(&validated("storage"), &source.overrides["terraform"], "terraform")
        .unwrap();

    assert_eq!(merged.display_name.as_deref(), Some("Cloud Storage (Terraform)"));
    let bucket = merged.resource("Bucket").unwrap();
    // Only the marker of the overridden attribute is replaced
    assert_eq!(bucket.customization.id_format.as_deref(), Some("{{name}}"));
    assert_eq!(bucket.property("labels").unwrap().customization.sensitive, Some(false));
}

#[test]
fn test_rejected_target_produces_no_output() {
    let source = source("compute");
    let mut overrides = source.overrides.clone();
    overrides.insert(
        "inspec".to_string(),
        loader::parse_overrides("resources:\n  Network:\n    mutex: lock\n").unwrap(),
    );

    let registry = TargetRegistry::builtin();
    let renderer = SnapshotRenderer::default();
    let result = Compiler::new(&registry, &renderer).compile(&source.product, &all_targets(), &overrides);
    match result {
        Err(CompileError::UnknownOverrideField { path, field, target }) => {
            assert_eq!(path, "Network");
            assert_eq!(field, "mutex");
            assert_eq!(target, "inspec");
        }
        other => panic!("Expected UnknownOverrideField, got {:?}", other.map(|c| c.len())),
    }
}

#[test]
fn test_illegal_marker_from_yaml() {
    let overrides: OverrideSet = loader::parse_overrides(
        "resources:\n  Network:\n    properties:\n      mtu:\n        is_set: true\n",
    )
    .unwrap();
    let registry = TargetRegistry::builtin();
    let err = OverrideEngine::new(&registry)
        .apply(&validated("compute"), &overrides, "terraform")
        .unwrap_err();
    assert!(matches!(err, CompileError::IllegalOverride { ref path, .. } if path == "Network.mtu"));
}

#[test]
fn test_write_compiled_storage() {
    let source = source("storage");
    let registry = TargetRegistry::builtin();
    let renderer = SnapshotRenderer::default();
    let compiled = Compiler::new(&registry, &renderer)
        .compile(&source.product, &["terraform".to_string()], &source.overrides)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = write_all(&compiled, dir.path()).unwrap();
    assert_eq!(written.len(), 3);

    let root = dir.path().join("terraform/storage");
    assert!(root.join("bucket_access_control.json").exists());
    let bucket: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(root.join("bucket.json")).unwrap()).unwrap();
    assert_eq!(bucket["name"], json!("Bucket"));
    assert_eq!(bucket["customization"]["id_format"], json!("{{name}}"));
}

// =============================================================================
// Fixtures
// =============================================================================

#[test]
fn test_subnetwork_fixture_plan() {
    let compute = validated("compute");
    let builder = FixtureBuilder::new(&compute);
    let plan = builder.build("Subnetwork", 4).unwrap();

    assert_eq!(plan.bucket_names(), vec!["Network", "Subnetwork"]);
    let network = plan.bucket("Network").unwrap();
    assert_eq!(network.instances.iter().map(|i| i.seed).collect::<Vec<_>>(), vec![1]);
    assert_eq!(network.instances[0].property.as_deref(), Some("Subnetwork.network"));

    let bodies = builder.materialize(&plan).unwrap();
    assert_eq!(
        bodies[0].body,
        json!({"project": "test project#1 data", "name": "test name#1 data"})
    );
    let subnetwork = &bodies[1].body;
    assert_eq!(subnetwork["network"], json!("resource(network,1)"));
    assert_eq!(subnetwork["logConfig"], json!({"aggregationInterval": "INTERVAL_5_SEC"}));
    assert_eq!(
        subnetwork["secondaryIpRanges"],
        json!([{"rangeName": "test rangeName#4 data", "ipCidrRange": "test ipCidrRange#4 data"}])
    );
}

#[test]
fn test_fixture_plans_are_deterministic() {
    let compute = validated("compute");
    let builder = FixtureBuilder::new(&compute);
    let first = builder.build("Subnetwork", 5).unwrap();
    let second = builder.build("Subnetwork", 5).unwrap();
    assert_eq!(first, second);
    assert_eq!(Checksum::of(&first).unwrap(), Checksum::of(&second).unwrap());
    assert_eq!(builder.materialize(&first).unwrap(), builder.materialize(&second).unwrap());

    let other = builder.build("Subnetwork", 6).unwrap();
    assert_eq!(other.bucket("Network").unwrap().instances[0].seed, 0);
    assert_ne!(Checksum::of(&first).unwrap(), Checksum::of(&other).unwrap());
}

#[test]
fn test_absent_scope_fixture() {
    let compute = validated("compute");
    let builder = FixtureBuilder::new(&compute).with_sizer(FixedSize(2));
    let plan = builder.build_scoped("Subnetwork", 2, Scope::Absent).unwrap();
    let bodies = builder.materialize(&plan).unwrap();
    let body = bodies[1].body.as_object().unwrap();
    let mut keys: Vec<&str> = body.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["ipCidrRange", "name", "network", "region"]);
}

#[test]
fn test_storage_fixture_dependencies_first() {
    let storage = validated("storage");
    let builder = FixtureBuilder::new(&storage);
    let plan = builder.build("BucketAccessControl", 7).unwrap();
    assert_eq!(plan.bucket_names(), vec!["Bucket", "BucketAccessControl"]);

    let bodies = builder.materialize(&plan).unwrap();
    assert_eq!(bodies[0].body, json!({"name": "test name#1 data"}));
    assert_eq!(bodies[1].body["bucket"], json!("resource(bucket,1)"));
    assert_eq!(bodies[1].body["role"], json!("READER"));
}

#[test]
fn test_fixtures_follow_target_overrides() {
    let source = source("compute");
    let base = validated("compute");
    let registry = TargetRegistry::builtin();
    let terraform = OverrideEngine::new(&registry)
        .apply(&base, &source.overrides["terraform"], "terraform")
        .unwrap();

    let body = |product: &Product| {
        let builder = FixtureBuilder::new(product);
        let plan = builder.build("Network", 3).unwrap();
        builder.materialize(&plan).unwrap().remove(0).body
    };
    // The base default wins; terraform drops it, so the seeded value shows
    assert_eq!(body(&base)["autoCreateSubnetworks"], json!(true));
    assert_eq!(body(&terraform)["autoCreateSubnetworks"], json!(false));
}
