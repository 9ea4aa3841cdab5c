//! Schema Compiler CLI
//!
//! Validates product directories, merges target overrides, compiles targets
//! and plans fixtures.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use schema_compiler::compiler::write_all;
use schema_compiler::loader::{self, ProductSource};
use schema_compiler::{
    Checksum, Compiler, CompilerConfig, FixtureBuilder, OverrideEngine, Product, Scope,
    SnapshotRenderer,
};
use similar::{ChangeTag, TextDiff};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-compile")]
#[command(about = "Compile resource schemas into per-target trees")]
struct Cli {
    /// Config file (defaults to schema-compiler.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every product below a directory
    Validate {
        #[arg(default_value = "products")]
        dir: PathBuf,
    },

    /// Show a product merged for one target
    Merge {
        /// Product directory
        dir: PathBuf,
        #[arg(short, long)]
        target: String,
        /// Only print this resource
        #[arg(short, long)]
        resource: Option<String>,
        /// Print a line diff against the validated base instead
        #[arg(long)]
        diff: bool,
    },

    /// Compile products for the enabled targets
    Compile {
        #[arg(default_value = "products")]
        dir: PathBuf,
        /// Targets to compile (defaults to the configured ones)
        #[arg(short, long)]
        target: Vec<String>,
        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Compile without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Plan the fixture instances for a resource
    Fixtures {
        /// Product directory
        dir: PathBuf,
        #[arg(short, long)]
        resource: String,
        /// Plan against the product as merged for this target
        #[arg(short, long)]
        target: Option<String>,
        /// Root seed (defaults to the configured one)
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value_t = ScopeArg::Present)]
        scope: ScopeArg,
        /// Print request bodies instead of the plan
        #[arg(long)]
        materialize: bool,
    },

    /// List target profiles and their whitelists
    Targets,

    /// Print the effective configuration
    Config {
        /// Also write it to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Present,
    Absent,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Present => Scope::Present,
            ScopeArg::Absent => Scope::Absent,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref().and_then(Path::to_str);
    let config = CompilerConfig::load_from(config_path).context("loading configuration")?;

    match cli.command {
        Commands::Validate { dir } => validate(&dir),
        Commands::Merge {
            dir,
            target,
            resource,
            diff,
        } => merge(&config, &dir, &target, resource.as_deref(), diff),
        Commands::Compile {
            dir,
            target,
            output,
            dry_run,
        } => {
            let targets = if target.is_empty() {
                config.targets.enabled.clone()
            } else {
                target
            };
            let output = output.unwrap_or_else(|| config.output_dir());
            compile(&config, &dir, &targets, &output, dry_run)
        }
        Commands::Fixtures {
            dir,
            resource,
            target,
            seed,
            scope,
            materialize,
        } => {
            let seed = seed.unwrap_or(config.fixtures.seed);
            fixtures(
                &config,
                &dir,
                &resource,
                target.as_deref(),
                seed,
                scope.into(),
                materialize,
            )
        }
        Commands::Targets => {
            let registry = config.target_registry();
            for profile in registry.profiles() {
                println!("🎯 {}", profile.id);
                println!("   resource: {}", join(&profile.resource_fields));
                println!("   property: {}", join(&profile.property_fields));
            }
            Ok(())
        }
        Commands::Config { save } => {
            let text = toml::to_string_pretty(&config)?;
            println!("{}", text);
            if let Some(path) = save {
                let path = path.to_string_lossy();
                config.save(&path)?;
                println!("💾 Saved configuration to {}", path);
            }
            Ok(())
        }
    }
}

fn join<'a>(fields: impl IntoIterator<Item = &'a String>) -> String {
    fields.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn sources(dir: &Path) -> anyhow::Result<Vec<ProductSource>> {
    if dir.join(loader::PRODUCT_FILE).is_file() {
        return Ok(vec![loader::load_dir(dir)?]);
    }
    let found = loader::discover(dir)?;
    if found.is_empty() {
        bail!("no {} found below {}", loader::PRODUCT_FILE, dir.display());
    }
    Ok(found)
}

fn validated(source: &ProductSource) -> anyhow::Result<Product> {
    let mut product = source.product.clone();
    product
        .validate()
        .with_context(|| format!("validating {}", source.dir.display()))?;
    Ok(product)
}

fn validate(dir: &Path) -> anyhow::Result<()> {
    println!("🔍 Validating products in {}\n", dir.display());
    let mut failed = 0;
    for source in sources(dir)? {
        let mut product = source.product.clone();
        match product.validate() {
            Ok(()) => {
                let fingerprint = Checksum::of(&product)?;
                println!(
                    "   ✅ {} ({} resources) {}",
                    product.name,
                    product.resources.len(),
                    fingerprint.short()
                );
            }
            Err(e) => {
                failed += 1;
                println!("   ❌ {}: {}", source.product.name, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} product(s) failed validation", failed);
    }
    Ok(())
}

fn merge(
    config: &CompilerConfig,
    dir: &Path,
    target: &str,
    resource: Option<&str>,
    diff: bool,
) -> anyhow::Result<()> {
    let source = loader::load_dir(dir)?;
    let base = validated(&source)?;
    let registry = config.target_registry();
    let overrides = source.overrides.get(target).cloned().unwrap_or_default();
    let merged = OverrideEngine::new(&registry).apply(&base, &overrides, target)?;

    let (before, after) = match resource {
        Some(name) => {
            let before = base
                .resource(name)
                .with_context(|| format!("no resource {} in {}", name, base.name))?;
            let after = merged
                .resource(name)
                .with_context(|| format!("no resource {} in {}", name, merged.name))?;
            (
                serde_json::to_string_pretty(before)?,
                serde_json::to_string_pretty(after)?,
            )
        }
        None => (
            serde_json::to_string_pretty(&base)?,
            serde_json::to_string_pretty(&merged)?,
        ),
    };

    if !diff {
        println!("{}", after);
        return Ok(());
    }

    println!("📝 {} merged for {}\n", base.name, target);
    let text_diff = TextDiff::from_lines(&before, &after);
    let mut changed = 0;
    for change in text_diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        changed += 1;
        print!("{} {}", sign, change.value());
    }
    if changed == 0 {
        println!("✅ No changes");
    }
    Ok(())
}

fn compile(
    config: &CompilerConfig,
    dir: &Path,
    targets: &[String],
    output: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let registry = config.target_registry();
    let renderer = SnapshotRenderer {
        pretty: config.pretty(),
    };
    let compiler = Compiler::new(&registry, &renderer);

    let mut compiled = Vec::new();
    for source in sources(dir)? {
        println!("📦 {}", source.product.name);
        let targets_for_product = compiler
            .compile(&source.product, targets, &source.overrides)
            .with_context(|| format!("compiling {}", source.dir.display()))?;
        for target in &targets_for_product {
            println!(
                "   ✅ {} ({} files) {}",
                target.target,
                target.rendered.files.len(),
                target.fingerprint.short()
            );
        }
        compiled.extend(targets_for_product);
    }

    if dry_run {
        println!("\n🔍 Dry run, nothing written");
        return Ok(());
    }
    let written = write_all(&compiled, output)?;
    println!("\n💾 Wrote {} files to {}", written.len(), output.display());
    Ok(())
}

fn fixtures(
    config: &CompilerConfig,
    dir: &Path,
    resource: &str,
    target: Option<&str>,
    seed: u64,
    scope: Scope,
    materialize: bool,
) -> anyhow::Result<()> {
    let source = loader::load_dir(dir)?;
    let mut product = validated(&source)?;
    if let Some(target) = target {
        let registry = config.target_registry();
        let overrides = source.overrides.get(target).cloned().unwrap_or_default();
        product = OverrideEngine::new(&registry)
            .apply(&product, &overrides, target)
            .with_context(|| format!("merging {} for {}", product.name, target))?;
    }
    let builder = FixtureBuilder::new(&product).with_boxed_sizer(config.sizer());
    let plan = builder.build_scoped(resource, seed, scope)?;

    if materialize {
        let bodies = builder.materialize(&plan)?;
        println!("{}", serde_json::to_string_pretty(&bodies)?);
        return Ok(());
    }

    println!("🧪 Fixtures for {} (seed {})\n", plan.root, plan.seed);
    for bucket in &plan.buckets {
        let seeds: Vec<u64> = bucket.instances.iter().map(|i| i.seed).collect();
        println!("   {} {:?}", bucket.resource, seeds);
    }
    println!("\n   fingerprint {}", Checksum::of(&plan)?.short());
    Ok(())
}
