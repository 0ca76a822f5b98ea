//! NF-016: CLI subcommands (init, validate, graph, synthesize, verify-plan, lock, registry, clean).
//!
//! A thin shell over the core. Results go to stdout; diagnostics go through
//! `tracing`. Nothing here applies artifacts or talks to a cloud.

use crate::core::error::ForgeError;
use crate::core::settings::{Settings, DEFAULT_SETTINGS_FILE};
use crate::core::types::{LockEntry, ProviderId, VerificationAssertion, WorkloadSpec};
use crate::core::{builder, loader, verify};
use crate::lock::hasher;
use crate::lock::lockfile::Lockfile;
use crate::synth::cache::SynthesisCache;
use crate::synth::emit;
use crate::synth::pipeline::{CancelToken, Pipeline, SynthesisOutcome};
use crate::synth::registry::MappingRegistry;
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_WORKLOAD: &str = "workload.yaml";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new nebulaforge project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Target providers seeded into the workload, comma-separated
        #[arg(short, long, value_delimiter = ',', value_parser = ProviderId::new)]
        provider: Vec<ProviderId>,
    },

    /// Validate a workload document and build its resource graph
    Validate {
        /// Path to the workload document
        #[arg(short, long, default_value = DEFAULT_WORKLOAD)]
        file: PathBuf,
    },

    /// Show the resource graph in topological order
    Graph {
        /// Path to the workload document
        #[arg(short, long, default_value = DEFAULT_WORKLOAD)]
        file: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compile a workload into per-provider artifact trees
    Synthesize {
        /// Path to the workload document
        #[arg(short, long, default_value = DEFAULT_WORKLOAD)]
        file: PathBuf,

        /// Target providers, comma-separated (overrides the document)
        #[arg(short, long, value_delimiter = ',', value_parser = ProviderId::new)]
        targets: Vec<ProviderId>,

        /// Output directory (overrides the settings file)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Ignore the lockfile and regenerate every target
        #[arg(long)]
        force: bool,

        /// Walk targets one at a time
        #[arg(long)]
        sequential: bool,

        /// Keep the synthesis cache in memory only
        #[arg(long)]
        no_cache: bool,

        /// Settings file
        #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
        config: PathBuf,
    },

    /// Print the verification plan for an external live checker
    VerifyPlan {
        /// Path to the workload document
        #[arg(short, long, default_value = DEFAULT_WORKLOAD)]
        file: PathBuf,

        /// Bind assertions to these providers (default: the document's targets)
        #[arg(short, long, value_delimiter = ',', value_parser = ProviderId::new)]
        targets: Vec<ProviderId>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Inspect the synthesis lockfile
    Lock {
        #[command(subcommand)]
        action: LockAction,

        /// Settings file
        #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
        config: PathBuf,
    },

    /// List registered provider rule sets
    Registry {
        /// Settings file
        #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
        config: PathBuf,
    },

    /// Remove generated artifact trees and the synthesis cache
    Clean {
        /// Also delete the lockfile (the next run is a full synthesis)
        #[arg(long)]
        purge_lock: bool,

        /// Settings file
        #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Show the most recent entry
    Status {
        /// Restrict to one workload (`namespace/name`)
        #[arg(short, long)]
        workload: Option<String>,
    },

    /// List every entry, oldest first
    History {
        /// Show only the last N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), ForgeError> {
    match cmd {
        Commands::Init { path, provider } => cmd_init(&path, &provider),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Graph { file, json } => cmd_graph(&file, json),
        Commands::Synthesize {
            file,
            targets,
            out,
            force,
            sequential,
            no_cache,
            config,
        } => cmd_synthesize(&SynthesizeArgs {
            file,
            targets,
            out,
            force,
            sequential,
            no_cache,
            config,
        }),
        Commands::VerifyPlan {
            file,
            targets,
            json,
        } => cmd_verify_plan(&file, targets, json),
        Commands::Lock { action, config } => cmd_lock(&config, action),
        Commands::Registry { config } => cmd_registry(&config),
        Commands::Clean { purge_lock, config } => cmd_clean(&config, purge_lock),
    }
}

const WORKLOAD_TEMPLATE: &str = r#"apiVersion: infrastructure.nebulaforge.io/v1
kind: WorkloadCluster
metadata:
  name: primary-web
  namespace: default
spec:
  compute:
    nodes: 3
    instanceType: medium-ha
  networking:
    topology: mesh
    ingress:
      domains: [example.com]
  storage:
    persistent: true
    iopsClass: standard
"#;

const DEFAULT_TARGETS: &str = "aws, gcp";

const SETTINGS_TEMPLATE: &str = r#"[output]
dir = "outputs"

[lock]
path = "nebulaforge.lock"

[cache]
dir = ".nebulaforge/cache"

[registry]
extra_dirs = []

[registry.pins]

[synthesis]
parallel = true
"#;

fn cmd_init(path: &Path, providers: &[ProviderId]) -> Result<(), ForgeError> {
    let workload = path.join(DEFAULT_WORKLOAD);
    if workload.exists() {
        return Err(ForgeError::Usage(format!(
            "{} already exists",
            workload.display()
        )));
    }
    let settings = path.join(DEFAULT_SETTINGS_FILE);

    let targets = if providers.is_empty() {
        DEFAULT_TARGETS.to_string()
    } else {
        let ids: Vec<&str> = providers.iter().map(ProviderId::as_str).collect();
        ids.join(", ")
    };
    write_file(
        &workload,
        &format!("{WORKLOAD_TEMPLATE}  targets: [{targets}]\n"),
    )?;
    let wrote_settings = !settings.exists();
    if wrote_settings {
        write_file(&settings, SETTINGS_TEMPLATE)?;
    }

    println!("Initialized nebulaforge project at {}", path.display());
    println!("  Created: {}", workload.display());
    if wrote_settings {
        println!("  Created: {}", settings.display());
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), ForgeError> {
    let spec = loader::load_file(file)?;
    let graph = builder::build(&spec)?;
    println!(
        "OK: {} ({} resources, {} target(s), graph {})",
        graph.workload(),
        graph.len(),
        spec.targets.len(),
        hasher::short(&graph.hash(), 16)
    );
    Ok(())
}

fn cmd_graph(file: &Path, json: bool) -> Result<(), ForgeError> {
    let spec = loader::load_file(file)?;
    let graph = builder::build(&spec)?;

    if json {
        let resources: Vec<_> = graph.iter().collect();
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    println!("Graph: {} ({} resources)", graph.workload(), graph.len());
    println!("Hash:  {}", graph.hash());
    for (i, r) in graph.iter().enumerate() {
        let deps: Vec<&str> = r.depends_on.iter().map(String::as_str).collect();
        if deps.is_empty() {
            println!("  {:>3}. {} [{}]", i + 1, r.id, r.kind);
        } else {
            println!("  {:>3}. {} [{}] <- {}", i + 1, r.id, r.kind, deps.join(", "));
        }
    }
    Ok(())
}

struct SynthesizeArgs {
    file: PathBuf,
    targets: Vec<ProviderId>,
    out: Option<PathBuf>,
    force: bool,
    sequential: bool,
    no_cache: bool,
    config: PathBuf,
}

fn cmd_synthesize(args: &SynthesizeArgs) -> Result<(), ForgeError> {
    let settings = load_settings(&args.config)?;
    let spec = loader::load_file(&args.file)?;
    let targets = pick_targets(&spec, &args.targets);
    let graph = builder::build(&spec)?;

    let cache = match (&settings.cache.dir, args.no_cache) {
        (Some(dir), false) => SynthesisCache::with_dir(dir),
        _ => SynthesisCache::in_memory(),
    };
    let pipeline = Pipeline::new(Arc::new(load_registry(&settings)?))
        .with_pins(settings.registry.pins.clone())
        .with_cache(cache);

    let lock = Lockfile::new(&settings.lock.path);
    let previous = if args.force {
        None
    } else {
        lock.previous_or_none(graph.workload())
    };

    let outcome = if settings.synthesis.parallel && !args.sequential {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(ForgeError::Runtime)?;
        runtime.block_on(pipeline.synthesize_concurrent(
            Arc::new(graph.clone()),
            &targets,
            previous.as_ref(),
            &CancelToken::new(),
        ))?
    } else {
        pipeline.synthesize(&graph, &targets, previous.as_ref())?
    };

    let out = args.out.clone().unwrap_or_else(|| settings.output.dir.clone());
    emit::write_outcome(&out, graph.name(), &outcome)?;
    print_outcome(&out, graph.workload(), graph.name(), &outcome);

    if outcome.is_complete() {
        match lock.commit(graph.workload(), &outcome.graph_hash, &outcome.binding, &targets) {
            Ok(entry) => println!("  lock: {} -> {}", entry.run_id, lock.path().display()),
            Err(e) => warn!(error = %e, "lock entry not recorded; next run will be full"),
        }
    }
    outcome.check()?;
    Ok(())
}

fn print_outcome(out: &Path, workload: &str, name: &str, outcome: &SynthesisOutcome) {
    println!(
        "Synthesis ({}): {}, graph {}",
        outcome.mode,
        workload,
        hasher::short(&outcome.graph_hash, 16)
    );
    for (provider, artifacts) in &outcome.artifacts {
        let version = outcome
            .binding
            .get(provider)
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!(
            "  ok      {} (rules {}): {} artifacts -> {} [tree {}]",
            provider,
            version,
            artifacts.len(),
            out.join(emit::tree_name(provider, name)).display(),
            hasher::short(&emit::tree_digest(artifacts), 16)
        );
    }
    for failure in outcome.failures.values() {
        println!("  FAILED  {}", failure);
    }
    for provider in &outcome.cancelled {
        println!("  skipped {} (cancelled)", provider);
    }
    if let Some(composition) = &outcome.composition {
        println!(
            "  composition: {} logical resources -> {}",
            composition.logical_ids.len(),
            out.join(emit::COMPOSITION_DIR)
                .join(&composition.file_name)
                .display()
        );
    }
}

#[derive(Serialize)]
struct BoundAssertion<'a> {
    provider: &'a ProviderId,
    #[serde(flatten)]
    assertion: &'a VerificationAssertion,
}

fn cmd_verify_plan(file: &Path, targets: Vec<ProviderId>, json: bool) -> Result<(), ForgeError> {
    let spec = loader::load_file(file)?;
    let targets = pick_targets(&spec, &targets);
    let graph = builder::build(&spec)?;
    let plan = verify::plan(&graph);

    if json {
        let body = if targets.is_empty() {
            serde_json::to_string_pretty(&plan)?
        } else {
            let bound: Vec<BoundAssertion<'_>> = verify::bind_targets(&plan, &targets)
                .into_iter()
                .map(|(provider, assertion)| BoundAssertion {
                    provider,
                    assertion,
                })
                .collect();
            serde_json::to_string_pretty(&bound)?
        };
        println!("{}", body);
        return Ok(());
    }

    println!("Verification plan: {} ({} assertions)", graph.workload(), plan.len());
    for (i, a) in plan.iter().enumerate() {
        let endpoint = a
            .endpoint
            .as_deref()
            .map(|e| format!(" @ {}", e))
            .unwrap_or_default();
        println!(
            "  {:>3}. {} {} x{} -> {}{}",
            i + 1,
            a.check,
            a.kind,
            a.expected_count,
            a.expected_state,
            endpoint
        );
    }
    if !targets.is_empty() {
        let names: Vec<&str> = targets.iter().map(ProviderId::as_str).collect();
        println!("  targets: {}", names.join(", "));
    }
    Ok(())
}

fn cmd_lock(config: &Path, action: LockAction) -> Result<(), ForgeError> {
    let settings = load_settings(config)?;
    let lock = Lockfile::new(&settings.lock.path);

    match action {
        LockAction::Status { workload } => {
            let entry = match workload.as_deref() {
                Some(w) => lock.last_entry_for(w)?,
                None => lock.last_entry()?,
            };
            match entry {
                Some(e) => print_entry(&e),
                None => println!("No lock entries. Run `nebulaforge synthesize` first."),
            }
        }
        LockAction::History { limit } => {
            let history = lock.history()?;
            let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
            if history.is_empty() {
                println!("No lock entries. Run `nebulaforge synthesize` first.");
            }
            for entry in history.iter().skip(skip) {
                let targets: Vec<&str> = entry.targets.iter().map(ProviderId::as_str).collect();
                println!(
                    "{}  {}  {}  {}  [{}]",
                    entry.run_id,
                    entry.timestamp.to_rfc3339(),
                    entry.workload,
                    hasher::short(&entry.graph_hash, 12),
                    targets.join(",")
                );
            }
        }
    }
    Ok(())
}

fn cmd_clean(config: &Path, purge_lock: bool) -> Result<(), ForgeError> {
    let settings = load_settings(config)?;
    let mut removed = Vec::new();

    let mut dirs = vec![settings.output.dir.clone()];
    dirs.extend(settings.cache.dir.clone());
    for dir in dirs {
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => removed.push(dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(crate::core::error::EmitError::io(&dir)(e).into()),
        }
    }
    if purge_lock {
        let path = settings.lock.path;
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(crate::core::error::EmitError::io(&path)(e).into()),
        }
    }

    if removed.is_empty() {
        println!("Nothing to clean.");
    }
    for path in &removed {
        println!("  Removed: {}", path.display());
    }
    Ok(())
}

fn print_entry(entry: &LockEntry) {
    println!("Run: {} ({})", entry.run_id, entry.workload);
    println!("  Timestamp: {}", entry.timestamp.to_rfc3339());
    println!("  Generator: {}", entry.generator);
    println!("  Graph:     {}", entry.graph_hash);
    for (provider, version) in &entry.registry_versions {
        println!("    {}: rules {}", provider, version);
    }
}

fn cmd_registry(config: &Path) -> Result<(), ForgeError> {
    let settings = load_settings(config)?;
    let registry = load_registry(&settings)?;

    for set in registry.rule_sets() {
        let mut tags = Vec::new();
        if registry.latest_version(&set.provider) == Some(&set.version) {
            tags.push("latest");
        }
        if settings.registry.pins.get(&set.provider) == Some(&set.version) {
            tags.push("pinned");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" ({})", tags.join(", "))
        };
        let kinds: Vec<String> = set.kinds().map(|k| k.to_string()).collect();
        println!("{} {}{}  {}", set.provider, set.version, tags, set.description);
        println!("    kinds: {}", kinds.join(", "));
    }
    Ok(())
}

/// Settings with relative paths anchored at the settings file's directory.
fn load_settings(config: &Path) -> Result<Settings, ForgeError> {
    let base = config.parent().unwrap_or_else(|| Path::new(""));
    Ok(Settings::load(config)?.relative_to(base))
}

fn load_registry(settings: &Settings) -> Result<MappingRegistry, ForgeError> {
    let mut registry = MappingRegistry::builtin()?;
    for dir in &settings.registry.extra_dirs {
        let loaded = registry.load_dir(dir)?;
        debug!(dir = %dir.display(), loaded, "extra rule sets loaded");
    }
    Ok(registry)
}

/// Command-line targets win over the document's.
fn pick_targets(spec: &WorkloadSpec, cli: &[ProviderId]) -> Vec<ProviderId> {
    if cli.is_empty() {
        spec.targets.clone()
    } else {
        cli.to_vec()
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ForgeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(crate::core::error::EmitError::io(parent))?;
    }
    std::fs::write(path, content).map_err(crate::core::error::EmitError::io(path))?;
    Ok(())
}
