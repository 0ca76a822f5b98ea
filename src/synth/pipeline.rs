//! NF-009: Synthesis Pipeline, graph × targets to per-target artifact trees.
//!
//! Each target walk is independent and sequential in topological order. A
//! mapping failure drops that target's whole tree and nothing else. Walks share
//! the graph and registry read-only, so `synthesize_concurrent` can fan them
//! out to the blocking pool and join into the same ordered result.

use super::cache::{cache_key, CachedRun, SynthesisCache};
use super::composition;
use super::registry::MappingRegistry;
use super::render::{self, ModuleBlock};
use super::rule::RuleSet;
use crate::core::error::{MappingError, SynthesisError, TargetFailure};
use crate::core::graph::ResourceGraph;
use crate::core::types::{
    CompositionArtifact, LockEntry, LogicalResource, ProviderId, RegistryBinding, RuleVersion,
    SynthesisArtifact,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a run produced its artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisMode {
    Full,
    /// Served from the cache because the previous lock entry matched.
    Incremental,
}

impl fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// Coarse cancellation, checked before each target walk starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-target results of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutcome {
    pub mode: SynthesisMode,
    pub graph_hash: String,
    /// Rule-set version per target that could be bound.
    pub binding: RegistryBinding,
    pub artifacts: BTreeMap<ProviderId, Vec<SynthesisArtifact>>,
    pub failures: BTreeMap<ProviderId, TargetFailure>,
    /// Targets whose walk never started.
    pub cancelled: Vec<ProviderId>,
    pub composition: Option<CompositionArtifact>,
}

impl SynthesisOutcome {
    pub fn succeeded(&self) -> impl Iterator<Item = &ProviderId> {
        self.artifacts.keys()
    }

    /// Every target succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.cancelled.is_empty()
    }

    /// Aggregate error for an incomplete run.
    pub fn check(&self) -> Result<(), SynthesisError> {
        if !self.cancelled.is_empty() {
            return Err(SynthesisError::Cancelled {
                completed: self.artifacts.keys().cloned().collect(),
            });
        }
        if !self.failures.is_empty() {
            return Err(SynthesisError::TargetsFailed {
                failures: self.failures.values().cloned().collect(),
            });
        }
        Ok(())
    }
}

/// Synthesis entry point. Holds the injected registry, version pins and cache.
#[derive(Debug)]
pub struct Pipeline {
    registry: Arc<MappingRegistry>,
    pins: BTreeMap<ProviderId, RuleVersion>,
    cache: SynthesisCache,
}

struct RunPlan {
    graph_hash: String,
    requested: BTreeSet<ProviderId>,
    binding: RegistryBinding,
    unbound: BTreeMap<ProviderId, TargetFailure>,
}

enum Walk {
    Done(Vec<SynthesisArtifact>),
    Failed(TargetFailure),
    Cancelled,
}

impl From<Result<Vec<SynthesisArtifact>, TargetFailure>> for Walk {
    fn from(r: Result<Vec<SynthesisArtifact>, TargetFailure>) -> Self {
        match r {
            Ok(artifacts) => Self::Done(artifacts),
            Err(failure) => Self::Failed(failure),
        }
    }
}

impl Pipeline {
    pub fn new(registry: Arc<MappingRegistry>) -> Self {
        Self {
            registry,
            pins: BTreeMap::new(),
            cache: SynthesisCache::in_memory(),
        }
    }

    /// Pin providers to specific rule-set versions instead of the latest.
    pub fn with_pins(mut self, pins: BTreeMap<ProviderId, RuleVersion>) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_cache(mut self, cache: SynthesisCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SynthesisCache {
        &self.cache
    }

    /// Synthesize every target sequentially.
    pub fn synthesize(
        &self,
        graph: &ResourceGraph,
        targets: &[ProviderId],
        previous: Option<&LockEntry>,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        self.synthesize_with_cancel(graph, targets, previous, &CancelToken::new())
    }

    pub fn synthesize_with_cancel(
        &self,
        graph: &ResourceGraph,
        targets: &[ProviderId],
        previous: Option<&LockEntry>,
        cancel: &CancelToken,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let plan = self.plan(graph, targets)?;
        if let Some(outcome) = self.reuse(&plan, previous) {
            return Ok(outcome);
        }

        let mut walks = Vec::with_capacity(plan.binding.len());
        for (provider, version) in &plan.binding {
            let walk = if cancel.is_cancelled() {
                Walk::Cancelled
            } else {
                Walk::from(walk_target(graph, &self.registry, provider, version))
            };
            walks.push((provider.clone(), walk));
        }
        self.assemble(graph, plan, walks)
    }

    /// Synthesize every target on the blocking pool, one task per target.
    pub async fn synthesize_concurrent(
        &self,
        graph: Arc<ResourceGraph>,
        targets: &[ProviderId],
        previous: Option<&LockEntry>,
        cancel: &CancelToken,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let plan = self.plan(&graph, targets)?;
        if let Some(outcome) = self.reuse(&plan, previous) {
            return Ok(outcome);
        }

        let mut handles = Vec::with_capacity(plan.binding.len());
        for (provider, version) in &plan.binding {
            let graph = Arc::clone(&graph);
            let registry = Arc::clone(&self.registry);
            let cancel = cancel.clone();
            let task_provider = provider.clone();
            let version = version.clone();
            let handle = tokio::task::spawn_blocking(move || {
                if cancel.is_cancelled() {
                    return Walk::Cancelled;
                }
                Walk::from(walk_target(&graph, &registry, &task_provider, &version))
            });
            handles.push((provider.clone(), handle));
        }

        let mut walks = Vec::with_capacity(handles.len());
        for (provider, handle) in handles {
            let walk = handle.await.map_err(|e| SynthesisError::Worker {
                provider: provider.clone(),
                reason: e.to_string(),
            })?;
            walks.push((provider, walk));
        }
        self.assemble(&graph, plan, walks)
    }

    fn plan(
        &self,
        graph: &ResourceGraph,
        targets: &[ProviderId],
    ) -> Result<RunPlan, SynthesisError> {
        let requested: BTreeSet<ProviderId> = targets.iter().cloned().collect();
        if requested.is_empty() {
            return Err(SynthesisError::NoTargets);
        }

        let mut binding = RegistryBinding::new();
        let mut unbound = BTreeMap::new();
        for provider in &requested {
            match self.registry.bind(provider, self.pins.get(provider)) {
                Ok(version) => {
                    binding.insert(provider.clone(), version);
                }
                Err(error) => {
                    warn!(provider = %provider, error = %error, "cannot bind target");
                    unbound.insert(
                        provider.clone(),
                        TargetFailure {
                            provider: provider.clone(),
                            resource_id: None,
                            kind: None,
                            error,
                        },
                    );
                }
            }
        }

        Ok(RunPlan {
            graph_hash: graph.hash(),
            requested,
            binding,
            unbound,
        })
    }

    /// Serve the run from the cache when the previous lock entry matches.
    fn reuse(&self, plan: &RunPlan, previous: Option<&LockEntry>) -> Option<SynthesisOutcome> {
        let previous = previous?;
        if !plan.unbound.is_empty() || !previous.matches(&plan.graph_hash, &plan.binding) {
            debug!(run_id = %previous.run_id, "previous lock entry differs; full synthesis");
            return None;
        }
        let Some(cached) = self.cache.get(&cache_key(&plan.graph_hash, &plan.binding)) else {
            debug!(run_id = %previous.run_id, "lock entry matches but nothing cached; full synthesis");
            return None;
        };
        info!(run_id = %previous.run_id, "inputs unchanged; reusing cached artifacts");
        Some(SynthesisOutcome {
            mode: SynthesisMode::Incremental,
            graph_hash: plan.graph_hash.clone(),
            binding: plan.binding.clone(),
            artifacts: cached.artifacts,
            failures: BTreeMap::new(),
            cancelled: Vec::new(),
            composition: cached.composition,
        })
    }

    fn assemble(
        &self,
        graph: &ResourceGraph,
        plan: RunPlan,
        walks: Vec<(ProviderId, Walk)>,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        let mut artifacts = BTreeMap::new();
        let mut failures = plan.unbound;
        let mut cancelled = Vec::new();
        for (provider, walk) in walks {
            match walk {
                Walk::Done(set) => {
                    info!(provider = %provider, artifacts = set.len(), "target synthesized");
                    artifacts.insert(provider, set);
                }
                Walk::Failed(failure) => {
                    warn!(%failure, "target failed");
                    failures.insert(provider, failure);
                }
                Walk::Cancelled => cancelled.push(provider),
            }
        }

        let composition = if plan.requested.len() > 1 && !artifacts.is_empty() && cancelled.is_empty()
        {
            Some(
                composition::compose(graph, &plan.graph_hash, &artifacts)
                    .map_err(|e| SynthesisError::Composition(e.to_string()))?,
            )
        } else {
            None
        };

        let outcome = SynthesisOutcome {
            mode: SynthesisMode::Full,
            graph_hash: plan.graph_hash,
            binding: plan.binding,
            artifacts,
            failures,
            cancelled,
            composition,
        };

        if outcome.is_complete() {
            self.cache.put(
                &cache_key(&outcome.graph_hash, &outcome.binding),
                CachedRun {
                    artifacts: outcome.artifacts.clone(),
                    composition: outcome.composition.clone(),
                },
            );
        }
        info!(
            workload = graph.workload(),
            succeeded = outcome.artifacts.len(),
            failed = outcome.failures.len(),
            cancelled = outcome.cancelled.len(),
            "synthesis finished"
        );
        Ok(outcome)
    }
}

/// Walk one target in topological order. The first mapping error aborts the
/// target and no partial tree is returned.
pub fn walk_target(
    graph: &ResourceGraph,
    registry: &MappingRegistry,
    provider: &ProviderId,
    version: &RuleVersion,
) -> Result<Vec<SynthesisArtifact>, TargetFailure> {
    let fail = |resource: Option<&LogicalResource>, error: MappingError| TargetFailure {
        provider: provider.clone(),
        resource_id: resource.map(|r| r.id.clone()),
        kind: resource.map(|r| r.kind),
        error,
    };

    let set = registry
        .rule_set(provider, version)
        .map_err(|e| fail(None, e))?;

    let mut emitted: HashMap<String, String> = HashMap::with_capacity(graph.len());
    let mut owners: HashMap<String, String> = HashMap::with_capacity(graph.len());
    let mut artifacts = Vec::with_capacity(graph.len());
    for resource in graph.iter() {
        let artifact = map_resource(set, resource, &emitted, &mut owners)
            .map_err(|e| fail(Some(resource), e))?;
        emitted.insert(resource.id.clone(), artifact.target_id.clone());
        artifacts.push(artifact);
    }
    debug!(provider = %provider, version = %version, artifacts = artifacts.len(), "target walk complete");
    Ok(artifacts)
}

fn map_resource(
    set: &RuleSet,
    resource: &LogicalResource,
    emitted: &HashMap<String, String>,
    owners: &mut HashMap<String, String>,
) -> Result<SynthesisArtifact, MappingError> {
    let rule = set
        .rule(resource.kind)
        .ok_or_else(|| MappingError::NoRuleForKind {
            kind: resource.kind,
            provider: set.provider.clone(),
        })?;

    let target_id = set.target_identifier(&resource.id);
    if let Some(first) = owners.get(&target_id) {
        return Err(MappingError::IdentifierCollision {
            provider: set.provider.clone(),
            identifier: target_id,
            first: first.clone(),
            second: resource.id.clone(),
        });
    }
    owners.insert(target_id.clone(), resource.id.clone());

    let depends_on = resource
        .depends_on
        .iter()
        .map(|dep| {
            emitted
                .get(dep)
                .cloned()
                .ok_or_else(|| MappingError::UnresolvedReference {
                    resource: resource.id.clone(),
                    reference: dep.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let attributes = rule.translate(resource, emitted)?;
    let comment = format!(
        "{} ({}) -> {} [{} {}]",
        resource.id, resource.kind, rule.artifact_kind, set.provider, set.version
    );
    let body = render::module_block(&ModuleBlock {
        name: &target_id,
        source: &rule.module_source,
        version: &rule.module_version,
        comment: &comment,
        attributes: &attributes,
        depends_on: &depends_on,
    });

    Ok(SynthesisArtifact {
        provider: set.provider.clone(),
        artifact_kind: rule.artifact_kind.clone(),
        logical_id: resource.id.clone(),
        logical_kind: resource.kind,
        file_name: format!("{}.tf", target_id),
        target_id,
        body,
        depends_on,
    })
}
