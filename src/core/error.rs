//! Error taxonomy.
//!
//! Loader and builder errors abort a run. Mapping errors are scoped to one
//! target. Lock errors are never fatal: callers degrade them to "no previous entry".

use super::types::{ProviderId, ResourceKind, RuleVersion};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed or invalid workload document. `path` is a dotted field path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("missing required field '{path}'")]
    MissingField { path: String },

    #[error("field '{path}' must be {expected}, got {found}")]
    InvalidType {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("field '{path}' has unknown value '{value}' (expected one of: {allowed})")]
    UnknownEnumValue {
        path: String,
        value: String,
        allowed: String,
    },

    #[error("field '{path}' is invalid: {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("workload document is not valid YAML: {0}")]
    Syntax(String),

    #[error("cannot read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

impl SpecError {
    /// The offending field path, when the error concerns a field.
    pub fn field_path(&self) -> Option<&str> {
        match self {
            Self::MissingField { path }
            | Self::InvalidType { path, .. }
            | Self::UnknownEnumValue { path, .. }
            | Self::InvalidValue { path, .. } => Some(path),
            Self::Syntax(_) | Self::Read { .. } => None,
        }
    }
}

/// Graph construction violated an invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("workload requests zero compute nodes")]
    EmptyCompute,

    #[error("ingress domain '{0}' is listed more than once")]
    DuplicateDomain(String),

    #[error("topology '{topology}' is not supported for {nodes} node(s): {reason}")]
    UnsupportedTopology {
        topology: String,
        nodes: u64,
        reason: String,
    },

    #[error("resource identifier '{0}' is defined more than once")]
    DuplicateIdentifier(String),

    #[error("resource '{resource}' depends on unknown resource '{dependency}'")]
    DanglingDependency {
        resource: String,
        dependency: String,
    },

    #[error("dependency override names unknown resource '{0}'")]
    UnknownOverrideTarget(String),

    #[error("dependency cycle detected involving: {}", .members.join(", "))]
    CyclicDependency { members: Vec<String> },
}

/// No or invalid provider translation for one resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("provider '{0}' has no registered rule set")]
    UnknownProvider(ProviderId),

    #[error("provider '{provider}' has no rule set version {version}")]
    UnknownVersion {
        provider: ProviderId,
        version: RuleVersion,
    },

    #[error("provider '{provider}' has no rule for {kind}")]
    NoRuleForKind {
        kind: ResourceKind,
        provider: ProviderId,
    },

    #[error("provider '{provider}' has no instance type for class '{class}'")]
    UnknownInstanceClass { provider: ProviderId, class: String },

    #[error("provider '{provider}' has no storage tier for performance class '{class}'")]
    UnknownPerformanceClass { provider: ProviderId, class: String },

    #[error("resource '{resource}' lacks property '{property}' required by the rule")]
    MissingProperty { resource: String, property: String },

    #[error("resource '{resource}' references '{reference}', which has not been emitted")]
    UnresolvedReference { resource: String, reference: String },

    #[error("'{first}' and '{second}' both map to identifier '{identifier}' on {provider}")]
    IdentifierCollision {
        provider: ProviderId,
        identifier: String,
        first: String,
        second: String,
    },
}

/// Why one target produced no artifact tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub provider: ProviderId,
    /// Failing resource; `None` when the target failed before the walk (binding).
    pub resource_id: Option<String>,
    pub kind: Option<ResourceKind>,
    pub error: MappingError,
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.resource_id, self.kind) {
            (Some(id), Some(kind)) => {
                write!(f, "{}: {} ({}): {}", self.provider, id, kind, self.error)
            }
            (Some(id), None) => write!(f, "{}: {}: {}", self.provider, id, self.error),
            _ => write!(f, "{}: {}", self.provider, self.error),
        }
    }
}

impl std::error::Error for TargetFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Run-level synthesis failure.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("no synthesis targets requested")]
    NoTargets,

    #[error("synthesis cancelled after {} completed target(s)", .completed.len())]
    Cancelled { completed: Vec<ProviderId> },

    #[error("{} target(s) failed: {}", .failures.len(), join_failures(.failures))]
    TargetsFailed { failures: Vec<TargetFailure> },

    #[error("synthesis worker for {provider} failed: {reason}")]
    Worker { provider: ProviderId, reason: String },

    #[error("cannot render composition: {0}")]
    Composition(String),
}

fn join_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Rule-set data could not be loaded or registered.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid rule set {origin}: {reason}")]
    Invalid { origin: String, reason: String },

    #[error("rule set {provider} {version} is already registered")]
    DuplicateRuleSet {
        provider: ProviderId,
        version: RuleVersion,
    },

    #[error("cannot read rule sets from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lockfile read/write failure. Non-fatal by policy.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("lockfile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lockfile {path} line {line} is corrupt: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("cannot serialize lock entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("lockfile writer mutex poisoned")]
    Poisoned,
}

/// `nebulaforge.toml` could not be read.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Writing an artifact tree failed.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EmitError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Anything a CLI command can fail with.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("cannot encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("{0}")]
    Usage(String),
}
