//! NF-001: Core data model for workload intent, logical resources and lock entries.
//!
//! Every type that crosses a persistence boundary (lockfile, synthesis cache)
//! derives Serialize/Deserialize. Collections that feed hashing or rendering are
//! ordered (`BTreeMap`/`BTreeSet`) so iteration is deterministic.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

// ============================================================================
// Workload spec (Spec Loader output)
// ============================================================================

/// Root entity parsed from the user's workload document. Immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub compute: ComputeIntent,
    pub networking: NetworkingIntent,
    pub storage: StorageIntent,
    /// Provider targets named in the document (may be empty; the CLI can supply them).
    pub targets: Vec<ProviderId>,
}

impl WorkloadSpec {
    /// `namespace/name`, used as the workload identity in hashes and lock entries.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeIntent {
    pub nodes: u64,
    /// Abstract instance class, translated per provider (e.g. "medium-ha").
    pub instance_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingIntent {
    pub topology: Topology,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageIntent {
    pub persistent: bool,
    pub performance_class: String,
}

/// Network topology among compute nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Mesh,
    Star,
    Ring,
}

impl Topology {
    pub const ALL: [Topology; 3] = [Topology::Mesh, Topology::Star, Topology::Ring];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mesh => "mesh",
            Self::Star => "star",
            Self::Ring => "ring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Providers and rule versions
// ============================================================================

static PROVIDER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,31}$").expect("static pattern"));

/// Target provider identifier (`aws`, `gcp`, ...). Providers are open-ended:
/// any id with a registered rule set is a valid target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: &str) -> Result<Self, String> {
        if PROVIDER_ID.is_match(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(format!(
                "invalid provider id '{}' (expected lowercase letters, digits, '-')",
                id
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProviderId {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<ProviderId> for String {
    fn from(p: ProviderId) -> Self {
        p.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping rule-set version. Dotted numeric, compared segment by segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleVersion {
    raw: String,
    segments: Vec<u64>,
}

impl RuleVersion {
    pub fn parse(s: &str) -> Result<Self, String> {
        let segments = s
            .split('.')
            .map(|seg| seg.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("invalid rule version '{}'", s))?;
        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for RuleVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.segments
            .cmp(&other.segments)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for RuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for RuleVersion {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<RuleVersion> for String {
    fn from(v: RuleVersion) -> Self {
        v.raw
    }
}

impl fmt::Display for RuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The rule-set version each target is bound to for one run.
pub type RegistryBinding = BTreeMap<ProviderId, RuleVersion>;

// ============================================================================
// Logical resources
// ============================================================================

/// Logical resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ComputeNode,
    NetworkLink,
    IngressRoute,
    Volume,
    DnsRecord,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComputeNode => "compute_node",
            Self::NetworkLink => "network_link",
            Self::IngressRoute => "ingress_route",
            Self::Volume => "volume",
            Self::DnsRecord => "dns_record",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(u64),
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{}]", items.join(",")),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u64> for PropertyValue {
    fn from(n: u64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A node in the resource graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalResource {
    pub id: String,
    pub kind: ResourceKind,
    pub properties: BTreeMap<String, PropertyValue>,
    pub depends_on: BTreeSet<String>,
}

impl LogicalResource {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }
}

// ============================================================================
// Synthesis output
// ============================================================================

/// Output of mapping one logical resource for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisArtifact {
    pub provider: ProviderId,
    /// Provider artifact kind, e.g. `aws_instance`.
    pub artifact_kind: String,
    pub logical_id: String,
    pub logical_kind: ResourceKind,
    /// Target-specific identifier (module name).
    pub target_id: String,
    /// File name within the target's artifact tree.
    pub file_name: String,
    pub body: String,
    /// Target-specific identifiers of dependencies, in logical dependency order.
    pub depends_on: Vec<String>,
}

/// Cross-provider composition artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionArtifact {
    pub file_name: String,
    pub body: String,
    pub logical_ids: Vec<String>,
    pub providers: Vec<ProviderId>,
}

// ============================================================================
// Lock entries
// ============================================================================

/// One persisted synthesis run. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub run_id: String,
    pub workload: String,
    pub graph_hash: String,
    pub registry_versions: RegistryBinding,
    pub targets: Vec<ProviderId>,
    pub timestamp: DateTime<Utc>,
    pub generator: String,
}

impl LockEntry {
    /// True when this entry recorded exactly these inputs.
    pub fn matches(&self, graph_hash: &str, binding: &RegistryBinding) -> bool {
        self.graph_hash == graph_hash
            && &self.registry_versions == binding
            && self.targets.iter().eq(binding.keys())
    }
}

// ============================================================================
// Verification plan
// ============================================================================

/// Externally observable check category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionCheck {
    RunningCount,
    AttachedCount,
    Reachability,
    Propagation,
}

impl fmt::Display for AssertionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunningCount => write!(f, "running-count"),
            Self::AttachedCount => write!(f, "attached-count"),
            Self::Reachability => write!(f, "reachability"),
            Self::Propagation => write!(f, "propagation"),
        }
    }
}

/// Expected-state assertion for the external live checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationAssertion {
    pub kind: ResourceKind,
    pub check: AssertionCheck,
    pub expected_count: usize,
    pub expected_state: String,
    /// Endpoint to poll, when the assertion concerns a named endpoint (domain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub resources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nf001_topology_parse() {
        assert_eq!(Topology::parse("mesh"), Some(Topology::Mesh));
        assert_eq!(Topology::parse("star"), Some(Topology::Star));
        assert_eq!(Topology::parse("ring"), Some(Topology::Ring));
        assert_eq!(Topology::parse("Mesh"), None);
        assert_eq!(Topology::Ring.to_string(), "ring");
    }

    #[test]
    fn test_nf001_provider_id_validation() {
        assert!(ProviderId::new("aws").is_ok());
        assert!(ProviderId::new("my-cloud2").is_ok());
        assert!(ProviderId::new("AWS").is_err());
        assert!(ProviderId::new("2cloud").is_err());
        assert!(ProviderId::new("").is_err());
    }

    #[test]
    fn test_nf001_provider_id_serde() {
        let p: ProviderId = serde_json::from_str("\"gcp\"").unwrap();
        assert_eq!(p.as_str(), "gcp");
        assert!(serde_json::from_str::<ProviderId>("\"G C P\"").is_err());
    }

    #[test]
    fn test_nf001_rule_version_ordering() {
        let v1 = RuleVersion::parse("1.0.0").unwrap();
        let v2 = RuleVersion::parse("1.1.0").unwrap();
        let v10 = RuleVersion::parse("1.10.0").unwrap();
        assert!(v1 < v2);
        assert!(v2 < v10);
        assert!(RuleVersion::parse("1.x").is_err());
    }

    #[test]
    fn test_nf001_resource_kind_display() {
        assert_eq!(ResourceKind::ComputeNode.to_string(), "compute_node");
        assert_eq!(ResourceKind::DnsRecord.to_string(), "dns_record");
    }

    #[test]
    fn test_nf001_property_value_untagged() {
        let v: PropertyValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, PropertyValue::Int(3));
        let v: PropertyValue = serde_json::from_str("\"t3.medium\"").unwrap();
        assert_eq!(v.as_text(), Some("t3.medium"));
        let v: PropertyValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(v.to_string(), "[a,b]");
    }

    #[test]
    fn test_nf001_lock_entry_matches() {
        let aws = ProviderId::new("aws").unwrap();
        let binding: RegistryBinding =
            BTreeMap::from([(aws.clone(), RuleVersion::parse("1.0.0").unwrap())]);
        let entry = LockEntry {
            run_id: "r-1".to_string(),
            workload: "default/web".to_string(),
            graph_hash: "blake3:abc".to_string(),
            registry_versions: binding.clone(),
            targets: vec![aws],
            timestamp: Utc::now(),
            generator: "nebulaforge test".to_string(),
        };
        assert!(entry.matches("blake3:abc", &binding));
        assert!(!entry.matches("blake3:def", &binding));

        let mut bumped = binding.clone();
        for v in bumped.values_mut() {
            *v = RuleVersion::parse("1.1.0").unwrap();
        }
        assert!(!entry.matches("blake3:abc", &bumped));
    }

    #[test]
    fn test_nf001_logical_resource_builder() {
        let r = LogicalResource::new("volume-0", ResourceKind::Volume)
            .with_property("performance_class", "fast")
            .with_dependency("compute-0");
        assert_eq!(r.properties["performance_class"].as_text(), Some("fast"));
        assert!(r.depends_on.contains("compute-0"));
    }
}
