//! NF-007: Provider Mapping Registry.
//!
//! Keyed by (provider, version) → rule set, and within a rule set by kind.
//! Loaded once per process, then shared read-only (behind `Arc`) by every
//! target walk. Adding a provider means registering a rule set.

use super::rule::{ProviderMappingRule, RuleSet};
use crate::core::error::{MappingError, RegistryError};
use crate::core::types::{ProviderId, ResourceKind, RuleVersion};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Rule sets compiled into the binary.
const BUILTIN: &[(&str, &str)] = &[
    ("aws-1.0.0.yaml", include_str!("rulesets/aws-1.0.0.yaml")),
    ("aws-1.1.0.yaml", include_str!("rulesets/aws-1.1.0.yaml")),
    ("gcp-1.0.0.yaml", include_str!("rulesets/gcp-1.0.0.yaml")),
    ("azure-1.0.0.yaml", include_str!("rulesets/azure-1.0.0.yaml")),
    ("cloudflare-1.0.0.yaml", include_str!("rulesets/cloudflare-1.0.0.yaml")),
];

#[derive(Debug, Default, Clone)]
pub struct MappingRegistry {
    sets: BTreeMap<ProviderId, BTreeMap<RuleVersion, RuleSet>>,
}

impl MappingRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rule sets.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (origin, yaml) in BUILTIN {
            registry.load_str(origin, yaml)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, set: RuleSet) -> Result<(), RegistryError> {
        let versions = self.sets.entry(set.provider.clone()).or_default();
        if versions.contains_key(&set.version) {
            return Err(RegistryError::DuplicateRuleSet {
                provider: set.provider,
                version: set.version,
            });
        }
        debug!(provider = %set.provider, version = %set.version, "rule set registered");
        versions.insert(set.version.clone(), set);
        Ok(())
    }

    pub fn load_str(&mut self, origin: &str, yaml: &str) -> Result<(), RegistryError> {
        self.register(RuleSet::from_yaml(origin, yaml)?)
    }

    /// Register every `*.yaml` / `*.yml` file in `dir`, in file-name order.
    /// Returns the number of rule sets loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RegistryError> {
        let io = |source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        for path in &files {
            let yaml = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            self.load_str(&path.display().to_string(), &yaml)?;
        }
        Ok(files.len())
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderId> {
        self.sets.keys()
    }

    /// Every registered rule set, by provider then version.
    pub fn rule_sets(&self) -> impl Iterator<Item = &RuleSet> {
        self.sets.values().flat_map(|versions| versions.values())
    }

    pub fn latest_version(&self, provider: &ProviderId) -> Option<&RuleVersion> {
        self.sets
            .get(provider)
            .and_then(|versions| versions.keys().next_back())
    }

    pub fn rule_set(
        &self,
        provider: &ProviderId,
        version: &RuleVersion,
    ) -> Result<&RuleSet, MappingError> {
        let versions = self
            .sets
            .get(provider)
            .ok_or_else(|| MappingError::UnknownProvider(provider.clone()))?;
        versions
            .get(version)
            .ok_or_else(|| MappingError::UnknownVersion {
                provider: provider.clone(),
                version: version.clone(),
            })
    }

    /// Rule for one (kind, provider, version).
    pub fn resolve(
        &self,
        kind: ResourceKind,
        provider: &ProviderId,
        version: &RuleVersion,
    ) -> Result<&ProviderMappingRule, MappingError> {
        self.rule_set(provider, version)?
            .rule(kind)
            .ok_or_else(|| MappingError::NoRuleForKind {
                kind,
                provider: provider.clone(),
            })
    }

    /// Version a run uses for `provider`: the pin when given, else the latest.
    pub fn bind(
        &self,
        provider: &ProviderId,
        pin: Option<&RuleVersion>,
    ) -> Result<RuleVersion, MappingError> {
        match pin {
            Some(version) => self.rule_set(provider, version).map(|s| s.version.clone()),
            None => self
                .latest_version(provider)
                .cloned()
                .ok_or_else(|| MappingError::UnknownProvider(provider.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> ProviderId {
        ProviderId::new(id).unwrap()
    }

    fn v(s: &str) -> RuleVersion {
        RuleVersion::parse(s).unwrap()
    }

    #[test]
    fn test_nf007_builtin_loads() {
        let reg = MappingRegistry::builtin().unwrap();
        let providers: Vec<&str> = reg.providers().map(|p| p.as_str()).collect();
        assert_eq!(providers, vec!["aws", "azure", "cloudflare", "gcp"]);
        assert_eq!(reg.rule_sets().count(), 5);
    }

    #[test]
    fn test_nf007_full_providers_cover_every_kind() {
        let reg = MappingRegistry::builtin().unwrap();
        let kinds = [
            ResourceKind::ComputeNode,
            ResourceKind::NetworkLink,
            ResourceKind::IngressRoute,
            ResourceKind::Volume,
            ResourceKind::DnsRecord,
        ];
        for set in reg.rule_sets().filter(|s| s.provider.as_str() != "cloudflare") {
            for kind in kinds {
                assert!(
                    set.rule(kind).is_some(),
                    "{} {} lacks {}",
                    set.provider,
                    set.version,
                    kind
                );
            }
        }
    }

    #[test]
    fn test_nf007_resolve() {
        let reg = MappingRegistry::builtin().unwrap();
        let rule = reg
            .resolve(ResourceKind::ComputeNode, &p("aws"), &v("1.0.0"))
            .unwrap();
        assert_eq!(rule.artifact_kind, "aws_instance");
        assert_eq!(rule.lookup_instance_class("medium-ha").unwrap(), "t3.medium");

        let newer = reg
            .resolve(ResourceKind::ComputeNode, &p("aws"), &v("1.1.0"))
            .unwrap();
        assert_eq!(newer.lookup_instance_class("medium-ha").unwrap(), "m7g.medium");
    }

    #[test]
    fn test_nf007_dns_only_provider() {
        let reg = MappingRegistry::builtin().unwrap();
        let err = reg
            .resolve(ResourceKind::ComputeNode, &p("cloudflare"), &v("1.0.0"))
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::NoRuleForKind {
                kind: ResourceKind::ComputeNode,
                provider: p("cloudflare")
            }
        );
        assert!(reg
            .resolve(ResourceKind::DnsRecord, &p("cloudflare"), &v("1.0.0"))
            .is_ok());
    }

    #[test]
    fn test_nf007_unknown_provider_and_version() {
        let reg = MappingRegistry::builtin().unwrap();
        assert_eq!(
            reg.resolve(ResourceKind::Volume, &p("oracle"), &v("1.0.0"))
                .unwrap_err(),
            MappingError::UnknownProvider(p("oracle"))
        );
        assert!(matches!(
            reg.resolve(ResourceKind::Volume, &p("gcp"), &v("9.9.9")),
            Err(MappingError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn test_nf007_bind_latest_or_pin() {
        let reg = MappingRegistry::builtin().unwrap();
        assert_eq!(reg.bind(&p("aws"), None).unwrap(), v("1.1.0"));
        assert_eq!(reg.bind(&p("aws"), Some(&v("1.0.0"))).unwrap(), v("1.0.0"));
        assert!(reg.bind(&p("aws"), Some(&v("0.9.0"))).is_err());
        assert!(reg.bind(&p("oracle"), None).is_err());
    }

    #[test]
    fn test_nf007_duplicate_rule_set() {
        let mut reg = MappingRegistry::builtin().unwrap();
        let err = reg
            .load_str("dup", include_str!("rulesets/gcp-1.0.0.yaml"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRuleSet { .. }));
    }

    #[test]
    fn test_nf007_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let gcp2 = include_str!("rulesets/gcp-1.0.0.yaml").replace("\"1.0.0\"", "\"2.0.0\"");
        std::fs::write(dir.path().join("gcp-2.0.0.yaml"), gcp2).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut reg = MappingRegistry::builtin().unwrap();
        assert_eq!(reg.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(reg.latest_version(&p("gcp")), Some(&v("2.0.0")));
    }

    #[test]
    fn test_nf007_load_dir_missing() {
        let mut reg = MappingRegistry::new();
        let err = reg.load_dir(Path::new("/nonexistent/nebulaforge")).unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
