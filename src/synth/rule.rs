//! NF-006: Provider mapping rules.
//!
//! A rule set is static YAML data for one (provider, version): per-kind rules
//! plus the translation tables their substitutions consult. Rules are plain
//! values; translating a resource through a rule is a pure function.

use super::render::{self, HclValue};
use crate::core::error::{MappingError, RegistryError};
use crate::core::types::{LogicalResource, PropertyValue, ProviderId, ResourceKind, RuleVersion};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

static IDENTIFIER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z_][a-z0-9_]*)?$").expect("static pattern"));

/// How a substituted property value is translated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Translation {
    #[default]
    Verbatim,
    InstanceClass,
    PerformanceClass,
    /// Logical id of an earlier resource, rewritten to a module output reference.
    Reference,
}

/// Copies one resource property into one module attribute.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Substitution {
    pub property: String,
    pub attribute: String,
    #[serde(default)]
    pub translate: Translation,
    /// Module output used by `reference` translations (default `id`).
    #[serde(default)]
    pub output: Option<String>,
}

/// Abstract class → provider value tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslationTables {
    #[serde(default)]
    pub instance_class: BTreeMap<String, String>,
    #[serde(default)]
    pub performance_class: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    artifact: String,
    module: String,
    module_version: String,
    #[serde(default)]
    substitutions: Vec<Substitution>,
    #[serde(default)]
    attributes: IndexMap<String, PropertyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSetDocument {
    provider: ProviderId,
    version: RuleVersion,
    #[serde(default)]
    description: String,
    #[serde(default)]
    identifier_prefix: String,
    rules: BTreeMap<ResourceKind, RuleDocument>,
    #[serde(default)]
    tables: TranslationTables,
}

/// Template for one (kind, provider, version).
#[derive(Debug, Clone)]
pub struct ProviderMappingRule {
    pub kind: ResourceKind,
    pub provider: ProviderId,
    pub version: RuleVersion,
    /// Provider artifact kind, e.g. `aws_instance`.
    pub artifact_kind: String,
    pub module_source: String,
    pub module_version: String,
    pub substitutions: Vec<Substitution>,
    /// Constant attributes, rendered after substitutions in file order.
    pub attributes: IndexMap<String, PropertyValue>,
    tables: Arc<TranslationTables>,
}

impl ProviderMappingRule {
    /// Translate a resource into module attributes.
    ///
    /// `emitted` maps logical ids already emitted on this target to their
    /// target-specific identifiers; `reference` substitutions resolve through it.
    pub fn translate(
        &self,
        resource: &LogicalResource,
        emitted: &HashMap<String, String>,
    ) -> Result<Vec<(String, HclValue)>, MappingError> {
        let mut attributes = Vec::with_capacity(self.substitutions.len() + self.attributes.len());

        for sub in &self.substitutions {
            let value = resource.properties.get(&sub.property).ok_or_else(|| {
                MappingError::MissingProperty {
                    resource: resource.id.clone(),
                    property: sub.property.clone(),
                }
            })?;
            let translated = match sub.translate {
                Translation::Verbatim => HclValue::from(value),
                Translation::InstanceClass => {
                    HclValue::Str(self.lookup_instance_class(&value.to_string())?)
                }
                Translation::PerformanceClass => {
                    HclValue::Str(self.lookup_performance_class(&value.to_string())?)
                }
                Translation::Reference => {
                    let reference = value.to_string();
                    let target_id = emitted.get(&reference).ok_or_else(|| {
                        MappingError::UnresolvedReference {
                            resource: resource.id.clone(),
                            reference: reference.clone(),
                        }
                    })?;
                    let output = sub.output.as_deref().unwrap_or("id");
                    HclValue::Expr(render::module_output(target_id, output))
                }
            };
            attributes.push((sub.attribute.clone(), translated));
        }

        for (key, value) in &self.attributes {
            if attributes.iter().any(|(k, _)| k == key) {
                continue;
            }
            attributes.push((key.clone(), HclValue::from(value)));
        }

        Ok(attributes)
    }

    /// Abstract instance class → provider instance type.
    pub fn lookup_instance_class(&self, class: &str) -> Result<String, MappingError> {
        self.tables
            .instance_class
            .get(class)
            .cloned()
            .ok_or_else(|| MappingError::UnknownInstanceClass {
                provider: self.provider.clone(),
                class: class.to_string(),
            })
    }

    /// Abstract performance class → provider storage tier.
    pub fn lookup_performance_class(&self, class: &str) -> Result<String, MappingError> {
        self.tables
            .performance_class
            .get(class)
            .cloned()
            .ok_or_else(|| MappingError::UnknownPerformanceClass {
                provider: self.provider.clone(),
                class: class.to_string(),
            })
    }
}

/// All rules of one provider at one version.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub provider: ProviderId,
    pub version: RuleVersion,
    pub description: String,
    identifier_prefix: String,
    rules: BTreeMap<ResourceKind, ProviderMappingRule>,
}

impl RuleSet {
    /// Parse and validate a rule-set document. `origin` names it in errors.
    pub fn from_yaml(origin: &str, yaml: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: String| RegistryError::Invalid {
            origin: origin.to_string(),
            reason,
        };
        let doc: RuleSetDocument =
            serde_yaml_ng::from_str(yaml).map_err(|e| invalid(e.to_string()))?;

        if !IDENTIFIER_PREFIX.is_match(&doc.identifier_prefix) {
            return Err(invalid(format!(
                "identifier_prefix '{}' must match [a-z_][a-z0-9_]*",
                doc.identifier_prefix
            )));
        }
        if doc.rules.is_empty() {
            return Err(invalid("rule set defines no rules".to_string()));
        }

        let tables = Arc::new(doc.tables);
        let mut rules = BTreeMap::new();
        for (kind, rule) in doc.rules {
            if rule.artifact.is_empty() || rule.module.is_empty() || rule.module_version.is_empty()
            {
                return Err(invalid(format!(
                    "rule for {} needs artifact, module and module_version",
                    kind
                )));
            }
            for sub in &rule.substitutions {
                if sub.output.is_some() && sub.translate != Translation::Reference {
                    return Err(invalid(format!(
                        "rule for {}: 'output' is only valid on reference substitutions ({})",
                        kind, sub.attribute
                    )));
                }
            }
            rules.insert(
                kind,
                ProviderMappingRule {
                    kind,
                    provider: doc.provider.clone(),
                    version: doc.version.clone(),
                    artifact_kind: rule.artifact,
                    module_source: rule.module,
                    module_version: rule.module_version,
                    substitutions: rule.substitutions,
                    attributes: rule.attributes,
                    tables: Arc::clone(&tables),
                },
            );
        }

        Ok(Self {
            provider: doc.provider,
            version: doc.version,
            description: doc.description,
            identifier_prefix: doc.identifier_prefix,
            rules,
        })
    }

    pub fn rule(&self, kind: ResourceKind) -> Option<&ProviderMappingRule> {
        self.rules.get(&kind)
    }

    /// Resource kinds this rule set can translate.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.rules.keys().copied()
    }

    /// Target-specific identifier for a logical id on this provider.
    pub fn target_identifier(&self, logical_id: &str) -> String {
        render::sanitize_identifier(&self.identifier_prefix, logical_id)
    }
}
