//! NF-002: Spec Loader, YAML workload document to `WorkloadSpec`.
//!
//! Validates schema shape only: presence and type of fields, enum membership,
//! and the syntax of names, domains and provider ids. Graph-level rules
//! (zero nodes, duplicate domains) belong to the builder.

use super::error::SpecError;
use super::types::*;
use regex::Regex;
use serde_yaml_ng::{Mapping, Value};
use std::path::Path;
use std::sync::LazyLock;

pub const API_VERSION: &str = "infrastructure.nebulaforge.io/v1";
pub const KIND: &str = "WorkloadCluster";

const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_INSTANCE_CLASS: &str = "medium";
const DEFAULT_PERFORMANCE_CLASS: &str = "standard";

/// Upper bound on `spec.compute.nodes`. A mesh grows quadratically, so 1024 nodes
/// already means 523,776 links.
pub const MAX_NODES: u64 = 1024;

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("static pattern"));

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*\.)?([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("static pattern")
});

/// Read and load a workload document from disk.
pub fn load_file(path: &Path) -> Result<WorkloadSpec, SpecError> {
    let bytes = std::fs::read(path).map_err(|e| SpecError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    load(&bytes)
}

/// Parse raw document bytes into a `WorkloadSpec`.
pub fn load(raw: &[u8]) -> Result<WorkloadSpec, SpecError> {
    let root: Value =
        serde_yaml_ng::from_slice(raw).map_err(|e| SpecError::Syntax(e.to_string()))?;
    let root = match root {
        Value::Mapping(m) => m,
        other => return Err(SpecError::Syntax(format!("expected a mapping, got {}", type_name(&other)))),
    };

    if let Some(v) = optional_str(&root, "", "apiVersion")? {
        expect_one_of("apiVersion", v, &[API_VERSION])?;
    }
    if let Some(k) = optional_str(&root, "", "kind")? {
        expect_one_of("kind", k, &[KIND])?;
    }

    let metadata = required_map(&root, "", "metadata")?;
    let name = required_str(metadata, "metadata", "name")?;
    check_pattern("metadata.name", name, &DNS_LABEL, "a DNS-1123 label")?;
    let namespace = optional_str(metadata, "metadata", "namespace")?.unwrap_or(DEFAULT_NAMESPACE);
    check_pattern("metadata.namespace", namespace, &DNS_LABEL, "a DNS-1123 label")?;

    let spec = required_map(&root, "", "spec")?;
    let compute = load_compute(required_map(spec, "spec", "compute")?)?;
    let networking = load_networking(required_map(spec, "spec", "networking")?)?;
    let storage = load_storage(required_map(spec, "spec", "storage")?)?;
    let targets = load_targets(spec)?;

    Ok(WorkloadSpec {
        name: name.to_string(),
        namespace: namespace.to_string(),
        compute,
        networking,
        storage,
        targets,
    })
}

fn load_compute(m: &Mapping) -> Result<ComputeIntent, SpecError> {
    let path = "spec.compute.nodes";
    let nodes = match m.get("nodes") {
        None | Some(Value::Null) => {
            return Err(SpecError::MissingField {
                path: path.to_string(),
            })
        }
        Some(v @ Value::Number(n)) => n.as_u64().ok_or_else(|| SpecError::InvalidType {
            path: path.to_string(),
            expected: "a non-negative integer",
            found: describe(v),
        })?,
        Some(other) => {
            return Err(SpecError::InvalidType {
                path: path.to_string(),
                expected: "a non-negative integer",
                found: describe(other),
            })
        }
    };
    if nodes > MAX_NODES {
        return Err(SpecError::InvalidValue {
            path: path.to_string(),
            reason: format!("{nodes} exceeds the limit of {MAX_NODES} nodes"),
        });
    }
    let instance_class = optional_str(m, "spec.compute", "instanceType")?
        .unwrap_or(DEFAULT_INSTANCE_CLASS)
        .to_string();
    Ok(ComputeIntent {
        nodes,
        instance_class,
    })
}

fn load_networking(m: &Mapping) -> Result<NetworkingIntent, SpecError> {
    let raw = required_str(m, "spec.networking", "topology")?;
    let topology = Topology::parse(raw).ok_or_else(|| SpecError::UnknownEnumValue {
        path: "spec.networking.topology".to_string(),
        value: raw.to_string(),
        allowed: Topology::ALL.map(|t| t.as_str()).join(", "),
    })?;

    let mut domains = Vec::new();
    if let Some(ingress) = optional_map(m, "spec.networking", "ingress")? {
        if let Some(list) = optional_seq(ingress, "spec.networking.ingress", "domains")? {
            for (i, item) in list.iter().enumerate() {
                let path = format!("spec.networking.ingress.domains[{}]", i);
                let domain = item.as_str().ok_or_else(|| SpecError::InvalidType {
                    path: path.clone(),
                    expected: "a string",
                    found: describe(item),
                })?;
                let domain = domain.trim().to_ascii_lowercase();
                check_pattern(&path, &domain, &DOMAIN, "a fully-qualified domain name")?;
                domains.push(domain);
            }
        }
    }
    Ok(NetworkingIntent { topology, domains })
}

fn load_storage(m: &Mapping) -> Result<StorageIntent, SpecError> {
    let path = "spec.storage.persistent";
    let persistent = match m.get("persistent") {
        None | Some(Value::Null) => {
            return Err(SpecError::MissingField {
                path: path.to_string(),
            })
        }
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(SpecError::InvalidType {
                path: path.to_string(),
                expected: "a boolean",
                found: describe(other),
            })
        }
    };
    let performance_class = optional_str(m, "spec.storage", "iopsClass")?
        .unwrap_or(DEFAULT_PERFORMANCE_CLASS)
        .to_string();
    Ok(StorageIntent {
        persistent,
        performance_class,
    })
}

fn load_targets(spec: &Mapping) -> Result<Vec<ProviderId>, SpecError> {
    let Some(list) = optional_seq(spec, "spec", "targets")? else {
        return Ok(Vec::new());
    };
    let mut targets = Vec::with_capacity(list.len());
    for (i, item) in list.iter().enumerate() {
        let path = format!("spec.targets[{}]", i);
        let raw = item.as_str().ok_or_else(|| SpecError::InvalidType {
            path: path.clone(),
            expected: "a string",
            found: describe(item),
        })?;
        let id = ProviderId::new(raw).map_err(|reason| SpecError::InvalidValue { path, reason })?;
        if !targets.contains(&id) {
            targets.push(id);
        }
    }
    Ok(targets)
}

// ============================================================================
// Field access helpers
// ============================================================================

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn get<'a>(m: &'a Mapping, key: &str) -> Option<&'a Value> {
    match m.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v),
    }
}

fn required_map<'a>(m: &'a Mapping, parent: &str, key: &str) -> Result<&'a Mapping, SpecError> {
    optional_map(m, parent, key)?.ok_or_else(|| SpecError::MissingField {
        path: join(parent, key),
    })
}

fn optional_map<'a>(
    m: &'a Mapping,
    parent: &str,
    key: &str,
) -> Result<Option<&'a Mapping>, SpecError> {
    match get(m, key) {
        None => Ok(None),
        Some(Value::Mapping(inner)) => Ok(Some(inner)),
        Some(other) => Err(SpecError::InvalidType {
            path: join(parent, key),
            expected: "a mapping",
            found: describe(other),
        }),
    }
}

fn optional_seq<'a>(
    m: &'a Mapping,
    parent: &str,
    key: &str,
) -> Result<Option<&'a Vec<Value>>, SpecError> {
    match get(m, key) {
        None => Ok(None),
        Some(Value::Sequence(seq)) => Ok(Some(seq)),
        Some(other) => Err(SpecError::InvalidType {
            path: join(parent, key),
            expected: "a list",
            found: describe(other),
        }),
    }
}

fn required_str<'a>(m: &'a Mapping, parent: &str, key: &str) -> Result<&'a str, SpecError> {
    optional_str(m, parent, key)?.ok_or_else(|| SpecError::MissingField {
        path: join(parent, key),
    })
}

fn optional_str<'a>(m: &'a Mapping, parent: &str, key: &str) -> Result<Option<&'a str>, SpecError> {
    match get(m, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(SpecError::InvalidType {
            path: join(parent, key),
            expected: "a string",
            found: describe(other),
        }),
    }
}

fn expect_one_of(path: &str, value: &str, allowed: &[&str]) -> Result<(), SpecError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(SpecError::UnknownEnumValue {
        path: path.to_string(),
        value: value.to_string(),
        allowed: allowed.join(", "),
    })
}

fn check_pattern(path: &str, value: &str, re: &Regex, what: &str) -> Result<(), SpecError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(SpecError::InvalidValue {
            path: path.to_string(),
            reason: format!("'{}' is not {}", value, what),
        })
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string \"{}\"", s),
        Value::Bool(b) => format!("boolean {}", b),
        other => type_name(other).to_string(),
    }
}
