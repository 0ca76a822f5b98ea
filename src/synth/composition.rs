//! NF-010: Crossplane Composition spanning every succeeded target.
//!
//! Resources are keyed by logical identifier, never by provider identifier;
//! each entry lists, per provider, the artifact file and module reference.

use super::emit;
use crate::core::graph::ResourceGraph;
use crate::core::types::{CompositionArtifact, ProviderId, SynthesisArtifact};
use crate::lock::hasher;
use serde::Serialize;
use std::collections::BTreeMap;

pub const COMPOSITION_FILE: &str = "composition.yaml";

const CROSSPLANE_API: &str = "apiextensions.crossplane.io/v1";
const WORKLOAD_API: &str = "infrastructure.nebulaforge.io/v1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Composition {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    spec: CompositionSpec,
}

#[derive(Debug, Serialize)]
struct Metadata {
    name: String,
    labels: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositionSpec {
    composite_type_ref: TypeRef,
    resources: Vec<ComposedResource>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypeRef {
    api_version: &'static str,
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ComposedResource {
    name: String,
    base: ResourceBase,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceBase {
    api_version: &'static str,
    kind: &'static str,
    spec: LogicalSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogicalSpec {
    logical_kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    providers: Vec<ProviderBinding>,
}

#[derive(Debug, Serialize)]
struct ProviderBinding {
    provider: String,
    artifact: String,
    file: String,
    reference: String,
}

/// Build the composition over the given per-provider artifact sets.
pub fn compose(
    graph: &ResourceGraph,
    graph_hash: &str,
    artifacts: &BTreeMap<ProviderId, Vec<SynthesisArtifact>>,
) -> Result<CompositionArtifact, serde_yaml_ng::Error> {
    let by_logical: BTreeMap<(&ProviderId, &str), &SynthesisArtifact> = artifacts
        .iter()
        .flat_map(|(provider, arts)| {
            arts.iter()
                .map(move |a| ((provider, a.logical_id.as_str()), a))
        })
        .collect();

    let resources = graph
        .iter()
        .map(|r| {
            let providers = artifacts
                .keys()
                .filter_map(|provider| by_logical.get(&(provider, r.id.as_str())))
                .map(|a| ProviderBinding {
                    provider: a.provider.to_string(),
                    artifact: a.artifact_kind.clone(),
                    file: format!(
                        "{}/{}",
                        emit::tree_name(&a.provider, graph.name()),
                        a.file_name
                    ),
                    reference: format!("module.{}", a.target_id),
                })
                .collect();
            ComposedResource {
                name: r.id.clone(),
                base: ResourceBase {
                    api_version: WORKLOAD_API,
                    kind: "LogicalResource",
                    spec: LogicalSpec {
                        logical_kind: r.kind.to_string(),
                        depends_on: r.depends_on.iter().cloned().collect(),
                        providers,
                    },
                },
            }
        })
        .collect();

    let composition = Composition {
        api_version: CROSSPLANE_API,
        kind: "Composition",
        metadata: Metadata {
            name: format!("{}-hybrid", graph.workload().replace('/', "-")),
            labels: BTreeMap::from([
                ("nebulaforge.io/workload", graph.name().to_string()),
                (
                    "nebulaforge.io/graph-hash",
                    hasher::short(graph_hash, 16).to_string(),
                ),
            ]),
        },
        spec: CompositionSpec {
            composite_type_ref: TypeRef {
                api_version: WORKLOAD_API,
                kind: "XWorkloadCluster",
            },
            resources,
        },
    };

    Ok(CompositionArtifact {
        file_name: COMPOSITION_FILE.to_string(),
        body: serde_yaml_ng::to_string(&composition)?,
        logical_ids: graph.iter().map(|r| r.id.clone()).collect(),
        providers: artifacts.keys().cloned().collect(),
    })
}
