//! NF-004: Resource Graph Builder, expands a `WorkloadSpec` into logical resources.
//!
//! Identifiers: `compute-{i}`, `link-{a}-{b}`, `ingress-{domain}`, `dns-{domain}`,
//! `volume-{i}`. The ingress point of every topology is `compute-0`; routes also
//! wait on the links incident to it.

use super::error::BuildError;
use super::graph::ResourceGraph;
use super::types::*;
use std::collections::BTreeSet;
use tracing::debug;

/// Extra dependency edge injected on top of the construction rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOverride {
    pub resource: String,
    pub depends_on: String,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub overrides: Vec<DependencyOverride>,
}

/// Build the resource graph for a workload.
pub fn build(spec: &WorkloadSpec) -> Result<ResourceGraph, BuildError> {
    build_with(spec, &BuildOptions::default())
}

/// Build with explicit dependency overrides. The result is still cycle-checked.
pub fn build_with(spec: &WorkloadSpec, options: &BuildOptions) -> Result<ResourceGraph, BuildError> {
    let nodes = spec.compute.nodes;
    if nodes == 0 {
        return Err(BuildError::EmptyCompute);
    }
    check_domains(&spec.networking.domains)?;
    let edges = topology_edges(spec.networking.topology, nodes)?;

    let mut resources = Vec::new();

    for i in 0..nodes {
        resources.push(
            LogicalResource::new(compute_id(i), ResourceKind::ComputeNode)
                .with_property("index", i)
                .with_property("name", resource_name(&spec.name, &compute_id(i)))
                .with_property("instance_class", spec.compute.instance_class.as_str())
                .with_property("workload", spec.name.as_str())
                .with_property("namespace", spec.namespace.as_str()),
        );
    }

    let ingress_point = ingress_point(spec.networking.topology);
    let mut ingress_deps = BTreeSet::from([compute_id(ingress_point)]);
    for &(a, b) in &edges {
        let id = link_id(a, b);
        if a == ingress_point || b == ingress_point {
            ingress_deps.insert(id.clone());
        }
        resources.push(
            LogicalResource::new(id, ResourceKind::NetworkLink)
                .with_property("from", compute_id(a))
                .with_property("to", compute_id(b))
                .with_property("topology", spec.networking.topology.as_str())
                .with_dependency(compute_id(a))
                .with_dependency(compute_id(b)),
        );
    }

    for domain in &spec.networking.domains {
        let route = ingress_id(domain);
        let mut ingress = LogicalResource::new(route.clone(), ResourceKind::IngressRoute)
            .with_property("domain", domain.as_str())
            .with_property("name", resource_name(&spec.name, &route))
            .with_property("backend", compute_id(ingress_point));
        ingress.depends_on.extend(ingress_deps.iter().cloned());
        resources.push(ingress);

        resources.push(
            LogicalResource::new(dns_id(domain), ResourceKind::DnsRecord)
                .with_property("domain", domain.as_str())
                .with_property("route", route.as_str())
                .with_property("record_type", "CNAME")
                .with_dependency(route),
        );
    }

    if spec.storage.persistent {
        for i in 0..nodes {
            resources.push(
                LogicalResource::new(volume_id(i), ResourceKind::Volume)
                    .with_property("index", i)
                    .with_property("name", resource_name(&spec.name, &volume_id(i)))
                    .with_property("attached_to", compute_id(i))
                    .with_property("performance_class", spec.storage.performance_class.as_str())
                    .with_dependency(compute_id(i)),
            );
        }
    }

    apply_overrides(&mut resources, &options.overrides)?;

    let graph = ResourceGraph::from_resources(spec.qualified_name(), resources)?;
    debug!(
        workload = graph.workload(),
        resources = graph.len(),
        "resource graph built"
    );
    Ok(graph)
}

/// Edge set among compute node indices implied by a topology. Pairs are `(a, b)` with `a < b`.
pub fn topology_edges(topology: Topology, nodes: u64) -> Result<Vec<(u64, u64)>, BuildError> {
    let edges = match topology {
        Topology::Mesh => (0..nodes)
            .flat_map(|a| (a + 1..nodes).map(move |b| (a, b)))
            .collect(),
        Topology::Star => (1..nodes).map(|b| (0, b)).collect(),
        Topology::Ring => {
            if nodes < 3 {
                return Err(BuildError::UnsupportedTopology {
                    topology: topology.to_string(),
                    nodes,
                    reason: "a ring needs at least 3 compute nodes".to_string(),
                });
            }
            let mut edges: Vec<(u64, u64)> = (0..nodes)
                .map(|i| {
                    let j = (i + 1) % nodes;
                    (i.min(j), i.max(j))
                })
                .collect();
            edges.sort_unstable();
            edges
        }
    };
    Ok(edges)
}

/// Compute node index that receives ingress traffic.
pub fn ingress_point(topology: Topology) -> u64 {
    match topology {
        // Star hub, and the lowest-numbered node elsewhere.
        Topology::Star | Topology::Mesh | Topology::Ring => 0,
    }
}

pub fn compute_id(i: u64) -> String {
    format!("compute-{}", i)
}

pub fn volume_id(i: u64) -> String {
    format!("volume-{}", i)
}

pub fn link_id(a: u64, b: u64) -> String {
    format!("link-{}-{}", a, b)
}

pub fn ingress_id(domain: &str) -> String {
    format!("ingress-{}", domain)
}

pub fn dns_id(domain: &str) -> String {
    format!("dns-{}", domain)
}

/// Provider-facing display name: `{workload}-{id}`.
pub fn resource_name(workload: &str, id: &str) -> String {
    format!("{}-{}", workload, id)
}

fn check_domains(domains: &[String]) -> Result<(), BuildError> {
    let mut seen = BTreeSet::new();
    for d in domains {
        if !seen.insert(d.to_ascii_lowercase()) {
            return Err(BuildError::DuplicateDomain(d.clone()));
        }
    }
    Ok(())
}

fn apply_overrides(
    resources: &mut [LogicalResource],
    overrides: &[DependencyOverride],
) -> Result<(), BuildError> {
    for o in overrides {
        let target = resources
            .iter_mut()
            .find(|r| r.id == o.resource)
            .ok_or_else(|| BuildError::UnknownOverrideTarget(o.resource.clone()))?;
        target.depends_on.insert(o.depends_on.clone());
    }
    Ok(())
}
