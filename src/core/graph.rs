//! NF-003: Resource graph, a validated DAG of logical resources.
//!
//! Computes topological order with Kahn's algorithm, always releasing the
//! lexically smallest ready identifier first, so identical inputs produce
//! identical orders (and therefore identical artifact trees).

use super::error::BuildError;
use super::types::{LogicalResource, ResourceKind};
use crate::lock::hasher;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Owns the logical resources of one run, stored in topological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGraph {
    workload: String,
    resources: IndexMap<String, LogicalResource>,
}

impl ResourceGraph {
    /// Validate and order a set of resources.
    ///
    /// Fails on duplicate identifiers, dependencies that do not resolve, and cycles.
    pub fn from_resources(
        workload: impl Into<String>,
        resources: Vec<LogicalResource>,
    ) -> Result<Self, BuildError> {
        let mut by_id: FxHashMap<String, LogicalResource> = FxHashMap::default();
        for r in resources {
            if by_id.contains_key(&r.id) {
                return Err(BuildError::DuplicateIdentifier(r.id));
            }
            by_id.insert(r.id.clone(), r);
        }

        let order = topological_order(&by_id)?;

        let mut ordered = IndexMap::with_capacity(order.len());
        for id in order {
            if let Some(r) = by_id.remove(&id) {
                ordered.insert(id, r);
            }
        }

        Ok(Self {
            workload: workload.into(),
            resources: ordered,
        })
    }

    /// Workload identity (`namespace/name`).
    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// Workload name without its namespace.
    pub fn name(&self) -> &str {
        self.workload
            .split_once('/')
            .map_or(self.workload.as_str(), |(_, name)| name)
    }

    pub fn get(&self, id: &str) -> Option<&LogicalResource> {
        self.resources.get(id)
    }

    /// Resources in topological order.
    pub fn iter(&self) -> impl Iterator<Item = &LogicalResource> {
        self.resources.values()
    }

    /// Identifiers in topological order.
    pub fn topological_order(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Position of a resource in topological order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.resources.get_index_of(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn count_of(&self, kind: ResourceKind) -> usize {
        self.iter().filter(|r| r.kind == kind).count()
    }

    /// Content hash of the graph: workload identity plus every resource in order.
    pub fn hash(&self) -> String {
        let mut components: Vec<String> = Vec::with_capacity(self.resources.len() + 1);
        components.push(format!("workload={}", self.workload));
        for r in self.iter() {
            let props: Vec<String> = r
                .properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            let deps: Vec<&str> = r.depends_on.iter().map(String::as_str).collect();
            components.push(format!(
                "{}|{}|{}|{}",
                r.id,
                r.kind,
                props.join(";"),
                deps.join(",")
            ));
        }
        let refs: Vec<&str> = components.iter().map(String::as_str).collect();
        hasher::composite_hash(&refs)
    }
}

/// Kahn's algorithm over `depends_on` edges with a min-heap of ready ids.
fn topological_order(
    resources: &FxHashMap<String, LogicalResource>,
) -> Result<Vec<String>, BuildError> {
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

    for id in resources.keys() {
        in_degree.insert(id.as_str(), 0);
    }

    for (id, resource) in resources {
        for dep in &resource.depends_on {
            if !resources.contains_key(dep) {
                return Err(BuildError::DanglingDependency {
                    resource: id.clone(),
                    dependency: dep.clone(),
                });
            }
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
            *in_degree.entry(id.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<&str>> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(resources.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current.to_string());
        if let Some(next) = dependents.get(current) {
            for &dependent in next {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }
    }

    if order.len() != resources.len() {
        let blocked: FxHashSet<&str> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id)
            .collect();
        let mut members: Vec<String> = blocked
            .iter()
            .filter(|id| on_cycle(id, &blocked, &dependents))
            .map(|id| id.to_string())
            .collect();
        members.sort();
        return Err(BuildError::CyclicDependency { members });
    }

    Ok(order)
}

/// Whether `start` reaches itself through blocked dependents. Nodes that are
/// only downstream of a cycle are blocked too but never reach themselves.
fn on_cycle(
    start: &str,
    blocked: &FxHashSet<&str>,
    dependents: &FxHashMap<&str, Vec<&str>>,
) -> bool {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut stack: Vec<&str> = vec![start];
    while let Some(current) = stack.pop() {
        for &next in dependents.get(current).into_iter().flatten() {
            if next == start {
                return true;
            }
            if blocked.contains(next) && seen.insert(next) {
                stack.push(next);
            }
        }
    }
    false
}
