//! NF-013: Verification Planner: expected-state assertions from the graph.
//!
//! Pure and read-only. Nothing here polls infrastructure; the plan is handed to
//! an external live checker after apply.

use super::graph::ResourceGraph;
use super::types::{AssertionCheck, ProviderId, ResourceKind, VerificationAssertion};

/// Derive the ordered assertion list for a graph.
///
/// Compute nodes and volumes aggregate into one count assertion each; ingress
/// routes and DNS records get one assertion per resource, keyed by domain.
/// Network links have no observable state of their own and produce nothing.
pub fn plan(graph: &ResourceGraph) -> Vec<VerificationAssertion> {
    let mut assertions: Vec<(usize, VerificationAssertion)> = Vec::new();

    for (kind, check, state) in [
        (ResourceKind::ComputeNode, AssertionCheck::RunningCount, "running"),
        (ResourceKind::Volume, AssertionCheck::AttachedCount, "attached"),
    ] {
        let members: Vec<(usize, String)> = graph
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == kind)
            .map(|(i, r)| (i, r.id.clone()))
            .collect();
        if let Some(&(first, _)) = members.first() {
            assertions.push((
                first,
                VerificationAssertion {
                    kind,
                    check,
                    expected_count: members.len(),
                    expected_state: state.to_string(),
                    endpoint: None,
                    resources: members.into_iter().map(|(_, id)| id).collect(),
                },
            ));
        }
    }

    for (position, resource) in graph.iter().enumerate() {
        let (check, state) = match resource.kind {
            ResourceKind::IngressRoute => (AssertionCheck::Reachability, "reachable"),
            ResourceKind::DnsRecord => (AssertionCheck::Propagation, "propagated"),
            ResourceKind::ComputeNode | ResourceKind::Volume | ResourceKind::NetworkLink => {
                continue
            }
        };
        let endpoint = resource
            .properties
            .get("domain")
            .and_then(|d| d.as_text())
            .map(str::to_string);
        assertions.push((
            position,
            VerificationAssertion {
                kind: resource.kind,
                check,
                expected_count: 1,
                expected_state: state.to_string(),
                endpoint,
                resources: vec![resource.id.clone()],
            },
        ));
    }

    assertions.sort_by_key(|(position, _)| *position);
    assertions.into_iter().map(|(_, a)| a).collect()
}

/// Pair every assertion with every target, for the live checker.
pub fn bind_targets<'a>(
    plan: &'a [VerificationAssertion],
    targets: &'a [ProviderId],
) -> Vec<(&'a ProviderId, &'a VerificationAssertion)> {
    targets
        .iter()
        .flat_map(|t| plan.iter().map(move |a| (t, a)))
        .collect()
}
