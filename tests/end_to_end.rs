//! End-to-end: workload document to graph, artifact trees, lockfile and incremental rerun.

use nebulaforge::core::types::{ProviderId, ResourceKind};
use nebulaforge::core::{builder, loader, verify};
use nebulaforge::lock::lockfile::Lockfile;
use nebulaforge::synth::cache::SynthesisCache;
use nebulaforge::synth::emit;
use nebulaforge::synth::pipeline::{CancelToken, Pipeline, SynthesisMode};
use nebulaforge::synth::registry::MappingRegistry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const WORKLOAD: &str = r#"
apiVersion: infrastructure.nebulaforge.io/v1
kind: WorkloadCluster
metadata:
  name: primary-web
  namespace: prod
spec:
  compute:
    nodes: 3
    instanceType: medium-ha
  networking:
    topology: mesh
    ingress:
      domains: [example.com]
  storage:
    persistent: true
    iopsClass: standard
  targets: [aws, gcp]
"#;

fn read_tree(dir: &Path) -> BTreeMap<String, String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            (name, std::fs::read_to_string(&path).unwrap())
        })
        .collect()
}

#[test]
fn synthesize_emit_lock_and_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("outputs");
    let lock = Lockfile::new(dir.path().join("nebulaforge.lock"));
    let cache_dir = dir.path().join("cache");
    let registry = Arc::new(MappingRegistry::builtin().unwrap());

    let spec = loader::load(WORKLOAD.as_bytes()).unwrap();
    let graph = builder::build(&spec).unwrap();
    assert_eq!(graph.workload(), "prod/primary-web");
    assert_eq!(graph.len(), 11);

    // First run: nothing recorded yet.
    let pipeline =
        Pipeline::new(Arc::clone(&registry)).with_cache(SynthesisCache::with_dir(&cache_dir));
    assert!(lock.previous_or_none(graph.workload()).is_none());
    let first = pipeline.synthesize(&graph, &spec.targets, None).unwrap();
    assert_eq!(first.mode, SynthesisMode::Full);
    first.check().unwrap();

    let written = emit::write_outcome(&out, graph.name(), &first).unwrap();
    assert_eq!(written.len(), 3);
    let aws_tree = read_tree(&out.join("aws_primary-web"));
    assert_eq!(aws_tree.len(), graph.len());
    assert!(aws_tree["link_0_1.tf"].contains("source_instance_id = module.compute_0.id"));
    assert!(aws_tree["dns_example_com.tf"].contains("module.ingress_example_com.dns_name"));

    let composition =
        std::fs::read_to_string(out.join("crossplane").join("composition.yaml")).unwrap();
    for id in graph.topological_order() {
        assert!(composition.contains(id), "composition lacks {id}");
    }

    lock.commit(graph.workload(), &first.graph_hash, &first.binding, &spec.targets)
        .unwrap();

    // Second run in a new process: same inputs, cache on disk.
    let pipeline =
        Pipeline::new(Arc::clone(&registry)).with_cache(SynthesisCache::with_dir(&cache_dir));
    let previous = lock.previous_or_none(graph.workload());
    assert!(previous.is_some());
    let second = pipeline
        .synthesize(&graph, &spec.targets, previous.as_ref())
        .unwrap();
    assert_eq!(second.mode, SynthesisMode::Incremental);
    assert_eq!(second.artifacts, first.artifacts);
    assert_eq!(second.composition, first.composition);

    emit::write_outcome(&out, graph.name(), &second).unwrap();
    assert_eq!(read_tree(&out.join("aws_primary-web")), aws_tree);
}

#[test]
fn spec_change_forces_full_resynthesis() {
    let dir = tempfile::tempdir().unwrap();
    let lock = Lockfile::new(dir.path().join("nebulaforge.lock"));
    let registry = Arc::new(MappingRegistry::builtin().unwrap());
    let pipeline = Pipeline::new(registry);

    let spec = loader::load(WORKLOAD.as_bytes()).unwrap();
    let graph = builder::build(&spec).unwrap();
    let first = pipeline.synthesize(&graph, &spec.targets, None).unwrap();
    lock.commit(graph.workload(), &first.graph_hash, &first.binding, &spec.targets)
        .unwrap();

    let grown = loader::load(WORKLOAD.replace("nodes: 3", "nodes: 4").as_bytes()).unwrap();
    let graph = builder::build(&grown).unwrap();
    let previous = lock.previous_or_none(graph.workload());
    let second = pipeline
        .synthesize(&graph, &grown.targets, previous.as_ref())
        .unwrap();
    assert_eq!(second.mode, SynthesisMode::Full);
    assert_eq!(
        second.artifacts[&ProviderId::new("aws").unwrap()].len(),
        graph.len()
    );
}

#[test]
fn verification_plan_matches_graph() {
    let spec = loader::load(WORKLOAD.as_bytes()).unwrap();
    let graph = builder::build(&spec).unwrap();
    let plan = verify::plan(&graph);
    assert_eq!(plan.len(), 4);
    assert!(plan.iter().all(|a| a.kind != ResourceKind::NetworkLink));
    assert_eq!(verify::bind_targets(&plan, &spec.targets).len(), 8);
}

#[tokio::test]
async fn concurrent_and_sequential_trees_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let spec = loader::load(WORKLOAD.as_bytes()).unwrap();
    let graph = Arc::new(builder::build(&spec).unwrap());
    let targets: Vec<ProviderId> = ["aws", "gcp", "azure"]
        .iter()
        .map(|t| ProviderId::new(t).unwrap())
        .collect();
    let registry = Arc::new(MappingRegistry::builtin().unwrap());

    let sequential = Pipeline::new(Arc::clone(&registry))
        .synthesize(&graph, &targets, None)
        .unwrap();
    let concurrent = Pipeline::new(registry)
        .synthesize_concurrent(Arc::clone(&graph), &targets, None, &CancelToken::new())
        .await
        .unwrap();

    let a = dir.path().join("a");
    let b = dir.path().join("b");
    emit::write_outcome(&a, graph.name(), &sequential).unwrap();
    emit::write_outcome(&b, graph.name(), &concurrent).unwrap();
    for t in &targets {
        let name = emit::tree_name(t, graph.name());
        assert_eq!(read_tree(&a.join(&name)), read_tree(&b.join(&name)));
    }
}
