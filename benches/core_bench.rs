//! Benchmarks for nebulaforge core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nebulaforge::core::types::{
    ComputeIntent, NetworkingIntent, ProviderId, StorageIntent, Topology, WorkloadSpec,
};
use nebulaforge::core::{builder, loader, verify};
use nebulaforge::synth::pipeline::{walk_target, Pipeline};
use nebulaforge::synth::registry::MappingRegistry;
use std::sync::Arc;

fn workload(nodes: u64, domains: usize) -> WorkloadSpec {
    WorkloadSpec {
        name: "bench".to_string(),
        namespace: "default".to_string(),
        compute: ComputeIntent {
            nodes,
            instance_class: "medium".to_string(),
        },
        networking: NetworkingIntent {
            topology: Topology::Mesh,
            domains: (0..domains).map(|i| format!("svc{i}.example.com")).collect(),
        },
        storage: StorageIntent {
            persistent: true,
            performance_class: "standard".to_string(),
        },
        targets: vec![],
    }
}

fn bench_load(c: &mut Criterion) {
    let yaml = r#"
apiVersion: infrastructure.nebulaforge.io/v1
kind: WorkloadCluster
metadata:
  name: bench
spec:
  compute:
    nodes: 8
    instanceType: large
  networking:
    topology: star
    ingress:
      domains: [a.example.com, b.example.com]
  storage:
    persistent: true
  targets: [aws, gcp, azure]
"#;
    c.bench_function("load_workload", |b| {
        b.iter(|| {
            let spec = loader::load(black_box(yaml.as_bytes())).unwrap();
            black_box(spec);
        });
    });
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_graph");
    for nodes in [3u64, 10, 30] {
        let spec = workload(nodes, 4);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &spec, |b, spec| {
            b.iter(|| {
                let graph = builder::build(black_box(spec)).unwrap();
                black_box(graph);
            });
        });
    }
    group.finish();
}

fn bench_graph_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_hash");
    for nodes in [3u64, 10, 30] {
        let graph = builder::build(&workload(nodes, 4)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &graph, |b, graph| {
            b.iter(|| black_box(graph.hash()));
        });
    }
    group.finish();
}

fn bench_walk_target(c: &mut Criterion) {
    let registry = MappingRegistry::builtin().unwrap();
    let aws = ProviderId::new("aws").unwrap();
    let version = registry.latest_version(&aws).unwrap().clone();

    let mut group = c.benchmark_group("walk_target_aws");
    for nodes in [3u64, 10, 30] {
        let graph = builder::build(&workload(nodes, 4)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &graph, |b, graph| {
            b.iter(|| {
                let artifacts = walk_target(black_box(graph), &registry, &aws, &version).unwrap();
                black_box(artifacts);
            });
        });
    }
    group.finish();
}

fn bench_synthesize_three_targets(c: &mut Criterion) {
    let graph = builder::build(&workload(10, 4)).unwrap();
    let targets: Vec<ProviderId> = ["aws", "gcp", "azure"]
        .iter()
        .map(|t| ProviderId::new(t).unwrap())
        .collect();
    let registry = Arc::new(MappingRegistry::builtin().unwrap());

    c.bench_function("synthesize_3_targets_full", |b| {
        b.iter(|| {
            // Fresh pipeline per iteration so the cache never short-circuits.
            let pipeline = Pipeline::new(Arc::clone(&registry));
            let outcome = pipeline.synthesize(black_box(&graph), &targets, None).unwrap();
            black_box(outcome);
        });
    });
}

fn bench_verify_plan(c: &mut Criterion) {
    let graph = builder::build(&workload(30, 8)).unwrap();
    c.bench_function("verify_plan_30_nodes", |b| {
        b.iter(|| black_box(verify::plan(black_box(&graph))));
    });
}

criterion_group!(
    benches,
    bench_load,
    bench_build,
    bench_graph_hash,
    bench_walk_target,
    bench_synthesize_three_targets,
    bench_verify_plan
);
criterion_main!(benches);
