use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nnet_compiler::compiler::ir::{
    Command, ComponentProperties, Computation, NetworkSpec, NodeKind,
};
use nnet_compiler::compiler::{
    Analyzer, CachingCompiler, CachingCompilerOptions, CheckComputationOptions,
    ComputationChecker, ComputationRequest, IoSpecification, OptimizeOptions, Optimizer,
};
use nnet_compiler::Result;
use std::sync::Arc;

const DIM: usize = 16;

fn network() -> NetworkSpec {
    let mut net = NetworkSpec::new();
    net.add_component("affine", DIM, DIM, ComponentProperties::simple().updatable().needs_input());
    net.add_component("relu", DIM, DIM, ComponentProperties::simple().in_place().needs_output());
    net.add_node("input", NodeKind::Input);
    net.add_node("output", NodeKind::Output);
    net
}

/// `layers` affine+relu pairs over `frames` rows, forward only
fn lower(request: &ComputationRequest, layers: usize) -> Result<Computation> {
    let frames = request.inputs.first().map_or(1, |io| io.indexes.len().max(1));
    let mut c = Computation::new();
    let x = c.new_matrix(frames, DIM);
    let mut commands = vec![Command::AcceptInput { submatrix: x, node: 0 }];
    let mut current = x;
    let mut temporaries = Vec::new();
    for layer in 0..layers {
        let h = c.new_matrix(frames, DIM);
        let y = c.new_matrix(frames, DIM);
        commands.push(Command::AllocMatrixZeroed { submatrix: h });
        commands.push(Command::Propagate {
            component: 0,
            precomputed_indexes: 0,
            input: current,
            output: h,
        });
        commands.push(Command::AllocMatrixZeroed { submatrix: y });
        commands.push(Command::Propagate {
            component: 1,
            precomputed_indexes: 0,
            input: h,
            output: y,
        });
        temporaries.push(h);
        if layer + 1 < layers {
            temporaries.push(y);
        }
        current = y;
    }
    for s in temporaries {
        commands.push(Command::DeallocMatrix { submatrix: s });
    }
    commands.push(Command::ProvideOutput { submatrix: current, node: 1 });
    commands.push(Command::NoOperationMarker);
    c.commands = commands;
    Ok(c)
}

fn request(frames: i32) -> ComputationRequest {
    ComputationRequest::new()
        .input(IoSpecification::with_time_range("input", 0, frames))
        .output(IoSpecification::with_time_range("output", 0, frames))
}

fn analysis_benchmark(c: &mut Criterion) {
    let net = network();
    let mut group = c.benchmark_group("analysis");
    for layers in [4usize, 16, 64].iter() {
        let computation = lower(&request(20), *layers).unwrap();
        group.bench_with_input(BenchmarkId::new("analyzer", layers), &computation, |b, comp| {
            b.iter(|| Analyzer::new(&net, black_box(comp)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("checker", layers), &computation, |b, comp| {
            b.iter(|| {
                let options = CheckComputationOptions { check_rewrite: true };
                ComputationChecker::new(options, &net, black_box(comp))
                    .check()
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn optimizer_benchmark(c: &mut Criterion) {
    let net = network();
    let options = OptimizeOptions::default();
    let mut group = c.benchmark_group("optimizer");
    for layers in [4usize, 16, 64].iter() {
        let request = request(20);
        let computation = lower(&request, *layers).unwrap();
        group.bench_with_input(BenchmarkId::new("pipeline", layers), &computation, |b, comp| {
            b.iter(|| {
                let mut comp = comp.clone();
                Optimizer::new(&options, &net).optimize(&request, &mut comp);
                black_box(comp)
            })
        });
    }
    group.finish();
}

fn cache_benchmark(c: &mut Criterion) {
    let compiler = CachingCompiler::new(
        Arc::new(network()),
        |r: &ComputationRequest| lower(r, 16),
        CachingCompilerOptions::default(),
    );
    let request = request(20);
    compiler.compile(&request).unwrap();
    c.bench_function("cache hit", |b| {
        b.iter(|| compiler.compile(black_box(&request)).unwrap())
    });
}

criterion_group!(benches, analysis_benchmark, optimizer_benchmark, cache_benchmark);
criterion_main!(benches);
