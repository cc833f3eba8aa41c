//! Benchmarks for the static validation pipeline.
//!
//! Run with: cargo bench
//!
//! The pipeline runs on every submitted snippet before any WebAssembly work,
//! so these measure the per-call overhead the sandbox adds to a hot caller.
//! No interpreter asset is required.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use guardbox::sandbox::{analyzer, lexer, policy::PolicyConfiguration, wrapper};
use guardbox::SandboxOptions;

fn default_policy() -> PolicyConfiguration {
    PolicyConfiguration::from_options(&SandboxOptions::default())
}

fn small_snippet() -> String {
    "total = 0\nfor i in range(100):\n    total += i * i\nprint(total)\n".to_string()
}

// Stays under the structural ceilings so the full pipeline runs clean.
fn medium_snippet() -> String {
    let mut source = String::new();
    for i in 0..8 {
        source.push_str(&format!(
            "def step_{i}(values):\n    result = []\n    for v in values:\n        result.append(v * {i} + len(str(v)))\n    return result\n\n"
        ));
    }
    source.push_str("data = list(range(50))\n");
    for i in 0..8 {
        source.push_str(&format!("data = step_{i}(data)\n"));
    }
    source.push_str("print(sum(data))\n");
    source
}

fn string_heavy_snippet() -> String {
    let mut source = String::new();
    source.push_str("parts = []\n");
    for i in 0..100 {
        source.push_str(&format!(
            "parts.append('fragment {i} with os.system and eval mentioned in text')\n"
        ));
    }
    source.push_str("doc = \"\"\"a long block\nspanning lines\nwith import-like words\"\"\"\n");
    source.push_str("print(len(parts), len(doc))\n");
    source
}

fn bench_validation(c: &mut Criterion) {
    let policy = default_policy();

    let mut group = c.benchmark_group("validation");
    for (name, source) in [
        ("small", small_snippet()),
        ("medium", medium_snippet()),
        ("string_heavy", string_heavy_snippet()),
    ] {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("validate", name), &source, |b, source| {
            b.iter(|| black_box(analyzer::validate(black_box(source), &policy)));
        });
    }
    group.finish();
}

fn bench_rejection_paths(c: &mut Criterion) {
    let policy = default_policy();

    // Denied source where the finding sits at the end, forcing a full scan.
    let mut late_symbol = medium_snippet();
    late_symbol.push_str("eval('1')\n");

    let mut late_pattern = medium_snippet();
    late_pattern.push_str("handle = os.popen('ls')\n");

    let mut group = c.benchmark_group("rejection");
    group.bench_function("late_denied_symbol", |b| {
        b.iter(|| {
            let result = analyzer::validate(black_box(&late_symbol), &policy);
            assert!(result.is_err());
            black_box(result)
        });
    });
    group.bench_function("late_denied_pattern", |b| {
        b.iter(|| {
            let result = analyzer::validate(black_box(&late_pattern), &policy);
            assert!(result.is_err());
            black_box(result)
        });
    });
    group.finish();
}

fn bench_lexer(c: &mut Criterion) {
    let source = medium_snippet();

    let mut group = c.benchmark_group("lexer");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("tokenize_medium", |b| {
        b.iter(|| black_box(lexer::tokenize(black_box(&source))));
    });
    group.bench_function("normalize_medium", |b| {
        b.iter(|| black_box(lexer::normalize(black_box(&source))));
    });
    group.finish();
}

fn bench_instrumentation(c: &mut Criterion) {
    let policy = default_policy();
    let source = medium_snippet();

    let mut group = c.benchmark_group("instrumentation");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("wrap_medium", |b| {
        b.iter(|| black_box(wrapper::wrap(black_box(&source), &policy, "gbx1234_1")));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_validation,
    bench_rejection_paths,
    bench_lexer,
    bench_instrumentation,
);

criterion_main!(benches);
