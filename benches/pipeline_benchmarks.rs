//! Criterion Benchmarks for the Log Pipeline
//! Micro-benchmarks for the per-record hot path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gridshield::config::IngestConfig;
use gridshield::ingest::{Normalizer, ParserRegistry};
use gridshield::ml::FeatureExtractor;

const JSON_LINE: &str =
    r#"{"message":"Failed password for admin from 203.0.113.4 port 22","level":"ERROR","src_ip":"203.0.113.4","port":22,"protocol":"tcp"}"#;
const SYSLOG_LINE: &str = "<34>Oct 11 22:14:15 scada-gw sshd: Failed password for operator";

fn benchmark_parse_json(c: &mut Criterion) {
    let registry = ParserRegistry::new(&IngestConfig::default());
    c.bench_function("parse_json_line", |b| {
        b.iter(|| registry.parse(black_box(JSON_LINE), None, None))
    });
}

fn benchmark_parse_syslog(c: &mut Criterion) {
    let registry = ParserRegistry::new(&IngestConfig::default());
    c.bench_function("parse_syslog_line", |b| {
        b.iter(|| registry.parse(black_box(SYSLOG_LINE), None, None))
    });
}

fn benchmark_normalize(c: &mut Criterion) {
    let registry = ParserRegistry::new(&IngestConfig::default());
    let normalizer = Normalizer::new(&IngestConfig::default());
    let parsed = registry.parse(JSON_LINE, None, None).unwrap();
    c.bench_function("normalize_record", |b| {
        b.iter(|| normalizer.normalize(black_box(parsed.clone()), black_box(JSON_LINE), "bench"))
    });
}

fn benchmark_feature_extraction(c: &mut Criterion) {
    let registry = ParserRegistry::new(&IngestConfig::default());
    let normalizer = Normalizer::new(&IngestConfig::default());
    let parsed = registry.parse(JSON_LINE, None, None).unwrap();
    let record = normalizer.normalize(parsed, JSON_LINE, "bench");
    let extractor = FeatureExtractor::new();
    c.bench_function("extract_features", |b| {
        b.iter(|| extractor.extract(black_box(&record)))
    });
}

criterion_group!(
    benches,
    benchmark_parse_json,
    benchmark_parse_syslog,
    benchmark_normalize,
    benchmark_feature_extraction,
);
criterion_main!(benches);
