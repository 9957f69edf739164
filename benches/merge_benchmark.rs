use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;

use damselfly::core::types::{SortOrder, SortableValue};
use damselfly::query::KnnScoreSortOption;
use damselfly::search::merge::build_search_reply;
use damselfly::search::params::{
    FieldReference, SearchParams, SearchResult, SerializedSearchDoc, SortOption,
};

/// Helper to create a shard result with random scores
fn shard_result(shard: usize, docs_per_shard: usize) -> SearchResult {
    let mut rng = rand::thread_rng();
    let docs = (0..docs_per_shard)
        .map(|i| SerializedSearchDoc {
            key: format!("doc:{}:{}", shard, i),
            values: vec![
                ("title".to_string(), SortableValue::Text(format!("title {}", i))),
                ("price".to_string(), SortableValue::Double(rng.gen_range(0.0..100.0))),
            ],
            knn_score: rng.gen_range(0.0..1.0),
            sort_score: SortableValue::Double(rng.gen_range(0.0..100.0)),
        })
        .collect();
    SearchResult { total_hits: docs_per_shard, docs, error: None, profile: None }
}

fn make_results(shards: usize, docs_per_shard: usize) -> Vec<SearchResult> {
    (0..shards).map(|s| shard_result(s, docs_per_shard)).collect()
}

fn bench_plain_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_plain");
    for docs_per_shard in [100, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(docs_per_shard),
            docs_per_shard,
            |b, &docs_per_shard| {
                let params = SearchParams::default();
                b.iter_batched(
                    || make_results(8, docs_per_shard),
                    |results| build_search_reply(black_box(&params), None, results),
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_knn_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_knn_top10");
    let knn = KnnScoreSortOption { score_field_alias: "score".to_string(), limit: 10 };
    for docs_per_shard in [100, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(docs_per_shard),
            docs_per_shard,
            |b, &docs_per_shard| {
                let params = SearchParams::default();
                b.iter_batched(
                    || make_results(8, docs_per_shard),
                    |results| build_search_reply(black_box(&params), Some(&knn), results),
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_sorted_merge(c: &mut Criterion) {
    let params = SearchParams {
        sort_option: Some(SortOption {
            field: FieldReference::new("price", ""),
            order: SortOrder::Desc,
        }),
        ..Default::default()
    };
    c.bench_function("merge_sortby_1k_per_shard", |b| {
        b.iter_batched(
            || make_results(8, 1_000),
            |results| build_search_reply(black_box(&params), None, results),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_plain_merge, bench_knn_merge, bench_sorted_merge);
criterion_main!(benches);
