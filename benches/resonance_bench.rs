use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use anima::anchors::{AnchorCollection, AnchorEntry};
use anima::resonance::score_collection;

const DIM: usize = 1536;

fn build_collection(size: usize) -> AnchorCollection {
    let entries = (0..size)
        .map(|i| {
            let mut embedding = vec![0.0f32; DIM];
            for (j, value) in embedding.iter_mut().enumerate() {
                *value = ((i * 31 + j * 7) % 97) as f32 / 97.0 - 0.5;
            }
            AnchorEntry {
                label: format!("anchor-{i}"),
                embedding,
                metadata: serde_json::Value::Null,
            }
        })
        .collect();
    AnchorCollection::new("bench", entries).unwrap()
}

fn bench_score_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_collection");

    for size in [100usize, 500, 2_000] {
        let collection = build_collection(size);
        let query: Vec<f32> = (0..DIM).map(|j| ((j * 13) % 89) as f32 / 89.0 - 0.5).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let matched =
                    score_collection(black_box(&query), black_box(&collection), 3, 0.25).unwrap();
                black_box(matched.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_score_collection);
criterion_main!(benches);
