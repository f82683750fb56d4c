//! Benchmarks for ranking and feature extraction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use imgseek::{FeatureExtractor, FeatureVector, SimilarityIndex};

fn create_random_vectors(n: usize, dim: usize) -> Vec<FeatureVector> {
    (0..n)
        .map(|_| {
            let data: Vec<f32> = (0..dim).map(|_| rand::random::<f32>() - 0.5).collect();
            FeatureVector::from_raw(data).unwrap()
        })
        .collect()
}

fn benchmark_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");

    // 4096 matches a VGG fc7 embedding
    for size in [30, 100, 1000].iter() {
        let vectors = create_random_vectors(*size, 4096);
        let index = SimilarityIndex::build(vectors.into_iter().enumerate()).unwrap();
        let query = create_random_vectors(1, 4096).remove(0);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| index.search(black_box(&query), black_box(10)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_index_build(c: &mut Criterion) {
    let vectors = create_random_vectors(30, 4096);
    c.bench_function("build_30x4096", |b| {
        b.iter(|| SimilarityIndex::build(black_box(vectors.clone()).into_iter().enumerate()).unwrap());
    });
}

fn benchmark_thumbnail_extract(c: &mut Criterion) {
    let extractor = FeatureExtractor::thumbnail();
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(640, 480, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }));

    c.bench_function("thumbnail_extract_640x480", |b| {
        b.iter(|| extractor.extract("bench", black_box(&image)).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_ranking,
    benchmark_index_build,
    benchmark_thumbnail_extract
);
criterion_main!(benches);
