#[path = "../util/util.rs"]
mod util;

use util::bench_images;

use std::time::Duration;

use clusterseg::{
    segment, ClusterCount, GmmOptions, HierarchicalOptions, KmeansOptions, Linkage, Method,
    SegmentOptions,
};
use criterion::{
    criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, BenchmarkId, Criterion,
    SamplingMode,
};

fn group<'a>(c: &'a mut Criterion, name: &str) -> BenchmarkGroup<'a, WallTime> {
    let mut group = c.benchmark_group(name);
    group
        .sample_size(10)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(5));
    group
}

fn bench_method(c: &mut Criterion, name: &str, method: Method) {
    let mut group = group(c, name);
    for k in [4u16, 8, 16] {
        let options = SegmentOptions::new()
            .k(ClusterCount::try_from(k).unwrap())
            .method(method);

        for (path, image) in bench_images() {
            group.bench_with_input(BenchmarkId::new(k.to_string(), path), image, |b, image| {
                b.iter(|| segment(image, &options).unwrap());
            });
        }
    }
    group.finish();
}

fn kmeans(c: &mut Criterion) {
    bench_method(c, "kmeans", KmeansOptions::new().into());
}

fn gmm(c: &mut Criterion) {
    bench_method(c, "gmm", GmmOptions::new().into());
}

fn hierarchical(c: &mut Criterion) {
    for linkage in Linkage::ALL {
        bench_method(
            c,
            &format!("hierarchical_{linkage}"),
            HierarchicalOptions::new().linkage(linkage).max_pixels(4096).into(),
        );
    }
}

criterion_group!(benches, kmeans, gmm, hierarchical);
criterion_main!(benches);
