use criterion::{criterion_group, criterion_main, Criterion};

use kinfu::bilateral::BilateralFilter;
use ndarray::Array2;

fn criterion_benchmark(c: &mut Criterion) {
    let depth = Array2::from_shape_fn((480, 640), |(y, x)| 1200 + ((x * 7 + y * 3) % 64) as u16);
    let mut filtered = Array2::<u16>::zeros((480, 640));

    c.bench_function("bilateral filter 640x480", |b| {
        b.iter(|| {
            BilateralFilter::default().filter(&depth, &mut filtered);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
