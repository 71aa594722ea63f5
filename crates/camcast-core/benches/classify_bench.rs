//! Benchmarks for request classification and part header construction.
//!
//! Run with: `cargo bench -p camcast-core --bench classify_bench`
//!
//! Classification runs once per connection and the part header once per frame
//! per viewer, so the header is the hotter of the two.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use camcast_core::{classify, MjpegFraming};

fn bench_classify(c: &mut Criterion) {
    let lines = [
        "GET / HTTP/1.1",
        "GET /webcam HTTP/1.1",
        "GET /control HTTP/1.1",
        "GET /stream.jpg HTTP/1.1",
        "GET /update?id=3&val=120 HTTP/1.1",
    ];

    let mut group = c.benchmark_group("classify");
    for line in lines {
        group.bench_function(line, |b| b.iter(|| classify(Some(black_box(line)))));
    }
    group.finish();
}

fn bench_part_header(c: &mut Criterion) {
    let framing = MjpegFraming::default();
    c.bench_function("mjpeg_part_header", |b| {
        b.iter(|| framing.part_header(black_box(48_213), black_box(1_718_000_000_123_456)))
    });
}

criterion_group!(benches, bench_classify, bench_part_header);
criterion_main!(benches);
