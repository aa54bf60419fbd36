use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use medimg_secure::encryption::{metrics, permutation};
use medimg_secure::{open, seal, seal_with_metrics, Image, ReceiverKeyPair};
use std::time::Duration;

const SIDES: [u16; 3] = [64, 256, 512];

fn rgb_image(side: u16) -> Image {
    let len = side as usize * side as usize * 3;
    let pixels = (0..len).map(|i| (i % 256) as u8).collect();
    Image::new(side, side, 3, pixels).unwrap()
}

fn bench_permutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Permutation");
    group.sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2));

    for side in SIDES {
        let image = rgb_image(side);
        group.throughput(Throughput::Bytes(image.pixels().len() as u64));

        group.bench_with_input(BenchmarkId::new("permute", side), &image, |b, image| {
            b.iter(|| permutation::permute(image.pixels(), 3, 42).unwrap())
        });

        let permuted = permutation::permute(image.pixels(), 3, 42).unwrap();
        group.bench_with_input(BenchmarkId::new("invert", side), &permuted, |b, permuted| {
            b.iter(|| permutation::invert(permuted, 3, 42).unwrap())
        });
    }

    group.finish();
}

fn bench_seal_open(c: &mut Criterion) {
    let receiver = ReceiverKeyPair::generate();
    let mut group = c.benchmark_group("Seal / Open");
    group.sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2));

    for side in SIDES {
        let image = rgb_image(side);
        group.throughput(Throughput::Bytes(image.pixels().len() as u64));

        group.bench_with_input(BenchmarkId::new("seal", side), &image, |b, image| {
            b.iter(|| seal(receiver.public_key(), image).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("seal+metrics", side), &image, |b, image| {
            b.iter(|| seal_with_metrics(receiver.public_key(), image).unwrap())
        });

        let packet = seal(receiver.public_key(), &image).unwrap().encode().unwrap();
        group.bench_with_input(BenchmarkId::new("open", side), &packet, |b, packet| {
            b.iter(|| open(&receiver, packet).unwrap())
        });
    }

    group.finish();
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("Metrics");
    group.sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2));

    for side in SIDES {
        let image = rgb_image(side);
        let permuted = image
            .with_pixels(permutation::permute(image.pixels(), 3, 7).unwrap())
            .unwrap();

        group.bench_with_input(BenchmarkId::new("evaluate", side), &(image, permuted), |b, (a, p)| {
            b.iter(|| metrics::evaluate(a, p))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_permutation, bench_seal_open, bench_metrics);
criterion_main!(benches);
