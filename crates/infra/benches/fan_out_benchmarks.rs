use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use deckgen_core::{OutlineNode, PageOutline, flatten, reconstruct};
use deckgen_infra::FanOut;

fn outline(parts: usize, pages_per_part: usize) -> Vec<OutlineNode> {
    (0..parts)
        .map(|p| {
            if p % 3 == 0 {
                OutlineNode::page(PageOutline::new(format!("Standalone {p}"), ["point"]))
            } else {
                OutlineNode::part(
                    format!("Part {p}"),
                    (0..pages_per_part).map(|i| PageOutline::new(format!("Page {p}.{i}"), ["a", "b"])),
                )
            }
        })
        .collect()
}

/// Spin for roughly `n` iterations to stand in for a unit of work.
fn busy(n: u64) -> u64 {
    (0..n).fold(0u64, |acc, x| acc.wrapping_mul(31).wrapping_add(x))
}

fn bench_fan_out_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_throughput");
    let items: Vec<u64> = (0..64).collect();
    group.throughput(Throughput::Elements(items.len() as u64));

    for workers in [1usize, 2, 5, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(workers), workers, |b, &workers| {
            let fan_out = FanOut::new(workers);
            b.iter(|| {
                let report = fan_out.run(
                    &items,
                    |&n| -> Result<u64, ()> { Ok(busy(10_000 + n)) },
                    |_, _, progress| {
                        black_box(progress);
                    },
                );
                black_box(report.succeeded())
            });
        });
    }

    group.finish();
}

fn bench_fan_out_with_failures(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_failure_isolation");
    let items: Vec<u64> = (0..64).collect();

    group.bench_function("every_fourth_fails", |b| {
        let fan_out = FanOut::new(5);
        b.iter(|| {
            let report = fan_out.run(
                &items,
                |&n| if n % 4 == 0 { Err("boom") } else { Ok(busy(5_000)) },
                |_, _, _| {},
            );
            black_box(report.failed())
        });
    });

    group.finish();
}

fn bench_outline_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("outline_transform");

    for parts in [4usize, 16, 64].iter() {
        let outline = outline(*parts, 5);
        let slots = flatten(&outline);
        group.throughput(Throughput::Elements(slots.len() as u64));

        group.bench_with_input(BenchmarkId::new("flatten", parts), &outline, |b, outline| {
            b.iter(|| black_box(flatten(black_box(outline))));
        });
        group.bench_with_input(BenchmarkId::new("reconstruct", parts), &slots, |b, slots| {
            b.iter(|| black_box(reconstruct(black_box(slots).iter())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fan_out_throughput,
    bench_fan_out_with_failures,
    bench_outline_transform
);
criterion_main!(benches);
