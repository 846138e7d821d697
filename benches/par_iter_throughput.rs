use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use paraseq::{chunk_load, par_iter, Indexable};

const N: usize = 200_000;

/// A source whose `get` does enough work to make worker parallelism worth
/// measuring, instead of being dominated by channel overhead.
struct Workload;

impl Indexable for Workload {
    type Item = u64;

    fn len(&self) -> usize {
        N
    }

    fn get(&self, index: usize) -> u64 {
        let mut acc = index as u64;
        for _ in 0..64 {
            acc = acc.wrapping_mul(6364136223846793005).wrapping_add(1);
        }
        acc
    }
}

fn bench_par_iter_worker_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("par_iter");
    group.throughput(Throughput::Elements(N as u64));

    for workers in [1isize, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{workers}_workers")),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let mut sum = 0u64;
                    for item in par_iter(Workload, workers) {
                        sum = sum.wrapping_add(black_box(item.unwrap()));
                    }
                    sum
                });
            },
        );
    }

    group.finish();
}

fn bench_chunk_load_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_load");
    group.throughput(Throughput::Elements(N as u64));

    for chunk_size in [256usize, 1024, 4096] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("chunk_{chunk_size}")),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let sources = vec![(0..N as u64).into_iter()];
                    let buffers = vec![vec![0u64; N]];
                    let mut loader = chunk_load(sources, buffers, chunk_size, false);

                    let mut total = 0usize;
                    while let Some(view) = loader.next_chunk() {
                        let view = view.unwrap();
                        total += view.len();
                        black_box(view.lane(0));
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_par_iter_worker_counts, bench_chunk_load_sizes);
criterion_main!(benches);
