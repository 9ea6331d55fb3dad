use criterion::{Criterion, black_box, criterion_group, criterion_main};
use embedding::prepare;

fn bench_prepare(c: &mut Criterion) {
  let clean = "fn main() { println!(\"hello\"); }\n".repeat(60);
  let dirty: String = clean.chars().flat_map(|ch| [ch, '\x01']).collect();

  c.bench_function("prepare_clean_2k", |b| {
    b.iter(|| prepare(black_box(&clean), 2000));
  });

  c.bench_function("prepare_dirty_2k", |b| {
    b.iter(|| prepare(black_box(&dirty), 2000));
  });
}

criterion_group!(benches, bench_prepare);
criterion_main!(benches);
