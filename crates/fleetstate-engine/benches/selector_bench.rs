use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fleetstate_engine::selector::{self, Select};
use std::collections::BTreeMap;

type State = BTreeMap<String, i64>;

fn fleet(size: i64) -> State {
    (0..size).map(|n| (format!("d{n}:load"), n)).collect()
}

fn bench_derived_memo_hit(c: &mut Criterion) {
    let state = fleet(1000);
    let loads = selector::root(|s: &State| s.values().copied().collect::<Vec<_>>());
    let total = selector::derived((loads,), |(loads,): &(Vec<i64>,)| loads.iter().sum::<i64>());

    c.bench_function("derived_memo_hit", |b| {
        b.iter(|| black_box(total.select(black_box(&state))))
    });
}

fn bench_derived_recompute(c: &mut Criterion) {
    let state = fleet(1000);
    let loads = selector::root(|s: &State| s.values().copied().collect::<Vec<_>>());
    let total = selector::derived((loads,), |(loads,): &(Vec<i64>,)| loads.iter().sum::<i64>());

    c.bench_function("derived_recompute", |b| {
        b.iter(|| {
            total.invalidate();
            black_box(total.select(black_box(&state)))
        })
    });
}

criterion_group!(benches, bench_derived_memo_hit, bench_derived_recompute);
criterion_main!(benches);
