//! Benchmarks for move generation and perft throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ataxx_engine::perft::perft;
use ataxx_engine::position::Position;

fn bench_perft(c: &mut Criterion) {
    let mut group = c.benchmark_group("perft");

    for depth in 1..=4 {
        group.bench_with_input(BenchmarkId::new("startpos", depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut pos = Position::startpos();
                perft(&mut pos, black_box(depth))
            })
        });
    }

    group.finish();
}

fn bench_movegen(c: &mut Criterion) {
    let mut group = c.benchmark_group("movegen");

    let startpos = Position::startpos();
    group.bench_function("startpos", |b| {
        b.iter(|| black_box(ataxx_engine::movegen::generate_moves(&startpos)))
    });

    // A few plies in, with more pieces and a wider move list than the start.
    let mut midgame = Position::startpos();
    for _ in 0..6 {
        let moves = ataxx_engine::movegen::generate_moves(&midgame);
        if let Some(&mv) = moves.first() {
            midgame.make_move(mv);
        }
    }
    group.bench_function("midgame", |b| {
        b.iter(|| black_box(ataxx_engine::movegen::generate_moves(&midgame)))
    });

    group.finish();
}

criterion_group!(benches, bench_perft, bench_movegen);
criterion_main!(benches);
