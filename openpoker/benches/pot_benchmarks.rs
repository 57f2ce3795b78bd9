//! Pot construction and settlement benchmarks.

use std::collections::HashMap;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use openpoker::game::eval::{rank, HandRank};
use openpoker::game::deck::Deck;
use openpoker::game::pot::{build_pots, settle, Contribution};

fn bench_build_pots(c: &mut Criterion) {
    let contributions: Vec<Contribution> = (0..9)
        .map(|i| Contribution {
            user_id: i + 1,
            amount: (i as u32 + 1) * 37,
            folded: i % 3 == 0,
        })
        .collect();
    c.bench_function("build_pots_nine_way", |b| {
        b.iter(|| build_pots(black_box(&contributions)));
    });
}

fn bench_settlement(c: &mut Criterion) {
    let contributions: Vec<Contribution> = (0..9)
        .map(|i| Contribution {
            user_id: i + 1,
            amount: (i as u32 + 1) * 37,
            folded: false,
        })
        .collect();
    let pots = build_pots(&contributions);
    let mut deck = Deck::shuffled(1);
    let board = deck.deal_board(5);
    let ranks: HashMap<i64, HandRank> = contributions
        .iter()
        .map(|c| (c.user_id, rank(&deck.deal_hole(2), &board)))
        .collect();
    let order: Vec<i64> = contributions.iter().map(|c| c.user_id).collect();
    c.bench_function("settle_nine_way", |b| {
        b.iter(|| settle(black_box(&pots), black_box(&ranks), black_box(&order)));
    });
}

fn bench_hand_evaluation(c: &mut Criterion) {
    let mut deck = Deck::shuffled(5);
    let hole = deck.deal_hole(2);
    let board = deck.deal_board(5);
    c.bench_function("rank_seven_cards", |b| {
        b.iter(|| rank(black_box(&hole), black_box(&board)));
    });
}

criterion_group!(
    benches,
    bench_build_pots,
    bench_settlement,
    bench_hand_evaluation
);
criterion_main!(benches);
