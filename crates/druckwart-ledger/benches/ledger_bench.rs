// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the reservation hot path and history queries in
// the druckwart-ledger crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use druckwart_core::types::{JobClass, ReserveOutcome};
use druckwart_ledger::{HistoryQuery, Ledger};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark a full reserve-then-confirm settlement round trip against an
/// in-memory SQLite database.
///
/// This is the per-job cost the watcher pays for every metered print: one
/// write transaction debiting the balance plus one status flip.
fn bench_reserve_confirm(c: &mut Criterion) {
    c.bench_function("reserve_confirm (in-memory SQLite)", |b| {
        let mut ledger = Ledger::open_in_memory().expect("open in-memory ledger");
        ledger.create_account("bench", false).expect("create account");

        b.iter(|| {
            // Top up so the drain from prior iterations never causes a deny.
            ledger.deposit("bench", 100, None).expect("deposit failed");
            let outcome = ledger
                .reserve(black_box("bench"), black_box(2), JobClass::Standard)
                .expect("reserve failed");
            let ReserveOutcome::Reserved { transaction_id } = outcome else {
                panic!("expected Reserved, got {outcome:?}");
            };
            ledger.confirm(transaction_id).expect("confirm failed");
            black_box(transaction_id);
        });
    });
}

/// Benchmark a denied reservation, which is read-only and rolls back.
fn bench_reserve_denied(c: &mut Criterion) {
    c.bench_function("reserve_denied (insufficient balance)", |b| {
        let mut ledger = Ledger::open_in_memory().expect("open in-memory ledger");
        ledger.create_account("broke", false).expect("create account");

        b.iter(|| {
            let outcome = ledger
                .reserve(black_box("broke"), black_box(100), JobClass::Premium)
                .expect("reserve failed");
            assert!(matches!(outcome, ReserveOutcome::Denied(_)));
            black_box(outcome);
        });
    });
}

/// Benchmark a paginated history query over a 1000-row transaction table.
fn bench_history_page(c: &mut Criterion) {
    let mut ledger = Ledger::open_in_memory().expect("open in-memory ledger");
    ledger.create_account("bench", false).expect("create account");
    for _ in 0..1000 {
        ledger.deposit("bench", 25, None).expect("deposit failed");
    }

    c.bench_function("history_page (1000 rows, per_page 50)", |b| {
        let query = HistoryQuery {
            per_page: 50,
            ..Default::default()
        };
        b.iter(|| {
            let page = ledger.history(black_box(&query)).expect("history failed");
            assert_eq!(page.transactions.len(), 50);
            black_box(page);
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_confirm,
    bench_reserve_denied,
    bench_history_page,
);
criterion_main!(benches);
