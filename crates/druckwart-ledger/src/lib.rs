// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Druckwart Ledger — durable, transactional storage of accounts, transaction
// records, and pricing, plus the reserve/confirm/cancel settlement protocol.
// Every balance mutation happens in the same SQLite transaction as the ledger
// row it belongs to.

pub mod pricing;
pub mod reports;
pub mod store;

pub use reports::{HistoryPage, HistoryQuery, SortColumn, SortOrder, Timeframe, UsageStats};
pub use store::Ledger;
