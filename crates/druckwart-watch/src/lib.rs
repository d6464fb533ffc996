// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// # druckwart-watch
//
// The job tracking loop: polls physical print queues through a spooler
// adapter, asks the reservation service whether each newly queued job may
// print, and settles the financial reservation once the job reaches a
// terminal state.  Single-task, single-writer; one poll cycle completes
// before the next begins.

pub mod client;
pub mod tracker;

pub use client::{ReservationApi, ReservationClient};
pub use tracker::JobTracker;
