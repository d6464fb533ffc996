// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// # druckwart-spool
//
// Spooler adapters: the boundary between the credit ledger and physical
// print queues.  The [`SpoolerAdapter`] trait describes the handful of
// operations the job watcher needs (list queued jobs, read a job's status,
// release or remove a job, pause or resume a device queue); [`IppSpooler`]
// implements it over IPP, and [`MemorySpooler`] is a scriptable in-process
// fake for tests.

pub mod adapter;
pub mod ipp;
pub mod memory;
pub mod status;

pub use adapter::{QueuedJob, SpoolerAdapter};
pub use ipp::IppSpooler;
pub use memory::MemorySpooler;
pub use status::StatusClass;
