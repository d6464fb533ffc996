// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// # druckwart-server
//
// The reservation service: a tokio TCP listener speaking minimal HTTP/1.1
// with JSON bodies, exposing the reserve/confirm/cancel settlement protocol
// in front of the credit ledger.  Consumed by the druckwart-watch process.

pub mod http;
pub mod routes;
pub mod server;

pub use server::ReservationServer;
