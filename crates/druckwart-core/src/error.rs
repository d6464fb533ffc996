// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Druckwart.

use thiserror::Error;

/// Top-level error type for all Druckwart operations.
#[derive(Debug, Error)]
pub enum DruckwartError {
    // -- Ledger errors --
    #[error("database error: {0}")]
    Database(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(i64),

    #[error("transaction {id} is not pending (status: {status})")]
    TransactionNotPending { id: i64, status: String },

    // -- Spooler errors --
    #[error("spooler error: {0}")]
    Spooler(String),

    // -- Reservation service errors --
    #[error("reservation API request failed: {0}")]
    Api(String),

    #[error("HTTP server error: {0}")]
    HttpServer(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Plumbing --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DruckwartError>;
