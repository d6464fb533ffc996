// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Druckwart print-credit system.
//
// All monetary amounts are integers in the smallest currency unit (cents).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Output class of a print job. Each class has its own per-page price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobClass {
    /// Monochrome output.
    Standard,
    /// Colour output.
    Premium,
}

impl JobClass {
    /// Settings key holding the per-page price for this class.
    pub fn price_key(&self) -> &'static str {
        match self {
            Self::Standard => "price_standard",
            Self::Premium => "price_premium",
        }
    }

    /// Built-in per-page price in cents, used when the settings table has no
    /// entry for this class.
    pub fn default_price(&self) -> i64 {
        match self {
            Self::Standard => 5,
            Self::Premium => 20,
        }
    }

    /// Transaction type recorded for a reservation of this class.
    pub fn tx_type(&self) -> TxType {
        match self {
            Self::Standard => TxType::PrintStandard,
            Self::Premium => TxType::PrintPremium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }

    /// Parse the wire form (`"standard"` / `"premium"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Credit purchased by the user.
    Deposit,
    /// Reservation for a standard-class print job.
    PrintStandard,
    /// Reservation for a premium-class print job.
    PrintPremium,
    /// Manual charge entered by an administrator.
    Adjustment,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::PrintStandard => "print_standard",
            Self::PrintPremium => "print_premium",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "print_standard" => Some(Self::PrintStandard),
            "print_premium" => Some(Self::PrintPremium),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }

    /// Whether this transaction type represents a metered print job.
    pub fn is_print(&self) -> bool {
        matches!(self, Self::PrintStandard | Self::PrintPremium)
    }
}

/// Lifecycle states of a ledger transaction.
///
/// Print reservations are created `Pending` and settle to exactly one of
/// `Completed` (job printed) or `Refunded` (job denied, errored, or timed
/// out). Deposits and adjustments are created `Completed` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user account holding prepaid print credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Opaque user identifier (typically the spooler-reported owner name).
    pub user_id: String,
    /// Balance in cents. Never negative — reservations deny instead.
    pub balance: i64,
    /// Free accounts bypass metering entirely; their usage is not logged.
    pub is_free_account: bool,
}

/// A single ledger transaction row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    /// Monotonic id assigned by the store.
    pub id: i64,
    pub user_id: String,
    /// Non-negative magnitude in cents; direction is implied by `tx_type`.
    pub amount: i64,
    /// Page count for print types, 0 otherwise.
    pub pages: i64,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Why a reservation was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The account does not exist — the reservation fails closed.
    UnknownAccount,
    /// The balance does not cover the required amount.
    InsufficientBalance { balance: i64, required: i64 },
}

impl DenyReason {
    /// Human-readable reason string carried on the wire.
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownAccount => "user not found",
            Self::InsufficientBalance { .. } => "insufficient balance",
        }
    }
}

/// Outcome of a reservation attempt. A business-rule denial is a normal
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Free account — admitted with no balance mutation and no ledger row.
    Free,
    /// Balance debited and a pending transaction created. The caller must
    /// eventually confirm or cancel exactly once.
    Reserved { transaction_id: i64 },
    /// The job must not print.
    Denied(DenyReason),
}

// ---------------------------------------------------------------------------
// Wire types for the reservation API
// ---------------------------------------------------------------------------

/// Body of `POST /api/print/reserve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub user_id: String,
    pub pages: i64,
    pub job_class: JobClass,
}

/// Response of `POST /api/print/reserve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_free: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<i64>,
}

impl ReserveResponse {
    /// Build the wire response from a domain outcome.
    pub fn from_outcome(outcome: &ReserveOutcome) -> Self {
        match outcome {
            ReserveOutcome::Free => Self {
                allowed: true,
                is_free: Some(true),
                transaction_id: None,
                reason: None,
                balance: None,
                required: None,
            },
            ReserveOutcome::Reserved { transaction_id } => Self {
                allowed: true,
                is_free: Some(false),
                transaction_id: Some(*transaction_id),
                reason: None,
                balance: None,
                required: None,
            },
            ReserveOutcome::Denied(reason) => {
                let (balance, required) = match reason {
                    DenyReason::InsufficientBalance { balance, required } => {
                        (Some(*balance), Some(*required))
                    }
                    DenyReason::UnknownAccount => (None, None),
                };
                Self {
                    allowed: false,
                    is_free: None,
                    transaction_id: None,
                    reason: Some(reason.message().to_string()),
                    balance,
                    required,
                }
            }
        }
    }
}

/// Body of `POST /api/print/confirm` and `POST /api/print/cancel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub transaction_id: i64,
}

/// Success response for confirm/cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleResponse {
    pub success: bool,
}

/// Machine-readable error body returned with a 4xx/5xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}
