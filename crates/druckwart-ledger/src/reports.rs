// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transaction history queries, usage statistics, and the administrative
// sweep that conservatively refunds pending reservations orphaned by a
// crashed watcher.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use druckwart_core::error::{DruckwartError, Result};
use druckwart_core::types::{LedgerTransaction, TxStatus, TxType};

use crate::store::{Ledger, db_err, row_to_transaction};

/// Sortable history columns. An enum rather than a raw string so arbitrary
/// column names can never reach the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Timestamp,
    UserId,
    Amount,
    TxType,
    Status,
    Pages,
}

impl SortColumn {
    fn column(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::UserId => "user_id",
            Self::Amount => "amount",
            Self::TxType => "tx_type",
            Self::Status => "status",
            Self::Pages => "pages",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Filter and pagination parameters for a history query.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Substring match on the user id.
    pub user: Option<String>,
    pub tx_type: Option<TxType>,
    pub status: Option<TxStatus>,
    pub sort: SortColumn,
    pub order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            user: None,
            tx_type: None,
            status: None,
            sort: SortColumn::Timestamp,
            order: SortOrder::Desc,
            page: 1,
            per_page: 50,
        }
    }
}

/// One page of history results.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub transactions: Vec<LedgerTransaction>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

/// Reporting window for usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Year,
}

impl Timeframe {
    /// Parse the wire form used by the dashboard ("24h", "1w", "1m", "1y").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "24h" => Some(Self::Day),
            "1w" => Some(Self::Week),
            "1m" => Some(Self::Month),
            "1y" => Some(Self::Year),
            _ => None,
        }
    }

    fn cutoff(&self) -> DateTime<Utc> {
        let span = match self {
            Self::Day => chrono::Duration::days(1),
            Self::Week => chrono::Duration::days(7),
            Self::Month => chrono::Duration::days(30),
            Self::Year => chrono::Duration::days(365),
        };
        Utc::now() - span
    }
}

/// Aggregated print and deposit activity over a timeframe.
///
/// Free accounts are excluded from print figures; pending reservations are
/// counted (they have already debited credit even if not yet settled).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_jobs: i64,
    pub total_pages: i64,
    pub standard_pages: i64,
    pub premium_pages: i64,
    /// Sum of completed print amounts, in cents.
    pub revenue: i64,
    pub total_deposits: i64,
    pub total_deposit_amount: i64,
}

impl Ledger {
    /// Query transaction history with filters, whitelist-sorted column, and
    /// limit/offset pagination.
    #[instrument(skip(self, query))]
    pub fn history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        if query.page == 0 || query.per_page == 0 {
            return Err(DruckwartError::BadRequest(
                "page and per_page must be positive".into(),
            ));
        }

        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(user) = &query.user {
            conditions.push("user_id LIKE ?");
            values.push(format!("%{user}%"));
        }
        if let Some(tx_type) = query.tx_type {
            conditions.push("tx_type = ?");
            values.push(tx_type.as_str().to_string());
        }
        if let Some(status) = query.status {
            conditions.push("status = ?");
            values.push(status.as_str().to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let total: i64 = self
            .conn()
            .query_row(
                &format!("SELECT COUNT(*) FROM transactions {where_clause}"),
                rusqlite::params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        // Sort column and order come from enums, never from caller strings.
        let offset = i64::from(query.page - 1) * i64::from(query.per_page);
        let sql = format!(
            "SELECT id, user_id, amount, pages, tx_type, status,
                    payment_method, description, timestamp
             FROM transactions {where_clause}
             ORDER BY {} {}
             LIMIT {} OFFSET {}",
            query.sort.column(),
            query.order.keyword(),
            query.per_page,
            offset,
        );

        let mut stmt = self.conn().prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), row_to_transaction)
            .map_err(db_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.map_err(db_err)?);
        }

        Ok(HistoryPage {
            transactions,
            page: query.page,
            per_page: query.per_page,
            total,
            total_pages: (total + i64::from(query.per_page) - 1) / i64::from(query.per_page),
        })
    }

    /// Aggregate usage statistics for a timeframe.
    #[instrument(skip(self))]
    pub fn usage_stats(&self, timeframe: Timeframe) -> Result<UsageStats> {
        let cutoff = timeframe.cutoff().to_rfc3339();

        let (total_jobs, total_pages, standard_pages, premium_pages, revenue) = self
            .conn()
            .query_row(
                "SELECT
                     COUNT(*),
                     COALESCE(SUM(t.pages), 0),
                     COALESCE(SUM(CASE WHEN t.tx_type = 'print_standard'
                                       THEN t.pages ELSE 0 END), 0),
                     COALESCE(SUM(CASE WHEN t.tx_type = 'print_premium'
                                       THEN t.pages ELSE 0 END), 0),
                     COALESCE(SUM(CASE WHEN t.status = 'completed'
                                       THEN t.amount ELSE 0 END), 0)
                 FROM transactions t
                 JOIN accounts a ON t.user_id = a.user_id
                 WHERE t.tx_type IN ('print_standard', 'print_premium')
                   AND t.timestamp >= ?1
                   AND a.is_free_account = 0
                   AND t.status IN ('completed', 'pending')",
                params![cutoff],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .map_err(db_err)?;

        let (total_deposits, total_deposit_amount) = self
            .conn()
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(amount), 0)
                 FROM transactions
                 WHERE tx_type = 'deposit'
                   AND status = 'completed'
                   AND timestamp >= ?1",
                params![cutoff],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .map_err(db_err)?;

        Ok(UsageStats {
            total_jobs,
            total_pages,
            standard_pages,
            premium_pages,
            revenue,
            total_deposits,
            total_deposit_amount,
        })
    }

    /// Refund pending print reservations older than `older_than`.
    ///
    /// After a watcher crash, in-flight jobs lose their tracking and their
    /// pending rows would sit forever.  The conservative resolution is a
    /// refund, mirroring the manual cancel-and-refund admin action.  Returns
    /// the refunded transaction ids.
    #[instrument(skip(self))]
    pub fn refund_stale_pending(&mut self, older_than: std::time::Duration) -> Result<Vec<i64>> {
        let span = chrono::Duration::from_std(older_than)
            .map_err(|e| DruckwartError::BadRequest(format!("invalid sweep cutoff: {e}")))?;
        let cutoff = (Utc::now() - span).to_rfc3339();

        let tx = self.conn_mut().transaction().map_err(db_err)?;

        let stale: Vec<(i64, String, i64)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, user_id, amount FROM transactions
                     WHERE status = 'pending'
                       AND tx_type IN ('print_standard', 'print_premium')
                       AND timestamp < ?1
                     ORDER BY id",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![cutoff], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(db_err)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(db_err)?);
            }
            out
        };

        let mut refunded = Vec::with_capacity(stale.len());
        for (id, user_id, amount) in &stale {
            tx.execute(
                "UPDATE accounts SET balance = balance + ?1 WHERE user_id = ?2",
                params![amount, user_id],
            )
            .map_err(db_err)?;
            tx.execute(
                "UPDATE transactions SET status = 'refunded' WHERE id = ?1",
                params![id],
            )
            .map_err(db_err)?;
            warn!(
                transaction_id = id,
                user_id = %user_id,
                amount,
                "stale pending reservation refunded"
            );
            refunded.push(*id);
        }

        tx.commit().map_err(db_err)?;

        if !refunded.is_empty() {
            info!(count = refunded.len(), "stale-pending sweep complete");
        }
        Ok(refunded)
    }
}
