// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The credit ledger, backed by SQLite.
//
// Three tables: accounts (balance + free flag), transactions (append-mostly
// financial records), and settings (pricing key-value pairs).  The
// reserve/confirm/cancel protocol runs each balance mutation and its
// transaction-row change inside one SQLite transaction, so a concurrent
// caller can never observe a debit without its pending row or vice versa.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument, warn};

use druckwart_core::error::{DruckwartError, Result};
use druckwart_core::types::{
    Account, DenyReason, JobClass, LedgerTransaction, ReserveOutcome, TxStatus, TxType,
};

/// SQLite schema. The CHECK constraints mirror the enum wire forms so a
/// corrupted writer cannot smuggle in an unknown type or status.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
        user_id TEXT PRIMARY KEY,
        balance INTEGER NOT NULL DEFAULT 0,
        is_free_account INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        amount INTEGER NOT NULL,
        pages INTEGER NOT NULL DEFAULT 0,
        tx_type TEXT NOT NULL CHECK(tx_type IN
            ('deposit', 'print_standard', 'print_premium', 'adjustment')),
        status TEXT NOT NULL CHECK(status IN
            ('pending', 'completed', 'failed', 'refunded')),
        payment_method TEXT,
        description TEXT,
        timestamp TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES accounts(user_id)
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// Convert a `rusqlite::Error` into a `DruckwartError::Database`.
pub(crate) fn db_err(e: rusqlite::Error) -> DruckwartError {
    DruckwartError::Database(e.to_string())
}

/// The credit ledger.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  In an async context, share the ledger behind a mutex; SQLite
/// operations here are all sub-millisecond.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger database at the given path.
    ///
    /// Applies WAL journal mode, creates the tables if missing, and seeds
    /// the default per-page prices.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| DruckwartError::Database(format!("open: {e}")))?;

        // WAL survives unclean shutdowns more gracefully and lets dashboard
        // readers coexist with the reservation writer.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| DruckwartError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| DruckwartError::Database(format!("create tables: {e}")))?;

        crate::pricing::ensure_default_prices(&conn)?;

        info!("ledger database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory ledger (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DruckwartError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| DruckwartError::Database(format!("create tables: {e}")))?;

        crate::pricing::ensure_default_prices(&conn)?;

        debug!("in-memory ledger opened");
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // -- Accounts ------------------------------------------------------------

    /// Create a new account with zero balance.
    #[instrument(skip(self))]
    pub fn create_account(&mut self, user_id: &str, is_free_account: bool) -> Result<Account> {
        if self.get_account(user_id)?.is_some() {
            return Err(DruckwartError::AccountExists(user_id.to_string()));
        }

        self.conn
            .execute(
                "INSERT INTO accounts (user_id, balance, is_free_account) VALUES (?1, 0, ?2)",
                params![user_id, is_free_account as i64],
            )
            .map_err(db_err)?;

        info!(user_id, is_free_account, "account created");
        Ok(Account {
            user_id: user_id.to_string(),
            balance: 0,
            is_free_account,
        })
    }

    /// Retrieve a single account by user id.
    pub fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        self.conn
            .query_row(
                "SELECT user_id, balance, is_free_account FROM accounts WHERE user_id = ?1",
                params![user_id],
                row_to_account,
            )
            .optional()
            .map_err(db_err)
    }

    /// Toggle the free-account flag on an existing account.
    #[instrument(skip(self))]
    pub fn set_free_account(&mut self, user_id: &str, is_free_account: bool) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE accounts SET is_free_account = ?1 WHERE user_id = ?2",
                params![is_free_account as i64, user_id],
            )
            .map_err(db_err)?;

        if rows == 0 {
            return Err(DruckwartError::AccountNotFound(user_id.to_string()));
        }

        info!(user_id, is_free_account, "free-account flag updated");
        Ok(())
    }

    /// Delete an account together with its full transaction history.
    ///
    /// The cascade keeps the foreign key honest: an account is never removed
    /// while transactions still reference it.
    #[instrument(skip(self))]
    pub fn delete_account(&mut self, user_id: &str) -> Result<()> {
        if self.get_account(user_id)?.is_none() {
            return Err(DruckwartError::AccountNotFound(user_id.to_string()));
        }

        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM transactions WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(db_err)?;
        tx.execute("DELETE FROM accounts WHERE user_id = ?1", params![user_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        info!(user_id, "account and transaction history deleted");
        Ok(())
    }

    /// List accounts, optionally filtered by a user-id substring.
    pub fn list_accounts(&self, search: Option<&str>) -> Result<Vec<Account>> {
        let mut out = Vec::new();

        match search {
            Some(needle) => {
                let mut stmt = self
                    .conn
                    .prepare(
                        "SELECT user_id, balance, is_free_account FROM accounts
                         WHERE user_id LIKE ?1 ORDER BY user_id",
                    )
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![format!("%{needle}%")], row_to_account)
                    .map_err(db_err)?;
                for row in rows {
                    out.push(row.map_err(db_err)?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(
                        "SELECT user_id, balance, is_free_account FROM accounts
                         ORDER BY user_id",
                    )
                    .map_err(db_err)?;
                let rows = stmt.query_map([], row_to_account).map_err(db_err)?;
                for row in rows {
                    out.push(row.map_err(db_err)?);
                }
            }
        }

        Ok(out)
    }

    // -- Deposits and manual charges -----------------------------------------

    /// Credit an account, creating it on first deposit if necessary.
    ///
    /// Returns the new balance.  The balance mutation and the completed
    /// `deposit` row land in one SQLite transaction.
    #[instrument(skip(self))]
    pub fn deposit(
        &mut self,
        user_id: &str,
        amount: i64,
        payment_method: Option<&str>,
    ) -> Result<i64> {
        if amount <= 0 {
            return Err(DruckwartError::BadRequest(
                "deposit amount must be positive".into(),
            ));
        }

        let tx = self.conn.transaction().map_err(db_err)?;

        // First deposit provisions the account.
        tx.execute(
            "INSERT INTO accounts (user_id, balance, is_free_account)
             VALUES (?1, 0, 0)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE accounts SET balance = balance + ?1 WHERE user_id = ?2",
            params![amount, user_id],
        )
        .map_err(db_err)?;

        tx.execute(
            "INSERT INTO transactions (user_id, amount, pages, tx_type, status,
                                       payment_method, timestamp)
             VALUES (?1, ?2, 0, 'deposit', 'completed', ?3, ?4)",
            params![user_id, amount, payment_method, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;

        let new_balance: i64 = tx
            .query_row(
                "SELECT balance FROM accounts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        info!(user_id, amount, new_balance, "deposit recorded");
        Ok(new_balance)
    }

    /// Debit an account for a manual administrative charge.
    ///
    /// Requires a non-empty description so the adjustment is explainable
    /// later.  Returns the new balance.
    #[instrument(skip(self, description))]
    pub fn charge(&mut self, user_id: &str, amount: i64, description: &str) -> Result<i64> {
        if amount <= 0 {
            return Err(DruckwartError::BadRequest(
                "charge amount must be positive".into(),
            ));
        }
        if description.trim().is_empty() {
            return Err(DruckwartError::BadRequest(
                "charge description must not be empty".into(),
            ));
        }

        let tx = self.conn.transaction().map_err(db_err)?;

        let balance: Option<i64> = tx
            .query_row(
                "SELECT balance FROM accounts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let balance = balance.ok_or_else(|| DruckwartError::AccountNotFound(user_id.to_string()))?;

        if balance < amount {
            return Err(DruckwartError::BadRequest(format!(
                "insufficient balance: {balance} < {amount}"
            )));
        }

        tx.execute(
            "UPDATE accounts SET balance = balance - ?1 WHERE user_id = ?2",
            params![amount, user_id],
        )
        .map_err(db_err)?;

        tx.execute(
            "INSERT INTO transactions (user_id, amount, pages, tx_type, status,
                                       description, timestamp)
             VALUES (?1, ?2, 0, 'adjustment', 'completed', ?3, ?4)",
            params![user_id, amount, description.trim(), Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        let new_balance = balance - amount;
        info!(user_id, amount, new_balance, "manual charge recorded");
        Ok(new_balance)
    }

    // -- Reservation protocol ------------------------------------------------

    /// Reserve credit for a print job: debit the required amount and create a
    /// pending transaction, or deny.
    ///
    /// Denials (unknown account, insufficient balance) are business outcomes,
    /// not errors.  A non-positive page count is a caller error.
    #[instrument(skip(self))]
    pub fn reserve(
        &mut self,
        user_id: &str,
        pages: i64,
        job_class: JobClass,
    ) -> Result<ReserveOutcome> {
        if pages <= 0 {
            return Err(DruckwartError::BadRequest(
                "page count must be positive".into(),
            ));
        }

        let tx = self.conn.transaction().map_err(db_err)?;

        let account: Option<(i64, bool)> = tx
            .query_row(
                "SELECT balance, is_free_account FROM accounts WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()
            .map_err(db_err)?;

        let (balance, is_free) = match account {
            Some(a) => a,
            None => {
                warn!(user_id, "reserve denied: unknown account");
                return Ok(ReserveOutcome::Denied(DenyReason::UnknownAccount));
            }
        };

        // Free usage is never metered and never logged.
        if is_free {
            debug!(user_id, "free account — reservation bypasses metering");
            return Ok(ReserveOutcome::Free);
        }

        let price = crate::pricing::price_in(&tx, job_class)?;
        let required = price * pages;

        if balance < required {
            info!(
                user_id,
                balance, required, "reserve denied: insufficient balance"
            );
            return Ok(ReserveOutcome::Denied(DenyReason::InsufficientBalance {
                balance,
                required,
            }));
        }

        tx.execute(
            "UPDATE accounts SET balance = balance - ?1 WHERE user_id = ?2",
            params![required, user_id],
        )
        .map_err(db_err)?;

        tx.execute(
            "INSERT INTO transactions (user_id, amount, pages, tx_type, status, timestamp)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![
                user_id,
                required,
                pages,
                job_class.tx_type().as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_err)?;

        let transaction_id = tx.last_insert_rowid();
        tx.commit().map_err(db_err)?;

        info!(
            user_id,
            pages,
            class = %job_class,
            amount = required,
            transaction_id,
            "credit reserved"
        );
        Ok(ReserveOutcome::Reserved { transaction_id })
    }

    /// Settle a pending reservation as completed.
    ///
    /// The debit already happened at reserve time, so no balance change.
    /// Confirming a non-pending transaction is a state-conflict error, never
    /// silently accepted — that is the idempotency boundary that makes
    /// double-settlement bugs visible.
    #[instrument(skip(self))]
    pub fn confirm(&mut self, transaction_id: i64) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM transactions WHERE id = ?1",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let status = status.ok_or(DruckwartError::TransactionNotFound(transaction_id))?;
        if status != TxStatus::Pending.as_str() {
            return Err(DruckwartError::TransactionNotPending {
                id: transaction_id,
                status,
            });
        }

        tx.execute(
            "UPDATE transactions SET status = 'completed' WHERE id = ?1",
            params![transaction_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        info!(transaction_id, "reservation confirmed");
        Ok(())
    }

    /// Settle a pending reservation as refunded: credit the amount back and
    /// mark the transaction refunded, atomically.
    ///
    /// Same not-found / not-pending guards as [`confirm`](Self::confirm).
    #[instrument(skip(self))]
    pub fn cancel(&mut self, transaction_id: i64) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;

        let row: Option<(String, i64, String)> = tx
            .query_row(
                "SELECT user_id, amount, status FROM transactions WHERE id = ?1",
                params![transaction_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;

        let (user_id, amount, status) =
            row.ok_or(DruckwartError::TransactionNotFound(transaction_id))?;
        if status != TxStatus::Pending.as_str() {
            return Err(DruckwartError::TransactionNotPending {
                id: transaction_id,
                status,
            });
        }

        tx.execute(
            "UPDATE accounts SET balance = balance + ?1 WHERE user_id = ?2",
            params![amount, user_id],
        )
        .map_err(db_err)?;

        tx.execute(
            "UPDATE transactions SET status = 'refunded' WHERE id = ?1",
            params![transaction_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        info!(transaction_id, user_id, amount, "reservation refunded");
        Ok(())
    }

    /// Retrieve a single transaction by id.
    pub fn get_transaction(&self, transaction_id: i64) -> Result<Option<LedgerTransaction>> {
        self.conn
            .query_row(
                "SELECT id, user_id, amount, pages, tx_type, status,
                        payment_method, description, timestamp
                 FROM transactions WHERE id = ?1",
                params![transaction_id],
                row_to_transaction,
            )
            .optional()
            .map_err(db_err)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        user_id: row.get(0)?,
        balance: row.get(1)?,
        is_free_account: row.get::<_, i64>(2)? != 0,
    })
}

/// Map a SQLite row to a `LedgerTransaction`.
///
/// Column indices must match the SELECT order used in the query methods.
pub(crate) fn row_to_transaction(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<LedgerTransaction> {
    let tx_type_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let timestamp_str: String = row.get(8)?;

    let tx_type = TxType::parse(&tx_type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown tx_type '{tx_type_str}'").into(),
        )
    })?;

    let status = TxStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown status '{status_str}'").into(),
        )
    })?;

    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

    Ok(LedgerTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        pages: row.get(3)?,
        tx_type,
        status,
        payment_method: row.get(6)?,
        description: row.get(7)?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: ledger with one funded account.
    fn ledger_with(user: &str, balance: i64) -> Ledger {
        let mut ledger = Ledger::open_in_memory().expect("open in-memory ledger");
        ledger.create_account(user, false).expect("create account");
        if balance > 0 {
            ledger.deposit(user, balance, None).expect("fund account");
        }
        ledger
    }

    #[test]
    fn reserve_debits_and_creates_pending_row() {
        // Scenario: balance 100, standard price 5, 10 pages.
        let mut ledger = ledger_with("alice", 100);

        let outcome = ledger
            .reserve("alice", 10, JobClass::Standard)
            .expect("reserve");
        let transaction_id = match outcome {
            ReserveOutcome::Reserved { transaction_id } => transaction_id,
            other => panic!("expected Reserved, got {other:?}"),
        };

        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 50);

        let tx = ledger
            .get_transaction(transaction_id)
            .expect("get tx")
            .expect("exists");
        assert_eq!(tx.amount, 50);
        assert_eq!(tx.pages, 10);
        assert_eq!(tx.tx_type, TxType::PrintStandard);
        assert_eq!(tx.status, TxStatus::Pending);
    }

    #[test]
    fn reserve_denies_insufficient_balance_without_mutation() {
        let mut ledger = ledger_with("alice", 50);

        let outcome = ledger
            .reserve("alice", 30, JobClass::Standard)
            .expect("reserve");
        assert_eq!(
            outcome,
            ReserveOutcome::Denied(DenyReason::InsufficientBalance {
                balance: 50,
                required: 150,
            })
        );

        // No mutation happened: balance intact, no new pending row.
        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 50);
    }

    #[test]
    fn reserve_fails_closed_for_unknown_account() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        let outcome = ledger
            .reserve("ghost", 1, JobClass::Standard)
            .expect("reserve");
        assert_eq!(outcome, ReserveOutcome::Denied(DenyReason::UnknownAccount));
    }

    #[test]
    fn free_account_bypasses_metering_and_logging() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger.create_account("prof1", true).expect("create");

        let outcome = ledger
            .reserve("prof1", 100, JobClass::Premium)
            .expect("reserve");
        assert_eq!(outcome, ReserveOutcome::Free);

        // No row was created and the balance is untouched.
        let account = ledger.get_account("prof1").expect("get").expect("exists");
        assert_eq!(account.balance, 0);
        assert!(ledger.get_transaction(1).expect("query").is_none());
    }

    #[test]
    fn zero_pages_is_a_caller_error() {
        let mut ledger = ledger_with("alice", 100);
        let err = ledger.reserve("alice", 0, JobClass::Standard).unwrap_err();
        assert!(matches!(err, DruckwartError::BadRequest(_)));
    }

    #[test]
    fn confirm_completes_without_balance_change() {
        let mut ledger = ledger_with("alice", 100);
        let ReserveOutcome::Reserved { transaction_id } = ledger
            .reserve("alice", 10, JobClass::Standard)
            .expect("reserve")
        else {
            panic!("expected Reserved");
        };

        ledger.confirm(transaction_id).expect("confirm");

        let tx = ledger
            .get_transaction(transaction_id)
            .expect("get")
            .expect("exists");
        assert_eq!(tx.status, TxStatus::Completed);
        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 50);
    }

    #[test]
    fn cancel_refunds_and_terminal_transitions_conflict() {
        // Scenario 4: pending amount 50, cancel refunds, then both settle
        // calls conflict.
        let mut ledger = ledger_with("alice", 100);
        let ReserveOutcome::Reserved { transaction_id } = ledger
            .reserve("alice", 10, JobClass::Standard)
            .expect("reserve")
        else {
            panic!("expected Reserved");
        };

        ledger.cancel(transaction_id).expect("cancel");

        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 100);
        let tx = ledger
            .get_transaction(transaction_id)
            .expect("get")
            .expect("exists");
        assert_eq!(tx.status, TxStatus::Refunded);

        // Second settlement attempts are state conflicts, and the balance is
        // not mutated again.
        assert!(matches!(
            ledger.confirm(transaction_id).unwrap_err(),
            DruckwartError::TransactionNotPending { .. }
        ));
        assert!(matches!(
            ledger.cancel(transaction_id).unwrap_err(),
            DruckwartError::TransactionNotPending { .. }
        ));
        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 100);
    }

    #[test]
    fn double_confirm_is_rejected() {
        let mut ledger = ledger_with("alice", 100);
        let ReserveOutcome::Reserved { transaction_id } = ledger
            .reserve("alice", 1, JobClass::Standard)
            .expect("reserve")
        else {
            panic!("expected Reserved");
        };

        ledger.confirm(transaction_id).expect("first confirm");
        assert!(matches!(
            ledger.confirm(transaction_id).unwrap_err(),
            DruckwartError::TransactionNotPending { .. }
        ));
    }

    #[test]
    fn settle_unknown_transaction_is_not_found() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        assert!(matches!(
            ledger.confirm(999).unwrap_err(),
            DruckwartError::TransactionNotFound(999)
        ));
        assert!(matches!(
            ledger.cancel(999).unwrap_err(),
            DruckwartError::TransactionNotFound(999)
        ));
    }

    #[test]
    fn deposit_provisions_missing_account() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        let balance = ledger.deposit("newcomer", 500, Some("cash")).expect("deposit");
        assert_eq!(balance, 500);

        let account = ledger
            .get_account("newcomer")
            .expect("get")
            .expect("provisioned");
        assert!(!account.is_free_account);
    }

    #[test]
    fn deposit_rejects_non_positive_amount() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        assert!(matches!(
            ledger.deposit("alice", 0, None).unwrap_err(),
            DruckwartError::BadRequest(_)
        ));
        assert!(matches!(
            ledger.deposit("alice", -5, None).unwrap_err(),
            DruckwartError::BadRequest(_)
        ));
    }

    #[test]
    fn charge_requires_description_and_funds() {
        let mut ledger = ledger_with("alice", 100);

        assert!(matches!(
            ledger.charge("alice", 10, "   ").unwrap_err(),
            DruckwartError::BadRequest(_)
        ));
        assert!(matches!(
            ledger.charge("alice", 500, "lost key fee").unwrap_err(),
            DruckwartError::BadRequest(_)
        ));
        assert!(matches!(
            ledger.charge("ghost", 10, "fee").unwrap_err(),
            DruckwartError::AccountNotFound(_)
        ));

        let balance = ledger.charge("alice", 40, "lost key fee").expect("charge");
        assert_eq!(balance, 60);
    }

    #[test]
    fn create_account_rejects_duplicates() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger.create_account("alice", false).expect("create");
        assert!(matches!(
            ledger.create_account("alice", true).unwrap_err(),
            DruckwartError::AccountExists(_)
        ));
    }

    #[test]
    fn delete_account_cascades_history() {
        let mut ledger = ledger_with("alice", 100);
        let ReserveOutcome::Reserved { transaction_id } = ledger
            .reserve("alice", 1, JobClass::Standard)
            .expect("reserve")
        else {
            panic!("expected Reserved");
        };

        ledger.delete_account("alice").expect("delete");
        assert!(ledger.get_account("alice").expect("get").is_none());
        assert!(ledger.get_transaction(transaction_id).expect("get").is_none());
    }

    #[test]
    fn list_accounts_filters_by_substring() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger.create_account("alice", false).expect("create");
        ledger.create_account("bob", false).expect("create");
        ledger.create_account("malice", false).expect("create");

        let all = ledger.list_accounts(None).expect("list");
        assert_eq!(all.len(), 3);

        let hits = ledger.list_accounts(Some("lice")).expect("search");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn balance_never_goes_negative_over_mixed_operations() {
        let mut ledger = ledger_with("alice", 30);

        // Drain with reservations until denied; balance must stay >= 0.
        let mut reserved = Vec::new();
        loop {
            match ledger.reserve("alice", 2, JobClass::Standard).expect("reserve") {
                ReserveOutcome::Reserved { transaction_id } => reserved.push(transaction_id),
                ReserveOutcome::Denied(_) => break,
                ReserveOutcome::Free => panic!("account is not free"),
            }
            let account = ledger.get_account("alice").expect("get").expect("exists");
            assert!(account.balance >= 0);
        }

        // Refund everything; we must end exactly where we started.
        for id in reserved {
            ledger.cancel(id).expect("cancel");
        }
        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 30);
    }

    #[test]
    fn on_disk_ledger_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");

        {
            let mut ledger = Ledger::open(&path).expect("open");
            ledger.create_account("alice", false).expect("create");
            ledger.deposit("alice", 250, None).expect("deposit");
        }

        let ledger = Ledger::open(&path).expect("reopen");
        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 250);
    }
}
