// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pricing directory — per-page prices stored in the settings key-value table.
// The core only reads prices; administration writes them through the upsert.

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use druckwart_core::error::{DruckwartError, Result};
use druckwart_core::types::JobClass;

use crate::store::{Ledger, db_err};

/// Seed the built-in default prices if the settings table has no entry yet.
/// Existing values are never overwritten.
pub(crate) fn ensure_default_prices(conn: &Connection) -> Result<()> {
    for class in [JobClass::Standard, JobClass::Premium] {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO NOTHING",
            params![class.price_key(), class.default_price().to_string()],
        )
        .map_err(db_err)?;
    }
    debug!("default prices ensured");
    Ok(())
}

/// Per-page price for a job class, read inside an already-open transaction
/// so the reserve path sees a price consistent with its balance check.
///
/// Falls back to the built-in default when the entry is missing or
/// unparseable.
pub(crate) fn price_in(conn: &Connection, class: JobClass) -> Result<i64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![class.price_key()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;

    Ok(value
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or_else(|| class.default_price()))
}

impl Ledger {
    /// Per-page price for a job class in cents.
    pub fn price_for(&self, class: JobClass) -> Result<i64> {
        price_in(self.conn(), class)
    }

    /// Set the per-page price for a job class.
    pub fn set_price(&mut self, class: JobClass, cents: i64) -> Result<()> {
        if cents < 0 {
            return Err(DruckwartError::BadRequest(
                "price must not be negative".into(),
            ));
        }
        self.set_setting(class.price_key(), &cents.to_string())?;
        info!(class = %class, cents, "price updated");
        Ok(())
    }

    /// Read an arbitrary settings entry.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    /// Upsert an arbitrary settings entry.
    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use druckwart_core::types::ReserveOutcome;

    #[test]
    fn defaults_are_seeded_on_open() {
        let ledger = Ledger::open_in_memory().expect("open");
        assert_eq!(ledger.price_for(JobClass::Standard).expect("price"), 5);
        assert_eq!(ledger.price_for(JobClass::Premium).expect("price"), 20);
    }

    #[test]
    fn set_price_overrides_default() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger.set_price(JobClass::Standard, 7).expect("set");
        assert_eq!(ledger.price_for(JobClass::Standard).expect("price"), 7);
    }

    #[test]
    fn unparseable_price_falls_back_to_default() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger
            .set_setting("price_premium", "not-a-number")
            .expect("set");
        assert_eq!(ledger.price_for(JobClass::Premium).expect("price"), 20);
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        assert!(ledger.set_price(JobClass::Standard, -1).is_err());
    }

    #[test]
    fn reserve_uses_updated_price() {
        let mut ledger = Ledger::open_in_memory().expect("open");
        ledger.create_account("alice", false).expect("create");
        ledger.deposit("alice", 100, None).expect("deposit");
        ledger.set_price(JobClass::Standard, 10).expect("set");

        let outcome = ledger
            .reserve("alice", 5, JobClass::Standard)
            .expect("reserve");
        assert!(matches!(outcome, ReserveOutcome::Reserved { .. }));

        let account = ledger.get_account("alice").expect("get").expect("exists");
        assert_eq!(account.balance, 50);
    }
}
