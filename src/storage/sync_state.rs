//! Persistent sync state for Mercury transactions, stored in SQLite.
//!
//! Tables:
//! - `sync_state`: last sync time per account (`_global` for the cross-account sync)
//! - `processed_transactions`: transaction ids already seen (deduplication) and their
//!   reconciliation status
//! - `reconciliation_log`: transaction-to-invoice matches

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use utoipa::ToSchema;

/// Sync state key used by the cross-account sync.
pub const GLOBAL_ACCOUNT: &str = "_global";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sync_state (
        account_id TEXT PRIMARY KEY,
        last_sync_at TEXT NOT NULL,
        last_transaction_id TEXT,
        transaction_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS processed_transactions (
        transaction_id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        amount REAL NOT NULL,
        transaction_type TEXT NOT NULL,
        description TEXT,
        transaction_date TEXT,
        processed_at TEXT NOT NULL,
        reconciled INTEGER NOT NULL DEFAULT 0,
        invoice_id INTEGER,
        payment_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS reconciliation_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_id TEXT NOT NULL,
        invoice_id INTEGER NOT NULL,
        payment_id INTEGER,
        amount REAL NOT NULL,
        match_type TEXT NOT NULL,
        match_confidence REAL NOT NULL DEFAULT 1.0,
        created_at TEXT NOT NULL,
        UNIQUE(transaction_id, invoice_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_processed_account ON processed_transactions(account_id)",
    "CREATE INDEX IF NOT EXISTS idx_processed_date ON processed_transactions(transaction_date)",
    "CREATE INDEX IF NOT EXISTS idx_processed_reconciled ON processed_transactions(reconciled)",
    "CREATE INDEX IF NOT EXISTS idx_reconciliation_invoice ON reconciliation_log(invoice_id)",
];

#[derive(Serialize, Debug, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct SyncStateRow {
    pub account_id: String,
    pub last_sync_at: String,
    pub last_transaction_id: Option<String>,
    pub transaction_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct ProcessedTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: f64,
    pub transaction_type: String,
    pub description: Option<String>,
    pub transaction_date: Option<String>,
    pub processed_at: String,
    pub reconciled: bool,
    pub invoice_id: Option<i64>,
    pub payment_id: Option<i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq, sqlx::FromRow, ToSchema)]
pub struct ReconciliationEntry {
    pub id: i64,
    pub transaction_id: String,
    pub invoice_id: i64,
    pub payment_id: Option<i64>,
    pub amount: f64,
    pub match_type: String,
    pub match_confidence: f64,
    pub created_at: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct SyncStats {
    pub total_transactions: i64,
    pub reconciled: i64,
    pub unreconciled_deposits: i64,
    pub last_sync: Option<String>,
}

/// A transaction about to be recorded as processed.
#[derive(Debug, Clone)]
pub struct NewProcessedTransaction<'a> {
    pub transaction_id: &'a str,
    pub account_id: &'a str,
    pub amount: f64,
    pub transaction_type: &'a str,
    pub description: Option<&'a str>,
    pub transaction_date: Option<&'a str>,
}

/// A transaction-to-invoice match about to be logged.
#[derive(Debug, Clone)]
pub struct NewReconciliation<'a> {
    pub transaction_id: &'a str,
    pub invoice_id: i64,
    pub payment_id: Option<i64>,
    pub amount: f64,
    pub match_type: &'a str,
    pub match_confidence: f64,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    ///
    /// Accepts a plain path, a `sqlite:` URL, or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{}", url)
        };
        let in_memory = url.contains(":memory:");

        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // --- sync state ---

    pub async fn get_last_sync(&self, account_id: &str) -> Result<Option<SyncStateRow>, sqlx::Error> {
        sqlx::query_as::<_, SyncStateRow>("SELECT * FROM sync_state WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Upserts the account's sync state. The previous `last_transaction_id` survives a `None`,
    /// and `transaction_count` accumulates.
    pub async fn update_sync_state(
        &self,
        account_id: &str,
        last_transaction_id: Option<&str>,
        transaction_count: i64,
    ) -> Result<(), sqlx::Error> {
        let now = now();
        sqlx::query(
            "INSERT INTO sync_state (
                account_id, last_sync_at, last_transaction_id,
                transaction_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                last_sync_at = excluded.last_sync_at,
                last_transaction_id = COALESCE(excluded.last_transaction_id, sync_state.last_transaction_id),
                transaction_count = sync_state.transaction_count + excluded.transaction_count,
                updated_at = excluded.updated_at",
        )
        .bind(account_id)
        .bind(&now)
        .bind(last_transaction_id)
        .bind(transaction_count)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_all_sync_states(&self) -> Result<Vec<SyncStateRow>, sqlx::Error> {
        sqlx::query_as::<_, SyncStateRow>("SELECT * FROM sync_state ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
    }

    // --- processed transactions ---

    pub async fn is_transaction_processed(&self, transaction_id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM processed_transactions WHERE transaction_id = ?")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn is_transaction_reconciled(&self, transaction_id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT reconciled FROM processed_transactions WHERE transaction_id = ?")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<i64, _>("reconciled")? == 1),
            None => Ok(false),
        }
    }

    /// Records a transaction as processed. A transaction already recorded is left untouched.
    pub async fn mark_transaction_processed(
        &self,
        txn: &NewProcessedTransaction<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO processed_transactions (
                transaction_id, account_id, amount, transaction_type,
                description, transaction_date, processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(txn.transaction_id)
        .bind(txn.account_id)
        .bind(txn.amount)
        .bind(txn.transaction_type)
        .bind(txn.description)
        .bind(txn.transaction_date)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deposits not yet matched to an invoice, newest first.
    pub async fn get_unreconciled_transactions(
        &self,
        limit: i64,
    ) -> Result<Vec<ProcessedTransaction>, sqlx::Error> {
        sqlx::query_as::<_, ProcessedTransaction>(
            "SELECT * FROM processed_transactions
             WHERE reconciled = 0 AND amount > 0
             ORDER BY transaction_date DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    // --- reconciliation log ---

    /// Logs a match and flags the processed transaction as reconciled, atomically.
    pub async fn log_reconciliation(&self, entry: &NewReconciliation<'_>) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR REPLACE INTO reconciliation_log (
                transaction_id, invoice_id, payment_id, amount,
                match_type, match_confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.transaction_id)
        .bind(entry.invoice_id)
        .bind(entry.payment_id)
        .bind(entry.amount)
        .bind(entry.match_type)
        .bind(entry.match_confidence)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE processed_transactions
             SET reconciled = 1, invoice_id = ?, payment_id = ?
             WHERE transaction_id = ?",
        )
        .bind(entry.invoice_id)
        .bind(entry.payment_id)
        .bind(entry.transaction_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    pub async fn get_reconciliation_history(
        &self,
        limit: i64,
        invoice_id: Option<i64>,
    ) -> Result<Vec<ReconciliationEntry>, sqlx::Error> {
        match invoice_id {
            Some(invoice_id) => {
                sqlx::query_as::<_, ReconciliationEntry>(
                    "SELECT * FROM reconciliation_log
                     WHERE invoice_id = ?
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?",
                )
                .bind(invoice_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, ReconciliationEntry>(
                    "SELECT * FROM reconciliation_log
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// Most recent match logged for a transaction.
    pub async fn reconciliation_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<ReconciliationEntry>, sqlx::Error> {
        sqlx::query_as::<_, ReconciliationEntry>(
            "SELECT * FROM reconciliation_log
             WHERE transaction_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    // --- stats ---

    pub async fn get_stats(&self) -> Result<SyncStats, sqlx::Error> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM processed_transactions) AS total,
                (SELECT COUNT(*) FROM processed_transactions WHERE reconciled = 1) AS reconciled,
                (SELECT COUNT(*) FROM processed_transactions WHERE reconciled = 0 AND amount > 0) AS unreconciled,
                (SELECT MAX(last_sync_at) FROM sync_state) AS last_sync",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncStats {
            total_transactions: row.try_get("total")?,
            reconciled: row.try_get("reconciled")?,
            unreconciled_deposits: row.try_get("unreconciled")?,
            last_sync: row.try_get("last_sync")?,
        })
    }

    /// Deletes all sync state, processed transactions and reconciliation history.
    pub async fn reset(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for table in ["sync_state", "processed_transactions", "reconciliation_log"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit<'a>(id: &'a str, amount: f64, date: &'a str) -> NewProcessedTransaction<'a> {
        NewProcessedTransaction {
            transaction_id: id,
            account_id: "acc_1",
            amount,
            transaction_type: if amount > 0.0 { "credit" } else { "debit" },
            description: Some("Acme"),
            transaction_date: Some(date),
        }
    }

    #[tokio::test]
    async fn sync_state_upsert_accumulates_and_keeps_last_id() {
        let store = SyncStore::in_memory().await.unwrap();
        assert!(store.get_last_sync(GLOBAL_ACCOUNT).await.unwrap().is_none());

        store.update_sync_state(GLOBAL_ACCOUNT, Some("txn_1"), 3).await.unwrap();
        store.update_sync_state(GLOBAL_ACCOUNT, None, 2).await.unwrap();

        let state = store.get_last_sync(GLOBAL_ACCOUNT).await.unwrap().unwrap();
        assert_eq!(state.transaction_count, 5);
        assert_eq!(state.last_transaction_id.as_deref(), Some("txn_1"));
        assert_eq!(store.get_all_sync_states().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn processed_transactions_are_deduplicated() {
        let store = SyncStore::in_memory().await.unwrap();
        store.mark_transaction_processed(&deposit("txn_1", 50.0, "2025-01-01")).await.unwrap();
        store.mark_transaction_processed(&deposit("txn_1", 99.0, "2025-01-02")).await.unwrap();

        assert!(store.is_transaction_processed("txn_1").await.unwrap());
        assert!(!store.is_transaction_processed("txn_2").await.unwrap());

        let unreconciled = store.get_unreconciled_transactions(10).await.unwrap();
        assert_eq!(unreconciled.len(), 1);
        assert_eq!(unreconciled[0].amount, 50.0);
    }

    #[tokio::test]
    async fn unreconciled_lists_only_deposits_newest_first() {
        let store = SyncStore::in_memory().await.unwrap();
        store.mark_transaction_processed(&deposit("old", 10.0, "2025-01-01")).await.unwrap();
        store.mark_transaction_processed(&deposit("new", 20.0, "2025-02-01")).await.unwrap();
        store.mark_transaction_processed(&deposit("debit", -5.0, "2025-03-01")).await.unwrap();

        let ids: Vec<String> = store
            .get_unreconciled_transactions(10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.transaction_id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);

        let limited = store.get_unreconciled_transactions(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn logging_a_reconciliation_flags_the_transaction() {
        let store = SyncStore::in_memory().await.unwrap();
        store.mark_transaction_processed(&deposit("txn_1", 250.0, "2025-01-01")).await.unwrap();
        assert!(!store.is_transaction_reconciled("txn_1").await.unwrap());

        store
            .log_reconciliation(&NewReconciliation {
                transaction_id: "txn_1",
                invoice_id: 42,
                payment_id: Some(7),
                amount: 250.0,
                match_type: "invoice_number",
                match_confidence: 1.0,
            })
            .await
            .unwrap();

        assert!(store.is_transaction_reconciled("txn_1").await.unwrap());
        assert!(store.get_unreconciled_transactions(10).await.unwrap().is_empty());

        let entry = store.reconciliation_for_transaction("txn_1").await.unwrap().unwrap();
        assert_eq!(entry.invoice_id, 42);
        assert_eq!(entry.payment_id, Some(7));

        assert_eq!(store.get_reconciliation_history(10, Some(42)).await.unwrap().len(), 1);
        assert!(store.get_reconciliation_history(10, Some(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relogging_the_same_pair_replaces_the_row() {
        let store = SyncStore::in_memory().await.unwrap();
        for payment_id in [1, 2] {
            store
                .log_reconciliation(&NewReconciliation {
                    transaction_id: "txn_1",
                    invoice_id: 42,
                    payment_id: Some(payment_id),
                    amount: 10.0,
                    match_type: "amount_email",
                    match_confidence: 0.9,
                })
                .await
                .unwrap();
        }
        let history = store.get_reconciliation_history(10, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payment_id, Some(2));
    }

    #[tokio::test]
    async fn stats_and_reset() {
        let store = SyncStore::in_memory().await.unwrap();
        store.mark_transaction_processed(&deposit("a", 10.0, "2025-01-01")).await.unwrap();
        store.mark_transaction_processed(&deposit("b", 20.0, "2025-01-02")).await.unwrap();
        store.mark_transaction_processed(&deposit("c", -3.0, "2025-01-03")).await.unwrap();
        store
            .log_reconciliation(&NewReconciliation {
                transaction_id: "a",
                invoice_id: 1,
                payment_id: None,
                amount: 10.0,
                match_type: "amount_date",
                match_confidence: 0.7,
            })
            .await
            .unwrap();
        store.update_sync_state(GLOBAL_ACCOUNT, Some("c"), 3).await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.reconciled, 1);
        assert_eq!(stats.unreconciled_deposits, 1);
        assert!(stats.last_sync.is_some());

        store.reset().await.unwrap();
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_transactions, 0);
        assert!(stats.last_sync.is_none());
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.db");
        let path = path.to_str().unwrap();

        {
            let store = SyncStore::connect(path).await.unwrap();
            store.mark_transaction_processed(&deposit("txn_1", 5.0, "2025-01-01")).await.unwrap();
            store.pool().close().await;
        }

        let reopened = SyncStore::connect(path).await.unwrap();
        assert!(reopened.is_transaction_processed("txn_1").await.unwrap());
    }
}
