//! Mercury bank API access.

pub mod client;
pub mod types;

pub use client::{MercuryApiError, MercuryClient};
pub use types::{
    AccountSummary, BalanceSummary, HealthStatus, MercuryAccount, MercuryTransaction,
    TransactionPage, TransactionQuery,
};

use async_trait::async_trait;

/// Bank operations used by sync and reconciliation.
#[async_trait]
pub trait MercuryApi: Send + Sync {
    async fn get_accounts(&self) -> Result<Vec<MercuryAccount>, MercuryApiError>;

    async fn get_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, MercuryApiError>;

    /// Credits (amount > 0) of the last `days` days, optionally at or above `min_amount`.
    async fn get_recent_deposits(
        &self,
        days: i64,
        min_amount: Option<f64>,
    ) -> Result<Vec<MercuryTransaction>, MercuryApiError> {
        let end = chrono::Local::now().date_naive();
        let start = end - chrono::Duration::days(days);
        let page = self
            .get_transactions(&TransactionQuery {
                start: Some(start),
                end: Some(end),
                ..TransactionQuery::default()
            })
            .await?;

        Ok(page
            .transactions
            .into_iter()
            .filter(|t| t.is_deposit())
            .filter(|t| min_amount.map_or(true, |min| t.amount >= min))
            .collect())
    }

    /// Sums balances across all accounts.
    async fn get_total_balance(&self) -> Result<BalanceSummary, MercuryApiError> {
        let accounts = self.get_accounts().await?;
        Ok(BalanceSummary::from_accounts(&accounts))
    }

    /// Connectivity check; never fails.
    async fn health_check(&self) -> HealthStatus {
        let timestamp = chrono::Local::now().to_rfc3339();
        match self.get_accounts().await {
            Ok(accounts) => HealthStatus {
                status: "healthy".to_string(),
                connected: true,
                account_count: Some(accounts.len()),
                error: None,
                timestamp,
            },
            Err(e) => HealthStatus {
                status: "unhealthy".to_string(),
                connected: false,
                account_count: None,
                error: Some(e.to_string()),
                timestamp,
            },
        }
    }
}
