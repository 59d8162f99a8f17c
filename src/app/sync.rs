//! Pulls new Mercury transactions into the sync store and optionally reconciles deposits.

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::reconciliation::{auto_reconcile_deposits, ReconcileSummary};
use crate::infra::mercury::types::MAX_PAGE_SIZE;
use crate::infra::mercury::{MercuryApi, MercuryTransaction, TransactionQuery};
use crate::infra::odoo::OdooExecutor;
use crate::infra::slack::SlackNotifier;
use crate::storage::sync_state::{NewProcessedTransaction, SyncStore, GLOBAL_ACCOUNT};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::ToSchema;

/// Window re-read before the last sync so late-posting transactions are not missed.
const SYNC_OVERLAP_HOURS: i64 = 1;

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct SyncResult {
    pub started_at: String,
    pub completed_at: Option<String>,
    pub accounts_synced: u64,
    pub new_transactions: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub reconciled: u64,
    pub errors: Vec<String>,
    pub success: bool,
    pub reconciliation: Option<ReconcileSummary>,
}

impl SyncResult {
    fn started() -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            accounts_synced: 0,
            new_transactions: 0,
            deposits: 0,
            withdrawals: 0,
            reconciled: 0,
            errors: Vec::new(),
            success: true,
            reconciliation: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub auto_reconcile: bool,
    pub min_confidence: f64,
}

pub struct SyncService {
    bank: Arc<dyn MercuryApi>,
    odoo: Option<Arc<dyn OdooExecutor>>,
    store: SyncStore,
    notifier: Arc<SlackNotifier>,
    settings: SyncSettings,
    sync_lock: Mutex<()>,
}

impl SyncService {
    pub fn new(
        bank: Arc<dyn MercuryApi>,
        store: SyncStore,
        notifier: Arc<SlackNotifier>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            bank,
            odoo: None,
            store,
            notifier,
            settings,
            sync_lock: Mutex::new(()),
        }
    }

    /// Enables reconciliation against Odoo after each sync.
    pub fn with_odoo(mut self, odoo: Arc<dyn OdooExecutor>) -> Self {
        self.odoo = Some(odoo);
        self
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    pub fn bank(&self) -> &Arc<dyn MercuryApi> {
        &self.bank
    }

    /// Reconciles the last `days` days of deposits. Holds the sync lock, so it never overlaps
    /// a sync or another reconcile and a deposit is booked at most once.
    pub async fn reconcile(&self, days: i64, min_confidence: f64) -> ServiceResult<ReconcileSummary> {
        let odoo = self.odoo.clone().ok_or_else(|| {
            ServiceError::Unavailable("Odoo is not configured for reconciliation".to_string())
        })?;
        let _guard = self.sync_lock.lock().await;
        auto_reconcile_deposits(self.bank.as_ref(), odoo, &self.store, days, min_confidence).await
    }

    /// Runs one sync. Never returns an error: failures are reported in the result.
    pub async fn sync_mercury_transactions(&self) -> SyncResult {
        let _guard = self.sync_lock.lock().await;
        let mut result = SyncResult::started();

        if let Err(e) = self.run(&mut result).await {
            tracing::error!(error = %e, "Mercury sync failed");
            result.success = false;
            result.errors.push(e.to_string());
        }

        result.completed_at = Some(Utc::now().to_rfc3339());
        tracing::info!(
            success = result.success,
            accounts = result.accounts_synced,
            new = result.new_transactions,
            deposits = result.deposits,
            withdrawals = result.withdrawals,
            reconciled = result.reconciled,
            "Mercury sync finished"
        );
        result
    }

    async fn run(&self, result: &mut SyncResult) -> ServiceResult<()> {
        let accounts = self.bank.get_accounts().await?;
        result.accounts_synced = accounts.len() as u64;
        let account_names: HashMap<String, String> = accounts
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect();

        let since = self
            .store
            .get_last_sync(GLOBAL_ACCOUNT)
            .await?
            .and_then(|row| DateTime::parse_from_rfc3339(&row.last_sync_at).ok())
            .map(|last| (last - chrono::Duration::hours(SYNC_OVERLAP_HOURS)).date_naive());

        let page = self
            .bank
            .get_transactions(&TransactionQuery {
                limit: MAX_PAGE_SIZE,
                start: since,
                ..TransactionQuery::default()
            })
            .await?;

        let mut new_deposits: Vec<MercuryTransaction> = Vec::new();
        let mut last_new_id: Option<String> = None;
        for txn in page.transactions {
            if self.store.is_transaction_processed(&txn.id).await? {
                continue;
            }
            result.new_transactions += 1;

            let deposit = txn.is_deposit();
            if deposit {
                result.deposits += 1;
            } else {
                result.withdrawals += 1;
            }

            let posted_day = txn.posted_day();
            self.store
                .mark_transaction_processed(&NewProcessedTransaction {
                    transaction_id: &txn.id,
                    account_id: txn.account_id.as_deref().unwrap_or_default(),
                    amount: txn.amount,
                    transaction_type: if deposit { "credit" } else { "debit" },
                    description: txn.counterparty_name.as_deref(),
                    transaction_date: posted_day.as_deref(),
                })
                .await?;

            last_new_id = Some(txn.id.clone());
            if deposit {
                new_deposits.push(txn);
            }
        }

        self.store
            .update_sync_state(
                GLOBAL_ACCOUNT,
                last_new_id.as_deref(),
                result.new_transactions as i64,
            )
            .await?;

        if self.settings.auto_reconcile && result.deposits > 0 {
            if let Some(odoo) = &self.odoo {
                match auto_reconcile_deposits(
                    self.bank.as_ref(),
                    odoo.clone(),
                    &self.store,
                    1,
                    self.settings.min_confidence,
                )
                .await
                {
                    Ok(summary) => {
                        result.reconciled = summary.reconciled;
                        result.reconciliation = Some(summary);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "auto-reconciliation failed");
                        result.errors.push(format!("Reconciliation failed: {}", e));
                    }
                }
            }
        }

        self.notify(result, &new_deposits, &account_names).await;
        Ok(())
    }

    async fn notify(
        &self,
        result: &SyncResult,
        new_deposits: &[MercuryTransaction],
        account_names: &HashMap<String, String>,
    ) {
        if !self.notifier.is_enabled() {
            return;
        }

        let counterparty =
            |txn: &MercuryTransaction| txn.counterparty_name.clone().unwrap_or_else(|| "Unknown".to_string());

        let details = result
            .reconciliation
            .as_ref()
            .map(|s| s.details.as_slice())
            .unwrap_or_default();
        for detail in details {
            let from = new_deposits
                .iter()
                .find(|t| t.id == detail.transaction_id)
                .map(counterparty)
                .unwrap_or_else(|| "Unknown".to_string());
            self.notifier
                .notify_reconciliation(
                    detail.amount,
                    detail.invoice_number.as_deref().unwrap_or("Unknown"),
                    &from,
                    detail.match_type.map(|m| m.as_str()).unwrap_or("unknown"),
                    detail.confidence,
                )
                .await;
        }

        let mut unmatched = 0u64;
        let mut total_deposited = 0.0;
        for txn in new_deposits {
            total_deposited += txn.amount;
            if details.iter().any(|d| d.transaction_id == txn.id) {
                continue;
            }
            unmatched += 1;

            let posted_day = txn.posted_day();
            if result.reconciliation.is_some() {
                self.notifier
                    .notify_unmatched_deposit(txn.amount, &counterparty(txn), posted_day.as_deref())
                    .await;
            } else {
                let account_name = txn
                    .account_id
                    .as_ref()
                    .and_then(|id| account_names.get(id))
                    .map(String::as_str)
                    .unwrap_or("Mercury");
                self.notifier
                    .notify_new_deposit(
                        txn.amount,
                        &counterparty(txn),
                        &txn.id,
                        account_name,
                        posted_day.as_deref(),
                    )
                    .await;
            }
        }

        if result.deposits > 1 {
            self.notifier
                .notify_sync_summary(
                    result.new_transactions,
                    result.deposits,
                    result.reconciled,
                    unmatched,
                    total_deposited,
                )
                .await;
        }
    }
}
