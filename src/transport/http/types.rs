use crate::app::invoice_service::InvoiceService;
use crate::app::scheduler::{SchedulerStatus, SyncScheduler};
use crate::app::sync::SyncService;
use crate::infra::mercury::{AccountSummary, MercuryApi};
use crate::infra::odoo::OdooExecutor;
use crate::infra::slack::SlackNotifier;
use crate::storage::sync_state::{
    ProcessedTransaction, ReconciliationEntry, SyncStateRow, SyncStats, SyncStore,
};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone)]
pub struct AppState {
    pub odoo: Arc<dyn OdooExecutor>,
    pub invoices: InvoiceService,
    pub store: SyncStore,
    pub notifier: Arc<SlackNotifier>,
    /// `None` when no Mercury token is configured.
    pub mercury: Option<MercuryState>,
}

#[derive(Clone)]
pub struct MercuryState {
    pub bank: Arc<dyn MercuryApi>,
    pub sync: Arc<SyncService>,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    pub fn new(odoo: Arc<dyn OdooExecutor>, store: SyncStore, notifier: Arc<SlackNotifier>) -> Self {
        Self {
            invoices: InvoiceService::new(odoo.clone()),
            odoo,
            store,
            notifier,
            mercury: None,
        }
    }

    pub fn with_mercury(mut self, sync: Arc<SyncService>, scheduler: Arc<SyncScheduler>) -> Self {
        self.mercury = Some(MercuryState {
            bank: sync.bank().clone(),
            sync,
            scheduler,
        });
        self
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- invoices ---

fn default_description() -> Option<String> {
    Some("Stripe Payment".to_string())
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateInvoiceRequest {
    pub customer_email: String,
    pub amount: f64,
    pub stripe_session_id: String,
    #[serde(default = "default_description")]
    pub description: Option<String>,
    #[serde(default)]
    pub product_code: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct MarkPaidRequest {
    #[serde(default)]
    pub invoice_id: Option<i64>,
    #[serde(default)]
    pub stripe_session_id: Option<String>,
    /// External payment reference (e.g. the Stripe payment intent).
    pub payment_id: String,
    /// Defaults to the invoice's residual amount.
    #[serde(default)]
    pub amount: Option<f64>,
}

// --- health ---

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when Odoo is unreachable.
    pub status: String,
    pub odoo: String,
    pub mercury: String,
    pub timestamp: String,
}

// --- mercury ---

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionsParams {
    /// Restrict to one account.
    pub account_id: Option<String>,
    /// 1..=500, default 50.
    pub limit: Option<u32>,
    /// Days of history, 1..=365, default 30.
    pub days: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReconcileParams {
    /// 1..=90, default 7.
    pub days: Option<i64>,
    /// 0.2..=1.0, default 0.7.
    pub min_confidence: Option<f64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnmatchedParams {
    /// 1..=200, default 50.
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// 1..=500, default 50.
    pub limit: Option<i64>,
    pub invoice_id: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ResetRequest {
    /// Safety switch to prevent accidental wipes.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct AccountView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub available_balance: f64,
    pub current_balance: f64,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountView>,
    pub total_available: f64,
    pub total_current: f64,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct TransactionView {
    pub id: String,
    pub amount: f64,
    /// `credit` or `debit`.
    #[serde(rename = "type")]
    pub kind: String,
    pub counterparty: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub status: String,
    pub reconciled: bool,
    pub invoice_id: Option<i64>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionView>,
    pub total: usize,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct BalanceResponse {
    pub total_available: f64,
    pub total_current: f64,
    pub accounts: Vec<AccountSummary>,
    pub as_of: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct UnmatchedResponse {
    pub unmatched_count: usize,
    pub transactions: Vec<ProcessedTransaction>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HistoryResponse {
    pub count: usize,
    pub entries: Vec<ReconciliationEntry>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct StatusResponse {
    pub mercury_connected: bool,
    pub scheduler_running: bool,
    pub sync_interval_minutes: u64,
    pub auto_reconcile: bool,
    pub slack_enabled: bool,
    pub last_sync: Option<String>,
    pub last_sync_success: Option<bool>,
    pub stats: SyncStats,
    pub scheduler: SchedulerStatus,
    pub sync_states: Vec<SyncStateRow>,
}

pub fn json_422(err: JsonRejection, expected: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(format!("Invalid JSON body: {} (expected: {})", err, expected)),
        }),
    )
}
