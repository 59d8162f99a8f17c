use crate::app::invoice_service::{InvoiceCreated, InvoiceView, PaymentRegistered};
use crate::app::reconciliation::{ReconcileDetail, ReconcileFailure, ReconcileSummary};
use crate::app::scheduler::{ScheduledJob, SchedulerStatus};
use crate::app::sync::SyncResult;
use crate::domain::matching::MatchType;
use crate::infra::mercury::AccountSummary;
use crate::storage::sync_state::{ProcessedTransaction, ReconciliationEntry, SyncStateRow, SyncStats};
use crate::transport::http::handlers::{health, invoices, mercury};
use crate::transport::http::types::{
    AccountView, AccountsResponse, ApiResponse, BalanceResponse, CreateInvoiceRequest,
    HealthResponse, HistoryResponse, MarkPaidRequest, ResetRequest, StatusResponse,
    TransactionView, TransactionsResponse, UnmatchedResponse,
};
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        invoices::create_invoice_handler,
        invoices::mark_invoice_paid_handler,
        invoices::get_invoice_handler,
        invoices::get_invoice_by_stripe_handler,
        mercury::accounts_handler,
        mercury::transactions_handler,
        mercury::balance_handler,
        mercury::sync_handler,
        mercury::reconcile_handler,
        mercury::unmatched_handler,
        mercury::history_handler,
        mercury::status_handler,
        mercury::reset_handler
    ),
    components(schemas(
        ApiResponse,
        HealthResponse,
        CreateInvoiceRequest,
        InvoiceCreated,
        MarkPaidRequest,
        PaymentRegistered,
        InvoiceView,
        AccountView,
        AccountsResponse,
        AccountSummary,
        BalanceResponse,
        TransactionView,
        TransactionsResponse,
        SyncResult,
        ReconcileSummary,
        ReconcileDetail,
        ReconcileFailure,
        MatchType,
        UnmatchedResponse,
        ProcessedTransaction,
        HistoryResponse,
        ReconciliationEntry,
        StatusResponse,
        SchedulerStatus,
        ScheduledJob,
        SyncStats,
        SyncStateRow,
        ResetRequest
    ))
)]
#[allow(dead_code)]
pub struct ApiDoc;

pub fn create_router(app_state: crate::transport::http::types::AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route("/api/create_invoice", post(invoices::create_invoice_handler))
        .route("/api/mark_invoice_paid", post(invoices::mark_invoice_paid_handler))
        .route("/api/invoices/:invoice_id", get(invoices::get_invoice_handler))
        .route(
            "/api/invoices/by-stripe/:stripe_session_id",
            get(invoices::get_invoice_by_stripe_handler),
        )
        .route("/api/mercury/accounts", get(mercury::accounts_handler))
        .route("/api/mercury/transactions", get(mercury::transactions_handler))
        .route("/api/mercury/balance", get(mercury::balance_handler))
        .route("/api/mercury/sync", post(mercury::sync_handler))
        .route("/api/mercury/reconcile", post(mercury::reconcile_handler))
        .route("/api/mercury/unmatched", get(mercury::unmatched_handler))
        .route("/api/mercury/history", get(mercury::history_handler))
        .route("/api/mercury/status", get(mercury::status_handler))
        .route("/api/mercury/reset", post(mercury::reset_handler))
        .with_state(app_state)
}
