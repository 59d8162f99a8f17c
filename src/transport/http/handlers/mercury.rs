use crate::app::reconciliation::ReconcileSummary;
use crate::app::sync::SyncResult;
use crate::infra::mercury::TransactionQuery;
use crate::transport::http::handlers::common::{
    bounded, error_response, query_422, require_mercury, service_error, ApiError,
};
use crate::transport::http::types::{
    json_422, AccountView, AccountsResponse, ApiResponse, AppState, BalanceResponse,
    HistoryParams, HistoryResponse, ReconcileParams, ResetRequest, StatusResponse,
    TransactionView, TransactionsParams, TransactionsResponse, UnmatchedParams, UnmatchedResponse,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/mercury/accounts",
    responses(
        (status = 200, description = "Accounts with balances", body = AccountsResponse),
        (status = 500, description = "Mercury not configured or unreachable", body = ApiResponse)
    )
)]
pub async fn accounts_handler(State(state): State<AppState>) -> Result<Json<AccountsResponse>, ApiError> {
    let mercury = require_mercury(&state)?;
    let balance = mercury
        .bank
        .get_total_balance()
        .await
        .map_err(|e| service_error(e.into()))?;

    Ok(Json(AccountsResponse {
        accounts: balance
            .accounts
            .into_iter()
            .map(|a| AccountView {
                id: a.id,
                name: a.name,
                kind: a.kind.unwrap_or_else(|| "checking".to_string()),
                status: "active".to_string(),
                available_balance: a.available_balance,
                current_balance: a.current_balance,
            })
            .collect(),
        total_available: balance.total_available,
        total_current: balance.total_current,
    }))
}

#[utoipa::path(
    get,
    path = "/api/mercury/transactions",
    params(TransactionsParams),
    responses(
        (status = 200, description = "Transactions with local reconciliation status", body = TransactionsResponse),
        (status = 422, description = "Query parameter out of range", body = ApiResponse),
        (status = 500, description = "Mercury not configured or unreachable", body = ApiResponse)
    )
)]
pub async fn transactions_handler(
    State(state): State<AppState>,
    params: Result<Query<TransactionsParams>, QueryRejection>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let Query(params) = params.map_err(query_422)?;
    let limit = bounded("limit", params.limit, 50, 1, 500)?;
    let days = bounded("days", params.days, 30, 1, 365)?;
    let mercury = require_mercury(&state)?;

    let end = chrono::Local::now().date_naive();
    let page = mercury
        .bank
        .get_transactions(&TransactionQuery {
            account_id: params.account_id,
            limit,
            start: Some(end - chrono::Duration::days(days)),
            end: Some(end),
            ..TransactionQuery::default()
        })
        .await
        .map_err(|e| service_error(e.into()))?;

    let mut transactions = Vec::with_capacity(page.transactions.len());
    for txn in page.transactions {
        let logged = state
            .store
            .reconciliation_for_transaction(&txn.id)
            .await
            .map_err(|e| service_error(e.into()))?;

        transactions.push(TransactionView {
            kind: if txn.is_deposit() { "credit" } else { "debit" }.to_string(),
            date: txn.effective_date().map(str::to_string),
            status: txn.status.clone().unwrap_or_else(|| "completed".to_string()),
            reconciled: logged.is_some(),
            invoice_id: logged.map(|entry| entry.invoice_id),
            id: txn.id,
            amount: txn.amount,
            counterparty: txn.counterparty_name,
            description: txn.note,
        });
    }

    Ok(Json(TransactionsResponse {
        total: transactions.len(),
        transactions,
    }))
}

#[utoipa::path(
    get,
    path = "/api/mercury/balance",
    responses(
        (status = 200, description = "Balance totals across accounts", body = BalanceResponse),
        (status = 500, description = "Mercury not configured or unreachable", body = ApiResponse)
    )
)]
pub async fn balance_handler(State(state): State<AppState>) -> Result<Json<BalanceResponse>, ApiError> {
    let mercury = require_mercury(&state)?;
    let balance = mercury
        .bank
        .get_total_balance()
        .await
        .map_err(|e| service_error(e.into()))?;

    Ok(Json(BalanceResponse {
        total_available: balance.total_available,
        total_current: balance.total_current,
        accounts: balance.accounts,
        as_of: chrono::Local::now().to_rfc3339(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/mercury/sync",
    responses(
        (status = 200, description = "Sync finished (check `success` and `errors`)", body = SyncResult),
        (status = 500, description = "Mercury not configured", body = ApiResponse)
    )
)]
pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResult>, ApiError> {
    let mercury = require_mercury(&state)?;
    Ok(Json(mercury.sync.sync_mercury_transactions().await))
}

#[utoipa::path(
    post,
    path = "/api/mercury/reconcile",
    params(ReconcileParams),
    responses(
        (status = 200, description = "Reconciliation summary", body = ReconcileSummary),
        (status = 422, description = "Query parameter out of range", body = ApiResponse),
        (status = 500, description = "Mercury not configured or reconciliation failed", body = ApiResponse)
    )
)]
pub async fn reconcile_handler(
    State(state): State<AppState>,
    params: Result<Query<ReconcileParams>, QueryRejection>,
) -> Result<Json<ReconcileSummary>, ApiError> {
    let Query(params) = params.map_err(query_422)?;
    let days = bounded("days", params.days, 7, 1, 90)?;
    let min_confidence = bounded("min_confidence", params.min_confidence, 0.7, 0.2, 1.0)?;
    let mercury = require_mercury(&state)?;

    mercury
        .sync
        .reconcile(days, min_confidence)
        .await
        .map(Json)
        .map_err(service_error)
}

#[utoipa::path(
    get,
    path = "/api/mercury/unmatched",
    params(UnmatchedParams),
    responses(
        (status = 200, description = "Deposits not yet matched to an invoice", body = UnmatchedResponse),
        (status = 422, description = "Query parameter out of range", body = ApiResponse),
        (status = 500, description = "Sync state database error", body = ApiResponse)
    )
)]
pub async fn unmatched_handler(
    State(state): State<AppState>,
    params: Result<Query<UnmatchedParams>, QueryRejection>,
) -> Result<Json<UnmatchedResponse>, ApiError> {
    let Query(params) = params.map_err(query_422)?;
    let limit = bounded("limit", params.limit, 50, 1, 200)?;

    let transactions = state
        .store
        .get_unreconciled_transactions(limit)
        .await
        .map_err(|e| service_error(e.into()))?;

    Ok(Json(UnmatchedResponse {
        unmatched_count: transactions.len(),
        transactions,
    }))
}

#[utoipa::path(
    get,
    path = "/api/mercury/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Reconciliation log, newest first", body = HistoryResponse),
        (status = 422, description = "Query parameter out of range", body = ApiResponse),
        (status = 500, description = "Sync state database error", body = ApiResponse)
    )
)]
pub async fn history_handler(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) = params.map_err(query_422)?;
    let limit = bounded("limit", params.limit, 50, 1, 500)?;

    let entries = state
        .store
        .get_reconciliation_history(limit, params.invoice_id)
        .await
        .map_err(|e| service_error(e.into()))?;

    Ok(Json(HistoryResponse {
        count: entries.len(),
        entries,
    }))
}

#[utoipa::path(
    get,
    path = "/api/mercury/status",
    responses(
        (status = 200, description = "Connectivity, scheduler and sync statistics", body = StatusResponse),
        (status = 500, description = "Mercury not configured", body = ApiResponse)
    )
)]
pub async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let mercury = require_mercury(&state)?;

    let health = mercury.bank.health_check().await;
    let scheduler = mercury.scheduler.status().await;
    let stats = state.store.get_stats().await.map_err(|e| service_error(e.into()))?;
    let sync_states = state
        .store
        .get_all_sync_states()
        .await
        .map_err(|e| service_error(e.into()))?;

    Ok(Json(StatusResponse {
        mercury_connected: health.connected,
        scheduler_running: scheduler.running,
        sync_interval_minutes: scheduler.interval_minutes,
        auto_reconcile: scheduler.auto_reconcile,
        slack_enabled: state.notifier.is_enabled(),
        last_sync: scheduler.last_sync.clone(),
        last_sync_success: scheduler.last_sync_success,
        stats,
        scheduler,
        sync_states,
    }))
}

#[utoipa::path(
    post,
    path = "/api/mercury/reset",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Sync state, processed transactions and history deleted", body = ApiResponse),
        (status = 400, description = "confirm was not true", body = ApiResponse),
        (status = 422, description = "Invalid JSON body", body = ApiResponse),
        (status = 500, description = "Sync state database error", body = ApiResponse)
    )
)]
pub async fn reset_handler(
    State(state): State<AppState>,
    request: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = request.map_err(|e| json_422(e, "{\"confirm\": true}"))?;
    if !request.confirm {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "confirm must be true to reset sync state",
        ));
    }

    state.store.reset().await.map_err(|e| service_error(e.into()))?;
    tracing::warn!("sync state reset");

    Ok(Json(ApiResponse {
        success: true,
        data: Some(json!({ "message": "Sync state cleared" })),
        error: None,
    }))
}
