//! Mercury REST client against a stubbed API.

use chrono::NaiveDate;
use httpmock::prelude::*;
use odoo_mercury_bridge::infra::mercury::{MercuryApi, TransactionQuery};
use odoo_mercury_bridge::MercuryClient;
use serde_json::json;

fn client_for(server: &MockServer) -> MercuryClient {
    MercuryClient::new(&server.url("/api/v1"), "tok_live_123").unwrap()
}

#[tokio::test]
async fn accounts_are_fetched_with_bearer_token() {
    let server = MockServer::start_async().await;
    let accounts = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/accounts")
                .header("Authorization", "Bearer tok_live_123")
                .header("Accept", "application/json");
            then.status(200).json_body(json!({
                "accounts": [
                    { "id": "acc_1", "name": "Checking", "type": "checking", "status": "active",
                      "availableBalance": 1000.25, "currentBalance": 1100.0 },
                    { "id": "acc_2", "name": "Savings", "type": "savings", "status": "active",
                      "availableBalance": 500.0, "currentBalance": 500.0 }
                ]
            }));
        })
        .await;
    let bank = client_for(&server);

    let balance = bank.get_total_balance().await.unwrap();

    accounts.assert_async().await;
    assert_eq!(balance.accounts.len(), 2);
    assert_eq!(balance.accounts[0].kind.as_deref(), Some("checking"));
    assert!((balance.total_available - 1500.25).abs() < 1e-9);
    assert!((balance.total_current - 1600.0).abs() < 1e-9);
}

#[tokio::test]
async fn transaction_query_maps_to_endpoint_and_params() {
    let server = MockServer::start_async().await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/accounts/acc_1/transactions")
                .query_param("limit", "500")
                .query_param("offset", "0")
                .query_param("start", "2025-03-01")
                .query_param("end", "2025-03-31");
            then.status(200).json_body(json!({
                "total": 2,
                "transactions": [
                    { "id": "txn_1", "amount": 1500.0, "counterpartyName": "Acme", "note": "INV/2025/0007",
                      "postedAt": "2025-03-02T10:00:00Z", "status": "sent", "accountId": "acc_1" },
                    { "id": "txn_2", "amount": -20.0, "counterpartyName": "AWS",
                      "createdAt": "2025-03-03T10:00:00Z", "status": "pending" }
                ]
            }));
        })
        .await;
    let bank = client_for(&server);

    let result = bank
        .get_transactions(&TransactionQuery {
            account_id: Some("acc_1".to_string()),
            limit: 1000,
            start: NaiveDate::from_ymd_opt(2025, 3, 1),
            end: NaiveDate::from_ymd_opt(2025, 3, 31),
            ..TransactionQuery::default()
        })
        .await
        .unwrap();

    page.assert_async().await;
    assert_eq!(result.total, Some(2));
    assert_eq!(result.transactions[0].counterparty_name.as_deref(), Some("Acme"));
    assert!(result.transactions[0].is_deposit());
    assert_eq!(result.transactions[1].effective_date(), Some("2025-03-03T10:00:00Z"));
    assert_eq!(result.transactions[1].posted_day(), None);
}

#[tokio::test]
async fn error_body_becomes_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/accounts");
            then.status(401).json_body(json!({ "error": "Invalid token" }));
        })
        .await;

    let err = client_for(&server).get_accounts().await.unwrap_err();

    assert_eq!(err.status_code, 401);
    assert_eq!(err.message, "Invalid token");
    assert_eq!(err.to_string(), "Mercury API Error (401): Invalid token");
}

#[tokio::test]
async fn recent_deposits_keep_credits_only() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/transactions");
            then.status(200).json_body(json!({
                "transactions": [
                    { "id": "txn_1", "amount": 1500.0 },
                    { "id": "txn_2", "amount": -20.0 },
                    { "id": "txn_3", "amount": 40.0 }
                ]
            }));
        })
        .await;
    let bank = client_for(&server);

    let all = bank.get_recent_deposits(7, None).await.unwrap();
    let large = bank.get_recent_deposits(7, Some(100.0)).await.unwrap();

    let ids: Vec<&str> = all.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["txn_1", "txn_3"]);
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].id, "txn_1");
}

#[tokio::test]
async fn health_check_reports_instead_of_failing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/accounts");
            then.status(503).body("upstream unavailable");
        })
        .await;

    let health = client_for(&server).health_check().await;

    assert_eq!(health.status, "unhealthy");
    assert!(!health.connected);
    assert_eq!(
        health.error.as_deref(),
        Some("Mercury API Error (503): upstream unavailable")
    );
}

#[tokio::test]
async fn health_check_counts_accounts() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/accounts");
            then.status(200)
                .json_body(json!({ "accounts": [{ "id": "acc_1", "name": "Checking" }] }));
        })
        .await;

    let health = client_for(&server).health_check().await;

    assert!(health.connected);
    assert_eq!(health.account_count, Some(1));
}

#[tokio::test]
async fn no_content_yields_empty_results() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/accounts");
            then.status(204);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/transactions");
            then.status(204);
        })
        .await;
    let bank = client_for(&server);

    let accounts = bank.get_accounts().await.unwrap();
    let page = bank
        .get_transactions(&TransactionQuery::default())
        .await
        .unwrap();

    assert!(accounts.is_empty());
    assert!(page.transactions.is_empty());
    assert_eq!(page.total, None);
}

#[tokio::test]
async fn unreachable_host_reports_status_zero() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let bank =
        MercuryClient::new(&format!("http://127.0.0.1:{}/api/v1", port), "tok_live_123").unwrap();

    let err = bank.get_accounts().await.unwrap_err();

    assert_eq!(err.status_code, 0);
    assert!(err.message.starts_with("Request failed: "), "{}", err.message);
}

#[tokio::test]
async fn single_account_and_transaction_lookups() {
    let server = MockServer::start_async().await;
    let account = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/accounts/acc_1");
            then.status(200).json_body(json!({
                "id": "acc_1", "name": "Checking", "availableBalance": 250.0, "currentBalance": 300.0
            }));
        })
        .await;
    let txn = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/transactions/txn_9");
            then.status(200).json_body(json!({
                "id": "txn_9", "amount": 75.0, "counterpartyName": "Globex",
                "postedAt": "2025-04-01T08:00:00Z"
            }));
        })
        .await;
    let bank = client_for(&server);

    let acc = bank.get_account("acc_1").await.unwrap();
    let t = bank.get_transaction("txn_9").await.unwrap();

    account.assert_async().await;
    txn.assert_async().await;
    assert_eq!(acc.name, "Checking");
    assert_eq!(acc.current_balance, 300.0);
    assert_eq!(t.counterparty_name.as_deref(), Some("Globex"));
    assert_eq!(t.posted_day().as_deref(), Some("2025-04-01"));
}

#[tokio::test]
async fn missing_transaction_is_a_not_found_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/transactions/txn_missing");
            then.status(404).json_body(json!({ "message": "Transaction not found" }));
        })
        .await;

    let err = client_for(&server)
        .get_transaction("txn_missing")
        .await
        .unwrap_err();

    assert_eq!(err.status_code, 404);
    assert_eq!(err.message, "Transaction not found");
}

#[tokio::test]
async fn treasury_is_returned_raw() {
    let server = MockServer::start_async().await;
    let treasury = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/treasury");
            then.status(200)
                .json_body(json!({ "accounts": [{ "id": "tr_1", "availableBalance": 10000.0 }] }));
        })
        .await;

    let body = client_for(&server).get_treasury().await.unwrap();

    treasury.assert_async().await;
    assert_eq!(body["accounts"][0]["id"], "tr_1");
}
