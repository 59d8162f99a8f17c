//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use odoo_mercury_bridge::infra::mercury::{
    MercuryAccount, MercuryApi, MercuryApiError, MercuryTransaction, TransactionPage,
    TransactionQuery,
};
use odoo_mercury_bridge::infra::odoo::{OdooError, OdooExecutor};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One `execute_kw` as seen by the fake.
#[derive(Debug, Clone)]
pub struct OdooCall {
    pub model: String,
    pub method: String,
    pub args: JsonValue,
    pub kwargs: JsonValue,
}

impl OdooCall {
    pub fn is(&self, model: &str, method: &str) -> bool {
        self.model == model && self.method == method
    }

    /// Value of the `[field, op, value]` term in the search domain, if any.
    pub fn domain_value(&self, field: &str, op: &str) -> Option<&JsonValue> {
        self.args
            .get(0)?
            .as_array()?
            .iter()
            .filter_map(JsonValue::as_array)
            .find(|term| term.len() == 3 && term[0] == field && term[1] == op)
            .map(|term| &term[2])
    }

    /// Ids passed to `read` or a record method.
    pub fn ids(&self) -> Vec<i64> {
        self.args
            .get(0)
            .and_then(JsonValue::as_array)
            .map(|ids| ids.iter().filter_map(JsonValue::as_i64).collect())
            .unwrap_or_default()
    }
}

type Script = Box<dyn Fn(&OdooCall) -> Option<Result<JsonValue, OdooError>> + Send + Sync>;

/// `OdooExecutor` answering from a closure. Unscripted searches return no rows and
/// other methods return `true`.
pub struct ScriptedOdoo {
    script: Script,
    auth_fails: bool,
    calls: Mutex<Vec<OdooCall>>,
}

impl ScriptedOdoo {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&OdooCall) -> Option<Result<JsonValue, OdooError>> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            auth_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_| None)
    }

    pub fn failing_auth() -> Self {
        Self {
            auth_fails: true,
            ..Self::empty()
        }
    }

    pub fn calls(&self) -> Vec<OdooCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, model: &str, method: &str) -> Vec<OdooCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.is(model, method))
            .collect()
    }

    /// Values passed to `create` on `model`.
    pub fn created(&self, model: &str) -> Vec<JsonValue> {
        self.calls_to(model, "create")
            .into_iter()
            .map(|c| c.args[0].clone())
            .collect()
    }
}

#[async_trait]
impl OdooExecutor for ScriptedOdoo {
    async fn authenticate(&self) -> Result<i64, OdooError> {
        if self.auth_fails {
            Err(OdooError::AuthenticationFailed)
        } else {
            Ok(2)
        }
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: JsonValue,
        kwargs: JsonValue,
    ) -> Result<JsonValue, OdooError> {
        let call = OdooCall {
            model: model.to_string(),
            method: method.to_string(),
            args,
            kwargs,
        };
        self.calls.lock().unwrap().push(call.clone());

        match (self.script)(&call) {
            Some(result) => result,
            None => match method {
                "search" | "search_read" | "read" => Ok(json!([])),
                _ => Ok(json!(true)),
            },
        }
    }
}

/// Delays every `execute_kw` so concurrent callers interleave.
pub struct SlowOdoo(pub Arc<ScriptedOdoo>);

#[async_trait]
impl OdooExecutor for SlowOdoo {
    async fn authenticate(&self) -> Result<i64, OdooError> {
        self.0.authenticate().await
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: JsonValue,
        kwargs: JsonValue,
    ) -> Result<JsonValue, OdooError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.0.execute_kw(model, method, args, kwargs).await
    }
}

pub const BANK_JOURNAL_ID: i64 = 9;
pub const PAYMENT_ID: i64 = 42;
pub const PAYMENT_MOVE_ID: i64 = 88;

/// Responses for a successful inbound payment: bank journal, method line, created and
/// posted payment, and one open receivable line on each move.
pub fn payment_flow(call: &OdooCall) -> Option<Result<JsonValue, OdooError>> {
    let rows = if call.is("account.journal", "search_read") {
        json!([{ "id": BANK_JOURNAL_ID }])
    } else if call.is("account.payment.method.line", "search_read") {
        json!([{ "id": 3 }])
    } else if call.is("account.payment", "create") {
        json!(PAYMENT_ID)
    } else if call.is("account.payment", "read") {
        json!([{ "id": PAYMENT_ID, "move_id": [PAYMENT_MOVE_ID, "PBNK1/2025/0001"], "state": "posted" }])
    } else if call.is("account.move.line", "search_read") {
        let move_id = call.domain_value("move_id", "=")?.as_i64()?;
        json!([{ "id": move_id * 10 + 1 }])
    } else {
        return None;
    };
    Some(Ok(rows))
}

// --- Mercury ---

pub struct FakeMercury {
    accounts: Vec<MercuryAccount>,
    transactions: Mutex<Vec<MercuryTransaction>>,
    failure: Option<MercuryApiError>,
    queries: Mutex<Vec<TransactionQuery>>,
}

impl FakeMercury {
    pub fn new(accounts: Vec<MercuryAccount>, transactions: Vec<MercuryTransaction>) -> Self {
        Self {
            accounts,
            transactions: Mutex::new(transactions),
            failure: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `err`.
    pub fn failing(err: MercuryApiError) -> Self {
        Self {
            failure: Some(err),
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    pub fn set_transactions(&self, transactions: Vec<MercuryTransaction>) {
        *self.transactions.lock().unwrap() = transactions;
    }

    pub fn queries(&self) -> Vec<TransactionQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MercuryApi for FakeMercury {
    async fn get_accounts(&self) -> Result<Vec<MercuryAccount>, MercuryApiError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self.accounts.clone())
    }

    async fn get_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, MercuryApiError> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let transactions: Vec<MercuryTransaction> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| match &query.account_id {
                Some(id) => t.account_id.as_deref() == Some(id.as_str()),
                None => true,
            })
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(TransactionPage {
            total: Some(transactions.len() as u64),
            transactions,
        })
    }
}

pub fn account(id: &str, name: &str, available: f64, current: f64) -> MercuryAccount {
    MercuryAccount {
        id: id.to_string(),
        name: name.to_string(),
        kind: Some("checking".to_string()),
        status: Some("active".to_string()),
        available_balance: available,
        current_balance: current,
    }
}

pub fn transaction(
    id: &str,
    amount: f64,
    counterparty: &str,
    note: Option<&str>,
    posted_at: &str,
) -> MercuryTransaction {
    MercuryTransaction {
        id: id.to_string(),
        amount,
        account_id: Some("acc_1".to_string()),
        counterparty_name: Some(counterparty.to_string()),
        note: note.map(str::to_string),
        posted_at: Some(posted_at.to_string()),
        created_at: Some(posted_at.to_string()),
        status: Some("sent".to_string()),
    }
}
