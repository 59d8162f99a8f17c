//! Odoo RPC access.
//!
//! `OdooExecutor` is the seam the invoice and reconciliation logic is written against;
//! `OdooClient` is the JSON-RPC implementation used in production.

pub mod client;

pub use client::OdooClient;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OdooError {
    #[error("Odoo request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Odoo authentication failed")]
    AuthenticationFailed,

    #[error("Odoo RPC error: {message}")]
    Rpc { message: String },

    #[error("Unexpected Odoo response: {0}")]
    UnexpectedResponse(String),
}

#[async_trait]
pub trait OdooExecutor: Send + Sync {
    /// Returns the authenticated user id, authenticating on first use.
    async fn authenticate(&self) -> Result<i64, OdooError>;

    /// `execute_kw(model, method, args, kwargs)` on the `object` service.
    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: JsonValue,
        kwargs: JsonValue,
    ) -> Result<JsonValue, OdooError>;

    async fn search(&self, model: &str, domain: JsonValue) -> Result<Vec<i64>, OdooError> {
        let result = self.execute_kw(model, "search", json!([domain]), json!({})).await?;
        let ids = result
            .as_array()
            .ok_or_else(|| OdooError::UnexpectedResponse(format!("{model}.search: {result}")))?;
        Ok(ids.iter().filter_map(JsonValue::as_i64).collect())
    }

    async fn search_read(
        &self,
        model: &str,
        domain: JsonValue,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<JsonValue>, OdooError> {
        let mut kwargs = json!({ "fields": fields });
        if let Some(limit) = limit {
            kwargs["limit"] = json!(limit);
        }
        let result = self
            .execute_kw(model, "search_read", json!([domain]), kwargs)
            .await?;
        records(model, "search_read", result)
    }

    async fn read(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<JsonValue>, OdooError> {
        let result = self
            .execute_kw(model, "read", json!([ids]), json!({ "fields": fields }))
            .await?;
        records(model, "read", result)
    }

    /// Creates one record and returns its id.
    async fn create(&self, model: &str, values: JsonValue) -> Result<i64, OdooError> {
        let result = self.execute_kw(model, "create", json!([values]), json!({})).await?;
        result
            .as_i64()
            .or_else(|| result.as_array().and_then(|a| a.first()).and_then(JsonValue::as_i64))
            .ok_or_else(|| OdooError::UnexpectedResponse(format!("{model}.create: {result}")))
    }

    /// Calls a record method (e.g. `action_post`) on `ids`.
    async fn call(&self, model: &str, method: &str, ids: &[i64]) -> Result<JsonValue, OdooError> {
        self.execute_kw(model, method, json!([ids]), json!({})).await
    }
}

fn records(model: &str, method: &str, result: JsonValue) -> Result<Vec<JsonValue>, OdooError> {
    match result {
        JsonValue::Array(rows) => Ok(rows),
        other => Err(OdooError::UnexpectedResponse(format!(
            "{model}.{method}: {other}"
        ))),
    }
}

/// Id of a many2one value (`[id, "display name"]`, or `false` when unset).
pub fn many2one_id(value: &JsonValue) -> Option<i64> {
    value.as_array()?.first()?.as_i64()
}

/// Display name of a many2one value.
pub fn many2one_name(value: &JsonValue) -> Option<String> {
    value.as_array()?.get(1)?.as_str().map(str::to_string)
}

/// Odoo sends `false` for empty char/date fields.
pub fn odoo_str(value: &JsonValue) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Id of the first record of a `search_read`/`read` result.
pub fn first_id(rows: &[JsonValue]) -> Option<i64> {
    rows.first()?.get("id")?.as_i64()
}
