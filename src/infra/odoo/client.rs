// Responsible for all communication with Odoo over its JSON-RPC endpoint.

use super::{OdooError, OdooExecutor};
use crate::infra::config::OdooConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Deserialize, Debug)]
struct RpcResponse {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Deserialize, Debug)]
struct RpcErrorData {
    #[serde(default)]
    message: Option<String>,
}

pub struct OdooClient {
    http: reqwest::Client,
    config: OdooConfig,
    /// Cached user id from the first successful `authenticate`.
    uid: Mutex<Option<i64>>,
    request_id: AtomicU64,
}

impl OdooClient {
    pub fn new(config: OdooConfig) -> Result<Self, OdooError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            config,
            uid: Mutex::new(None),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn rpc(&self, service: &str, method: &str, args: JsonValue) -> Result<JsonValue, OdooError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": id,
        });

        let response: RpcResponse = self
            .http
            .post(format!("{}/jsonrpc", self.config.url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            let message = err
                .data
                .and_then(|d| d.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(err.message);
            return Err(OdooError::Rpc { message });
        }

        Ok(response.result.unwrap_or(JsonValue::Null))
    }
}

#[async_trait]
impl OdooExecutor for OdooClient {
    async fn authenticate(&self) -> Result<i64, OdooError> {
        let mut uid = self.uid.lock().await;
        if let Some(cached) = *uid {
            return Ok(cached);
        }

        let result = self
            .rpc(
                "common",
                "authenticate",
                json!([self.config.db, self.config.username, self.config.api_key, {}]),
            )
            .await?;

        // Odoo answers `false` for bad credentials.
        let authenticated = result.as_i64().ok_or(OdooError::AuthenticationFailed)?;
        tracing::debug!(uid = authenticated, db = %self.config.db, "authenticated against Odoo");
        *uid = Some(authenticated);
        Ok(authenticated)
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: JsonValue,
        kwargs: JsonValue,
    ) -> Result<JsonValue, OdooError> {
        let uid = self.authenticate().await?;
        self.rpc(
            "object",
            "execute_kw",
            json!([
                self.config.db,
                uid,
                self.config.api_key,
                model,
                method,
                args,
                kwargs
            ]),
        )
        .await
    }
}
