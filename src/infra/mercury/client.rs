// Responsible for all communication with the Mercury banking API.

use super::types::{MercuryAccount, MercuryTransaction, TransactionPage, TransactionQuery};
use super::MercuryApi;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

/// Error returned by the Mercury API. `status_code` is 0 when no response was received.
#[derive(Error, Debug, Clone)]
#[error("Mercury API Error ({status_code}): {message}")]
pub struct MercuryApiError {
    pub status_code: u16,
    pub message: String,
}

impl MercuryApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

#[derive(Deserialize, Default)]
struct AccountsEnvelope {
    #[serde(default)]
    accounts: Vec<MercuryAccount>,
}

pub struct MercuryClient {
    http: reqwest::Client,
    base_url: String,
}

impl MercuryClient {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, MercuryApiError> {
        if api_token.trim().is_empty() {
            return Err(MercuryApiError::new(
                0,
                "Mercury API token is required. Set MERCURY_API_TOKEN environment variable.",
            ));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_token))
            .map_err(|_| MercuryApiError::new(0, "Mercury API token contains invalid characters"))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MercuryApiError::new(0, format!("Request failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Makes an API request and maps HTTP failures into `MercuryApiError`.
    async fn request<T: DeserializeOwned + Default>(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<T, MercuryApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .request(method, &url)
            .query(params)
            .send()
            .await
            .map_err(|e| MercuryApiError::new(0, format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(MercuryApiError::new(status.as_u16(), error_message(&body)));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MercuryApiError::new(status.as_u16(), format!("Invalid response body: {}", e)))
    }

    pub async fn get_account(&self, account_id: &str) -> Result<MercuryAccount, MercuryApiError> {
        self.request(Method::GET, &format!("/accounts/{}", account_id), &[])
            .await
    }

    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<MercuryTransaction, MercuryApiError> {
        self.request(Method::GET, &format!("/transactions/{}", transaction_id), &[])
            .await
    }

    /// Treasury accounts, returned as Mercury sends them.
    pub async fn get_treasury(&self) -> Result<JsonValue, MercuryApiError> {
        self.request(Method::GET, "/treasury", &[]).await
    }
}

/// Prefers the `error` then `message` field of a JSON error body, else the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl MercuryApi for MercuryClient {
    async fn get_accounts(&self) -> Result<Vec<MercuryAccount>, MercuryApiError> {
        let envelope: AccountsEnvelope = self.request(Method::GET, "/accounts", &[]).await?;
        Ok(envelope.accounts)
    }

    async fn get_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, MercuryApiError> {
        self.request(Method::GET, &query.endpoint(), &query.params())
            .await
    }
}
