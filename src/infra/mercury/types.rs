use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Mercury caps `limit` at 500.
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MercuryAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub available_balance: f64,
    #[serde(default)]
    pub current_balance: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MercuryTransaction {
    pub id: String,
    /// Positive for credits, negative for debits.
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub counterparty_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl MercuryTransaction {
    pub fn is_deposit(&self) -> bool {
        self.amount > 0.0
    }

    /// Counterparty and note joined, the text searched for references.
    pub fn memo(&self) -> String {
        format!(
            "{} {}",
            self.counterparty_name.as_deref().unwrap_or_default(),
            self.note.as_deref().unwrap_or_default()
        )
    }

    /// Posting date, falling back to the creation date.
    pub fn effective_date(&self) -> Option<&str> {
        self.posted_at.as_deref().or(self.created_at.as_deref())
    }

    /// `YYYY-MM-DD` prefix of `postedAt`.
    pub fn posted_day(&self) -> Option<String> {
        self.posted_at
            .as_deref()
            .and_then(|p| p.get(..10))
            .map(str::to_string)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TransactionPage {
    #[serde(default)]
    pub transactions: Vec<MercuryTransaction>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TransactionQuery {
    /// `None` queries the cross-account endpoint.
    pub account_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            account_id: None,
            limit: 100,
            offset: 0,
            start: None,
            end: None,
            status: None,
            search: None,
        }
    }
}

impl TransactionQuery {
    pub fn endpoint(&self) -> String {
        match &self.account_id {
            Some(id) => format!("/accounts/{}/transactions", id),
            None => "/transactions".to_string(),
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.limit.min(MAX_PAGE_SIZE).to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(start) = self.start {
            params.push(("start", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end {
            params.push(("end", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(status) = &self.status {
            params.push(("status", status.clone()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        params
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub available_balance: f64,
    pub current_balance: f64,
}

#[derive(Serialize, Debug, Clone)]
pub struct BalanceSummary {
    pub total_available: f64,
    pub total_current: f64,
    pub accounts: Vec<AccountSummary>,
}

impl BalanceSummary {
    pub fn from_accounts(accounts: &[MercuryAccount]) -> Self {
        let summaries: Vec<AccountSummary> = accounts
            .iter()
            .map(|a| AccountSummary {
                id: a.id.clone(),
                name: a.name.clone(),
                kind: a.kind.clone(),
                available_balance: a.available_balance,
                current_balance: a.current_balance,
            })
            .collect();
        Self {
            total_available: accounts.iter().map(|a| a.available_balance).sum(),
            total_current: accounts.iter().map(|a| a.current_balance).sum(),
            accounts: summaries,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}
