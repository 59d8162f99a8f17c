//! Slack incoming-webhook notifications for bank activity.

use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Posts Block Kit `blocks` with `text` as the notification fallback.
    /// Returns true only when Slack answered 200.
    pub async fn send_message(&self, blocks: Vec<JsonValue>, text: &str) -> bool {
        let Some(url) = self.webhook_url.as_deref() else {
            tracing::debug!("Slack notifications disabled (no webhook URL)");
            return false;
        };

        let result = self
            .http
            .post(url)
            .json(&json!({ "text": text, "blocks": blocks }))
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().as_u16() == 200 => {
                tracing::info!("Slack notification sent");
                true
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Slack webhook rejected notification");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to send Slack notification");
                false
            }
        }
    }

    pub async fn notify_new_deposit(
        &self,
        amount: f64,
        counterparty: &str,
        transaction_id: &str,
        account_name: &str,
        transaction_date: Option<&str>,
    ) -> bool {
        let date = date_or_today(transaction_date);
        let short_id: String = transaction_id.chars().take(16).collect();
        let blocks = vec![
            header("💰 New Deposit Received"),
            fields(&[
                format!("*Amount:*\n{}", format_usd(amount)),
                format!("*From:*\n{}", counterparty),
                format!("*Account:*\n{}", account_name),
                format!("*Date:*\n{}", date),
            ]),
            context(&format!("Transaction ID: `{}...`", short_id)),
        ];
        self.send_message(
            blocks,
            &format!("New deposit: {} from {}", format_usd(amount), counterparty),
        )
        .await
    }

    pub async fn notify_reconciliation(
        &self,
        amount: f64,
        invoice_number: &str,
        counterparty: &str,
        match_type: &str,
        confidence: f64,
    ) -> bool {
        let blocks = vec![
            header("✅ Payment Reconciled"),
            fields(&[
                format!("*Amount:*\n{}", format_usd(amount)),
                format!("*Invoice:*\n{}", invoice_number),
                format!("*From:*\n{}", counterparty),
                format!(
                    "*Match:*\n{} {} ({:.0}%)",
                    confidence_badge(confidence),
                    match_type,
                    confidence * 100.0
                ),
            ]),
        ];
        self.send_message(
            blocks,
            &format!("Reconciled {} to {}", format_usd(amount), invoice_number),
        )
        .await
    }

    pub async fn notify_unmatched_deposit(
        &self,
        amount: f64,
        counterparty: &str,
        transaction_date: Option<&str>,
    ) -> bool {
        let date = date_or_today(transaction_date);
        let blocks = vec![
            header("⚠️ Unmatched Deposit"),
            json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "A deposit of *{}* from *{}* could not be automatically matched to an invoice.",
                        format_usd(amount),
                        counterparty
                    )
                }
            }),
            fields(&[
                format!("*Amount:*\n{}", format_usd(amount)),
                format!("*From:*\n{}", counterparty),
                format!("*Date:*\n{}", date),
            ]),
            context("💡 Create a matching invoice in Odoo or manually reconcile this payment."),
        ];
        self.send_message(
            blocks,
            &format!("Unmatched deposit: {} from {}", format_usd(amount), counterparty),
        )
        .await
    }

    /// Skipped (returns false) when there is nothing new.
    pub async fn notify_sync_summary(
        &self,
        new_transactions: u64,
        deposits: u64,
        reconciled: u64,
        unmatched: u64,
        total_deposited: f64,
    ) -> bool {
        if new_transactions == 0 {
            return false;
        }

        let mut blocks = vec![
            header("📊 Mercury Sync Summary"),
            fields(&[
                format!("*New Transactions:*\n{}", new_transactions),
                format!("*Deposits:*\n{}", deposits),
                format!("*Auto-Reconciled:*\n{}", reconciled),
                format!("*Needs Review:*\n{}", unmatched),
            ]),
        ];
        if total_deposited > 0.0 {
            blocks.push(context(&format!(
                "💵 Total deposited: *{}*",
                format_usd(total_deposited)
            )));
        }

        self.send_message(
            blocks,
            &format!(
                "Mercury sync: {} new, {} reconciled",
                new_transactions, reconciled
            ),
        )
        .await
    }
}

fn header(text: &str) -> JsonValue {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": text, "emoji": true }
    })
}

fn fields(items: &[String]) -> JsonValue {
    let fields: Vec<JsonValue> = items
        .iter()
        .map(|t| json!({ "type": "mrkdwn", "text": t }))
        .collect();
    json!({ "type": "section", "fields": fields })
}

fn context(text: &str) -> JsonValue {
    json!({
        "type": "context",
        "elements": [{ "type": "mrkdwn", "text": text }]
    })
}

fn date_or_today(date: Option<&str>) -> String {
    date.map(str::to_string)
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string())
}

pub fn confidence_badge(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "🟢"
    } else if confidence >= 0.5 {
        "🟡"
    } else {
        "🟠"
    }
}

/// `1234.5` -> `$1,234.50`.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}
