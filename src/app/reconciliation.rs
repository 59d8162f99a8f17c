//! Matching Mercury deposits to open Odoo invoices and booking the payments.
//!
//! Strategies, in order of confidence:
//! 1. invoice number in the transaction memo (1.0)
//! 2. exact amount + customer email in the memo (0.9)
//! 3. exact amount + invoice date proximity (up to 0.7)

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::payments::{register_inbound_payment, InboundPayment, ReferenceField};
use crate::domain::matching::{
    amounts_match, date_proximity_score, extract_email, extract_invoice_number,
    parse_transaction_date, MatchType, AMOUNT_DATE_BASE_CONFIDENCE, AMOUNT_EMAIL_CONFIDENCE,
    AMOUNT_TOLERANCE, DATE_TOLERANCE_DAYS, INVOICE_NUMBER_CONFIDENCE,
};
use crate::infra::mercury::{MercuryApi, MercuryTransaction};
use crate::infra::odoo::{first_id, many2one_id, OdooExecutor};
use crate::storage::sync_state::{NewProcessedTransaction, NewReconciliation, SyncStore};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use utoipa::ToSchema;

const OPEN_INVOICE_FIELDS: &[&str] = &[
    "id",
    "name",
    "partner_id",
    "amount_total",
    "amount_residual",
    "invoice_date",
    "ref",
    "narration",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    pub invoice_id: Option<i64>,
    pub invoice_number: Option<String>,
    pub match_type: Option<MatchType>,
    pub confidence: f64,
    pub details: Option<String>,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            matched: false,
            invoice_id: None,
            invoice_number: None,
            match_type: None,
            confidence: 0.0,
            details: None,
        }
    }

    fn no_match(details: &str) -> Self {
        Self {
            details: Some(details.to_string()),
            ..Self::none()
        }
    }

    fn found(invoice: &JsonValue, match_type: MatchType, confidence: f64, details: String) -> Self {
        Self {
            matched: true,
            invoice_id: invoice.get("id").and_then(JsonValue::as_i64),
            invoice_number: invoice
                .get("name")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            match_type: Some(match_type),
            confidence,
            details: Some(details),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationOutcome {
    pub success: bool,
    pub transaction_id: String,
    pub invoice_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub match_type: Option<MatchType>,
    pub error: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ReconcileDetail {
    pub transaction_id: String,
    pub invoice_id: Option<i64>,
    pub invoice_number: Option<String>,
    pub payment_id: Option<i64>,
    pub amount: f64,
    pub match_type: Option<MatchType>,
    pub confidence: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ReconcileFailure {
    pub transaction_id: String,
    pub error: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct ReconcileSummary {
    pub processed: u64,
    pub matched: u64,
    pub reconciled: u64,
    pub skipped: u64,
    pub details: Vec<ReconcileDetail>,
    pub errors: Vec<ReconcileFailure>,
}

pub struct InvoiceMatcher {
    odoo: Arc<dyn OdooExecutor>,
    store: SyncStore,
}

impl InvoiceMatcher {
    pub fn new(odoo: Arc<dyn OdooExecutor>, store: SyncStore) -> Self {
        Self { odoo, store }
    }

    /// Posted customer invoices that are unpaid or partially paid, narrowed by `filters`.
    async fn open_invoices(&self, filters: Vec<JsonValue>) -> ServiceResult<Vec<JsonValue>> {
        let mut domain = vec![
            json!(["move_type", "=", "out_invoice"]),
            json!(["state", "=", "posted"]),
            json!(["payment_state", "in", ["not_paid", "partial"]]),
        ];
        domain.extend(filters);
        Ok(self
            .odoo
            .search_read("account.move", JsonValue::Array(domain), OPEN_INVOICE_FIELDS, None)
            .await?)
    }

    fn amount_filters(amount: f64) -> Vec<JsonValue> {
        vec![
            json!(["amount_residual", ">=", amount - AMOUNT_TOLERANCE]),
            json!(["amount_residual", "<=", amount + AMOUNT_TOLERANCE]),
        ]
    }

    fn residual_matches(invoice: &JsonValue, amount: f64) -> bool {
        invoice
            .get("amount_residual")
            .and_then(JsonValue::as_f64)
            .map_or(false, |residual| amounts_match(residual, amount))
    }

    pub async fn match_by_invoice_number(&self, txn: &MercuryTransaction) -> ServiceResult<MatchResult> {
        let Some(number) = extract_invoice_number(&txn.memo()) else {
            return Ok(MatchResult::none());
        };

        let mut invoices = self
            .open_invoices(vec![json!(["name", "ilike", number])])
            .await?;
        if invoices.is_empty() {
            invoices = self
                .open_invoices(vec![json!(["ref", "ilike", number])])
                .await?;
        }

        Ok(match invoices.first() {
            Some(invoice) => MatchResult::found(
                invoice,
                MatchType::InvoiceNumber,
                INVOICE_NUMBER_CONFIDENCE,
                format!("Found invoice number '{}' in transaction memo", number),
            ),
            None => MatchResult::none(),
        })
    }

    pub async fn match_by_amount_and_email(&self, txn: &MercuryTransaction) -> ServiceResult<MatchResult> {
        let amount = txn.amount.abs();
        let Some(email) = extract_email(&txn.memo()) else {
            return Ok(MatchResult::none());
        };
        if amount <= 0.0 {
            return Ok(MatchResult::none());
        }

        let partners = self
            .odoo
            .search_read("res.partner", json!([["email", "=ilike", email]]), &["id"], None)
            .await?;
        let Some(partner_id) = first_id(&partners) else {
            return Ok(MatchResult::none());
        };

        let mut filters = vec![json!(["partner_id", "=", partner_id])];
        filters.extend(Self::amount_filters(amount));
        let invoices = self.open_invoices(filters).await?;

        Ok(
            match invoices.iter().find(|inv| Self::residual_matches(inv, amount)) {
                Some(invoice) => MatchResult::found(
                    invoice,
                    MatchType::AmountEmail,
                    AMOUNT_EMAIL_CONFIDENCE,
                    format!("Matched amount ${:.2} to customer {}", amount, email),
                ),
                None => MatchResult::none(),
            },
        )
    }

    pub async fn match_by_amount_and_date(&self, txn: &MercuryTransaction) -> ServiceResult<MatchResult> {
        let amount = txn.amount.abs();
        let Some(txn_date) = txn.effective_date().and_then(parse_transaction_date) else {
            return Ok(MatchResult::none());
        };
        if amount <= 0.0 {
            return Ok(MatchResult::none());
        }

        let invoices = self.open_invoices(Self::amount_filters(amount)).await?;

        let mut best: Option<(&JsonValue, f64)> = None;
        for invoice in invoices.iter().filter(|inv| Self::residual_matches(inv, amount)) {
            let Some(invoice_date) = invoice
                .get("invoice_date")
                .and_then(JsonValue::as_str)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if let Some(score) = date_proximity_score(txn_date, invoice_date, DATE_TOLERANCE_DAYS) {
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((invoice, score));
                }
            }
        }

        Ok(match best {
            Some((invoice, score)) => MatchResult::found(
                invoice,
                MatchType::AmountDate,
                AMOUNT_DATE_BASE_CONFIDENCE * score,
                format!(
                    "Matched amount ${:.2} within {} days",
                    amount, DATE_TOLERANCE_DAYS
                ),
            ),
            None => MatchResult::none(),
        })
    }

    /// Tries each strategy in order and returns the first match at or above `min_confidence`.
    pub async fn find_match(
        &self,
        txn: &MercuryTransaction,
        min_confidence: f64,
    ) -> ServiceResult<MatchResult> {
        if !txn.is_deposit() {
            return Ok(MatchResult::no_match("Not a deposit"));
        }

        let by_number = self.match_by_invoice_number(txn).await?;
        if by_number.matched && by_number.confidence >= min_confidence {
            return Ok(by_number);
        }

        let by_email = self.match_by_amount_and_email(txn).await?;
        if by_email.matched && by_email.confidence >= min_confidence {
            return Ok(by_email);
        }

        let by_date = self.match_by_amount_and_date(txn).await?;
        if by_date.matched && by_date.confidence >= min_confidence {
            return Ok(by_date);
        }

        Ok(MatchResult::no_match("No matching invoice found"))
    }

    /// Books a payment of `min(amount, residual)` against the invoice and returns its id.
    pub async fn create_payment(
        &self,
        invoice_id: i64,
        amount: f64,
        reference: &str,
        payment_date: Option<String>,
    ) -> ServiceResult<i64> {
        let rows = self
            .odoo
            .read(
                "account.move",
                &[invoice_id],
                &["currency_id", "partner_id", "amount_residual"],
            )
            .await?;
        let invoice = rows.first().ok_or_else(|| {
            ServiceError::NotFound(format!("Invoice {} not found", invoice_id))
        })?;

        let field_id = |field: &str| {
            invoice.get(field).and_then(many2one_id).ok_or_else(|| {
                ServiceError::Failed(format!(
                    "Invoice {} has no {}",
                    invoice_id, field
                ))
            })
        };
        let residual = invoice
            .get("amount_residual")
            .and_then(JsonValue::as_f64)
            .unwrap_or(amount);

        register_inbound_payment(
            self.odoo.as_ref(),
            &InboundPayment {
                invoice_id,
                partner_id: field_id("partner_id")?,
                currency_id: field_id("currency_id")?,
                amount: amount.min(residual),
                reference_field: ReferenceField::Memo,
                reference: format!("Mercury: {}", reference),
                date: Some(
                    payment_date
                        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string()),
                ),
            },
        )
        .await
    }

    /// Creates the payment for a successful match and logs it. Failures are reported in the
    /// outcome rather than returned as errors.
    pub async fn reconcile_transaction(
        &self,
        txn: &MercuryTransaction,
        found: &MatchResult,
    ) -> ReconciliationOutcome {
        let failed = |error: String, invoice_id: Option<i64>| ReconciliationOutcome {
            success: false,
            transaction_id: txn.id.clone(),
            invoice_id,
            payment_id: None,
            match_type: found.match_type,
            error: Some(error),
        };

        let Some(invoice_id) = found.invoice_id.filter(|_| found.matched) else {
            return failed("No match to reconcile".to_string(), None);
        };
        let amount = txn.amount.abs();

        let payment_id = match self
            .create_payment(invoice_id, amount, &txn.id, txn.posted_day())
            .await
        {
            Ok(id) => id,
            Err(e) => return failed(e.to_string(), Some(invoice_id)),
        };

        let match_type = found.match_type.map(|m| m.as_str()).unwrap_or("unknown");
        let logged = self
            .store
            .log_reconciliation(&NewReconciliation {
                transaction_id: &txn.id,
                invoice_id,
                payment_id: Some(payment_id),
                amount,
                match_type,
                match_confidence: found.confidence,
            })
            .await;
        if let Err(e) = logged {
            return failed(
                format!("Payment {} created but not logged: {}", payment_id, e),
                Some(invoice_id),
            );
        }

        tracing::info!(
            transaction_id = %txn.id,
            invoice_id,
            payment_id,
            match_type,
            confidence = found.confidence,
            "deposit reconciled"
        );
        ReconciliationOutcome {
            success: true,
            transaction_id: txn.id.clone(),
            invoice_id: Some(invoice_id),
            payment_id: Some(payment_id),
            match_type: found.match_type,
            error: None,
        }
    }
}

/// Matches and books the last `days` days of deposits.
///
/// Already reconciled deposits are skipped. Every other deposit is recorded as processed, so
/// the ones left unmatched show up in the unmatched list.
pub async fn auto_reconcile_deposits(
    bank: &dyn MercuryApi,
    odoo: Arc<dyn OdooExecutor>,
    store: &SyncStore,
    days: i64,
    min_confidence: f64,
) -> ServiceResult<ReconcileSummary> {
    let matcher = InvoiceMatcher::new(odoo, store.clone());
    let deposits = bank.get_recent_deposits(days, None).await?;
    let mut summary = ReconcileSummary::default();

    for txn in &deposits {
        if store.is_transaction_reconciled(&txn.id).await? {
            summary.skipped += 1;
            continue;
        }
        summary.processed += 1;

        // Recorded up front so a successful match can flag the row as reconciled.
        let posted_day = txn.posted_day();
        store
            .mark_transaction_processed(&NewProcessedTransaction {
                transaction_id: &txn.id,
                account_id: txn.account_id.as_deref().unwrap_or_default(),
                amount: txn.amount,
                transaction_type: "credit",
                description: txn.counterparty_name.as_deref(),
                transaction_date: posted_day.as_deref(),
            })
            .await?;

        let found = match matcher.find_match(txn, min_confidence).await {
            Ok(found) => found,
            Err(e) => {
                summary.errors.push(ReconcileFailure {
                    transaction_id: txn.id.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if found.matched {
            summary.matched += 1;
            let outcome = matcher.reconcile_transaction(txn, &found).await;
            if outcome.success {
                summary.reconciled += 1;
                summary.details.push(ReconcileDetail {
                    transaction_id: txn.id.clone(),
                    invoice_id: outcome.invoice_id,
                    invoice_number: found.invoice_number.clone(),
                    payment_id: outcome.payment_id,
                    amount: txn.amount,
                    match_type: found.match_type,
                    confidence: found.confidence,
                });
            } else {
                summary.errors.push(ReconcileFailure {
                    transaction_id: txn.id.clone(),
                    error: outcome.error.unwrap_or_default(),
                });
            }
        }
    }

    tracing::info!(
        processed = summary.processed,
        matched = summary.matched,
        reconciled = summary.reconciled,
        skipped = summary.skipped,
        errors = summary.errors.len(),
        "auto-reconciliation finished"
    );
    Ok(summary)
}
