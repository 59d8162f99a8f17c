//! Invoice operations called from payment webhooks.
//!
//! Odoo is the system of record. This service translates a checkout or payment event into the
//! partner / product / invoice / payment records Odoo expects.

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::payments::{register_inbound_payment, InboundPayment, ReferenceField};
use crate::infra::odoo::{first_id, many2one_id, many2one_name, odoo_str, OdooExecutor};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use utoipa::ToSchema;

/// `default_code` of the catch-all product used when no product code matches.
pub const GENERIC_PRODUCT_CODE: &str = "STRIPE-PAYMENT";

const INVOICE_FIELDS: &[&str] = &[
    "id",
    "name",
    "partner_id",
    "amount_total",
    "amount_residual",
    "state",
    "payment_state",
    "invoice_date",
    "ref",
];

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_email: String,
    pub amount: f64,
    pub stripe_session_id: String,
    pub description: String,
    pub product_code: Option<String>,
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct InvoiceCreated {
    pub success: bool,
    pub invoice_id: i64,
    pub invoice_number: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PaymentNotice {
    pub invoice_id: Option<i64>,
    pub stripe_session_id: Option<String>,
    pub payment_id: String,
    pub amount: Option<f64>,
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PaymentRegistered {
    pub success: bool,
    pub invoice_id: i64,
    /// 0 when the invoice was already paid.
    pub payment_id: i64,
    pub message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct InvoiceView {
    pub id: i64,
    pub name: String,
    pub partner_name: String,
    pub partner_email: String,
    pub amount_total: f64,
    pub amount_residual: f64,
    pub state: String,
    pub payment_state: String,
    pub invoice_date: Option<String>,
    pub stripe_session_id: Option<String>,
}

/// `john.doe` -> `John.Doe`: upper-case after every non-letter, lower-case elsewhere.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn str_field(record: &JsonValue, field: &str) -> String {
    record
        .get(field)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn f64_field(record: &JsonValue, field: &str) -> f64 {
    record.get(field).and_then(JsonValue::as_f64).unwrap_or(0.0)
}

#[derive(Clone)]
pub struct InvoiceService {
    odoo: Arc<dyn OdooExecutor>,
}

impl InvoiceService {
    pub fn new(odoo: Arc<dyn OdooExecutor>) -> Self {
        Self { odoo }
    }

    async fn find_or_create_partner(&self, email: &str) -> ServiceResult<i64> {
        let existing = self
            .odoo
            .search("res.partner", json!([["email", "=", email]]))
            .await?;
        if let Some(id) = existing.first() {
            return Ok(*id);
        }

        let local_part = email.split('@').next().unwrap_or(email);
        let id = self
            .odoo
            .create(
                "res.partner",
                json!({
                    "name": title_case(local_part),
                    "email": email,
                    "customer_rank": 1,
                }),
            )
            .await?;
        tracing::info!(partner_id = id, email, "created Odoo partner");
        Ok(id)
    }

    async fn product_by_code(&self, code: &str) -> ServiceResult<Option<i64>> {
        let rows = self
            .odoo
            .search_read("product.product", json!([["default_code", "=", code]]), &["id"], None)
            .await?;
        Ok(first_id(&rows))
    }

    async fn resolve_product(&self, product_code: Option<&str>) -> ServiceResult<i64> {
        if let Some(code) = product_code {
            if let Some(id) = self.product_by_code(code).await? {
                return Ok(id);
            }
        }
        if let Some(id) = self.product_by_code(GENERIC_PRODUCT_CODE).await? {
            return Ok(id);
        }

        let template_id = self
            .odoo
            .create(
                "product.template",
                json!({
                    "name": "Stripe Payment",
                    "type": "service",
                    "default_code": GENERIC_PRODUCT_CODE,
                    "list_price": 0,
                    "invoice_policy": "order",
                }),
            )
            .await?;
        let variants = self
            .odoo
            .search_read(
                "product.product",
                json!([["product_tmpl_id", "=", template_id]]),
                &["id"],
                None,
            )
            .await?;
        first_id(&variants).ok_or_else(|| {
            ServiceError::Failed(format!("No product variant for template {}", template_id))
        })
    }

    /// Finds or creates the customer and product, then creates and posts the invoice.
    pub async fn create_invoice(&self, input: &NewInvoice) -> ServiceResult<InvoiceCreated> {
        let partner_id = self.find_or_create_partner(&input.customer_email).await?;
        let product_id = self.resolve_product(input.product_code.as_deref()).await?;

        let invoice_id = self
            .odoo
            .create(
                "account.move",
                json!({
                    "move_type": "out_invoice",
                    "partner_id": partner_id,
                    "invoice_date": chrono::Local::now().format("%Y-%m-%d").to_string(),
                    "ref": input.stripe_session_id,
                    "narration": format!("Stripe Session: {}", input.stripe_session_id),
                    "invoice_line_ids": [[0, 0, {
                        "product_id": product_id,
                        "name": input.description,
                        "quantity": 1,
                        "price_unit": input.amount,
                    }]],
                }),
            )
            .await?;

        self.odoo.call("account.move", "action_post", &[invoice_id]).await?;

        let rows = self.odoo.read("account.move", &[invoice_id], &["name"]).await?;
        let invoice_number = rows.first().map(|r| str_field(r, "name")).unwrap_or_default();

        tracing::info!(invoice_id, %invoice_number, session = %input.stripe_session_id, "invoice created and posted");
        Ok(InvoiceCreated {
            success: true,
            invoice_id,
            message: format!("Invoice {} created and posted", invoice_number),
            invoice_number,
        })
    }

    async fn find_invoice_by_session(&self, session_id: &str) -> ServiceResult<Option<i64>> {
        let rows = self
            .odoo
            .search_read(
                "account.move",
                json!([["ref", "=", session_id], ["move_type", "=", "out_invoice"]]),
                &["id", "amount_residual"],
                None,
            )
            .await?;
        Ok(first_id(&rows))
    }

    /// Registers a payment for the invoice, located by id or by Stripe session.
    pub async fn mark_invoice_paid(&self, notice: &PaymentNotice) -> ServiceResult<PaymentRegistered> {
        let mut invoice_id = notice.invoice_id;
        if invoice_id.is_none() {
            if let Some(session) = notice.stripe_session_id.as_deref() {
                invoice_id = self.find_invoice_by_session(session).await?;
            }
        }
        let invoice_id =
            invoice_id.ok_or_else(|| ServiceError::NotFound("Invoice not found".to_string()))?;

        let rows = self
            .odoo
            .read(
                "account.move",
                &[invoice_id],
                &["name", "amount_residual", "state", "payment_state", "currency_id", "partner_id"],
            )
            .await?;
        let invoice = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound("Invoice not found".to_string()))?;
        let name = str_field(invoice, "name");

        if str_field(invoice, "payment_state") == "paid" {
            return Ok(PaymentRegistered {
                success: true,
                invoice_id,
                payment_id: 0,
                message: format!("Invoice {} is already paid", name),
            });
        }

        let state = str_field(invoice, "state");
        if state != "posted" {
            return Err(ServiceError::BadRequest(format!(
                "Invoice is not posted (state: {})",
                state
            )));
        }

        let partner_id = invoice
            .get("partner_id")
            .and_then(many2one_id)
            .ok_or_else(|| ServiceError::Failed(format!("Invoice {} has no partner", name)))?;
        let currency_id = invoice
            .get("currency_id")
            .and_then(many2one_id)
            .ok_or_else(|| ServiceError::Failed(format!("Invoice {} has no currency", name)))?;

        let payment_id = register_inbound_payment(
            self.odoo.as_ref(),
            &InboundPayment {
                invoice_id,
                partner_id,
                currency_id,
                amount: notice
                    .amount
                    .filter(|a| *a > 0.0)
                    .unwrap_or_else(|| f64_field(invoice, "amount_residual")),
                reference_field: ReferenceField::Ref,
                reference: notice.payment_id.clone(),
                date: None,
            },
        )
        .await?;

        tracing::info!(invoice_id, payment_id, "payment registered");
        Ok(PaymentRegistered {
            success: true,
            invoice_id,
            payment_id,
            message: format!("Payment registered for invoice {}", name),
        })
    }

    async fn to_view(&self, invoice: &JsonValue) -> ServiceResult<InvoiceView> {
        let partner = invoice.get("partner_id").cloned().unwrap_or(JsonValue::Bool(false));
        let partner_email = match many2one_id(&partner) {
            Some(partner_id) => self
                .odoo
                .read("res.partner", &[partner_id], &["email"])
                .await?
                .first()
                .and_then(|p| p.get("email"))
                .and_then(odoo_str)
                .unwrap_or_default(),
            None => String::new(),
        };

        Ok(InvoiceView {
            id: invoice.get("id").and_then(JsonValue::as_i64).unwrap_or_default(),
            name: str_field(invoice, "name"),
            partner_name: many2one_name(&partner).unwrap_or_default(),
            partner_email,
            amount_total: f64_field(invoice, "amount_total"),
            amount_residual: f64_field(invoice, "amount_residual"),
            state: str_field(invoice, "state"),
            payment_state: str_field(invoice, "payment_state"),
            invoice_date: invoice.get("invoice_date").and_then(odoo_str),
            stripe_session_id: invoice.get("ref").and_then(odoo_str),
        })
    }

    async fn first_invoice(&self, domain: JsonValue) -> ServiceResult<InvoiceView> {
        let rows = self
            .odoo
            .search_read("account.move", domain, INVOICE_FIELDS, Some(1))
            .await?;
        let invoice = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound("Invoice not found".to_string()))?;
        self.to_view(invoice).await
    }

    pub async fn get_invoice(&self, invoice_id: i64) -> ServiceResult<InvoiceView> {
        self.first_invoice(json!([["id", "=", invoice_id]])).await
    }

    pub async fn get_invoice_by_stripe(&self, session_id: &str) -> ServiceResult<InvoiceView> {
        self.first_invoice(json!([["ref", "=", session_id], ["move_type", "=", "out_invoice"]]))
            .await
    }
}
