//! Invoice creation, payment registration and lookups against a scripted Odoo.

mod common;

use common::{payment_flow, OdooCall, ScriptedOdoo, PAYMENT_ID};
use odoo_mercury_bridge::app::invoice_service::{NewInvoice, PaymentNotice};
use odoo_mercury_bridge::app::ServiceError;
use odoo_mercury_bridge::infra::odoo::OdooError;
use odoo_mercury_bridge::InvoiceService;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

fn new_invoice(product_code: Option<&str>) -> NewInvoice {
    NewInvoice {
        customer_email: "john.doe@example.com".to_string(),
        amount: 49.0,
        stripe_session_id: "cs_test_1".to_string(),
        description: "Pro plan (monthly)".to_string(),
        product_code: product_code.map(str::to_string),
    }
}

/// Answers the invoice create/post/read steps for invoice 100.
fn invoice_creation(call: &OdooCall) -> Option<Result<JsonValue, OdooError>> {
    if call.is("account.move", "create") {
        return Some(Ok(json!(100)));
    }
    if call.is("account.move", "read") {
        return Some(Ok(json!([{ "id": 100, "name": "INV/2025/0100" }])));
    }
    None
}

#[tokio::test]
async fn create_invoice_creates_missing_customer_and_generic_product() {
    let odoo = Arc::new(ScriptedOdoo::new(|call| {
        if call.is("res.partner", "create") {
            return Some(Ok(json!(5)));
        }
        if call.is("product.template", "create") {
            return Some(Ok(json!(77)));
        }
        if call.is("product.product", "search_read")
            && call.domain_value("product_tmpl_id", "=") == Some(&json!(77))
        {
            return Some(Ok(json!([{ "id": 78 }])));
        }
        invoice_creation(call)
    }));
    let service = InvoiceService::new(odoo.clone());

    let created = service.create_invoice(&new_invoice(Some("PRO-PLAN"))).await.unwrap();

    assert!(created.success);
    assert_eq!(created.invoice_id, 100);
    assert_eq!(created.invoice_number, "INV/2025/0100");
    assert_eq!(created.message, "Invoice INV/2025/0100 created and posted");

    let partners = odoo.created("res.partner");
    assert_eq!(partners.len(), 1);
    assert_eq!(partners[0]["name"], "John.Doe");
    assert_eq!(partners[0]["email"], "john.doe@example.com");
    assert_eq!(partners[0]["customer_rank"], 1);

    let codes: Vec<JsonValue> = odoo
        .calls_to("product.product", "search_read")
        .iter()
        .filter_map(|c| c.domain_value("default_code", "=").cloned())
        .collect();
    assert_eq!(codes, vec![json!("PRO-PLAN"), json!("STRIPE-PAYMENT")]);

    let templates = odoo.created("product.template");
    assert_eq!(templates[0]["default_code"], "STRIPE-PAYMENT");
    assert_eq!(templates[0]["type"], "service");
    assert_eq!(templates[0]["invoice_policy"], "order");

    let invoice = &odoo.created("account.move")[0];
    assert_eq!(invoice["move_type"], "out_invoice");
    assert_eq!(invoice["partner_id"], 5);
    assert_eq!(invoice["ref"], "cs_test_1");
    assert_eq!(invoice["narration"], "Stripe Session: cs_test_1");
    let line = &invoice["invoice_line_ids"][0];
    assert_eq!(line[0], 0);
    assert_eq!(line[2]["product_id"], 78);
    assert_eq!(line[2]["name"], "Pro plan (monthly)");
    assert_eq!(line[2]["quantity"], 1);
    assert_eq!(line[2]["price_unit"], 49.0);

    let posted = odoo.calls_to("account.move", "action_post");
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].ids(), vec![100]);
}

#[tokio::test]
async fn create_invoice_reuses_existing_customer_and_product() {
    let odoo = Arc::new(ScriptedOdoo::new(|call| {
        if call.is("res.partner", "search") {
            return Some(Ok(json!([5])));
        }
        if call.is("product.product", "search_read")
            && call.domain_value("default_code", "=") == Some(&json!("PRO-PLAN"))
        {
            return Some(Ok(json!([{ "id": 12 }])));
        }
        invoice_creation(call)
    }));
    let service = InvoiceService::new(odoo.clone());

    service.create_invoice(&new_invoice(Some("PRO-PLAN"))).await.unwrap();

    assert!(odoo.created("res.partner").is_empty());
    assert!(odoo.created("product.template").is_empty());
    assert_eq!(odoo.created("account.move")[0]["invoice_line_ids"][0][2]["product_id"], 12);
}

fn invoice_record(state: &str, payment_state: &str) -> JsonValue {
    json!([{
        "id": 100,
        "name": "INV/2025/0100",
        "amount_residual": 49.0,
        "state": state,
        "payment_state": payment_state,
        "currency_id": [2, "USD"],
        "partner_id": [5, "John.Doe"]
    }])
}

fn payable_odoo(state: &'static str, payment_state: &'static str) -> Arc<ScriptedOdoo> {
    Arc::new(ScriptedOdoo::new(move |call| {
        if call.is("account.move", "search_read")
            && call.domain_value("ref", "=") == Some(&json!("cs_test_1"))
        {
            return Some(Ok(json!([{ "id": 100, "amount_residual": 49.0 }])));
        }
        if call.is("account.move", "read") {
            return Some(Ok(invoice_record(state, payment_state)));
        }
        payment_flow(call)
    }))
}

fn notice(amount: Option<f64>) -> PaymentNotice {
    PaymentNotice {
        invoice_id: None,
        stripe_session_id: Some("cs_test_1".to_string()),
        payment_id: "pi_123".to_string(),
        amount,
    }
}

#[tokio::test]
async fn mark_paid_by_session_registers_residual_payment() {
    let odoo = payable_odoo("posted", "not_paid");
    let service = InvoiceService::new(odoo.clone());

    let paid = service.mark_invoice_paid(&notice(None)).await.unwrap();

    assert!(paid.success);
    assert_eq!(paid.invoice_id, 100);
    assert_eq!(paid.payment_id, PAYMENT_ID);
    assert_eq!(paid.message, "Payment registered for invoice INV/2025/0100");

    let payment = &odoo.created("account.payment")[0];
    assert_eq!(payment["payment_type"], "inbound");
    assert_eq!(payment["partner_type"], "customer");
    assert_eq!(payment["ref"], "pi_123");
    assert_eq!(payment["amount"], 49.0);
    assert_eq!(payment["journal_id"], common::BANK_JOURNAL_ID);
    assert!(payment.get("memo").is_none());
    assert!(payment.get("date").is_none());
    assert_eq!(odoo.calls_to("account.move.line", "reconcile").len(), 1);
}

#[tokio::test]
async fn mark_paid_uses_explicit_amount() {
    let odoo = payable_odoo("posted", "partial");
    let service = InvoiceService::new(odoo.clone());

    service.mark_invoice_paid(&notice(Some(20.0))).await.unwrap();

    assert_eq!(odoo.created("account.payment")[0]["amount"], 20.0);
}

#[tokio::test]
async fn mark_paid_on_paid_invoice_is_a_no_op() {
    let odoo = payable_odoo("posted", "paid");
    let service = InvoiceService::new(odoo.clone());

    let paid = service.mark_invoice_paid(&notice(None)).await.unwrap();

    assert!(paid.success);
    assert_eq!(paid.payment_id, 0);
    assert_eq!(paid.message, "Invoice INV/2025/0100 is already paid");
    assert!(odoo.created("account.payment").is_empty());
}

#[tokio::test]
async fn mark_paid_rejects_draft_invoice() {
    let service = InvoiceService::new(payable_odoo("draft", "not_paid"));

    let err = service.mark_invoice_paid(&notice(None)).await.unwrap_err();

    assert!(matches!(err, ServiceError::BadRequest(_)));
    assert_eq!(err.to_string(), "Invoice is not posted (state: draft)");
}

#[tokio::test]
async fn mark_paid_without_matching_invoice_is_not_found() {
    let service = InvoiceService::new(Arc::new(ScriptedOdoo::empty()));

    let err = service.mark_invoice_paid(&notice(None)).await.unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(err.to_string(), "Invoice not found");
}

fn lookup_odoo(partner_email: JsonValue) -> Arc<ScriptedOdoo> {
    Arc::new(ScriptedOdoo::new(move |call| {
        let by_id = call.domain_value("id", "=") == Some(&json!(100));
        let by_ref = call.domain_value("ref", "=") == Some(&json!("cs_test_1"));
        if call.is("account.move", "search_read") && (by_id || by_ref) {
            return Some(Ok(json!([{
                "id": 100,
                "name": "INV/2025/0100",
                "partner_id": [5, "John.Doe"],
                "amount_total": 49.0,
                "amount_residual": 0.0,
                "state": "posted",
                "payment_state": "paid",
                "invoice_date": "2025-03-01",
                "ref": "cs_test_1"
            }])));
        }
        if call.is("res.partner", "read") {
            return Some(Ok(json!([{ "id": 5, "email": partner_email.clone() }])));
        }
        None
    }))
}

#[tokio::test]
async fn get_invoice_returns_view_with_partner_email() {
    let service = InvoiceService::new(lookup_odoo(json!("john.doe@example.com")));

    let view = service.get_invoice(100).await.unwrap();

    assert_eq!(view.id, 100);
    assert_eq!(view.name, "INV/2025/0100");
    assert_eq!(view.partner_name, "John.Doe");
    assert_eq!(view.partner_email, "john.doe@example.com");
    assert_eq!(view.amount_total, 49.0);
    assert_eq!(view.amount_residual, 0.0);
    assert_eq!(view.payment_state, "paid");
    assert_eq!(view.invoice_date.as_deref(), Some("2025-03-01"));
    assert_eq!(view.stripe_session_id.as_deref(), Some("cs_test_1"));
}

#[tokio::test]
async fn get_invoice_by_stripe_handles_partner_without_email() {
    let odoo = lookup_odoo(json!(false));
    let service = InvoiceService::new(odoo.clone());

    let view = service.get_invoice_by_stripe("cs_test_1").await.unwrap();

    assert_eq!(view.id, 100);
    assert_eq!(view.partner_email, "");
    let search = &odoo.calls_to("account.move", "search_read")[0];
    assert_eq!(search.domain_value("move_type", "="), Some(&json!("out_invoice")));
    assert_eq!(search.kwargs["limit"], 1);
}

#[tokio::test]
async fn missing_invoice_is_not_found() {
    let service = InvoiceService::new(lookup_odoo(json!(false)));

    let err = service.get_invoice(404).await.unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}
