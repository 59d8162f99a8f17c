use crate::app::invoice_service::{
    InvoiceCreated, InvoiceView, NewInvoice, PaymentNotice, PaymentRegistered,
};
use crate::domain::matching::is_valid_email;
use crate::transport::http::handlers::common::{error_response, path_422, service_error, ApiError};
use crate::transport::http::types::{
    json_422, ApiResponse, AppState, CreateInvoiceRequest, MarkPaidRequest,
};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    post,
    path = "/api/create_invoice",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice created and posted", body = InvoiceCreated),
        (status = 422, description = "Invalid JSON body or email", body = ApiResponse),
        (status = 500, description = "Odoo error", body = ApiResponse)
    )
)]
pub async fn create_invoice_handler(
    State(state): State<AppState>,
    request: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<Json<InvoiceCreated>, ApiError> {
    let Json(request) = request.map_err(|e| {
        json_422(
            e,
            "{\"customer_email\": \"...\", \"amount\": 0.0, \"stripe_session_id\": \"...\"}",
        )
    })?;

    if !is_valid_email(&request.customer_email) {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Invalid email address: {}", request.customer_email),
        ));
    }

    let input = NewInvoice {
        customer_email: request.customer_email,
        amount: request.amount,
        stripe_session_id: request.stripe_session_id,
        description: request
            .description
            .unwrap_or_else(|| "Stripe Payment".to_string()),
        product_code: request.product_code,
    };

    state
        .invoices
        .create_invoice(&input)
        .await
        .map(Json)
        .map_err(service_error)
}

#[utoipa::path(
    post,
    path = "/api/mark_invoice_paid",
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Payment registered (or invoice already paid)", body = PaymentRegistered),
        (status = 400, description = "Invoice is not posted", body = ApiResponse),
        (status = 404, description = "Invoice not found", body = ApiResponse),
        (status = 422, description = "Invalid JSON body", body = ApiResponse),
        (status = 500, description = "Odoo error", body = ApiResponse)
    )
)]
pub async fn mark_invoice_paid_handler(
    State(state): State<AppState>,
    request: Result<Json<MarkPaidRequest>, JsonRejection>,
) -> Result<Json<PaymentRegistered>, ApiError> {
    let Json(request) =
        request.map_err(|e| json_422(e, "{\"payment_id\": \"...\", \"invoice_id\": 1}"))?;

    let notice = PaymentNotice {
        invoice_id: request.invoice_id,
        stripe_session_id: request.stripe_session_id,
        payment_id: request.payment_id,
        amount: request.amount,
    };

    state
        .invoices
        .mark_invoice_paid(&notice)
        .await
        .map(Json)
        .map_err(service_error)
}

#[utoipa::path(
    get,
    path = "/api/invoices/{invoice_id}",
    params(
        ("invoice_id" = i64, Path, description = "Odoo invoice (account.move) id")
    ),
    responses(
        (status = 200, description = "Invoice", body = InvoiceView),
        (status = 404, description = "Invoice not found", body = ApiResponse),
        (status = 422, description = "Invoice id is not an integer", body = ApiResponse),
        (status = 500, description = "Odoo error", body = ApiResponse)
    )
)]
pub async fn get_invoice_handler(
    State(state): State<AppState>,
    invoice_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<InvoiceView>, ApiError> {
    let Path(invoice_id) = invoice_id.map_err(path_422)?;
    state
        .invoices
        .get_invoice(invoice_id)
        .await
        .map(Json)
        .map_err(service_error)
}

#[utoipa::path(
    get,
    path = "/api/invoices/by-stripe/{stripe_session_id}",
    params(
        ("stripe_session_id" = String, Path, description = "Stripe checkout session id stored in the invoice reference")
    ),
    responses(
        (status = 200, description = "Invoice", body = InvoiceView),
        (status = 404, description = "Invoice not found", body = ApiResponse),
        (status = 500, description = "Odoo error", body = ApiResponse)
    )
)]
pub async fn get_invoice_by_stripe_handler(
    State(state): State<AppState>,
    Path(stripe_session_id): Path<String>,
) -> Result<Json<InvoiceView>, ApiError> {
    state
        .invoices
        .get_invoice_by_stripe(&stripe_session_id)
        .await
        .map(Json)
        .map_err(service_error)
}
