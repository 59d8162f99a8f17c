use crate::app::error::ServiceError;
use crate::transport::http::types::{ApiResponse, AppState, MercuryState};
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::Json;
use std::fmt::Display;

pub type ApiError = (StatusCode, Json<ApiResponse>);

pub const MERCURY_NOT_CONFIGURED: &str =
    "Mercury API token is required. Set MERCURY_API_TOKEN environment variable.";

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

pub fn service_error(err: ServiceError) -> ApiError {
    let status = match &err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }
    error_response(status, err.to_string())
}

pub fn query_422(err: QueryRejection) -> ApiError {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        format!("Invalid query parameters: {}", err),
    )
}

pub fn path_422(err: PathRejection) -> ApiError {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        format!("Invalid path parameter: {}", err),
    )
}

/// `value` (or `default` when absent), rejected with 422 when outside `min..=max`.
pub fn bounded<T>(name: &str, value: Option<T>, default: T, min: T, max: T) -> Result<T, ApiError>
where
    T: PartialOrd + Display + Copy,
{
    let v = value.unwrap_or(default);
    // Also rejects NaN.
    if !(min..=max).contains(&v) {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("{} must be between {} and {} (got {})", name, min, max, v),
        ));
    }
    Ok(v)
}

pub fn require_mercury(state: &AppState) -> Result<&MercuryState, ApiError> {
    state
        .mercury
        .as_ref()
        .ok_or_else(|| error_response(StatusCode::INTERNAL_SERVER_ERROR, MERCURY_NOT_CONFIGURED))
}
