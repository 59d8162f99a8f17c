use crate::infra::mercury::MercuryApiError;
use crate::infra::odoo::OdooError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// A required integration is not configured.
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Odoo(#[from] OdooError),

    #[error(transparent)]
    Mercury(#[from] MercuryApiError),

    #[error("Sync state database error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
