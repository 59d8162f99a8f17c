//! Application services built on the Odoo and Mercury clients and the sync store.

pub mod error;
pub mod invoice_service;
pub mod payments;
pub mod reconciliation;
pub mod scheduler;
pub mod sync;

pub use error::{ServiceError, ServiceResult};
pub use invoice_service::InvoiceService;
pub use reconciliation::InvoiceMatcher;
pub use scheduler::SyncScheduler;
pub use sync::{SyncService, SyncSettings};
