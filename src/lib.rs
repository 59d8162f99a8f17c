pub mod app;
pub mod domain;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{InvoiceService, SyncScheduler, SyncService, SyncSettings};
pub use infra::config::AppConfig;
pub use infra::mercury::{MercuryApi, MercuryClient};
pub use infra::odoo::{OdooClient, OdooExecutor};
pub use infra::slack::SlackNotifier;
pub use storage::SyncStore;
