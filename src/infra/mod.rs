pub mod config;
pub mod logging;
pub mod mercury;
pub mod odoo;
pub mod slack;
