//! Payment-order reconciliation service.
//!
//! Creates collect requests with the Edviron gateway, applies its webhooks to
//! per-collect-request status rows and serves status and transaction reports.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
