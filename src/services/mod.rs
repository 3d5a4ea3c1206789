//! Business logic for payment reconciliation

pub mod reconciliation;
pub mod webhook_payload;


pub use reconciliation::{
    CreatePaymentOutcome, CreatePaymentRequest, PaymentStatusLookup, ReconciliationConfig,
    ReconciliationEngine, TransactionPage, TransactionQuery, WebhookOutcome,
};
