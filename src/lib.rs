//! KytaPay webhook service
//!
//! Receives payment-provider callbacks, authenticates them, reconciles them
//! against the merchant ledger exactly once and forwards the result to the
//! merchant.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod notify;
pub mod payments;
