//! Webhook authentication and reconciliation
//!
//! Inbound provider callbacks are authenticated ([`signature`]), parsed into a
//! provider-neutral [`types::CallbackEvent`] ([`providers`]), and reconciled
//! against the merchant ledger ([`reconcile`]), which normalizes statuses
//! ([`status`]), applies fees ([`fees`]) and notifies the merchant ([`callback`]).

pub mod callback;
pub mod fees;
pub mod providers;
pub mod reconcile;
pub mod signature;
pub mod status;
pub mod types;

pub use callback::{CallbackDispatcher, DispatchOutcome};
pub use fees::FeeCalculator;
pub use reconcile::{ReconcileOutcome, Reconciler, SettlementPolicy};
pub use signature::SignatureVerifier;
