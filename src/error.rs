use crate::database::error::DatabaseError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while turning a raw webhook body into a callback event
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed JSON body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl WebhookError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        WebhookError::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Errors that abort reconciliation of a single callback
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("amount {amount} must be greater than zero")]
    NonPositiveAmount { amount: Decimal },

    #[error("{0} overflowed")]
    AmountOverflow(&'static str),
}
