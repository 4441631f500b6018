//! Merchant callback dispatch
//!
//! After a reconciliation the merchant is told about the new state of its
//! transaction with a provider-neutral payload. Delivery is a single POST with a
//! bounded timeout and no retry; the outcome overwrites the one
//! `callback_status` row kept per transaction intent.

use crate::database::error::DatabaseError;
use crate::database::repository::CallbackAttemptStore;
use crate::payments::status::MerchantStatus;
use crate::payments::types::{AttemptRecord, AttemptStatus, Flow, TransactionIntent};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PAYMENT_CALLBACK_CODE: &str = "2001200";
pub const PAYOUT_CALLBACK_CODE: &str = "2001400";
pub const CALLBACK_TOKEN_HEADER: &str = "X-CALLBACK-TOKEN";
/// Error label recorded when a delivery fails without a usable error message
pub const REQUEST_TIMEOUT_LABEL: &str = "408 - Request Timeout";

/// Payload template, selected by the intent's payment-method category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Qris,
    VirtualAccount,
    EWallet,
    Payout,
}

impl PayloadKind {
    /// Payouts always use the payout template; payments are keyed by the
    /// intent's `payment_method` (`QRIS`, `VA`, `EWALLET`)
    pub fn for_intent(flow: Flow, payment_method: &str) -> Option<Self> {
        match flow {
            Flow::Payout => Some(PayloadKind::Payout),
            Flow::Payment => match payment_method.trim().to_ascii_uppercase().as_str() {
                "QRIS" => Some(PayloadKind::Qris),
                "VA" => Some(PayloadKind::VirtualAccount),
                "EWALLET" => Some(PayloadKind::EWallet),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackPayload {
    pub callback_code: &'static str,
    pub callback_message: &'static str,
    pub callback_data: CallbackData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackData {
    /// Gateway grant reference
    pub id: String,
    /// Merchant order reference
    pub reference_id: String,
    pub amount: i64,
    pub status: MerchantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_data: Option<PaymentData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_data: Option<PayoutData>,
    pub merchant_url: MerchantUrls,
    pub callback_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PaymentData {
    Qr {
        qr_string: Option<String>,
    },
    VirtualAccount {
        bank_code: Option<String>,
        account_number: Option<String>,
        account_name: String,
    },
    EWallet {
        channel_code: Option<String>,
        redirect_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutData {
    pub code: String,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MerchantUrls {
    Payment {
        notify_url: String,
        success_url: Option<String>,
        failed_url: Option<String>,
    },
    Payout {
        notify_url: String,
    },
}

/// Build the merchant callback payload for a settled transaction
pub fn build_payload(
    kind: PayloadKind,
    intent: &TransactionIntent,
    reference: &str,
    merchant_name: &str,
    status: MerchantStatus,
    callback_time: &str,
) -> CallbackPayload {
    // Amounts are reported as whole rupiah
    let amount = intent.amount.trunc().to_i64().unwrap_or_default();

    let payment_urls = || MerchantUrls::Payment {
        notify_url: intent.notify_url.clone(),
        success_url: intent.success_url.clone(),
        failed_url: intent.cancel_url.clone(),
    };

    let (code, message, payment_type, payment_data, payout_data, merchant_url) = match kind {
        PayloadKind::Qris => (
            PAYMENT_CALLBACK_CODE,
            "Callback Payment Status",
            Some("QR"),
            Some(PaymentData::Qr {
                qr_string: intent.qris_string.clone(),
            }),
            None,
            payment_urls(),
        ),
        PayloadKind::VirtualAccount => (
            PAYMENT_CALLBACK_CODE,
            "Callback Payment Status",
            Some("VIRTUAL_ACCOUNT"),
            Some(PaymentData::VirtualAccount {
                bank_code: intent.bank_ewallet_name.clone(),
                account_number: intent.bank_number.clone(),
                account_name: merchant_name.to_string(),
            }),
            None,
            payment_urls(),
        ),
        PayloadKind::EWallet => (
            PAYMENT_CALLBACK_CODE,
            "Callback Payment Status",
            Some("E-WALLET"),
            Some(PaymentData::EWallet {
                channel_code: intent.bank_ewallet_name.clone(),
                redirect_url: intent.ewallet_link.clone(),
            }),
            None,
            payment_urls(),
        ),
        PayloadKind::Payout => (
            PAYOUT_CALLBACK_CODE,
            "Callback Payout Status",
            None,
            None,
            Some(PayoutData {
                code: intent.payment_method.clone(),
                account_number: intent.bank_number.clone(),
                account_name: intent.bank_ewallet_name.clone(),
            }),
            MerchantUrls::Payout {
                notify_url: intent.notify_url.clone(),
            },
        ),
    };

    CallbackPayload {
        callback_code: code,
        callback_message: message,
        callback_data: CallbackData {
            id: reference.to_string(),
            reference_id: intent.order_id.clone(),
            amount,
            status,
            payment_type,
            payment_data,
            payout_data,
            merchant_url,
            callback_time: callback_time.to_string(),
        },
    }
}

/// Human-readable label for a merchant endpoint response code
pub fn status_label(status_code: u16) -> String {
    match status_code {
        200..=299 => format!("{} - Success", status_code),
        400 => "400 - Bad Request".to_string(),
        401 => "401 - Unauthorized".to_string(),
        403 => "403 - Forbidden".to_string(),
        404 => "404 - Not Found".to_string(),
        422 => "422 - Unprocessable Entity".to_string(),
        500 => "500 - Internal Server Error".to_string(),
        502 => "502 - Bad Gateway".to_string(),
        503 => "503 - Service Unavailable".to_string(),
        other => format!("HTTP {}", other),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No callback attempt row exists for the intent
    Skipped,
    Delivered {
        status_code: u16,
    },
    Failed {
        status_code: Option<u16>,
        error: String,
    },
}

#[derive(Clone)]
pub struct CallbackDispatcher {
    client: Client,
    attempts: Arc<dyn CallbackAttemptStore>,
}

impl CallbackDispatcher {
    pub fn new(
        attempts: Arc<dyn CallbackAttemptStore>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, attempts })
    }

    /// Deliver `payload` to the intent's notify URL and record the attempt
    ///
    /// Only a failure to read or write the attempt row is returned as an error;
    /// delivery failures are reported through [`DispatchOutcome::Failed`].
    pub async fn dispatch(
        &self,
        intent: &TransactionIntent,
        payload: &CallbackPayload,
    ) -> Result<DispatchOutcome, DatabaseError> {
        if self.attempts.find_attempt(intent.id).await?.is_none() {
            debug!(
                transaction_info_id = intent.id,
                "No callback attempt row, skipping merchant callback"
            );
            return Ok(DispatchOutcome::Skipped);
        }

        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize merchant callback payload: {}", e);
                let record = AttemptRecord {
                    status: AttemptStatus::Failed,
                    error_message: e.to_string(),
                    response_body: String::new(),
                    payload: String::new(),
                };
                self.attempts.record_attempt(intent.id, &record).await?;
                return Ok(DispatchOutcome::Failed {
                    status_code: None,
                    error: e.to_string(),
                });
            }
        };

        let mut request = self
            .client
            .post(&intent.notify_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body.clone());

        if let Some(token) = intent.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(CALLBACK_TOKEN_HEADER, token);
        }

        let (outcome, response_body) = match request.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let response_body = response.text().await.unwrap_or_default();
                if (200..300).contains(&status_code) {
                    (DispatchOutcome::Delivered { status_code }, response_body)
                } else {
                    (
                        DispatchOutcome::Failed {
                            status_code: Some(status_code),
                            error: status_label(status_code),
                        },
                        response_body,
                    )
                }
            }
            Err(e) => {
                let message = e.to_string();
                let error = if e.is_timeout() || message.is_empty() {
                    REQUEST_TIMEOUT_LABEL.to_string()
                } else {
                    message
                };
                (
                    DispatchOutcome::Failed {
                        status_code: None,
                        error,
                    },
                    String::new(),
                )
            }
        };

        let record = match &outcome {
            DispatchOutcome::Delivered { status_code } => {
                info!(
                    transaction_info_id = intent.id,
                    status_code, "Merchant callback delivered"
                );
                AttemptRecord {
                    status: AttemptStatus::Success,
                    error_message: status_label(*status_code),
                    response_body,
                    payload: body,
                }
            }
            DispatchOutcome::Failed { error, .. } => {
                warn!(
                    transaction_info_id = intent.id,
                    notify_url = %intent.notify_url,
                    "Merchant callback failed: {}", error
                );
                AttemptRecord {
                    status: AttemptStatus::Failed,
                    error_message: error.clone(),
                    response_body,
                    payload: body,
                }
            }
            DispatchOutcome::Skipped => return Ok(outcome),
        };

        self.attempts.record_attempt(intent.id, &record).await?;
        Ok(outcome)
    }
}
