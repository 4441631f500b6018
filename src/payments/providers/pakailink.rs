//! PakaiLink callback schema
//!
//! Payments and payouts share one shape:
//!
//! ```json
//! {"transactionData":{"partnerReferenceNo":"GR-1","paymentFlagStatus":"00",
//!  "callbackType":"payment","paidAmount":{"value":"100000.00"}}}
//! ```
//!
//! PakaiLink reports a numeric flag instead of a status word, and the flag is
//! read differently per flow.

use super::{decimal_from_json, required, ProviderFields};
use crate::error::WebhookError;
use crate::payments::types::Flow;
use serde::Deserialize;

const PAID_FLAG: &str = "00";

#[derive(Debug, Clone, Deserialize)]
pub struct PakaiLinkCallback {
    #[serde(rename = "transactionData")]
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub partner_reference_no: Option<String>,
    pub payment_flag_status: Option<String>,
    pub callback_type: Option<String>,
    pub paid_amount: Option<PaidAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaidAmount {
    pub value: Option<serde_json::Value>,
}

/// Map the payment flag onto a status token understood by the normalizer
pub fn status_for_flag(flow: Flow, flag: &str) -> &'static str {
    let flag = flag.trim();
    match flow {
        Flow::Payment if flag == PAID_FLAG => "SUCCESS",
        Flow::Payment => "PENDING",
        Flow::Payout if flag == PAID_FLAG => "SUCCESS",
        Flow::Payout if flag.is_empty() => "PENDING",
        Flow::Payout => "FAILED",
    }
}

impl PakaiLinkCallback {
    pub fn into_fields(self, flow: Flow) -> Result<ProviderFields, WebhookError> {
        let data = self
            .transaction_data
            .ok_or(WebhookError::MissingField("transactionData"))?;
        let reference = required(
            "transactionData.partnerReferenceNo",
            data.partner_reference_no,
        )?;
        let flag = data.payment_flag_status.unwrap_or_default();

        let amount = match data.paid_amount.and_then(|paid| paid.value) {
            Some(serde_json::Value::Null) | None => {
                return Err(WebhookError::MissingField("transactionData.paidAmount.value"))
            }
            Some(value) => decimal_from_json("transactionData.paidAmount.value", &value)?,
        };

        Ok(ProviderFields {
            reference,
            raw_status: status_for_flag(flow, &flag).to_string(),
            amount,
            callback_type: data.callback_type,
            timestamp: None,
        })
    }
}

pub fn parse(flow: Flow, body: &[u8]) -> Result<ProviderFields, WebhookError> {
    let callback: PakaiLinkCallback = serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            WebhookError::invalid("body", e.to_string())
        } else {
            WebhookError::MalformedBody(e)
        }
    })?;
    callback.into_fields(flow)
}
