//! LinkQu callback schema
//!
//! ```json
//! {"partner_reff":"GR-1","status":"SUCCESS","amount":100000,
//!  "transaction_time":"2024-05-01 10:00:00","type":"payment"}
//! ```

use super::{decimal_from_json, required, ProviderFields};
use crate::error::WebhookError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LinkQuCallback {
    pub partner_reff: Option<String>,
    pub status: Option<String>,
    pub amount: Option<serde_json::Value>,
    pub transaction_time: Option<String>,
    #[serde(rename = "type")]
    pub callback_type: Option<String>,
}

impl LinkQuCallback {
    pub fn into_fields(self) -> Result<ProviderFields, WebhookError> {
        let reference = required("partner_reff", self.partner_reff)?;
        let raw_status = required("status", self.status)?;
        let amount = match self.amount {
            Some(serde_json::Value::Null) | None => return Err(WebhookError::MissingField("amount")),
            Some(value) => decimal_from_json("amount", &value)?,
        };

        Ok(ProviderFields {
            reference,
            raw_status,
            amount,
            callback_type: self.callback_type,
            timestamp: self.transaction_time,
        })
    }
}

pub fn parse(body: &[u8]) -> Result<ProviderFields, WebhookError> {
    let callback: LinkQuCallback = serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            WebhookError::invalid("body", e.to_string())
        } else {
            WebhookError::MalformedBody(e)
        }
    })?;
    callback.into_fields()
}
