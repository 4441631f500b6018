//! Provider request schemas
//!
//! Each provider module deserializes its own callback shape into
//! [`ProviderFields`]; [`parse_event`] then applies the provider's
//! [`ProviderProfile`] to build the provider-neutral [`CallbackEvent`].

pub mod linkqu;
pub mod pakailink;

use crate::error::WebhookError;
use crate::payments::types::{CallbackEvent, CallbackKind, Channel, Flow, Provider};
use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Asia/Jakarta civil time (UTC+07:00, no daylight saving)
const JAKARTA_OFFSET_SECS: i32 = 7 * 3600;

/// One inbound webhook endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookRoute {
    pub path: &'static str,
    pub provider: Provider,
    pub flow: Flow,
    pub channel: Channel,
}

pub const ROUTES: [WebhookRoute; 7] = [
    WebhookRoute {
        path: "/payments/linkqu/qris",
        provider: Provider::LinkQu,
        flow: Flow::Payment,
        channel: Channel::Qris,
    },
    WebhookRoute {
        path: "/payments/linkqu/ewallet",
        provider: Provider::LinkQu,
        flow: Flow::Payment,
        channel: Channel::EWallet,
    },
    WebhookRoute {
        path: "/payments/pakailink/va",
        provider: Provider::PakaiLink,
        flow: Flow::Payment,
        channel: Channel::VirtualAccount,
    },
    WebhookRoute {
        path: "/payouts/linkqu/bank",
        provider: Provider::LinkQu,
        flow: Flow::Payout,
        channel: Channel::Bank,
    },
    WebhookRoute {
        path: "/payouts/linkqu/ewallet",
        provider: Provider::LinkQu,
        flow: Flow::Payout,
        channel: Channel::EWallet,
    },
    WebhookRoute {
        path: "/payouts/pakailink/bank",
        provider: Provider::PakaiLink,
        flow: Flow::Payout,
        channel: Channel::Bank,
    },
    WebhookRoute {
        path: "/payouts/pakailink/ewallet",
        provider: Provider::PakaiLink,
        flow: Flow::Payout,
        channel: Channel::EWallet,
    },
];

impl WebhookRoute {
    /// Human-readable origin, e.g. "QRIS LinkQu" or "Bank Payout PakaiLink"
    pub fn source(&self) -> String {
        match self.flow {
            Flow::Payment => format!("{} {}", self.channel.label(), self.provider),
            Flow::Payout => format!("{} Payout {}", self.channel.label(), self.provider),
        }
    }
}

pub fn route_for(path: &str) -> Option<&'static WebhookRoute> {
    ROUTES.iter().find(|route| route.path == path)
}

/// Where the event timestamp comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// Provider supplies one in the body; receive time is used when absent
    Body,
    /// Provider sends none; receive time in Jakarta civil time is used
    ReceivedAt,
}

/// Protocol quirks of one provider, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: Provider,
    /// Reject callbacks that fail signature verification
    pub require_signature: bool,
    /// Discriminator value marking a settlement-only notice
    pub settlement_marker: &'static str,
    pub timestamp: TimestampSource,
}

impl ProviderProfile {
    pub fn linkqu() -> Self {
        Self {
            provider: Provider::LinkQu,
            require_signature: true,
            settlement_marker: "settle",
            timestamp: TimestampSource::Body,
        }
    }

    /// PakaiLink sends no signing headers today, so verification is opt-in
    pub fn pakailink(require_signature: bool) -> Self {
        Self {
            provider: Provider::PakaiLink,
            require_signature,
            settlement_marker: "settlement",
            timestamp: TimestampSource::ReceivedAt,
        }
    }

    fn is_settlement(&self, callback_type: Option<&str>) -> bool {
        callback_type
            .map(|value| value.trim().eq_ignore_ascii_case(self.settlement_marker))
            .unwrap_or(false)
    }
}

/// Fields common to every provider schema
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFields {
    pub reference: String,
    pub raw_status: String,
    pub amount: Decimal,
    pub callback_type: Option<String>,
    pub timestamp: Option<String>,
}

/// Parse a raw callback body for `route` into a canonical event
pub fn parse_event(
    route: &WebhookRoute,
    profile: &ProviderProfile,
    body: &[u8],
    received_at: DateTime<Utc>,
) -> Result<CallbackEvent, WebhookError> {
    let fields = match route.provider {
        Provider::LinkQu => linkqu::parse(body)?,
        Provider::PakaiLink => pakailink::parse(route.flow, body)?,
    };

    // Settlement notices only exist for incoming payments
    let kind = if route.flow == Flow::Payment && profile.is_settlement(fields.callback_type.as_deref())
    {
        CallbackKind::Settlement
    } else {
        CallbackKind::Transaction
    };

    let received = format_jakarta(received_at);
    let occurred_at = match profile.timestamp {
        TimestampSource::Body => fields
            .timestamp
            .filter(|ts| !ts.trim().is_empty())
            .unwrap_or(received),
        TimestampSource::ReceivedAt => received,
    };

    Ok(CallbackEvent {
        provider: route.provider,
        flow: route.flow,
        channel: route.channel,
        kind,
        reference: fields.reference,
        raw_status: fields.raw_status,
        amount: fields.amount,
        occurred_at,
    })
}

pub fn jakarta_offset() -> FixedOffset {
    FixedOffset::east_opt(JAKARTA_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// RFC 3339 timestamp in Jakarta civil time, e.g. `2024-05-01T10:00:00+07:00`
pub fn format_jakarta(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&jakarta_offset())
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Largest callback amount accepted, in rupiah
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Positive decimal amount, at most [`MAX_AMOUNT`], from a JSON number or
/// numeric string
pub(crate) fn decimal_from_json(
    field: &'static str,
    value: &serde_json::Value,
) -> Result<Decimal, WebhookError> {
    let text = match value {
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) => text.trim().to_string(),
        other => {
            return Err(WebhookError::invalid(
                field,
                format!("expected a number, got {}", other),
            ))
        }
    };

    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| WebhookError::invalid(field, format!("'{}' is not a number: {}", text, e)))?;

    if amount <= Decimal::ZERO {
        return Err(WebhookError::invalid(
            field,
            format!("amount must be greater than zero, got {}", amount),
        ));
    }
    if amount > Decimal::from(MAX_AMOUNT) {
        return Err(WebhookError::invalid(
            field,
            format!("amount {} exceeds the maximum of {}", amount, MAX_AMOUNT),
        ));
    }
    Ok(amount)
}

pub(crate) fn required(field: &'static str, value: Option<String>) -> Result<String, WebhookError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(WebhookError::MissingField(field)),
    }
}
