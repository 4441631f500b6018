//! Provider status normalization
//!
//! Providers report outcomes with their own vocabularies (`PAID`, `CAPTURED`,
//! `00`, `VOIDED`, ...). Each raw token is classified once and then projected
//! into the two canonical domains used by the gateway: the internal lowercase
//! status stored on transaction intents and the capitalized status merchants see.

use serde::Serialize;
use std::fmt;

const SUCCESS_TOKENS: [&str; 6] = ["SUCCEEDED", "PAID", "CAPTURED", "SUCCESS", "COMPLETED", "00"];
const TERMINAL_FAILURE_TOKENS: [&str; 4] = ["EXPIRED", "CANCELLED", "VOIDED", "FAILED"];
const IN_PROGRESS_TOKENS: [&str; 3] = ["PENDING", "IN_PROGRESS", "OPEN"];

/// Classification of a raw provider status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    TerminalFailure,
    InProgress,
}

impl StatusClass {
    /// Classify a raw token, case-insensitively.
    ///
    /// Unrecognized tokens are classified as `Success`; use
    /// [`StatusClass::recognize`] to tell them apart.
    pub fn classify(raw: &str) -> Self {
        Self::recognize(raw).unwrap_or(StatusClass::Success)
    }

    /// Classify a raw token, returning `None` for unknown vocabulary
    pub fn recognize(raw: &str) -> Option<Self> {
        let token = raw.trim().to_ascii_uppercase();
        let token = token.as_str();

        if SUCCESS_TOKENS.contains(&token) {
            Some(StatusClass::Success)
        } else if TERMINAL_FAILURE_TOKENS.contains(&token) {
            Some(StatusClass::TerminalFailure)
        } else if IN_PROGRESS_TOKENS.contains(&token) {
            Some(StatusClass::InProgress)
        } else {
            None
        }
    }
}

/// Status stored on the transaction intent (`success` / `expires` / `pending`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InternalStatus {
    Success,
    Expires,
    Pending,
}

impl InternalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InternalStatus::Success => "success",
            InternalStatus::Expires => "expires",
            InternalStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for InternalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported to merchants (`Success` / `Blocked` / `Pending`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MerchantStatus {
    Success,
    Blocked,
    Pending,
}

impl MerchantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantStatus::Success => "Success",
            MerchantStatus::Blocked => "Blocked",
            MerchantStatus::Pending => "Pending",
        }
    }
}

impl fmt::Display for MerchantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Both canonical projections of one raw provider status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedStatus {
    pub class: StatusClass,
    pub internal: InternalStatus,
    pub merchant: MerchantStatus,
}

impl NormalizedStatus {
    pub fn is_success(&self) -> bool {
        self.class == StatusClass::Success
    }
}

/// Normalize a raw provider status into both canonical vocabularies
pub fn normalize(raw: &str) -> NormalizedStatus {
    let class = StatusClass::classify(raw);
    let (internal, merchant) = match class {
        StatusClass::Success => (InternalStatus::Success, MerchantStatus::Success),
        StatusClass::TerminalFailure => (InternalStatus::Expires, MerchantStatus::Blocked),
        StatusClass::InProgress => (InternalStatus::Pending, MerchantStatus::Pending),
    };

    NormalizedStatus {
        class,
        internal,
        merchant,
    }
}
