//! Payment gateway records and canonical callback types
//!
//! Rows read from and written to the gateway database, plus the provider-neutral
//! event every inbound webhook is parsed into.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream payment provider that sent a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    LinkQu,
    PakaiLink,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::LinkQu => "LinkQu",
            Provider::PakaiLink => "PakaiLink",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of the money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flow {
    /// Customer paid the merchant; credits the merchant wallet
    Payment,
    /// Merchant withdrew funds; debits the merchant wallet
    Payout,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Payment => f.write_str("payment"),
            Flow::Payout => f.write_str("payout"),
        }
    }
}

/// Payment medium the callback refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Qris,
    EWallet,
    VirtualAccount,
    Bank,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Qris => "QRIS",
            Channel::EWallet => "E-Wallet",
            Channel::VirtualAccount => "Virtual Account",
            Channel::Bank => "Bank",
        }
    }
}

/// Whether a callback reports a transaction outcome or only a settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Transaction,
    Settlement,
}

/// Provider-neutral callback produced by the provider schemas
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEvent {
    pub provider: Provider,
    pub flow: Flow,
    pub channel: Channel,
    pub kind: CallbackKind,
    /// Gateway-assigned grant reference
    pub reference: String,
    /// Raw provider status token, before normalization
    pub raw_status: String,
    pub amount: Decimal,
    /// Provider timestamp, or the synthesized receive time
    pub occurred_at: String,
}

impl CallbackEvent {
    /// Human-readable origin, e.g. "QRIS LinkQu" or "Bank Payout PakaiLink"
    pub fn source(&self) -> String {
        match self.flow {
            Flow::Payment => format!("{} {}", self.channel.label(), self.provider),
            Flow::Payout => format!("{} Payout {}", self.channel.label(), self.provider),
        }
    }
}

/// Payment or payout initiated upstream (`app_transactions_infos`)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct TransactionIntent {
    pub id: i64,
    pub app_id: i64,
    pub order_id: String,
    /// Payment-method category: `QRIS`, `VA`, `EWALLET` or a payout bank code
    pub payment_method: String,
    pub amount: Decimal,
    pub currency: String,
    pub notify_url: String,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub grant_id: String,
    pub token: Option<String>,
    pub bank_number: Option<String>,
    pub bank_ewallet_name: Option<String>,
    pub qris_string: Option<String>,
    pub ewallet_link: Option<String>,
    pub status: String,
}

/// Merchant-facing settlement status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStatus {
    Pending,
    Success,
    Blocked,
    #[serde(rename = "Pending_Settlement")]
    PendingSettlement,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "Pending",
            LedgerStatus::Success => "Success",
            LedgerStatus::Blocked => "Blocked",
            LedgerStatus::PendingSettlement => "Pending_Settlement",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merchant payment or payout row (`merchant_payments` / `merchant_payouts`)
///
/// `status` is the idempotency guard: only a `Pending` entry may be settled.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct LedgerEntry {
    pub id: i64,
    pub merchant_id: Option<i64>,
    pub payment_method_id: Option<i64>,
    pub gateway_reference: String,
    pub order_no: Option<String>,
    pub amount: Decimal,
    pub total: Decimal,
    pub status: String,
}

impl LedgerEntry {
    pub fn is_pending(&self) -> bool {
        self.status == LedgerStatus::Pending.as_str()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Merchant {
    pub id: i64,
    pub user_id: i64,
    pub business_name: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub balance: Decimal,
}

/// Provider-independent ledger row (`transactions`)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct SettlementRecord {
    pub id: i64,
    pub user_id: Option<i64>,
    pub payment_method_id: Option<i64>,
    pub merchant_id: Option<i64>,
    pub uuid: Option<String>,
    pub grant_id: String,
    pub transaction_type_id: Option<i64>,
    pub subtotal: Decimal,
    pub percentage: Decimal,
    pub charge_percentage: Decimal,
    pub charge_fixed: Decimal,
    pub total: Decimal,
    pub payment_status: Option<String>,
    pub status: String,
}

/// Settlement record created by the engine when none was pre-created upstream
#[derive(Debug, Clone, PartialEq)]
pub struct NewSettlementRecord {
    pub user_id: i64,
    pub currency_id: i64,
    pub payment_method_id: Option<i64>,
    pub merchant_id: Option<i64>,
    pub uuid: String,
    pub grant_id: String,
    pub transaction_reference_id: i64,
    pub transaction_type_id: i64,
    pub user_type: String,
    pub subtotal: Decimal,
    pub percentage: Decimal,
    pub charge_percentage: Decimal,
    pub charge_fixed: Decimal,
    pub total: Decimal,
    pub payment_status: String,
    pub status: String,
}

/// Percentage + fixed fee pair from the fee schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct FeeRate {
    pub percentage: Decimal,
    pub fixed: Decimal,
}

/// Last merchant callback delivery for a transaction (`callback_status`)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct CallbackAttempt {
    pub id: i64,
    pub transaction_info_id: i64,
    pub notify_url: String,
    pub status: String,
    pub error_message: Option<String>,
    pub response_body: Option<String>,
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "Success",
            AttemptStatus::Failed => "Failed",
        }
    }
}

/// Outcome written over the single callback attempt row
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub status: AttemptStatus,
    pub error_message: String,
    pub response_body: String,
    pub payload: String,
}

/// How the secondary settlement record is written during a commit
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementWrite {
    /// A record already existed; overwrite its status fields
    Update {
        payment_status: String,
        status: String,
    },
    Create(NewSettlementRecord),
}

/// Relative balance change applied to a user's wallet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletMutation {
    pub user_id: i64,
    /// Positive credits, negative debits
    pub delta: Decimal,
}

/// Every write of one reconciliation, applied as a single atomic unit
///
/// The unit starts by moving the ledger entry out of `Pending`; if the entry
/// is no longer pending nothing else is written.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    pub flow: Flow,
    pub reference: String,
    /// Internal lowercase status stored on the intent
    pub intent_status: String,
    pub amount: Decimal,
    pub ledger_status: LedgerStatus,
    pub settlement: SettlementWrite,
    pub wallet: Option<WalletMutation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Applied {
        /// Balance after the mutation, when the wallet was touched
        wallet_balance: Option<Decimal>,
    },
    /// Another delivery settled the entry first
    AlreadyProcessed { current_status: String },
}
