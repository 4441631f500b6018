use crate::database::error::DatabaseError;
use crate::payments::types::{
    AttemptRecord, CallbackAttempt, CommitOutcome, FeeRate, Flow, LedgerEntry, Merchant,
    SettlementPlan, SettlementRecord, TransactionIntent, User, Wallet,
};
use async_trait::async_trait;

/// Records read and written while reconciling a provider callback
///
/// Lookups return `Ok(None)` when the record does not exist so callers can tell
/// "not found" apart from a failing store.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Find the transaction intent issued for a grant reference
    async fn find_intent(&self, grant_id: &str) -> Result<Option<TransactionIntent>, DatabaseError>;

    /// Find the merchant payment (or payout) matching a gateway reference
    async fn find_ledger_entry(
        &self,
        flow: Flow,
        gateway_reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError>;

    /// Find the secondary settlement record for a grant reference
    async fn find_settlement_record(
        &self,
        grant_id: &str,
    ) -> Result<Option<SettlementRecord>, DatabaseError>;

    async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError>;

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError>;

    async fn find_wallet(&self, user_id: i64) -> Result<Option<Wallet>, DatabaseError>;

    /// Apply every write of a reconciliation atomically
    ///
    /// Implementations must move the ledger entry out of `Pending` with a
    /// conditional write and abandon the whole unit when the entry was already
    /// settled, so concurrent deliveries of one reference settle it once.
    async fn commit_settlement(&self, plan: &SettlementPlan) -> Result<CommitOutcome, DatabaseError>;
}

/// Fee schedule lookups
#[async_trait]
pub trait FeeScheduleStore: Send + Sync {
    /// Regular fee keyed by transaction category and payment method
    async fn regular_fee(
        &self,
        category: i64,
        payment_method_id: i64,
    ) -> Result<Option<FeeRate>, DatabaseError>;

    /// Express fee keyed by transaction category alone
    async fn express_fee(&self, category: i64) -> Result<Option<FeeRate>, DatabaseError>;
}

/// Storage for the single merchant callback attempt row of each intent
#[async_trait]
pub trait CallbackAttemptStore: Send + Sync {
    async fn find_attempt(
        &self,
        transaction_info_id: i64,
    ) -> Result<Option<CallbackAttempt>, DatabaseError>;

    /// Overwrite the attempt row with the latest delivery outcome
    async fn record_attempt(
        &self,
        transaction_info_id: i64,
        record: &AttemptRecord,
    ) -> Result<(), DatabaseError>;
}
