use crate::database::callback_repository::CallbackRepository;
use crate::database::error::DatabaseError;
use crate::database::fee_repository::FeeRepository;
use crate::database::merchant_repository::MerchantRepository;
use crate::database::repository::{CallbackAttemptStore, FeeScheduleStore, ReconciliationStore};
use crate::database::transaction::DatabaseTransaction;
use crate::database::transaction_repository::TransactionRepository;
use crate::database::user_repository::UserRepository;
use crate::database::wallet_repository::WalletRepository;
use crate::payments::types::{
    AttemptRecord, CallbackAttempt, CommitOutcome, FeeRate, Flow, LedgerEntry, Merchant,
    SettlementPlan, SettlementRecord, SettlementWrite, TransactionIntent, User, Wallet,
};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

/// Postgres-backed implementation of every store the engine depends on
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    transactions: TransactionRepository,
    merchants: MerchantRepository,
    users: UserRepository,
    wallets: WalletRepository,
    fees: FeeRepository,
    callbacks: CallbackRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            transactions: TransactionRepository::new(pool.clone()),
            merchants: MerchantRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            wallets: WalletRepository::new(pool.clone()),
            fees: FeeRepository::new(pool.clone()),
            callbacks: CallbackRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    async fn find_intent(&self, grant_id: &str) -> Result<Option<TransactionIntent>, DatabaseError> {
        self.transactions.find_intent(grant_id).await
    }

    async fn find_ledger_entry(
        &self,
        flow: Flow,
        gateway_reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        self.merchants.find_ledger_entry(flow, gateway_reference).await
    }

    async fn find_settlement_record(
        &self,
        grant_id: &str,
    ) -> Result<Option<SettlementRecord>, DatabaseError> {
        self.transactions.find_settlement_record(grant_id).await
    }

    async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError> {
        self.merchants.find_merchant(merchant_id).await
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        self.users.find_by_id(user_id).await
    }

    async fn find_wallet(&self, user_id: i64) -> Result<Option<Wallet>, DatabaseError> {
        self.wallets.find_by_user_id(user_id).await
    }

    async fn commit_settlement(&self, plan: &SettlementPlan) -> Result<CommitOutcome, DatabaseError> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;

        let claimed = MerchantRepository::claim_pending(
            tx.conn()?,
            plan.flow,
            &plan.reference,
            plan.ledger_status.as_str(),
            plan.amount,
        )
        .await?;

        if !claimed {
            let current_status =
                MerchantRepository::current_status(tx.conn()?, plan.flow, &plan.reference)
                    .await?
                    .unwrap_or_default();
            tx.rollback().await?;
            debug!(reference = %plan.reference, %current_status, "Ledger entry already settled");
            return Ok(CommitOutcome::AlreadyProcessed { current_status });
        }

        TransactionRepository::update_intent_status(
            tx.conn()?,
            &plan.reference,
            &plan.intent_status,
            plan.amount,
        )
        .await?;

        match &plan.settlement {
            SettlementWrite::Update {
                payment_status,
                status,
            } => {
                TransactionRepository::update_settlement_status(
                    tx.conn()?,
                    &plan.reference,
                    payment_status,
                    status,
                )
                .await?;
            }
            SettlementWrite::Create(record) => {
                TransactionRepository::upsert_settlement_record(tx.conn()?, record).await?;
            }
        }

        let wallet_balance = match plan.wallet {
            Some(mutation) => Some(
                WalletRepository::apply_delta(tx.conn()?, mutation.user_id, mutation.delta).await?,
            ),
            None => None,
        };

        tx.commit().await?;

        info!(
            reference = %plan.reference,
            flow = %plan.flow,
            status = %plan.ledger_status,
            "Settlement committed"
        );
        Ok(CommitOutcome::Applied { wallet_balance })
    }
}

#[async_trait]
impl FeeScheduleStore for PgStore {
    async fn regular_fee(
        &self,
        category: i64,
        payment_method_id: i64,
    ) -> Result<Option<FeeRate>, DatabaseError> {
        self.fees.find_regular(category, payment_method_id).await
    }

    async fn express_fee(&self, category: i64) -> Result<Option<FeeRate>, DatabaseError> {
        self.fees.find_express(category).await
    }
}

#[async_trait]
impl CallbackAttemptStore for PgStore {
    async fn find_attempt(
        &self,
        transaction_info_id: i64,
    ) -> Result<Option<CallbackAttempt>, DatabaseError> {
        self.callbacks
            .find_by_transaction_info_id(transaction_info_id)
            .await
    }

    async fn record_attempt(
        &self,
        transaction_info_id: i64,
        record: &AttemptRecord,
    ) -> Result<(), DatabaseError> {
        self.callbacks.update(transaction_info_id, record).await
    }
}
