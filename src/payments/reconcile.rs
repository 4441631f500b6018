//! Reconciliation engine
//!
//! Applies a provider callback to the merchant ledger exactly once. Lookups and
//! fee calculation happen first; every write is then handed to the store as one
//! [`SettlementPlan`], which the store applies atomically behind a conditional
//! `Pending` check. A duplicate delivery, whether sequential or racing, finds the
//! ledger entry already settled and changes nothing.
//!
//! The engine never fails the HTTP request. Each branch reports to the
//! [`Notifier`] and returns a [`ReconcileOutcome`] describing what happened.

use crate::database::repository::ReconciliationStore;
use crate::error::ReconcileError;
use crate::notify::{Notification, Notifier, Severity};
use crate::payments::callback::{build_payload, CallbackDispatcher, DispatchOutcome, PayloadKind};
use crate::payments::fees::{FeeCalculator, FeeTier, PAYMENT_CATEGORY};
use crate::payments::providers::format_jakarta;
use crate::payments::status::{normalize, MerchantStatus, NormalizedStatus};
use crate::payments::types::{
    CallbackEvent, CallbackKind, CommitOutcome, Flow, LedgerStatus, NewSettlementRecord,
    SettlementPlan, SettlementWrite, TransactionIntent, WalletMutation,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Payment methods whose funds are final as soon as the payment succeeds
pub const REALTIME_METHOD_IDS: [i64; 4] = [2, 4, 6, 8];
/// Payment methods that wait for a settlement notice before funds are final
pub const DEFERRED_METHOD_IDS: [i64; 11] = [1, 2, 4, 6, 8, 11, 12, 13, 14, 15, 19];

const SETTLEMENT_CURRENCY_ID: i64 = 1;
const SETTLEMENT_REFERENCE_ID: i64 = 1;
const SETTLEMENT_USER_TYPE: &str = "registered";

/// Decides the final status of a successful payment and whether it credits
/// the wallet immediately
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPolicy {
    realtime_methods: BTreeSet<i64>,
    deferred_methods: BTreeSet<i64>,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self::new(REALTIME_METHOD_IDS, DEFERRED_METHOD_IDS)
    }
}

impl SettlementPolicy {
    pub fn new(
        realtime_methods: impl IntoIterator<Item = i64>,
        deferred_methods: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            realtime_methods: realtime_methods.into_iter().collect(),
            deferred_methods: deferred_methods.into_iter().collect(),
        }
    }

    pub fn is_realtime(&self, payment_method_id: Option<i64>) -> bool {
        payment_method_id.is_some_and(|id| self.realtime_methods.contains(&id))
    }

    pub fn requires_deferral(&self, payment_method_id: Option<i64>) -> bool {
        payment_method_id.is_some_and(|id| self.deferred_methods.contains(&id))
    }

    /// Final ledger status of a payment
    pub fn payment_status(
        &self,
        status: &NormalizedStatus,
        payment_method_id: Option<i64>,
    ) -> LedgerStatus {
        if status.is_success()
            && !self.is_realtime(payment_method_id)
            && self.requires_deferral(payment_method_id)
        {
            return LedgerStatus::PendingSettlement;
        }
        ledger_status_for(status.merchant)
    }

    /// Only a final, non-realtime success moves money into the wallet now;
    /// deferred payments are credited by the settlement process
    pub fn credits_wallet(&self, status: LedgerStatus, payment_method_id: Option<i64>) -> bool {
        status == LedgerStatus::Success && !self.is_realtime(payment_method_id)
    }
}

pub fn ledger_status_for(status: MerchantStatus) -> LedgerStatus {
    match status {
        MerchantStatus::Success => LedgerStatus::Success,
        MerchantStatus::Blocked => LedgerStatus::Blocked,
        MerchantStatus::Pending => LedgerStatus::Pending,
    }
}

/// Branch taken for one callback
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied {
        status: LedgerStatus,
        /// Signed wallet change; positive for credits
        wallet_delta: Option<Decimal>,
        wallet_balance: Option<Decimal>,
        dispatch: Option<DispatchOutcome>,
    },
    /// The ledger entry had already left `Pending`
    Duplicate { current_status: String },
    NotFound { entity: &'static str },
    SettlementNotice,
    Failed { message: String },
}

pub struct Reconciler {
    store: Arc<dyn ReconciliationStore>,
    fees: FeeCalculator,
    dispatcher: CallbackDispatcher,
    notifier: Arc<dyn Notifier>,
    policy: SettlementPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        fees: FeeCalculator,
        dispatcher: CallbackDispatcher,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            fees,
            dispatcher,
            notifier,
            policy: SettlementPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SettlementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn handle(&self, event: &CallbackEvent) -> ReconcileOutcome {
        match event.kind {
            CallbackKind::Settlement => {
                self.settlement_notice(event).await;
                ReconcileOutcome::SettlementNotice
            }
            CallbackKind::Transaction => match self.reconcile(event).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        reference = %event.reference,
                        provider = %event.provider,
                        flow = %event.flow,
                        "Reconciliation failed: {}", e
                    );
                    let notification = Notification::new(Severity::Error, "Reconciliation Failed")
                        .field("Source", event.source())
                        .field("Payment ID", &event.reference)
                        .field("Error", &e);
                    self.notifier.send(&notification).await;
                    ReconcileOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            },
        }
    }

    async fn reconcile(&self, event: &CallbackEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let reference = event.reference.as_str();
        if event.amount <= Decimal::ZERO {
            return Err(ReconcileError::NonPositiveAmount {
                amount: event.amount,
            });
        }

        let Some(intent) = self.store.find_intent(reference).await? else {
            return Ok(self.not_found(event, "Transaction").await);
        };

        let Some(entry) = self.store.find_ledger_entry(event.flow, reference).await? else {
            let entity = match event.flow {
                Flow::Payment => "Merchant Payment",
                Flow::Payout => "Merchant Payout",
            };
            return Ok(self.not_found(event, entity).await);
        };

        if !entry.is_pending() {
            return Ok(self.duplicate(event, &entry.status).await);
        }

        let status = normalize(&event.raw_status);
        let settlement = self.store.find_settlement_record(reference).await?;
        if event.flow == Flow::Payout && settlement.is_none() {
            return Ok(self.not_found(event, "Settlement Record").await);
        }

        let merchant = match entry.merchant_id {
            Some(merchant_id) => self.store.find_merchant(merchant_id).await?,
            None => None,
        };
        let beneficiary = merchant
            .as_ref()
            .map(|m| m.user_id)
            .or_else(|| settlement.as_ref().and_then(|s| s.user_id));
        let Some(user_id) = beneficiary else {
            return Ok(self.not_found(event, "Merchant").await);
        };

        let method = entry.payment_method_id;
        let (ledger_status, fee, wallet_delta) = match event.flow {
            Flow::Payment => {
                let fee = self.fees.payment_fee(method, event.amount).await?;
                let ledger_status = self.policy.payment_status(&status, method);
                let delta = if self.policy.credits_wallet(ledger_status, method) {
                    match &settlement {
                        // Pre-created records already carry the net amount
                        Some(record) => Some(record.total),
                        None => Some(fee.net_of(event.amount)?),
                    }
                } else {
                    None
                };
                (ledger_status, fee, delta)
            }
            Flow::Payout => {
                let Some(user) = self.store.find_user(user_id).await? else {
                    return Ok(self.not_found(event, "User").await);
                };
                let tier = FeeTier::for_role(user.role_id);
                let fee = self.fees.payout_fee(method, tier, event.amount).await?;
                let delta = if status.is_success() {
                    Some(-fee.gross_of(event.amount)?)
                } else {
                    None
                };
                (ledger_status_for(status.merchant), fee, delta)
            }
        };

        let wallet = match wallet_delta {
            Some(delta) => {
                if self.store.find_wallet(user_id).await?.is_none() {
                    return Ok(self.not_found(event, "Wallet").await);
                }
                Some(WalletMutation { user_id, delta })
            }
            None => None,
        };

        let settlement_write = match &settlement {
            Some(_) => SettlementWrite::Update {
                payment_status: status.merchant.as_str().to_string(),
                status: ledger_status.as_str().to_string(),
            },
            None => SettlementWrite::Create(NewSettlementRecord {
                user_id,
                currency_id: SETTLEMENT_CURRENCY_ID,
                payment_method_id: method,
                merchant_id: entry.merchant_id,
                uuid: intent.order_id.clone(),
                grant_id: reference.to_string(),
                transaction_reference_id: SETTLEMENT_REFERENCE_ID,
                transaction_type_id: PAYMENT_CATEGORY,
                user_type: SETTLEMENT_USER_TYPE.to_string(),
                subtotal: event.amount,
                percentage: fee.rate.percentage,
                charge_percentage: fee.percentage_amount,
                charge_fixed: fee.rate.fixed,
                total: fee.net_of(event.amount)?,
                payment_status: status.merchant.as_str().to_string(),
                status: ledger_status.as_str().to_string(),
            }),
        };

        let plan = SettlementPlan {
            flow: event.flow,
            reference: reference.to_string(),
            intent_status: status.internal.as_str().to_string(),
            amount: event.amount,
            ledger_status,
            settlement: settlement_write,
            wallet,
        };

        let wallet_balance = match self.store.commit_settlement(&plan).await? {
            CommitOutcome::Applied { wallet_balance } => wallet_balance,
            // Lost the race against a concurrent delivery
            CommitOutcome::AlreadyProcessed { current_status } => {
                return Ok(self.duplicate(event, &current_status).await);
            }
        };

        info!(
            reference = %event.reference,
            provider = %event.provider,
            flow = %event.flow,
            status = %ledger_status,
            fee = %fee.total,
            wallet_delta = ?wallet_delta,
            "Callback reconciled"
        );

        let merchant_name = merchant
            .as_ref()
            .map(|m| m.business_name.as_str())
            .unwrap_or_default();
        // Payments with a pre-created record are announced by the settlement process
        let dispatch = if event.flow == Flow::Payment && settlement.is_some() {
            None
        } else {
            self.dispatch_callback(event, &intent, merchant_name, status.merchant)
                .await
        };

        let (severity, title) = applied_title(event.flow, ledger_status);
        let mut notification = Notification::new(severity, title)
            .field("Payment ID", &event.reference)
            .field("Order ID", &intent.order_id)
            .field("Source", event.source())
            .field("Provider Status", &event.raw_status)
            .field("Status", ledger_status)
            .amount("Amount", event.amount)
            .amount("Fee", fee.total);
        if let Some(delta) = wallet_delta {
            let label = if delta.is_sign_negative() { "Debited" } else { "Credited" };
            notification = notification.amount(label, delta.abs());
        }
        if let Some(balance) = wallet_balance {
            notification = notification.amount("Balance", balance);
        }
        notification = notification.field("Time", &event.occurred_at);
        self.notifier.send(&notification).await;

        Ok(ReconcileOutcome::Applied {
            status: ledger_status,
            wallet_delta,
            wallet_balance,
            dispatch,
        })
    }

    async fn dispatch_callback(
        &self,
        event: &CallbackEvent,
        intent: &TransactionIntent,
        merchant_name: &str,
        status: MerchantStatus,
    ) -> Option<DispatchOutcome> {
        let Some(kind) = PayloadKind::for_intent(event.flow, &intent.payment_method) else {
            warn!(
                reference = %event.reference,
                payment_method = %intent.payment_method,
                "No callback template for payment method, skipping merchant callback"
            );
            return None;
        };

        let payload = build_payload(
            kind,
            intent,
            &event.reference,
            merchant_name,
            status,
            &format_jakarta(Utc::now()),
        );

        match self.dispatcher.dispatch(intent, &payload).await {
            Ok(outcome) => {
                if let DispatchOutcome::Failed { error, .. } = &outcome {
                    let notification = Notification::new(Severity::Error, "Merchant Callback Failed")
                        .field("Payment ID", &event.reference)
                        .field("URL", &intent.notify_url)
                        .field("Error", error);
                    self.notifier.send(&notification).await;
                }
                Some(outcome)
            }
            Err(e) => {
                error!(
                    reference = %event.reference,
                    "Failed to record merchant callback attempt: {}", e
                );
                let notification = Notification::new(Severity::Error, "Callback Status Update Failed")
                    .field("Payment ID", &event.reference)
                    .field("Error", &e);
                self.notifier.send(&notification).await;
                None
            }
        }
    }

    async fn settlement_notice(&self, event: &CallbackEvent) {
        let order_id = match self.store.find_intent(&event.reference).await {
            Ok(intent) => intent.map(|intent| intent.order_id),
            Err(e) => {
                warn!(
                    reference = %event.reference,
                    "Transaction lookup for settlement notice failed: {}", e
                );
                None
            }
        };

        info!(
            reference = %event.reference,
            provider = %event.provider,
            flow = %event.flow,
            "Settlement notice received"
        );

        let mut notification = Notification::new(Severity::Settlement, "Settlement Notification")
            .field("Payment ID", &event.reference);
        if let Some(order_id) = order_id {
            notification = notification.field("Order ID", order_id);
        }
        let notification = notification
            .field("Source", event.source())
            .amount("Amount", event.amount)
            .field("Time", &event.occurred_at);
        self.notifier.send(&notification).await;
    }

    async fn not_found(&self, event: &CallbackEvent, entity: &'static str) -> ReconcileOutcome {
        warn!(
            reference = %event.reference,
            provider = %event.provider,
            flow = %event.flow,
            "{} not found", entity
        );
        let notification = Notification::new(Severity::Info, format!("{} Not Found", entity))
            .field("Source", event.source())
            .field("Payment ID", &event.reference)
            .field("Status", &event.raw_status)
            .amount("Amount", event.amount)
            .field("Date", &event.occurred_at);
        self.notifier.send(&notification).await;
        ReconcileOutcome::NotFound { entity }
    }

    async fn duplicate(&self, event: &CallbackEvent, current_status: &str) -> ReconcileOutcome {
        warn!(
            reference = %event.reference,
            provider = %event.provider,
            flow = %event.flow,
            current_status,
            "Duplicate callback prevented"
        );
        let notification = Notification::new(Severity::Warning, "Duplicate Callback Prevented")
            .field("Source", event.source())
            .field("Payment ID", &event.reference)
            .field("Current Status", current_status)
            .field("Attempted Status", &event.raw_status);
        self.notifier.send(&notification).await;
        ReconcileOutcome::Duplicate {
            current_status: current_status.to_string(),
        }
    }
}

fn applied_title(flow: Flow, status: LedgerStatus) -> (Severity, &'static str) {
    match (flow, status) {
        (Flow::Payment, LedgerStatus::Success) => (Severity::Success, "Payment Success"),
        (Flow::Payment, LedgerStatus::PendingSettlement) => {
            (Severity::Info, "Payment Pending Settlement")
        }
        (Flow::Payment, LedgerStatus::Blocked) => (Severity::Warning, "Payment Failed"),
        (Flow::Payment, LedgerStatus::Pending) => (Severity::Info, "Payment Pending"),
        (Flow::Payout, LedgerStatus::Success) => (Severity::Success, "Payout Success"),
        (Flow::Payout, LedgerStatus::Blocked) => (Severity::Warning, "Payout Failed"),
        (Flow::Payout, _) => (Severity::Info, "Payout Pending"),
    }
}
