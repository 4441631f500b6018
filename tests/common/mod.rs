//! In-memory doubles of the repository and notifier traits
//!
//! `MemoryStore` applies a settlement plan to a cloned snapshot of its state
//! and swaps the snapshot in only when every write succeeded, so an injected
//! failure leaves nothing behind.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use kytapay_webhook::database::error::{DatabaseError, DatabaseErrorKind};
use kytapay_webhook::database::repository::{
    CallbackAttemptStore, FeeScheduleStore, ReconciliationStore,
};
use kytapay_webhook::notify::{Notification, Notifier};
use kytapay_webhook::payments::callback::CallbackDispatcher;
use kytapay_webhook::payments::fees::FeeCalculator;
use kytapay_webhook::payments::reconcile::Reconciler;
use kytapay_webhook::payments::types::{
    AttemptRecord, CallbackAttempt, CallbackEvent, CallbackKind, Channel, CommitOutcome, FeeRate,
    Flow, LedgerEntry, LedgerStatus, Merchant, Provider, SettlementPlan, SettlementRecord,
    SettlementWrite, TransactionIntent, User, Wallet,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MERCHANT_ID: i64 = 1;
pub const MERCHANT_USER_ID: i64 = 10;
pub const MERCHANT_NAME: &str = "Toko Sejahtera";
pub const CALLBACK_TOKEN: &str = "merchant-token";

#[derive(Debug, Clone, Default)]
struct MemoryState {
    intents: HashMap<String, TransactionIntent>,
    payments: HashMap<String, LedgerEntry>,
    payouts: HashMap<String, LedgerEntry>,
    settlements: HashMap<String, SettlementRecord>,
    merchants: HashMap<i64, Merchant>,
    users: HashMap<i64, User>,
    wallets: HashMap<i64, Wallet>,
    attempts: HashMap<i64, CallbackAttempt>,
    regular_fees: HashMap<(i64, i64), FeeRate>,
    express_fees: HashMap<i64, FeeRate>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn ledger(&mut self, flow: Flow) -> &mut HashMap<String, LedgerEntry> {
        match flow {
            Flow::Payment => &mut self.payments,
            Flow::Payout => &mut self.payouts,
        }
    }

    fn apply(&mut self, plan: &SettlementPlan) -> Result<CommitOutcome, DatabaseError> {
        let entry = self
            .ledger(plan.flow)
            .get_mut(&plan.reference)
            .ok_or_else(|| DatabaseError::not_found("LedgerEntry", &plan.reference))?;
        if !entry.is_pending() {
            return Ok(CommitOutcome::AlreadyProcessed {
                current_status: entry.status.clone(),
            });
        }
        entry.status = plan.ledger_status.as_str().to_string();
        entry.amount = plan.amount;

        let intent = self
            .intents
            .get_mut(&plan.reference)
            .ok_or_else(|| DatabaseError::not_found("TransactionIntent", &plan.reference))?;
        intent.status = plan.intent_status.clone();
        intent.amount = plan.amount;

        match &plan.settlement {
            SettlementWrite::Update {
                payment_status,
                status,
            } => {
                let record = self
                    .settlements
                    .get_mut(&plan.reference)
                    .ok_or_else(|| DatabaseError::not_found("SettlementRecord", &plan.reference))?;
                record.payment_status = Some(payment_status.clone());
                record.status = status.clone();
            }
            SettlementWrite::Create(new) => {
                // ON CONFLICT (grant_id) DO UPDATE
                if let Some(record) = self.settlements.get_mut(&new.grant_id) {
                    record.payment_status = Some(new.payment_status.clone());
                    record.status = new.status.clone();
                } else {
                    let id = self.next_id();
                    self.settlements.insert(
                        new.grant_id.clone(),
                        SettlementRecord {
                            id,
                            user_id: Some(new.user_id),
                            payment_method_id: new.payment_method_id,
                            merchant_id: new.merchant_id,
                            uuid: Some(new.uuid.clone()),
                            grant_id: new.grant_id.clone(),
                            transaction_type_id: Some(new.transaction_type_id),
                            subtotal: new.subtotal,
                            percentage: new.percentage,
                            charge_percentage: new.charge_percentage,
                            charge_fixed: new.charge_fixed,
                            total: new.total,
                            payment_status: Some(new.payment_status.clone()),
                            status: new.status.clone(),
                        },
                    );
                }
            }
        }

        let wallet_balance = match plan.wallet {
            Some(mutation) => {
                let wallet = self
                    .wallets
                    .get_mut(&mutation.user_id)
                    .ok_or_else(|| DatabaseError::not_found("Wallet", mutation.user_id))?;
                wallet.balance += mutation.delta;
                Some(wallet.balance)
            }
            None => None,
        };

        Ok(CommitOutcome::Applied { wallet_balance })
    }
}

/// Store double with failure injection
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_lookups: AtomicBool,
    fail_fees: AtomicBool,
    fail_commit: AtomicBool,
    /// Fail after the ledger claim, while applying the wallet mutation
    fail_wallet: AtomicBool,
    commits: AtomicUsize,
    wallet_mutations: AtomicUsize,
    attempt_records: Mutex<Vec<AttemptRecord>>,
}

impl MemoryStore {
    /// A store holding one merchant, its user and a wallet of 1,000,000
    pub fn seeded() -> Self {
        let store = Self::default();
        {
            let mut state = store.lock();
            state.next_id = 100;
            state.users.insert(
                MERCHANT_USER_ID,
                User {
                    id: MERCHANT_USER_ID,
                    email: "owner@toko.test".to_string(),
                    role_id: Some(2),
                },
            );
            state.merchants.insert(
                MERCHANT_ID,
                Merchant {
                    id: MERCHANT_ID,
                    user_id: MERCHANT_USER_ID,
                    business_name: MERCHANT_NAME.to_string(),
                },
            );
            state.wallets.insert(
                MERCHANT_USER_ID,
                Wallet {
                    id: 1,
                    user_id: MERCHANT_USER_ID,
                    balance: Decimal::new(1_000_000, 0),
                },
            );
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// Intent with no ledger entry. Returns the intent id.
    pub fn add_intent(&self, reference: &str, payment_method: &str, amount: Decimal) -> i64 {
        let mut state = self.lock();
        let id = state.next_id();
        state.intents.insert(
            reference.to_string(),
            TransactionIntent {
                id,
                app_id: 1,
                order_id: format!("ORDER-{}", reference),
                payment_method: payment_method.to_string(),
                amount,
                currency: "IDR".to_string(),
                notify_url: "http://127.0.0.1:9/notify".to_string(),
                success_url: Some("https://toko.test/success".to_string()),
                cancel_url: Some("https://toko.test/failed".to_string()),
                grant_id: reference.to_string(),
                token: Some(CALLBACK_TOKEN.to_string()),
                bank_number: Some("8800123456".to_string()),
                bank_ewallet_name: Some("BCA".to_string()),
                qris_string: Some("00020101021226".to_string()),
                ewallet_link: Some("https://pay.test/redirect".to_string()),
                status: "pending".to_string(),
            },
        );
        id
    }

    fn insert_entry(&self, flow: Flow, reference: &str, method_id: Option<i64>, amount: Decimal) {
        let mut state = self.lock();
        let id = state.next_id();
        state.ledger(flow).insert(
            reference.to_string(),
            LedgerEntry {
                id,
                merchant_id: Some(MERCHANT_ID),
                payment_method_id: method_id,
                gateway_reference: reference.to_string(),
                order_no: Some(format!("ORDER-{}", reference)),
                amount,
                total: amount,
                status: LedgerStatus::Pending.as_str().to_string(),
            },
        );
    }

    /// Pending payment: intent plus merchant payment entry. Returns the intent id.
    pub fn add_payment(
        &self,
        reference: &str,
        method_id: i64,
        payment_method: &str,
        amount: Decimal,
    ) -> i64 {
        let id = self.add_intent(reference, payment_method, amount);
        self.insert_entry(Flow::Payment, reference, Some(method_id), amount);
        id
    }

    /// Pending payout: intent, merchant payout entry and its settlement record
    pub fn add_payout(&self, reference: &str, method_id: i64, bank_code: &str, amount: Decimal) -> i64 {
        let id = self.add_intent(reference, bank_code, amount);
        self.insert_entry(Flow::Payout, reference, Some(method_id), amount);
        self.add_settlement_record(reference, amount);
        id
    }

    pub fn add_settlement_record(&self, reference: &str, total: Decimal) {
        let mut state = self.lock();
        let id = state.next_id();
        state.settlements.insert(
            reference.to_string(),
            SettlementRecord {
                id,
                user_id: Some(MERCHANT_USER_ID),
                payment_method_id: None,
                merchant_id: Some(MERCHANT_ID),
                uuid: Some(format!("ORDER-{}", reference)),
                grant_id: reference.to_string(),
                transaction_type_id: None,
                subtotal: total,
                percentage: Decimal::ZERO,
                charge_percentage: Decimal::ZERO,
                charge_fixed: Decimal::ZERO,
                total,
                payment_status: None,
                status: LedgerStatus::Pending.as_str().to_string(),
            },
        );
    }

    pub fn add_attempt(&self, transaction_info_id: i64, notify_url: &str) {
        let mut state = self.lock();
        let id = state.next_id();
        if let Some(intent) = state
            .intents
            .values_mut()
            .find(|intent| intent.id == transaction_info_id)
        {
            intent.notify_url = notify_url.to_string();
        }
        state.attempts.insert(
            transaction_info_id,
            CallbackAttempt {
                id,
                transaction_info_id,
                notify_url: notify_url.to_string(),
                status: "Pending".to_string(),
                error_message: None,
                response_body: None,
                payload: None,
            },
        );
    }

    pub fn set_role(&self, user_id: i64, role_id: Option<i64>) {
        if let Some(user) = self.lock().users.get_mut(&user_id) {
            user.role_id = role_id;
        }
    }

    pub fn remove_settlement_record(&self, reference: &str) {
        self.lock().settlements.remove(reference);
    }

    pub fn remove_user(&self, user_id: i64) {
        self.lock().users.remove(&user_id);
    }

    pub fn remove_wallet(&self, user_id: i64) {
        self.lock().wallets.remove(&user_id);
    }

    pub fn remove_merchant(&self, merchant_id: i64) {
        self.lock().merchants.remove(&merchant_id);
    }

    pub fn set_regular_fee(&self, category: i64, method_id: i64, percentage: Decimal, fixed: Decimal) {
        self.lock()
            .regular_fees
            .insert((category, method_id), FeeRate { percentage, fixed });
    }

    pub fn set_express_fee(&self, category: i64, percentage: Decimal, fixed: Decimal) {
        self.lock()
            .express_fees
            .insert(category, FeeRate { percentage, fixed });
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fees(&self, fail: bool) {
        self.fail_fees.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_wallet(&self, fail: bool) {
        self.fail_wallet.store(fail, Ordering::SeqCst);
    }

    pub fn ledger_status(&self, flow: Flow, reference: &str) -> Option<String> {
        let mut state = self.lock();
        state.ledger(flow).get(reference).map(|entry| entry.status.clone())
    }

    pub fn intent_status(&self, reference: &str) -> Option<String> {
        self.lock()
            .intents
            .get(reference)
            .map(|intent| intent.status.clone())
    }

    pub fn settlement(&self, reference: &str) -> Option<SettlementRecord> {
        self.lock().settlements.get(reference).cloned()
    }

    pub fn settlement_count(&self) -> usize {
        self.lock().settlements.len()
    }

    pub fn wallet_balance(&self, user_id: i64) -> Option<Decimal> {
        self.lock().wallets.get(&user_id).map(|wallet| wallet.balance)
    }

    pub fn attempt(&self, transaction_info_id: i64) -> Option<CallbackAttempt> {
        self.lock().attempts.get(&transaction_info_id).cloned()
    }

    pub fn attempt_records(&self) -> Vec<AttemptRecord> {
        self.attempt_records.lock().unwrap().clone()
    }

    /// Commits that changed state
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn wallet_mutations(&self) -> usize {
        self.wallet_mutations.load(Ordering::SeqCst)
    }

    fn check_lookup(&self) -> Result<(), DatabaseError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionTimeout));
        }
        Ok(())
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn find_intent(&self, grant_id: &str) -> Result<Option<TransactionIntent>, DatabaseError> {
        self.check_lookup()?;
        Ok(self.lock().intents.get(grant_id).cloned())
    }

    async fn find_ledger_entry(
        &self,
        flow: Flow,
        gateway_reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        self.check_lookup()?;
        Ok(self.lock().ledger(flow).get(gateway_reference).cloned())
    }

    async fn find_settlement_record(
        &self,
        grant_id: &str,
    ) -> Result<Option<SettlementRecord>, DatabaseError> {
        self.check_lookup()?;
        Ok(self.lock().settlements.get(grant_id).cloned())
    }

    async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError> {
        self.check_lookup()?;
        Ok(self.lock().merchants.get(&merchant_id).cloned())
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        self.check_lookup()?;
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_wallet(&self, user_id: i64) -> Result<Option<Wallet>, DatabaseError> {
        self.check_lookup()?;
        Ok(self.lock().wallets.get(&user_id).cloned())
    }

    async fn commit_settlement(&self, plan: &SettlementPlan) -> Result<CommitOutcome, DatabaseError> {
        // Let a concurrent delivery reach its own commit first
        tokio::task::yield_now().await;

        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::TransactionError {
                message: "connection reset during commit".to_string(),
            }));
        }

        let mut state = self.lock();
        let mut snapshot = state.clone();
        let outcome = snapshot.apply(plan)?;

        if let CommitOutcome::Applied { .. } = outcome {
            if plan.wallet.is_some() && self.fail_wallet.load(Ordering::SeqCst) {
                return Err(DatabaseError::query("wallet update failed"));
            }
            *state = snapshot;
            self.commits.fetch_add(1, Ordering::SeqCst);
            if plan.wallet.is_some() {
                self.wallet_mutations.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl FeeScheduleStore for MemoryStore {
    async fn regular_fee(
        &self,
        category: i64,
        payment_method_id: i64,
    ) -> Result<Option<FeeRate>, DatabaseError> {
        if self.fail_fees.load(Ordering::SeqCst) {
            return Err(DatabaseError::query("fees_limits unavailable"));
        }
        Ok(self
            .lock()
            .regular_fees
            .get(&(category, payment_method_id))
            .copied())
    }

    async fn express_fee(&self, category: i64) -> Result<Option<FeeRate>, DatabaseError> {
        if self.fail_fees.load(Ordering::SeqCst) {
            return Err(DatabaseError::query("fees_express unavailable"));
        }
        Ok(self.lock().express_fees.get(&category).copied())
    }
}

#[async_trait]
impl CallbackAttemptStore for MemoryStore {
    async fn find_attempt(
        &self,
        transaction_info_id: i64,
    ) -> Result<Option<CallbackAttempt>, DatabaseError> {
        Ok(self.lock().attempts.get(&transaction_info_id).cloned())
    }

    async fn record_attempt(
        &self,
        transaction_info_id: i64,
        record: &AttemptRecord,
    ) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        let attempt = state
            .attempts
            .get_mut(&transaction_info_id)
            .ok_or_else(|| DatabaseError::not_found("CallbackAttempt", transaction_info_id))?;
        attempt.status = record.status.as_str().to_string();
        attempt.error_message = Some(record.error_message.clone());
        attempt.response_body = Some(record.response_body.clone());
        attempt.payload = Some(record.payload.clone());
        self.attempt_records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Notifier double keeping every notification it was given
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.title).collect()
    }

    pub fn find(&self, title: &str) -> Option<Notification> {
        self.sent().into_iter().find(|n| n.title == title)
    }

    pub fn count(&self, title: &str) -> usize {
        self.sent().iter().filter(|n| n.title == title).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

pub fn reconciler(store: &Arc<MemoryStore>, notifier: &Arc<RecordingNotifier>) -> Reconciler {
    let fees = FeeCalculator::new(store.clone());
    let dispatcher = CallbackDispatcher::new(store.clone(), Duration::from_secs(2)).unwrap();
    Reconciler::new(store.clone(), fees, dispatcher, notifier.clone())
}

pub fn event(
    provider: Provider,
    flow: Flow,
    channel: Channel,
    reference: &str,
    raw_status: &str,
    amount: Decimal,
) -> CallbackEvent {
    CallbackEvent {
        provider,
        flow,
        channel,
        kind: CallbackKind::Transaction,
        reference: reference.to_string(),
        raw_status: raw_status.to_string(),
        amount,
        occurred_at: "2024-05-01T10:00:00+07:00".to_string(),
    }
}

pub fn qris_payment(reference: &str, raw_status: &str, amount: Decimal) -> CallbackEvent {
    event(Provider::LinkQu, Flow::Payment, Channel::Qris, reference, raw_status, amount)
}

pub fn bank_payout(reference: &str, raw_status: &str, amount: Decimal) -> CallbackEvent {
    event(Provider::LinkQu, Flow::Payout, Channel::Bank, reference, raw_status, amount)
}

/// A callback received by [`MerchantEndpoint`]
#[derive(Debug, Clone)]
pub struct ReceivedCallback {
    pub token: Option<String>,
    pub body: serde_json::Value,
}

/// Local merchant server answering every callback with a fixed status
pub struct MerchantEndpoint {
    pub url: String,
    received: Arc<Mutex<Vec<ReceivedCallback>>>,
}

impl MerchantEndpoint {
    pub async fn spawn(status: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let app = Router::new().route(
            "/notify",
            post(move |headers: HeaderMap, body: Bytes| {
                let sink = sink.clone();
                async move {
                    let token = headers
                        .get("x-callback-token")
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                    sink.lock().unwrap().push(ReceivedCallback { token, body });
                    (status, r#"{"received":true}"#)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/notify", addr),
            received,
        }
    }

    pub fn received(&self) -> Vec<ReceivedCallback> {
        self.received.lock().unwrap().clone()
    }
}
