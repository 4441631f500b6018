use crate::database::error::DatabaseError;
use crate::payments::types::{NewSettlementRecord, SettlementRecord, TransactionIntent};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

/// Transaction intents (`app_transactions_infos`) and settlement records
/// (`transactions`), both keyed by grant reference
#[derive(Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_intent(
        &self,
        grant_id: &str,
    ) -> Result<Option<TransactionIntent>, DatabaseError> {
        sqlx::query_as::<_, TransactionIntent>(
            "SELECT id, app_id, order_id, payment_method, amount, currency, notify_url,
                    success_url, cancel_url, grant_id, token, bank_number, bank_ewallet_name,
                    qris_string, ewallet_link, status
             FROM app_transactions_infos WHERE grant_id = $1 LIMIT 1",
        )
        .bind(grant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_settlement_record(
        &self,
        grant_id: &str,
    ) -> Result<Option<SettlementRecord>, DatabaseError> {
        sqlx::query_as::<_, SettlementRecord>(
            "SELECT id, user_id, payment_method_id, merchant_id, uuid, grant_id,
                    transaction_type_id, subtotal, percentage, charge_percentage,
                    charge_fixed, total, payment_status, status
             FROM transactions WHERE grant_id = $1 LIMIT 1",
        )
        .bind(grant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record the provider outcome on the intent
    pub async fn update_intent_status(
        conn: &mut PgConnection,
        grant_id: &str,
        status: &str,
        amount: Decimal,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE app_transactions_infos SET status = $1, amount = $2, updated_at = NOW()
             WHERE grant_id = $3",
        )
        .bind(status)
        .bind(amount)
        .bind(grant_id)
        .execute(conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Transaction", grant_id));
        }
        Ok(())
    }

    pub async fn update_settlement_status(
        conn: &mut PgConnection,
        grant_id: &str,
        payment_status: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE transactions SET payment_status = $1, status = $2, updated_at = NOW()
             WHERE grant_id = $3",
        )
        .bind(payment_status)
        .bind(status)
        .bind(grant_id)
        .execute(conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Settlement record", grant_id));
        }
        Ok(())
    }

    /// Insert the settlement record for a reference, or take over the status
    /// of one that a concurrent callback inserted first
    pub async fn upsert_settlement_record(
        conn: &mut PgConnection,
        record: &NewSettlementRecord,
    ) -> Result<i64, DatabaseError> {
        sqlx::query_scalar(
            "INSERT INTO transactions
                (user_id, currency_id, payment_method_id, merchant_id, uuid, grant_id,
                 transaction_reference_id, transaction_type_id, user_type, subtotal,
                 percentage, charge_percentage, charge_fixed, total, payment_status, status,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     NOW(), NOW())
             ON CONFLICT (grant_id) DO UPDATE
             SET payment_status = EXCLUDED.payment_status,
                 status = EXCLUDED.status,
                 updated_at = NOW()
             RETURNING id",
        )
        .bind(record.user_id)
        .bind(record.currency_id)
        .bind(record.payment_method_id)
        .bind(record.merchant_id)
        .bind(&record.uuid)
        .bind(&record.grant_id)
        .bind(record.transaction_reference_id)
        .bind(record.transaction_type_id)
        .bind(&record.user_type)
        .bind(record.subtotal)
        .bind(record.percentage)
        .bind(record.charge_percentage)
        .bind(record.charge_fixed)
        .bind(record.total)
        .bind(&record.payment_status)
        .bind(&record.status)
        .fetch_one(conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
