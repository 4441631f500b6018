use crate::database::error::DatabaseError;
use crate::payments::types::{Flow, LedgerEntry, Merchant};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

/// Merchant ledger entries (`merchant_payments` / `merchant_payouts`) and
/// merchant profiles
#[derive(Clone)]
pub struct MerchantRepository {
    pool: PgPool,
}

fn ledger_table(flow: Flow) -> &'static str {
    match flow {
        Flow::Payment => "merchant_payments",
        Flow::Payout => "merchant_payouts",
    }
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_ledger_entry(
        &self,
        flow: Flow,
        gateway_reference: &str,
    ) -> Result<Option<LedgerEntry>, DatabaseError> {
        let query = format!(
            "SELECT id, merchant_id, payment_method_id, gateway_reference, order_no, amount, total, status
             FROM {} WHERE gateway_reference = $1 LIMIT 1",
            ledger_table(flow)
        );

        sqlx::query_as::<_, LedgerEntry>(&query)
            .bind(gateway_reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_merchant(&self, merchant_id: i64) -> Result<Option<Merchant>, DatabaseError> {
        sqlx::query_as::<_, Merchant>(
            "SELECT id, user_id, business_name FROM merchants WHERE id = $1 LIMIT 1",
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Move a `Pending` entry to `status`
    ///
    /// Returns `false` when no pending entry matched, i.e. the entry was
    /// already settled by an earlier or concurrent delivery. The row lock taken
    /// by the update serializes racing claims until the owning transaction ends.
    pub async fn claim_pending(
        conn: &mut PgConnection,
        flow: Flow,
        gateway_reference: &str,
        status: &str,
        amount: Decimal,
    ) -> Result<bool, DatabaseError> {
        let query = format!(
            "UPDATE {} SET status = $1, amount = $2, updated_at = NOW()
             WHERE gateway_reference = $3 AND status = 'Pending'",
            ledger_table(flow)
        );

        let result = sqlx::query(&query)
            .bind(status)
            .bind(amount)
            .bind(gateway_reference)
            .execute(conn)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn current_status(
        conn: &mut PgConnection,
        flow: Flow,
        gateway_reference: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let query = format!(
            "SELECT status FROM {} WHERE gateway_reference = $1 LIMIT 1",
            ledger_table(flow)
        );

        sqlx::query_scalar(&query)
            .bind(gateway_reference)
            .fetch_optional(conn)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}
