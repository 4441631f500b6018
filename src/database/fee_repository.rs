use crate::database::error::DatabaseError;
use crate::payments::types::FeeRate;
use sqlx::PgPool;

/// Fee schedule: `fees_limits` (regular) and `fees_express`
#[derive(Clone)]
pub struct FeeRepository {
    pool: PgPool,
}

impl FeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_regular(
        &self,
        transaction_type_id: i64,
        payment_method_id: i64,
    ) -> Result<Option<FeeRate>, DatabaseError> {
        sqlx::query_as::<_, FeeRate>(
            "SELECT charge_percentage AS percentage, charge_fixed AS fixed
             FROM fees_limits
             WHERE transaction_type_id = $1 AND payment_method_id = $2
             LIMIT 1",
        )
        .bind(transaction_type_id)
        .bind(payment_method_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_express(
        &self,
        transaction_type_id: i64,
    ) -> Result<Option<FeeRate>, DatabaseError> {
        sqlx::query_as::<_, FeeRate>(
            "SELECT charge_percentage AS percentage, charge_fixed AS fixed
             FROM fees_express WHERE transaction_type_id = $1 LIMIT 1",
        )
        .bind(transaction_type_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
