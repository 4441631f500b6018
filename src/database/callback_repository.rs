use crate::database::error::DatabaseError;
use crate::payments::types::{AttemptRecord, CallbackAttempt};
use sqlx::PgPool;
use tracing::debug;

/// Merchant callback delivery status (`callback_status`)
#[derive(Clone)]
pub struct CallbackRepository {
    pool: PgPool,
}

impl CallbackRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_transaction_info_id(
        &self,
        transaction_info_id: i64,
    ) -> Result<Option<CallbackAttempt>, DatabaseError> {
        sqlx::query_as::<_, CallbackAttempt>(
            "SELECT id, transaction_info_id, notify_url, status, error_message, response_body, payload
             FROM callback_status WHERE transaction_info_id = $1 LIMIT 1",
        )
        .bind(transaction_info_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Overwrite the attempt row with the latest outcome
    pub async fn update(
        &self,
        transaction_info_id: i64,
        record: &AttemptRecord,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE callback_status
             SET status = $1, error_message = $2, response_body = $3, payload = $4, updated_at = NOW()
             WHERE transaction_info_id = $5",
        )
        .bind(record.status.as_str())
        .bind(&record.error_message)
        .bind(&record.response_body)
        .bind(&record.payload)
        .bind(transaction_info_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Callback status", transaction_info_id));
        }

        debug!(
            transaction_info_id,
            status = record.status.as_str(),
            "Callback status updated"
        );
        Ok(())
    }
}
