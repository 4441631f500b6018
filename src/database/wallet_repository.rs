use crate::database::error::DatabaseError;
use crate::payments::types::Wallet;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

/// Wallet Repository for wallet-specific database operations
#[derive(Clone)]
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find wallet by user ID
    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Option<Wallet>, DatabaseError> {
        sqlx::query_as::<_, Wallet>(
            "SELECT id, user_id, balance FROM wallets WHERE user_id = $1 LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Add `delta` to the balance and return the new balance
    ///
    /// The change is relative so concurrent mutations for the same user never
    /// overwrite each other.
    pub async fn apply_delta(
        conn: &mut PgConnection,
        user_id: i64,
        delta: Decimal,
    ) -> Result<Decimal, DatabaseError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            "UPDATE wallets SET balance = balance + $1, updated_at = NOW()
             WHERE user_id = $2
             RETURNING balance",
        )
        .bind(delta)
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        balance.ok_or_else(|| DatabaseError::not_found("Wallet", user_id))
    }
}
