use super::DBClient;
use crate::models::RefreshToken;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Refresh token persistence. The JWT handed to clients only carries the row
/// id (`jti`); revocation state lives here.
pub trait TokenExt {
    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, sqlx::Error>;

    async fn get_refresh_token(&self, token_id: Uuid) -> Result<Option<RefreshToken>, sqlx::Error>;

    /// Revoke `token_id` and issue its successor atomically. `None` when the
    /// old token was already revoked (reuse or a concurrent refresh).
    async fn rotate_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, sqlx::Error>;

    /// Revoke every live refresh token of a user. Returns rows touched.
    async fn revoke_user_tokens(&self, user_id: Uuid) -> Result<u64, sqlx::Error>;
}

impl TokenExt for DBClient {
    async fn create_refresh_token(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>(
            "INSERT INTO refresh_tokens (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_refresh_token(&self, token_id: Uuid) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn rotate_refresh_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(token_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let next = sqlx::query_as::<_, RefreshToken>(
            "INSERT INTO refresh_tokens (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(next))
    }

    async fn revoke_user_tokens(&self, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
