use super::{DBClient, offset};
use crate::dtos::PropertyCardDto;
use uuid::Uuid;

pub trait FavoriteExt {
    /// Flips the favorite flag. Returns whether the property is now a favorite.
    async fn toggle_favorite(&self, user_id: Uuid, property_id: i64) -> Result<bool, sqlx::Error>;

    async fn is_favorited(&self, user_id: Uuid, property_id: i64) -> Result<bool, sqlx::Error>;

    /// Favorited listings that are still publicly visible
    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error>;

    async fn count_favorites(&self, user_id: Uuid) -> Result<i64, sqlx::Error>;
}

impl FavoriteExt for DBClient {
    async fn toggle_favorite(&self, user_id: Uuid, property_id: i64) -> Result<bool, sqlx::Error> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND property_id = $2")
            .bind(user_id)
            .bind(property_id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO favorites (user_id, property_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(property_id)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    async fn is_favorited(&self, user_id: Uuid, property_id: i64) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND property_id = $2)",
        )
        .bind(user_id)
        .bind(property_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error> {
        let visible = super::property::PUBLICLY_VISIBLE;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM favorites f JOIN properties p ON p.id = f.property_id \
             WHERE f.user_id = $1 AND {}",
            visible
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let cards = sqlx::query_as::<_, PropertyCardDto>(&format!(
            "{} JOIN favorites f ON f.property_id = p.id \
             WHERE f.user_id = $1 AND {} \
             ORDER BY f.created_at DESC LIMIT $2 OFFSET $3",
            super::property::CARD_SELECT,
            visible
        ))
        .bind(user_id)
        .bind(per_page)
        .bind(offset(page, per_page))
        .fetch_all(&self.pool)
        .await?;

        Ok((cards, total))
    }

    async fn count_favorites(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
    }
}
