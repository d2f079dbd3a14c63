use super::DBClient;
use crate::models::{Media, MediaModel};
use sqlx::{PgExecutor, types::Json};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A stored file about to be recorded.
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub uuid: Uuid,
    pub model: MediaModel,
    pub model_id: String,
    pub collection: String,
    pub file_name: String,
    pub mime_type: String,
    pub disk: String,
    pub path: String,
    pub size: i64,
    pub conversions: BTreeMap<String, String>,
}

async fn insert_media<'e>(
    executor: impl PgExecutor<'e>,
    media: &NewMedia,
) -> Result<Media, sqlx::Error> {
    sqlx::query_as::<_, Media>(
        r#"
        INSERT INTO media (uuid, model_type, model_id, collection_name, file_name, mime_type,
                           disk, path, size, conversions, order_column)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                (SELECT COALESCE(MAX(order_column) + 1, 0) FROM media
                  WHERE model_type = $2 AND model_id = $3 AND collection_name = $4))
        RETURNING *
        "#,
    )
    .bind(media.uuid)
    .bind(media.model.to_str())
    .bind(&media.model_id)
    .bind(&media.collection)
    .bind(&media.file_name)
    .bind(&media.mime_type)
    .bind(&media.disk)
    .bind(&media.path)
    .bind(media.size)
    .bind(Json(&media.conversions))
    .fetch_one(executor)
    .await
}

pub trait MediaExt {
    /// Appends the row at the end of its collection
    async fn add_media(&self, media: NewMedia) -> Result<Media, sqlx::Error>;

    /// Swaps the whole collection for `media` in one transaction and
    /// returns the new row with the rows it displaced. Concurrent
    /// replacements of the same collection are serialized.
    async fn replace_media(&self, media: NewMedia) -> Result<(Media, Vec<Media>), sqlx::Error>;

    async fn get_media(&self, id: i64) -> Result<Option<Media>, sqlx::Error>;

    /// Every item attached to a model, ordered for display
    async fn media_for(&self, model: MediaModel, model_id: &str)
    -> Result<Vec<Media>, sqlx::Error>;

    async fn delete_media(&self, id: i64) -> Result<Option<Media>, sqlx::Error>;

    /// Deletes and returns the rows of one collection (or all when `None`)
    async fn delete_media_for(
        &self,
        model: MediaModel,
        model_id: &str,
        collection: Option<&str>,
    ) -> Result<Vec<Media>, sqlx::Error>;

    /// Sets `order_column` by position in `ids`. Ids not attached to the
    /// model are ignored. Returns rows updated.
    async fn reorder_media(
        &self,
        model: MediaModel,
        model_id: &str,
        ids: &[i64],
    ) -> Result<u64, sqlx::Error>;
}

impl MediaExt for DBClient {
    async fn add_media(&self, media: NewMedia) -> Result<Media, sqlx::Error> {
        insert_media(&self.pool, &media).await
    }

    async fn replace_media(&self, media: NewMedia) -> Result<(Media, Vec<Media>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2 || ':' || $3))")
            .bind(media.model.to_str())
            .bind(&media.model_id)
            .bind(&media.collection)
            .execute(&mut *tx)
            .await?;

        let previous = sqlx::query_as::<_, Media>(
            r#"
            DELETE FROM media
            WHERE model_type = $1 AND model_id = $2 AND collection_name = $3
            RETURNING *
            "#,
        )
        .bind(media.model.to_str())
        .bind(&media.model_id)
        .bind(&media.collection)
        .fetch_all(&mut *tx)
        .await?;

        let inserted = insert_media(&mut *tx, &media).await?;

        tx.commit().await?;
        Ok((inserted, previous))
    }

    async fn get_media(&self, id: i64) -> Result<Option<Media>, sqlx::Error> {
        sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn media_for(
        &self,
        model: MediaModel,
        model_id: &str,
    ) -> Result<Vec<Media>, sqlx::Error> {
        sqlx::query_as::<_, Media>(
            r#"
            SELECT * FROM media
            WHERE model_type = $1 AND model_id = $2
            ORDER BY collection_name, order_column, id
            "#,
        )
        .bind(model.to_str())
        .bind(model_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn delete_media(&self, id: i64) -> Result<Option<Media>, sqlx::Error> {
        sqlx::query_as::<_, Media>("DELETE FROM media WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_media_for(
        &self,
        model: MediaModel,
        model_id: &str,
        collection: Option<&str>,
    ) -> Result<Vec<Media>, sqlx::Error> {
        sqlx::query_as::<_, Media>(
            r#"
            DELETE FROM media
            WHERE model_type = $1 AND model_id = $2
              AND ($3::varchar IS NULL OR collection_name = $3)
            RETURNING *
            "#,
        )
        .bind(model.to_str())
        .bind(model_id)
        .bind(collection)
        .fetch_all(&self.pool)
        .await
    }

    async fn reorder_media(
        &self,
        model: MediaModel,
        model_id: &str,
        ids: &[i64],
    ) -> Result<u64, sqlx::Error> {
        // Position in the array becomes the order (ORDINALITY is 1-based)
        let result = sqlx::query(
            r#"
            UPDATE media m
            SET order_column = o.position - 1
            FROM UNNEST($3::bigint[]) WITH ORDINALITY AS o(id, position)
            WHERE m.id = o.id AND m.model_type = $1 AND m.model_id = $2
            "#,
        )
        .bind(model.to_str())
        .bind(model_id)
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
