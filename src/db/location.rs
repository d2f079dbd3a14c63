use super::DBClient;
use crate::dtos::{LocationInputDto, LocationNameDto};
use crate::models::{Location, LocationLevel};

pub trait LocationExt {
    /// Rows of a level, optionally narrowed to one parent
    async fn get_locations(
        &self,
        level: LocationLevel,
        parent_id: Option<i32>,
        active_only: bool,
    ) -> Result<Vec<Location>, sqlx::Error>;

    async fn get_location(
        &self,
        level: LocationLevel,
        id: i32,
    ) -> Result<Option<Location>, sqlx::Error>;

    async fn location_name(
        &self,
        level: LocationLevel,
        id: i32,
    ) -> Result<Option<LocationNameDto>, sqlx::Error>;

    async fn create_location(
        &self,
        level: LocationLevel,
        input: &LocationInputDto,
    ) -> Result<Location, sqlx::Error>;

    async fn update_location(
        &self,
        level: LocationLevel,
        id: i32,
        input: &LocationInputDto,
    ) -> Result<Option<Location>, sqlx::Error>;

    /// Child locations plus properties pointing at this row
    async fn location_usage(&self, level: LocationLevel, id: i32) -> Result<i64, sqlx::Error>;

    async fn delete_location(&self, level: LocationLevel, id: i32) -> Result<bool, sqlx::Error>;
}

impl LocationExt for DBClient {
    async fn get_locations(
        &self,
        level: LocationLevel,
        parent_id: Option<i32>,
        active_only: bool,
    ) -> Result<Vec<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!(
            r#"
            SELECT * FROM {}
            WHERE ($1::int IS NULL OR parent_id = $1)
              AND ($2 = FALSE OR is_active)
            ORDER BY sort_order, name_en
            "#,
            level.table()
        ))
        .bind(parent_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_location(
        &self,
        level: LocationLevel,
        id: i32,
    ) -> Result<Option<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!("SELECT * FROM {} WHERE id = $1", level.table()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn location_name(
        &self,
        level: LocationLevel,
        id: i32,
    ) -> Result<Option<LocationNameDto>, sqlx::Error> {
        sqlx::query_as::<_, LocationNameDto>(&format!(
            "SELECT id, name_ar, name_en, name_ku FROM {} WHERE id = $1",
            level.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_location(
        &self,
        level: LocationLevel,
        input: &LocationInputDto,
    ) -> Result<Location, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!(
            r#"
            INSERT INTO {} (name_ar, name_en, name_ku, parent_id, is_active, sort_order)
            VALUES ($1, $2, $3, $4, COALESCE($5, TRUE), COALESCE($6, 0))
            RETURNING *
            "#,
            level.table()
        ))
        .bind(input.name_ar.trim())
        .bind(input.name_en.trim())
        .bind(input.name_ku.trim())
        .bind(input.parent_id)
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_location(
        &self,
        level: LocationLevel,
        id: i32,
        input: &LocationInputDto,
    ) -> Result<Option<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(&format!(
            r#"
            UPDATE {}
            SET name_ar = $1, name_en = $2, name_ku = $3,
                parent_id = COALESCE($4, parent_id),
                is_active = COALESCE($5, is_active),
                sort_order = COALESCE($6, sort_order),
                updated_at = NOW()
            WHERE id = $7
            RETURNING *
            "#,
            level.table()
        ))
        .bind(input.name_ar.trim())
        .bind(input.name_en.trim())
        .bind(input.name_ku.trim())
        .bind(input.parent_id)
        .bind(input.is_active)
        .bind(input.sort_order)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn location_usage(&self, level: LocationLevel, id: i32) -> Result<i64, sqlx::Error> {
        let children = match level.child() {
            Some(child) => format!(
                "(SELECT COUNT(*) FROM {} WHERE parent_id = $1)",
                child.table()
            ),
            None => "0".to_string(),
        };
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT {} + (SELECT COUNT(*) FROM properties WHERE {} = $1)",
            children,
            level.property_column()
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_location(&self, level: LocationLevel, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", level.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
