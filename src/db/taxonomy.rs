use super::DBClient;
use crate::dtos::{TermDto, TermInputDto};
use crate::models::{TaxonomyKind, TaxonomyTerm};

// Table and column names below always come from `TaxonomyKind`.

pub trait TaxonomyExt {
    async fn get_terms(
        &self,
        kind: TaxonomyKind,
        active_only: bool,
    ) -> Result<Vec<TaxonomyTerm>, sqlx::Error>;

    async fn get_term(&self, kind: TaxonomyKind, id: i32)
    -> Result<Option<TaxonomyTerm>, sqlx::Error>;

    async fn create_term(
        &self,
        kind: TaxonomyKind,
        input: &TermInputDto,
    ) -> Result<TaxonomyTerm, sqlx::Error>;

    async fn update_term(
        &self,
        kind: TaxonomyKind,
        id: i32,
        input: &TermInputDto,
    ) -> Result<Option<TaxonomyTerm>, sqlx::Error>;

    /// Number of properties referencing the term
    async fn term_usage(&self, kind: TaxonomyKind, id: i32) -> Result<i64, sqlx::Error>;

    async fn delete_term(&self, kind: TaxonomyKind, id: i32) -> Result<bool, sqlx::Error>;

    /// Terms of a many-to-many kind attached to a property
    async fn terms_for_property(
        &self,
        kind: TaxonomyKind,
        property_id: i64,
    ) -> Result<Vec<TermDto>, sqlx::Error>;
}

impl TaxonomyExt for DBClient {
    async fn get_terms(
        &self,
        kind: TaxonomyKind,
        active_only: bool,
    ) -> Result<Vec<TaxonomyTerm>, sqlx::Error> {
        sqlx::query_as::<_, TaxonomyTerm>(&format!(
            "SELECT * FROM {} WHERE ($1 = FALSE OR is_active) ORDER BY sort_order, name_en",
            kind.table()
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_term(
        &self,
        kind: TaxonomyKind,
        id: i32,
    ) -> Result<Option<TaxonomyTerm>, sqlx::Error> {
        sqlx::query_as::<_, TaxonomyTerm>(&format!("SELECT * FROM {} WHERE id = $1", kind.table()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_term(
        &self,
        kind: TaxonomyKind,
        input: &TermInputDto,
    ) -> Result<TaxonomyTerm, sqlx::Error> {
        sqlx::query_as::<_, TaxonomyTerm>(&format!(
            r#"
            INSERT INTO {} (name_ar, name_en, name_ku, icon, is_active, sort_order)
            VALUES ($1, $2, $3, $4, COALESCE($5, TRUE), COALESCE($6, 0))
            RETURNING *
            "#,
            kind.table()
        ))
        .bind(input.name_ar.trim())
        .bind(input.name_en.trim())
        .bind(input.name_ku.trim())
        .bind(input.icon.as_deref())
        .bind(input.is_active)
        .bind(input.sort_order)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_term(
        &self,
        kind: TaxonomyKind,
        id: i32,
        input: &TermInputDto,
    ) -> Result<Option<TaxonomyTerm>, sqlx::Error> {
        sqlx::query_as::<_, TaxonomyTerm>(&format!(
            r#"
            UPDATE {}
            SET name_ar = $1, name_en = $2, name_ku = $3, icon = $4,
                is_active = COALESCE($5, is_active),
                sort_order = COALESCE($6, sort_order),
                updated_at = NOW()
            WHERE id = $7
            RETURNING *
            "#,
            kind.table()
        ))
        .bind(input.name_ar.trim())
        .bind(input.name_en.trim())
        .bind(input.name_ku.trim())
        .bind(input.icon.as_deref())
        .bind(input.is_active)
        .bind(input.sort_order)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn term_usage(&self, kind: TaxonomyKind, id: i32) -> Result<i64, sqlx::Error> {
        let (table, column) = kind.reference();
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} = $1",
            table, column
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_term(&self, kind: TaxonomyKind, id: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", kind.table()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn terms_for_property(
        &self,
        kind: TaxonomyKind,
        property_id: i64,
    ) -> Result<Vec<TermDto>, sqlx::Error> {
        let Some(pivot) = kind.pivot() else {
            return Ok(Vec::new());
        };
        sqlx::query_as::<_, TermDto>(&format!(
            r#"
            SELECT t.id, t.name_ar, t.name_en, t.name_ku, t.icon
            FROM {} t
            JOIN {} x ON x.term_id = t.id
            WHERE x.property_id = $1
            ORDER BY t.sort_order, t.name_en
            "#,
            kind.table(),
            pivot
        ))
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
    }
}
