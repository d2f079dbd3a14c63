use super::{DBClient, offset};
use crate::dtos::{CreateLeadDto, LeadsQuery};
use crate::models::{Lead, LeadStatus};
use uuid::Uuid;

pub trait LeadExt {
    async fn create_lead(&self, dto: &CreateLeadDto) -> Result<Lead, sqlx::Error>;

    async fn get_leads(&self, query: &LeadsQuery) -> Result<(Vec<Lead>, i64), sqlx::Error>;

    async fn get_lead(&self, id: i64) -> Result<Option<Lead>, sqlx::Error>;

    /// Compare-and-set: `None` when the lead is no longer in `from`
    async fn update_lead_status(
        &self,
        id: i64,
        from: LeadStatus,
        to: LeadStatus,
    ) -> Result<Option<Lead>, sqlx::Error>;

    async fn assign_lead(&self, id: i64, user_id: Option<Uuid>)
    -> Result<Option<Lead>, sqlx::Error>;

    async fn update_lead_notes(
        &self,
        id: i64,
        notes: Option<&str>,
    ) -> Result<Option<Lead>, sqlx::Error>;

    async fn delete_lead(&self, id: i64) -> Result<bool, sqlx::Error>;
}

impl LeadExt for DBClient {
    async fn create_lead(&self, dto: &CreateLeadDto) -> Result<Lead, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads (name, email, phone, message, source, property_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(dto.name.trim())
        .bind(dto.email.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .bind(dto.phone.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .bind(dto.message.trim())
        .bind(dto.source.as_deref())
        .bind(dto.property_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_leads(&self, query: &LeadsQuery) -> Result<(Vec<Lead>, i64), sqlx::Error> {
        let page = query.page.unwrap_or(1);
        let per_page = query.per_page.unwrap_or(20);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM leads
            WHERE ($1::lead_status IS NULL OR status = $1)
              AND ($2::bigint IS NULL OR property_id = $2)
            "#,
        )
        .bind(query.status)
        .bind(query.property_id)
        .fetch_one(&self.pool)
        .await?;

        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE ($1::lead_status IS NULL OR status = $1)
              AND ($2::bigint IS NULL OR property_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.status)
        .bind(query.property_id)
        .bind(per_page)
        .bind(offset(page, per_page))
        .fetch_all(&self.pool)
        .await?;

        Ok((leads, total))
    }

    async fn get_lead(&self, id: i64) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_lead_status(
        &self,
        id: i64,
        from: LeadStatus,
        to: LeadStatus,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(to)
        .bind(id)
        .bind(from)
        .fetch_optional(&self.pool)
        .await
    }

    async fn assign_lead(
        &self,
        id: i64,
        user_id: Option<Uuid>,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            "UPDATE leads SET assigned_to = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_lead_notes(
        &self,
        id: i64,
        notes: Option<&str>,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(
            "UPDATE leads SET notes = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_lead(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
