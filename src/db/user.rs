use super::{DBClient, offset};
use crate::dtos::{AdminUsersQuery, OwnerDto};
use crate::models::{RefreshToken, User, UserType};
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Fields collected at sign-up.
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub password: &'a str,
    pub user_type: UserType,
    pub verification_token: &'a str,
    pub token_expires_at: DateTime<Utc>,
}

/// User database operations trait
pub trait UserExt {
    /// Get single user by ID, email, or verification token
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Paginated, filtered user list for the admin API plus the total count
    async fn get_users(&self, query: &AdminUsersQuery) -> Result<(Vec<User>, i64), sqlx::Error>;

    /// Insert the user and their first refresh token row in one transaction
    async fn register_user(
        &self,
        user: NewUser<'_>,
        refresh_token_id: Uuid,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<(User, RefreshToken), sqlx::Error>;

    async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error>;

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), sqlx::Error>;

    /// Mark the account holding this token as verified and clear the token
    async fn verify_email_token(&self, token: &str) -> Result<Option<User>, sqlx::Error>;

    /// Store a new verification token (password reset)
    async fn add_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>;

    /// Replace the password hash and consume any pending token
    async fn update_user_password(&self, user_id: Uuid, password: &str)
    -> Result<(), sqlx::Error>;

    async fn set_user_active(&self, user_id: Uuid, active: bool)
    -> Result<Option<User>, sqlx::Error>;

    async fn set_user_verified(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn set_user_type(
        &self,
        user_id: Uuid,
        user_type: UserType,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Public contact card shown on listing pages
    async fn get_owner(&self, user_id: Uuid) -> Result<Option<OwnerDto>, sqlx::Error>;
}

impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        } else if let Some(email) = email {
            // Emails are stored lowercased
            user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
                .bind(email.to_lowercase())
                .fetch_optional(&self.pool)
                .await?;
        } else if let Some(token) = token {
            user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE verification_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        }

        Ok(user)
    }

    async fn get_users(&self, query: &AdminUsersQuery) -> Result<(Vec<User>, i64), sqlx::Error> {
        let page = query.page.unwrap_or(1);
        let per_page = query.per_page.unwrap_or(20);

        fn push_filters<'q>(builder: &mut QueryBuilder<'q, Postgres>, query: &'q AdminUsersQuery) {
            builder.push(" WHERE TRUE");
            if let Some(user_type) = query.user_type {
                builder.push(" AND user_type = ").push_bind(user_type);
            }
            if let Some(active) = query.active {
                builder.push(" AND is_active = ").push_bind(active);
            }
            if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
                let pattern = format!("%{}%", q.trim());
                builder
                    .push(" AND (name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR email ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut list = QueryBuilder::<Postgres>::new("SELECT * FROM users");
        push_filters(&mut list, query);
        list.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset(page, per_page));
        let users = list.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    async fn register_user(
        &self,
        user: NewUser<'_>,
        refresh_token_id: Uuid,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<(User, RefreshToken), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let saved = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, phone, password, user_type, verification_token, token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user.name)
        .bind(user.email.to_lowercase())
        .bind(user.phone)
        .bind(user.password)
        .bind(user.user_type)
        .bind(user.verification_token)
        .bind(user.token_expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let token = sqlx::query_as::<_, RefreshToken>(
            "INSERT INTO refresh_tokens (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(refresh_token_id)
        .bind(saved.id)
        .bind(refresh_expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((saved, token))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email.to_lowercase())
            .fetch_one(&self.pool)
            .await
    }

    async fn touch_last_login(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn verify_email_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                verification_token = NULL,
                token_expires_at = NULL,
                updated_at = NOW()
            WHERE verification_token = $1 AND token_expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    async fn add_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET verification_token = $1, token_expires_at = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_user_password(
        &self,
        user_id: Uuid,
        password: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET password = $1, verification_token = NULL, token_expires_at = NULL, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(password)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_user_active(
        &self,
        user_id: Uuid,
        active: bool,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(active)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_user_verified(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_verified = TRUE, verification_token = NULL, token_expires_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_user_type(
        &self,
        user_id: Uuid,
        user_type: UserType,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET user_type = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(user_type)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_owner(&self, user_id: Uuid) -> Result<Option<OwnerDto>, sqlx::Error> {
        sqlx::query_as::<_, OwnerDto>("SELECT id, name, phone FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }
}
