use super::DBClient;
use sqlx::{Pool, Postgres};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Daily at 01:00 and 01:30 (sec min hour day month weekday).
const PURGE_USERS_AT: &str = "0 0 1 * * *";
const PURGE_TOKENS_AT: &str = "0 30 1 * * *";

async fn run_cleanup(pool: &Pool<Postgres>, job: &str, uuid: uuid::Uuid, sql: &str) {
    tracing::info!(job, %uuid, "Running cleanup job");
    match sqlx::query(sql).execute(pool).await {
        Ok(r) => {
            tracing::info!(job, %uuid, deleted = r.rows_affected(), "Cleanup job finished");
        }
        Err(e) => {
            tracing::error!(job, %uuid, "Cleanup job failed: {:?}", e);
        }
    }
}

impl DBClient {
    /// Registers the cleanup jobs and starts the scheduler. Does not block;
    /// the returned scheduler must be kept alive.
    pub async fn start_cleanup_task(&self) -> Result<JobScheduler, JobSchedulerError> {
        let sched = JobScheduler::new().await?;

        let pool = self.pool.clone();
        let users = Job::new_async(PURGE_USERS_AT, move |uuid, _l| {
            let pool = pool.clone();
            Box::pin(async move {
                run_cleanup(
                    &pool,
                    "purge_unverified_users",
                    uuid,
                    "DELETE FROM users WHERE is_verified = FALSE AND token_expires_at < NOW()",
                )
                .await;
            })
        })?;

        let pool = self.pool.clone();
        let tokens = Job::new_async(PURGE_TOKENS_AT, move |uuid, _l| {
            let pool = pool.clone();
            Box::pin(async move {
                run_cleanup(
                    &pool,
                    "purge_refresh_tokens",
                    uuid,
                    "DELETE FROM refresh_tokens WHERE expires_at < NOW() OR revoked_at < NOW() - INTERVAL '1 day'",
                )
                .await;
            })
        })?;

        sched.add(users).await?;
        sched.add(tokens).await?;
        sched.start().await?;
        Ok(sched)
    }
}
