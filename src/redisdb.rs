use redis::{AsyncCommands, RedisResult, aio::ConnectionManager};
use std::net::IpAddr;

/// Window of the per-IP login counter.
pub const IP_WINDOW_SECS: i64 = 24 * 60 * 60;
/// Window of the per email+IP login counter.
pub const EMAIL_IP_WINDOW_SECS: i64 = 60 * 60;

pub fn ip_attempts_key(ip: IpAddr) -> String {
    format!("login:ip:{}", ip)
}

pub fn email_ip_attempts_key(ip: IpAddr, email: &str) -> String {
    format!("login:email:{}:{}", email.trim().to_lowercase(), ip)
}

#[derive(Clone)]
pub struct RedisClient {
    pub conn: ConnectionManager,
}

impl RedisClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn get_string(&self, key: &str) -> RedisResult<Option<String>> {
        // ConnectionManager clones share one multiplexed connection
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn set_string(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl_secs).await
    }

    pub async fn delete(&self, keys: &[String]) -> RedisResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await
    }

    pub async fn get_counter(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    pub async fn incr(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await
    }

    pub async fn get_ip_attempts(&self, ip: IpAddr) -> RedisResult<i64> {
        self.get_counter(&ip_attempts_key(ip)).await
    }

    pub async fn get_email_ip_attempts(&self, ip: IpAddr, email: &str) -> RedisResult<i64> {
        self.get_counter(&email_ip_attempts_key(ip, email)).await
    }

    /// Counts a failed login against both windows. Each window starts with
    /// its first failure.
    pub async fn increment_attempts(&self, ip: IpAddr, email: &str) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        for (key, window) in [
            (ip_attempts_key(ip), IP_WINDOW_SECS),
            (email_ip_attempts_key(ip, email), EMAIL_IP_WINDOW_SECS),
        ] {
            let count: i64 = conn.incr(&key, 1).await?;
            if count == 1 {
                let _: () = conn.expire(&key, window).await?;
            }
        }
        Ok(())
    }

    pub async fn clear_email_ip_attempts(&self, ip: IpAddr, email: &str) -> RedisResult<()> {
        self.delete(&[email_ip_attempts_key(ip, email)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_keys_normalize_email() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        assert_eq!(ip_attempts_key(ip), "login:ip:10.0.0.7");
        assert_eq!(
            email_ip_attempts_key(ip, "  Ava@Example.COM "),
            "login:email:ava@example.com:10.0.0.7"
        );
    }
}
