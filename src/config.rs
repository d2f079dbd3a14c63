use std::str::FromStr;

/// Where uploaded media ends up
#[derive(Debug, Clone, PartialEq)]
pub enum MediaDisk {
    Local,
    Bunny,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub refresh_token_maxage: i64,
    pub redis_url: String,
    pub port: u16,
    pub frontend_url: String,
    pub debug: bool,
    pub cache_ttl_seconds: u64,
    pub media_disk: MediaDisk,
    pub media_root: String,
    pub media_public_url: String,
    pub bunny_storage_zone: Option<String>,
    pub bunny_storage_host: String,
    pub bunny_access_key: Option<String>,
    pub max_upload_bytes: usize,
    pub upload_tmp_dir: String,
    pub upload_chunk_size: usize,
    pub smtp: Option<SmtpConfig>,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");

        let media_disk = match std::env::var("MEDIA_DISK").as_deref() {
            Ok("bunny") => MediaDisk::Bunny,
            _ => MediaDisk::Local,
        };

        // Mail stays off unless a relay is configured
        let smtp = std::env::var("SMTP_SERVER").ok().map(|server| {
            let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
            SmtpConfig {
                server,
                port: var_or("SMTP_PORT", 587),
                from: std::env::var("MAIL_FROM").unwrap_or_else(|_| username.clone()),
                username,
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            }
        });

        Config {
            database_url,
            db_max_connections: var_or("DB_MAX_CONNECTIONS", 10),
            jwt_secret,
            jwt_maxage: var_or("JWT_MAXAGE", 900),
            refresh_token_maxage: var_or("REFRESH_TOKEN_MAXAGE", 604_800),
            redis_url,
            port: var_or("PORT", 8000),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:3000".to_string()),
            debug: var_or("APP_DEBUG", false),
            cache_ttl_seconds: var_or("CACHE_TTL_SECONDS", 600),
            media_disk,
            media_root: var_or("MEDIA_ROOT", "./storage/media".to_string()),
            media_public_url: var_or("MEDIA_PUBLIC_URL", "http://localhost:8000/media".to_string()),
            bunny_storage_zone: std::env::var("BUNNY_STORAGE_ZONE").ok(),
            bunny_storage_host: var_or("BUNNY_STORAGE_HOST", "storage.bunnycdn.com".to_string()),
            bunny_access_key: std::env::var("BUNNY_ACCESS_KEY").ok(),
            max_upload_bytes: var_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            upload_tmp_dir: var_or("UPLOAD_TMP_DIR", "./storage/chunks".to_string()),
            upload_chunk_size: var_or("UPLOAD_CHUNK_SIZE", 2 * 1024 * 1024),
            smtp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_or_falls_back_on_missing_or_garbage() {
        assert_eq!(var_or("LISTING_BACKEND_TEST_UNSET_VAR", 42u16), 42);
        unsafe { std::env::set_var("LISTING_BACKEND_TEST_BAD_PORT", "not-a-port") };
        assert_eq!(var_or("LISTING_BACKEND_TEST_BAD_PORT", 8000u16), 8000);
        unsafe { std::env::set_var("LISTING_BACKEND_TEST_GOOD_PORT", "9100") };
        assert_eq!(var_or("LISTING_BACKEND_TEST_GOOD_PORT", 8000u16), 9100);
    }
}
