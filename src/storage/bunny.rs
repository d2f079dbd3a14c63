use super::{StorageBackend, StorageError, join_url, validate_path};
use async_trait::async_trait;
use reqwest::StatusCode;

/// Bunny CDN storage zone. Uploads are `PUT https://{host}/{zone}/{path}`
/// with the zone password in the `AccessKey` header; files are served from
/// the pull zone at `public_url`.
#[derive(Clone)]
pub struct BunnyStorage {
    http: reqwest::Client,
    host: String,
    zone: String,
    access_key: String,
    public_url: String,
}

impl BunnyStorage {
    pub fn new(
        http: reqwest::Client,
        host: String,
        zone: String,
        access_key: String,
        public_url: String,
    ) -> Self {
        Self {
            http,
            host,
            zone,
            access_key,
            public_url,
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "https://{}/{}/{}",
            self.host.trim_end_matches('/'),
            self.zone,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl StorageBackend for BunnyStorage {
    fn disk(&self) -> &'static str {
        "bunny"
    }

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        validate_path(path)?;
        let response = self
            .http
            .put(self.endpoint(path))
            .header("AccessKey", &self.access_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(path, %status, "Bunny upload failed: {}", body);
            return Err(StorageError::Remote(format!("upload returned {}", status)));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        validate_path(path)?;
        let response = self
            .http
            .delete(self.endpoint(path))
            .header("AccessKey", &self.access_key)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(StorageError::Remote(format!("delete returned {}", s))),
        }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.public_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_includes_zone() {
        let storage = BunnyStorage::new(
            reqwest::Client::new(),
            "storage.bunnycdn.com".into(),
            "listings".into(),
            "secret".into(),
            "https://listings.b-cdn.net".into(),
        );
        assert_eq!(
            storage.endpoint("properties/1/u/a.jpg"),
            "https://storage.bunnycdn.com/listings/properties/1/u/a.jpg"
        );
        assert_eq!(
            storage.url("properties/1/u/a.jpg"),
            "https://listings.b-cdn.net/properties/1/u/a.jpg"
        );
    }
}
