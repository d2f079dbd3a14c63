//! Cache-aside layer over Redis for listing reads.
//!
//! Keys:
//! - `property:{slug}` detail payloads
//! - `properties:search:{generation}:{filters-json}` search pages
//! - `stats:{name}` public aggregates
//!
//! Search pages are never deleted one by one. Any listing write bumps the
//! generation counter, which orphans every older search key until its TTL
//! runs out.

use serde::{Serialize, de::DeserializeOwned};

use crate::dtos::PropertyFilters;
use crate::redisdb::RedisClient;

pub const SEARCH_GENERATION_KEY: &str = "properties:search:generation";
pub const STATS_OVERVIEW: &str = "overview";
pub const STATS_PRICE_RANGES: &str = "price-ranges";

pub fn property_key(slug: &str) -> String {
    format!("property:{}", slug)
}

pub fn stats_key(name: &str) -> String {
    format!("stats:{}", name)
}

/// Equivalent filter sets produce the same key.
pub fn search_key(generation: i64, filters: &PropertyFilters) -> String {
    let normalized = filters.normalized();
    let json = serde_json::to_string(&normalized).unwrap_or_default();
    format!("properties:search:{}:{}", generation, json)
}

/// What a listing write clears: detail and stats keys to delete, plus the
/// counter whose bump retires every cached search page.
#[derive(Debug, PartialEq)]
pub struct Invalidation {
    pub delete: Vec<String>,
    pub bump: &'static str,
}

pub fn listing_invalidation(slugs: &[&str]) -> Invalidation {
    let mut delete: Vec<String> = Vec::with_capacity(slugs.len() + 2);
    for slug in slugs {
        let key = property_key(slug);
        if !delete.contains(&key) {
            delete.push(key);
        }
    }
    delete.push(stats_key(STATS_OVERVIEW));
    delete.push(stats_key(STATS_PRICE_RANGES));

    Invalidation {
        delete,
        bump: SEARCH_GENERATION_KEY,
    }
}

#[derive(Clone)]
pub struct PropertyCache {
    redis: RedisClient,
    ttl_secs: u64,
}

impl PropertyCache {
    pub fn new(redis: RedisClient, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    /// Redis or decode failures are logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.redis.get_string(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, "Cache read failed: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, "Dropping undecodable cache entry: {}", e);
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, "Cache encode failed: {}", e);
                return;
            }
        };
        if let Err(e) = self.redis.set_string(key, &raw, self.ttl_secs).await {
            tracing::warn!(key, "Cache write failed: {}", e);
        }
    }

    pub async fn forget(&self, keys: &[String]) {
        if let Err(e) = self.redis.delete(keys).await {
            tracing::warn!(?keys, "Cache delete failed: {}", e);
        }
    }

    pub async fn search_generation(&self) -> i64 {
        self.redis
            .get_counter(SEARCH_GENERATION_KEY)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Reading search generation failed: {}", e);
                0
            })
    }

    pub async fn get_search<T: DeserializeOwned>(&self, filters: &PropertyFilters) -> Option<T> {
        let generation = self.search_generation().await;
        self.get(&search_key(generation, filters)).await
    }

    pub async fn put_search<T: Serialize>(&self, filters: &PropertyFilters, value: &T) {
        let generation = self.search_generation().await;
        self.put(&search_key(generation, filters), value).await;
    }

    /// Call after any write that can change what a listing read returns.
    /// `slugs` should include the old slug when it changed.
    pub async fn invalidate_listing(&self, slugs: &[&str]) {
        let plan = listing_invalidation(slugs);
        self.forget(&plan.delete).await;

        if let Err(e) = self.redis.incr(plan.bump).await {
            tracing::error!("Bumping search generation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::PropertySort;

    #[test]
    fn equivalent_searches_share_a_key() {
        let a = PropertyFilters {
            q: Some(" Erbil ".into()),
            amenities: Some("3,1".into()),
            ..Default::default()
        };
        let b = PropertyFilters {
            q: Some("erbil".into()),
            amenities: Some("1,3".into()),
            sort: Some(PropertySort::Newest),
            page: Some(1),
            ..Default::default()
        };
        assert_eq!(search_key(4, &a), search_key(4, &b));
    }

    #[test]
    fn generation_bump_changes_every_search_key() {
        let filters = PropertyFilters::default();
        assert_ne!(search_key(1, &filters), search_key(2, &filters));
        assert!(search_key(7, &filters).starts_with("properties:search:7:"));
    }

    #[test]
    fn slug_change_clears_old_and_new_detail() {
        let plan = listing_invalidation(&["old-flat", "new-flat"]);
        assert_eq!(
            plan.delete,
            [
                "property:old-flat",
                "property:new-flat",
                "stats:overview",
                "stats:price-ranges"
            ]
        );
        assert_eq!(plan.bump, SEARCH_GENERATION_KEY);
    }

    #[test]
    fn unchanged_slug_is_cleared_once() {
        let plan = listing_invalidation(&["flat", "flat"]);
        assert_eq!(plan.delete.iter().filter(|k| *k == "property:flat").count(), 1);
        assert_eq!(plan.delete.len(), 3);
    }

    #[test]
    fn detail_and_stats_keys() {
        assert_eq!(property_key("sunny-flat"), "property:sunny-flat");
        assert_eq!(stats_key(STATS_OVERVIEW), "stats:overview");
    }
}
