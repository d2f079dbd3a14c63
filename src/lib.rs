pub mod cache;
pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handler;
pub mod mail;
pub mod media;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod redisdb;
pub mod routes;
pub mod storage;
pub mod tracing_config;
pub mod uploads;
pub mod utils;

use axum_client_ip::ClientIpSource;
use std::sync::Arc;

use cache::PropertyCache;
use config::Config;
use db::DBClient;
use redisdb::RedisClient;
use storage::Storage;
use uploads::ChunkStore;

#[derive(Clone)]
pub struct AppState {
    pub env: Arc<Config>,
    pub db_client: DBClient,
    pub redis_client: RedisClient,
    pub cache: PropertyCache,
    pub storage: Storage,
    pub chunks: ChunkStore,
    pub ip_extraction: ClientIpSource,
}
