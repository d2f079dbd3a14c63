use axum::http::{
    HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use axum_client_ip::ClientIpSource;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;

use listing_backend::{
    AppState,
    cache::PropertyCache,
    config::Config,
    db::DBClient,
    redisdb::RedisClient,
    routes, storage,
    tracing_config::init_tracing,
    uploads::ChunkStore,
};

fn fatal(context: &str, e: impl std::fmt::Display) -> ! {
    tracing::error!("{}: {}", context, e);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let _guard = init_tracing();

    let config = Config::init();

    let ip_source = if cfg!(debug_assertions) {
        ClientIpSource::ConnectInfo
    } else {
        ClientIpSource::CfConnectingIp
    };

    let pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(e) => fatal("Failed to connect to the database", e),
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        fatal("Failed to run migrations", e);
    }

    let frontend_origin = match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => origin,
        Err(e) => fatal("FRONTEND_URL is not a valid origin", e),
    };
    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]);

    let db_client = DBClient::new(pool);

    let redis_client = match redis::Client::open(config.redis_url.clone()) {
        Ok(client) => match client.get_connection_manager().await {
            Ok(manager) => RedisClient::new(manager),
            Err(e) => fatal("Failed to connect to Redis", e),
        },
        Err(e) => fatal("Invalid REDIS_URL", e),
    };

    let storage = match storage::from_config(&config, reqwest::Client::new()) {
        Ok(storage) => storage,
        Err(e) => fatal("Failed to set up media storage", e),
    };

    let chunks = ChunkStore::new(config.upload_tmp_dir.clone(), config.upload_chunk_size as u64);

    // Kept alive for the lifetime of the server
    let _scheduler = match db_client.start_cleanup_task().await {
        Ok(sched) => {
            if let Err(e) = chunks.schedule_purge(&sched).await {
                tracing::error!("Failed to schedule the upload purge: {}", e);
            }
            Some(sched)
        }
        Err(e) => {
            tracing::error!("Failed to start the scheduler: {}", e);
            None
        }
    };

    let app_state = AppState {
        env: Arc::new(config.clone()),
        db_client,
        redis_client: redis_client.clone(),
        cache: PropertyCache::new(redis_client, config.cache_ttl_seconds),
        storage,
        chunks,
        ip_extraction: ip_source,
    };

    let app = routes::create_router(app_state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(e) => fatal("Failed to bind the listener", e),
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        fatal("Server error", e);
    }
}
