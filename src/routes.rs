use axum::{Json, Router, middleware, routing::get};
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    AppState,
    config::MediaDisk,
    handler::{
        admin::admin_handler, auth::auth_handler, dashboard::dashboard_handler,
        leads::lead_handler, locations::location_handler, properties::property_handler,
        stats::stats_handler, taxonomies::taxonomy_handler, uploads::upload_handler,
    },
    middleware::auth,
};

pub fn create_router(app_state: AppState) -> Router {
    let api_route = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/auth", auth_handler(app_state.clone()))
        .nest("/properties", property_handler(app_state.clone()))
        .nest(
            "/uploads",
            upload_handler(app_state.clone())
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .nest(
            "/dashboard",
            dashboard_handler().layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .nest("/locations", location_handler())
        .nest("/stats", stats_handler())
        .nest("/taxonomies", taxonomy_handler())
        .nest("/leads", lead_handler())
        .nest("/admin", admin_handler(app_state.clone()));

    let mut router = Router::new()
        .nest("/api/v1", api_route)
        .layer(TraceLayer::new_for_http());

    // Files on the local disk are served by the app itself; Bunny serves its own
    if app_state.env.media_disk == MediaDisk::Local {
        router = router.nest_service("/media", ServeDir::new(&app_state.env.media_root));
    }

    router.with_state(app_state)
}
