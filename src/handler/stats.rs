use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use tracing::instrument;

use crate::{
    AppState,
    cache::{STATS_OVERVIEW, STATS_PRICE_RANGES, stats_key},
    db::StatsExt,
    dtos::{PriceRangeDto, PropertyResponseDto, StatsOverviewDto},
    error::HttpError,
    handler::server_error,
};

pub fn stats_handler() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/price-ranges", get(price_ranges))
}

#[instrument(skip(app_state))]
pub async fn overview(State(app_state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let key = stats_key(STATS_OVERVIEW);
    let data = match app_state.cache.get::<StatsOverviewDto>(&key).await {
        Some(cached) => cached,
        None => {
            let fresh = app_state
                .db_client
                .stats_overview()
                .await
                .map_err(|e| server_error(&app_state, "DB error, stats overview", e))?;
            app_state.cache.put(&key, &fresh).await;
            fresh
        }
    };

    Ok(Json(PropertyResponseDto {
        status: "success".to_string(),
        data,
    }))
}

#[instrument(skip(app_state))]
pub async fn price_ranges(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let key = stats_key(STATS_PRICE_RANGES);
    let data = match app_state.cache.get::<Vec<PriceRangeDto>>(&key).await {
        Some(cached) => cached,
        None => {
            let fresh = app_state
                .db_client
                .price_ranges()
                .await
                .map_err(|e| server_error(&app_state, "DB error, price ranges", e))?;
            app_state.cache.put(&key, &fresh).await;
            fresh
        }
    };

    Ok(Json(PropertyResponseDto {
        status: "success".to_string(),
        data,
    }))
}
