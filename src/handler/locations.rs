use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use tracing::instrument;

use crate::{
    AppState,
    db::LocationExt,
    dtos::{ListResponseDto, LocationDto, LocationQuery},
    error::HttpError,
    handler::server_error,
    models::LocationLevel,
};

pub fn location_handler() -> Router<AppState> {
    Router::new()
        .route("/states", get(get_states))
        .route("/cities", get(get_cities))
        .route("/neighborhoods", get(get_neighborhoods))
}

async fn active_locations(
    app_state: &AppState,
    level: LocationLevel,
    parent_id: Option<i32>,
    query: &LocationQuery,
) -> Result<Json<ListResponseDto<LocationDto>>, HttpError> {
    let lang = query.lang.unwrap_or_default();
    let rows = app_state
        .db_client
        .get_locations(level, parent_id, true)
        .await
        .map_err(|e| server_error(app_state, "DB error, listing locations", e))?;

    Ok(Json(ListResponseDto {
        status: "success".to_string(),
        data: rows.iter().map(|l| LocationDto::localize(l, lang)).collect(),
    }))
}

#[instrument(skip(app_state))]
pub async fn get_states(
    State(app_state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, HttpError> {
    active_locations(&app_state, LocationLevel::Governorates, None, &query).await
}

/// Every active city, or only those of `state_id`.
#[instrument(skip(app_state))]
pub async fn get_cities(
    State(app_state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, HttpError> {
    active_locations(&app_state, LocationLevel::Cities, query.state_id, &query).await
}

#[instrument(skip(app_state))]
pub async fn get_neighborhoods(
    State(app_state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, HttpError> {
    active_locations(&app_state, LocationLevel::Neighborhoods, query.city_id, &query).await
}
