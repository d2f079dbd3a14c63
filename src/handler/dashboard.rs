use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use tracing::instrument;
use validator::Validate;

use crate::{
    AppState,
    db::{FavoriteExt, PropertyExt, StatsExt},
    dtos::{DEFAULT_PER_PAGE, DashboardPropertiesQuery, PageQueryDto, PropertyResponseDto},
    error::HttpError,
    handler::{properties::list_response, server_error},
    middleware::JWTAuthMiddleware,
};

pub fn dashboard_handler() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/properties", get(my_properties))
        .route("/favorites", get(my_favorites))
}

#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn overview(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let data = app_state
        .db_client
        .dashboard_overview(auth.user.id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, dashboard overview", e))?;

    Ok(Json(PropertyResponseDto {
        status: "success".to_string(),
        data,
    }))
}

/// Own listings in every status, newest first.
#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn my_properties(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Query(query): Query<DashboardPropertiesQuery>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);

    let (cards, total) = app_state
        .db_client
        .list_user_properties(auth.user.id, query.status, page, per_page)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing own properties", e))?;

    Ok(Json(list_response(&app_state, cards, page, per_page, total)))
}

#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn my_favorites(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Query(query): Query<PageQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);

    let (cards, total) = app_state
        .db_client
        .list_favorites(auth.user.id, page, per_page)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing favorites", e))?;

    Ok(Json(list_response(&app_state, cards, page, per_page, total)))
}
