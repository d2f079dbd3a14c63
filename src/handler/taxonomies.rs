use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};
use tracing::instrument;

use crate::{
    AppState,
    db::TaxonomyExt,
    dtos::{LangQuery, ListResponseDto, LocalizedTermDto},
    error::{ErrorMessage, HttpError},
    handler::server_error,
    models::TaxonomyKind,
};

pub fn taxonomy_handler() -> Router<AppState> {
    Router::new().route("/{kind}", get(get_terms))
}

/// Maps a path segment such as `document-types` to its kind. Unknown
/// kinds are a 404 rather than a path rejection.
pub(crate) fn parse_kind(segment: &str) -> Result<TaxonomyKind, HttpError> {
    serde_json::from_value(serde_json::Value::String(segment.to_string()))
        .map_err(|_| HttpError::not_found(ErrorMessage::ResourceNotFound.to_string()))
}

#[instrument(skip(app_state))]
pub async fn get_terms(
    State(app_state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<LangQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&kind)?;
    let lang = query.lang.unwrap_or_default();

    let terms = app_state
        .db_client
        .get_terms(kind, true)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing terms", e))?;

    Ok(Json(ListResponseDto {
        status: "success".to_string(),
        data: terms
            .iter()
            .map(|t| LocalizedTermDto::localize(t, lang))
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn path_segments_map_to_kinds() {
        assert_eq!(parse_kind("amenities").ok(), Some(TaxonomyKind::Amenity));
        assert_eq!(parse_kind("document-types").ok(), Some(TaxonomyKind::DocumentType));
        assert_eq!(parse_kind("price-types").ok(), Some(TaxonomyKind::PriceType));
    }

    #[test]
    fn unknown_kind_is_not_found() {
        let err = parse_kind("colors").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
