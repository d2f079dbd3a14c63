use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::instrument;
use validator::Validate;

use crate::{
    AppState,
    db::MediaExt,
    dtos::{ListResponseDto, MediaCollection, MediaOrderDto, PropertyResponseDto},
    error::HttpError,
    handler::{properties::find_writable_property, server_error},
    media::{self, Upload},
    middleware::JWTAuthMiddleware,
    models::MediaModel,
};

/// Multipart upload: one `collection` field (`main_image` | `images`,
/// default `images`) and one or more `file` fields.
#[instrument(skip(app_state, auth, multipart), fields(user_id = %auth.user.id))]
pub async fn upload_media(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let property = find_writable_property(&app_state, &auth.user, id).await?;

    let mut collection = MediaCollection::Images;
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "collection" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| HttpError::bad_request(e.to_string()))?;
                collection = MediaCollection::parse(value.trim()).ok_or_else(|| {
                    HttpError::field("collection", "Collection must be main_image or images")
                })?;
            }
            "file" | "files" | "files[]" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::warn!("Reading upload failed: {}", e);
                    HttpError::field("file", "The upload could not be read")
                })?;
                uploads.push(Upload {
                    file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(HttpError::field("file", "At least one file is required"));
    }
    if collection == MediaCollection::MainImage && uploads.len() > 1 {
        return Err(HttpError::field("file", "The main image takes a single file"));
    }

    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let item = media::attach_to_property(
            &app_state.db_client,
            &app_state.storage,
            property.id,
            collection,
            upload,
            app_state.env.max_upload_bytes,
        )
        .await
        .map_err(|e| e.into_http(app_state.env.debug))?;
        stored.push(media::to_dto(&app_state.storage, &item));
    }

    app_state.cache.invalidate_listing(&[&property.slug]).await;

    Ok((
        StatusCode::CREATED,
        Json(ListResponseDto {
            status: "success".to_string(),
            data: stored,
        }),
    ))
}

#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn delete_media(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path((id, media_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, HttpError> {
    let property = find_writable_property(&app_state, &auth.user, id).await?;

    let item = app_state
        .db_client
        .get_media(media_id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, getting media", e))?
        .ok_or_else(|| HttpError::not_found("Media not found"))?;
    media::ensure_belongs(&item, property.id)?;

    if let Some(removed) = app_state
        .db_client
        .delete_media(media_id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, deleting media", e))?
    {
        media::delete_files(&app_state.storage, &removed).await;
    }

    app_state.cache.invalidate_listing(&[&property.slug]).await;

    tracing::info!(property_id = id, media_id, "Media deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Sets display order from the position of each id in the body.
#[instrument(skip(app_state, auth, body), fields(user_id = %auth.user.id))]
pub async fn reorder_media(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
    Json(body): Json<MediaOrderDto>,
) -> Result<impl IntoResponse, HttpError> {
    let property = find_writable_property(&app_state, &auth.user, id).await?;
    body.validate()?;

    let model_id = property.id.to_string();
    app_state
        .db_client
        .reorder_media(MediaModel::Property, &model_id, &body.ids)
        .await
        .map_err(|e| server_error(&app_state, "DB error, reordering media", e))?;

    let items = app_state
        .db_client
        .media_for(MediaModel::Property, &model_id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, loading media", e))?;

    app_state.cache.invalidate_listing(&[&property.slug]).await;

    Ok(Json(PropertyResponseDto {
        status: "success".to_string(),
        data: items
            .iter()
            .map(|m| media::to_dto(&app_state.storage, m))
            .collect::<Vec<_>>(),
    }))
}
