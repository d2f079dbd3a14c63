use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    dtos::{ChunkAcceptedDto, InitUploadDto, PropertyResponseDto, UploadSessionDto},
    error::{ErrorMessage, HttpError},
    handler::{properties::find_writable_property, server_error},
    media::{self, MediaError, Upload, classify},
    middleware::JWTAuthMiddleware,
    uploads::{UploadMeta, store::ChunkError},
};

pub fn upload_handler(app_state: AppState) -> Router<AppState> {
    // Room for one chunk plus slack
    let chunk_limit = app_state.chunks.chunk_size() as usize + 64 * 1024;

    Router::new()
        .route("/", post(init_upload))
        .route(
            "/{upload_id}/chunks/{index}",
            put(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/{upload_id}/complete", post(complete_upload))
}

fn chunk_error(app_state: &AppState, e: ChunkError) -> HttpError {
    match e {
        ChunkError::IndexOutOfRange { .. } | ChunkError::WrongLength { .. } => {
            HttpError::field("chunk", e.to_string())
        }
        ChunkError::Incomplete(missing) => {
            let list = missing
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            HttpError::field("chunks", format!("Missing chunks: {}", list))
        }
        other => server_error(app_state, "Chunk store error", other),
    }
}

/// Sessions are private to the user who opened them.
async fn load_session(
    app_state: &AppState,
    user_id: Uuid,
    upload_id: Uuid,
) -> Result<UploadMeta, HttpError> {
    app_state
        .chunks
        .load(upload_id)
        .await
        .map_err(|e| chunk_error(app_state, e))?
        .filter(|meta| meta.user_id == user_id)
        .ok_or_else(|| HttpError::not_found(ErrorMessage::ResourceNotFound.to_string()))
}

#[instrument(skip(app_state, auth, body), fields(user_id = %auth.user.id))]
pub async fn init_upload(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<InitUploadDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;
    find_writable_property(&app_state, &auth.user, body.property_id).await?;

    if classify(&body.mime_type).is_none() {
        return Err(MediaError::UnsupportedType(body.mime_type).into_http(app_state.env.debug));
    }
    if body.size > app_state.env.max_upload_bytes as u64 {
        return Err(MediaError::TooLarge(app_state.env.max_upload_bytes).into_http(app_state.env.debug));
    }

    let (upload_id, meta) = app_state
        .chunks
        .init(
            auth.user.id,
            body.property_id,
            body.collection,
            body.file_name,
            body.mime_type,
            body.size,
        )
        .await
        .map_err(|e| chunk_error(&app_state, e))?;

    tracing::info!(%upload_id, property_id = meta.property_id, total_chunks = meta.total_chunks, "Upload session opened");
    Ok((
        StatusCode::CREATED,
        Json(UploadSessionDto {
            upload_id,
            chunk_size: meta.chunk_size,
            total_chunks: meta.total_chunks,
        }),
    ))
}

#[instrument(skip(app_state, auth, body), fields(user_id = %auth.user.id, len = body.len()))]
pub async fn upload_chunk(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path((upload_id, index)): Path<(Uuid, u64)>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let meta = load_session(&app_state, auth.user.id, upload_id).await?;

    let received = app_state
        .chunks
        .put_chunk(upload_id, &meta, index, &body)
        .await
        .map_err(|e| chunk_error(&app_state, e))?;

    Ok(Json(ChunkAcceptedDto {
        status: "success".to_string(),
        received,
        total_chunks: meta.total_chunks,
    }))
}

/// Assembles the chunks and runs the file through the media pipeline.
/// The session is discarded once the media is stored.
#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn complete_upload(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let meta = load_session(&app_state, auth.user.id, upload_id).await?;
    // Ownership could have changed since the session was opened
    let property = find_writable_property(&app_state, &auth.user, meta.property_id).await?;

    let bytes = app_state
        .chunks
        .assemble(upload_id, &meta)
        .await
        .map_err(|e| chunk_error(&app_state, e))?;

    let item = media::attach_to_property(
        &app_state.db_client,
        &app_state.storage,
        property.id,
        meta.collection,
        Upload {
            file_name: meta.file_name,
            mime_type: meta.mime_type,
            bytes,
        },
        app_state.env.max_upload_bytes,
    )
    .await
    .map_err(|e| e.into_http(app_state.env.debug))?;

    app_state.chunks.discard(upload_id).await;
    app_state.cache.invalidate_listing(&[&property.slug]).await;

    tracing::info!(%upload_id, media_id = item.id, "Upload completed");
    Ok((
        StatusCode::CREATED,
        Json(PropertyResponseDto {
            status: "success".to_string(),
            data: media::to_dto(&app_state.storage, &item),
        }),
    ))
}
