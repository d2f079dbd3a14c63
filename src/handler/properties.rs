use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use tracing::instrument;
use validator::Validate;

use crate::{
    AppState,
    cache::property_key,
    db::{FavoriteExt, LocationExt, MediaExt, PropertyExt, UserExt},
    dtos::{
        CreatePropertyDto, FavoriteToggleResponseDto, LocationNameDto, PaginationDto, PropertyCardDto,
        PropertyDetailDto, PropertyFilters, PropertyListResponseDto, PropertyResponseDto,
        UpdatePropertyDto,
    },
    error::{ErrorMessage, HttpError},
    handler::{media as media_handler, server_error},
    media,
    middleware::{JWTAuthMiddleware, Viewer, auth, optional_auth},
    models::{LocationLevel, MediaModel, Property, PropertyStatus, User},
    policy,
    utils::text::{excerpt, next_available_slug, sanitize_html, slugify},
};

const EXCERPT_CHARS: usize = 160;

pub fn property_handler(app_state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(search_properties))
        .route("/{property}", get(get_property))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            optional_auth,
        ));

    let protected = Router::new()
        .route("/", post(create_property))
        .route("/{property}", put(update_property).delete(delete_property))
        .route("/{property}/favorite", post(toggle_favorite))
        .route(
            "/{property}/media",
            post(media_handler::upload_media)
                .layer(DefaultBodyLimit::max(app_state.env.max_upload_bytes * 2)),
        )
        .route("/{property}/media/order", put(media_handler::reorder_media))
        .route(
            "/{property}/media/{media_id}",
            axum::routing::delete(media_handler::delete_media),
        )
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth));

    public.merge(protected)
}

/// Fills in the excerpt and turns the main image path into a public URL.
pub(crate) fn present_cards(app_state: &AppState, cards: Vec<PropertyCardDto>) -> Vec<PropertyCardDto> {
    cards
        .into_iter()
        .map(|mut card| {
            card.excerpt = excerpt(&card.description, EXCERPT_CHARS);
            card.main_image = card.main_image.map(|path| app_state.storage.url(&path));
            card
        })
        .collect()
}

pub(crate) fn list_response(
    app_state: &AppState,
    cards: Vec<PropertyCardDto>,
    page: i64,
    per_page: i64,
    total: i64,
) -> PropertyListResponseDto {
    PropertyListResponseDto {
        status: "success".to_string(),
        data: present_cards(app_state, cards),
        pagination: PaginationDto::new(page, per_page, total),
    }
}

/// 404 when the listing does not exist.
pub(crate) async fn find_property(app_state: &AppState, id: i64) -> Result<Property, HttpError> {
    app_state
        .db_client
        .get_property(id)
        .await
        .map_err(|e| server_error(app_state, "DB error, getting property", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PropertyNotFound.to_string()))
}

/// Loads a listing the user is allowed to modify.
pub(crate) async fn find_writable_property(
    app_state: &AppState,
    user: &User,
    id: i64,
) -> Result<Property, HttpError> {
    let property = find_property(app_state, id).await?;
    policy::ensure_can_modify(user, &property)?;
    Ok(property)
}

async fn unique_slug(
    app_state: &AppState,
    title: &str,
    except_id: Option<i64>,
) -> Result<String, HttpError> {
    let base = slugify(title);
    let taken = app_state
        .db_client
        .slugs_like(&base, except_id)
        .await
        .map_err(|e| server_error(app_state, "DB error, checking slugs", e))?;
    Ok(next_available_slug(&base, &taken))
}

async fn location_name(
    app_state: &AppState,
    level: LocationLevel,
    id: Option<i32>,
) -> Result<Option<LocationNameDto>, HttpError> {
    let Some(id) = id else {
        return Ok(None);
    };
    app_state
        .db_client
        .location_name(level, id)
        .await
        .map_err(|e| server_error(app_state, "DB error, loading location", e))
}

async fn build_detail(app_state: &AppState, property: Property) -> Result<PropertyDetailDto, HttpError> {
    let db = &app_state.db_client;
    let fail = |e: sqlx::Error| server_error(app_state, "DB error, loading property detail", e);

    let owner = db
        .get_owner(property.user_id)
        .await
        .map_err(fail)?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PropertyNotFound.to_string()))?;
    let media = db
        .media_for(MediaModel::Property, &property.id.to_string())
        .await
        .map_err(fail)?
        .iter()
        .map(|m| media::to_dto(&app_state.storage, m))
        .collect();
    let terms = db.property_terms(&property).await.map_err(fail)?;

    let governorate = location_name(app_state, LocationLevel::Governorates, property.governorate_id).await?;
    let city = location_name(app_state, LocationLevel::Cities, property.city_id).await?;
    let neighborhood =
        location_name(app_state, LocationLevel::Neighborhoods, property.neighborhood_id).await?;

    Ok(PropertyDetailDto {
        property,
        owner,
        media,
        terms,
        governorate,
        city,
        neighborhood,
        is_favorited: None,
    })
}

/// Public search over visible listings, served from the cache when the
/// same normalized filter set was answered under the current generation.
#[instrument(skip(app_state))]
pub async fn search_properties(
    State(app_state): State<AppState>,
    Query(filters): Query<PropertyFilters>,
) -> Result<impl IntoResponse, HttpError> {
    filters.validate()?;

    if let Some(cached) = app_state
        .cache
        .get_search::<PropertyListResponseDto>(&filters)
        .await
    {
        return Ok(Json(cached));
    }

    let (cards, total) = app_state
        .db_client
        .search_properties(&filters)
        .await
        .map_err(|e| server_error(&app_state, "DB error, searching properties", e))?;

    let response = list_response(&app_state, cards, filters.page(), filters.per_page(), total);
    app_state.cache.put_search(&filters, &response).await;

    Ok(Json(response))
}

/// Detail by slug. Hidden listings 404 unless the viewer owns them or is
/// staff; only publicly visible details are cached.
#[instrument(skip(app_state, viewer))]
pub async fn get_property(
    State(app_state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let key = property_key(&slug);

    let mut detail = match app_state.cache.get::<PropertyDetailDto>(&key).await {
        Some(detail) => detail,
        None => {
            let property = app_state
                .db_client
                .get_property_by_slug(&slug)
                .await
                .map_err(|e| server_error(&app_state, "DB error, getting property", e))?
                .filter(|p| p.is_visible_to(viewer.user()))
                .ok_or_else(|| HttpError::not_found(ErrorMessage::PropertyNotFound.to_string()))?;

            let public = property.is_publicly_visible();
            let detail = build_detail(&app_state, property).await?;
            if public {
                app_state.cache.put(&key, &detail).await;
            }
            detail
        }
    };

    let is_owner = viewer
        .user()
        .is_some_and(|user| detail.property.is_owned_by(user));
    if !is_owner {
        if let Err(e) = app_state.db_client.increment_views(detail.property.id).await {
            tracing::warn!(property_id = detail.property.id, "Failed to count view: {}", e);
        }
    }

    if let Some(user) = viewer.user() {
        let favorited = app_state
            .db_client
            .is_favorited(user.id, detail.property.id)
            .await
            .map_err(|e| server_error(&app_state, "DB error, checking favorite", e))?;
        detail.is_favorited = Some(favorited);
    }

    Ok(Json(PropertyResponseDto {
        status: "success".to_string(),
        data: detail,
    }))
}

#[instrument(skip(app_state, auth, body), fields(user_id = %auth.user.id))]
pub async fn create_property(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<CreatePropertyDto>,
) -> Result<impl IntoResponse, HttpError> {
    policy::ensure_can_create(&auth.user)?;
    body.validate()?;

    // Owners submit for review, only staff publish directly
    let status = if auth.user.user_type.is_staff() {
        body.status.unwrap_or(PropertyStatus::Active)
    } else if body.status == Some(PropertyStatus::Draft) {
        PropertyStatus::Draft
    } else {
        PropertyStatus::Pending
    };

    let slug = unique_slug(&app_state, &body.title, None).await?;
    let description = sanitize_html(&body.description);

    let property = app_state
        .db_client
        .create_property(auth.user.id, &body, &slug, &description, status)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                HttpError::unique_constraint_violation("A listing with this title was just created, please retry")
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                HttpError::unprocessable("Unknown location or taxonomy id")
            }
            e => server_error(&app_state, "DB error, creating property", e),
        })?;

    app_state.cache.invalidate_listing(&[&property.slug]).await;

    tracing::info!(property_id = property.id, slug = %property.slug, "Property created");
    Ok((
        StatusCode::CREATED,
        Json(PropertyResponseDto {
            status: "success".to_string(),
            data: property,
        }),
    ))
}

#[instrument(skip(app_state, auth, body), fields(user_id = %auth.user.id))]
pub async fn update_property(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePropertyDto>,
) -> Result<impl IntoResponse, HttpError> {
    let existing = find_writable_property(&app_state, &auth.user, id).await?;
    body.validate()?;

    if let Some(status) = body.status {
        policy::ensure_status_allowed(&auth.user, status)?;
    }

    let slug = match body.title.as_deref() {
        Some(title) if title.trim() != existing.title => {
            Some(unique_slug(&app_state, title, Some(id)).await?)
        }
        _ => None,
    };
    let description = body.description.as_deref().map(sanitize_html);

    let property = app_state
        .db_client
        .update_property(id, &body, slug.as_deref(), description.as_deref())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                HttpError::unprocessable("Unknown location or taxonomy id")
            }
            e => server_error(&app_state, "DB error, updating property", e),
        })?;

    app_state
        .cache
        .invalidate_listing(&[&existing.slug, &property.slug])
        .await;

    tracing::info!(property_id = id, "Property updated");
    Ok(Json(PropertyResponseDto {
        status: "success".to_string(),
        data: property,
    }))
}

/// Deletes the listing together with its stored media.
pub(crate) async fn remove_property(app_state: &AppState, property: &Property) -> Result<(), HttpError> {
    media::purge_property_media(&app_state.db_client, &app_state.storage, property.id)
        .await
        .map_err(|e| server_error(app_state, "DB error, deleting media", e))?;

    app_state
        .db_client
        .delete_property(property.id)
        .await
        .map_err(|e| server_error(app_state, "DB error, deleting property", e))?;

    app_state.cache.invalidate_listing(&[&property.slug]).await;
    Ok(())
}

#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn delete_property(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let property = find_writable_property(&app_state, &auth.user, id).await?;
    remove_property(&app_state, &property).await?;

    tracing::info!(property_id = id, "Property deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn toggle_favorite(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let property = find_property(&app_state, id).await?;
    if !property.is_publicly_visible() {
        return Err(HttpError::not_found(ErrorMessage::PropertyNotFound.to_string()));
    }

    let favorited = app_state
        .db_client
        .toggle_favorite(auth.user.id, id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, toggling favorite", e))?;

    Ok(Json(FavoriteToggleResponseDto {
        status: "success".to_string(),
        favorited,
    }))
}
