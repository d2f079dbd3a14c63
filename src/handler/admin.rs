use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    db::{LocationExt, PropertyExt, StatsExt, TaxonomyExt, TokenExt, UserExt},
    dtos::{
        AdminLocationQuery, AdminPropertiesQuery, AdminUsersQuery, BulkAction, BulkActionDto, BulkActionResponseDto,
        FilterUserDto, ListResponseDto, LocationInputDto, PaginationDto, PropertyResponseDto,
        StatusUpdateDto, TermInputDto, UserListResponseDto, UserResponseDto, UserTypeUpdateDto,
    },
    error::{ErrorMessage, HttpError},
    handler::{
        leads::admin_lead_handler,
        properties::{list_response, remove_property},
        server_error,
        taxonomies::parse_kind,
    },
    middleware::{JWTAuthMiddleware, auth, role_check},
    models::{Location, LocationLevel, TaxonomyTerm, User, UserType},
};

pub fn admin_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/reports", get(reports))
        .route("/properties", get(list_properties))
        .route("/properties/bulk", post(bulk_properties))
        .route("/properties/{property}/status", patch(set_property_status))
        .route("/properties/{property}/featured", patch(toggle_featured))
        .route("/users", get(list_users))
        .route("/users/{user}/active", patch(toggle_user_active))
        .route("/users/{user}/verify", patch(verify_user))
        .route("/users/{user}/type", patch(set_user_type))
        .route("/taxonomies/{kind}", get(list_terms).post(create_term))
        .route("/taxonomies/{kind}/{term}", put(update_term).delete(delete_term))
        .route("/locations/{level}", get(list_locations).post(create_location))
        .route(
            "/locations/{level}/{location}",
            put(update_location).delete(delete_location),
        )
        .nest("/leads", admin_lead_handler())
        .route_layer(middleware::from_fn(|req, next| {
            role_check(req, next, UserType::STAFF.to_vec())
        }))
        .route_layer(middleware::from_fn_with_state(app_state, auth))
}

fn success<T>(data: T) -> Json<PropertyResponseDto<T>> {
    Json(PropertyResponseDto {
        status: "success".to_string(),
        data,
    })
}

// ----------------------------------------------------------------------------
// Overview
// ----------------------------------------------------------------------------

#[instrument(skip(app_state))]
pub async fn dashboard(State(app_state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let data = app_state
        .db_client
        .admin_dashboard()
        .await
        .map_err(|e| server_error(&app_state, "DB error, admin dashboard", e))?;
    Ok(success(data))
}

#[instrument(skip(app_state))]
pub async fn reports(State(app_state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let data = app_state
        .db_client
        .reports()
        .await
        .map_err(|e| server_error(&app_state, "DB error, reports", e))?;
    Ok(success(data))
}

// ----------------------------------------------------------------------------
// Properties
// ----------------------------------------------------------------------------

#[instrument(skip(app_state))]
pub async fn list_properties(
    State(app_state): State<AppState>,
    Query(query): Query<AdminPropertiesQuery>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()?;

    let (cards, total) = app_state
        .db_client
        .admin_list_properties(&query)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing properties", e))?;

    Ok(Json(list_response(
        &app_state,
        cards,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(20),
        total,
    )))
}

/// Staff may move a listing into any status, `active` included.
#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn set_property_status(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
    Json(body): Json<StatusUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let property = app_state
        .db_client
        .set_property_status(id, body.status)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating status", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PropertyNotFound.to_string()))?;

    app_state.cache.invalidate_listing(&[&property.slug]).await;

    tracing::info!(property_id = id, status = body.status.to_str(), "Listing status set");
    Ok(success(property))
}

#[instrument(skip(app_state))]
pub async fn toggle_featured(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let property = app_state
        .db_client
        .toggle_featured(id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, toggling featured", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::PropertyNotFound.to_string()))?;

    app_state.cache.invalidate_listing(&[&property.slug]).await;
    Ok(success(property))
}

/// Ids that no longer exist are skipped and not counted.
#[instrument(skip(app_state, body), fields(action = ?body.action, count = body.ids.len()))]
pub async fn bulk_properties(
    State(app_state): State<AppState>,
    Json(body): Json<BulkActionDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;

    let affected = if body.action == BulkAction::Delete {
        let properties = app_state
            .db_client
            .get_properties_by_ids(&body.ids)
            .await
            .map_err(|e| server_error(&app_state, "DB error, loading properties", e))?;
        for property in &properties {
            remove_property(&app_state, property).await?;
        }
        properties.len() as u64
    } else {
        let slugs = app_state
            .db_client
            .bulk_update_properties(&body.ids, body.action)
            .await
            .map_err(|e| server_error(&app_state, "DB error, bulk update", e))?;
        let refs: Vec<&str> = slugs.iter().map(String::as_str).collect();
        app_state.cache.invalidate_listing(&refs).await;
        slugs.len() as u64
    };

    tracing::info!(affected, "Bulk action applied");
    Ok(Json(BulkActionResponseDto {
        status: "success".to_string(),
        affected,
    }))
}

// ----------------------------------------------------------------------------
// Users
// ----------------------------------------------------------------------------

#[instrument(skip(app_state))]
pub async fn list_users(
    State(app_state): State<AppState>,
    Query(query): Query<AdminUsersQuery>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()?;

    let (users, total) = app_state
        .db_client
        .get_users(&query)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing users", e))?;

    Ok(Json(UserListResponseDto {
        status: "success".to_string(),
        data: FilterUserDto::filter_users(&users),
        pagination: PaginationDto::new(
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(20),
            total,
        ),
    }))
}

async fn find_user(app_state: &AppState, id: Uuid) -> Result<User, HttpError> {
    app_state
        .db_client
        .get_user(Some(id), None, None)
        .await
        .map_err(|e| server_error(app_state, "DB error, getting user", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UserNoLongerExist.to_string()))
}

fn user_response(user: &User) -> Json<UserResponseDto> {
    Json(UserResponseDto {
        status: "success".to_string(),
        data: FilterUserDto::filter_user(user),
    })
}

/// Staff cannot lock themselves out or change their own role.
pub fn ensure_not_self(actor: &User, target: Uuid) -> Result<(), HttpError> {
    if actor.id == target {
        return Err(HttpError::unprocessable("You cannot change your own account here"));
    }
    Ok(())
}

/// Granting or revoking a staff role is reserved to super admins.
pub fn ensure_can_set_type(actor: &User, target: &User, new_type: UserType) -> Result<(), HttpError> {
    let touches_staff = new_type.is_staff() || target.user_type.is_staff();
    if touches_staff && actor.user_type != UserType::SuperAdmin {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }
    Ok(())
}

#[instrument(skip(app_state, auth), fields(actor = %auth.user.id))]
pub async fn toggle_user_active(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_not_self(&auth.user, id)?;
    let target = find_user(&app_state, id).await?;
    if target.user_type.is_staff() && auth.user.user_type != UserType::SuperAdmin {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    let user = app_state
        .db_client
        .set_user_active(id, !target.is_active)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating user", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UserNoLongerExist.to_string()))?;

    // Disabled accounts lose their sessions right away
    if !user.is_active {
        app_state
            .db_client
            .revoke_user_tokens(id)
            .await
            .map_err(|e| server_error(&app_state, "DB error, revoking tokens", e))?;
    }

    tracing::info!(target_id = %id, active = user.is_active, "User active flag changed");
    Ok(user_response(&user))
}

#[instrument(skip(app_state))]
pub async fn verify_user(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .set_user_verified(id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, verifying user", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UserNoLongerExist.to_string()))?;
    Ok(user_response(&user))
}

#[instrument(skip(app_state, auth), fields(actor = %auth.user.id))]
pub async fn set_user_type(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<Uuid>,
    Json(body): Json<UserTypeUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_not_self(&auth.user, id)?;
    let target = find_user(&app_state, id).await?;
    ensure_can_set_type(&auth.user, &target, body.user_type)?;

    let user = app_state
        .db_client
        .set_user_type(id, body.user_type)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating user type", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UserNoLongerExist.to_string()))?;

    tracing::info!(target_id = %id, user_type = user.user_type.to_str(), "User type changed");
    Ok(user_response(&user))
}

// ----------------------------------------------------------------------------
// Taxonomies
// ----------------------------------------------------------------------------

fn term_not_found() -> HttpError {
    HttpError::not_found(ErrorMessage::ResourceNotFound.to_string())
}

pub async fn list_terms(
    State(app_state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&kind)?;
    let terms = app_state
        .db_client
        .get_terms(kind, false)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing terms", e))?;

    Ok(Json(ListResponseDto::<TaxonomyTerm> {
        status: "success".to_string(),
        data: terms,
    }))
}

#[instrument(skip(app_state, body))]
pub async fn create_term(
    State(app_state): State<AppState>,
    Path(kind): Path<String>,
    Json(body): Json<TermInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&kind)?;
    body.validate()?;

    let term = app_state
        .db_client
        .create_term(kind, &body)
        .await
        .map_err(|e| server_error(&app_state, "DB error, creating term", e))?;

    Ok((StatusCode::CREATED, success(term)))
}

#[instrument(skip(app_state, body))]
pub async fn update_term(
    State(app_state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
    Json(body): Json<TermInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&kind)?;
    body.validate()?;

    let term = app_state
        .db_client
        .update_term(kind, id, &body)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating term", e))?
        .ok_or_else(term_not_found)?;

    Ok(success(term))
}

/// Rows still pointing at a term or location block its deletion.
fn ensure_unused(usage: i64, in_use: ErrorMessage) -> Result<(), HttpError> {
    if usage > 0 {
        return Err(HttpError::unprocessable(in_use.to_string()));
    }
    Ok(())
}

/// Rejected with 422 while any property references the term.
#[instrument(skip(app_state))]
pub async fn delete_term(
    State(app_state): State<AppState>,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<impl IntoResponse, HttpError> {
    let kind = parse_kind(&kind)?;

    let usage = app_state
        .db_client
        .term_usage(kind, id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, counting term usage", e))?;
    ensure_unused(usage, ErrorMessage::TermInUse)?;

    let deleted = app_state
        .db_client
        .delete_term(kind, id)
        .await
        .map_err(|e| match e {
            // A listing picked the term up between the count and the delete
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                HttpError::unprocessable(ErrorMessage::TermInUse.to_string())
            }
            e => server_error(&app_state, "DB error, deleting term", e),
        })?;
    if !deleted {
        return Err(term_not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Locations
// ----------------------------------------------------------------------------

fn parse_level(segment: &str) -> Result<LocationLevel, HttpError> {
    serde_json::from_value(serde_json::Value::String(segment.to_string()))
        .map_err(|_| HttpError::not_found(ErrorMessage::ResourceNotFound.to_string()))
}

/// Governorates take no parent. Cities and neighborhoods need an
/// existing one from the level above.
async fn check_parent(
    app_state: &AppState,
    level: LocationLevel,
    parent_id: Option<i32>,
) -> Result<(), HttpError> {
    match (level.parent(), parent_id) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(HttpError::field("parent_id", "Governorates have no parent")),
        (Some(_), None) => Err(HttpError::field("parent_id", "A parent location is required")),
        (Some(parent_level), Some(pid)) => {
            let parent = app_state
                .db_client
                .get_location(parent_level, pid)
                .await
                .map_err(|e| server_error(app_state, "DB error, getting parent location", e))?;
            match parent {
                Some(_) => Ok(()),
                None => Err(HttpError::field("parent_id", "The selected parent is invalid")),
            }
        }
    }
}

pub async fn list_locations(
    State(app_state): State<AppState>,
    Path(level): Path<String>,
    Query(query): Query<AdminLocationQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let level = parse_level(&level)?;
    let rows = app_state
        .db_client
        .get_locations(level, query.parent_id, false)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing locations", e))?;

    Ok(Json(ListResponseDto::<Location> {
        status: "success".to_string(),
        data: rows,
    }))
}

#[instrument(skip(app_state, body))]
pub async fn create_location(
    State(app_state): State<AppState>,
    Path(level): Path<String>,
    Json(body): Json<LocationInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    let level = parse_level(&level)?;
    body.validate()?;
    check_parent(&app_state, level, body.parent_id).await?;

    let location = app_state
        .db_client
        .create_location(level, &body)
        .await
        .map_err(|e| server_error(&app_state, "DB error, creating location", e))?;

    Ok((StatusCode::CREATED, success(location)))
}

#[instrument(skip(app_state, body))]
pub async fn update_location(
    State(app_state): State<AppState>,
    Path((level, id)): Path<(String, i32)>,
    Json(body): Json<LocationInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    let level = parse_level(&level)?;
    body.validate()?;
    check_parent(&app_state, level, body.parent_id).await?;

    let location = app_state
        .db_client
        .update_location(level, id, &body)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating location", e))?
        .ok_or_else(|| HttpError::not_found(ErrorMessage::ResourceNotFound.to_string()))?;

    Ok(success(location))
}

/// Rejected with 422 while child locations or properties point at it.
#[instrument(skip(app_state))]
pub async fn delete_location(
    State(app_state): State<AppState>,
    Path((level, id)): Path<(String, i32)>,
) -> Result<impl IntoResponse, HttpError> {
    let level = parse_level(&level)?;

    let usage = app_state
        .db_client
        .location_usage(level, id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, counting location usage", e))?;
    ensure_unused(usage, ErrorMessage::LocationInUse)?;

    let deleted = app_state
        .db_client
        .delete_location(level, id)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                HttpError::unprocessable(ErrorMessage::LocationInUse.to_string())
            }
            e => server_error(&app_state, "DB error, deleting location", e),
        })?;
    if !deleted {
        return Err(HttpError::not_found(ErrorMessage::ResourceNotFound.to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    #[test]
    fn staff_cannot_edit_themselves() {
        let admin = fixtures::user(UserType::Admin);
        assert_eq!(
            ensure_not_self(&admin, admin.id).unwrap_err().status,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert!(ensure_not_self(&admin, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn only_super_admins_touch_staff_roles() {
        let admin = fixtures::user(UserType::Admin);
        let root = fixtures::user(UserType::SuperAdmin);
        let owner = fixtures::user(UserType::PropertyOwner);

        assert!(ensure_can_set_type(&admin, &owner, UserType::GeneralUser).is_ok());
        assert_eq!(
            ensure_can_set_type(&admin, &owner, UserType::Admin)
                .unwrap_err()
                .status,
            StatusCode::FORBIDDEN
        );
        assert!(ensure_can_set_type(&root, &owner, UserType::Admin).is_ok());
        assert!(ensure_can_set_type(&admin, &root, UserType::PropertyOwner).is_err());
    }

    #[test]
    fn referenced_terms_and_locations_are_kept() {
        let term = ensure_unused(3, ErrorMessage::TermInUse).unwrap_err();
        assert_eq!(term.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(term.message, ErrorMessage::TermInUse.to_string());

        let location = ensure_unused(1, ErrorMessage::LocationInUse).unwrap_err();
        assert_eq!(location.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(location.message, ErrorMessage::LocationInUse.to_string());

        assert!(ensure_unused(0, ErrorMessage::TermInUse).is_ok());
    }

    #[test]
    fn location_levels_parse_from_path() {
        assert_eq!(parse_level("states").ok(), Some(LocationLevel::Governorates));
        assert_eq!(parse_level("governorates").ok(), Some(LocationLevel::Governorates));
        assert_eq!(parse_level("neighborhoods").ok(), Some(LocationLevel::Neighborhoods));
        assert!(parse_level("streets").is_err());
    }
}
