use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use tracing::instrument;
use validator::Validate;

use crate::{
    AppState,
    db::{LeadExt, UserExt},
    dtos::{
        CreateLeadDto, LeadAssignDto, LeadListResponseDto, LeadNotesDto, LeadStatusUpdateDto,
        LeadsQuery, PaginationDto, PropertyResponseDto,
    },
    error::{ErrorMessage, HttpError},
    handler::{properties::find_property, server_error},
    mail::mails::{LeadNotice, dispatch, send_lead_notification},
    middleware::JWTAuthMiddleware,
    models::{Lead, LeadStatus, Property},
};

/// Public inquiry form.
pub fn lead_handler() -> Router<AppState> {
    Router::new().route("/", post(create_lead))
}

/// Staff pipeline, mounted under the admin router.
pub fn admin_lead_handler() -> Router<AppState> {
    Router::new()
        .route("/", get(list_leads))
        .route("/{lead}", get(get_lead).delete(delete_lead))
        .route("/{lead}/status", put(update_status))
        .route("/{lead}/assign", put(assign_lead))
        .route("/{lead}/notes", put(update_notes))
}

/// Legal moves only. Staying in the same status is not a move.
pub fn check_transition(from: LeadStatus, to: LeadStatus) -> Result<(), HttpError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(HttpError::field(
            "status",
            format!("Cannot move a lead from {} to {}", from.to_str(), to.to_str()),
        ))
    }
}

async fn find_lead(app_state: &AppState, id: i64) -> Result<Lead, HttpError> {
    app_state
        .db_client
        .get_lead(id)
        .await
        .map_err(|e| server_error(app_state, "DB error, getting lead", e))?
        .ok_or_else(|| HttpError::not_found("Lead not found"))
}

fn lead_response(lead: Lead) -> Json<PropertyResponseDto<Lead>> {
    Json(PropertyResponseDto {
        status: "success".to_string(),
        data: lead,
    })
}

/// Emails the owner of the listing the inquiry is about.
async fn notify_owner(app_state: &AppState, property: &Property, lead: &Lead) {
    let owner = match app_state
        .db_client
        .get_user(Some(property.user_id), None, None)
        .await
    {
        Ok(Some(owner)) => owner,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(lead_id = lead.id, "Loading listing owner failed: {}", e);
            return;
        }
    };

    dispatch(
        "lead_notification",
        send_lead_notification(
            app_state.env.clone(),
            LeadNotice {
                owner_email: owner.email,
                owner_name: owner.name,
                property_title: property.title.clone(),
                name: lead.name.clone(),
                email: lead.email.clone(),
                phone: lead.phone.clone(),
                message: lead.message.clone(),
            },
        ),
    );
}

#[instrument(skip(app_state, body))]
pub async fn create_lead(
    State(app_state): State<AppState>,
    Json(body): Json<CreateLeadDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;

    // Inquiries can only target listings the public can see
    let property = match body.property_id {
        Some(id) => {
            let property = find_property(&app_state, id)
                .await
                .map_err(|_| HttpError::field("property_id", "The selected property is invalid"))?;
            if !property.is_publicly_visible() {
                return Err(HttpError::field("property_id", "The selected property is invalid"));
            }
            Some(property)
        }
        None => None,
    };

    let lead = app_state
        .db_client
        .create_lead(&body)
        .await
        .map_err(|e| server_error(&app_state, "DB error, creating lead", e))?;

    if let Some(property) = &property {
        notify_owner(&app_state, property, &lead).await;
    }

    tracing::info!(lead_id = lead.id, property_id = ?lead.property_id, "Lead received");
    Ok((StatusCode::CREATED, lead_response(lead)))
}

#[instrument(skip(app_state))]
pub async fn list_leads(
    State(app_state): State<AppState>,
    Query(query): Query<LeadsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()?;

    let (leads, total) = app_state
        .db_client
        .get_leads(&query)
        .await
        .map_err(|e| server_error(&app_state, "DB error, listing leads", e))?;

    Ok(Json(LeadListResponseDto {
        status: "success".to_string(),
        data: leads,
        pagination: PaginationDto::new(
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(20),
            total,
        ),
    }))
}

pub async fn get_lead(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(lead_response(find_lead(&app_state, id).await?))
}

#[instrument(skip(app_state, auth), fields(user_id = %auth.user.id))]
pub async fn update_status(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(id): Path<i64>,
    Json(body): Json<LeadStatusUpdateDto>,
) -> Result<impl IntoResponse, HttpError> {
    let lead = find_lead(&app_state, id).await?;
    check_transition(lead.status, body.status)?;

    // Compare-and-set so two staff members cannot both advance the lead
    let updated = app_state
        .db_client
        .update_lead_status(id, lead.status, body.status)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating lead status", e))?
        .ok_or_else(|| {
            HttpError::new("The lead was changed by someone else", StatusCode::CONFLICT)
        })?;

    tracing::info!(
        lead_id = id,
        from = lead.status.to_str(),
        to = updated.status.to_str(),
        "Lead status changed"
    );
    Ok(lead_response(updated))
}

#[instrument(skip(app_state))]
pub async fn assign_lead(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<LeadAssignDto>,
) -> Result<impl IntoResponse, HttpError> {
    if let Some(user_id) = body.user_id {
        let assignee = app_state
            .db_client
            .get_user(Some(user_id), None, None)
            .await
            .map_err(|e| server_error(&app_state, "DB error, getting assignee", e))?;
        if !assignee.is_some_and(|u| u.user_type.is_staff() && u.is_active) {
            return Err(HttpError::field("user_id", "Leads can only be assigned to staff"));
        }
    }

    let lead = app_state
        .db_client
        .assign_lead(id, body.user_id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, assigning lead", e))?
        .ok_or_else(|| HttpError::not_found("Lead not found"))?;

    Ok(lead_response(lead))
}

pub async fn update_notes(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<LeadNotesDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;

    let lead = app_state
        .db_client
        .update_lead_notes(id, body.notes.as_deref())
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating lead notes", e))?
        .ok_or_else(|| HttpError::not_found("Lead not found"))?;

    Ok(lead_response(lead))
}

#[instrument(skip(app_state))]
pub async fn delete_lead(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let deleted = app_state
        .db_client
        .delete_lead(id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, deleting lead", e))?;

    if !deleted {
        return Err(HttpError::not_found(ErrorMessage::ResourceNotFound.to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_moves_forward_only() {
        assert!(check_transition(LeadStatus::New, LeadStatus::InProgress).is_ok());
        assert!(check_transition(LeadStatus::InProgress, LeadStatus::Qualified).is_ok());
        assert!(check_transition(LeadStatus::Unqualified, LeadStatus::Closed).is_ok());
    }

    #[test]
    fn illegal_transitions_are_422() {
        for (from, to) in [
            (LeadStatus::New, LeadStatus::Closed),
            (LeadStatus::Closed, LeadStatus::New),
            (LeadStatus::Qualified, LeadStatus::Unqualified),
            (LeadStatus::InProgress, LeadStatus::InProgress),
        ] {
            let err = check_transition(from, to).unwrap_err();
            assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
            assert!(err.errors.unwrap().contains_key("status"));
        }
    }
}
