use crate::{
    AppState,
    db::{FavoriteExt, NewUser, PropertyExt, TokenExt, UserExt},
    dtos::{
        AuthTokensDto, FilterUserDto, ForgotPasswordRequestDto, LoginUserDto, RefreshTokenDto,
        RegisterUserDto, ResetPasswordRequestDto, Response, UserMeData, UserMeResponseDto,
        VerifyEmailQueryDto,
    },
    error::{ErrorMessage, HttpError},
    handler::server_error,
    mail::mails::{
        dispatch, send_password_reset_email, send_verification_email, send_welcome_email,
    },
    middleware::{JWTAuthMiddleware, auth},
    models::User,
    utils::{
        password,
        token::{self, TokenKind},
    },
};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use axum_client_ip::ClientIp;

use tracing::instrument;

/// Per-IP failed logins allowed per day.
const MAX_IP_ATTEMPTS: i64 = 100;
/// Per email+IP failed logins allowed per hour.
const MAX_EMAIL_IP_ATTEMPTS: i64 = 10;

pub fn auth_handler(app_state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth));

    Router::new()
        .route("/register", post(register))
        .route(
            "/login",
            post(login).layer(app_state.ip_extraction.clone().into_extension()),
        )
        .route("/refresh", post(refresh))
        .route("/verify", get(verify_email))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .merge(protected)
}

fn token_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Signs a fresh access token plus a refresh token bound to `refresh_id`,
/// and mirrors both into http-only cookies for browser clients.
fn issue_tokens(
    app_state: &AppState,
    jar: CookieJar,
    user: &User,
    refresh_id: Uuid,
) -> Result<(CookieJar, AuthTokensDto), HttpError> {
    let secret = app_state.env.jwt_secret.as_bytes();
    let user_id = user.id.to_string();

    let access_token = token::create_access_token(&user_id, secret, app_state.env.jwt_maxage)
        .map_err(|e| server_error(app_state, "Access token creation error", e))?;
    let refresh_token = token::create_refresh_token(
        &user_id,
        &refresh_id.to_string(),
        secret,
        app_state.env.refresh_token_maxage,
    )
    .map_err(|e| server_error(app_state, "Refresh token creation error", e))?;

    let jar = jar
        .add(token_cookie(
            "access_token",
            access_token.clone(),
            app_state.env.jwt_maxage,
        ))
        .add(token_cookie(
            "refresh_token",
            refresh_token.clone(),
            app_state.env.refresh_token_maxage,
        ));

    Ok((
        jar,
        AuthTokensDto {
            status: "success".to_string(),
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: app_state.env.jwt_maxage,
            user: FilterUserDto::filter_user(user),
        },
    ))
}

fn refresh_expiry(app_state: &AppState) -> chrono::DateTime<Utc> {
    Utc::now() + Duration::seconds(app_state.env.refresh_token_maxage)
}

/// Creates the account and its first refresh token in one transaction,
/// then mails the verification link in the background.
#[instrument(skip(app_state, jar, body), fields(email = %body.email))]
pub async fn register(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::warn!("Invalid register input: {}", e);
        HttpError::from(e)
    })?;

    let email_taken = app_state
        .db_client
        .email_exists(&body.email)
        .await
        .map_err(|e| server_error(&app_state, "DB error, checking email", e))?;
    if email_taken {
        return Err(HttpError::field("email", ErrorMessage::EmailTaken.to_string()));
    }

    let hash_password = password::hash(&body.password)
        .map_err(|e| server_error(&app_state, "Password hashing error", e))?;

    let verification_token = Uuid::new_v4().to_string();
    let refresh_id = Uuid::new_v4();

    let result = app_state
        .db_client
        .register_user(
            NewUser {
                name: body.name.trim(),
                email: body.email.trim(),
                phone: body.phone.as_deref(),
                password: &hash_password,
                user_type: body.user_type.into(),
                verification_token: &verification_token,
                token_expires_at: Utc::now() + Duration::hours(24),
            },
            refresh_id,
            refresh_expiry(&app_state),
        )
        .await;

    let user = match result {
        Ok((user, _)) => user,
        // Lost a race with a concurrent registration
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(HttpError::field("email", ErrorMessage::EmailTaken.to_string()));
        }
        Err(e) => return Err(server_error(&app_state, "DB error, saving user", e)),
    };

    dispatch(
        "verification",
        send_verification_email(
            app_state.env.clone(),
            user.email.clone(),
            user.name.clone(),
            verification_token,
        ),
    );

    let (jar, tokens) = issue_tokens(&app_state, jar, &user, refresh_id)?;
    tracing::info!(user_id = %user.id, "Register successful");
    Ok((StatusCode::CREATED, jar, Json(tokens)))
}

/// Unknown email and wrong password are indistinguishable to the client.
#[instrument(skip(app_state, jar, body), fields(email = %body.email))]
pub async fn login(
    ClientIp(ip): ClientIp,
    State(app_state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;

    let ip_attempts = app_state
        .redis_client
        .get_ip_attempts(ip)
        .await
        .map_err(|e| server_error(&app_state, "RedisDB error, getting ip attempts", e))?;
    let email_attempts = app_state
        .redis_client
        .get_email_ip_attempts(ip, &body.email)
        .await
        .map_err(|e| server_error(&app_state, "RedisDB error, getting email attempts", e))?;

    if ip_attempts >= MAX_IP_ATTEMPTS || email_attempts >= MAX_EMAIL_IP_ATTEMPTS {
        tracing::warn!(%ip, "Login attempt limit reached");
        return Err(HttpError::too_many_requests(
            ErrorMessage::TooManyAttempts.to_string(),
        ));
    }

    let user = match check_credentials(&app_state, &body).await {
        Ok(user) => user,
        Err(e) => {
            if e.status == StatusCode::UNAUTHORIZED {
                if let Err(e) = app_state
                    .redis_client
                    .increment_attempts(ip, &body.email)
                    .await
                {
                    tracing::warn!("Failed to increment login attempts: {}", e);
                }
            }
            return Err(e);
        }
    };

    if !user.is_active {
        return Err(HttpError::forbidden(ErrorMessage::AccountDisabled.to_string()));
    }

    if let Err(e) = app_state
        .redis_client
        .clear_email_ip_attempts(ip, &body.email)
        .await
    {
        tracing::warn!("Failed to clear login attempts: {}", e);
    }

    app_state
        .db_client
        .touch_last_login(user.id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating last login", e))?;

    let refresh = app_state
        .db_client
        .create_refresh_token(user.id, refresh_expiry(&app_state))
        .await
        .map_err(|e| server_error(&app_state, "DB error, saving refresh token", e))?;

    let (jar, tokens) = issue_tokens(&app_state, jar, &user, refresh.id)?;
    tracing::info!(user_id = %user.id, %ip, "Login successful");
    Ok((jar, Json(tokens)))
}

async fn check_credentials(app_state: &AppState, body: &LoginUserDto) -> Result<User, HttpError> {
    let user = app_state
        .db_client
        .get_user(None, Some(body.email.trim()), None)
        .await
        .map_err(|e| server_error(app_state, "DB error, getting user", e))?;

    let password = body.password.clone();
    tokio::task::spawn_blocking(move || authenticate(user, &password))
        .await
        .map_err(|e| server_error(app_state, "Password check task failed", e))?
}

/// Unknown emails are checked against a dummy hash, so every miss costs one
/// Argon2 run and yields the same 401.
fn authenticate(user: Option<User>, password: &str) -> Result<User, HttpError> {
    let hashed = user
        .as_ref()
        .map_or(password::DUMMY_HASH, |u| u.password.as_str());

    let matched = password::compare(password, hashed).unwrap_or_else(|e| {
        tracing::warn!("Password compare error: {}", e);
        false
    });

    user.filter(|_| matched)
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::InvalidCredentials.to_string()))
}

#[instrument(skip(app_state, jar, auth))]
pub async fn logout(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    jar: CookieJar,
) -> Result<impl IntoResponse, HttpError> {
    let revoked = app_state
        .db_client
        .revoke_user_tokens(auth.user.id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, revoking tokens", e))?;

    let jar = jar
        .remove(Cookie::build("access_token").path("/"))
        .remove(Cookie::build("refresh_token").path("/"));

    tracing::info!(user_id = %auth.user.id, revoked, "Logout successful");
    Ok((
        jar,
        Json(Response {
            status: "success",
            message: "Logged out".to_string(),
        }),
    ))
}

/// Rotates the refresh token: the presented one is revoked and a new pair
/// is issued. A revoked or unknown token is rejected.
#[instrument(skip(app_state, jar, body))]
pub async fn refresh(
    State(app_state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    // The body is optional, browser clients rely on the cookie
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshTokenDto>(&body)
            .map_err(|e| HttpError::bad_request(e.to_string()))?
            .refresh_token
    };
    let presented = from_body
        .or_else(|| jar.get("refresh_token").map(|c| c.value().to_string()))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let claims = token::decode_token(
        presented,
        app_state.env.jwt_secret.as_bytes(),
        TokenKind::Refresh,
    )?;

    let invalid = || HttpError::unauthorized(ErrorMessage::InvalidToken.to_string());
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| invalid())?;
    let token_id = claims
        .jti
        .as_deref()
        .and_then(|jti| Uuid::parse_str(jti).ok())
        .ok_or_else(invalid)?;

    let next = app_state
        .db_client
        .rotate_refresh_token(token_id, user_id, refresh_expiry(&app_state))
        .await
        .map_err(|e| server_error(&app_state, "DB error, rotating refresh token", e))?
        .ok_or_else(|| {
            tracing::warn!(%user_id, %token_id, "Refresh with revoked or expired token");
            invalid()
        })?;

    let user = app_state
        .db_client
        .get_user(Some(user_id), None, None)
        .await
        .map_err(|e| server_error(&app_state, "DB error, getting user", e))?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    if !user.is_active {
        return Err(HttpError::forbidden(ErrorMessage::AccountDisabled.to_string()));
    }

    let (jar, tokens) = issue_tokens(&app_state, jar, &user, next.id)?;
    tracing::info!(user_id = %user.id, "Tokens refreshed");
    Ok((jar, Json(tokens)))
}

#[instrument(skip(app_state, auth))]
pub async fn me(
    State(app_state): State<AppState>,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let (_, properties_count) = app_state
        .db_client
        .list_user_properties(auth.user.id, None, 1, 1)
        .await
        .map_err(|e| server_error(&app_state, "DB error, counting properties", e))?;
    let favorites_count = app_state
        .db_client
        .count_favorites(auth.user.id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, counting favorites", e))?;

    Ok(Json(UserMeResponseDto {
        status: "success".to_string(),
        data: UserMeData {
            user: FilterUserDto::filter_user(&auth.user),
            properties_count,
            favorites_count,
        },
    }))
}

#[instrument(skip(app_state, query_params))]
pub async fn verify_email(
    Query(query_params): Query<VerifyEmailQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate()?;

    let user = app_state
        .db_client
        .verify_email_token(&query_params.token)
        .await
        .map_err(|e| server_error(&app_state, "DB error, verifying email", e))?
        .ok_or_else(|| HttpError::bad_request(ErrorMessage::InvalidToken.to_string()))?;

    dispatch(
        "welcome",
        send_welcome_email(app_state.env.clone(), user.email.clone(), user.name.clone()),
    );

    tracing::info!(user_id = %user.id, "Email verification successful");
    Ok(Json(Response {
        status: "success",
        message: "Email verification successful.".to_string(),
    }))
}

/// Always answers the same way so the endpoint cannot be used to probe
/// which emails are registered.
#[instrument(skip(app_state, body))]
pub async fn forgot_password(
    State(app_state): State<AppState>,
    Json(body): Json<ForgotPasswordRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;

    let user = app_state
        .db_client
        .get_user(None, Some(body.email.trim()), None)
        .await
        .map_err(|e| server_error(&app_state, "DB error, getting user", e))?;

    if let Some(user) = user {
        let reset_token = Uuid::new_v4().to_string();
        app_state
            .db_client
            .add_verification_token(user.id, &reset_token, Utc::now() + Duration::minutes(30))
            .await
            .map_err(|e| server_error(&app_state, "DB error, saving reset token", e))?;

        dispatch(
            "password-reset",
            send_password_reset_email(app_state.env.clone(), user.email, user.name, reset_token),
        );
        tracing::info!(user_id = %user.id, "Password reset requested");
    }

    Ok(Json(Response {
        status: "success",
        message: "If the email is registered, a reset link has been sent.".to_string(),
    }))
}

/// Sets the new password and signs the account out everywhere.
#[instrument(skip(app_state, body))]
pub async fn reset_password(
    State(app_state): State<AppState>,
    Json(body): Json<ResetPasswordRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()?;

    let invalid = || HttpError::bad_request(ErrorMessage::InvalidToken.to_string());

    let user = app_state
        .db_client
        .get_user(None, None, Some(&body.token))
        .await
        .map_err(|e| server_error(&app_state, "DB error, getting user by token", e))?
        .ok_or_else(invalid)?;

    match user.token_expires_at {
        Some(expires_at) if expires_at > Utc::now() => {}
        _ => {
            tracing::warn!(user_id = %user.id, "Expired reset token");
            return Err(invalid());
        }
    }

    let hash_password = password::hash(&body.password)
        .map_err(|e| server_error(&app_state, "Password hashing error", e))?;

    app_state
        .db_client
        .update_user_password(user.id, &hash_password)
        .await
        .map_err(|e| server_error(&app_state, "DB error, updating password", e))?;

    app_state
        .db_client
        .revoke_user_tokens(user.id)
        .await
        .map_err(|e| server_error(&app_state, "DB error, revoking tokens", e))?;

    tracing::info!(user_id = %user.id, "Password reset successfully");
    Ok(Json(Response {
        status: "success",
        message: "Password has been successfully reset.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserType, fixtures};

    fn owner_with_password(plain: &str) -> User {
        let mut user = fixtures::user(UserType::PropertyOwner);
        user.password = password::hash(plain).unwrap();
        user
    }

    #[test]
    fn right_password_authenticates() {
        let user = owner_with_password("s3cret-pass");
        let id = user.id;
        assert_eq!(authenticate(Some(user), "s3cret-pass").unwrap().id, id);
    }

    #[test]
    fn unknown_email_and_wrong_password_look_the_same() {
        let unknown = authenticate(None, "s3cret-pass").unwrap_err();
        let wrong = authenticate(Some(owner_with_password("s3cret-pass")), "guess").unwrap_err();

        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status, wrong.status);
        assert_eq!(unknown.message, wrong.message);
        assert_eq!(unknown.message, ErrorMessage::InvalidCredentials.to_string());
    }

    #[test]
    fn corrupt_stored_hash_is_a_plain_rejection() {
        let mut user = fixtures::user(UserType::GeneralUser);
        user.password = "not-a-phc-string".into();
        let err = authenticate(Some(user), "whatever").unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
