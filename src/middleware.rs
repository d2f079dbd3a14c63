use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::IntoResponse,
};

use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    db::UserExt,
    error::{ErrorMessage, HttpError},
    models::{User, UserType},
    utils::token::{self, TokenKind},
};

/// Authenticated user, inserted into request extensions by [`auth`].
///
/// ```ignore
/// async fn my_handler(Extension(auth): Extension<JWTAuthMiddleware>) {
///     // auth.user
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JWTAuthMiddleware {
    pub user: User,
}

/// Inserted by [`optional_auth`] on public routes that render differently
/// for owners and staff.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

/// `Authorization: Bearer <token>` first, then the `access_token` cookie.
pub fn extract_token(cookie_jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
        .or_else(|| {
            cookie_jar
                .get("access_token")
                .map(|cookie| cookie.value().to_string())
        })
}

/// Verifies an access token and loads its user.
///
/// 401 for bad tokens or deleted users, 403 for deactivated accounts.
async fn authenticate(app_state: &AppState, token: String) -> Result<User, HttpError> {
    let claims = token::decode_token(token, app_state.env.jwt_secret.as_bytes(), TokenKind::Access)?;

    let user_id = uuid::Uuid::parse_str(&claims.sub)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    let user = app_state
        .db_client
        .get_user(Some(user_id), None, None)
        .await
        .map_err(|e| {
            tracing::error!("Loading user {} failed: {}", user_id, e);
            HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string())
        })?
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    if !user.is_active {
        return Err(HttpError::forbidden(ErrorMessage::AccountDisabled.to_string()));
    }

    Ok(user)
}

/// Rejects the request unless it carries a valid access token.
pub async fn auth(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = extract_token(&cookie_jar, req.headers())
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let user = authenticate(&app_state, token).await?;

    req.extensions_mut().insert(JWTAuthMiddleware { user });

    Ok(next.run(req).await)
}

/// Like [`auth`] but never rejects: anonymous or invalid credentials
/// produce an empty [`Viewer`].
pub async fn optional_auth(
    cookie_jar: CookieJar,
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> impl IntoResponse {
    let user = match extract_token(&cookie_jar, req.headers()) {
        Some(token) => authenticate(&app_state, token).await.ok(),
        None => None,
    };

    req.extensions_mut().insert(Viewer(user));

    next.run(req).await
}

/// Must run after [`auth`]. 403 unless the user has one of the types.
pub async fn role_check(
    req: Request,
    next: Next,
    required_types: Vec<UserType>,
) -> Result<impl IntoResponse, HttpError> {
    let user = req
        .extensions()
        .get::<JWTAuthMiddleware>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_types.contains(&user.user.user_type) {
        tracing::warn!(user_id = %user.user.id, "Role check failed");
        return Err(HttpError::forbidden(
            ErrorMessage::PermissionDenied.to_string(),
        ));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use axum::{
        Router,
        body::Body,
        http::{HeaderValue, Request as HttpRequest, StatusCode},
        middleware::{self, Next},
        routing::get,
    };
    use axum_extra::extract::cookie::Cookie;
    use tower::ServiceExt;

    fn admin_only(user: Option<User>) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(|req, next| {
                role_check(req, next, UserType::STAFF.to_vec())
            }))
            .layer(middleware::from_fn(move |mut req: Request, next: Next| {
                let user = user.clone();
                async move {
                    if let Some(user) = user {
                        req.extensions_mut().insert(JWTAuthMiddleware { user });
                    }
                    next.run(req).await
                }
            }))
    }

    async fn status_for(user: Option<User>) -> StatusCode {
        admin_only(user)
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn role_check_gates_by_user_type() {
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(Some(fixtures::user(UserType::PropertyOwner))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(Some(fixtures::user(UserType::Admin))).await,
            StatusCode::OK
        );
        assert_eq!(
            status_for(Some(fixtures::user(UserType::SuperAdmin))).await,
            StatusCode::OK
        );
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let jar = CookieJar::new().add(Cookie::new("access_token", "from-cookie"));
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&jar, &headers).as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&jar, &headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn malformed_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&CookieJar::new(), &headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&CookieJar::new(), &headers), None);
    }
}
