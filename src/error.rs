use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Error body sent to API clients.
///
/// ```json
/// {
///   "status": "fail",
///   "message": "Validation failed",
///   "errors": { "email": ["The email has already been taken."] }
/// }
/// ```
///
/// `errors` is only present for field-level validation failures.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Stable, user facing error messages.
///
/// PartialEq lets tests compare variants directly.
#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    // Password validation
    EmptyPassword,
    ExceededMaxPasswordLength(usize),
    InvalidHashFormat,
    HashingError,

    // Authentication
    InvalidCredentials,
    InvalidToken,
    TokenNotProvided,
    UserNotAuthenticated,
    AccountDisabled,
    TooManyAttempts,

    // Authorization
    PermissionDenied,
    NotPropertyOwner,
    ListingNotAllowed,

    // Lookups
    UserNoLongerExist,
    PropertyNotFound,
    ResourceNotFound,

    // Integrity
    TermInUse,
    LocationInUse,
    EmailTaken,

    ValidationFailed,
    ServerError,
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorMessage::UserNoLongerExist => {
                "User belonging to this token no longer exists".to_string()
            }
            ErrorMessage::EmptyPassword => "Password cannot be empty".to_string(),
            ErrorMessage::HashingError => "Error while hashing password".to_string(),
            ErrorMessage::InvalidHashFormat => "Invalid password hash format".to_string(),
            ErrorMessage::ExceededMaxPasswordLength(max_length) => {
                format!("Password must not be more than {} characters", max_length)
            }
            ErrorMessage::InvalidCredentials => "Invalid credentials".to_string(),
            ErrorMessage::InvalidToken => "Token is invalid or expired".to_string(),
            ErrorMessage::TokenNotProvided => {
                "You are not logged in, please provide a token".to_string()
            }
            ErrorMessage::UserNotAuthenticated => {
                "Authentication required. Please log in.".to_string()
            }
            ErrorMessage::AccountDisabled => "This account has been deactivated".to_string(),
            ErrorMessage::TooManyAttempts => {
                "Too many login attempts. Please try again later".to_string()
            }
            ErrorMessage::PermissionDenied => {
                "You are not allowed to perform this action".to_string()
            }
            ErrorMessage::NotPropertyOwner => {
                "You can only modify your own properties".to_string()
            }
            ErrorMessage::ListingNotAllowed => {
                "Only verified, active property owners can create listings".to_string()
            }
            ErrorMessage::PropertyNotFound => "Property not found".to_string(),
            ErrorMessage::ResourceNotFound => "Resource not found".to_string(),
            ErrorMessage::TermInUse => {
                "This term is attached to one or more properties and cannot be deleted"
                    .to_string()
            }
            ErrorMessage::LocationInUse => {
                "This location is still referenced and cannot be deleted".to_string()
            }
            ErrorMessage::EmailTaken => "The email has already been taken.".to_string(),
            ErrorMessage::ValidationFailed => "Validation failed".to_string(),
            ErrorMessage::ServerError => "Server Error. Please try again later".to_string(),
        };
        write!(f, "{}", message)
    }
}

/// Error type returned by every handler and middleware.
///
/// Bundles the client message with its status code so the two never drift
/// apart. `errors` carries per-field messages for 422 responses.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub message: String,
    pub status: StatusCode,
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            message: message.into(),
            status,
            errors: None,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// 500 that only exposes `detail` when the app runs in debug mode.
    pub fn internal(detail: impl fmt::Display, debug: bool) -> Self {
        if debug {
            Self::server_error(detail.to_string())
        } else {
            Self::server_error(ErrorMessage::ServerError.to_string())
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::UNPROCESSABLE_ENTITY)
    }

    /// 422 with a single field error.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message]);
        HttpError {
            message: ErrorMessage::ValidationFailed.to_string(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            errors: Some(errors),
        }
    }

    pub fn unique_constraint_violation(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::CONFLICT)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::FORBIDDEN)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::NOT_FOUND)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn into_http_response(self) -> Response {
        let json_response = Json(ErrorResponse {
            status: "fail".to_string(),
            message: self.message,
            errors: self.errors,
        });

        (self.status, json_response).into_response()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError: message: {}, status: {}",
            self.message, self.status
        )
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}

/// Flattens validator output into `field -> [messages]`.
///
/// Nested structs are reported with dotted keys (`location.city_id`).
fn collect_field_errors(
    prefix: &str,
    errors: &ValidationErrors,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    for (field, kind) in errors.errors() {
        let key = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = out.entry(key).or_default();
                for err in list {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("The {} field is invalid.", field));
                    messages.push(message);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_field_errors(&key, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_field_errors(&format!("{}.{}", key, index), inner, out);
                }
            }
        }
    }
}

impl From<ValidationErrors> for HttpError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = BTreeMap::new();
        collect_field_errors("", &errors, &mut fields);
        HttpError {
            message: ErrorMessage::ValidationFailed.to_string(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            errors: Some(fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 3, message = "Name is too short"))]
        name: String,
        #[validate(email)]
        email: String,
    }

    #[test]
    fn validation_errors_become_422_with_field_map() {
        let probe = Probe {
            name: "ab".into(),
            email: "nope".into(),
        };
        let err: HttpError = probe.validate().unwrap_err().into();

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let fields = err.errors.expect("field errors");
        assert_eq!(fields["name"], vec!["Name is too short".to_string()]);
        assert_eq!(
            fields["email"],
            vec!["The email field is invalid.".to_string()]
        );
    }

    #[test]
    fn internal_hides_detail_unless_debug() {
        let hidden = HttpError::internal("connection refused", false);
        assert_eq!(hidden.message, ErrorMessage::ServerError.to_string());
        assert_eq!(hidden.status, StatusCode::INTERNAL_SERVER_ERROR);

        let shown = HttpError::internal("connection refused", true);
        assert_eq!(shown.message, "connection refused");
    }

    #[tokio::test]
    async fn error_body_shape() {
        let response = HttpError::field("email", ErrorMessage::EmailTaken.to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["email"][0], "The email has already been taken.");
    }

    #[test]
    fn plain_errors_omit_field_map() {
        let body = ErrorResponse {
            status: "fail".into(),
            message: ErrorMessage::PermissionDenied.to_string(),
            errors: None,
        };
        assert!(!body.to_string().contains("errors"));
    }
}
