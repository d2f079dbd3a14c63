pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod leads;
pub mod locations;
pub mod media;
pub mod properties;
pub mod stats;
pub mod taxonomies;
pub mod uploads;

use std::fmt::Display;

use crate::{AppState, error::HttpError};

/// Logs a server-side failure and turns it into a 500. The detail only
/// reaches the client in debug mode.
pub(crate) fn server_error(app_state: &AppState, context: &str, e: impl Display) -> HttpError {
    tracing::error!("{}: {}", context, e);
    HttpError::internal(format!("{}: {}", context, e), app_state.env.debug)
}
