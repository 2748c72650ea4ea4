use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde_json::json;

use crate::error::Error;

const DEFAULT_LOGIN_PATH: &str = "/login";

/// Authentication errors for the middleware layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session found.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Callback reached without an authorization code.
    #[error("Missing authorization code")]
    MissingCode,

    /// Provider signalled a failure on the callback (`error_description`).
    #[error("Authorization failed: {0}")]
    Callback(String),

    /// Provider rejected the authorization code or returned no session.
    #[error("Code exchange failed: {0}")]
    Exchange(#[source] Error),

    /// Any other identity provider failure (sign-in, sign-up, ...).
    #[error("Identity provider error: {0}")]
    Provider(#[source] Error),

    #[error("Profile error: {0}")]
    Profile(#[source] Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Value placed in `?error=` when this error ends in a login redirect.
    #[must_use]
    pub fn reason(&self) -> Cow<'_, str> {
        match self {
            Self::MissingCode => Cow::Borrowed("missing_code"),
            Self::Callback(description) => Cow::Borrowed(description),
            Self::Exchange(_) => Cow::Borrowed("auth_code_exchange"),
            Self::Provider(e) => e
                .provider_message()
                .map_or(Cow::Borrowed("provider_error"), Cow::Borrowed),
            Self::Unauthenticated => Cow::Borrowed("unauthenticated"),
            Self::Profile(_) | Self::Config(_) => Cow::Borrowed("internal_error"),
        }
    }

    /// Redirect to `login_path` carrying [`reason`](Self::reason).
    #[must_use]
    pub fn login_redirect(&self, login_path: &str) -> Response {
        login_error(login_path, &self.reason())
    }
}

pub(super) fn login_error(login_path: &str, reason: &str) -> Response {
    let encoded = urlencoding::encode(reason);
    Redirect::to(&format!("{login_path}?error={encoded}")).into_response()
}

/// Callback errors turned into a response on their own redirect to `/login`.
/// Handlers that know the configured login path use
/// [`AuthError::login_redirect`] instead.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthenticated" }))).into_response()
            }
            Self::MissingCode | Self::Callback(_) | Self::Exchange(_) => {
                self.login_redirect(DEFAULT_LOGIN_PATH)
            }
            Self::Provider(ref e) => {
                tracing::warn!(error = %e, "Identity provider request failed");
                (StatusCode::BAD_GATEWAY, Json(json!({ "error": self.reason() }))).into_response()
            }
            Self::Profile(Error::ProfileNotFound) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "profile_not_found" }))).into_response()
            }
            Self::Profile(Error::ProfileConflict) => {
                (StatusCode::CONFLICT, Json(json!({ "error": "profile_exists" }))).into_response()
            }
            Self::Profile(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
