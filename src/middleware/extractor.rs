use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;

use super::cookies::SessionTokens;
use super::error::AuthError;
use super::guard::VerifiedUser;
use super::state::AuthState;
use crate::identity::IdentityProvider;
use crate::profiles::ProfileStore;
use crate::types::User;

/// Authenticated user resolved from the access-token cookie.
///
/// Use as an Axum extractor in route handlers. Returns `401 Unauthorized`
/// if the cookie is missing or the provider rejects it. Behind the route
/// guard, the user it verified is reused and refreshed tokens are already
/// in place.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {}", user.user.email.unwrap_or_default())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    /// Token to forward on data calls so row-level policies apply.
    pub access_token: String,
}

impl<I: IdentityProvider, P: ProfileStore> FromRequestParts<AuthState<I, P>> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState<I, P>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let access_token = SessionTokens::from_jar(&jar)
            .access_token
            .ok_or(AuthError::Unauthenticated)?;

        if let Some(VerifiedUser(user)) = parts.extensions.get::<VerifiedUser>() {
            return Ok(Self {
                user: user.clone(),
                access_token,
            });
        }

        let user = state.provider.get_user(&access_token).await.map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected by provider");
            AuthError::Unauthenticated
        })?;

        Ok(Self { user, access_token })
    }
}
