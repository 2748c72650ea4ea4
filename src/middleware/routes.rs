use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::config::{AuthSettings, SessionAuthConfig};
use super::cookies::{self, SessionTokens};
use super::error::AuthError;
use super::extractor::AuthUser;
use super::guard::{RouteGuard, Verification, route_guard, verify_tokens};
use super::propagation::{AuthEvent, AuthEvents};
use super::state::AuthState;
use crate::identity::IdentityProvider;
use crate::pkce;
use crate::profiles::ProfileStore;
use crate::types::{Credentials, Profile, ProfileUpdate, Session, SignUpOutcome};

/// Session auth for an Axum app: auth routes plus the route guard.
///
/// Build once, then mount [`routes()`](Self::routes) and wrap the pages to
/// protect with [`protect()`](Self::protect). Both share the same state.
pub struct SessionAuth<I, P> {
    state: AuthState<I, P>,
}

impl<I: IdentityProvider, P: ProfileStore> SessionAuth<I, P> {
    pub fn new(config: SessionAuthConfig<I>, profiles: P) -> Self {
        let provider = Arc::new(config.provider);
        let settings = config.settings;

        let guard = RouteGuard::new(provider.clone(), settings.guard_policy)
            .with_matcher(settings.matcher.clone())
            .with_login_path(settings.login_path.clone())
            .with_preserve_next(settings.preserve_next);

        Self {
            state: AuthState {
                provider,
                profiles: Arc::new(profiles),
                guard: Arc::new(guard),
                events: Arc::new(AuthEvents::new()),
                settings,
            },
        }
    }

    #[must_use]
    pub fn state(&self) -> &AuthState<I, P> {
        &self.state
    }

    /// Listeners registered here see every session transition.
    #[must_use]
    pub fn events(&self) -> &Arc<AuthEvents> {
        &self.state.events
    }

    /// Auth and profile routes, ready to merge into the app router.
    pub fn routes(&self) -> Router {
        let auth_path = &self.state.settings.auth_path;
        let profile_path = &self.state.settings.profile_path;

        Router::new()
            .route(&format!("{auth_path}/callback"), get(callback::<I, P>))
            .route(
                &format!("{auth_path}/authorize/{{provider}}"),
                get(authorize::<I, P>),
            )
            .route(&format!("{auth_path}/sign-in"), post(sign_in::<I, P>))
            .route(&format!("{auth_path}/sign-up"), post(sign_up::<I, P>))
            .route(
                &format!("{auth_path}/sign-out"),
                get(sign_out::<I, P>).post(sign_out::<I, P>),
            )
            .route(&format!("{auth_path}/session"), get(current_session::<I, P>))
            .route(
                profile_path,
                get(get_profile::<I, P>)
                    .post(create_profile::<I, P>)
                    .patch(update_profile::<I, P>),
            )
            .with_state(self.state.clone())
    }

    /// Run the route guard in front of every route in `router`.
    pub fn protect(&self, router: Router) -> Router {
        router.layer(from_fn_with_state(self.state.clone(), route_guard::<I, P>))
    }
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    next: Option<String>,
}

async fn callback<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<(CookieJar, Redirect), Response> {
    let settings = &state.settings;
    let code_verifier = cookies::get_code_verifier(&jar);
    let jar = jar.add(cookies::clear_code_verifier_cookie(&settings.auth_path));

    let session = match exchange(state.provider.as_ref(), &params, code_verifier.as_deref()).await
    {
        Ok(session) => session,
        Err(e) => return Err((jar, e.login_redirect(&settings.login_path)).into_response()),
    };

    let jar = state.propagate(jar, AuthEvent::SignedIn, Some(&session));
    let destination = post_login_destination(settings, params.next.as_deref(), &headers);

    tracing::info!(
        user_id = ?session.user.as_ref().map(|u| u.id),
        %destination,
        "Session established from authorization code"
    );

    Ok((jar, Redirect::to(&destination)))
}

async fn exchange<I: IdentityProvider>(
    provider: &I,
    params: &CallbackParams,
    code_verifier: Option<&str>,
) -> Result<Session, AuthError> {
    let description = non_empty(params.error_description.as_deref())
        .or_else(|| non_empty(params.error.as_deref()));
    if let Some(description) = description {
        tracing::warn!(error = ?params.error, description = %description, "Provider error on callback");
        return Err(AuthError::Callback(description.to_owned()));
    }

    let code = non_empty(params.code.as_deref()).ok_or(AuthError::MissingCode)?;

    provider
        .exchange_code_for_session(code, code_verifier)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Error exchanging auth code for session");
            AuthError::Exchange(e)
        })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Only same-site paths are accepted as post-login destinations.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}

fn post_login_destination(settings: &AuthSettings, next: Option<&str>, headers: &HeaderMap) -> String {
    let next = next
        .filter(|n| is_local_path(n))
        .unwrap_or(settings.default_next.as_str());

    if settings.trust_forwarded_host {
        let forwarded = headers
            .get("x-forwarded-host")
            .and_then(|v| v.to_str().ok())
            .filter(|h| !h.is_empty());
        if let Some(host) = forwarded {
            return format!("https://{host}{next}");
        }
    }

    next.to_owned()
}

// ── OAuth ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NextParams {
    next: Option<String>,
}

async fn authorize<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    Path(provider): Path<String>,
    Query(params): Query<NextParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthError> {
    let settings = &state.settings;
    let next = params.next.as_deref().filter(|n| is_local_path(n));
    let redirect_to = settings.callback_url(next)?;

    let request = state.provider.sign_in_with_oauth(&provider, &redirect_to);
    let verifier = cookies::code_verifier_cookie(
        &request.code_verifier,
        settings.secure_cookies,
        &settings.auth_path,
    );

    tracing::debug!(%provider, "Starting OAuth sign-in");
    Ok((jar.add(verifier), Redirect::to(&request.url)))
}

// ── Password ───────────────────────────────────────────────────────

async fn sign_in<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Result<(CookieJar, Redirect), Response> {
    let settings = &state.settings;
    let session = state
        .provider
        .sign_in_with_password(&credentials.email, &credentials.password)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Password sign-in failed");
            AuthError::Provider(e).login_redirect(&settings.login_path)
        })?;

    tracing::info!(user_id = ?session.user.as_ref().map(|u| u.id), "Password sign-in successful");

    let jar = state.propagate(jar, AuthEvent::SignedIn, Some(&session));
    Ok((jar, Redirect::to(&settings.default_next)))
}

async fn sign_up<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    jar: CookieJar,
    Form(credentials): Form<Credentials>,
) -> Result<(CookieJar, Redirect), Response> {
    let settings = &state.settings;
    let redirect_to = settings
        .callback_url(None)
        .map_err(|e| e.login_redirect(&settings.login_path))?;

    let code_verifier = pkce::generate_code_verifier();
    let code_challenge = pkce::generate_code_challenge(&code_verifier);

    let outcome = state
        .provider
        .sign_up(
            &credentials.email,
            &credentials.password,
            Some(&redirect_to),
            Some(&code_challenge),
        )
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Sign-up failed");
            AuthError::Provider(e).login_redirect(&settings.login_path)
        })?;

    match outcome {
        SignUpOutcome::Session(session) => {
            tracing::info!(user_id = ?session.user.as_ref().map(|u| u.id), "Sign-up signed in");
            let jar = state.propagate(jar, AuthEvent::SignedIn, Some(&session));
            Ok((jar, Redirect::to(&settings.default_next)))
        }
        SignUpOutcome::ConfirmationRequired(user) => {
            tracing::info!(user_id = %user.id, "Sign-up awaiting email confirmation");
            let verifier = cookies::code_verifier_cookie(
                &code_verifier,
                settings.secure_cookies,
                &settings.auth_path,
            );
            let location = format!("{}?message=check_email", settings.login_path);
            Ok((jar.add(verifier), Redirect::to(&location)))
        }
    }
}

// ── Sign-out ───────────────────────────────────────────────────────

async fn sign_out<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(access_token) = SessionTokens::from_jar(&jar).access_token {
        if let Err(e) = state.provider.sign_out(&access_token).await {
            tracing::warn!(error = %e, "Provider sign-out failed; clearing cookies anyway");
        }
    }

    let jar = state.propagate(jar, AuthEvent::SignedOut, None);
    (jar, Redirect::to(&state.settings.signed_out_redirect))
}

// ── Session ────────────────────────────────────────────────────────

/// Initial-load session check. Every outcome emits one `InitialSession`;
/// cookies are only written when the provider changed or refused them.
async fn current_session<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    jar: CookieJar,
) -> Response {
    let tokens = SessionTokens::from_jar(&jar);
    match verify_tokens(state.provider.as_ref(), &tokens).await {
        Verification::Current(user) => {
            let access_token = tokens.access_token.unwrap_or_default();
            let session = Session::new(access_token, tokens.refresh_token.unwrap_or_default())
                .with_user(user.clone());
            state.events.emit(AuthEvent::InitialSession, Some(&session));
            Json(user).into_response()
        }
        Verification::Refreshed(user, session) => {
            let jar = state.propagate(jar, AuthEvent::InitialSession, Some(&session));
            (jar, Json(user)).into_response()
        }
        Verification::Rejected if !tokens.is_empty() => {
            let jar = state.propagate(jar, AuthEvent::InitialSession, None);
            (jar, AuthError::Unauthenticated).into_response()
        }
        Verification::Rejected | Verification::Unavailable => {
            state.events.emit(AuthEvent::InitialSession, None);
            AuthError::Unauthenticated.into_response()
        }
    }
}

// ── Profile ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NewProfile {
    username: String,
}

async fn get_profile<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    auth: AuthUser,
) -> Result<Json<Profile>, AuthError> {
    let profile = state
        .profiles
        .get(&auth.access_token, auth.user.id)
        .await
        .map_err(AuthError::Profile)?;
    Ok(Json(profile))
}

async fn create_profile<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    auth: AuthUser,
    Json(body): Json<NewProfile>,
) -> Result<(StatusCode, Json<Profile>), AuthError> {
    let profile = state
        .profiles
        .create(&auth.access_token, auth.user.id, &body.username)
        .await
        .map_err(AuthError::Profile)?;

    tracing::info!(user_id = %profile.id, "Profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn update_profile<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    auth: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, AuthError> {
    let profile = state
        .profiles
        .update(&auth.access_token, auth.user.id, &update)
        .await
        .map_err(AuthError::Profile)?;
    Ok(Json(profile))
}
