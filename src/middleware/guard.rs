use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use super::cookies::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, SessionTokens};
use super::error::AuthError;
use super::propagation::AuthEvent;
use super::state::AuthState;
use crate::error::Error;
use crate::identity::IdentityProvider;
use crate::profiles::ProfileStore;
use crate::types::{Session, User};

/// How the guard decides that a request is authenticated.
///
/// Pick one per deployment; the two give different guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardPolicy {
    /// Non-empty access-token cookie. No network call, no validity check.
    CookiePresence,
    /// Provider confirms the user behind the cookies, refreshing if needed.
    #[default]
    VerifiedSession,
}

impl FromStr for GuardPolicy {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" | "cookie-presence" => Ok(Self::CookiePresence),
            "verified" | "verified-session" => Ok(Self::VerifiedSession),
            other => Err(AuthError::Config(format!(
                "unknown guard policy '{other}' (expected 'cookie' or 'verified')"
            ))),
        }
    }
}

/// Which request paths the guard protects.
///
/// Protected entries are path prefixes matched on segment boundaries;
/// a trailing `/*` or `/**` is accepted and ignored. Static assets are
/// never protected, so redirects cannot loop on them.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    protected: Vec<String>,
    asset_prefixes: Vec<String>,
    asset_extensions: Vec<String>,
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self::new(["/dashboard"])
    }
}

impl PathMatcher {
    #[must_use]
    pub fn new<I, S>(protected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protected: protected.into_iter().map(Into::into).collect(),
            asset_prefixes: ["/static", "/assets", "/_next"]
                .map(String::from)
                .to_vec(),
            asset_extensions: ["svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "css", "js", "map"]
                .map(String::from)
                .to_vec(),
        }
    }

    #[must_use]
    pub fn with_asset_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn is_static_asset(&self, path: &str) -> bool {
        if self.asset_prefixes.iter().any(|p| matches_prefix(path, p)) {
            return true;
        }
        let file = path.rsplit('/').next().unwrap_or(path);
        file.rsplit_once('.').is_some_and(|(_, ext)| {
            self.asset_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
    }

    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        !self.is_static_asset(path) && self.protected.iter().any(|p| matches_prefix(path, p))
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix
        .trim_end_matches("/**")
        .trim_end_matches("/*")
        .trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Public path, or the cookie-presence policy is satisfied.
    Allow,
    /// The provider confirmed the user behind the current cookies.
    AllowVerified(User),
    /// Allowed, but the provider issued new tokens that must reach the browser.
    AllowRefreshed { user: User, session: Session },
    Redirect {
        location: String,
        /// Stale session cookies should be removed along with the redirect.
        clear_session: bool,
    },
}

/// What the provider said about a request's tokens.
#[derive(Debug, Clone)]
pub(crate) enum Verification {
    Current(User),
    Refreshed(User, Session),
    /// No tokens, or the provider refused them.
    Rejected,
    /// The provider could not be asked (transport failure or 5xx).
    Unavailable,
}

/// User the route guard already verified for this request.
#[derive(Debug, Clone)]
pub(crate) struct VerifiedUser(pub(crate) User);

fn failed(e: &Error, what: &str) -> Verification {
    if e.is_rejection() {
        tracing::debug!(error = %e, "{what} rejected");
        Verification::Rejected
    } else {
        tracing::warn!(error = %e, "{what} failed; keeping session cookies");
        Verification::Unavailable
    }
}

/// Ask the provider who owns the request's tokens, refreshing when the access
/// token is missing or rejected.
pub(crate) async fn verify_tokens<I: IdentityProvider>(
    provider: &I,
    tokens: &SessionTokens,
) -> Verification {
    if let Some(access_token) = &tokens.access_token {
        match provider.get_user(access_token).await {
            Ok(user) => return Verification::Current(user),
            Err(e) if !e.is_rejection() => return failed(&e, "Access token check"),
            Err(e) => tracing::debug!(error = %e, "Access token rejected"),
        }
    }

    let Some(refresh_token) = tokens.refresh_token.as_deref() else {
        return Verification::Rejected;
    };
    let session = match provider.refresh_session(refresh_token).await {
        Ok(session) => session,
        Err(e) => return failed(&e, "Session refresh"),
    };

    let user = match &session.user {
        Some(user) => user.clone(),
        None => match provider.get_user(&session.access_token).await {
            Ok(user) => user,
            Err(e) => return failed(&e, "Refreshed session user lookup"),
        },
    };

    tracing::debug!(user_id = %user.id, "Session refreshed");
    Verification::Refreshed(user, session)
}

/// Request-interception policy for protected paths.
pub struct RouteGuard<I> {
    provider: Arc<I>,
    policy: GuardPolicy,
    matcher: PathMatcher,
    login_path: String,
    preserve_next: bool,
}

impl<I: IdentityProvider> RouteGuard<I> {
    #[must_use]
    pub fn new(provider: Arc<I>, policy: GuardPolicy) -> Self {
        Self {
            provider,
            policy,
            matcher: PathMatcher::default(),
            login_path: "/login".into(),
            preserve_next: false,
        }
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: PathMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Append `?next=<original path>` to the login redirect.
    #[must_use]
    pub fn with_preserve_next(mut self, preserve: bool) -> Self {
        self.preserve_next = preserve;
        self
    }

    #[must_use]
    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    pub async fn decide(&self, uri: &Uri, jar: &CookieJar) -> GuardDecision {
        if !self.matcher.is_protected(uri.path()) {
            return GuardDecision::Allow;
        }

        let tokens = SessionTokens::from_jar(jar);
        match self.policy {
            GuardPolicy::CookiePresence => {
                if tokens.access_token.is_some() {
                    GuardDecision::Allow
                } else {
                    self.redirect(uri, false)
                }
            }
            GuardPolicy::VerifiedSession => match verify_tokens(self.provider.as_ref(), &tokens).await {
                Verification::Current(user) => GuardDecision::AllowVerified(user),
                Verification::Refreshed(user, session) => {
                    GuardDecision::AllowRefreshed { user, session }
                }
                Verification::Rejected => self.redirect(uri, !tokens.is_empty()),
                Verification::Unavailable => self.redirect(uri, false),
            },
        }
    }

    fn redirect(&self, uri: &Uri, clear_session: bool) -> GuardDecision {
        let location = if self.preserve_next {
            let next = uri
                .path_and_query()
                .map_or_else(|| uri.path(), |pq| pq.as_str());
            format!("{}?next={}", self.login_path, urlencoding::encode(next))
        } else {
            self.login_path.clone()
        };
        tracing::debug!(path = %uri.path(), %location, "Unauthenticated request redirected");
        GuardDecision::Redirect {
            location,
            clear_session,
        }
    }
}

/// Axum middleware applying the configured [`RouteGuard`].
///
/// A verified user is left in the request extensions for [`AuthUser`](super::AuthUser).
pub(super) async fn route_guard<I: IdentityProvider, P: ProfileStore>(
    State(state): State<AuthState<I, P>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match state.guard.decide(request.uri(), &jar).await {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::AllowVerified(user) => {
            request.extensions_mut().insert(VerifiedUser(user));
            next.run(request).await
        }
        GuardDecision::AllowRefreshed { user, session } => {
            rewrite_request_cookies(request.headers_mut(), &jar, &session);
            request.extensions_mut().insert(VerifiedUser(user));
            let response = next.run(request).await;
            let jar = state.propagate(CookieJar::new(), AuthEvent::TokenRefreshed, Some(&session));
            (jar, response).into_response()
        }
        GuardDecision::Redirect {
            location,
            clear_session,
        } => {
            let jar = if clear_session {
                state.propagate(CookieJar::new(), AuthEvent::SignedOut, None)
            } else {
                CookieJar::new()
            };
            (jar, Redirect::temporary(&location)).into_response()
        }
    }
}

/// Replace the request's session cookies so downstream handlers see refreshed tokens.
fn rewrite_request_cookies(headers: &mut HeaderMap, jar: &CookieJar, session: &Session) {
    let mut pairs: Vec<String> = jar
        .iter()
        .filter(|c| c.name() != ACCESS_TOKEN_COOKIE && c.name() != REFRESH_TOKEN_COOKIE)
        .map(|c| c.stripped().encoded().to_string())
        .collect();
    for (name, value) in [
        (ACCESS_TOKEN_COOKIE, &session.access_token),
        (REFRESH_TOKEN_COOKIE, &session.refresh_token),
    ] {
        pairs.push(Cookie::new(name, value.clone()).stripped().encoded().to_string());
    }

    match HeaderValue::from_str(&pairs.join("; ")) {
        Ok(value) => {
            headers.remove(COOKIE);
            headers.insert(COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Refreshed tokens are not a valid cookie header"),
    }
}
