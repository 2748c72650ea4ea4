//! Cookie-based session middleware for Axum.
//!
//! Wires a hosted identity provider into an Axum app: OAuth and password
//! sign-in, the authorization-code callback, session cookies, and a guard
//! that keeps anonymous visitors off protected pages.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use base_app_auth::middleware::{AuthUser, SessionAuth, SessionAuthConfig};
//! use base_app_auth::profiles::RestProfileStore;
//!
//! // 1. Configure from environment
//! let config = SessionAuthConfig::from_env()?;
//! let profiles = RestProfileStore::new(config.provider().config().clone());
//!
//! // 2. Build once, share between routes and guard
//! let auth = SessionAuth::new(config, profiles);
//!
//! // 3. Guard the pages, mount the auth routes
//! let app = auth
//!     .protect(axum::Router::new().route("/dashboard", get(dashboard)))
//!     .merge(auth.routes());
//!
//! // 4. Use AuthUser in handlers
//! async fn dashboard(user: AuthUser) -> String {
//!     format!("Hello, {}", user.user.email.unwrap_or_default())
//! }
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod guard;
mod propagation;
mod routes;
mod state;

pub use config::SessionAuthConfig;
pub use cookies::{
    ACCESS_TOKEN_COOKIE, CookieOptions, DEFAULT_ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_COOKIE,
    REFRESH_TOKEN_TTL, SessionTokens,
};
pub use error::AuthError;
pub use extractor::AuthUser;
pub use guard::{GuardDecision, GuardPolicy, PathMatcher, RouteGuard};
pub use propagation::{AuthEvent, AuthEvents, SubscriptionId, propagate_session};
pub use routes::SessionAuth;
pub use state::AuthState;
