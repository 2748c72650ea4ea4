use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;

use super::config::AuthSettings;
use super::guard::RouteGuard;
use super::propagation::{AuthEvent, AuthEvents, propagate_session};
use crate::identity::IdentityProvider;
use crate::profiles::ProfileStore;
use crate::types::Session;

/// Shared state for auth route handlers, the route guard and [`AuthUser`](super::AuthUser).
pub struct AuthState<I, P> {
    pub(super) provider: Arc<I>,
    pub(super) profiles: Arc<P>,
    pub(super) guard: Arc<RouteGuard<I>>,
    pub(super) events: Arc<AuthEvents>,
    pub(super) settings: AuthSettings,
}

// Manual Clone: avoid derive adding `I: Clone, P: Clone` bounds.
impl<I, P> Clone for AuthState<I, P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            profiles: self.profiles.clone(),
            guard: self.guard.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<I: IdentityProvider, P: ProfileStore> AuthState<I, P> {
    #[must_use]
    pub fn provider(&self) -> &I {
        &self.provider
    }

    #[must_use]
    pub fn profiles(&self) -> &P {
        &self.profiles
    }

    #[must_use]
    pub fn events(&self) -> &Arc<AuthEvents> {
        &self.events
    }

    #[must_use]
    pub fn guard(&self) -> &RouteGuard<I> {
        &self.guard
    }

    /// Write the session cookies and notify listeners: one call per transition.
    pub(super) fn propagate(
        &self,
        jar: CookieJar,
        event: AuthEvent,
        session: Option<&Session>,
    ) -> CookieJar {
        let jar = propagate_session(jar, session, self.settings.cookie_options());
        self.events.emit(event, session);
        jar
    }
}
