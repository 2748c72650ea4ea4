use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum_extra::extract::cookie::CookieJar;
use parking_lot::RwLock;

use super::cookies::{self, CookieOptions};
use crate::types::Session;

/// Why the current session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Session found (or found missing) on first load.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Handle returned by [`AuthEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

/// Dispatcher for session transitions.
///
/// Listeners are registered and removed explicitly; every propagation
/// notifies each registered listener once, in registration order.
#[derive(Default)]
pub struct AuthEvents {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl AuthEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(AuthEvent, Option<&Session>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when `id` was not (or no longer) registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        tracing::debug!(?event, listeners = listeners.len(), "Dispatching auth event");
        for listener in listeners {
            listener(event, session);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Mirror `session` (or its absence) into the response cookie jar.
///
/// `Some` writes both token cookies; `None` writes expired replacements for both.
#[must_use]
pub fn propagate_session(
    jar: CookieJar,
    session: Option<&Session>,
    options: CookieOptions,
) -> CookieJar {
    let (access, refresh) = match session {
        Some(session) => cookies::session_cookies(session, options),
        None => cookies::cleared_session_cookies(options),
    };
    jar.add(access).add(refresh)
}
