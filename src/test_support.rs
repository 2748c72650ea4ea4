//! In-memory identity provider and profile store for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use time::OffsetDateTime;
use url::Url;

use crate::error::Error;
use crate::identity::{AuthorizationRequest, IdentityProvider};
use crate::profiles::ProfileStore;
use crate::types::{Profile, ProfileUpdate, Session, SignUpOutcome, User, UserId};

pub(crate) const TEST_USER_ID: &str = "8d0f3c1e-0a4b-4d8e-9b1e-2f6a1c3d5e7f";
pub(crate) const TEST_EMAIL: &str = "ada@example.com";
pub(crate) const TEST_PASSWORD: &str = "correct horse";

pub(crate) fn test_user() -> User {
    User::new(TEST_USER_ID.parse().unwrap()).with_email(TEST_EMAIL)
}

fn provider_error(operation: &'static str, status: u16, message: &str) -> Error {
    Error::Provider {
        operation,
        status,
        message: message.into(),
    }
}

/// Scripted provider: codes and refresh tokens are consumed on use.
#[derive(Default)]
pub(crate) struct MockIdentity {
    codes: Mutex<HashMap<String, Session>>,
    users: Mutex<HashMap<String, User>>,
    refreshes: Mutex<HashMap<String, Session>>,
    pub(crate) last_verifier: Mutex<Option<String>>,
    exchange_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    user_lookups: AtomicUsize,
    unavailable: bool,
}

impl MockIdentity {
    pub(crate) fn with_code(self, code: &str, session: Session) -> Self {
        self.codes.lock().insert(code.into(), session);
        self
    }

    pub(crate) fn with_user(self, access_token: &str, user: User) -> Self {
        self.users.lock().insert(access_token.into(), user);
        self
    }

    pub(crate) fn with_refresh(self, refresh_token: &str, session: Session) -> Self {
        self.refreshes.lock().insert(refresh_token.into(), session);
        self
    }

    /// Every token check and refresh answers 503.
    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub(crate) fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    fn password_session() -> Session {
        Session::new("password-access", "password-refresh")
            .with_expires_in(3600)
            .with_user(test_user())
    }
}

impl IdentityProvider for MockIdentity {
    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, Error> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_verifier.lock() = code_verifier.map(str::to_owned);
        self.codes
            .lock()
            .remove(code)
            .ok_or_else(|| provider_error("code exchange", 400, "invalid flow state"))
    }

    async fn get_user(&self, access_token: &str) -> Result<User, Error> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(provider_error("user lookup", 503, "upstream unavailable"));
        }
        self.users
            .lock()
            .get(access_token)
            .cloned()
            .ok_or_else(|| provider_error("user lookup", 401, "invalid JWT"))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, Error> {
        if self.unavailable {
            return Err(provider_error("token refresh", 503, "upstream unavailable"));
        }
        self.refreshes
            .lock()
            .remove(refresh_token)
            .ok_or_else(|| provider_error("token refresh", 400, "Invalid Refresh Token"))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        if email == TEST_EMAIL && password == TEST_PASSWORD {
            Ok(Self::password_session())
        } else {
            Err(provider_error("password sign-in", 400, "Invalid login credentials"))
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _redirect_to: Option<&Url>,
        _code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, Error> {
        if email.starts_with("auto") {
            Ok(SignUpOutcome::Session(Self::password_session()))
        } else {
            Ok(SignUpOutcome::ConfirmationRequired(
                User::new(TEST_USER_ID.parse().unwrap()).with_email(email),
            ))
        }
    }

    fn sign_in_with_oauth(&self, provider: &str, redirect_to: &Url) -> AuthorizationRequest {
        AuthorizationRequest::new(
            format!(
                "https://id.test/authorize?provider={provider}&redirect_to={}",
                urlencoding::encode(redirect_to.as_str())
            ),
            "verifier-123",
        )
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), Error> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Profiles kept in a map; uniqueness enforced on id like the real table.
#[derive(Default)]
pub(crate) struct MemoryProfiles {
    rows: Mutex<HashMap<UserId, Profile>>,
}

impl ProfileStore for MemoryProfiles {
    async fn get(&self, _access_token: &str, user_id: UserId) -> Result<Profile, Error> {
        self.rows
            .lock()
            .get(&user_id)
            .cloned()
            .ok_or(Error::ProfileNotFound)
    }

    async fn create(
        &self,
        _access_token: &str,
        user_id: UserId,
        username: &str,
    ) -> Result<Profile, Error> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&user_id) {
            return Err(Error::ProfileConflict);
        }
        let profile = Profile {
            id: user_id,
            username: Some(username.into()),
            created_at: OffsetDateTime::now_utc(),
        };
        rows.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn update(
        &self,
        _access_token: &str,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, Error> {
        let mut rows = self.rows.lock();
        let profile = rows.get_mut(&user_id).ok_or(Error::ProfileNotFound)?;
        if let Some(username) = &update.username {
            profile.username = Some(username.clone());
        }
        Ok(profile.clone())
    }
}
