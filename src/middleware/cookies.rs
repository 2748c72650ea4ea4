use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use crate::types::Session;

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
const CODE_VERIFIER_COOKIE: &str = "sb-code-verifier";

/// Access cookie lifetime when the provider omits `expires_in`.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 3600;
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(7);
const CODE_VERIFIER_TTL: Duration = Duration::minutes(10);

/// Attributes shared by the session cookie pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieOptions {
    pub secure: bool,
    pub http_only: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            secure: true,
            http_only: true,
        }
    }
}

/// Tokens found in an incoming request. Empty cookie values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    #[must_use]
    pub fn from_jar(jar: &CookieJar) -> Self {
        Self {
            access_token: non_empty(jar, ACCESS_TOKEN_COOKIE),
            refresh_token: non_empty(jar, REFRESH_TOKEN_COOKIE),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

fn non_empty(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn base_cookie(name: &'static str, value: String, options: CookieOptions) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(options.secure)
        .http_only(options.http_only)
        .build()
}

/// Access + refresh cookies for `session`.
pub(super) fn session_cookies(
    session: &Session,
    options: CookieOptions,
) -> (Cookie<'static>, Cookie<'static>) {
    let access_ttl = session.expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS);
    let mut access = base_cookie(ACCESS_TOKEN_COOKIE, session.access_token.clone(), options);
    access.set_max_age(Duration::seconds(i64::try_from(access_ttl).unwrap_or(i64::MAX)));

    let mut refresh = base_cookie(REFRESH_TOKEN_COOKIE, session.refresh_token.clone(), options);
    refresh.set_max_age(REFRESH_TOKEN_TTL);

    (access, refresh)
}

/// Expired, empty replacements for both session cookies.
pub(super) fn cleared_session_cookies(options: CookieOptions) -> (Cookie<'static>, Cookie<'static>) {
    let expire = |mut cookie: Cookie<'static>| {
        cookie.set_max_age(Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        cookie
    };
    (
        expire(base_cookie(ACCESS_TOKEN_COOKIE, String::new(), options)),
        expire(base_cookie(REFRESH_TOKEN_COOKIE, String::new(), options)),
    )
}

/// Cookie holding the PKCE verifier between authorize and callback.
pub(super) fn code_verifier_cookie(verifier: &str, secure: bool, auth_path: &str) -> Cookie<'static> {
    Cookie::build((CODE_VERIFIER_COOKIE, verifier.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(auth_path.to_string())
        .max_age(CODE_VERIFIER_TTL)
        .build()
}

pub(super) fn clear_code_verifier_cookie(auth_path: &str) -> Cookie<'static> {
    Cookie::build((CODE_VERIFIER_COOKIE, ""))
        .path(auth_path.to_string())
        .max_age(Duration::ZERO)
        .build()
}

pub(super) fn get_code_verifier(jar: &CookieJar) -> Option<String> {
    non_empty(jar, CODE_VERIFIER_COOKIE)
}
