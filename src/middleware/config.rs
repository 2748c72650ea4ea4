use url::Url;

use super::cookies::CookieOptions;
use super::error::AuthError;
use super::guard::{GuardPolicy, PathMatcher};
use crate::identity::{IdentityClient, IdentityConfig};

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) site_url: Url,
    pub(crate) auth_path: String,
    pub(crate) login_path: String,
    pub(crate) default_next: String,
    pub(crate) signed_out_redirect: String,
    pub(crate) profile_path: String,
    pub(crate) secure_cookies: bool,
    pub(crate) http_only_cookies: bool,
    pub(crate) trust_forwarded_host: bool,
    pub(crate) guard_policy: GuardPolicy,
    pub(crate) matcher: PathMatcher,
    pub(crate) preserve_next: bool,
}

impl AuthSettings {
    fn defaults(site_url: Url) -> Self {
        Self {
            secure_cookies: site_url.scheme() == "https",
            site_url,
            auth_path: "/auth".into(),
            login_path: "/login".into(),
            default_next: "/dashboard".into(),
            signed_out_redirect: "/".into(),
            profile_path: "/api/profile".into(),
            http_only_cookies: true,
            trust_forwarded_host: false,
            guard_policy: GuardPolicy::default(),
            matcher: PathMatcher::default(),
            preserve_next: false,
        }
    }

    pub(crate) fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.secure_cookies,
            http_only: self.http_only_cookies,
        }
    }

    /// Absolute callback URL handed to the provider as `redirect_to`.
    pub(crate) fn callback_url(&self, next: Option<&str>) -> Result<Url, AuthError> {
        let mut url = self
            .site_url
            .join(&format!("{}/callback", self.auth_path))
            .map_err(|e| AuthError::Config(format!("callback URL: {e}")))?;
        if let Some(next) = next {
            url.query_pairs_mut().append_pair("next", next);
        }
        Ok(url)
    }
}

const DEFAULT_SITE_URL: &str = "http://localhost:3000";

/// Session authentication configuration.
///
/// The identity provider is a constructor parameter; everything else has a default.
///
/// Use [`from_env()`](SessionAuthConfig::from_env) for convention-based setup,
/// or [`new()`](SessionAuthConfig::new) with `with_*` methods for full control.
pub struct SessionAuthConfig<I> {
    pub(super) provider: I,
    pub(super) settings: AuthSettings,
}

impl<I> SessionAuthConfig<I> {
    /// Create config around `provider`, with the site served at `http://localhost:3000`.
    #[must_use]
    pub fn new(provider: I) -> Self {
        // DEFAULT_SITE_URL is a literal absolute http URL; parsing it cannot fail.
        let site_url = Url::parse(DEFAULT_SITE_URL).expect("valid default URL");
        Self {
            provider,
            settings: AuthSettings::defaults(site_url),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &I {
        &self.provider
    }

    /// Public origin of this site. Also turns `Secure` cookies on for `https`.
    #[must_use]
    pub fn with_site_url(mut self, url: Url) -> Self {
        self.settings.secure_cookies = url.scheme() == "https";
        self.settings.site_url = url;
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.settings.login_path = path.into();
        self
    }

    /// Where to land after sign-in when the callback carries no `next`.
    #[must_use]
    pub fn with_default_next(mut self, path: impl Into<String>) -> Self {
        self.settings.default_next = path.into();
        self
    }

    #[must_use]
    pub fn with_signed_out_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.signed_out_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.settings.profile_path = path.into();
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_http_only_cookies(mut self, http_only: bool) -> Self {
        self.settings.http_only_cookies = http_only;
        self
    }

    /// Redirect to `https://<x-forwarded-host><next>` after the callback.
    #[must_use]
    pub fn with_trust_forwarded_host(mut self, trust: bool) -> Self {
        self.settings.trust_forwarded_host = trust;
        self
    }

    #[must_use]
    pub fn with_guard_policy(mut self, policy: GuardPolicy) -> Self {
        self.settings.guard_policy = policy;
        self
    }

    #[must_use]
    pub fn with_path_matcher(mut self, matcher: PathMatcher) -> Self {
        self.settings.matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_preserve_next(mut self, preserve: bool) -> Self {
        self.settings.preserve_next = preserve;
        self
    }
}

impl SessionAuthConfig<IdentityClient> {
    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SUPABASE_URL`: project URL
    /// - `SUPABASE_ANON_KEY`: public API key
    ///
    /// # Optional env vars
    /// - `SITE_URL`: public origin of this site (default `http://localhost:3000`)
    /// - `AUTH_GUARD_POLICY`: `cookie` or `verified` (default)
    /// - `AUTH_PROTECTED_PATHS`: comma-separated path prefixes (default `/dashboard`)
    /// - `AUTH_PRESERVE_NEXT`: keep the original destination on login redirects
    /// - `COOKIE_SECURE`: override the `Secure` cookie flag
    /// - `TRUST_FORWARDED_HOST`: honour `x-forwarded-host` after the callback
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let project_url: Url = var("SUPABASE_URL")
            .ok_or_else(|| AuthError::Config("SUPABASE_URL is required".into()))?
            .parse()
            .map_err(|e| AuthError::Config(format!("SUPABASE_URL: {e}")))?;
        let anon_key = var("SUPABASE_ANON_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AuthError::Config("SUPABASE_ANON_KEY is required".into()))?;

        let client = IdentityClient::new(IdentityConfig::new(project_url, anon_key));
        let mut config = Self::new(client);

        if let Some(site_url) = var("SITE_URL") {
            let url: Url = site_url
                .parse()
                .map_err(|e| AuthError::Config(format!("SITE_URL: {e}")))?;
            config = config.with_site_url(url);
        }
        if let Some(policy) = var("AUTH_GUARD_POLICY") {
            config = config.with_guard_policy(policy.parse()?);
        }
        if let Some(paths) = var("AUTH_PROTECTED_PATHS") {
            let paths: Vec<String> = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect();
            config = config.with_path_matcher(PathMatcher::new(paths));
        }
        if let Some(preserve) = parse_bool(&var, "AUTH_PRESERVE_NEXT")? {
            config = config.with_preserve_next(preserve);
        }
        if let Some(secure) = parse_bool(&var, "COOKIE_SECURE")? {
            config = config.with_secure_cookies(secure);
        }
        if let Some(trust) = parse_bool(&var, "TRUST_FORWARDED_HOST")? {
            config = config.with_trust_forwarded_host(trust);
        }

        Ok(config)
    }
}

fn parse_bool(var: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>, AuthError> {
    let Some(raw) = var(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(AuthError::Config(format!("{key}: expected a boolean, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("SUPABASE_URL", "https://abcd.supabase.co"),
        ("SUPABASE_ANON_KEY", "anon-key"),
    ];

    #[test]
    fn required_vars_and_defaults() {
        let config = SessionAuthConfig::from_vars(vars(&REQUIRED)).unwrap();
        let settings = &config.settings;

        assert_eq!(config.provider.config().anon_key(), "anon-key");
        assert_eq!(settings.site_url.as_str(), "http://localhost:3000/");
        assert_eq!(settings.guard_policy, GuardPolicy::VerifiedSession);
        assert!(!settings.secure_cookies);
        assert!(settings.http_only_cookies);
        assert!(settings.matcher.is_protected("/dashboard"));
        assert!(!settings.preserve_next);
    }

    #[test]
    fn missing_project_url_is_config_error() {
        let err = SessionAuthConfig::from_vars(vars(&[("SUPABASE_ANON_KEY", "k")])).err();
        assert!(matches!(err, Some(AuthError::Config(msg)) if msg.contains("SUPABASE_URL")));
    }

    #[test]
    fn empty_anon_key_is_config_error() {
        let err = SessionAuthConfig::from_vars(vars(&[
            ("SUPABASE_URL", "https://abcd.supabase.co"),
            ("SUPABASE_ANON_KEY", ""),
        ]))
        .err();
        assert!(matches!(err, Some(AuthError::Config(_))));
    }

    #[test]
    fn optional_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SITE_URL", "https://app.example.com"),
            ("AUTH_GUARD_POLICY", "cookie"),
            ("AUTH_PROTECTED_PATHS", "/dashboard, /settings/*"),
            ("AUTH_PRESERVE_NEXT", "yes"),
            ("TRUST_FORWARDED_HOST", "1"),
        ]);
        let config = SessionAuthConfig::from_vars(vars(&pairs)).unwrap();
        let settings = &config.settings;

        assert!(settings.secure_cookies);
        assert_eq!(settings.guard_policy, GuardPolicy::CookiePresence);
        assert!(settings.matcher.is_protected("/settings/profile"));
        assert!(settings.preserve_next);
        assert!(settings.trust_forwarded_host);
    }

    #[test]
    fn cookie_secure_overrides_site_scheme() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("SITE_URL", "https://app.example.com"), ("COOKIE_SECURE", "off")]);
        let config = SessionAuthConfig::from_vars(vars(&pairs)).unwrap();
        assert!(!config.settings.secure_cookies);
    }

    #[test]
    fn invalid_boolean_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("COOKIE_SECURE", "maybe"));
        assert!(SessionAuthConfig::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn builder_defaults_to_local_http_site() {
        let config = SessionAuthConfig::new(());
        assert_eq!(config.settings.site_url.as_str(), "http://localhost:3000/");
        assert!(!config.settings.secure_cookies);
        assert_eq!(config.settings.login_path, "/login");
    }

    #[test]
    fn callback_url_carries_next() {
        let config = SessionAuthConfig::new(())
            .with_site_url("https://app.example.com".parse().unwrap());
        let url = config.settings.callback_url(Some("/dashboard/billing")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://app.example.com/auth/callback?next=%2Fdashboard%2Fbilling"
        );
    }
}
