use std::future::Future;

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use url::Url;

use crate::error::{Error, ensure_success};
use crate::pkce;
use crate::types::{Session, SignUpOutcome, User};

/// Connection settings for the hosted project (identity + REST APIs).
///
/// ```rust,ignore
/// use base_app_auth::IdentityConfig;
///
/// let config = IdentityConfig::new("https://abcd.supabase.co".parse()?, "anon-key");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct IdentityConfig {
    pub(crate) project_url: Url,
    pub(crate) anon_key: String,
}

impl IdentityConfig {
    #[must_use]
    pub fn new(project_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            project_url,
            anon_key: anon_key.into(),
        }
    }

    /// Base URL of the hosted project.
    #[must_use]
    pub fn project_url(&self) -> &Url {
        &self.project_url
    }

    /// Public (anon) API key sent as `apikey` on every request.
    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Appends `path` to the project URL, keeping any base path.
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.project_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.split('/'));
        }
        url
    }

    /// Request with the project key and a bearer token (the anon key when no user token).
    pub(crate) fn request(
        &self,
        http: &reqwest::Client,
        method: Method,
        url: Url,
        bearer: Option<&str>,
    ) -> RequestBuilder {
        http.request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key))
    }
}

/// Provider authorization URL plus the PKCE verifier to keep until the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub code_verifier: String,
}

impl AuthorizationRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, code_verifier: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            code_verifier: code_verifier.into(),
        }
    }
}

/// Operations consumed from the identity provider.
///
/// [`IdentityClient`] talks to the real service; tests and alternative
/// transports implement this directly.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Trade a one-time authorization code for a session.
    ///
    /// Codes are single-use: a second call with the same code must fail.
    fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> impl Future<Output = Result<Session, Error>> + Send;

    /// Resolve the user owning `access_token`. Fails when the token is invalid or expired.
    fn get_user(&self, access_token: &str) -> impl Future<Output = Result<User, Error>> + Send;

    fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Session, Error>> + Send;

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, Error>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&Url>,
        code_challenge: Option<&str>,
    ) -> impl Future<Output = Result<SignUpOutcome, Error>> + Send;

    /// Build the URL that starts an OAuth sign-in with `provider`.
    fn sign_in_with_oauth(&self, provider: &str, redirect_to: &Url) -> AuthorizationRequest;

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// HTTP client for the hosted identity API (`/auth/v1`).
pub struct IdentityClient {
    config: IdentityConfig,
    http: reqwest::Client,
}

impl IdentityClient {
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    fn token_url(&self, grant_type: &str) -> Url {
        let mut url = self.config.endpoint("auth/v1/token");
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        url
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: &JsonValue,
        operation: &'static str,
    ) -> Result<Session, Error> {
        let response = self
            .config
            .request(&self.http, Method::POST, self.token_url(grant_type), None)
            .json(body)
            .send()
            .await?;

        let response = ensure_success(response, operation).await?;
        session_from_body(response.json().await?)
    }

    /// Exchange a PKCE authorization code for a session.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`] when the code is expired, already used or unknown;
    /// [`Error::NoSession`] when the provider answers without tokens.
    pub async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, Error> {
        let body = json!({
            "auth_code": code,
            "code_verifier": code_verifier.unwrap_or_default(),
        });
        self.token_grant("pkce", &body, "code exchange").await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, Error> {
        let body = json!({ "refresh_token": refresh_token });
        self.token_grant("refresh_token", &body, "token refresh").await
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        let body = json!({ "email": email, "password": password });
        self.token_grant("password", &body, "password sign-in").await
    }

    pub async fn get_user(&self, access_token: &str) -> Result<User, Error> {
        let response = self
            .config
            .request(
                &self.http,
                Method::GET,
                self.config.endpoint("auth/v1/user"),
                Some(access_token),
            )
            .send()
            .await?;

        let response = ensure_success(response, "user lookup").await?;
        response.json::<User>().await.map_err(Into::into)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&Url>,
        code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, Error> {
        let mut url = self.config.endpoint("auth/v1/signup");
        if let Some(redirect_to) = redirect_to {
            url.query_pairs_mut()
                .append_pair("redirect_to", redirect_to.as_str());
        }

        let mut body = json!({ "email": email, "password": password });
        if let Some(challenge) = code_challenge {
            body["code_challenge"] = json!(challenge);
            body["code_challenge_method"] = json!(pkce::CODE_CHALLENGE_METHOD);
        }

        let response = self
            .config
            .request(&self.http, Method::POST, url, None)
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response, "sign-up").await?;
        let body: JsonValue = response.json().await?;

        // Without email confirmation the provider answers with a session,
        // otherwise with the bare (unconfirmed) user.
        if has_access_token(&body) {
            session_from_body(body).map(SignUpOutcome::Session)
        } else {
            let user = match body.get("user") {
                Some(user) => User::deserialize(user)?,
                None => User::deserialize(&body)?,
            };
            Ok(SignUpOutcome::ConfirmationRequired(user))
        }
    }

    /// Generate the provider authorization URL with PKCE parameters.
    #[must_use]
    pub fn authorization_url(&self, provider: &str, redirect_to: &Url) -> AuthorizationRequest {
        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::generate_code_challenge(&code_verifier);

        let mut url = self.config.endpoint("auth/v1/authorize");
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to.as_str())
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", pkce::CODE_CHALLENGE_METHOD);

        AuthorizationRequest {
            url: url.into(),
            code_verifier,
        }
    }

    /// Revoke the session behind `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), Error> {
        let response = self
            .config
            .request(
                &self.http,
                Method::POST,
                self.config.endpoint("auth/v1/logout"),
                Some(access_token),
            )
            .send()
            .await?;

        ensure_success(response, "sign-out").await?;
        Ok(())
    }
}

impl IdentityProvider for IdentityClient {
    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, Error> {
        Self::exchange_code_for_session(self, code, code_verifier).await
    }

    async fn get_user(&self, access_token: &str) -> Result<User, Error> {
        Self::get_user(self, access_token).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, Error> {
        Self::refresh_session(self, refresh_token).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        Self::sign_in_with_password(self, email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&Url>,
        code_challenge: Option<&str>,
    ) -> Result<SignUpOutcome, Error> {
        Self::sign_up(self, email, password, redirect_to, code_challenge).await
    }

    fn sign_in_with_oauth(&self, provider: &str, redirect_to: &Url) -> AuthorizationRequest {
        self.authorization_url(provider, redirect_to)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), Error> {
        Self::sign_out(self, access_token).await
    }
}

fn has_access_token(body: &JsonValue) -> bool {
    body.get("access_token")
        .and_then(JsonValue::as_str)
        .is_some_and(|token| !token.is_empty())
}

fn session_from_body(body: JsonValue) -> Result<Session, Error> {
    if !has_access_token(&body) {
        return Err(Error::NoSession);
    }
    serde_json::from_value(body).map_err(Into::into)
}
