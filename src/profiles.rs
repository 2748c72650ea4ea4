use std::future::Future;

use reqwest::{Method, StatusCode};
use serde_json::json;

use crate::error::{Error, ensure_success};
use crate::identity::IdentityConfig;
use crate::types::{Profile, ProfileUpdate, UserId};

/// Access to the `profiles` table, keyed by user id.
///
/// Every call carries the caller's access token so row-level policies apply.
pub trait ProfileStore: Send + Sync + 'static {
    /// Fails with [`Error::ProfileNotFound`] when the user has no profile yet.
    fn get(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> impl Future<Output = Result<Profile, Error>> + Send;

    /// Fails with [`Error::ProfileConflict`] when a profile already exists.
    fn create(
        &self,
        access_token: &str,
        user_id: UserId,
        username: &str,
    ) -> impl Future<Output = Result<Profile, Error>> + Send;

    /// Fails with [`Error::ProfileNotFound`] when no row matches.
    fn update(
        &self,
        access_token: &str,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<Profile, Error>> + Send;

    /// Like [`get`](Self::get), with "no profile yet" as `None`.
    fn find(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Profile>, Error>> + Send {
        async move {
            match self.get(access_token, user_id).await {
                Ok(profile) => Ok(Some(profile)),
                Err(Error::ProfileNotFound) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}

pub const DEFAULT_PROFILES_TABLE: &str = "profiles";

/// [`ProfileStore`] over the hosted REST API (`/rest/v1/<table>`).
pub struct RestProfileStore {
    config: IdentityConfig,
    table: String,
    http: reqwest::Client,
}

impl RestProfileStore {
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            table: DEFAULT_PROFILES_TABLE.into(),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn table_url(&self, user_id: Option<UserId>) -> url::Url {
        let mut url = self.config.endpoint(&format!("rest/v1/{}", self.table));
        if let Some(id) = user_id {
            url.query_pairs_mut()
                .append_pair("id", &format!("eq.{id}"))
                .append_pair("select", "*");
        }
        url
    }

    async fn single_row(response: reqwest::Response, operation: &'static str) -> Result<Profile, Error> {
        let response = ensure_success(response, operation).await?;
        let rows: Vec<Profile> = response.json().await?;
        rows.into_iter().next().ok_or(Error::ProfileNotFound)
    }
}

impl ProfileStore for RestProfileStore {
    async fn get(&self, access_token: &str, user_id: UserId) -> Result<Profile, Error> {
        let response = self
            .config
            .request(&self.http, Method::GET, self.table_url(Some(user_id)), Some(access_token))
            .send()
            .await?;

        Self::single_row(response, "profile lookup").await
    }

    async fn create(
        &self,
        access_token: &str,
        user_id: UserId,
        username: &str,
    ) -> Result<Profile, Error> {
        let response = self
            .config
            .request(&self.http, Method::POST, self.table_url(None), Some(access_token))
            .header("Prefer", "return=representation")
            .json(&json!({ "id": user_id, "username": username }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(Error::ProfileConflict);
        }
        Self::single_row(response, "profile insert").await
    }

    async fn update(
        &self,
        access_token: &str,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, Error> {
        if update.is_empty() {
            return self.get(access_token, user_id).await;
        }

        let response = self
            .config
            .request(&self.http, Method::PATCH, self.table_url(Some(user_id)), Some(access_token))
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await?;

        Self::single_row(response, "profile update").await
    }
}
