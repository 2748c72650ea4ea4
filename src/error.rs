#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity provider or data API answered with a non-success status.
    #[error("{operation} failed ({status}): {message}")]
    Provider {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
    /// The provider accepted the request but handed back no session.
    #[error("Provider returned no session")]
    NoSession,
    #[error("Profile not found")]
    ProfileNotFound,
    #[error("Profile already exists")]
    ProfileConflict,
}

impl Error {
    /// Provider-supplied message, if this error came from the provider.
    #[must_use]
    pub fn provider_message(&self) -> Option<&str> {
        match self {
            Self::Provider { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The provider looked at the credentials and refused them (4xx).
    ///
    /// Transport failures and 5xx answers say nothing about the credentials.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Provider { status, .. } if (400..500).contains(status))
    }

    pub(crate) async fn from_response(response: reqwest::Response, operation: &'static str) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = extract_message(&body).unwrap_or(body);
        Self::Provider {
            operation,
            status,
            message,
        }
    }
}

/// Returns the response on success, or a [`Error::Provider`] carrying its details.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(Error::from_response(response, operation).await)
}

// GoTrue and PostgREST disagree on the field that carries the human-readable text.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(key)?.as_str().map(str::to_owned))
}
