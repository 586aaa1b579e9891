//! HTTP client for the Drishti backend.
//!
//! This module covers every backend endpoint the client consumes:
//! - Authentication (signup, login)
//! - Session CRUD
//! - Streaming chat
//! - Batch image analysis

pub mod auth;
pub mod batch;
pub mod chat;
pub mod config;
pub mod error;
pub mod ids;
pub mod sessions;
pub mod types;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod mock_backend;

pub use config::ClientConfig;
pub use error::{ApiError, ApiResult};
pub use ids::{AnalysisId, AnalysisResultId, MessageId, SessionId, UserId};
pub use types::{
    Attachment, AttachmentRef, AuthResponse, BatchAnalysis, BatchAnalysisDetails, BatchResult,
    CreateAnalysisResponse, Message, Role, Session, SessionDetails, StreamChunk, User,
};

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

/// Client for the backend REST surface.
///
/// Holds no cached state: every call is a fresh request.
#[derive(Clone, Debug)]
pub struct ApiClient {
    config: ClientConfig,
    base_url: Url,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = Self::build_client(&config)?;

        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// Create a new client with default configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_defaults() -> ApiResult<Self> {
        Self::new(ClientConfig::default())
    }

    /// Build the underlying HTTP client.
    ///
    /// No overall timeout is set here: it would cut long chat streams. Plain
    /// requests get `request_timeout` individually.
    fn build_client(config: &ClientConfig) -> ApiResult<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ApiError::Config(format!("cannot build HTTP client: {e}")))
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Normalized base URL (always ends with `/`).
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path against the base URL.
    ///
    /// # Errors
    /// Returns an error if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Absolute, token-bearing URL of a stored attachment or analysed image.
    ///
    /// Absolute inputs are kept as they are; relative ones are resolved
    /// against the base URL.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be built.
    pub fn file_url(&self, file_url: &str, token: &str) -> ApiResult<Url> {
        let mut url = match Url::parse(file_url) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.endpoint(file_url)?,
            Err(e) => return Err(e.into()),
        };
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// Start a bearer-authenticated request with the default timeout.
    pub(crate) fn authorized(
        &self,
        method: Method,
        path: &str,
        token: &str,
    ) -> ApiResult<RequestBuilder> {
        Ok(self
            .request(method, path)?
            .bearer_auth(token)
            .timeout(self.config.request_timeout))
    }

    /// Start an anonymous request with the default timeout.
    pub(crate) fn anonymous(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        Ok(self
            .request(method, path)?
            .timeout(self.config.request_timeout))
    }

    fn request(&self, method: Method, path: &str) -> ApiResult<RequestBuilder> {
        let url = self.endpoint(path)?;
        tracing::debug!(%method, %url, "backend request");
        Ok(self.client.request(method, url))
    }

    /// Raw HTTP client, for requests that manage their own timeouts.
    pub(crate) const fn http(&self) -> &reqwest::Client {
        &self.client
    }
}

fn normalize_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw.trim())?;
    if url.cannot_be_a_base() {
        return Err(ApiError::Config(format!("not a usable base URL: {raw}")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Fail with the mapped error unless the response is a success.
///
/// # Errors
/// Returns the error derived from the status and body.
pub async fn ensure_success(response: Response) -> ApiResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error::error_from_response(response).await)
    }
}

/// Check the status and decode a JSON body.
///
/// # Errors
/// Returns the mapped error on non-success, or a decoding error.
pub async fn expect_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
