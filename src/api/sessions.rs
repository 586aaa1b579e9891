//! Session CRUD.

use reqwest::Method;
use serde::Serialize;

use super::error::{ApiError, ApiResult};
use super::ids::SessionId;
use super::types::{Session, SessionDetails};
use super::{ApiClient, ensure_success, expect_json};

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    title: &'a str,
}

impl ApiClient {
    /// Create a session.
    ///
    /// # Errors
    /// Returns a validation error for an empty title, or the backend error.
    pub async fn create_session(&self, title: &str, token: &str) -> ApiResult<Session> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::validation("session title must not be empty"));
        }

        let response = self
            .authorized(Method::POST, "sessions", token)?
            .json(&CreateSessionRequest { title })
            .send()
            .await?;
        expect_json(response).await
    }

    /// List the caller's sessions in backend order.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn list_sessions(&self, token: &str) -> ApiResult<Vec<Session>> {
        let response = self
            .authorized(Method::GET, "sessions", token)?
            .send()
            .await?;
        expect_json(response).await
    }

    /// Fetch a session with its full transcript.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] for unknown ids, or the backend error.
    pub async fn get_session(&self, id: SessionId, token: &str) -> ApiResult<SessionDetails> {
        let response = self
            .authorized(Method::GET, &format!("sessions/{id}"), token)?
            .send()
            .await?;
        expect_json(response).await
    }

    /// Delete a session.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] if it is already gone, or the backend error.
    pub async fn delete_session(&self, id: SessionId, token: &str) -> ApiResult<()> {
        let response = self
            .authorized(Method::DELETE, &format!("sessions/{id}"), token)?
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(session_id = %id, "session deleted");
        Ok(())
    }
}
