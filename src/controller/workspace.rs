//! Session list plus the chat controller showing one of them.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::api::error::ApiResult;
use crate::api::ids::SessionId;
use crate::api::types::Session;
use crate::store::IdentityStore;

use super::backend::ChatBackend;
use super::session::ChatSessionController;

/// Title of sessions created on the user's behalf.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Everything a signed-in front-end shows.
pub struct Workspace {
    backend: Arc<dyn ChatBackend>,
    identity: Arc<IdentityStore>,
    sessions: RwLock<Vec<Session>>,
    controller: ChatSessionController,
}

impl Workspace {
    /// Create an empty workspace.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, identity: Arc<IdentityStore>) -> Self {
        let controller = ChatSessionController::new(backend.clone(), identity.clone());
        Self {
            backend,
            identity,
            sessions: RwLock::new(Vec::new()),
            controller,
        }
    }

    /// Controller of the active session.
    #[must_use]
    pub const fn controller(&self) -> &ChatSessionController {
        &self.controller
    }

    /// Sessions as last listed, in server order.
    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions.read().await.clone()
    }

    /// Whether the user has no session at all.
    pub async fn needs_new_session(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// List sessions and select the first one when none is active.
    ///
    /// # Errors
    /// Returns an error if nobody is logged in or a request fails.
    pub async fn load(&self) -> ApiResult<Vec<Session>> {
        let sessions = self.refresh().await?;
        let active = self.controller.active_session_id().await;
        let still_listed = active.is_some_and(|id| sessions.iter().any(|s| s.id == id));
        if !still_listed {
            match sessions.first() {
                Some(first) => self.controller.select_session(first.id).await?,
                None => self.controller.clear().await,
            }
        }
        Ok(sessions)
    }

    /// Create a session and show it with an empty transcript.
    ///
    /// # Errors
    /// Returns an error if the title is empty or the request fails.
    pub async fn create_session(&self, title: &str) -> ApiResult<Session> {
        let token = self.identity.require_token().await?;
        let session = self.backend.create_session(title, &token).await?;
        tracing::info!(session_id = %session.id, title = %session.title, "session created");

        self.sessions.write().await.insert(0, session.clone());
        self.controller.show_session(session.clone()).await;
        Ok(session)
    }

    /// Show another session.
    ///
    /// # Errors
    /// Returns an error if the session cannot be fetched.
    pub async fn select_session(&self, id: SessionId) -> ApiResult<()> {
        self.controller.select_session(id).await
    }

    /// Delete a session.
    ///
    /// Deleting the active session opens a new [`DEFAULT_SESSION_TITLE`]
    /// session in its place.
    ///
    /// # Errors
    /// Returns an error if a request fails.
    pub async fn delete_session(&self, id: SessionId) -> ApiResult<()> {
        let token = self.identity.require_token().await?;
        self.backend.delete_session(id, &token).await?;
        tracing::info!(session_id = %id, "session deleted");

        let was_active = self.controller.active_session_id().await == Some(id);
        if was_active {
            self.controller.clear().await;
        }
        self.refresh().await?;
        if was_active {
            self.create_session(DEFAULT_SESSION_TITLE).await?;
        }
        Ok(())
    }

    /// Forget sessions and the active transcript, e.g. after logout.
    pub async fn reset(&self) {
        self.sessions.write().await.clear();
        self.controller.clear().await;
    }

    async fn refresh(&self) -> ApiResult<Vec<Session>> {
        let token = self.identity.require_token().await?;
        let sessions = self.backend.list_sessions(&token).await?;
        tracing::debug!(count = sessions.len(), "sessions listed");
        self.sessions.write().await.clone_from(&sessions);
        Ok(sessions)
    }
}
