//! Backend seam used by the controller.

use std::future::Future;
use std::pin::Pin;

use crate::api::ApiClient;
use crate::api::error::ApiResult;
use crate::api::ids::SessionId;
use crate::api::types::{Attachment, Session, SessionDetails};
use crate::stream::ChunkStream;

/// Boxed future type for backend calls.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send + 'a>>;

/// Session and chat operations the controller depends on.
pub trait ChatBackend: Send + Sync {
    /// List the caller's sessions in server order.
    fn list_sessions<'a>(&'a self, token: &'a str) -> BackendFuture<'a, Vec<Session>>;

    /// Create a session.
    fn create_session<'a>(&'a self, title: &'a str, token: &'a str) -> BackendFuture<'a, Session>;

    /// Fetch a session with its messages.
    fn get_session<'a>(&'a self, id: SessionId, token: &'a str)
    -> BackendFuture<'a, SessionDetails>;

    /// Delete a session.
    fn delete_session<'a>(&'a self, id: SessionId, token: &'a str) -> BackendFuture<'a, ()>;

    /// Send a message and return its reply as a chunk stream.
    fn stream_message<'a>(
        &'a self,
        id: SessionId,
        text: &'a str,
        attachments: &'a [Attachment],
        token: &'a str,
    ) -> BackendFuture<'a, ChunkStream>;
}

impl ChatBackend for ApiClient {
    fn list_sessions<'a>(&'a self, token: &'a str) -> BackendFuture<'a, Vec<Session>> {
        Box::pin(Self::list_sessions(self, token))
    }

    fn create_session<'a>(&'a self, title: &'a str, token: &'a str) -> BackendFuture<'a, Session> {
        Box::pin(Self::create_session(self, title, token))
    }

    fn get_session<'a>(
        &'a self,
        id: SessionId,
        token: &'a str,
    ) -> BackendFuture<'a, SessionDetails> {
        Box::pin(Self::get_session(self, id, token))
    }

    fn delete_session<'a>(&'a self, id: SessionId, token: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(Self::delete_session(self, id, token))
    }

    fn stream_message<'a>(
        &'a self,
        id: SessionId,
        text: &'a str,
        attachments: &'a [Attachment],
        token: &'a str,
    ) -> BackendFuture<'a, ChunkStream> {
        Box::pin(Self::stream_message(self, id, text, attachments, token))
    }
}
