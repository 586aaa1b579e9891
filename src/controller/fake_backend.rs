//! Scripted in-memory backend for controller tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;

use crate::api::error::{ApiError, ApiResult};
use crate::api::ids::{MessageId, SessionId, UserId};
use crate::api::types::{Attachment, Message, Role, Session, SessionDetails, StreamChunk, User};
use crate::stream::ChunkStream;

use super::backend::{BackendFuture, ChatBackend};

enum Script {
    Chunks(UnboundedReceiver<ApiResult<StreamChunk>>),
    Fail(ApiError),
}

#[derive(Default)]
struct FakeState {
    next_id: i64,
    sessions: Vec<SessionDetails>,
    scripts: VecDeque<Script>,
    stream_calls: usize,
    get_calls: usize,
}

impl FakeState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_message(&mut self, id: SessionId, role: Role, content: &str) {
        let message_id = MessageId::new(self.next_id());
        if let Some(details) = self.sessions.iter_mut().find(|d| d.id() == id) {
            details.messages.push(Message {
                id: message_id,
                content: content.to_string(),
                role,
                file_paths: Vec::new(),
                file_urls: Vec::new(),
                created_at: "2024-05-01T10:00:00".to_string(),
            });
        }
    }
}

/// Backend whose replies are driven by the test.
///
/// Without a script, a send answers `Hi`, ` there`, `done` and persists the
/// exchange.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user() -> User {
        User {
            id: UserId::new(1),
            username: "tester".to_string(),
            email: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_session(&self, title: &str) -> Session {
        let mut state = self.lock();
        let session = Session {
            id: SessionId::new(state.next_id()),
            title: title.to_string(),
            created_at: "2024-05-01T10:00:00".to_string(),
        };
        state.sessions.insert(0, SessionDetails::empty(session.clone()));
        session
    }

    pub fn add_message(&self, id: SessionId, role: Role, content: &str) {
        self.lock().push_message(id, role, content);
    }

    /// Serve the next send from `chunks`.
    pub fn script_stream(&self, chunks: UnboundedReceiver<ApiResult<StreamChunk>>) {
        self.lock().scripts.push_back(Script::Chunks(chunks));
    }

    /// Fail the next send before any chunk.
    pub fn fail_next_stream(&self, err: ApiError) {
        self.lock().scripts.push_back(Script::Fail(err));
    }

    pub fn stream_calls(&self) -> usize {
        self.lock().stream_calls
    }

    pub fn get_calls(&self) -> usize {
        self.lock().get_calls
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("Session not found".to_string())
}

impl ChatBackend for FakeBackend {
    fn list_sessions<'a>(&'a self, _token: &'a str) -> BackendFuture<'a, Vec<Session>> {
        let sessions = self
            .lock()
            .sessions
            .iter()
            .map(|d| d.session.clone())
            .collect();
        Box::pin(async move { Ok(sessions) })
    }

    fn create_session<'a>(&'a self, title: &'a str, _token: &'a str) -> BackendFuture<'a, Session> {
        let session = self.add_session(title);
        Box::pin(async move { Ok(session) })
    }

    fn get_session<'a>(
        &'a self,
        id: SessionId,
        _token: &'a str,
    ) -> BackendFuture<'a, SessionDetails> {
        let result = {
            let mut state = self.lock();
            state.get_calls += 1;
            state
                .sessions
                .iter()
                .find(|d| d.id() == id)
                .cloned()
                .ok_or_else(not_found)
        };
        Box::pin(async move { result })
    }

    fn delete_session<'a>(&'a self, id: SessionId, _token: &'a str) -> BackendFuture<'a, ()> {
        let result = {
            let mut state = self.lock();
            let before = state.sessions.len();
            state.sessions.retain(|d| d.id() != id);
            if state.sessions.len() == before {
                Err(not_found())
            } else {
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn stream_message<'a>(
        &'a self,
        id: SessionId,
        text: &'a str,
        _attachments: &'a [Attachment],
        _token: &'a str,
    ) -> BackendFuture<'a, ChunkStream> {
        let result = {
            let mut state = self.lock();
            state.stream_calls += 1;
            if state.sessions.iter().any(|d| d.id() == id) {
                state.push_message(id, Role::User, text);
                match state.scripts.pop_front() {
                    Some(Script::Chunks(rx)) => Ok(rx.boxed()),
                    Some(Script::Fail(err)) => Err(err),
                    None => {
                        state.push_message(id, Role::Assistant, "Hi there");
                        let chunks: Vec<ApiResult<StreamChunk>> = vec![
                            Ok(StreamChunk::content("Hi")),
                            Ok(StreamChunk::content(" there")),
                            Ok(StreamChunk::done()),
                        ];
                        Ok(futures::stream::iter(chunks).boxed())
                    }
                }
            } else {
                Err(not_found())
            }
        };
        Box::pin(async move { result })
    }
}
