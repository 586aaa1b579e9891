//! Chat controller: one active session, its transcript, and the assistant
//! draft while a reply streams in.
//!
//! A send moves `Idle -> Sending -> Streaming -> Idle`. Only one send can be
//! in flight per controller. Every change of the active session bumps a
//! generation counter; a send that notices the bump stops consuming its
//! stream and leaves the view untouched.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::{RwLock, broadcast, watch};

use crate::api::error::{ApiError, ApiResult};
use crate::api::ids::SessionId;
use crate::api::types::{Attachment, Message, Session, SessionDetails};
use crate::store::IdentityStore;

use super::backend::ChatBackend;
use super::events::{ChatState, ControllerEvent, IgnoreReason, SendOutcome};

/// Buffered events per subscriber before old ones are dropped.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct View {
    session: Option<Session>,
    messages: Vec<Message>,
    draft: Option<String>,
    state: ChatState,
}

impl View {
    fn replace_transcript(&mut self, details: SessionDetails) {
        self.session = Some(details.session);
        self.messages = details.messages;
        self.draft = None;
        self.state = ChatState::Idle;
    }
}

/// Holds the in-flight flag until dropped.
struct SendGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SendGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// State machine driving one chat view.
pub struct ChatSessionController {
    backend: Arc<dyn ChatBackend>,
    identity: Arc<IdentityStore>,
    view: RwLock<View>,
    sending: AtomicBool,
    generation: watch::Sender<u64>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ChatSessionController {
    /// Create a controller with no active session.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, identity: Arc<IdentityStore>) -> Self {
        let (generation, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            identity,
            view: RwLock::new(View::default()),
            sending: AtomicBool::new(false),
            generation,
            events,
        }
    }

    /// Receive controller events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Whether a send is in flight.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ChatState {
        self.view.read().await.state
    }

    /// Session currently shown.
    pub async fn active_session(&self) -> Option<Session> {
        self.view.read().await.session.clone()
    }

    /// Id of the session currently shown.
    pub async fn active_session_id(&self) -> Option<SessionId> {
        self.view.read().await.session.as_ref().map(|s| s.id)
    }

    /// Messages as last fetched from the backend.
    pub async fn messages(&self) -> Vec<Message> {
        self.view.read().await.messages.clone()
    }

    /// Assistant text received so far for the current reply.
    pub async fn draft(&self) -> Option<String> {
        self.view.read().await.draft.clone()
    }

    /// Authoritative messages followed by the draft, if any.
    pub async fn transcript(&self) -> Vec<Message> {
        let view = self.view.read().await;
        let mut transcript = view.messages.clone();
        if let Some(draft) = &view.draft {
            transcript.push(Message::draft(draft.clone()));
        }
        transcript
    }

    /// Load a session and make it active.
    ///
    /// Any reply still streaming for the previous session is detached.
    ///
    /// # Errors
    /// Returns an error if nobody is logged in or the session cannot be
    /// fetched; the controller is then left without an active session.
    pub async fn select_session(&self, id: SessionId) -> ApiResult<()> {
        let token = self.identity.require_token().await?;
        let generation = self.detach(None).await;

        let details = self.backend.get_session(id, &token).await?;
        if self
            .apply_if_current(generation, |view| view.replace_transcript(details))
            .await
            .is_some()
        {
            tracing::debug!(session_id = %id, "session selected");
            self.emit(ControllerEvent::TranscriptReloaded { session_id: id });
        }
        Ok(())
    }

    /// Make a freshly created session active without fetching it.
    pub async fn show_session(&self, session: Session) {
        let session_id = session.id;
        self.detach(Some(SessionDetails::empty(session))).await;
        self.emit(ControllerEvent::TranscriptReloaded { session_id });
    }

    /// Drop the active session.
    pub async fn clear(&self) {
        self.detach(None).await;
    }

    /// Re-fetch the active session.
    ///
    /// # Errors
    /// Returns an error if nobody is logged in or the fetch fails.
    pub async fn reload(&self) -> ApiResult<()> {
        let token = self.identity.require_token().await?;
        let (session_id, generation) = {
            let view = self.view.read().await;
            let Some(session_id) = view.session.as_ref().map(|s| s.id) else {
                return Ok(());
            };
            (session_id, *self.generation.borrow())
        };

        let details = self.backend.get_session(session_id, &token).await?;
        if self
            .apply_if_current(generation, |view| {
                view.session = Some(details.session);
                view.messages = details.messages;
            })
            .await
            .is_some()
        {
            self.emit(ControllerEvent::TranscriptReloaded { session_id });
        }
        Ok(())
    }

    /// Send `text` with `attachments` to the active session and stream the
    /// reply into the draft.
    ///
    /// When the reply ends the session is re-fetched and replaces the
    /// transcript; the draft itself is never inserted.
    ///
    /// # Errors
    /// Returns the transport or backend error. The draft is cleared and the
    /// transcript is not re-fetched.
    pub async fn send(&self, text: &str, attachments: &[Attachment]) -> ApiResult<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Ignored(IgnoreReason::EmptyInput));
        }
        let Some(_guard) = SendGuard::acquire(&self.sending) else {
            tracing::debug!("send ignored, another one is in flight");
            return Ok(SendOutcome::Ignored(IgnoreReason::AlreadySending));
        };
        let token = self.identity.require_token().await?;

        // The generation only moves under the view lock, so reading it here
        // binds the send to this session.
        let (session_id, generation, mut generation_rx) = {
            let mut view = self.view.write().await;
            let Some(session_id) = view.session.as_ref().map(|s| s.id) else {
                return Ok(SendOutcome::Ignored(IgnoreReason::NoActiveSession));
            };
            view.state = ChatState::Sending;
            let generation_rx = self.generation.subscribe();
            let generation = *generation_rx.borrow();
            (session_id, generation, generation_rx)
        };
        self.emit(ControllerEvent::StateChanged(ChatState::Sending));
        tracing::debug!(session_id = %session_id, "sending message");

        let request = self
            .backend
            .stream_message(session_id, text, attachments, &token);
        let mut stream = match until_detached(&mut generation_rx, request).await {
            None => return Ok(detached(session_id)),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => return self.fail(generation, session_id, e).await,
        };

        loop {
            let Some(next) = until_detached(&mut generation_rx, stream.next()).await else {
                return Ok(detached(session_id));
            };
            match next {
                None => {
                    tracing::debug!(session_id = %session_id, "stream closed without done");
                    break;
                }
                Some(Err(e)) => return self.fail(generation, session_id, e).await,
                Some(Ok(chunk)) => {
                    if !self.append(generation, session_id, &chunk.content).await {
                        return Ok(detached(session_id));
                    }
                    if chunk.done {
                        break;
                    }
                }
            }
        }
        drop(stream);

        let refetch = self.backend.get_session(session_id, &token);
        let details = match until_detached(&mut generation_rx, refetch).await {
            None => return Ok(detached(session_id)),
            Some(Ok(details)) => details,
            Some(Err(e)) => return self.fail(generation, session_id, e).await,
        };
        if self
            .apply_if_current(generation, |view| view.replace_transcript(details))
            .await
            .is_none()
        {
            return Ok(detached(session_id));
        }
        self.emit(ControllerEvent::TranscriptReloaded { session_id });
        self.emit(ControllerEvent::StateChanged(ChatState::Idle));
        Ok(SendOutcome::Completed)
    }

    /// Append one chunk's content to the draft. Returns `false` when the
    /// send has been detached.
    async fn append(&self, generation: u64, session_id: SessionId, delta: &str) -> bool {
        let applied = self
            .apply_if_current(generation, |view| {
                let started = view.state != ChatState::Streaming;
                view.state = ChatState::Streaming;
                let draft = view.draft.get_or_insert_with(String::new);
                draft.push_str(delta);
                (started, draft.clone())
            })
            .await;

        let Some((started, draft)) = applied else {
            return false;
        };
        if started {
            self.emit(ControllerEvent::StateChanged(ChatState::Streaming));
        }
        if !delta.is_empty() {
            self.emit(ControllerEvent::DraftUpdated {
                session_id,
                delta: delta.to_string(),
                draft,
            });
        }
        true
    }

    async fn fail(
        &self,
        generation: u64,
        session_id: SessionId,
        err: ApiError,
    ) -> ApiResult<SendOutcome> {
        let current = self
            .apply_if_current(generation, |view| {
                view.draft = None;
                view.state = ChatState::Idle;
            })
            .await
            .is_some();
        if !current {
            tracing::debug!(session_id = %session_id, error = %err, "dropping error of a detached send");
            return Ok(SendOutcome::Detached);
        }

        tracing::warn!(session_id = %session_id, error = %err, "send failed");
        self.emit(ControllerEvent::StateChanged(ChatState::Idle));
        self.emit(ControllerEvent::SendFailed {
            session_id,
            message: err.to_string(),
        });
        Err(err)
    }

    /// Bump the generation and reset the view, optionally to `details`.
    /// Returns the new generation.
    async fn detach(&self, details: Option<SessionDetails>) -> u64 {
        let (was_busy, generation) = {
            let mut view = self.view.write().await;
            let was_busy = view.state != ChatState::Idle;
            self.generation.send_modify(|generation| *generation += 1);
            match details {
                Some(details) => view.replace_transcript(details),
                None => *view = View::default(),
            }
            (was_busy, *self.generation.borrow())
        };
        if was_busy {
            self.emit(ControllerEvent::StateChanged(ChatState::Idle));
        }
        generation
    }

    async fn apply_if_current<R>(
        &self,
        generation: u64,
        apply: impl FnOnce(&mut View) -> R,
    ) -> Option<R> {
        let mut view = self.view.write().await;
        if *self.generation.borrow() != generation {
            return None;
        }
        Some(apply(&mut view))
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }
}

fn detached(session_id: SessionId) -> SendOutcome {
    tracing::debug!(session_id = %session_id, "active session changed, reply detached");
    SendOutcome::Detached
}

/// Run `future` unless the generation moves first.
async fn until_detached<F: Future>(
    generation_rx: &mut watch::Receiver<u64>,
    future: F,
) -> Option<F::Output> {
    tokio::select! {
        _ = generation_rx.changed() => None,
        output = future => Some(output),
    }
}
