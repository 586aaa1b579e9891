//! Observable state of a chat controller.

use crate::api::ids::SessionId;

/// Lifecycle of one send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChatState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Request sent, no chunk received yet.
    Sending,
    /// At least one chunk received.
    Streaming,
}

/// Notification published to front-ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The send lifecycle moved.
    StateChanged(ChatState),
    /// New assistant text arrived.
    DraftUpdated {
        /// Session the draft belongs to.
        session_id: SessionId,
        /// Text appended by this chunk.
        delta: String,
        /// Whole draft so far.
        draft: String,
    },
    /// The authoritative transcript was replaced.
    TranscriptReloaded {
        /// Session whose transcript is shown.
        session_id: SessionId,
    },
    /// A send ended with an error.
    SendFailed {
        /// Session the send targeted.
        session_id: SessionId,
        /// Human readable cause.
        message: String,
    },
}

/// Why a send was not attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Input was empty or whitespace.
    EmptyInput,
    /// No session is selected.
    NoActiveSession,
    /// Another send is still in flight.
    AlreadySending,
}

/// Result of a send that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply finished and the transcript was re-fetched.
    Completed,
    /// The user switched sessions mid-stream; the reply was dropped locally.
    Detached,
    /// Nothing was sent.
    Ignored(IgnoreReason),
}

impl SendOutcome {
    /// Whether a request reached the backend.
    #[must_use]
    pub const fn was_sent(self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}
