//! Chat state machine and the session workspace built on it.

pub mod backend;
pub mod events;
pub mod session;
pub mod workspace;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod fake_backend;

pub use backend::{BackendFuture, ChatBackend};
pub use events::{ChatState, ControllerEvent, IgnoreReason, SendOutcome};
pub use session::ChatSessionController;
pub use workspace::{DEFAULT_SESSION_TITLE, Workspace};
