//! Terminal front-end: command parsing and the interactive loop.

pub mod command;
pub mod repl;

pub use command::{Command, CommandError, HELP};
pub use repl::Repl;
