//! Parsing of terminal input lines.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::api::ids::{AnalysisId, SessionId};

/// One line of user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/login <username> <password>`
    Login {
        /// Login name.
        username: String,
        /// Password.
        password: String,
    },
    /// `/signup <username> <email> <password>`
    Signup {
        /// Login name.
        username: String,
        /// E-mail address.
        email: String,
        /// Password.
        password: String,
    },
    /// `/logout`
    Logout,
    /// `/sessions`
    Sessions,
    /// `/new [title]`
    New(Option<String>),
    /// `/open <id>`
    Open(SessionId),
    /// `/delete <id>`
    Delete(SessionId),
    /// `/attach <path>`: queue a file for the next message or analysis.
    Attach(PathBuf),
    /// `/analyze <title> | <prompt>`: submit queued images as a batch.
    Analyze {
        /// Analysis title.
        title: String,
        /// Prompt applied to every image.
        prompt: String,
    },
    /// `/analyses`
    Analyses,
    /// `/download <id> <path>`
    Download {
        /// Analysis to export.
        id: AnalysisId,
        /// Destination of the CSV.
        path: PathBuf,
    },
    /// `/help`
    Help,
    /// `/quit`
    Quit,
    /// Any line that is not a command.
    Message(String),
}

/// Why a line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Unrecognised `/word`.
    #[error("unknown command /{0}, try /help")]
    Unknown(String),
    /// Wrong arguments.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// An id argument was not an integer.
    #[error("invalid id: {0}")]
    InvalidId(String),
}

/// Summary printed by `/help`.
pub const HELP: &str = "\
/login <username> <password>
/signup <username> <email> <password>
/logout
/sessions
/new [title]
/open <id>
/delete <id>
/attach <path>
/analyze <title> | <prompt>
/analyses
/download <id> <path>
/quit
Anything else is sent to the active session.";

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    ///
    /// # Errors
    /// Returns an error for unknown commands or bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Message(line.to_string())));
        };

        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(name, args)| (name, args.trim()));
        let words: Vec<&str> = args.split_whitespace().collect();

        let command = match name {
            "login" => match words.as_slice() {
                [username, password] => Self::Login {
                    username: (*username).to_string(),
                    password: (*password).to_string(),
                },
                _ => return Err(CommandError::Usage("/login <username> <password>")),
            },
            "signup" => match words.as_slice() {
                [username, email, password] => Self::Signup {
                    username: (*username).to_string(),
                    email: (*email).to_string(),
                    password: (*password).to_string(),
                },
                _ => {
                    return Err(CommandError::Usage(
                        "/signup <username> <email> <password>",
                    ));
                }
            },
            "logout" => Self::Logout,
            "sessions" => Self::Sessions,
            "new" => Self::New((!args.is_empty()).then(|| args.to_string())),
            "open" => Self::Open(parse_id(&words, "/open <id>")?),
            "delete" => Self::Delete(parse_id(&words, "/delete <id>")?),
            "attach" if !args.is_empty() => Self::Attach(PathBuf::from(args)),
            "attach" => return Err(CommandError::Usage("/attach <path>")),
            "analyze" => match args.split_once('|') {
                Some((title, prompt)) if !title.trim().is_empty() && !prompt.trim().is_empty() => {
                    Self::Analyze {
                        title: title.trim().to_string(),
                        prompt: prompt.trim().to_string(),
                    }
                }
                _ => return Err(CommandError::Usage("/analyze <title> | <prompt>")),
            },
            "analyses" => Self::Analyses,
            "download" => match args.split_once(char::is_whitespace) {
                Some((id, path)) if !path.trim().is_empty() => Self::Download {
                    id: parse_id(&[id], "/download <id> <path>")?,
                    path: PathBuf::from(path.trim()),
                },
                _ => return Err(CommandError::Usage("/download <id> <path>")),
            },
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_id<T: FromStr>(words: &[&str], usage: &'static str) -> Result<T, CommandError> {
    match words {
        [raw] => raw
            .parse()
            .map_err(|_| CommandError::InvalidId((*raw).to_string())),
        _ => Err(CommandError::Usage(usage)),
    }
}
