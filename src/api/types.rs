//! Wire types exchanged with the Drishti backend.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::ids::{AnalysisId, AnalysisResultId, MessageId, SessionId, UserId};

/// File names rendered inline as images.
static IMAGE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)$").ok());

/// Whether a file name looks like an inline-renderable image.
#[must_use]
pub fn is_image_name(name: &str) -> bool {
    IMAGE_NAME
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Parse a backend timestamp.
///
/// The backend emits either RFC 3339 or naive ISO-8601 timestamps; naive ones are UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ===== Authentication =======================================================

/// Authenticated user as kept in the identity store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend user id.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// E-mail address, known only after signup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Response of `/auth/login` and `/auth/signup`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// Backend user id.
    pub user_id: UserId,
    /// Login name.
    pub username: String,
}

impl AuthResponse {
    /// Build the stored user from this response.
    #[must_use]
    pub fn into_user(self, email: Option<String>) -> (String, User) {
        (
            self.access_token,
            User {
                id: self.user_id,
                username: self.username,
                email,
            },
        )
    }
}

// ===== Sessions and messages ================================================

/// A persisted conversation container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// Creation timestamp as sent by the backend.
    pub created_at: String,
}

/// A session together with its full ordered transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    /// Session header.
    #[serde(flatten)]
    pub session: Session,
    /// Messages in backend order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SessionDetails {
    /// A freshly created session with no messages yet.
    #[must_use]
    pub const fn empty(session: Session) -> Self {
        Self {
            session,
            messages: Vec::new(),
        }
    }

    /// Session id shortcut.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.session.id
    }
}

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Message generated by the model.
    Assistant,
}

/// One persisted turn in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id, or [`MessageId::DRAFT`] for the streaming draft.
    pub id: MessageId,
    /// Text content.
    pub content: String,
    /// Author.
    pub role: Role,
    /// Original attachment names/paths, index-aligned with `file_urls`.
    #[serde(default)]
    pub file_paths: Vec<String>,
    /// Fetchable attachment locations, index-aligned with `file_paths`.
    #[serde(default)]
    pub file_urls: Vec<String>,
    /// Creation timestamp as sent by the backend.
    pub created_at: String,
}

impl Message {
    /// Build the transient assistant pseudo-message for an in-flight turn.
    #[must_use]
    pub fn draft(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::DRAFT,
            content: content.into(),
            role: Role::Assistant,
            file_paths: Vec::new(),
            file_urls: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Whether this is the streaming draft rather than a persisted message.
    #[must_use]
    pub const fn is_draft(&self) -> bool {
        self.id.is_draft()
    }

    /// Parsed creation time, if the backend value is understood.
    #[must_use]
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }

    /// Pair up attachment paths and urls.
    ///
    /// Mismatched lengths are truncated to the shorter list.
    #[must_use]
    pub fn attachments(&self) -> Vec<AttachmentRef> {
        if self.file_paths.len() != self.file_urls.len() {
            tracing::warn!(
                message_id = %self.id,
                paths = self.file_paths.len(),
                urls = self.file_urls.len(),
                "attachment paths and urls differ in length"
            );
        }

        self.file_paths
            .iter()
            .zip(&self.file_urls)
            .map(|(path, url)| AttachmentRef::new(path, url))
            .collect()
    }
}

/// A persisted attachment as referenced by a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Display name (last path segment).
    pub name: String,
    /// Original path as stored by the backend.
    pub path: String,
    /// Backend-relative fetch location.
    pub url: String,
    /// Whether the name looks like an image.
    pub is_image: bool,
}

impl AttachmentRef {
    fn new(path: &str, url: &str) -> Self {
        let name = path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("Unknown file")
            .to_string();
        let is_image = is_image_name(&name);
        Self {
            name,
            path: path.to_string(),
            url: url.to_string(),
            is_image,
        }
    }
}

// ===== Streaming ============================================================

/// One unit of the incremental chat response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial assistant text; may be empty.
    #[serde(default)]
    pub content: String,
    /// End-of-turn marker.
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    /// A content chunk.
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
        }
    }

    /// The terminal chunk.
    #[must_use]
    pub const fn done() -> Self {
        Self {
            content: String::new(),
            done: true,
        }
    }
}

// ===== Uploads ==============================================================

/// A local file to upload with a chat message or batch analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// File name sent in the multipart part.
    pub file_name: String,
    /// MIME type sent in the multipart part.
    pub mime: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Build an attachment, guessing the MIME type from the file name.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            file_name,
            mime,
            bytes,
        }
    }

    /// Read an attachment from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or has no file name.
    pub async fn from_path(path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ApiError::validation(format!("not a file path: {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }

    /// Whether the MIME type is an image type.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    /// Convert into a multipart part.
    ///
    /// # Errors
    /// Returns an error if the MIME type is not a valid header value.
    pub fn to_part(&self) -> ApiResult<reqwest::multipart::Part> {
        let part = reqwest::multipart::Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime)?;
        Ok(part)
    }
}

// ===== Batch analysis =======================================================

/// Summary row of a batch analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    /// Analysis id.
    pub id: AnalysisId,
    /// Display title.
    pub title: String,
    /// Prompt applied to every image.
    pub prompt: String,
    /// Number of analysed images.
    #[serde(default)]
    pub results_count: u32,
    /// Creation timestamp as sent by the backend.
    pub created_at: String,
}

/// Per-image result of a batch analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Result id.
    pub id: AnalysisResultId,
    /// Fetch location of the analysed image.
    pub file_url: String,
    /// Model response for this image.
    pub response: String,
    /// Creation timestamp as sent by the backend.
    pub created_at: String,
}

/// A batch analysis with all of its results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnalysisDetails {
    /// Analysis id.
    pub id: AnalysisId,
    /// Display title.
    pub title: String,
    /// Prompt applied to every image.
    pub prompt: String,
    /// Creation timestamp as sent by the backend.
    pub created_at: String,
    /// Per-image results.
    #[serde(default)]
    pub results: Vec<BatchResult>,
}

/// Response of `/bunch_analyze`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAnalysisResponse {
    /// Human readable status.
    pub message: String,
    /// Id of the created analysis.
    pub analysis_id: AnalysisId,
}
