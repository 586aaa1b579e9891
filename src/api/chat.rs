//! Streaming chat.

use futures::StreamExt;
use reqwest::multipart::Form;

use crate::stream::{ChunkStream, chunk_stream};

use super::error::{ApiError, ApiResult};
use super::ids::SessionId;
use super::types::{Attachment, StreamChunk};
use super::{ApiClient, ensure_success};

impl ApiClient {
    /// Send a message and return its response as a pull-based chunk stream.
    ///
    /// The request has no overall timeout; each body read is bounded by
    /// `stream_idle_timeout` instead. Dropping the stream stops reading but
    /// does not cancel generation on the backend.
    ///
    /// # Errors
    /// Returns a validation error for empty text, or the mapped backend error
    /// if the response is not a success.
    pub async fn stream_message(
        &self,
        session_id: SessionId,
        text: &str,
        attachments: &[Attachment],
        token: &str,
    ) -> ApiResult<ChunkStream> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::validation("message text must not be empty"));
        }

        let mut form = Form::new().text("message_text", text.to_string());
        for attachment in attachments {
            form = form.part("files", attachment.to_part()?);
        }

        let url = self.endpoint(&format!("chat/{session_id}"))?;
        tracing::debug!(
            %session_id,
            attachments = attachments.len(),
            "sending chat message"
        );

        let response = self
            .http()
            .post(url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        Ok(chunk_stream(
            response.bytes_stream(),
            self.config().stream_idle_timeout,
        ))
    }

    /// Send a message and invoke `on_chunk` for every chunk, in arrival order.
    ///
    /// Returns once the terminal chunk arrives or the transport closes.
    ///
    /// # Errors
    /// Returns the request error, a transport error, or [`ApiError::Timeout`].
    pub async fn send_message<F>(
        &self,
        session_id: SessionId,
        text: &str,
        attachments: &[Attachment],
        token: &str,
        mut on_chunk: F,
    ) -> ApiResult<()>
    where
        F: FnMut(StreamChunk),
    {
        let mut stream = self
            .stream_message(session_id, text, attachments, token)
            .await?;
        while let Some(chunk) = stream.next().await {
            on_chunk(chunk?);
        }
        Ok(())
    }
}
