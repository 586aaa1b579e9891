//! Line-oriented chat front-end.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::api::ApiClient;
use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{Attachment, AuthResponse, Message, Role};
use crate::controller::{
    ChatBackend, ControllerEvent, DEFAULT_SESSION_TITLE, IgnoreReason, SendOutcome, Workspace,
};
use crate::store::IdentityStore;

use super::command::{Command, HELP};

/// Whether the loop should keep reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Reads commands, prints transcripts and streamed replies.
pub struct Repl<W> {
    api: Arc<ApiClient>,
    identity: Arc<IdentityStore>,
    workspace: Workspace,
    pending: Vec<Attachment>,
    out: W,
}

impl<W: AsyncWrite + Unpin + Send> Repl<W> {
    /// Create a front-end writing to `out`.
    pub fn new(api: Arc<ApiClient>, identity: Arc<IdentityStore>, out: W) -> Self {
        let backend: Arc<dyn ChatBackend> = api.clone();
        let workspace = Workspace::new(backend, identity.clone());
        Self {
            api,
            identity,
            workspace,
            pending: Vec::new(),
            out,
        }
    }

    /// Consume the front-end and return its writer.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Process `input` line by line until `/quit` or end of input.
    ///
    /// Command failures are reported and the loop goes on.
    ///
    /// # Errors
    /// Returns an error only if reading input or writing output fails.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> std::io::Result<()> {
        if let Some(user) = self.identity.user().await {
            self.say(&format!("Signed in as {}.", user.username)).await?;
            let opened = Self::open_workspace(&self.workspace).await;
            self.report(opened).await?;
            let shown = self.show_transcript().await;
            self.report(shown).await?;
        } else {
            self.say("Not signed in. Use /login or /signup, /help for commands.")
                .await?;
        }

        let mut lines = input.lines();
        loop {
            self.prompt().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    self.say(&e.to_string()).await?;
                    continue;
                }
            };
            let outcome = self.execute(command).await;
            match outcome {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => self.report(Err(e)).await?,
            }
        }
        self.out.flush().await
    }

    async fn execute(&mut self, command: Command) -> ApiResult<Flow> {
        match command {
            Command::Login { username, password } => {
                let response = self.api.login(&username, &password).await?;
                self.sign_in(response, None).await?;
            }
            Command::Signup {
                username,
                email,
                password,
            } => {
                let response = self.api.signup(&username, &email, &password).await?;
                self.sign_in(response, Some(email)).await?;
            }
            Command::Logout => {
                self.identity.logout().await?;
                self.workspace.reset().await;
                self.pending.clear();
                self.say("Signed out.").await?;
            }
            Command::Sessions => {
                self.workspace.load().await?;
                self.list_sessions().await?;
            }
            Command::New(title) => {
                let title = title.as_deref().unwrap_or(DEFAULT_SESSION_TITLE);
                let session = self.workspace.create_session(title).await?;
                self.say(&format!("Opened #{} {}", session.id, session.title))
                    .await?;
            }
            Command::Open(id) => {
                self.workspace.select_session(id).await?;
                self.show_transcript().await?;
            }
            Command::Delete(id) => {
                self.workspace.delete_session(id).await?;
                self.say(&format!("Deleted #{id}.")).await?;
                if let Some(active) = self.workspace.controller().active_session().await {
                    self.say(&format!("Now in #{} {}", active.id, active.title))
                        .await?;
                }
            }
            Command::Attach(path) => {
                let attachment = Attachment::from_path(&path).await?;
                self.say(&format!(
                    "Attached {} ({}, {} bytes).",
                    attachment.file_name,
                    attachment.mime,
                    attachment.bytes.len()
                ))
                .await?;
                self.pending.push(attachment);
            }
            Command::Analyze { title, prompt } => {
                let token = self.identity.require_token().await?;
                let created = self
                    .api
                    .create_analysis(&title, &prompt, &self.pending, &token)
                    .await?;
                self.pending.clear();
                self.say(&format!("{} (analysis #{})", created.message, created.analysis_id))
                    .await?;
            }
            Command::Analyses => self.list_analyses().await?,
            Command::Download { id, path } => {
                let token = self.identity.require_token().await?;
                let written = self.api.download_analysis_to(id, &token, &path).await?;
                self.say(&format!("Wrote {written} bytes to {}.", path.display()))
                    .await?;
            }
            Command::Help => self.say(HELP).await?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Message(text) => self.send(&text).await?,
        }
        Ok(Flow::Continue)
    }

    async fn sign_in(
        &mut self,
        response: AuthResponse,
        email: Option<String>,
    ) -> ApiResult<()> {
        let identity = self.identity.accept(response, email).await?;
        self.say(&format!("Signed in as {}.", identity.user.username))
            .await?;
        Self::open_workspace(&self.workspace).await?;
        self.show_transcript().await?;
        Ok(())
    }

    /// Load sessions, creating one when the user has none.
    async fn open_workspace(workspace: &Workspace) -> ApiResult<()> {
        workspace.load().await?;
        if workspace.needs_new_session().await {
            workspace.create_session(DEFAULT_SESSION_TITLE).await?;
        }
        Ok(())
    }

    async fn send(&mut self, text: &str) -> ApiResult<()> {
        let controller = self.workspace.controller();
        let mut events = controller.subscribe();
        let attachments = std::mem::take(&mut self.pending);

        let outcome = {
            let send = controller.send(text, &attachments);
            tokio::pin!(send);
            loop {
                tokio::select! {
                    outcome = &mut send => break outcome,
                    event = events.recv() => print_event(&mut self.out, event).await?,
                }
            }
        };
        while let Ok(event) = events.try_recv() {
            print_event(&mut self.out, Ok(event)).await?;
        }
        self.out.write_all(b"\n").await?;

        match outcome {
            Ok(SendOutcome::Ignored(reason)) => {
                self.pending = attachments;
                let hint = match reason {
                    IgnoreReason::EmptyInput => "Nothing to send.",
                    IgnoreReason::NoActiveSession => "No open session, use /new or /open.",
                    IgnoreReason::AlreadySending => "Still waiting for the previous reply.",
                };
                self.say(hint).await?;
                Ok(())
            }
            Ok(SendOutcome::Completed | SendOutcome::Detached) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_sessions(&mut self) -> ApiResult<()> {
        let active = self.workspace.controller().active_session_id().await;
        let sessions = self.workspace.sessions().await;
        if sessions.is_empty() {
            self.say("No sessions.").await?;
        }
        for session in sessions {
            let marker = if Some(session.id) == active { '*' } else { ' ' };
            self.say(&format!(
                "{marker} #{:<5} {}  ({})",
                session.id.get(),
                session.title,
                session.created_at
            ))
            .await?;
        }
        Ok(())
    }

    async fn list_analyses(&mut self) -> ApiResult<()> {
        let token = self.identity.require_token().await?;
        let analyses = self.api.list_analyses(&token).await?;
        if analyses.is_empty() {
            self.say("No analyses.").await?;
        }
        for analysis in analyses {
            self.say(&format!(
                "#{:<5} {}  {} result(s)  ({})",
                analysis.id.get(),
                analysis.title,
                analysis.results_count,
                analysis.created_at
            ))
            .await?;
        }
        Ok(())
    }

    async fn show_transcript(&mut self) -> ApiResult<()> {
        let Some(session) = self.workspace.controller().active_session().await else {
            return Ok(());
        };
        let token = self.identity.token().await;
        self.say(&format!("== #{} {} ==", session.id, session.title))
            .await?;
        for message in self.workspace.controller().transcript().await {
            let rendered = self.render(&message, token.as_deref());
            self.say(&rendered).await?;
        }
        Ok(())
    }

    /// Attachment links are only printed when a token can authorize them.
    fn render(&self, message: &Message, token: Option<&str>) -> String {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        let mut rendered = format!("{who}> {}", message.content);
        for attachment in message.attachments() {
            let kind = if attachment.is_image { "image" } else { "file" };
            rendered.push_str(&format!("\n    [{kind}] {}", attachment.name));
            let url = token.and_then(|token| self.api.file_url(&attachment.url, token).ok());
            if let Some(url) = url {
                rendered.push_str(&format!(" {url}"));
            }
        }
        rendered
    }

    async fn report(&mut self, result: ApiResult<()>) -> std::io::Result<()> {
        let Err(err) = result else {
            return Ok(());
        };
        tracing::error!(error = %err, "command failed");
        if err.requires_login() && !matches!(err, ApiError::NotAuthenticated) {
            if let Err(e) = self.identity.logout().await {
                tracing::warn!(error = %e, "cannot clear stored identity");
            }
            self.workspace.reset().await;
        }
        let message = if err.requires_login() {
            format!("{err}. Please /login.")
        } else {
            err.to_string()
        };
        self.say(&message).await
    }

    async fn prompt(&mut self) -> std::io::Result<()> {
        self.out.write_all(b"> ").await?;
        self.out.flush().await
    }

    async fn say(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }
}

async fn print_event<W: AsyncWrite + Unpin>(
    out: &mut W,
    event: Result<ControllerEvent, broadcast::error::RecvError>,
) -> std::io::Result<()> {
    match event {
        Ok(ControllerEvent::DraftUpdated { delta, .. }) => {
            out.write_all(delta.as_bytes()).await?;
            out.flush().await
        }
        Err(broadcast::error::RecvError::Lagged(missed)) => {
            tracing::warn!(missed, "display fell behind the reply");
            Ok(())
        }
        Ok(_) | Err(broadcast::error::RecvError::Closed) => Ok(()),
    }
}
