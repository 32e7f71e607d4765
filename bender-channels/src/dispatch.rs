//! Dispatch: correlates Slack threads with Claude Code sessions.
//!
//! Decides between starting and resuming a session for each inbound
//! message, keeps the [`SessionRegistry`] consistent with invocation
//! outcomes and turns results or failures into thread replies.

use crate::claude::{Assistant, ClaudeError, ClaudeResponse, InvokeRequest};
use crate::session::{new_session_id, SessionRegistry};
use crate::slack::format::{mentions_user, strip_mentions};
use crate::slack::SlackEvent;
use crate::traits::Reply;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Reply for a mention with nothing to ask.
pub const HELP_TEXT: &str = "How can I help?";

/// Prefix of every user-visible failure message.
pub const ERROR_PREFIX: &str = "Sorry, something went wrong";

/// User-visible text for a failed invocation.
pub fn error_text(err: &ClaudeError) -> String {
    format!("{ERROR_PREFIX}: {err}")
}

/// Routes Slack events and API requests to the assistant.
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    assistant: Arc<dyn Assistant>,
    workspace: PathBuf,
    timeout: Duration,
    bot_user_id: Option<String>,
    thread_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        assistant: Arc<dyn Assistant>,
        workspace: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            assistant,
            workspace: workspace.into(),
            timeout,
            bot_user_id: None,
            thread_locks: DashMap::new(),
        }
    }

    /// Set the bot's own Slack user ID so its mentions can be recognized.
    pub fn with_bot_user_id(mut self, bot_user_id: Option<String>) -> Self {
        self.bot_user_id = bot_user_id.filter(|id| !id.is_empty());
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Route an event by its Slack type.
    pub async fn handle_event(&self, event: &SlackEvent) -> Option<Reply> {
        match event.event_type.as_str() {
            "app_mention" => self.handle_mention(event).await,
            "message" => self.handle_thread_message(event).await,
            other => {
                tracing::debug!(event_type = %other, "Ignoring unsupported event type");
                None
            }
        }
    }

    /// Handle an `app_mention` event. A mention outside a thread starts one.
    pub async fn handle_mention(&self, event: &SlackEvent) -> Option<Reply> {
        if is_automated(event) {
            return None;
        }

        let thread_ts = event.thread_ts.as_deref().unwrap_or(&event.ts);
        let prompt = strip_mentions(&event.text);

        tracing::info!(
            channel = %event.channel,
            thread_ts = %thread_ts,
            user = ?event.user,
            "Mention received"
        );

        if prompt.is_empty() {
            return Some(Reply::new(&event.channel, thread_ts, HELP_TEXT));
        }

        let text = self.reply_text(thread_ts, &prompt).await;
        Some(Reply::new(&event.channel, thread_ts, text))
    }

    /// Handle a `message` event. Only replies in tracked threads are answered.
    pub async fn handle_thread_message(&self, event: &SlackEvent) -> Option<Reply> {
        if is_automated(event) {
            return None;
        }

        let thread_ts = event.thread_ts.as_deref()?;

        // The app_mention event for the same message answers it.
        if let Some(bot) = &self.bot_user_id {
            if mentions_user(&event.text, bot) {
                tracing::debug!(thread_ts = %thread_ts, "Skipping message that mentions the bot");
                return None;
            }
        }

        if !self.registry.has(thread_ts).await {
            tracing::debug!(thread_ts = %thread_ts, "Ignoring reply in untracked thread");
            return None;
        }

        let prompt = strip_mentions(&event.text);
        if prompt.is_empty() {
            return None;
        }

        tracing::info!(
            channel = %event.channel,
            thread_ts = %thread_ts,
            user = ?event.user,
            "Thread reply received"
        );

        let text = self.reply_text(thread_ts, &prompt).await;
        Some(Reply::new(&event.channel, thread_ts, text))
    }

    /// Send `prompt` to the session of `thread_id`, creating it if needed.
    ///
    /// The registry is only updated after a successful invocation.
    pub async fn converse(
        &self,
        thread_id: &str,
        prompt: &str,
    ) -> Result<ClaudeResponse, ClaudeError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let existing = self.registry.get(thread_id).await;
        let request = match &existing {
            Some(session_id) => self.request(prompt).resuming(session_id),
            None => self.request(prompt),
        };

        let response = self.assistant.invoke(request).await.inspect_err(|e| {
            tracing::error!(thread_ts = %thread_id, error = %e, "Claude Code invocation failed");
        })?;

        match existing {
            None if response.session_id.is_empty() => {
                tracing::warn!(thread_ts = %thread_id, "Claude Code returned no session ID");
            }
            None => self.registry.set(thread_id, &response.session_id).await,
            Some(previous) if !response.session_id.is_empty() && response.session_id != previous => {
                tracing::info!(
                    thread_ts = %thread_id,
                    previous = %previous,
                    session_id = %response.session_id,
                    "Session ID rotated"
                );
                self.registry.set(thread_id, &response.session_id).await;
            }
            Some(_) => {}
        }

        Ok(response)
    }

    /// Start a session for a thread the service just created.
    ///
    /// The session is named up front and registered only on success.
    pub async fn start_thread(
        &self,
        thread_id: &str,
        prompt: &str,
    ) -> Result<ClaudeResponse, ClaudeError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let session_id = new_session_id();
        let request = self.request(prompt).with_session(&session_id);

        let response = self.assistant.invoke(request).await.inspect_err(|e| {
            tracing::error!(thread_ts = %thread_id, error = %e, "Claude Code invocation failed");
        })?;

        let committed = if response.session_id.is_empty() {
            session_id.as_str()
        } else {
            response.session_id.as_str()
        };
        self.registry.set(thread_id, committed).await;

        Ok(ClaudeResponse {
            session_id: committed.to_string(),
            ..response
        })
    }

    async fn reply_text(&self, thread_id: &str, prompt: &str) -> String {
        match self.converse(thread_id, prompt).await {
            Ok(response) => {
                if response.is_error {
                    tracing::warn!(thread_ts = %thread_id, "Claude Code reported an error result");
                }
                response.result
            }
            Err(e) => error_text(&e),
        }
    }

    fn request(&self, prompt: &str) -> InvokeRequest {
        InvokeRequest::new(prompt, &self.workspace).with_timeout(self.timeout)
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.thread_locks
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }
}

/// Bot-originated messages and subtype notices are never answered.
fn is_automated(event: &SlackEvent) -> bool {
    event.bot_id.is_some() || event.subtype.is_some()
}
