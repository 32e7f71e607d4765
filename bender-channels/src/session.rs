//! Session registry: maps Slack threads to Claude Code sessions.
//!
//! Each Slack thread maps to exactly one Claude Code session so that
//! follow-up messages in the thread resume the same conversation.
//! Entries live for the lifetime of the process.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Generate a fresh session identifier (random v4 UUID, canonical form).
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Thread-safe mapping between Slack thread timestamps and session IDs.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session for a thread, replacing any existing one.
    pub async fn create(&self, thread_ts: &str) -> String {
        let session_id = new_session_id();
        self.sessions
            .write()
            .await
            .insert(thread_ts.to_string(), session_id.clone());
        tracing::info!(thread_ts = %thread_ts, session_id = %session_id, "Created session");
        session_id
    }

    /// Get the session ID for a thread, if one exists.
    pub async fn get(&self, thread_ts: &str) -> Option<String> {
        self.sessions.read().await.get(thread_ts).cloned()
    }

    /// Check whether a thread has an existing session.
    pub async fn has(&self, thread_ts: &str) -> bool {
        self.sessions.read().await.contains_key(thread_ts)
    }

    /// Explicitly set the session ID for a thread (e.g. one reported by the CLI).
    pub async fn set(&self, thread_ts: &str, session_id: &str) {
        self.sessions
            .write()
            .await
            .insert(thread_ts.to_string(), session_id.to_string());
        tracing::info!(thread_ts = %thread_ts, session_id = %session_id, "Set session");
    }

    /// Number of tracked threads.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
