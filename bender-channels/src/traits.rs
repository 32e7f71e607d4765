//! Seams between the dispatcher and the chat platform.

use crate::slack::format::{split_message, SLACK_MSG_LIMIT};
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel not ready")]
    NotReady,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ChannelError> for bender_common::Error {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Auth(msg) => Self::UpstreamPost(format!("Slack auth failed: {msg}")),
            ChannelError::Internal(msg) => Self::Internal(msg),
            other => Self::UpstreamPost(other.to_string()),
        }
    }
}

/// A message to post into an existing thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub channel: String,
    pub thread_ts: String,
    pub text: String,
}

impl Reply {
    pub fn new(
        channel: impl Into<String>,
        thread_ts: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: thread_ts.into(),
            text: text.into(),
        }
    }
}

/// Something that can post text into a channel, optionally inside a thread.
#[async_trait]
pub trait ChatPoster: Send + Sync {
    /// Post `text` to `channel`. Returns the timestamp of the posted message.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> ChannelResult<String>;

    /// Post a reply into its thread, split into chunks that fit one message.
    async fn post_reply(&self, reply: &Reply) -> ChannelResult<()> {
        let chunks = split_message(&reply.text, SLACK_MSG_LIMIT);
        if chunks.is_empty() {
            tracing::warn!(thread_ts = %reply.thread_ts, "Skipping empty reply");
            return Ok(());
        }
        for chunk in &chunks {
            self.post_message(&reply.channel, chunk, Some(&reply.thread_ts))
                .await?;
        }
        tracing::debug!(
            thread_ts = %reply.thread_ts,
            chunks = chunks.len(),
            "Reply posted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChannelError::RateLimited { retry_after_secs: 30 };
        assert_eq!(err.to_string(), "Rate limited: retry after 30 seconds");
        assert_eq!(
            ChannelError::SendFailed("channel_not_found".into()).to_string(),
            "Message send failed: channel_not_found"
        );
    }

    #[test]
    fn test_conversion_maps_to_bad_gateway() {
        let err: bender_common::Error = ChannelError::SendFailed("boom".into()).into();
        assert_eq!(err.status_code(), 502);

        let err: bender_common::Error = ChannelError::Auth("invalid_auth".into()).into();
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("invalid_auth"));
    }

    #[derive(Default)]
    struct Recorder {
        posts: std::sync::Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl ChatPoster for Recorder {
        async fn post_message(
            &self,
            channel: &str,
            text: &str,
            thread_ts: Option<&str>,
        ) -> ChannelResult<String> {
            let mut posts = self.posts.lock().unwrap();
            posts.push((channel.into(), text.into(), thread_ts.map(String::from)));
            Ok(format!("ts-{}", posts.len()))
        }
    }

    #[tokio::test]
    async fn test_post_reply_splits_into_thread() {
        let recorder = Recorder::default();
        let text = format!("{}\n{}", "a".repeat(3500), "b".repeat(3500));
        recorder
            .post_reply(&Reply::new("C1", "T1", text))
            .await
            .unwrap();

        let posts = recorder.posts.lock().unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|(channel, _, thread)| {
            channel == "C1" && thread.as_deref() == Some("T1")
        }));
        assert_eq!(posts[0].1, "a".repeat(3500));
        assert_eq!(posts[1].1, "b".repeat(3500));
    }

    #[tokio::test]
    async fn test_post_reply_skips_empty_text() {
        let recorder = Recorder::default();
        recorder.post_reply(&Reply::new("C1", "T1", "")).await.unwrap();
        assert!(recorder.posts.lock().unwrap().is_empty());
    }
}
