//! Slack Socket Mode listener.
//!
//! Opens a WebSocket via `apps.connections.open`, acknowledges every
//! envelope and hands `events_api` payloads to the [`Dispatcher`], one
//! spawned task per event. Reconnects on `disconnect` envelopes, socket
//! close and errors.

use super::{SlackClient, SlackEvent};
use crate::dispatch::Dispatcher;
use crate::traits::{ChannelError, ChannelResult, ChatPoster};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// Delay before reconnecting after a dropped connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    payload: Option<Value>,
    reason: Option<String>,
}

/// What to do with one inbound frame.
#[derive(Debug, PartialEq)]
enum Frame {
    Hello,
    Disconnect(String),
    /// Acknowledge, then dispatch the event if there is one
    Event {
        envelope_id: String,
        event: Option<SlackEvent>,
    },
    /// Acknowledge only
    Ack(String),
    Ignore,
}

fn parse_frame(text: &str) -> Frame {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid Socket Mode frame");
            return Frame::Ignore;
        }
    };

    match (envelope.kind.as_str(), envelope.envelope_id) {
        ("hello", _) => Frame::Hello,
        ("disconnect", _) => Frame::Disconnect(envelope.reason.unwrap_or_default()),
        ("events_api", Some(envelope_id)) => {
            let event = envelope
                .payload
                .and_then(|p| p.get("event").cloned())
                .and_then(|e| serde_json::from_value(e).ok());
            Frame::Event { envelope_id, event }
        }
        (_, Some(envelope_id)) => Frame::Ack(envelope_id),
        (_, None) => Frame::Ignore,
    }
}

fn ack(envelope_id: &str) -> Message {
    Message::Text(json!({ "envelope_id": envelope_id }).to_string())
}

/// Long-running Socket Mode connection driving the dispatcher.
pub struct SocketModeListener {
    client: Arc<SlackClient>,
    app_token: String,
    dispatcher: Arc<Dispatcher>,
}

impl SocketModeListener {
    pub fn new(client: Arc<SlackClient>, app_token: String, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            client,
            app_token,
            dispatcher,
        }
    }

    /// Run forever, reconnecting after every disconnect.
    pub async fn run(self) {
        loop {
            match self.connect_once().await {
                Ok(()) => tracing::info!("Socket Mode connection closed, reconnecting"),
                Err(e) => tracing::warn!(error = %e, "Socket Mode connection failed"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn connect_once(&self) -> ChannelResult<()> {
        let url = self.client.open_socket_url(&self.app_token).await?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connection(format!("WebSocket connection failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        tracing::info!("Slack Socket Mode connected");

        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(Message::Text(t)) => t,
                Ok(Message::Ping(payload)) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| ChannelError::Connection(format!("Failed to send pong: {e}")))?;
                    continue;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(ChannelError::Connection(format!("WebSocket error: {e}"))),
            };

            match parse_frame(&text) {
                Frame::Hello => tracing::debug!("Socket Mode hello"),
                Frame::Disconnect(reason) => {
                    tracing::info!(reason = %reason, "Slack requested disconnect");
                    break;
                }
                Frame::Event { envelope_id, event } => {
                    write
                        .send(ack(&envelope_id))
                        .await
                        .map_err(|e| ChannelError::Connection(format!("Failed to ack: {e}")))?;
                    match event {
                        Some(event) => self.spawn_dispatch(event),
                        None => tracing::warn!(envelope_id = %envelope_id, "Envelope without event"),
                    }
                }
                Frame::Ack(envelope_id) => {
                    write
                        .send(ack(&envelope_id))
                        .await
                        .map_err(|e| ChannelError::Connection(format!("Failed to ack: {e}")))?;
                }
                Frame::Ignore => {}
            }
        }

        let _ = write.close().await;
        Ok(())
    }

    fn spawn_dispatch(&self, event: SlackEvent) {
        let dispatcher = self.dispatcher.clone();
        let client = self.client.clone();
        tokio::spawn(async move {
            let Some(reply) = dispatcher.handle_event(&event).await else {
                return;
            };
            if let Err(e) = client.post_reply(&reply).await {
                tracing::error!(
                    channel = %reply.channel,
                    thread_ts = %reply.thread_ts,
                    error = %e,
                    "Failed to post reply"
                );
            }
        });
    }
}
