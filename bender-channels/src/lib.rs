//! Bender Channels - Slack relay for headless Claude Code.
//!
//! A Slack mention starts a Claude Code session bound to the thread it
//! creates; replies in that thread resume the same session. An
//! authenticated HTTP endpoint does the same for programmatic callers.
//!
//! ```text
//! Slack ─ Socket Mode ─→ Dispatcher ─→ claude --print (subprocess)
//!   ↑                       │ ↕
//!   └──── chat.postMessage ─┘ SessionRegistry (thread_ts → session_id)
//! HTTP /api/invoke ─────────↗
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod claude;
pub mod dispatch;
pub mod routes;
pub mod session;
pub mod slack;
pub mod traits;

// Re-export commonly used types
pub use claude::{Assistant, ClaudeCli, ClaudeError, ClaudeResponse, InvokeRequest};
pub use dispatch::{Dispatcher, ERROR_PREFIX, HELP_TEXT};
pub use routes::{build_router, create_state, ApiRequest, ApiResponse, AppState};
pub use session::{new_session_id, SessionRegistry};
pub use slack::socket::SocketModeListener;
pub use slack::{SlackClient, SlackEvent};
pub use traits::{ChannelError, ChannelResult, ChatPoster, Reply};

use bender_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the Claude Code client with the configured credentials.
pub fn build_assistant(config: &Config) -> ClaudeCli {
    let mut cli = ClaudeCli::new(config.claude.binary.clone());
    if let Some(key) = config.claude.anthropic_api_key.as_deref().filter(|k| !k.is_empty()) {
        cli = cli.with_env("ANTHROPIC_API_KEY", key);
    }
    if let Some(token) = config.claude.oauth_token.as_deref().filter(|t| !t.is_empty()) {
        cli = cli.with_env("CLAUDE_CODE_OAUTH_TOKEN", token);
    }
    cli
}

/// Start the Socket Mode listener and the HTTP API.
///
/// Expects a validated configuration. Returns when the server shuts down.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.api.host.parse::<std::net::IpAddr>()?,
        config.api.port,
    ));

    let bot_token = config.slack.bot_token.clone().unwrap_or_default();
    let app_token = config.slack.app_token.clone().unwrap_or_default();
    let slack = Arc::new(SlackClient::new(bot_token));

    let bot_user_id = match slack.auth_test().await {
        Ok(id) => {
            tracing::info!(bot_user_id = %id, "Slack bot authenticated");
            Some(id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not resolve bot user ID");
            None
        }
    };

    let registry = Arc::new(SessionRegistry::new());
    let dispatcher = Arc::new(
        Dispatcher::new(
            registry,
            Arc::new(build_assistant(config)),
            config.workspace.clone(),
            config.claude.timeout(),
        )
        .with_bot_user_id(bot_user_id),
    );

    let listener_handle = tokio::spawn(
        SocketModeListener::new(slack.clone(), app_token, dispatcher.clone()).run(),
    );

    if config.api.api_key.as_deref().map_or(true, str::is_empty) {
        tracing::warn!("BENDER_API_KEY not set, /api/invoke will answer 503");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let state = create_state(dispatcher, slack, config.api.api_key.clone());
    let router = build_router(state).layer(cors);

    tracing::info!(
        workspace = %config.workspace.display(),
        "Starting Bender API on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    listener_handle.abort();
    tracing::info!("Bender stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_assistant_uses_configured_binary() {
        let mut config = Config::default();
        config.claude.binary = "/opt/claude/bin/claude".into();
        assert_eq!(build_assistant(&config).binary(), "/opt/claude/bin/claude");
    }
}
