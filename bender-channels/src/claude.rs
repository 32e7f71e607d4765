//! Claude Code CLI invocation.
//!
//! Runs `claude --print --output-format json` as a subprocess inside the
//! configured workspace and translates process semantics into a typed
//! response or a classified failure:
//!
//! - executable missing → [`ClaudeError::NotFound`]
//! - time bound exceeded → [`ClaudeError::Timeout`] (the child is killed and reaped first)
//! - non-zero exit → [`ClaudeError::ExecutionFailed`]
//!
//! Output that is not a JSON object is accepted as plain text.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Default timeout for Claude Code invocations (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How long to wait for a killed child to be reaped.
const REAP_GRACE: Duration = Duration::from_secs(5);

/// Placeholder used when a failed process wrote nothing to stderr.
const EMPTY_STDERR: &str = "Unknown error";

/// A single Claude Code invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Prompt passed verbatim as the final positional argument
    pub prompt: String,
    /// Working directory for the subprocess
    pub workspace: PathBuf,
    /// Session to create (resume = false) or resume (resume = true)
    pub session_id: Option<String>,
    pub resume: bool,
    pub timeout: Duration,
}

impl InvokeRequest {
    /// Request for a fresh session whose ID is assigned by the CLI.
    pub fn new(prompt: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            workspace: workspace.into(),
            session_id: None,
            resume: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Start a new session with an explicit ID.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.resume = false;
        self
    }

    /// Resume an existing session.
    pub fn resuming(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.resume = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Parsed response from the Claude Code CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeResponse {
    pub result: String,
    pub session_id: String,
    /// The CLI reported an application-level failure despite exiting 0
    pub is_error: bool,
}

/// Classified invocation failure.
#[derive(Debug, thiserror::Error)]
pub enum ClaudeError {
    #[error("Claude Code CLI not found. Ensure '{binary}' is installed and in PATH ({reason})")]
    NotFound { binary: String, reason: String },

    #[error("Claude Code timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Claude Code exited with code {}: {stderr}", display_code(.code))]
    ExecutionFailed { code: Option<i32>, stderr: String },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl From<ClaudeError> for bender_common::Error {
    fn from(err: ClaudeError) -> Self {
        match err {
            ClaudeError::NotFound { .. } => Self::AssistantUnavailable(err.to_string()),
            ClaudeError::Timeout(_) => Self::Timeout(err.to_string()),
            ClaudeError::ExecutionFailed { .. } => Self::Execution(err.to_string()),
        }
    }
}

/// Anything that can answer an [`InvokeRequest`].
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn invoke(&self, request: InvokeRequest) -> Result<ClaudeResponse, ClaudeError>;
}

/// Claude Code CLI subprocess client.
#[derive(Debug)]
pub struct ClaudeCli {
    binary: String,
    env: Vec<(String, String)>,
    degraded: AtomicU64,
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeCli {
    /// Create a client for the given executable name or path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            env: Vec::new(),
            degraded: AtomicU64::new(0),
        }
    }

    /// Add an environment variable for the child process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Number of invocations whose output was not a JSON object.
    pub fn degraded_outputs(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Build the CLI argument list for a request.
    pub fn build_args(request: &InvokeRequest) -> Vec<String> {
        let mut args: Vec<String> = ["--print", "--output-format", "json"]
            .into_iter()
            .map(String::from)
            .collect();

        match (&request.session_id, request.resume) {
            (Some(id), true) => {
                args.push("--resume".into());
                args.push(id.clone());
            }
            (Some(id), false) => {
                args.push("--session-id".into());
                args.push(id.clone());
            }
            (None, resume) => {
                if resume {
                    tracing::warn!("Resume requested without a session ID, starting fresh");
                }
            }
        }

        args.push("--".into());
        args.push(request.prompt.clone());
        args
    }

    fn spawn(&self, request: &InvokeRequest) -> Result<Child, ClaudeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(Self::build_args(request))
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&request.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| ClaudeError::NotFound {
            binary: self.binary.clone(),
            reason: e.to_string(),
        })
    }

    fn parse_response(&self, raw: &str, session_id: &str) -> ClaudeResponse {
        match parse_output(raw, session_id) {
            Some(response) => response,
            None => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    session_id = %session_id,
                    bytes = raw.len(),
                    "Claude Code output is not a JSON object, using raw text"
                );
                ClaudeResponse {
                    result: raw.trim().to_string(),
                    session_id: session_id.to_string(),
                    is_error: false,
                }
            }
        }
    }
}

#[async_trait]
impl Assistant for ClaudeCli {
    async fn invoke(&self, request: InvokeRequest) -> Result<ClaudeResponse, ClaudeError> {
        tracing::info!(
            session_id = ?request.session_id,
            resume = request.resume,
            workspace = %request.workspace.display(),
            "Invoking Claude Code"
        );

        let mut child = self.spawn(&request)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = {
            let run = async {
                tokio::try_join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
            };
            tokio::time::timeout(request.timeout, run).await
        };

        let (status, stdout, stderr) = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to collect Claude Code output");
                return Err(ClaudeError::ExecutionFailed {
                    code: None,
                    stderr: e.to_string(),
                });
            }
            Err(_) => {
                terminate(&mut child).await;
                tracing::error!(timeout_secs = request.timeout.as_secs(), "Claude Code timed out");
                return Err(ClaudeError::Timeout(request.timeout));
            }
        };

        check_status(status, &stderr)?;

        let raw = String::from_utf8_lossy(&stdout);
        Ok(self.parse_response(&raw, request.session_id.as_deref().unwrap_or("")))
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the child and wait (bounded) for it to be reaped.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "Failed to kill Claude Code process");
    }
    match tokio::time::timeout(REAP_GRACE, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(?status, "Claude Code process reaped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to reap Claude Code process"),
        Err(_) => tracing::warn!("Claude Code process did not exit after kill"),
    }
}

fn check_status(status: ExitStatus, stderr: &[u8]) -> Result<(), ClaudeError> {
    if status.success() {
        return Ok(());
    }

    let text = String::from_utf8_lossy(stderr).trim().to_string();
    let stderr = if text.is_empty() {
        EMPTY_STDERR.to_string()
    } else {
        text
    };

    tracing::error!(code = ?status.code(), stderr = %stderr, "Claude Code failed");
    Err(ClaudeError::ExecutionFailed {
        code: status.code(),
        stderr,
    })
}

#[derive(Debug, Deserialize)]
struct CliOutput {
    result: Option<String>,
    session_id: Option<String>,
    is_error: Option<bool>,
}

/// Parse `--output-format json` output. Returns `None` when it is not a JSON object.
fn parse_output(raw: &str, session_id: &str) -> Option<ClaudeResponse> {
    let data: CliOutput = serde_json::from_str(raw.trim()).ok()?;
    Some(ClaudeResponse {
        result: data.result.unwrap_or_else(|| raw.trim().to_string()),
        session_id: data.session_id.unwrap_or_else(|| session_id.to_string()),
        is_error: data.is_error.unwrap_or(false),
    })
}
