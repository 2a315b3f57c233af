//! Typed errors for configuration and the remote agent API.

use reqwest::StatusCode;
use thiserror::Error;

/// Startup configuration problems. All of these abort before the loop runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TARGET_REPO is not set (expected \"owner/repo\")")]
    MissingTargetRepo,

    #[error("TARGET_REPO \"{0}\" is not of the form \"owner/repo\"")]
    InvalidTargetRepo(String),

    #[error("JULES_API_KEY is not set")]
    MissingJulesApiKey,

    #[error("GITHUB_TOKEN is not set")]
    MissingGithubToken,

    #[error("invalid {name}: \"{value}\" is not a number of seconds")]
    InvalidInterval { name: &'static str, value: String },
}

/// Errors from the remote agent API, split so callers can tell retryable
/// conditions from session-fatal ones.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("agent API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("agent API response missing field \"{0}\"")]
    MalformedResponse(&'static str),
}

impl AgentError {
    /// Transient errors are retried indefinitely by the poll loop. Anything
    /// else fails the session and engages the pause brake.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Transport(_) => true,
            AgentError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            AgentError::MalformedResponse(_) => false,
        }
    }
}
