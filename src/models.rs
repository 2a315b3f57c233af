//! Core data types shared across the orchestrator.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Lifecycle state of a delegated work session.
///
/// `Merged` and `Failed` are terminal. Everything else, including states
/// this binary has never heard of, counts as still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Planning,
    InProgress,
    Completed,
    Merged,
    Failed,
    /// A remote state this version does not recognize. The raw string is
    /// kept verbatim so it survives persistence and re-reads unchanged.
    Unknown(String),
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Created => "CREATED",
            SessionState::Planning => "PLANNING",
            SessionState::InProgress => "IN_PROGRESS",
            SessionState::Completed => "COMPLETED",
            SessionState::Merged => "MERGED",
            SessionState::Failed => "FAILED",
            SessionState::Unknown(raw) => raw,
        }
    }

    /// Parse a state string. Never fails: unrecognized values become
    /// `Unknown` and round-trip verbatim.
    pub fn parse(s: &str) -> Self {
        match s {
            "CREATED" => SessionState::Created,
            "PLANNING" => SessionState::Planning,
            "IN_PROGRESS" => SessionState::InProgress,
            "COMPLETED" => SessionState::Completed,
            "MERGED" => SessionState::Merged,
            "FAILED" => SessionState::Failed,
            other => SessionState::Unknown(other.to_string()),
        }
    }

    /// Terminal sessions are immutable and never re-dispatched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Merged | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SessionState::parse(s))
    }
}

/// A tracked session row. `merge_attempts` counts consecutive failed
/// finalize passes and survives restarts.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub issue_number: i64,
    pub issue_title: String,
    pub repo: String,
    pub state: SessionState,
    pub pr_number: Option<i64>,
    pub pr_url: Option<String>,
    pub merge_attempts: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A backlog issue eligible for automation.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// An open pull request as seen by the reconciler.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub url: String,
    pub head_branch: String,
}

/// Review state of a single pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Merged => "merged",
            PrState::Closed => "closed",
        }
    }
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A repository connected to the agent, as reported by its sources API.
#[derive(Debug, Clone)]
pub struct AgentSource {
    /// Opaque resource name, passed back when creating sessions.
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub default_branch: String,
}

/// A session listed by the agent API, used to re-attach orphans.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    pub id: String,
    pub title: String,
    pub state: SessionState,
}
