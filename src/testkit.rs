//! Scripted doubles for the lifecycle and scheduler tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::clock::Clock;
use crate::errors::AgentError;
use crate::github::IssueSource;
use crate::jules::AgentClient;
use crate::models::{AgentSource, Issue, PrState, PullRequest, RemoteSession, SessionState};
use crate::notify::Notifier;
use crate::store::SessionStore;

pub fn transient_error() -> AgentError {
    AgentError::Api {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "upstream hiccup".into(),
    }
}

pub fn fatal_error() -> AgentError {
    AgentError::Api {
        status: StatusCode::NOT_FOUND,
        body: "session gone".into(),
    }
}

pub fn pr(number: i64, title: &str, branch: &str) -> PullRequest {
    PullRequest {
        number,
        title: title.to_string(),
        url: format!("https://example.com/pr/{number}"),
        head_branch: branch.to_string(),
    }
}

pub fn issue(number: i64, title: &str) -> Issue {
    Issue {
        number,
        title: title.to_string(),
        body: Some(format!("Details for issue {number}")),
    }
}

/// Agent double. `states` is drained one poll at a time; once empty every
/// poll reports COMPLETED.
#[derive(Default)]
pub struct ScriptedAgent {
    pub sources: Vec<AgentSource>,
    pub remote_sessions: Vec<RemoteSession>,
    pub states: Mutex<VecDeque<Result<SessionState, AgentError>>>,
    pub created_titles: Mutex<Vec<String>>,
    pub next_id: String,
    pub state_calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn for_repo(repo: &str) -> Self {
        let (owner, name) = repo.split_once('/').unwrap();
        Self {
            sources: vec![AgentSource {
                name: format!("sources/github/{owner}/{name}"),
                owner: owner.to_string(),
                repo: name.to_string(),
                default_branch: "main".to_string(),
            }],
            next_id: "S1".to_string(),
            ..Default::default()
        }
    }

    pub fn push_state(&self, state: SessionState) {
        self.states.lock().unwrap().push_back(Ok(state));
    }

    pub fn push_error(&self, err: AgentError) {
        self.states.lock().unwrap().push_back(Err(err));
    }

    pub fn created_count(&self) -> usize {
        self.created_titles.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    async fn list_sources(&self) -> Result<Vec<AgentSource>, AgentError> {
        Ok(self.sources.clone())
    }

    async fn create_session(
        &self,
        _prompt: &str,
        _source_name: &str,
        _branch: &str,
        title: &str,
    ) -> Result<String, AgentError> {
        self.created_titles.lock().unwrap().push(title.to_string());
        Ok(self.next_id.clone())
    }

    async fn session_state(&self, _id: &str) -> Result<SessionState, AgentError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        self.states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(SessionState::Completed))
    }

    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AgentError> {
        Ok(self.remote_sessions.clone())
    }
}

/// Issue tracker double recording every mutation.
#[derive(Default)]
pub struct FakeTracker {
    pub issues: Vec<Issue>,
    pub prs: Mutex<Vec<PullRequest>>,
    pub pr_states: Mutex<HashMap<i64, PrState>>,
    pub merged: Mutex<Vec<i64>>,
    pub closed: Mutex<Vec<i64>>,
    pub reject_merge: bool,
    pub list_issue_calls: AtomicUsize,
}

impl FakeTracker {
    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            ..Default::default()
        }
    }

    pub fn add_pr(&self, pr: PullRequest) {
        self.prs.lock().unwrap().push(pr);
    }

    pub fn set_pr_state(&self, number: i64, state: PrState) {
        self.pr_states.lock().unwrap().insert(number, state);
    }
}

#[async_trait]
impl IssueSource for FakeTracker {
    async fn list_issues(&self, _label: &str) -> Result<Vec<Issue>> {
        self.list_issue_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.issues.clone())
    }

    async fn create_issue(&self, _title: &str, _body: &str, _label: &str) -> Result<Issue> {
        bail!("issue creation is not scripted")
    }

    async fn close_issue(&self, number: i64, _comment: &str) -> Result<()> {
        self.closed.lock().unwrap().push(number);
        Ok(())
    }

    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>> {
        Ok(self.prs.lock().unwrap().clone())
    }

    async fn pull_request_state(&self, number: i64) -> Result<PrState> {
        Ok(self
            .pr_states
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .unwrap_or(PrState::Open))
    }

    async fn merge_pull_request(&self, number: i64) -> Result<()> {
        if self.reject_merge {
            bail!("branch protection rejected the merge");
        }
        self.merged.lock().unwrap().push(number);
        self.pr_states.lock().unwrap().insert(number, PrState::Merged);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Clock that returns immediately and records every requested sleep.
#[derive(Default)]
pub struct InstantClock {
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Clock that releases the pause brake on every sleep, through its own
/// connection to the shared database file.
pub struct UnpausingClock {
    pub db_path: PathBuf,
    pub sleeps: Mutex<Vec<Duration>>,
}

impl UnpausingClock {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Clock for UnpausingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let store = SessionStore::open(&self.db_path).expect("reopen store");
        store.set_paused(false).expect("clear pause flag");
    }
}
