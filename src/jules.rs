//! Client for the Jules agent API (v1alpha).
//!
//! Every call returns `AgentError` so the lifecycle can distinguish
//! transient outages from conditions that doom the session.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::errors::AgentError;
use crate::models::{AgentSource, RemoteSession, SessionState};

const JULES_API_BASE: &str = "https://jules.googleapis.com/v1alpha";
const SESSION_PAGE_SIZE: u32 = 20;

/// The remote coding agent: dispatch work, observe progress.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Every repository the agent is connected to.
    async fn list_sources(&self) -> Result<Vec<AgentSource>, AgentError>;
    /// Start a session and return its id. The agent opens a PR on its own
    /// once the work is done.
    async fn create_session(
        &self,
        prompt: &str,
        source_name: &str,
        branch: &str,
        title: &str,
    ) -> Result<String, AgentError>;
    async fn session_state(&self, id: &str) -> Result<SessionState, AgentError>;
    /// Recently created sessions, newest first. Used to adopt orphans
    /// dispatched by a previous run that died before persisting.
    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AgentError>;
}

pub struct JulesClient {
    client: reqwest::Client,
    api_key: String,
}

impl JulesClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("x-goog-api-key", &self.api_key)
    }
}

/// Turn a non-2xx response into `AgentError::Api` with the body attached.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, AgentError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AgentError::Api { status, body })
}

#[derive(Debug, Deserialize)]
struct SourcesResponse {
    #[serde(default)]
    sources: Vec<SourcePayload>,
}

#[derive(Debug, Deserialize)]
struct SourcePayload {
    name: String,
    #[serde(rename = "githubRepo")]
    github_repo: Option<GithubRepoPayload>,
}

#[derive(Debug, Deserialize)]
struct GithubRepoPayload {
    owner: String,
    repo: String,
    #[serde(rename = "defaultBranch")]
    default_branch: Option<BranchPayload>,
}

#[derive(Debug, Deserialize)]
struct BranchPayload {
    #[serde(rename = "displayName")]
    display_name: String,
}

impl SourcePayload {
    fn into_source(self) -> Option<AgentSource> {
        let github = self.github_repo?;
        Some(AgentSource {
            name: self.name,
            owner: github.owner,
            repo: github.repo,
            default_branch: github
                .default_branch
                .map(|b| b.display_name)
                .unwrap_or_else(|| "main".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl SessionPayload {
    /// Sessions carry either a bare `id` or a resource `name` ending in the
    /// id segment.
    fn session_id(&self) -> Option<String> {
        if let Some(id) = &self.id {
            return Some(id.clone());
        }
        self.name
            .as_ref()
            .and_then(|name| name.rsplit('/').next())
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    #[serde(default)]
    sessions: Vec<SessionPayload>,
}

#[async_trait]
impl AgentClient for JulesClient {
    async fn list_sources(&self) -> Result<Vec<AgentSource>, AgentError> {
        let resp = self
            .request(self.client.get(format!("{JULES_API_BASE}/sources")))
            .send()
            .await?;
        let payload: SourcesResponse = check(resp).await?.json().await?;
        Ok(payload
            .sources
            .into_iter()
            .filter_map(SourcePayload::into_source)
            .collect())
    }

    async fn create_session(
        &self,
        prompt: &str,
        source_name: &str,
        branch: &str,
        title: &str,
    ) -> Result<String, AgentError> {
        let body = json!({
            "prompt": prompt,
            "sourceContext": {
                "source": source_name,
                "githubRepoContext": { "startingBranch": branch }
            },
            "automationMode": "AUTO_CREATE_PR",
            "title": title,
        });
        let resp = self
            .request(self.client.post(format!("{JULES_API_BASE}/sessions")))
            .json(&body)
            .send()
            .await?;
        let payload: SessionPayload = check(resp).await?.json().await?;
        payload
            .session_id()
            .ok_or(AgentError::MalformedResponse("id"))
    }

    async fn session_state(&self, id: &str) -> Result<SessionState, AgentError> {
        let resp = self
            .request(self.client.get(format!("{JULES_API_BASE}/sessions/{id}")))
            .send()
            .await?;
        let payload: SessionPayload = check(resp).await?.json().await?;
        payload
            .state
            .as_deref()
            .map(SessionState::parse)
            .ok_or(AgentError::MalformedResponse("state"))
    }

    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, AgentError> {
        let resp = self
            .request(self.client.get(format!("{JULES_API_BASE}/sessions")))
            .query(&[("pageSize", SESSION_PAGE_SIZE)])
            .send()
            .await?;
        let payload: SessionsResponse = check(resp).await?.json().await?;
        Ok(payload
            .sessions
            .into_iter()
            .filter_map(|s| {
                let id = s.session_id()?;
                Some(RemoteSession {
                    id,
                    title: s.title.unwrap_or_default(),
                    state: SessionState::parse(s.state.as_deref().unwrap_or("CREATED")),
                })
            })
            .collect())
    }
}
