//! GitHub REST client: backlog issues and pull requests for one repo.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::models::{Issue, PrState, PullRequest};

const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "octojules";
const PAGE_SIZE: u32 = 100;

/// Read/write view of the issue backlog and its pull requests.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Open issues carrying `label`, oldest first, true issues only.
    async fn list_issues(&self, label: &str) -> Result<Vec<Issue>>;
    async fn create_issue(&self, title: &str, body: &str, label: &str) -> Result<Issue>;
    /// Comment on an issue and close it.
    async fn close_issue(&self, number: i64, comment: &str) -> Result<()>;
    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>>;
    async fn pull_request_state(&self, number: i64) -> Result<PrState>;
    async fn merge_pull_request(&self, number: i64) -> Result<()>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(token: &str, repo: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.to_string(),
            repo: repo.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{GITHUB_API_BASE}/repos/{}{path}", self.repo)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
    }
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    number: i64,
    title: String,
    body: Option<String>,
    /// Present when the "issue" is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

impl IssuePayload {
    fn is_true_issue(&self) -> bool {
        self.pull_request.is_none()
    }

    fn into_issue(self) -> Issue {
        Issue {
            number: self.number,
            title: self.title,
            body: self.body,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrPayload {
    number: i64,
    title: String,
    html_url: String,
    head: PrHead,
}

#[derive(Debug, Deserialize)]
struct PrHead {
    #[serde(rename = "ref")]
    branch: String,
}

impl PrPayload {
    fn into_pull_request(self) -> PullRequest {
        PullRequest {
            number: self.number,
            title: self.title,
            url: self.html_url,
            head_branch: self.head.branch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrDetailPayload {
    state: String,
    #[serde(default)]
    merged: bool,
}

fn pr_state_of(detail: &PrDetailPayload) -> PrState {
    if detail.merged {
        PrState::Merged
    } else if detail.state == "open" {
        PrState::Open
    } else {
        PrState::Closed
    }
}

#[async_trait]
impl IssueSource for GitHubClient {
    async fn list_issues(&self, label: &str) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut page = 1u32;
        loop {
            let per_page = PAGE_SIZE.to_string();
            let page_param = page.to_string();
            let resp = self
                .request(self.client.get(self.url("/issues")))
                .query(&[
                    ("labels", label),
                    ("state", "open"),
                    ("sort", "created"),
                    ("direction", "asc"),
                    ("per_page", per_page.as_str()),
                    ("page", page_param.as_str()),
                ])
                .send()
                .await
                .context("failed to list issues")?
                .error_for_status()
                .context("issue listing rejected")?;
            let batch: Vec<IssuePayload> =
                resp.json().await.context("failed to decode issue list")?;
            let done = (batch.len() as u32) < PAGE_SIZE;
            issues.extend(
                batch
                    .into_iter()
                    .filter(IssuePayload::is_true_issue)
                    .map(IssuePayload::into_issue),
            );
            if done {
                return Ok(issues);
            }
            page += 1;
        }
    }

    async fn create_issue(&self, title: &str, body: &str, label: &str) -> Result<Issue> {
        let payload: IssuePayload = self
            .request(self.client.post(self.url("/issues")))
            .json(&json!({ "title": title, "body": body, "labels": [label] }))
            .send()
            .await
            .context("failed to create issue")?
            .error_for_status()
            .context("issue creation rejected")?
            .json()
            .await
            .context("failed to decode created issue")?;
        Ok(payload.into_issue())
    }

    async fn close_issue(&self, number: i64, comment: &str) -> Result<()> {
        self.request(self.client.post(self.url(&format!("/issues/{number}/comments"))))
            .json(&json!({ "body": comment }))
            .send()
            .await
            .context("failed to comment on issue")?
            .error_for_status()
            .context("issue comment rejected")?;
        self.request(self.client.patch(self.url(&format!("/issues/{number}"))))
            .json(&json!({ "state": "closed" }))
            .send()
            .await
            .context("failed to close issue")?
            .error_for_status()
            .context("issue close rejected")?;
        Ok(())
    }

    async fn list_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let batch: Vec<PrPayload> = self
            .request(self.client.get(self.url("/pulls")))
            .query(&[("state", "open"), ("per_page", "100")])
            .send()
            .await
            .context("failed to list pull requests")?
            .error_for_status()
            .context("pull request listing rejected")?
            .json()
            .await
            .context("failed to decode pull request list")?;
        Ok(batch.into_iter().map(PrPayload::into_pull_request).collect())
    }

    async fn pull_request_state(&self, number: i64) -> Result<PrState> {
        let detail: PrDetailPayload = self
            .request(self.client.get(self.url(&format!("/pulls/{number}"))))
            .send()
            .await
            .context("failed to fetch pull request")?
            .error_for_status()
            .context("pull request fetch rejected")?
            .json()
            .await
            .context("failed to decode pull request")?;
        Ok(pr_state_of(&detail))
    }

    async fn merge_pull_request(&self, number: i64) -> Result<()> {
        let resp = self
            .request(self.client.put(self.url(&format!("/pulls/{number}/merge"))))
            .json(&json!({ "merge_method": "merge" }))
            .send()
            .await
            .context("failed to request merge")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("merge of PR #{number} rejected ({status}): {body}");
        }
        Ok(())
    }
}
