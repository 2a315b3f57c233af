//! Session lifecycle: dispatch an issue to the agent, poll until the work
//! settles, then finalize by merging or flagging the resulting PR.
//!
//! Dispatch is at-least-once safe. Before creating anything remote it
//! checks the store for a resumable session and then the agent itself for
//! an orphan from a run that died before persisting, so a crash at any
//! point never produces a second session for the same issue.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::github::IssueSource;
use crate::jules::AgentClient;
use crate::models::{AgentSource, Issue, PrState, Session, SessionState};
use crate::notify::{self, Notifier};
use crate::reconcile::{self, MatchContext};
use crate::store::SessionStore;

/// How a poll loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
}

/// How a finalize pass ended. Retry accounting for `NoPr` and
/// `MergeRejected` belongs to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Merged,
    NoPr,
    AwaitingReview,
    MergeRejected,
}

/// Merge policy chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Merge the PR and close the issue as soon as the session completes.
    Auto,
    /// Notify and wait for a human to merge.
    Manual,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Target repository as "owner/repo".
    pub repo: String,
    pub merge_policy: MergePolicy,
    /// Delay between remote state polls.
    pub poll_interval: Duration,
    /// Delay between pause-flag re-checks while the brake is engaged.
    pub pause_interval: Duration,
    /// Delay before retrying after a transient agent error.
    pub retry_interval: Duration,
}

impl LifecycleConfig {
    pub fn new(repo: &str, merge_policy: MergePolicy) -> Self {
        Self {
            repo: repo.to_string(),
            merge_policy,
            poll_interval: Duration::from_secs(60),
            pause_interval: Duration::from_secs(30),
            retry_interval: Duration::from_secs(30),
        }
    }
}

/// Session title used for orphan re-attachment. Must stay stable across
/// versions or old orphans become invisible.
pub fn session_title(issue_number: i64) -> String {
    format!("Fix Issue #{issue_number}")
}

fn session_prompt(issue: &Issue) -> String {
    format!(
        "Fix Issue #{}: {}\n\n{}",
        issue.number,
        issue.title,
        issue.body.as_deref().unwrap_or("")
    )
}

pub struct SessionLifecycle<A, I, N, C> {
    store: SessionStore,
    agent: A,
    issues: I,
    notifier: N,
    clock: C,
    cfg: LifecycleConfig,
}

impl<A, I, N, C> SessionLifecycle<A, I, N, C>
where
    A: AgentClient,
    I: IssueSource,
    N: Notifier,
    C: Clock,
{
    pub fn new(
        store: SessionStore,
        agent: A,
        issues: I,
        notifier: N,
        clock: C,
        cfg: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            agent,
            issues,
            notifier,
            clock,
            cfg,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn issues(&self) -> &I {
        &self.issues
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn repo(&self) -> &str {
        &self.cfg.repo
    }

    /// Ensure exactly one live session exists for the issue, creating a
    /// remote session only when neither the store nor the agent already
    /// has one.
    pub async fn dispatch(&self, issue: &Issue) -> Result<Session> {
        if let Some(existing) = self
            .store
            .get_session_by_issue(issue.number, &self.cfg.repo)?
        {
            if !existing.state.is_terminal() {
                info!(
                    session = %existing.id,
                    issue = issue.number,
                    "resuming tracked session"
                );
                return self.track(&existing.id, issue, &SessionState::InProgress);
            }
        }

        let title = session_title(issue.number);
        if let Some(orphan_id) = self.find_orphan(&title).await {
            info!(
                session = %orphan_id,
                issue = issue.number,
                "adopting untracked remote session"
            );
            return self.track(&orphan_id, issue, &SessionState::InProgress);
        }

        let source = self.resolve_source().await?;
        info!(issue = issue.number, source = %source.name, "starting new agent session");
        let id = self
            .agent
            .create_session(
                &session_prompt(issue),
                &source.name,
                &source.default_branch,
                &title,
            )
            .await
            .context("failed to create agent session")?;
        let session = self.track(&id, issue, &SessionState::InProgress)?;
        self.notifier
            .send(&notify::session_started(issue.number, &issue.title))
            .await;
        Ok(session)
    }

    fn track(&self, id: &str, issue: &Issue, state: &SessionState) -> Result<Session> {
        self.store
            .upsert_session(id, issue.number, &issue.title, &self.cfg.repo, state)
    }

    /// Look for a live remote session with our title. Listing failures are
    /// tolerated; worst case a duplicate session is created, which the
    /// reconciler still resolves to a single PR.
    async fn find_orphan(&self, title: &str) -> Option<String> {
        let sessions = match self.agent.list_sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!("could not check for orphaned sessions: {err}");
                return None;
            }
        };
        for remote in sessions {
            if remote.title != title || remote.state.is_terminal() {
                continue;
            }
            // A session this orchestrator already gave up on stays
            // abandoned; the issue gets a fresh one instead.
            let abandoned = self
                .store
                .get_session(&remote.id)
                .ok()
                .flatten()
                .is_some_and(|local| local.state.is_terminal());
            if abandoned {
                warn!(session = %remote.id, "ignoring remote session recorded as terminal");
                continue;
            }
            return Some(remote.id);
        }
        None
    }

    async fn resolve_source(&self) -> Result<AgentSource> {
        let (owner, repo) = self
            .cfg
            .repo
            .split_once('/')
            .context("target repo is not of the form owner/repo")?;
        let sources = self
            .agent
            .list_sources()
            .await
            .context("failed to list agent sources")?;
        sources
            .into_iter()
            .find(|s| s.owner == owner && s.repo == repo)
            .with_context(|| format!("agent has no source connected for {}", self.cfg.repo))
    }

    /// Poll the remote session until it settles. Every observed state is
    /// persisted verbatim, including ones this binary does not recognize.
    /// Transient agent errors are retried indefinitely; anything else
    /// fails the session and engages the brake.
    pub async fn poll(&self, session: &Session) -> Result<PollOutcome> {
        loop {
            if self.store.is_paused()? {
                info!(session = %session.id, "paused; holding before next poll");
                self.clock.sleep(self.cfg.pause_interval).await;
                continue;
            }
            match self.agent.session_state(&session.id).await {
                Ok(state) => {
                    info!(session = %session.id, state = %state, "observed session state");
                    self.store.update_session_state(&session.id, &state)?;
                    match state {
                        SessionState::Completed => return Ok(PollOutcome::Completed),
                        SessionState::Failed => {
                            self.engage_brake(session).await?;
                            return Ok(PollOutcome::Failed);
                        }
                        _ => self.clock.sleep(self.cfg.poll_interval).await,
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(session = %session.id, "transient agent error, will retry: {err}");
                    self.clock.sleep(self.cfg.retry_interval).await;
                }
                Err(err) => {
                    error!(session = %session.id, "unrecoverable agent error: {err}");
                    self.fail_session(session).await?;
                    return Ok(PollOutcome::Failed);
                }
            }
        }
    }

    /// Force the session to FAILED, notify, and pause all automation.
    pub async fn fail_session(&self, session: &Session) -> Result<()> {
        self.store
            .update_session_state(&session.id, &SessionState::Failed)?;
        self.engage_brake(session).await
    }

    async fn engage_brake(&self, session: &Session) -> Result<()> {
        self.notifier
            .send(&notify::session_failed(session.issue_number, &session.id))
            .await;
        self.store.set_paused(true)
    }

    /// Attribute a PR to the completed session and drive it to merged,
    /// either directly or by watching for a human to do it.
    pub async fn finalize(&self, session: &Session) -> Result<FinalizeOutcome> {
        info!(issue = session.issue_number, "reconciling pull requests");
        let prs = self
            .issues
            .list_pull_requests()
            .await
            .context("failed to list pull requests")?;
        let ctx = MatchContext {
            issue_number: session.issue_number,
            session_id: Some(session.id.as_str()),
        };
        let Some((pr, rule)) = reconcile::find_pull_request(&prs, &ctx) else {
            warn!(issue = session.issue_number, "no matching pull request found");
            return Ok(FinalizeOutcome::NoPr);
        };
        info!(pr = pr.number, rule, url = %pr.url, "attributed pull request");
        let newly_linked = self.store.update_session_pr(&session.id, pr.number, &pr.url)?;

        match self.cfg.merge_policy {
            MergePolicy::Auto => {
                if newly_linked {
                    self.notifier
                        .send(&notify::pr_created(session.issue_number, &pr.url))
                        .await;
                }
                match self.issues.merge_pull_request(pr.number).await {
                    Ok(()) => {
                        self.complete_merge(session, pr.number).await?;
                        Ok(FinalizeOutcome::Merged)
                    }
                    Err(err) => {
                        warn!(pr = pr.number, "merge attempt rejected: {err:#}");
                        Ok(FinalizeOutcome::MergeRejected)
                    }
                }
            }
            MergePolicy::Manual => {
                if newly_linked {
                    self.notifier
                        .send(&notify::ready_for_review(session.issue_number, &pr.url))
                        .await;
                }
                match self
                    .issues
                    .pull_request_state(pr.number)
                    .await
                    .context("failed to query pull request state")?
                {
                    PrState::Merged => {
                        self.complete_merge(session, pr.number).await?;
                        Ok(FinalizeOutcome::Merged)
                    }
                    PrState::Open => Ok(FinalizeOutcome::AwaitingReview),
                    PrState::Closed => {
                        warn!(pr = pr.number, "pull request closed without merging");
                        Ok(FinalizeOutcome::MergeRejected)
                    }
                }
            }
        }
    }

    async fn complete_merge(&self, session: &Session, pr_number: i64) -> Result<()> {
        self.notifier
            .send(&notify::merged(session.issue_number, pr_number))
            .await;
        self.store
            .update_session_state(&session.id, &SessionState::Merged)?;
        let comment = format!("Merged via automation in PR #{pr_number}");
        // A failed close leaves the issue open for a human; the session
        // itself is already merged and must not regress.
        if let Err(err) = self.issues.close_issue(session.issue_number, &comment).await {
            warn!(
                issue = session.issue_number,
                "failed to close issue after merge: {err:#}"
            );
        } else {
            info!(issue = session.issue_number, pr = pr_number, "issue closed");
        }
        Ok(())
    }
}
