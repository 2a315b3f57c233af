//! Top-level orchestration loop.
//!
//! Each iteration: honor the pause flag, resume any in-flight session,
//! otherwise dispatch the next eligible backlog issue. Retry accounting
//! for failed finalize passes lives here, against the durable counter.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::github::IssueSource;
use crate::jules::AgentClient;
use crate::lifecycle::{FinalizeOutcome, PollOutcome, SessionLifecycle};
use crate::models::{Issue, Session, SessionState};
use crate::notify::Notifier;

/// Finalize failures tolerated before the session is abandoned. The
/// attempt that pushes the counter past this fails the session and
/// engages the brake.
pub const MAX_MERGE_ATTEMPTS: i64 = 3;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Label selecting backlog issues eligible for automation.
    pub issue_label: String,
    /// Delay between iterations when the backlog is empty or after a
    /// dispatch cycle finishes.
    pub idle_interval: Duration,
    /// Delay between pause-flag re-checks.
    pub pause_interval: Duration,
    /// Grace period after completion before the PR search, covering the
    /// gap between the agent finishing and its PR appearing.
    pub propagation_delay: Duration,
    /// Exit after a single iteration instead of looping forever.
    pub run_once: bool,
}

impl LoopConfig {
    pub fn new(issue_label: &str) -> Self {
        Self {
            issue_label: issue_label.to_string(),
            idle_interval: Duration::from_secs(300),
            pause_interval: Duration::from_secs(60),
            propagation_delay: Duration::from_secs(20),
            run_once: false,
        }
    }
}

/// What a single iteration did, which decides the pacing before the next.
#[derive(Debug, PartialEq, Eq)]
enum Iteration {
    Paused,
    ResumedActive,
    Dispatched,
    Idle,
}

pub struct OrchestrationLoop<A, I, N, C> {
    lifecycle: SessionLifecycle<A, I, N, C>,
    cfg: LoopConfig,
}

impl<A, I, N, C> OrchestrationLoop<A, I, N, C>
where
    A: AgentClient,
    I: IssueSource,
    N: Notifier,
    C: Clock,
{
    pub fn new(lifecycle: SessionLifecycle<A, I, N, C>, cfg: LoopConfig) -> Self {
        Self { lifecycle, cfg }
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            repo = self.lifecycle.repo(),
            label = %self.cfg.issue_label,
            run_once = self.cfg.run_once,
            "starting orchestration loop"
        );
        loop {
            let outcome = match self.run_iteration().await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Iteration errors are transient by assumption; the loop
                    // itself must survive them.
                    error!("iteration failed: {err:#}");
                    Iteration::Idle
                }
            };
            if self.cfg.run_once {
                info!("single iteration complete, exiting");
                return Ok(());
            }
            match outcome {
                Iteration::Paused => {
                    self.lifecycle.clock().sleep(self.cfg.pause_interval).await
                }
                // An active session just progressed; look again right away.
                Iteration::ResumedActive => {}
                Iteration::Dispatched | Iteration::Idle => {
                    self.lifecycle.clock().sleep(self.cfg.idle_interval).await
                }
            }
        }
    }

    async fn run_iteration(&self) -> Result<Iteration> {
        if self.lifecycle.store().is_paused()? {
            info!("orchestrator is paused; no work will be dispatched");
            return Ok(Iteration::Paused);
        }
        if let Some(session) = self.next_active_session()? {
            self.resume(&session).await?;
            return Ok(Iteration::ResumedActive);
        }
        match self.next_issue().await? {
            Some(issue) => {
                info!(issue = issue.number, title = %issue.title, "dispatching backlog issue");
                self.drive(&issue).await?;
                Ok(Iteration::Dispatched)
            }
            None => {
                info!("backlog is clear; idling");
                Ok(Iteration::Idle)
            }
        }
    }

    fn next_active_session(&self) -> Result<Option<Session>> {
        let active = self
            .lifecycle
            .store()
            .list_active_sessions(self.lifecycle.repo())?;
        Ok(active.into_iter().next())
    }

    /// Pick up a session left over from a previous iteration or process.
    async fn resume(&self, session: &Session) -> Result<()> {
        if session.state == SessionState::Completed {
            info!(
                session = %session.id,
                issue = session.issue_number,
                "completed session awaiting merge"
            );
            self.lifecycle
                .clock()
                .sleep(self.cfg.propagation_delay)
                .await;
            self.finalize_with_accounting(session).await
        } else {
            info!(
                session = %session.id,
                issue = session.issue_number,
                state = %session.state,
                "re-attaching to in-flight session"
            );
            self.poll_then_finalize(session).await
        }
    }

    /// Dispatch one issue and see its session through.
    async fn drive(&self, issue: &Issue) -> Result<()> {
        let session = self.lifecycle.dispatch(issue).await?;
        self.poll_then_finalize(&session).await
    }

    async fn poll_then_finalize(&self, session: &Session) -> Result<()> {
        if self.lifecycle.poll(session).await? == PollOutcome::Completed {
            info!("waiting for pull request propagation");
            self.lifecycle
                .clock()
                .sleep(self.cfg.propagation_delay)
                .await;
            self.finalize_with_accounting(session).await?;
        }
        Ok(())
    }

    async fn finalize_with_accounting(&self, session: &Session) -> Result<()> {
        match self.lifecycle.finalize(session).await? {
            FinalizeOutcome::Merged => {}
            FinalizeOutcome::AwaitingReview => {
                info!(session = %session.id, "pull request awaiting manual review");
            }
            outcome @ (FinalizeOutcome::NoPr | FinalizeOutcome::MergeRejected) => {
                let attempts = self
                    .lifecycle
                    .store()
                    .increment_merge_attempts(&session.id)?;
                if attempts > MAX_MERGE_ATTEMPTS {
                    error!(
                        session = %session.id,
                        attempts,
                        "finalize retries exhausted, abandoning session"
                    );
                    self.lifecycle.fail_session(session).await?;
                } else {
                    warn!(
                        session = %session.id,
                        attempts,
                        ?outcome,
                        "finalize did not converge, will retry"
                    );
                }
            }
        }
        Ok(())
    }

    /// First open labelled issue that is not already covered by a live or
    /// merged session. FAILED sessions do not block their issue: once a
    /// human resumes, the issue gets a fresh attempt.
    async fn next_issue(&self) -> Result<Option<Issue>> {
        let issues = self
            .lifecycle
            .issues()
            .list_issues(&self.cfg.issue_label)
            .await?;
        if issues.is_empty() {
            return Ok(None);
        }
        for issue in issues {
            if let Some(session) = self
                .lifecycle
                .store()
                .get_session_by_issue(issue.number, self.lifecycle.repo())?
            {
                if session.state != SessionState::Failed {
                    info!(
                        issue = issue.number,
                        session = %session.id,
                        state = %session.state,
                        "issue already handled, skipping"
                    );
                    continue;
                }
            }
            return Ok(Some(issue));
        }
        Ok(None)
    }
}
