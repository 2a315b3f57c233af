//! Octojules: an autonomous backlog orchestrator.
//!
//! Watches a repository for labelled issues, dispatches each one to the
//! Jules coding agent, polls the resulting session, and merges the PR the
//! agent opens. A durable pause flag acts as the safety brake: any session
//! failure halts all further automation until a human resumes it.

pub mod clock;
pub mod config;
pub mod errors;
pub mod github;
pub mod jules;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testkit;
