//! Runtime configuration, loaded from the environment with CLI overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::lifecycle::MergePolicy;

pub const DEFAULT_ISSUE_LABEL: &str = "jules-task";
pub const DEFAULT_DB_PATH: &str = "octojules.db";
const DEFAULT_IDLE_SECS: u64 = 300;
const DEFAULT_POLL_SECS: u64 = 60;

/// CLI-level overrides applied on top of the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub repo: Option<String>,
    pub label: Option<String>,
    pub db: Option<PathBuf>,
    pub manual: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Target repository as "owner/repo".
    pub target_repo: String,
    pub issue_label: String,
    pub github_token: String,
    pub jules_api_key: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub merge_policy: MergePolicy,
    pub poll_interval: Duration,
    pub idle_interval: Duration,
    pub db_path: PathBuf,
}

/// The issue-tracker half of the config, for commands that never touch
/// the agent.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub target_repo: String,
    pub github_token: String,
    pub issue_label: String,
}

impl TrackerConfig {
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        Ok(Self {
            target_repo: target_repo_from(overrides)?,
            github_token: env_var("GITHUB_TOKEN").ok_or(ConfigError::MissingGithubToken)?,
            issue_label: issue_label_from(overrides),
        })
    }
}

impl Config {
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        let target_repo = target_repo_from(overrides)?;

        let merge_policy = if overrides.manual || env_flag("MANUAL_MODE") {
            MergePolicy::Manual
        } else {
            MergePolicy::Auto
        };

        Ok(Self {
            target_repo,
            issue_label: issue_label_from(overrides),
            github_token: env_var("GITHUB_TOKEN").ok_or(ConfigError::MissingGithubToken)?,
            jules_api_key: env_var("JULES_API_KEY").ok_or(ConfigError::MissingJulesApiKey)?,
            telegram_bot_token: env_var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_var("TELEGRAM_CHAT_ID"),
            merge_policy,
            poll_interval: interval_from_env("POLL_INTERVAL", DEFAULT_POLL_SECS)?,
            idle_interval: interval_from_env("SLEEP_INTERVAL", DEFAULT_IDLE_SECS)?,
            db_path: resolve_db_path(overrides.db.clone()),
        })
    }
}

fn target_repo_from(overrides: &Overrides) -> Result<String, ConfigError> {
    let target_repo = overrides
        .repo
        .clone()
        .or_else(|| env_var("TARGET_REPO"))
        .ok_or(ConfigError::MissingTargetRepo)?;
    if target_repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
        return Err(ConfigError::InvalidTargetRepo(target_repo));
    }
    Ok(target_repo)
}

fn issue_label_from(overrides: &Overrides) -> String {
    overrides
        .label
        .clone()
        .or_else(|| env_var("ISSUE_LABEL"))
        .unwrap_or_else(|| DEFAULT_ISSUE_LABEL.to_string())
}

/// Database location for commands that do not need the full config.
pub fn resolve_db_path(cli_override: Option<PathBuf>) -> PathBuf {
    cli_override
        .or_else(|| env_var("OCTOJULES_DB").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> bool {
    env_var(name)
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn interval_from_env(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match env_var(name) {
        None => Ok(Duration::from_secs(default_secs)),
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidInterval { name, value: raw }),
    }
}
