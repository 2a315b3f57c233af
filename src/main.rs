use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use octojules::clock::SystemClock;
use octojules::config::{self, Config, Overrides, TrackerConfig};
use octojules::github::{GitHubClient, IssueSource};
use octojules::jules::JulesClient;
use octojules::lifecycle::{LifecycleConfig, SessionLifecycle};
use octojules::notify::TelegramNotifier;
use octojules::scheduler::{LoopConfig, OrchestrationLoop};
use octojules::store::SessionStore;

#[derive(Parser)]
#[command(name = "octojules")]
#[command(version, about = "Autonomous backlog orchestrator for the Jules coding agent")]
struct Cli {
    /// Target repository as "owner/repo". Overrides TARGET_REPO.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Path to the session database. Overrides OCTOJULES_DB.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestration loop
    Run {
        /// Exit after one iteration (for external schedulers like cron)
        #[arg(long)]
        once: bool,

        /// Never merge automatically; notify and wait for human review
        #[arg(long)]
        manual: bool,

        /// Backlog label selecting eligible issues. Overrides ISSUE_LABEL.
        #[arg(long)]
        label: Option<String>,
    },
    /// File a new backlog issue for the agent to pick up
    Add {
        title: String,

        /// Issue body text
        #[arg(long, default_value = "")]
        body: String,

        /// Label to attach. Overrides ISSUE_LABEL.
        #[arg(long)]
        label: Option<String>,
    },
    /// Show the pause flag and recent sessions
    Status,
    /// Engage the safety brake: stop dispatching and polling
    Pause,
    /// Release the safety brake
    Resume,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { once, manual, label } => {
            let overrides = Overrides {
                repo: cli.repo,
                label,
                db: cli.db,
                manual,
            };
            run(&Config::from_env(&overrides)?, once).await
        }
        Commands::Add { title, body, label } => {
            let overrides = Overrides {
                repo: cli.repo,
                label,
                ..Default::default()
            };
            add(&TrackerConfig::from_env(&overrides)?, &title, &body).await
        }
        Commands::Status => status(cli.db),
        Commands::Pause => set_paused(cli.db, true),
        Commands::Resume => set_paused(cli.db, false),
    }
}

async fn run(cfg: &Config, once: bool) -> Result<()> {
    let store = SessionStore::open(&cfg.db_path)?;
    let mut lifecycle_cfg = LifecycleConfig::new(&cfg.target_repo, cfg.merge_policy);
    lifecycle_cfg.poll_interval = cfg.poll_interval;
    let lifecycle = SessionLifecycle::new(
        store,
        JulesClient::new(&cfg.jules_api_key),
        GitHubClient::new(&cfg.github_token, &cfg.target_repo),
        TelegramNotifier::new(cfg.telegram_bot_token.clone(), cfg.telegram_chat_id.clone()),
        SystemClock,
        lifecycle_cfg,
    );
    let mut loop_cfg = LoopConfig::new(&cfg.issue_label);
    loop_cfg.idle_interval = cfg.idle_interval;
    loop_cfg.run_once = once;
    OrchestrationLoop::new(lifecycle, loop_cfg).run().await
}

async fn add(cfg: &TrackerConfig, title: &str, body: &str) -> Result<()> {
    let tracker = GitHubClient::new(&cfg.github_token, &cfg.target_repo);
    let issue = tracker.create_issue(title, body, &cfg.issue_label).await?;
    println!(
        "filed issue #{} in {} with label {}",
        issue.number, cfg.target_repo, cfg.issue_label
    );
    Ok(())
}

fn status(db: Option<PathBuf>) -> Result<()> {
    let store = SessionStore::open(&config::resolve_db_path(db))?;
    let paused = store.is_paused()?;
    println!("paused: {paused}");
    let sessions = store.list_recent_sessions(10)?;
    if sessions.is_empty() {
        println!("no sessions recorded yet");
        return Ok(());
    }
    println!("recent sessions:");
    for s in sessions {
        let pr = s
            .pr_number
            .map(|n| format!("PR #{n}"))
            .unwrap_or_else(|| "no PR".to_string());
        println!(
            "  {}  issue #{}  {}  {}  {}",
            s.id, s.issue_number, s.state, pr, s.issue_title
        );
    }
    Ok(())
}

fn set_paused(db: Option<PathBuf>, paused: bool) -> Result<()> {
    let store = SessionStore::open(&config::resolve_db_path(db))?;
    store.set_paused(paused)?;
    println!(
        "orchestrator {}",
        if paused { "paused" } else { "resumed" }
    );
    Ok(())
}
