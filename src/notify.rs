//! Human notifications over Telegram.
//!
//! Delivery is strictly best-effort. A failed or unconfigured notifier is
//! logged and ignored so automation never stalls on messaging.

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, warn};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// One-way delivery of status messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            warn!("telegram not configured; notification skipped");
            return;
        };
        let url = format!("{TELEGRAM_API_BASE}/bot{token}/sendMessage");
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => error!(status = %resp.status(), "telegram rejected notification"),
            Err(err) => error!("failed to send telegram notification: {err}"),
        }
    }
}

pub fn session_started(issue_number: i64, issue_title: &str) -> String {
    format!(
        "🚀 *Session Started*\n\nIssue #{issue_number}: {issue_title}\nJules is now working on this."
    )
}

pub fn pr_created(issue_number: i64, pr_url: &str) -> String {
    format!("📦 *PR Created*\n\nIssue #{issue_number}\n{pr_url}")
}

pub fn ready_for_review(issue_number: i64, pr_url: &str) -> String {
    format!(
        "👀 *Ready for Review*\n\nIssue #{issue_number} has an open PR awaiting manual review.\n{pr_url}"
    )
}

pub fn merged(issue_number: i64, pr_number: i64) -> String {
    format!("✅ *Merged*\n\nIssue #{issue_number} was resolved by PR #{pr_number}.")
}

pub fn session_failed(issue_number: i64, session_id: &str) -> String {
    format!(
        "❌ *Session Failed*\n\nIssue #{issue_number} (session {session_id}) could not be completed.\nOrchestrator has been PAUSED. Resume it once the cause is understood."
    )
}
