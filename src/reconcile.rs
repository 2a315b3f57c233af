//! PR reconciliation: decide which open pull request belongs to a session.
//!
//! The agent opens PRs on its own schedule with no hard link back to the
//! session, so attribution works through an ordered table of match rules.
//! Rules run rule-major: every PR is tried against the strongest rule
//! before any PR is tried against a weaker one, so listing order never
//! beats signal strength. All comparisons are case-insensitive.

use crate::models::PullRequest;

/// Branch substring identifying PRs opened by the agent.
pub const AGENT_BRANCH_TAG: &str = "jules";

/// Everything a rule may match against.
pub struct MatchContext<'a> {
    pub issue_number: i64,
    pub session_id: Option<&'a str>,
}

struct MatchRule {
    name: &'static str,
    matches: fn(&MatchContext<'_>, &PullRequest) -> bool,
}

fn session_id_in_branch(ctx: &MatchContext<'_>, pr: &PullRequest) -> bool {
    ctx.session_id.is_some_and(|sid| {
        !sid.is_empty() && pr.head_branch.to_lowercase().contains(&sid.to_lowercase())
    })
}

fn issue_ref_in_title(ctx: &MatchContext<'_>, pr: &PullRequest) -> bool {
    pr.title
        .to_lowercase()
        .contains(&format!("#{}", ctx.issue_number))
}

fn issue_ref_in_branch(ctx: &MatchContext<'_>, pr: &PullRequest) -> bool {
    pr.head_branch
        .to_lowercase()
        .contains(&format!("issue-{}", ctx.issue_number))
}

fn agent_tag_in_branch(_ctx: &MatchContext<'_>, pr: &PullRequest) -> bool {
    pr.head_branch.to_lowercase().contains(AGENT_BRANCH_TAG)
}

/// Strongest signal first.
const MATCH_RULES: &[MatchRule] = &[
    MatchRule {
        name: "session-id-in-branch",
        matches: session_id_in_branch,
    },
    MatchRule {
        name: "issue-ref-in-title",
        matches: issue_ref_in_title,
    },
    MatchRule {
        name: "issue-ref-in-branch",
        matches: issue_ref_in_branch,
    },
    MatchRule {
        name: "agent-tag-in-branch",
        matches: agent_tag_in_branch,
    },
];

/// Pick the PR attributed to the session, together with the name of the
/// rule that matched it (for the log line).
pub fn find_pull_request<'a>(
    prs: &'a [PullRequest],
    ctx: &MatchContext<'_>,
) -> Option<(&'a PullRequest, &'static str)> {
    for rule in MATCH_RULES {
        if let Some(pr) = prs.iter().find(|pr| (rule.matches)(ctx, pr)) {
            return Some((pr, rule.name));
        }
    }
    None
}
