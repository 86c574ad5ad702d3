//! Pushes the work branch and opens a pull request for it.

use std::path::Path;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::errors::PipelineError;
use crate::git;
use crate::github;
use crate::reconcile::ChangeSet;
use crate::reporter::{EventKind, SessionReporter};
use crate::session::SessionOutcome;
use crate::stream::truncate_chars;

/// Longest pull request title, in characters.
pub const MAX_TITLE_CHARS: usize = 72;

const TITLE_PREFIX: &str = "Agent: ";
const NO_CHANGES_LISTING: &str = "No file changes detected";

/// `Agent: <prompt>` cut to [`MAX_TITLE_CHARS`], first line of the prompt only.
pub fn pr_title(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    let title = format!("{}{}", TITLE_PREFIX, first_line);
    if title.chars().count() <= MAX_TITLE_CHARS {
        title
    } else {
        let cut = truncate_chars(&title, MAX_TITLE_CHARS - 3);
        format!("{}...", cut.trim_end())
    }
}

pub fn pr_body(
    prompt: &str,
    session_id: &str,
    branch: &str,
    session: &SessionOutcome,
    changes: &ChangeSet,
) -> String {
    let listing = if changes.is_empty() {
        NO_CHANGES_LISTING.to_string()
    } else {
        changes.listing()
    };
    format!(
        "## Summary\n\n\
         **Task**: {prompt}\n\n\
         **Implementation Summary**:\n{summary}\n\n\
         **Details**:\n\
         - **Session ID**: {session_id}\n\
         - **Branch**: {branch}\n\
         - **Messages Processed**: {messages}\n\
         - **Turns**: {turns}\n\
         - **Total Cost**: ${cost:.4} USD\n\n\
         **Files Changed**:\n\
         ```\n{listing}\n```\n\n\
         ---\n\
         *Created by backspace*",
        summary = session.summary,
        messages = session.aggregate.message_count(),
        turns = session.aggregate.num_turns,
        cost = session.aggregate.total_cost_usd,
    )
}

/// What the pull request is opened for.
pub struct PublishRequest<'a> {
    pub repo_url: &'a str,
    pub branch: &'a str,
    pub base: &'a str,
    pub prompt: &'a str,
    pub session: &'a SessionOutcome,
    pub changes: &'a ChangeSet,
}

/// Push `request.branch` to `origin`, then open a PR with the hosting CLI.
/// Returns the PR URL printed by the CLI.
pub async fn publish(
    repo_path: &Path,
    request: &PublishRequest<'_>,
    config: &Config,
    reporter: &SessionReporter,
) -> Result<String, PipelineError> {
    reporter.emit(EventKind::PrStart, "Creating pull request...").await;
    let token = config.credentials.source_control_token.expose_secret();

    let push = git::git(repo_path, &["push", "-u", "origin", request.branch])
        .await
        .map_err(|e| PipelineError::PushFailed {
            stderr: e.to_string(),
        })?;
    if !push.success() {
        return Err(PipelineError::PushFailed {
            stderr: push.error_text().replace(token, "***"),
        });
    }
    reporter
        .emit(
            EventKind::PushSuccess,
            format!("Successfully pushed branch: {}", request.branch),
        )
        .await;

    let title = pr_title(request.prompt);
    let body = pr_body(
        request.prompt,
        reporter.session_id(),
        request.branch,
        request.session,
        request.changes,
    );
    let slug = github::parse_owner_repo_from_url(request.repo_url);
    let mut args = vec![
        "pr",
        "create",
        "--title",
        title.as_str(),
        "--body",
        body.as_str(),
        "--base",
        request.base,
        "--head",
        request.branch,
    ];
    if let Some(slug) = slug.as_deref() {
        args.extend(["--repo", slug]);
    }

    let gh = &config.settings.git.gh_command;
    tracing::debug!(gh = %gh, base = request.base, head = request.branch, "opening pull request");
    let output = git::run_command(gh, &args, repo_path, &[("GH_TOKEN", token)])
        .await
        .map_err(|e| PipelineError::PullRequestFailed {
            stderr: format!("failed to run {}: {}", gh, e),
        })?;
    if !output.success() {
        return Err(PipelineError::PullRequestFailed {
            stderr: output.error_text(),
        });
    }

    // gh prints progress lines before the URL on some versions.
    let pr_url = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or_default()
        .to_string();
    Ok(pr_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::StatusEntry;
    use crate::session::SessionAggregate;

    fn outcome() -> SessionOutcome {
        SessionOutcome {
            aggregate: SessionAggregate {
                total_cost_usd: 1.23,
                num_turns: 4,
                ..Default::default()
            },
            summary: "Added the file".into(),
            error: None,
        }
    }

    #[test]
    fn test_pr_title_short_prompt() {
        assert_eq!(pr_title("Add a README"), "Agent: Add a README");
    }

    #[test]
    fn test_pr_title_truncated_to_limit() {
        let title = pr_title(&"word ".repeat(40));
        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert!(title.starts_with("Agent: word"));
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_pr_title_uses_first_line() {
        assert_eq!(pr_title("Fix bug\n\nwith details"), "Agent: Fix bug");
    }

    #[test]
    fn test_pr_body_lists_details() {
        let changes = ChangeSet {
            entries: vec![StatusEntry {
                code: "??".into(),
                path: "README.md".into(),
            }],
        };
        let body = pr_body("Add a README", "sess-9", "agent/add-a-readme", &outcome(), &changes);
        assert!(body.contains("**Task**: Add a README"));
        assert!(body.contains("Added the file"));
        assert!(body.contains("**Session ID**: sess-9"));
        assert!(body.contains("**Branch**: agent/add-a-readme"));
        assert!(body.contains("**Messages Processed**: 0"));
        assert!(body.contains("$1.2300 USD"));
        assert!(body.contains("?? README.md"));
    }

    #[test]
    fn test_pr_body_without_changes() {
        let body = pr_body("Noop", "s", "agent/noop", &outcome(), &ChangeSet::default());
        assert!(body.contains(NO_CHANGES_LISTING));
    }
}
