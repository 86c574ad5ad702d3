//! Turns the agent's filesystem side effects into a commit.
//!
//! Every session leaves at least one new commit: a content commit when the
//! working tree changed, otherwise an empty marker commit documenting the
//! session. Commit failures are reported and absorbed.

use std::path::{Path, PathBuf};

use crate::git::{self, StatusEntry};
use crate::reporter::{EventKind, SessionReporter};
use crate::session::SessionOutcome;

/// Working-tree entries observed at reconciliation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub entries: Vec<StatusEntry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Porcelain-style listing, one `XY path` per line.
    pub fn listing(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Changes were staged and committed.
    Committed,
    /// Changes existed but the commit failed; publishing continues anyway.
    CommitFailed { error: String },
    /// Nothing changed; an empty marker commit was recorded.
    Marker,
    MarkerFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub changes: ChangeSet,
    pub outcome: CommitOutcome,
}

pub fn commit_message(
    prompt: &str,
    session_id: &str,
    session: &SessionOutcome,
    changes: &ChangeSet,
) -> String {
    format!(
        "Implement: {prompt}\n\
         \n\
         Implemented by an autonomous coding agent\n\
         Session: {session_id}\n\
         Messages: {messages}\n\
         Cost: ${cost:.4}\n\
         \n\
         Changes:\n\
         {listing}\n\
         \n\
         Summary: {summary}",
        messages = session.aggregate.message_count(),
        cost = session.aggregate.total_cost_usd,
        listing = changes.listing(),
        summary = session.summary,
    )
}

pub fn marker_message(prompt: &str, session_id: &str, session: &SessionOutcome) -> String {
    format!(
        "Agent session: {prompt}\n\
         \n\
         Session: {session_id}\n\
         Messages: {messages}\n\
         Result: {summary}",
        messages = session.aggregate.message_count(),
        summary = session.summary,
    )
}

/// Inspect the working tree and commit whatever the agent left behind.
pub async fn reconcile(
    repo_path: &Path,
    prompt: &str,
    session: &SessionOutcome,
    reporter: &SessionReporter,
) -> Reconciliation {
    reporter.emit(EventKind::GitCheck, "Checking for changes...").await;
    let changes = working_tree_changes(repo_path).await;

    let outcome = if changes.is_empty() {
        reporter
            .emit(EventKind::NoChanges, "No changes detected from the agent")
            .await;
        let message = marker_message(prompt, reporter.session_id(), session);
        match run_git(repo_path, &["commit", "--allow-empty", "-m", &message]).await {
            Ok(()) => CommitOutcome::Marker,
            Err(error) => {
                reporter
                    .emit(
                        EventKind::GitCommitFailed,
                        format!("Marker commit failed: {}", error),
                    )
                    .await;
                CommitOutcome::MarkerFailed { error }
            }
        }
    } else {
        reporter
            .emit(
                EventKind::ChangesFound,
                format!("Found changes: {} files", changes.len()),
            )
            .await;
        let message = commit_message(prompt, reporter.session_id(), session, &changes);
        let committed = match run_git(repo_path, &["add", "-A"]).await {
            Ok(()) => run_git(repo_path, &["commit", "-m", &message]).await,
            Err(e) => Err(e),
        };
        match committed {
            Ok(()) => {
                reporter
                    .emit(EventKind::GitCommitted, "Successfully committed changes")
                    .await;
                CommitOutcome::Committed
            }
            Err(error) => {
                reporter
                    .emit(EventKind::GitCommitFailed, format!("Commit failed: {}", error))
                    .await;
                CommitOutcome::CommitFailed { error }
            }
        }
    };

    Reconciliation { changes, outcome }
}

async fn run_git(repo_path: &Path, args: &[&str]) -> Result<(), String> {
    match git::git(repo_path, args).await {
        Ok(out) if out.success() => Ok(()),
        Ok(out) => Err(out.error_text()),
        Err(e) => Err(e.to_string()),
    }
}

/// Status through libgit2, falling back to `git status --porcelain` if the
/// repository can't be opened that way.
async fn working_tree_changes(repo_path: &Path) -> ChangeSet {
    let path: PathBuf = repo_path.to_path_buf();
    let status = tokio::task::spawn_blocking(move || git::working_tree_status(&path)).await;
    match status {
        Ok(Ok(entries)) => return ChangeSet { entries },
        Ok(Err(e)) => tracing::warn!("libgit2 status failed, using git CLI: {}", e),
        Err(e) => tracing::warn!("status task failed, using git CLI: {}", e),
    }

    match git::git(repo_path, &["status", "--porcelain"]).await {
        Ok(out) if out.success() => ChangeSet {
            entries: parse_porcelain(&out.stdout),
        },
        Ok(out) => {
            tracing::warn!("git status failed: {}", out.error_text());
            ChangeSet::default()
        }
        Err(e) => {
            tracing::warn!("git status failed: {}", e);
            ChangeSet::default()
        }
    }
}

fn parse_porcelain(stdout: &str) -> Vec<StatusEntry> {
    stdout
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| StatusEntry {
            code: line[..2].to_string(),
            path: line[3..].to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionAggregate;

    fn outcome(cost: f64, summary: &str) -> SessionOutcome {
        SessionOutcome {
            aggregate: SessionAggregate {
                total_cost_usd: cost,
                ..Default::default()
            },
            summary: summary.to_string(),
            error: None,
        }
    }

    fn changes() -> ChangeSet {
        ChangeSet {
            entries: vec![
                StatusEntry {
                    code: "??".into(),
                    path: "README.md".into(),
                },
                StatusEntry {
                    code: " M".into(),
                    path: "src/lib.rs".into(),
                },
            ],
        }
    }

    #[test]
    fn test_commit_message_embeds_session_details() {
        let msg = commit_message("Add a README", "sess-1", &outcome(0.5, "Wrote it"), &changes());
        assert!(msg.starts_with("Implement: Add a README\n"));
        assert!(msg.contains("Session: sess-1"));
        assert!(msg.contains("Messages: 0"));
        assert!(msg.contains("Cost: $0.5000"));
        assert!(msg.contains("Changes:\n?? README.md\n M src/lib.rs"));
        assert!(msg.ends_with("Summary: Wrote it"));
    }

    #[test]
    fn test_marker_message() {
        let msg = marker_message("Do nothing", "sess-2", &outcome(0.0, "Nothing to do"));
        assert!(msg.starts_with("Agent session: Do nothing\n"));
        assert!(msg.contains("Session: sess-2"));
        assert!(msg.ends_with("Result: Nothing to do"));
    }

    #[test]
    fn test_change_set_listing() {
        let set = changes();
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
        assert_eq!(set.listing(), "?? README.md\n M src/lib.rs");
        assert!(ChangeSet::default().is_empty());
    }

    #[test]
    fn test_parse_porcelain() {
        let entries = parse_porcelain("?? new.txt\n M src/main.rs\nA  added.rs\n");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].code, "??");
        assert_eq!(entries[0].path, "new.txt");
        assert_eq!(entries[1].code, " M");
        assert_eq!(entries[1].path, "src/main.rs");
        assert_eq!(entries[2].code, "A ");
    }
}
