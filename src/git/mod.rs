//! Thin wrappers around the `git` and hosting-provider CLIs, plus the
//! working-tree status query (read through libgit2).

use std::path::Path;
use std::process::Stdio;

use git2::{Repository, Status, StatusOptions};
use tokio::process::Command;

/// Exit status and captured output of one CLI call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stderr if present, otherwise stdout; git reports some failures on stdout.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program args...` in `dir`, capturing output. Only spawn failures are
/// errors; a non-zero exit is reported through [`CommandOutput`].
pub async fn run_command(
    program: &str,
    args: &[&str],
    dir: &Path,
    envs: &[(&str, &str)],
) -> std::io::Result<CommandOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .envs(envs.iter().copied())
        // Never block on a credential prompt.
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

pub async fn git(dir: &Path, args: &[&str]) -> std::io::Result<CommandOutput> {
    run_command("git", args, dir, &[]).await
}

/// One working-tree entry in porcelain v1 form (`XY path`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: String,
    pub path: String,
}

impl std::fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.path)
    }
}

/// Working-tree status of the repository at `repo_path`, untracked files
/// included and ignored files excluded.
pub fn working_tree_status(repo_path: &Path) -> Result<Vec<StatusEntry>, git2::Error> {
    let repo = Repository::open(repo_path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut entries: Vec<StatusEntry> = statuses
        .iter()
        .filter_map(|entry| {
            let code = porcelain_code(entry.status())?;
            let path = entry.path()?.to_string();
            Some(StatusEntry { code, path })
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Two-letter porcelain code for a libgit2 status. `None` for clean or ignored.
fn porcelain_code(status: Status) -> Option<String> {
    if status.is_empty() || status.contains(Status::IGNORED) {
        return None;
    }
    if status.contains(Status::CONFLICTED) {
        return Some("UU".to_string());
    }
    if status == Status::WT_NEW {
        return Some("??".to_string());
    }

    let index = if status.contains(Status::INDEX_NEW) {
        'A'
    } else if status.contains(Status::INDEX_MODIFIED) {
        'M'
    } else if status.contains(Status::INDEX_DELETED) {
        'D'
    } else if status.contains(Status::INDEX_RENAMED) {
        'R'
    } else if status.contains(Status::INDEX_TYPECHANGE) {
        'T'
    } else {
        ' '
    };
    let worktree = if status.contains(Status::WT_MODIFIED) {
        'M'
    } else if status.contains(Status::WT_DELETED) {
        'D'
    } else if status.contains(Status::WT_RENAMED) {
        'R'
    } else if status.contains(Status::WT_TYPECHANGE) {
        'T'
    } else if status.contains(Status::WT_NEW) {
        '?'
    } else {
        ' '
    };
    Some(format!("{}{}", index, worktree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;

    fn init_repo_with_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        fs::write(dir.join("tracked.txt"), "one\n").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("tracked.txt")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = Signature::now("test", "test@localhost").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_porcelain_codes() {
        assert_eq!(porcelain_code(Status::CURRENT), None);
        assert_eq!(porcelain_code(Status::IGNORED), None);
        assert_eq!(porcelain_code(Status::WT_NEW).as_deref(), Some("??"));
        assert_eq!(porcelain_code(Status::WT_MODIFIED).as_deref(), Some(" M"));
        assert_eq!(porcelain_code(Status::INDEX_NEW).as_deref(), Some("A "));
        assert_eq!(
            porcelain_code(Status::INDEX_MODIFIED | Status::WT_MODIFIED).as_deref(),
            Some("MM")
        );
        assert_eq!(porcelain_code(Status::WT_DELETED).as_deref(), Some(" D"));
    }

    #[test]
    fn test_working_tree_status_clean_repo_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        assert!(working_tree_status(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_working_tree_status_reports_new_and_modified() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        fs::write(dir.path().join("tracked.txt"), "two\n").unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/new.md"), "# new\n").unwrap();

        let entries = working_tree_status(dir.path()).unwrap();
        let rendered: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        assert_eq!(rendered, vec!["?? docs/new.md", " M tracked.txt"]);
    }

    #[test]
    fn test_command_output_error_text_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "nothing to commit\n".into(),
            stderr: String::new(),
        };
        assert!(!out.success());
        assert_eq!(out.error_text(), "nothing to commit");

        let out = CommandOutput {
            code: Some(128),
            stdout: "x".into(),
            stderr: "fatal: bad\n".into(),
        };
        assert_eq!(out.error_text(), "fatal: bad");
    }

    #[tokio::test]
    async fn test_run_command_captures_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = git(dir.path(), &["status"]).await.unwrap();
        // Not a repository.
        assert!(!out.success());
        assert!(!out.stderr.is_empty());
    }
}
