//! Work-branch naming and creation.

use std::path::Path;

use crate::git;
use crate::reporter::{EventKind, SessionReporter};

/// Maximum length of the prompt-derived part of a branch name, in characters.
pub const MAX_SLUG_CHARS: usize = 50;

const EMPTY_SLUG: &str = "task";

/// Characters git rejects anywhere in a ref name, beyond `.` and `/` which are
/// always stripped.
const GIT_FORBIDDEN: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Derive the prompt-based part of a branch name.
///
/// Lowercase, each whitespace character becomes `-`, periods, slashes and
/// characters git forbids are dropped, then truncated to [`MAX_SLUG_CHARS`].
pub fn slugify_prompt(prompt: &str) -> String {
    let slug: String = prompt
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('-')
            } else if c == '.' || c == '/' || c.is_control() || GIT_FORBIDDEN.contains(&c) {
                None
            } else {
                Some(c)
            }
        })
        .take(MAX_SLUG_CHARS)
        .collect();

    // "@{" is also reserved; dropping the brace is enough.
    let slug = slug.replace("@{", "@");
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// Full branch name for a session. Identical prompts give identical names unless
/// `session_suffix` is set.
pub fn derive_branch_name(prefix: &str, prompt: &str, session_suffix: Option<&str>) -> String {
    let slug = slugify_prompt(prompt);
    match session_suffix {
        Some(id) => format!("{}{}-{}", prefix, slug, slugify_prompt(id)),
        None => format!("{}{}", prefix, slug),
    }
}

/// Create and check out `branch_name`. Failure leaves the workspace on its
/// current branch; the pipeline continues there.
pub async fn create_branch(repo_path: &Path, branch_name: &str, reporter: &SessionReporter) -> bool {
    let failure = match git::git(repo_path, &["checkout", "-b", branch_name]).await {
        Ok(out) if out.success() => None,
        Ok(out) => Some(out.error_text()),
        Err(e) => Some(e.to_string()),
    };

    match failure {
        None => {
            reporter
                .emit(EventKind::BranchCreated, format!("Created branch: {}", branch_name))
                .await;
            true
        }
        Some(err) => {
            reporter
                .emit(
                    EventKind::BranchFailed,
                    format!(
                        "Failed to create branch {}: {}. Continuing on the current branch.",
                        branch_name, err
                    ),
                )
                .await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_safe(slug: &str) {
        assert!(slug.chars().count() <= MAX_SLUG_CHARS, "too long: {}", slug);
        assert!(!slug.chars().any(char::is_whitespace), "whitespace in {}", slug);
        assert!(!slug.contains('.'), "period in {}", slug);
        assert!(!slug.contains('/'), "slash in {}", slug);
    }

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify_prompt("Add a README file."), "add-a-readme-file");
    }

    #[test]
    fn test_slugify_strips_slashes_and_periods() {
        assert_eq!(slugify_prompt("Fix src/main.rs"), "fix-srcmainrs");
    }

    #[test]
    fn test_slugify_all_whitespace_kinds() {
        assert_eq!(slugify_prompt("a\tb\nc d"), "a-b-c-d");
    }

    #[test]
    fn test_slugify_truncates_to_fifty_chars() {
        let prompt = "Implement a really long feature description that keeps going and going";
        let slug = slugify_prompt(prompt);
        assert_eq!(slug.chars().count(), MAX_SLUG_CHARS);
        assert!(prompt.to_lowercase().replace(' ', "-").starts_with(&slug));
    }

    #[test]
    fn test_slugify_multibyte_truncation_is_char_based() {
        let slug = slugify_prompt(&"é".repeat(80));
        assert_eq!(slug.chars().count(), MAX_SLUG_CHARS);
    }

    #[test]
    fn test_slugify_drops_git_forbidden_chars() {
        assert_eq!(slugify_prompt("what? fix: a*b [x] ~y ^z"), "what-fix-ab-x]-y-z");
        assert_eq!(slugify_prompt("at@{now}"), "at@now}");
    }

    #[test]
    fn test_slugify_empty_prompt() {
        assert_eq!(slugify_prompt(""), "task");
        assert_eq!(slugify_prompt("./."), "task");
    }

    #[test]
    fn test_slugify_is_deterministic_and_safe() {
        let prompts = [
            "Add a README",
            "Refactor   the  parser.\tNow/please",
            "ünïcödé prompt with spaces.and.dots",
            "   leading and trailing   ",
            "x",
        ];
        for p in prompts {
            let a = slugify_prompt(p);
            let b = slugify_prompt(p);
            assert_eq!(a, b);
            assert_safe(&a);
        }
    }

    #[test]
    fn test_derive_branch_name() {
        assert_eq!(
            derive_branch_name("agent/", "Add a README", None),
            "agent/add-a-readme"
        );
        assert_eq!(
            derive_branch_name("agent/", "Add a README", Some("Sess.42")),
            "agent/add-a-readme-sess42"
        );
    }
}
