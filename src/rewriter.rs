//! File rewriting.
//!
//! Reads a file fully, runs a [`RuleSet`] over the text in memory, and writes
//! the result back in place only when it differs from what was read. No backup
//! is kept: rerunning a transformation is the recovery path, since rewritten
//! content no longer satisfies the rules' preconditions.

use crate::error::{Error, Result};
use crate::rule::RuleSet;
use diffy::PatchFormatter;
use std::path::Path;

/// A pending rewrite of one file.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub original: String,
    pub updated: String,
    /// Rules that changed the content, in application order.
    pub fired: Vec<String>,
}

impl Rewrite {
    pub fn changed(&self) -> bool {
        self.original != self.updated
    }

    /// Unified diff of the pending change, headed with `label`.
    pub fn diff(&self, label: &str) -> String {
        let patch = diffy::create_patch(&self.original, &self.updated);
        let mut out = format!("--- a/{0}\n+++ b/{0}\n", label);
        let body = PatchFormatter::new().fmt_patch(&patch).to_string();
        // diffy emits its own `---`/`+++` header lines; keep ours.
        for line in body.lines().skip_while(|l| l.starts_with("---") || l.starts_with("+++")) {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Reads `path` and applies `rules` without touching the file.
pub fn plan(path: &Path, rules: &RuleSet) -> Result<Rewrite> {
    let original = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let applied = rules.apply(&original);
    Ok(Rewrite {
        original,
        updated: applied.content,
        fired: applied.fired,
    })
}

/// Writes a planned rewrite back to `path` if it changes the content.
///
/// Returns whether a write happened.
pub fn commit(path: &Path, rewrite: &Rewrite) -> Result<bool> {
    if !rewrite.changed() {
        return Ok(false);
    }
    std::fs::write(path, &rewrite.updated).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Plans and commits in one step.
pub fn rewrite_file(path: &Path, rules: &RuleSet) -> Result<Rewrite> {
    let rewrite = plan(path, rules)?;
    commit(path, &rewrite)?;
    Ok(rewrite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Guard, Matcher, Rule};

    fn pool_rules() -> RuleSet {
        RuleSet::new(
            "test",
            vec![
                Rule::replace("deref", Matcher::regex(r"&\*\*pool\b").unwrap(), "&*pool"),
                Rule::insert_after(
                    "import",
                    Matcher::regex(r"use axum::[^;]+;[ \t]*\n").unwrap(),
                    "use sqlx::PgPool;\n",
                )
                .when(Guard::lacks("use sqlx::PgPool;")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rewrites_changed_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.rs");
        std::fs::write(&path, "use axum::Json;\nfn f() { q(&**pool) }\n").unwrap();

        let rewrite = rewrite_file(&path, &pool_rules()).unwrap();

        assert!(rewrite.changed());
        assert_eq!(rewrite.fired, vec!["deref", "import"]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "use axum::Json;\nuse sqlx::PgPool;\nfn f() { q(&*pool) }\n"
        );
    }

    #[test]
    fn second_pass_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.rs");
        std::fs::write(&path, "use axum::Json;\nfn f() { q(&**pool) }\n").unwrap();

        rewrite_file(&path, &pool_rules()).unwrap();
        let second = rewrite_file(&path, &pool_rules()).unwrap();

        assert!(!second.changed());
        assert!(second.fired.is_empty());
    }

    #[test]
    fn unchanged_file_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.rs");
        std::fs::write(&path, "fn main() {}\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        // A write attempt on a read-only file would surface as an error.
        let rewrite = rewrite_file(&path, &pool_rules()).unwrap();
        assert!(!rewrite.changed());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn main() {}\n");
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&dir.path().join("absent.rs"), &pool_rules()).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn diff_shows_changed_lines() {
        let rewrite = Rewrite {
            original: "a\nb\n".to_string(),
            updated: "a\nc\n".to_string(),
            fired: vec![],
        };
        let diff = rewrite.diff("src/x.rs");
        assert!(diff.starts_with("--- a/src/x.rs\n+++ b/src/x.rs\n"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+c\n"));
    }
}
