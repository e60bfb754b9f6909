//! Error types for the rewriting engine.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The directory a transformation expects under the root does not exist.
    #[error(
        "directory {} not found; run from the project root directory",
        .0.display()
    )]
    MissingRoot(PathBuf),

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern")]
    Pattern(#[from] regex::Error),

    /// An insertion rule was declared without a precondition.
    #[error("rule `{0}` inserts text but has no precondition")]
    UnguardedInsert(String),

    #[error("rule `{rule}` must run after `{after}`")]
    RuleOrder { rule: String, after: String },
}
