//! handler-migrate library: ordered text rules for rewriting handler source files.
//!
//! The engine has three layers:
//!
//! 1. **Rules**: a [`rule::Rule`] pairs a matcher with a replacement or an
//!    anchored insertion, gated by a precondition; a [`rule::RuleSet`] runs
//!    rules in declared order.
//! 2. **Rewriting**: [`rewriter`] reads a file, applies a rule set in memory
//!    and writes back only when the content changed.
//! 3. **Running**: [`runner::run`] applies a [`catalog::Transformation`] to a
//!    project tree and reports per-file outcomes.
//!
//! # Example
//!
//! ```no_run
//! use handler_migrate::catalog::{self, TransformationKind};
//! use handler_migrate::runner::{self, RunOptions};
//! use std::path::Path;
//!
//! let transformation = catalog::transformation(TransformationKind::FixHandlers).unwrap();
//! let options = RunOptions { dry_run: true };
//! let summary = runner::run(Path::new("."), &transformation, &options, |_, _| {
//!     Ok::<_, handler_migrate::Error>(true)
//! })
//! .unwrap();
//!
//! println!("{} files would change", summary.changed);
//! ```

pub mod catalog;
pub mod error;
pub mod rewriter;
pub mod rule;
pub mod runner;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use rule::{Guard, Matcher, Rule, RuleSet};
pub use runner::{FileStatus, RewriteResult, RunOptions, RunSummary};
