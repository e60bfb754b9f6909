//! Batch execution of a transformation against a project root.
//!
//! Targets are processed strictly in catalog order. A target that does not
//! exist is recorded and skipped; any other I/O failure ends the run.

use crate::catalog::Transformation;
use crate::error::Error;
use crate::rewriter::{self, Rewrite};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Plan every rewrite but write nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Changed,
    Unchanged,
    Missing,
    /// The change was planned but refused at the confirmation prompt.
    Declined,
}

/// Outcome for one target file.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteResult {
    /// Relative to the run root.
    pub path: PathBuf,
    pub status: FileStatus,
    /// Rules that fired, in order. Empty unless the content changed.
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub transformation: String,
    pub dry_run: bool,
    pub files: Vec<RewriteResult>,
    pub changed: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub declined: usize,
    /// Manifests written (or, in a dry run, that would be written).
    pub created: Vec<PathBuf>,
}

impl RunSummary {
    fn new(transformation: &Transformation, options: &RunOptions) -> Self {
        Self {
            transformation: transformation.kind.to_string(),
            dry_run: options.dry_run,
            files: Vec::new(),
            changed: 0,
            unchanged: 0,
            missing: 0,
            declined: 0,
            created: Vec::new(),
        }
    }

    fn record(&mut self, result: RewriteResult) {
        match result.status {
            FileStatus::Changed => self.changed += 1,
            FileStatus::Unchanged => self.unchanged += 1,
            FileStatus::Missing => self.missing += 1,
            FileStatus::Declined => self.declined += 1,
        }
        self.files.push(result);
    }
}

/// Runs `transformation` over the tree at `root`.
///
/// `approve` is consulted for every file whose content would change, with
/// the target path relative to `root`. Returning `false` leaves the file
/// untouched and records it as declined. Errors from `approve` end the run.
pub fn run<F, E>(
    root: &Path,
    transformation: &Transformation,
    options: &RunOptions,
    mut approve: F,
) -> std::result::Result<RunSummary, E>
where
    F: FnMut(&Path, &Rewrite) -> std::result::Result<bool, E>,
    E: From<Error>,
{
    let required = root.join(&transformation.required_dir);
    if !required.is_dir() {
        return Err(Error::MissingRoot(required).into());
    }

    let mut summary = RunSummary::new(transformation, options);

    for target in &transformation.targets {
        let path = root.join(&target.path);
        if !path.is_file() {
            summary.record(RewriteResult {
                path: target.path.clone(),
                status: FileStatus::Missing,
                rules: Vec::new(),
            });
            continue;
        }

        let rewrite = rewriter::plan(&path, &target.rules)?;
        let status = if !rewrite.changed() {
            FileStatus::Unchanged
        } else if !approve(&target.path, &rewrite)? {
            FileStatus::Declined
        } else {
            if !options.dry_run {
                rewriter::commit(&path, &rewrite)?;
            }
            FileStatus::Changed
        };

        summary.record(RewriteResult {
            path: target.path.clone(),
            status,
            rules: rewrite.fired,
        });
    }

    for manifest in &transformation.manifests {
        let path = root.join(&manifest.path);
        if path.exists() {
            continue;
        }
        if !options.dry_run {
            std::fs::write(&path, &manifest.body).map_err(|source| Error::Write {
                path: path.clone(),
                source,
            })?;
        }
        summary.created.push(manifest.path.clone());
    }

    Ok(summary)
}
