//! The transformation catalog.
//!
//! Each [`Transformation`] names the directory it expects under the project
//! root, an ordered list of target files with the rule set applied to each,
//! and any manifest files to create when absent. Target lists are fixed here
//! and handed to the runner as plain values.

mod handlers;
mod repairs;

use crate::error::Result;
use crate::rule::RuleSet;
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Handler modules touched by the convention rewrites, in processing order.
pub const HANDLER_FILES: [&str; 6] = ["user", "vulnerability", "team", "asset", "report", "plugin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformationKind {
    /// Separate pool/auth parameters to a single `State<AppState>`.
    FixHandlers,
    /// `State<AppState>` back to separate `Extension` parameters.
    RevertHandlers,
    /// One-shot repairs left over after the handler migration.
    FinalFix,
    /// sqlx type derives on model enums and nullable `COUNT` bindings.
    SqlxTypeFix,
}

impl TransformationKind {
    pub const ALL: [Self; 4] = [
        Self::FixHandlers,
        Self::RevertHandlers,
        Self::FinalFix,
        Self::SqlxTypeFix,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FixHandlers => "fix-handlers",
            Self::RevertHandlers => "revert-handlers",
            Self::FinalFix => "final-fix",
            Self::SqlxTypeFix => "sqlx-type-fix",
        }
    }
}

impl fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file to rewrite, relative to the project root.
#[derive(Debug, Clone)]
pub struct Target {
    pub path: PathBuf,
    pub rules: RuleSet,
}

impl Target {
    pub fn new(path: impl Into<PathBuf>, rules: RuleSet) -> Self {
        Self {
            path: path.into(),
            rules,
        }
    }
}

/// A file created with a fixed body when it does not exist yet.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Transformation {
    pub kind: TransformationKind,
    /// Must exist under the root before any file is touched.
    pub required_dir: PathBuf,
    pub targets: Vec<Target>,
    pub manifests: Vec<Manifest>,
}

impl Transformation {
    /// Distinct rule sets in first-use order.
    pub fn rule_sets(&self) -> Vec<&RuleSet> {
        let mut sets: Vec<&RuleSet> = Vec::new();
        for target in &self.targets {
            if !sets.iter().any(|s| s.name() == target.rules.name()) {
                sets.push(&target.rules);
            }
        }
        sets
    }
}

/// Builds the named transformation.
pub fn transformation(kind: TransformationKind) -> Result<Transformation> {
    match kind {
        TransformationKind::FixHandlers => handlers::fix_transformation(),
        TransformationKind::RevertHandlers => handlers::revert_transformation(),
        TransformationKind::FinalFix => repairs::final_fix_transformation(),
        TransformationKind::SqlxTypeFix => repairs::sqlx_type_transformation(),
    }
}

pub(crate) fn handler_path(module: &str) -> PathBuf {
    PathBuf::from("src/handlers").join(format!("{}.rs", module))
}
