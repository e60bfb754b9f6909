//! Command-line interface definitions.
//!
//! Each rewriting subcommand selects one catalog transformation and shares
//! the same run flags; `rules` prints the catalog itself.

use clap::{Args, Parser, Subcommand};
use handler_migrate::catalog::TransformationKind;
use std::path::PathBuf;

/// Rewrite request handlers between dependency-passing conventions.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Move handlers from separate pool/auth parameters to `State<AppState>`.
    FixHandlers(RunArgs),

    /// Move handlers from `State<AppState>` back to separate `Extension` parameters.
    RevertHandlers(RunArgs),

    /// Apply the one-shot repairs left over after the handler migration.
    FinalFix(RunArgs),

    /// Derive `sqlx::Type` on model enums and default nullable counts to zero.
    SqlxTypeFix(RunArgs),

    /// Print the targets and rules of one or all transformations.
    Rules {
        /// Transformation to show. Shows all when omitted.
        name: Option<TransformationKind>,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Project root containing `src/`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print a unified diff for every changed file.
    #[arg(long)]
    pub diff: bool,

    /// Confirm each file's changes before writing.
    #[arg(short, long)]
    pub interactive: bool,

    /// Emit the run summary as JSON instead of status lines.
    #[arg(long, conflicts_with = "interactive")]
    pub json: bool,

    /// List the rules that fired for each file.
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "handler-migrate",
            "fix-handlers",
            "--root",
            "/tmp/app",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        let Commands::FixHandlers(args) = &cli.command else {
            panic!("expected fix-handlers, got {:?}", cli.command);
        };
        assert_eq!(args.root, PathBuf::from("/tmp/app"));
        assert!(args.dry_run && args.verbose && !args.diff && !args.json);
    }

    #[test]
    fn root_defaults_to_cwd() {
        let cli = Cli::try_parse_from(["handler-migrate", "sqlx-type-fix"]).unwrap();
        let Commands::SqlxTypeFix(args) = &cli.command else {
            panic!("expected sqlx-type-fix, got {:?}", cli.command);
        };
        assert_eq!(args.root, PathBuf::from("."));
    }

    #[test]
    fn rules_takes_optional_name() {
        let cli = Cli::try_parse_from(["handler-migrate", "rules", "final-fix"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rules { name: Some(TransformationKind::FinalFix) }
        ));
        assert!(Cli::try_parse_from(["handler-migrate", "rules", "bogus"]).is_err());
    }

    #[test]
    fn json_and_interactive_conflict() {
        assert!(Cli::try_parse_from(["handler-migrate", "final-fix", "--json", "-i"]).is_err());
    }
}
