//! handler-migrate: rewrite request handlers between dependency-passing conventions.
//!
//! Each subcommand runs one catalog transformation over the project tree,
//! printing a status line per target file and a closing summary.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use colored::Colorize;
use dialoguer::Confirm;
use handler_migrate::catalog::{self, Transformation, TransformationKind};
use handler_migrate::rewriter::Rewrite;
use handler_migrate::runner::{self, FileStatus, RunOptions, RunSummary};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::FixHandlers(args) => cmd_run(TransformationKind::FixHandlers, &args),
        Commands::RevertHandlers(args) => cmd_run(TransformationKind::RevertHandlers, &args),
        Commands::FinalFix(args) => cmd_run(TransformationKind::FinalFix, &args),
        Commands::SqlxTypeFix(args) => cmd_run(TransformationKind::SqlxTypeFix, &args),
        Commands::Rules { name } => cmd_rules(name),
    }
}

fn cmd_run(kind: TransformationKind, args: &RunArgs) -> Result<()> {
    let transformation = catalog::transformation(kind)
        .with_context(|| format!("Failed to build the {} rule catalog", kind))?;
    let options = RunOptions {
        dry_run: args.dry_run,
    };

    if args.verbose && !args.json {
        eprintln!(
            "{} {} targets under {}",
            "info:".blue().bold(),
            transformation.targets.len(),
            args.root.display()
        );
    }

    let summary = runner::run(&args.root, &transformation, &options, |path, rewrite| {
        approve(path, rewrite, args)
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, args.verbose);
    }

    Ok(())
}

/// Shows the pending change when asked to and decides whether to write it.
fn approve(path: &Path, rewrite: &Rewrite, args: &RunArgs) -> Result<bool> {
    let label = path.display().to_string();

    if (args.diff || args.interactive) && !args.json {
        print_diff(&rewrite.diff(&label));
    }

    if !args.interactive {
        return Ok(true);
    }

    Confirm::new()
        .with_prompt(format!("Apply changes to {}?", label))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}

fn print_summary(summary: &RunSummary, verbose: bool) {
    let verb = if summary.dry_run { "Would update:" } else { "Updated:" };

    for file in &summary.files {
        let path = file.path.display();
        match file.status {
            FileStatus::Changed => println!("{} {}", verb.green().bold(), path),
            FileStatus::Unchanged => println!("{} {}", "Unchanged:".dimmed(), path),
            FileStatus::Declined => println!("{} {}", "Skipped:".yellow().bold(), path),
            FileStatus::Missing => {
                eprintln!("{} {} not found, skipping", "warn:".yellow().bold(), path)
            }
        }
        if verbose {
            for rule in &file.rules {
                println!("  {} {}", "->".dimmed(), rule);
            }
        }
    }

    for created in &summary.created {
        let verb = if summary.dry_run { "Would create:" } else { "Created:" };
        println!("{} {}", verb.green().bold(), created.display());
    }

    if summary.changed == 0 && summary.created.is_empty() {
        println!("\n{} No changes to apply", "info:".blue().bold());
    } else {
        println!(
            "\n{} {} changed, {} unchanged, {} missing, {} declined",
            "ok:".green().bold(),
            summary.changed,
            summary.unchanged,
            summary.missing,
            summary.declined
        );
    }

    if summary.dry_run && summary.changed > 0 {
        println!("{} Rerun without --dry-run to apply changes", "hint:".cyan().bold());
    }
}

fn cmd_rules(name: Option<TransformationKind>) -> Result<()> {
    let kinds = match name {
        Some(kind) => vec![kind],
        None => TransformationKind::ALL.to_vec(),
    };

    for (i, kind) in kinds.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        let transformation = catalog::transformation(kind)
            .with_context(|| format!("Failed to build the {} rule catalog", kind))?;
        print_transformation(&transformation);
    }

    Ok(())
}

fn print_transformation(transformation: &Transformation) {
    println!(
        "{} (requires {})",
        transformation.kind.to_string().bold(),
        transformation.required_dir.display()
    );

    for target in &transformation.targets {
        println!(
            "  {} {}",
            target.path.display(),
            format!("[{}]", target.rules.name()).dimmed()
        );
    }
    for manifest in &transformation.manifests {
        println!("  {} {}", manifest.path.display(), "[created if absent]".dimmed());
    }

    for rules in transformation.rule_sets() {
        println!("\n  {}", rules.name().cyan());
        for rule in rules.rules() {
            println!("    {} {}", rule.name(), format!("({})", rule.kind()).dimmed());
            println!("      {} {}", "match:".dimmed(), rule.matcher());
            println!("      {} {}", "when:".dimmed(), rule.guard());
        }
    }
}
