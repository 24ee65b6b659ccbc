//! Run reports and error output
//!
//! Renders a [`RunReport`] for humans or as JSON, explains failures, and maps
//! errors to the process exit code.

use anyhow::Result;
use colored::*;
use shipyard_core::domain::run::{RunReport, RunStatus, TargetRecord, TargetStatus};
use shipyard_core::{PlanError, TagError};
use shipyard_runner::{CommandFailure, ExecutionError, LaunchError, ResolveError};
use shipyard_stack::StackError;
use thiserror::Error;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_PLAN: u8 = 2;
pub const EXIT_MISSING: u8 = 3;
pub const EXIT_USAGE: u8 = 4;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Lines of standard error shown for a failed command
const STDERR_TAIL: usize = 20;

/// Invalid command-line input detected after clap parsing
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Exit code for an error returned by a command handler
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ExecutionError>() {
            return match e {
                ExecutionError::Plan(_) => EXIT_PLAN,
                ExecutionError::Parameters(ResolveError::UnknownParameter { .. }) => EXIT_PLAN,
                ExecutionError::Parameters(_) => EXIT_MISSING,
                ExecutionError::TargetFailed { .. } => EXIT_FAILURE,
                ExecutionError::Interrupted { .. } => EXIT_INTERRUPTED,
            };
        }
        if cause.is::<PlanError>() {
            return EXIT_PLAN;
        }
        if cause.is::<UsageError>() || cause.is::<TagError>() {
            return EXIT_USAGE;
        }
    }
    EXIT_FAILURE
}

/// Short description of what went wrong inside a target body
pub fn failure_kind(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<StackError>() {
            return if e.is_not_found() {
                "not found"
            } else {
                "stack operation failed"
            };
        }
        if cause.is::<CommandFailure>() || cause.is::<LaunchError>() {
            return "command failed";
        }
    }
    "error"
}

fn status_symbol(status: TargetStatus) -> ColoredString {
    match status {
        TargetStatus::Succeeded => "✓".green(),
        TargetStatus::Failed => "✗".red(),
        TargetStatus::Interrupted => "⚠".yellow(),
        TargetStatus::Skipped => "⊘".dimmed(),
        TargetStatus::Pending | TargetStatus::Running => "•".dimmed(),
    }
}

fn format_elapsed(record: &TargetRecord) -> String {
    record
        .elapsed()
        .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
        .unwrap_or_default()
}

/// Print a run report for humans
pub fn print_report(report: &RunReport) {
    println!();
    for record in &report.targets {
        println!(
            "  {} {:<20} {}",
            status_symbol(record.status),
            record.name,
            format_elapsed(record).dimmed()
        );
        for (key, value) in &record.outputs {
            println!("      {} {}", format!("{}:", key).dimmed(), value);
        }
    }
    println!();

    let total = match report.completed_at {
        Some(end) => format!(" in {:.1}s", (end - report.started_at).num_milliseconds() as f64 / 1000.0),
        None => String::new(),
    };
    match report.status {
        RunStatus::Succeeded => println!(
            "{}",
            format!("✓ {} succeeded{}", report.requested, total).green().bold()
        ),
        RunStatus::Failed => println!(
            "{}",
            format!("✗ {} failed{}", report.requested, total).red().bold()
        ),
        RunStatus::Interrupted => println!(
            "{}",
            format!("⚠ {} interrupted{}", report.requested, total).yellow().bold()
        ),
        RunStatus::Running => println!("{}", format!("{} still running", report.requested).dimmed()),
    }
}

/// Print a run report as pretty JSON on stdout
pub fn print_json(report: &RunReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Explain an error on stderr
pub fn print_error(err: &anyhow::Error) {
    let execution = err.chain().find_map(|c| c.downcast_ref::<ExecutionError>());

    match execution {
        Some(ExecutionError::Parameters(ResolveError::Missing(missing))) => {
            eprintln!("{}", "✗ Missing required parameters:".red().bold());
            for parameter in missing {
                eprintln!("  {} {}", "•".red(), parameter);
            }
            eprintln!(
                "{}",
                "  Pass them as --name=value or set the environment variable.".dimmed()
            );
        }
        Some(ExecutionError::TargetFailed {
            target,
            message,
            error,
            ..
        }) => {
            eprintln!(
                "{} {} ({})",
                "✗ Target".red().bold(),
                format!("'{}' failed", target).red().bold(),
                failure_kind(error)
            );
            eprintln!("  {}", message);
            if let Some(stderr) = error
                .chain()
                .find_map(|c| c.downcast_ref::<CommandFailure>())
                .map(|f| stderr_tail(&f.stderr))
                .filter(|s| !s.is_empty())
            {
                eprintln!("{}", "─".repeat(60).dimmed());
                for line in stderr.lines() {
                    eprintln!("  {}", line.dimmed());
                }
                eprintln!("{}", "─".repeat(60).dimmed());
            }
        }
        Some(ExecutionError::Interrupted { target, .. }) => {
            eprintln!(
                "{}",
                format!("⚠ Interrupted while running '{}'", target).yellow().bold()
            );
        }
        _ => eprintln!("{} {:#}", "Error:".red().bold(), err),
    }
}

/// Last lines of a captured standard error
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_runner::{FailureKind, MissingParameter};
    use shipyard_stack::StackOperation;

    fn failed(error: anyhow::Error) -> anyhow::Error {
        ExecutionError::TargetFailed {
            target: "push".to_string(),
            kind: FailureKind::Body,
            message: error.to_string(),
            error,
            report: Box::new(RunReport::new("push", &["push".to_string()])),
        }
        .into()
    }

    #[test]
    fn test_exit_codes() {
        let plan: anyhow::Error = ExecutionError::Plan(PlanError::unknown("nope")).into();
        assert_eq!(exit_code(&plan), EXIT_PLAN);

        let missing: anyhow::Error = ExecutionError::Parameters(ResolveError::Missing(vec![
            MissingParameter {
                name: "registry-url".to_string(),
                required_by: vec!["push".to_string()],
                alternatives: Vec::new(),
            },
        ]))
        .into();
        assert_eq!(exit_code(&missing), EXIT_MISSING);

        let interrupted: anyhow::Error = ExecutionError::Interrupted {
            target: "test".to_string(),
            report: Box::new(RunReport::new("test", &["test".to_string()])),
        }
        .into();
        assert_eq!(exit_code(&interrupted), EXIT_INTERRUPTED);

        assert_eq!(exit_code(&failed(anyhow::anyhow!("boom"))), EXIT_FAILURE);
        assert_eq!(exit_code(&PlanError::DuplicateTarget("a".into()).into()), EXIT_PLAN);
        assert_eq!(exit_code(&UsageError("bad".into()).into()), EXIT_USAGE);
        assert_eq!(
            exit_code(&anyhow::Error::new(TagError::InvalidCommit("xyz".into())).context("tag")),
            EXIT_USAGE
        );
        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_FAILURE);
    }

    #[test]
    fn test_failure_kind() {
        let command = anyhow::Error::new(CommandFailure {
            command: "dotnet test".to_string(),
            exit_code: 1,
            stderr: String::new(),
        });
        assert_eq!(failure_kind(&command), "command failed");

        let not_found = anyhow::Error::new(StackError::not_found("latest", "dockerTag"))
            .context("Nothing to promote");
        assert_eq!(failure_kind(&not_found), "not found");

        let stack = anyhow::Error::new(StackError::operation("stage", StackOperation::Apply, "boom"));
        assert_eq!(failure_kind(&stack), "stack operation failed");

        assert_eq!(failure_kind(&anyhow::anyhow!("plain")), "error");
    }

    #[test]
    fn test_stderr_tail() {
        let stderr: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&stderr);
        assert_eq!(tail.lines().count(), STDERR_TAIL);
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 30"));
    }
}
