use std::fmt::Write;

use colored::Colorize;
use tracing::debug;

use crate::error::AppError;
use crate::issue::{DependencyRelation, DependencySnapshot};
use crate::remove::{RemovalOutcome, RemovalPlan, RemovalReport, ReportStatus};

/// Summary shown above the confirmation prompt.
///
/// Single target:
///   Remove blocked-by relationship: octo/repo#123 <- blocked by <- octo/repo#456?
///
/// Batch:
///   Remove 3 relationships from octo/repo#123?
///     • blocked-by octo/repo#456 "Fix parser"
///     ...
pub fn confirmation_summary(plan: &RemovalPlan) -> String {
    match plan.removals.as_slice() {
        [removal] => format!(
            "Remove {} relationship: {} {} {}?",
            removal.kind,
            plan.source,
            removal.kind.arrow(),
            removal.target
        ),
        removals => {
            let mut summary = format!(
                "Remove {} relationships from {}?",
                removals.len(),
                plan.source
            );
            for removal in removals {
                let _ = write!(
                    summary,
                    "\n  • {} {} \"{}\"",
                    removal.kind, removal.target, removal.title
                );
            }
            summary
        }
    }
}

/// Render what a dry run would remove.
pub fn render_preview(plan: &RemovalPlan) -> String {
    let mut out = format!(
        "{} would remove {} relationship(s) from {}:\n",
        "Dry run:".yellow().bold(),
        plan.removals.len(),
        plan.source
    );
    for removal in &plan.removals {
        let _ = writeln!(
            out,
            "  {} {} {}  ({})",
            plan.source,
            removal.kind.arrow(),
            removal.target,
            removal.kind
        );
    }
    out.push_str("No changes were made.");
    out
}

/// Render per-target results of an executed removal, in plan order.
pub fn render_report(report: &RemovalReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let removal = &outcome.removal;
        match &outcome.result {
            Ok(()) => {
                let _ = writeln!(
                    out,
                    "{} Removed {} relationship: {} {} {}",
                    "✓".green().bold(),
                    removal.kind,
                    report.source,
                    removal.kind.arrow(),
                    removal.target
                );
            }
            Err(err) => {
                let _ = writeln!(
                    out,
                    "{} Failed to remove {} relationship with {}: {}",
                    "✗".red().bold(),
                    removal.kind,
                    removal.target,
                    err
                );
            }
        }
    }
    let status = match report.status() {
        ReportStatus::Succeeded => "done".green().bold(),
        ReportStatus::PartiallyFailed => "partially failed".yellow().bold(),
        ReportStatus::Failed => "failed".red().bold(),
    };
    let _ = write!(
        out,
        "{}: {} removed, {} failed",
        status,
        report.removed_count(),
        report.failed_count()
    );
    out
}

/// Render an issue's dependencies, blocked-by first.
pub fn render_dependencies(snapshot: &DependencySnapshot) -> String {
    let source = &snapshot.source_issue;
    let mut out = format!(
        "{}#{}: \"{}\" [{}]\n",
        source.repository, source.number, source.title, source.state
    );

    let mut section = |title: &str, relations: &[DependencyRelation]| {
        let _ = writeln!(out, "\n═══ {} ({}) ═══", title, relations.len());
        if relations.is_empty() {
            out.push_str("  None.\n");
        }
        for relation in relations {
            let issue = &relation.issue;
            let state = if issue.state == "open" {
                issue.state.green()
            } else {
                issue.state.dimmed()
            };
            let _ = writeln!(
                out,
                "  • {}#{} {} [{}]",
                relation.repository, issue.number, issue.title, state
            );
        }
    };
    section("Blocked by", &snapshot.blocked_by);
    section("Blocking", &snapshot.blocking);

    let _ = write!(out, "\n{} total", snapshot.total_count);
    out
}

/// Render an error with its context and remediation suggestions.
pub fn render_error(err: &AppError) -> String {
    let mut out = format!("{} {}", format!("error[{}]:", err.kind()).red().bold(), err);
    for (key, value) in err.context() {
        let _ = write!(out, "\n  {}: {}", key.dimmed(), value);
    }
    for suggestion in err.suggestions() {
        let _ = write!(out, "\n  {} {}", "hint:".cyan(), suggestion);
    }
    out
}

/// Print the terminal state of a removal to stdout.
pub fn print_outcome(outcome: &RemovalOutcome) {
    debug!("writing removal outcome to terminal");
    match outcome {
        RemovalOutcome::DryRun(plan) => println!("{}", render_preview(plan)),
        RemovalOutcome::Cancelled(_) => println!("{}", "Cancelled. No changes were made.".yellow()),
        RemovalOutcome::Completed(report) => println!("{}", render_report(report)),
    }
}

pub fn print_dependencies(snapshot: &DependencySnapshot) {
    println!("{}", render_dependencies(snapshot));
}

pub fn print_error(err: &AppError) {
    eprintln!("{}", render_error(err));
}
