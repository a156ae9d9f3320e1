use crate::error::{AppError, ErrorKind};
use crate::issue::{IssueRef, RelationKind};

/// Per-invocation switches. `dry_run` wins over `force`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Show what would be removed without calling the API.
    pub dry_run: bool,
    /// Skip the confirmation prompt.
    pub force: bool,
}

/// One validated edge, ready to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRemoval {
    pub target: IssueRef,
    pub kind: RelationKind,
    /// Database id of the target issue; addresses the edge in the DELETE call.
    pub issue_id: u64,
    pub title: String,
}

/// Everything one invocation would remove, in the order the targets were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    pub source: IssueRef,
    pub removals: Vec<PlannedRemoval>,
}

/// Why a single target could not be validated or removed.
#[derive(Debug)]
pub struct TargetFailure {
    pub target: IssueRef,
    pub error: AppError,
}

/// Result of the DELETE for one planned removal.
#[derive(Debug)]
pub struct TargetOutcome {
    pub removal: PlannedRemoval,
    pub result: Result<(), AppError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Succeeded,
    PartiallyFailed,
    Failed,
}

/// Per-target results of an executed plan, in plan order.
#[derive(Debug)]
pub struct RemovalReport {
    pub source: IssueRef,
    pub outcomes: Vec<TargetOutcome>,
}

impl RemovalReport {
    pub fn removed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.removed_count()
    }

    pub fn status(&self) -> ReportStatus {
        match (self.removed_count(), self.failed_count()) {
            (_, 0) => ReportStatus::Succeeded,
            (0, _) => ReportStatus::Failed,
            _ => ReportStatus::PartiallyFailed,
        }
    }

    /// `Ok` when every planned removal succeeded, otherwise one error for
    /// the failures. A lone failing target hands back its own error, with
    /// source and target added as context.
    pub fn into_result(self) -> Result<(), AppError> {
        let removed = self.removed_count();
        let total = self.outcomes.len();
        let source = self.source;
        let mut failures: Vec<(IssueRef, AppError)> = self
            .outcomes
            .into_iter()
            .filter_map(|o| o.result.err().map(|err| (o.removal.target, err)))
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        if removed == 0 && failures.len() == 1 {
            if let Some((target, err)) = failures.pop() {
                return Err(err
                    .with_context("source", source.to_string())
                    .with_context("target", target.to_string()));
            }
        }

        let headline = if removed == 0 {
            format!("failed to remove all {} dependencies of {}", failures.len(), source)
        } else {
            format!(
                "removal partially failed: {} of {} dependencies of {} removed",
                removed, total, source
            )
        };
        let failures: Vec<(&IssueRef, &AppError)> =
            failures.iter().map(|(target, err)| (target, err)).collect();
        Err(aggregate(headline, &failures, ErrorKind::Api))
    }
}

/// Terminal state of one removal invocation.
#[derive(Debug)]
pub enum RemovalOutcome {
    /// Previewed only; no DELETE was issued.
    DryRun(RemovalPlan),
    /// The operator declined; no DELETE was issued.
    Cancelled(RemovalPlan),
    Completed(RemovalReport),
}

/// Fold per-target failures into one error listing each target and reason.
///
/// The error takes the failures' kind when they all agree, otherwise
/// `fallback`. Each failure is also kept as a context entry keyed by target.
pub fn aggregate(
    headline: String,
    failures: &[(&IssueRef, &AppError)],
    fallback: ErrorKind,
) -> AppError {
    let kind = match failures.split_first() {
        Some(((_, first), rest)) if rest.iter().all(|(_, err)| err.kind() == first.kind()) => {
            first.kind()
        }
        _ => fallback,
    };

    let mut message = headline;
    for (target, err) in failures {
        message.push_str(&format!("\n  - {}: {}", target, err));
    }

    let mut aggregated = AppError::new(kind, message);
    for (target, err) in failures {
        aggregated = aggregated.with_context(target.to_string(), err.message());
        for suggestion in err.suggestions() {
            aggregated = aggregated.with_suggestion(suggestion.as_str());
        }
    }
    aggregated
}
