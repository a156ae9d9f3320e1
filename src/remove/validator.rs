use tracing::{debug, instrument};

use super::types::{aggregate, PlannedRemoval, RemovalPlan, TargetFailure};
use crate::error::{AppError, ErrorKind};
use crate::github::{DependencyApi, DependencyFetcher};
use crate::issue::{DependencySnapshot, IssueRef, RelationKind};

/// Checks that a removal is well-formed, permitted and refers to an edge
/// that actually exists. Holds no state of its own.
pub struct RemovalValidator<'a, A> {
    fetcher: &'a DependencyFetcher<A>,
}

/// Batch result: the targets that passed, and every target that did not.
#[derive(Debug)]
pub struct BatchValidation {
    pub source: IssueRef,
    pub valid: Vec<PlannedRemoval>,
    pub failures: Vec<TargetFailure>,
}

impl BatchValidation {
    /// The plan for all targets, or one error listing every failing target.
    pub fn into_plan(self) -> Result<RemovalPlan, AppError> {
        if self.failures.is_empty() {
            return Ok(RemovalPlan {
                source: self.source,
                removals: self.valid,
            });
        }
        let failures: Vec<_> = self.failures.iter().map(|f| (&f.target, &f.error)).collect();
        let total = self.valid.len() + self.failures.len();
        Err(aggregate(
            format!(
                "{} of {} targets failed validation for {}",
                self.failures.len(),
                total,
                self.source
            ),
            &failures,
            ErrorKind::Validation,
        )
        .with_context("source", self.source.to_string()))
    }
}

/// Well-formedness of one source/target pair, including self-reference.
/// Pure; runs before any network call.
pub fn check_input(source: &IssueRef, target: &IssueRef) -> Result<(), AppError> {
    check_issue(source, "source")?;
    check_issue(target, "target")?;
    if source == target {
        return Err(AppError::validation(format!(
            "{} cannot depend on itself",
            source
        ))
        .with_context("source", source.to_string())
        .with_suggestion("Pick a different target issue"));
    }
    Ok(())
}

fn check_issue(issue: &IssueRef, side: &str) -> Result<(), AppError> {
    if issue.is_well_formed() {
        return Ok(());
    }
    Err(AppError::validation(format!(
        "{} issue '{}' is incomplete: owner, repository and a positive number are required",
        side, issue
    ))
    .with_context("side", side))
}

impl<'a, A: DependencyApi> RemovalValidator<'a, A> {
    pub fn new(fetcher: &'a DependencyFetcher<A>) -> Self {
        Self { fetcher }
    }

    /// Validate removing a single `kind` edge from `source` to `target`.
    ///
    /// Stops at the first failing check: input, write permission on the
    /// source repository, reachability of both issues, then existence of
    /// the edge.
    #[instrument(skip(self), fields(source = %source, target = %target, kind = %kind))]
    pub async fn validate_single(
        &self,
        source: &IssueRef,
        target: &IssueRef,
        kind: RelationKind,
    ) -> Result<PlannedRemoval, AppError> {
        check_input(source, target)?;
        self.check_permission(source).await?;
        let snapshot = self.fetch_source(source).await?;
        self.check_target(source, &snapshot, target, kind).await
    }

    /// Validate removing `kind` edges from `source` to each of `targets`.
    ///
    /// Source-level checks fail fast with `Err`. Target-level failures are
    /// collected in the returned `BatchValidation`, in target order. Input
    /// checks run for every target before any network call, and when no
    /// target passes them the API is never contacted.
    #[instrument(
        skip(self, targets),
        fields(source = %source, targets = targets.len(), kind = %kind)
    )]
    pub async fn validate_batch(
        &self,
        source: &IssueRef,
        targets: &[IssueRef],
        kind: RelationKind,
    ) -> Result<BatchValidation, AppError> {
        if targets.is_empty() {
            return Err(AppError::validation("no target issues given")
                .with_suggestion("Pass at least one issue to --blocked-by or --blocks"));
        }
        check_issue(source, "source")?;

        let mut checked: Vec<(&IssueRef, Result<(), AppError>)> = Vec::new();
        for target in targets {
            if checked.iter().any(|(seen, _)| *seen == target) {
                debug!(target = %target, "skipping duplicate target");
                continue;
            }
            checked.push((target, check_input(source, target)));
        }

        let snapshot = if checked.iter().any(|(_, input)| input.is_ok()) {
            self.check_permission(source).await?;
            Some(self.fetch_source(source).await?)
        } else {
            debug!("no target passed input checks, skipping network calls");
            None
        };

        let mut valid = Vec::new();
        let mut failures = Vec::new();
        for (target, input) in checked {
            let result = match (input, &snapshot) {
                (Ok(()), Some(snapshot)) => {
                    self.check_target(source, snapshot, target, kind).await
                }
                (Err(err), _) => Err(err),
                (Ok(()), None) => Err(AppError::internal("source snapshot missing")),
            };
            match result {
                Ok(planned) => valid.push(planned),
                Err(error) => failures.push(TargetFailure {
                    target: target.clone(),
                    error,
                }),
            }
        }

        debug!(valid = valid.len(), failed = failures.len(), "batch validated");
        Ok(BatchValidation {
            source: source.clone(),
            valid,
            failures,
        })
    }

    /// Plan the removal of every edge currently on `source`.
    ///
    /// Existence is implied by the snapshot itself. An issue with no edges
    /// is an error rather than a silent no-op.
    #[instrument(skip(self), fields(source = %source))]
    pub async fn validate_all(&self, source: &IssueRef) -> Result<RemovalPlan, AppError> {
        check_issue(source, "source")?;
        self.check_permission(source).await?;
        let snapshot = self.fetch_source(source).await?;

        if snapshot.is_empty() {
            return Err(AppError::validation(format!(
                "{} has no dependencies to remove",
                source
            ))
            .with_context("source", source.to_string())
            .with_suggestion(format!("Run `gh-deps list {}` to confirm", source)));
        }

        let removals = snapshot
            .all_relations()
            .map(|relation| {
                let target = relation.issue.to_ref().ok_or_else(|| {
                    AppError::internal(format!(
                        "dependency #{} has an unusable repository name '{}'",
                        relation.issue.number, relation.repository
                    ))
                })?;
                Ok(PlannedRemoval {
                    target,
                    kind: relation.kind,
                    issue_id: relation.issue.id,
                    title: relation.issue.title.clone(),
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(RemovalPlan {
            source: source.clone(),
            removals,
        })
    }

    /// Caller needs write access to the source repository. Cross-repository
    /// targets only need to be readable.
    async fn check_permission(&self, source: &IssueRef) -> Result<(), AppError> {
        let api = self.fetcher.api();
        let permission = self
            .fetcher
            .retry()
            .run("check permissions", || {
                api.repository_permission(&source.owner, &source.repo)
            })
            .await
            .map_err(|err| err.with_context("repository", source.full_name()))?;

        if permission.can_write() {
            return Ok(());
        }
        Err(AppError::permission(format!(
            "write access to {} is required to remove dependencies of {}",
            source.full_name(),
            source
        ))
        .with_context("repository", source.full_name()))
    }

    async fn fetch_source(&self, source: &IssueRef) -> Result<DependencySnapshot, AppError> {
        self.fetcher
            .fetch(source)
            .await
            .map_err(|err| err.with_context("side", "source"))
    }

    /// Reachability of `target`, then existence of the edge in `snapshot`.
    ///
    /// An unreachable target is reported as such even when the edge is also
    /// missing.
    async fn check_target(
        &self,
        source: &IssueRef,
        snapshot: &DependencySnapshot,
        target: &IssueRef,
        kind: RelationKind,
    ) -> Result<PlannedRemoval, AppError> {
        self.fetcher
            .fetch_issue(target)
            .await
            .map_err(|err| err.with_context("side", "target"))?;

        let relation = snapshot.find(kind, target).ok_or_else(|| {
            AppError::issue(format!(
                "{} {} {}",
                source,
                kind.negated_phrase(),
                target
            ))
            .with_context("source", source.to_string())
            .with_context("target", target.to_string())
            .with_context("kind", kind.to_string())
            .with_suggestion(format!(
                "Run `gh-deps list {}` to see current dependencies",
                source
            ))
        })?;

        Ok(PlannedRemoval {
            target: target.clone(),
            kind,
            issue_id: relation.issue.id,
            title: relation.issue.title.clone(),
        })
    }
}
