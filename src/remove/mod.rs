pub mod confirm;
pub mod types;
pub mod validator;

pub use confirm::{Confirm, StdinConfirm};
pub use types::{RemovalOutcome, RemovalPlan, RemovalReport, RemoveOptions, ReportStatus};
pub use validator::RemovalValidator;

use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::github::{DependencyApi, DependencyFetcher};
use crate::issue::{IssueRef, RelationKind};
use crate::report;
use types::TargetOutcome;

/// Drives one removal: validate, then preview, confirm or execute.
///
/// Dry-run never reaches the DELETE endpoint, whatever else is set.
/// Declining the confirmation leaves everything untouched.
pub struct Remover<'a, A, C: ?Sized> {
    fetcher: &'a DependencyFetcher<A>,
    confirm: &'a mut C,
}

impl<'a, A: DependencyApi, C: Confirm + ?Sized> Remover<'a, A, C> {
    pub fn new(fetcher: &'a DependencyFetcher<A>, confirm: &'a mut C) -> Self {
        Self { fetcher, confirm }
    }

    /// Remove `kind` edges from `source` to each of `targets`.
    #[instrument(
        skip(self, targets),
        fields(source = %source, targets = targets.len(), kind = %kind)
    )]
    pub async fn remove(
        &mut self,
        source: &IssueRef,
        targets: &[IssueRef],
        kind: RelationKind,
        opts: RemoveOptions,
    ) -> Result<RemovalOutcome, AppError> {
        let validator = RemovalValidator::new(self.fetcher);
        let plan = match targets {
            [target] => RemovalPlan {
                source: source.clone(),
                removals: vec![validator.validate_single(source, target, kind).await?],
            },
            _ => validator
                .validate_batch(source, targets, kind)
                .await?
                .into_plan()?,
        };
        self.run(plan, opts).await
    }

    /// Remove every edge currently on `source`.
    #[instrument(skip(self), fields(source = %source))]
    pub async fn remove_all(
        &mut self,
        source: &IssueRef,
        opts: RemoveOptions,
    ) -> Result<RemovalOutcome, AppError> {
        let plan = RemovalValidator::new(self.fetcher).validate_all(source).await?;
        self.run(plan, opts).await
    }

    /// Preview, confirm or execute an already validated plan.
    pub async fn run(
        &mut self,
        plan: RemovalPlan,
        opts: RemoveOptions,
    ) -> Result<RemovalOutcome, AppError> {
        if opts.dry_run {
            info!(removals = plan.removals.len(), "dry run, nothing removed");
            return Ok(RemovalOutcome::DryRun(plan));
        }

        if !opts.force {
            let summary = report::confirmation_summary(&plan);
            if !confirm::confirm(&mut *self.confirm, &summary)? {
                info!("removal cancelled by operator");
                return Ok(RemovalOutcome::Cancelled(plan));
            }
        }

        Ok(RemovalOutcome::Completed(self.execute(&plan).await))
    }

    /// Issue one DELETE per planned removal, in order, each under the
    /// retry policy. A failing target does not stop the ones after it.
    #[instrument(skip(self, plan), fields(source = %plan.source, removals = plan.removals.len()))]
    pub async fn execute(&self, plan: &RemovalPlan) -> RemovalReport {
        let api = self.fetcher.api();
        let retry = self.fetcher.retry();
        let mut outcomes = Vec::with_capacity(plan.removals.len());

        for removal in &plan.removals {
            let result = retry
                .run("remove dependency", || {
                    api.remove_dependency(&plan.source, removal.kind, removal.issue_id)
                })
                .await
                .map_err(|err| {
                    err.with_context("source", plan.source.to_string())
                        .with_context("target", removal.target.to_string())
                });

            match &result {
                Ok(()) => {
                    info!(target = %removal.target, kind = %removal.kind, "dependency removed");
                    self.fetcher.invalidate(&removal.target);
                }
                Err(err) => {
                    warn!(target = %removal.target, error = %err, "failed to remove dependency")
                }
            }
            outcomes.push(TargetOutcome {
                removal: removal.clone(),
                result,
            });
        }

        self.fetcher.invalidate(&plan.source);
        RemovalReport {
            source: plan.source.clone(),
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::confirm::ScriptedConfirm;
    use super::*;
    use crate::cache::ResponseCache;
    use crate::error::ErrorKind;
    use crate::github::testing::{issue, issue_ref, Call, Failure, MockApi};
    use crate::retry::RetryPolicy;

    const FORCE: RemoveOptions = RemoveOptions {
        dry_run: false,
        force: true,
    };
    const INTERACTIVE: RemoveOptions = RemoveOptions {
        dry_run: false,
        force: false,
    };

    fn fetcher(api: MockApi) -> DependencyFetcher<MockApi> {
        DependencyFetcher::new(api, ResponseCache::in_memory()).with_retry(RetryPolicy::immediate())
    }

    fn api_123_blocked_by_456() -> MockApi {
        MockApi::new().with_edge("owner/repo#123", RelationKind::BlockedBy, "owner/repo#456")
    }

    async fn remove_one(
        f: &DependencyFetcher<MockApi>,
        answers: &[&str],
        opts: RemoveOptions,
    ) -> (Result<RemovalOutcome, AppError>, usize) {
        let mut confirm = ScriptedConfirm::new(answers);
        let result = Remover::new(f, &mut confirm)
            .remove(
                &issue_ref("owner/repo#123"),
                &[issue_ref("owner/repo#456")],
                RelationKind::BlockedBy,
                opts,
            )
            .await;
        (result, confirm.prompts.len())
    }

    #[tokio::test]
    async fn test_forced_removal_issues_one_delete() {
        let f = fetcher(api_123_blocked_by_456());
        let (result, prompts) = remove_one(&f, &[], FORCE).await;
        let RemovalOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completed removal");
        };
        assert_eq!(report.status(), ReportStatus::Succeeded);
        assert_eq!(report.removed_count(), 1);
        assert_eq!(prompts, 0);
        assert_eq!(
            f.api().remove_calls(),
            vec![Call::Remove {
                source: "owner/repo#123".to_string(),
                kind: RelationKind::BlockedBy,
                target_id: issue("owner/repo", 456).id,
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_relationship_issues_no_delete() {
        let f = fetcher(MockApi::new().with_issues(&["owner/repo#123", "owner/repo#456"]));
        let (result, _) = remove_one(&f, &[], FORCE).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Issue);
        assert!(err.to_string().contains("is not blocked by"));
        assert!(f.api().remove_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_deletes() {
        for force in [false, true] {
            let f = fetcher(api_123_blocked_by_456());
            let opts = RemoveOptions {
                dry_run: true,
                force,
            };
            let (result, prompts) = remove_one(&f, &["y"], opts).await;
            let RemovalOutcome::DryRun(plan) = result.unwrap() else {
                panic!("expected dry run");
            };
            assert_eq!(plan.removals.len(), 1);
            assert_eq!(prompts, 0);
            assert!(f.api().remove_calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_confirmed_removal_executes() {
        let f = fetcher(api_123_blocked_by_456());
        let (result, prompts) = remove_one(&f, &["yes"], INTERACTIVE).await;
        assert!(matches!(result.unwrap(), RemovalOutcome::Completed(_)));
        assert_eq!(prompts, 1);
        assert_eq!(f.api().remove_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_declined_or_empty_answer_cancels() {
        for answer in ["n", "", "NO"] {
            let f = fetcher(api_123_blocked_by_456());
            let (result, _) = remove_one(&f, &[answer], INTERACTIVE).await;
            assert!(matches!(result.unwrap(), RemovalOutcome::Cancelled(_)));
            assert!(f.api().remove_calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_answers_exhaust_prompts() {
        let f = fetcher(api_123_blocked_by_456());
        let (result, prompts) = remove_one(&f, &["maybe", "later", "ok"], INTERACTIVE).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Internal);
        assert_eq!(prompts, 3);
        assert!(f.api().remove_calls().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_delete_is_retried() {
        let api = api_123_blocked_by_456()
            .fail_remove("owner/repo#456", &[Failure::Status(429), Failure::Status(429)]);
        let f = fetcher(api);
        let (result, _) = remove_one(&f, &[], FORCE).await;
        let RemovalOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completed removal");
        };
        assert_eq!(report.status(), ReportStatus::Succeeded);
        assert_eq!(f.api().remove_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let api = api_123_blocked_by_456().fail_remove(
            "owner/repo#456",
            &[Failure::Status(500), Failure::Status(500), Failure::Status(500)],
        );
        let f = fetcher(api);
        let (result, _) = remove_one(&f, &[], FORCE).await;
        let RemovalOutcome::Completed(report) = result.unwrap() else {
            panic!("expected completed removal");
        };
        assert_eq!(report.status(), ReportStatus::Failed);
        assert_eq!(f.api().remove_calls().len(), 3);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_batch_partial_failure_is_reported_per_target() {
        let api = MockApi::new()
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#2")
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#3")
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#4")
            .fail_remove("o/r#3", &[Failure::Status(404)]);
        let f = fetcher(api);
        let mut confirm = ScriptedConfirm::new(&[]);
        let result = Remover::new(&f, &mut confirm)
            .remove(
                &issue_ref("o/r#1"),
                &[issue_ref("o/r#2"), issue_ref("o/r#3"), issue_ref("o/r#4")],
                RelationKind::BlockedBy,
                FORCE,
            )
            .await
            .unwrap();
        let RemovalOutcome::Completed(report) = result else {
            panic!("expected completed removal");
        };
        assert_eq!(report.status(), ReportStatus::PartiallyFailed);
        assert_eq!(report.removed_count(), 2);
        assert_eq!(report.failed_count(), 1);
        let order: Vec<_> = report.outcomes.iter().map(|o| o.removal.target.number).collect();
        assert_eq!(order, vec![2, 3, 4]);
        assert!(report.outcomes[1].result.is_err());
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("o/r#3"));
        assert_eq!(f.api().remove_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_with_invalid_target_removes_nothing() {
        let api = MockApi::new()
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#2")
            .with_issues(&["o/r#3"])
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#4");
        let f = fetcher(api);
        let mut confirm = ScriptedConfirm::new(&["y"]);
        let err = Remover::new(&f, &mut confirm)
            .remove(
                &issue_ref("o/r#1"),
                &[issue_ref("o/r#2"), issue_ref("o/r#3"), issue_ref("o/r#4")],
                RelationKind::BlockedBy,
                INTERACTIVE,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("o/r#3"));
        assert!(confirm.prompts.is_empty());
        assert!(f.api().remove_calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let api = MockApi::new()
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#2")
            .with_edge("o/r#1", RelationKind::Blocks, "x/y#3");
        let f = fetcher(api);
        let mut confirm = ScriptedConfirm::new(&[]);
        let outcome = Remover::new(&f, &mut confirm)
            .remove_all(&issue_ref("o/r#1"), FORCE)
            .await
            .unwrap();
        let RemovalOutcome::Completed(report) = outcome else {
            panic!("expected completed removal");
        };
        assert_eq!(report.removed_count(), 2);
        let kinds: Vec<_> = f
            .api()
            .remove_calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remove { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![RelationKind::BlockedBy, RelationKind::Blocks]);

        // The cached snapshot was dropped, so the next read sees no edges.
        assert!(f.fetch(&issue_ref("o/r#1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_number_in_two_repositories_removes_only_the_target() {
        let api = MockApi::new()
            .with_edge("o/r#1", RelationKind::BlockedBy, "o/r#2")
            .with_edge("o/r#1", RelationKind::BlockedBy, "x/y#2")
            .fail_remove("x/y#2", &[Failure::Status(429)]);
        let f = fetcher(api);
        assert_ne!(issue("o/r", 2).id, issue("x/y", 2).id);

        let mut confirm = ScriptedConfirm::new(&[]);
        let outcome = Remover::new(&f, &mut confirm)
            .remove(
                &issue_ref("o/r#1"),
                &[issue_ref("x/y#2")],
                RelationKind::BlockedBy,
                FORCE,
            )
            .await
            .unwrap();
        let RemovalOutcome::Completed(report) = outcome else {
            panic!("expected completed removal");
        };
        assert_eq!(report.status(), ReportStatus::Succeeded);
        assert_eq!(f.api().remove_calls().len(), 2);

        let remaining = f.fetch(&issue_ref("o/r#1")).await.unwrap();
        assert_eq!(remaining.blocked_by.len(), 1);
        assert_eq!(remaining.blocked_by[0].repository, "o/r");
    }

    #[tokio::test]
    async fn test_remove_all_without_relationships() {
        let f = fetcher(MockApi::new().with_issues(&["o/r#1"]));
        let mut confirm = ScriptedConfirm::new(&[]);
        let err = Remover::new(&f, &mut confirm)
            .remove_all(&issue_ref("o/r#1"), FORCE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.api().remove_calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_targets_is_validation_error() {
        let f = fetcher(api_123_blocked_by_456());
        let mut confirm = ScriptedConfirm::new(&[]);
        let err = Remover::new(&f, &mut confirm)
            .remove(&issue_ref("owner/repo#123"), &[], RelationKind::Blocks, FORCE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.api().call_count(), 0);
    }
}
