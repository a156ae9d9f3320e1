use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info_span, instrument, Instrument};

use super::DependencyApi;
use crate::cache::ResponseCache;
use crate::error::AppError;
use crate::issue::{DependencySnapshot, Issue, IssueRef, RelationKind};
use crate::retry::RetryPolicy;

/// Deadline covering all reads of one fetch.
pub const FETCH_DEADLINE: Duration = Duration::from_secs(30);

/// Assembles dependency snapshots from the API, reading through the cache.
pub struct DependencyFetcher<A> {
    api: A,
    cache: ResponseCache,
    retry: RetryPolicy,
    deadline: Duration,
}

impl<A: DependencyApi> DependencyFetcher<A> {
    pub fn new(api: A, cache: ResponseCache) -> Self {
        Self {
            api,
            cache,
            retry: RetryPolicy::default(),
            deadline: FETCH_DEADLINE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Snapshot of `issue`'s dependencies, from cache when fresh.
    ///
    /// On a miss the issue detail, blocked-by and blocking reads run
    /// concurrently under one deadline. Any failing read fails the whole
    /// fetch; nothing partial is returned or cached.
    #[instrument(skip(self), fields(issue = %issue))]
    pub async fn fetch(&self, issue: &IssueRef) -> Result<DependencySnapshot, AppError> {
        if let Some(snapshot) = self.cache.get(issue) {
            return Ok(snapshot);
        }

        let reads = async {
            tokio::try_join!(
                self.read_issue(issue)
                    .instrument(info_span!("read", part = "issue")),
                self.read_edges(issue, RelationKind::BlockedBy)
                    .instrument(info_span!("read", part = "blocked_by")),
                self.read_edges(issue, RelationKind::Blocks)
                    .instrument(info_span!("read", part = "blocking")),
            )
        };

        let (source_issue, blocked_by, blocking) = tokio::time::timeout(self.deadline, reads)
            .await
            .map_err(|_| self.timeout_error(issue))??;

        let snapshot = DependencySnapshot::new(source_issue, blocked_by, blocking, Utc::now());
        debug!(
            blocked_by = snapshot.blocked_by.len(),
            blocking = snapshot.blocking.len(),
            "fetched dependency snapshot"
        );
        self.cache.put(issue, &snapshot);
        Ok(snapshot)
    }

    /// Issue detail only, under the same retry policy and deadline.
    #[instrument(skip(self), fields(issue = %issue))]
    pub async fn fetch_issue(&self, issue: &IssueRef) -> Result<Issue, AppError> {
        tokio::time::timeout(self.deadline, self.read_issue(issue))
            .await
            .map_err(|_| self.timeout_error(issue))?
    }

    /// Forget the cached snapshot of `issue`.
    pub fn invalidate(&self, issue: &IssueRef) {
        self.cache.invalidate(issue);
    }

    async fn read_issue(&self, issue: &IssueRef) -> Result<Issue, AppError> {
        self.retry
            .run("fetch issue", || self.api.get_issue(issue))
            .await
            .map_err(|err| err.with_context("issue", issue.to_string()))
    }

    /// A 404 from an edges endpoint means "no edges", not a failure.
    async fn read_edges(
        &self,
        issue: &IssueRef,
        kind: RelationKind,
    ) -> Result<Vec<Issue>, AppError> {
        match self
            .retry
            .run("fetch dependencies", || self.api.list_dependencies(issue, kind))
            .await
        {
            Ok(issues) => Ok(issues),
            Err(err) if err.status() == Some(404) => {
                debug!(kind = %kind, "no dependency edges");
                Ok(Vec::new())
            }
            Err(err) => Err(err
                .with_context("issue", issue.to_string())
                .with_context("relationship", kind.to_string())),
        }
    }

    fn timeout_error(&self, issue: &IssueRef) -> AppError {
        AppError::network(format!(
            "fetching {} timed out after {}s",
            issue,
            self.deadline.as_secs_f32()
        ))
        .with_context("issue", issue.to_string())
    }
}
