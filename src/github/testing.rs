//! In-memory `DependencyApi` double for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DependencyApi, RepoPermission};
use crate::error::{AppError, ErrorKind};
use crate::issue::{Issue, IssueRef, RelationKind};

/// A recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetIssue(String),
    ListDependencies(String, RelationKind),
    Permission(String),
    Remove {
        source: String,
        kind: RelationKind,
        target_id: u64,
    },
}

/// A scripted failure for one call.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Status(u16),
    Network,
}

impl Failure {
    fn into_error(self, not_found: ErrorKind) -> AppError {
        match self {
            Failure::Status(status) => {
                AppError::from_status(status, not_found, format!("mock HTTP {}", status))
            }
            Failure::Network => AppError::network("mock connection reset"),
        }
    }
}

#[derive(Default)]
struct State {
    issues: HashMap<String, Issue>,
    edges: HashMap<(String, RelationKind), Vec<Issue>>,
    permissions: HashMap<String, RepoPermission>,
    issue_failures: HashMap<String, VecDeque<Failure>>,
    list_failures: HashMap<(String, RelationKind), VecDeque<Failure>>,
    remove_failures: HashMap<u64, VecDeque<Failure>>,
}

/// Stateful fake of the GitHub dependency endpoints.
/// Repositories grant write access unless configured otherwise.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<State>,
    calls: Mutex<Vec<Call>>,
    latency: Option<Duration>,
}

/// Issue fixture with a deterministic id derived from its repository and
/// number, so the same number in two repositories gets two ids.
pub fn issue(repository: &str, number: u64) -> Issue {
    let repo_hash = repository
        .bytes()
        .fold(0u64, |hash, byte| hash.wrapping_mul(31).wrapping_add(u64::from(byte)));
    Issue {
        id: (repo_hash % 1_000_000) * 1_000_000 + number,
        number,
        title: format!("Issue {}", number),
        state: "open".to_string(),
        assignees: vec![],
        labels: vec![],
        url: format!("https://github.com/{}/issues/{}", repository, number),
        repository: repository.to_string(),
    }
}

/// Parse an `owner/repo#n` fixture reference.
pub fn issue_ref(reference: &str) -> IssueRef {
    crate::issue::parse_issue_ref(reference, None).unwrap()
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add issues that exist, given as `owner/repo#n`.
    pub fn with_issues(self, references: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for reference in references {
                let r = issue_ref(reference);
                state
                    .issues
                    .insert(r.to_string(), issue(&r.full_name(), r.number));
            }
        }
        self
    }

    /// Add an edge `source --kind--> target`. Both issues are created.
    pub fn with_edge(self, source: &str, kind: RelationKind, target: &str) -> Self {
        let api = self.with_issues(&[source, target]);
        {
            let s = issue_ref(source);
            let t = issue_ref(target);
            let mut state = api.state.lock().unwrap();
            state
                .edges
                .entry((s.to_string(), kind))
                .or_default()
                .push(issue(&t.full_name(), t.number));
        }
        api
    }

    pub fn with_permission(self, repository: &str, permission: RepoPermission) -> Self {
        self.state
            .lock()
            .unwrap()
            .permissions
            .insert(repository.to_string(), permission);
        self
    }

    pub fn fail_get_issue(self, reference: &str, failures: &[Failure]) -> Self {
        self.state
            .lock()
            .unwrap()
            .issue_failures
            .insert(issue_ref(reference).to_string(), failures.iter().copied().collect());
        self
    }

    pub fn fail_list(self, reference: &str, kind: RelationKind, failures: &[Failure]) -> Self {
        self.state
            .lock()
            .unwrap()
            .list_failures
            .insert((issue_ref(reference).to_string(), kind), failures.iter().copied().collect());
        self
    }

    /// Script failures for DELETE calls addressing the `target` issue.
    pub fn fail_remove(self, target: &str, failures: &[Failure]) -> Self {
        let id = issue(&issue_ref(target).full_name(), issue_ref(target).number).id;
        self.state
            .lock()
            .unwrap()
            .remove_failures
            .insert(id, failures.iter().copied().collect());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remove_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Remove { .. }))
            .collect()
    }

    /// Number of calls that reached the network layer.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn next_failure<K: std::hash::Hash + Eq>(
    failures: &mut HashMap<K, VecDeque<Failure>>,
    key: &K,
) -> Option<Failure> {
    failures.get_mut(key).and_then(VecDeque::pop_front)
}

#[async_trait]
impl DependencyApi for MockApi {
    async fn get_issue(&self, issue: &IssueRef) -> Result<Issue, AppError> {
        self.record(Call::GetIssue(issue.to_string()));
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let key = issue.to_string();
        if let Some(failure) = next_failure(&mut state.issue_failures, &key) {
            return Err(failure.into_error(ErrorKind::Issue));
        }
        state.issues.get(&key).cloned().ok_or_else(|| {
            AppError::from_status(404, ErrorKind::Issue, format!("issue {} not found", issue))
        })
    }

    async fn list_dependencies(
        &self,
        issue: &IssueRef,
        kind: RelationKind,
    ) -> Result<Vec<Issue>, AppError> {
        self.record(Call::ListDependencies(issue.to_string(), kind));
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        let key = (issue.to_string(), kind);
        if let Some(failure) = next_failure(&mut state.list_failures, &key) {
            return Err(failure.into_error(ErrorKind::Issue));
        }
        Ok(state.edges.get(&key).cloned().unwrap_or_default())
    }

    async fn repository_permission(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepoPermission, AppError> {
        let name = format!("{}/{}", owner, repo);
        self.record(Call::Permission(name.clone()));
        let state = self.state.lock().unwrap();
        Ok(state.permissions.get(&name).copied().unwrap_or(RepoPermission {
            push: true,
            pull: true,
            ..RepoPermission::default()
        }))
    }

    async fn remove_dependency(
        &self,
        source: &IssueRef,
        kind: RelationKind,
        target_id: u64,
    ) -> Result<(), AppError> {
        self.record(Call::Remove {
            source: source.to_string(),
            kind,
            target_id,
        });
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = next_failure(&mut state.remove_failures, &target_id) {
            return Err(failure.into_error(ErrorKind::Issue));
        }
        let edges = state.edges.entry((source.to_string(), kind)).or_default();
        let before = edges.len();
        edges.retain(|issue| issue.id != target_id);
        if edges.len() == before {
            return Err(AppError::from_status(404, ErrorKind::Issue, "dependency not found"));
        }
        Ok(())
    }
}
