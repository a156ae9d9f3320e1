use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Canonical reference to an issue: `owner/repo#number`.
/// Built through `IssueRef::new` or `issue::parse_issue_ref`, both of which
/// reject a zero issue number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        number: u64,
    ) -> Result<Self, AppError> {
        if number == 0 {
            return Err(AppError::validation("issue number must be positive"));
        }
        Ok(Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        })
    }

    /// `owner/repo`, or an empty string while either half is missing.
    pub fn full_name(&self) -> String {
        if self.owner.is_empty() || self.repo.is_empty() {
            String::new()
        } else {
            format!("{}/{}", self.owner, self.repo)
        }
    }

    /// Whether owner, repo and number are all usable for an API call.
    pub fn is_well_formed(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty() && self.number > 0
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Direction of a dependency edge, seen from the source issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The source cannot complete until the target does.
    BlockedBy,
    /// The target cannot complete until the source does.
    Blocks,
}

impl RelationKind {
    /// Path segment used by the dependencies REST endpoints.
    pub fn api_segment(self) -> &'static str {
        match self {
            RelationKind::BlockedBy => "blocked_by",
            RelationKind::Blocks => "blocking",
        }
    }

    /// Arrow used when previewing an edge: `source <arrow> target`.
    pub fn arrow(self) -> &'static str {
        match self {
            RelationKind::BlockedBy => "<- blocked by <-",
            RelationKind::Blocks => "-> blocks ->",
        }
    }

    /// Negative phrase for "relationship not found" messages.
    pub fn negated_phrase(self) -> &'static str {
        match self {
            RelationKind::BlockedBy => "is not blocked by",
            RelationKind::Blocks => "does not block",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::BlockedBy => write!(f, "blocked-by"),
            RelationKind::Blocks => write!(f, "blocks"),
        }
    }
}

impl FromStr for RelationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocked-by" | "blocked_by" => Ok(RelationKind::BlockedBy),
            "blocks" => Ok(RelationKind::Blocks),
            other => Err(AppError::validation(format!(
                "invalid relationship kind '{}': expected 'blocked-by' or 'blocks'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// An issue as returned by the GitHub API. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Database id, used to address dependency edges.
    pub id: u64,
    pub number: u64,
    pub title: String,
    /// `open`, `closed`, ...
    pub state: String,
    pub assignees: Vec<User>,
    pub labels: Vec<Label>,
    pub url: String,
    /// `owner/repo` the issue lives in.
    pub repository: String,
}

impl Issue {
    /// Reference to this issue, when its repository name is usable.
    pub fn to_ref(&self) -> Option<IssueRef> {
        let (owner, repo) = self.repository.split_once('/')?;
        IssueRef::new(owner, repo, self.number).ok()
    }
}

/// One directed edge in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRelation {
    pub issue: Issue,
    pub kind: RelationKind,
    pub repository: String,
}

impl DependencyRelation {
    /// Whether this edge points at `target`.
    ///
    /// Matches on number and repository only. GitHub treats repository
    /// names case-insensitively, so the comparison does too.
    pub fn matches(&self, target: &IssueRef) -> bool {
        self.issue.number == target.number
            && self.repository.eq_ignore_ascii_case(&target.full_name())
    }

    pub fn new(issue: Issue, kind: RelationKind) -> Self {
        let repository = issue.repository.clone();
        Self {
            issue,
            kind,
            repository,
        }
    }
}

/// Every dependency edge of one issue at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySnapshot {
    pub source_issue: Issue,
    pub blocked_by: Vec<DependencyRelation>,
    pub blocking: Vec<DependencyRelation>,
    pub fetched_at: DateTime<Utc>,
    pub total_count: usize,
}

impl DependencySnapshot {
    pub fn new(
        source_issue: Issue,
        blocked_by: Vec<Issue>,
        blocking: Vec<Issue>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let blocked_by: Vec<_> = blocked_by
            .into_iter()
            .map(|issue| DependencyRelation::new(issue, RelationKind::BlockedBy))
            .collect();
        let blocking: Vec<_> = blocking
            .into_iter()
            .map(|issue| DependencyRelation::new(issue, RelationKind::Blocks))
            .collect();
        let total_count = blocked_by.len() + blocking.len();
        Self {
            source_issue,
            blocked_by,
            blocking,
            fetched_at,
            total_count,
        }
    }

    pub fn relations(&self, kind: RelationKind) -> &[DependencyRelation] {
        match kind {
            RelationKind::BlockedBy => &self.blocked_by,
            RelationKind::Blocks => &self.blocking,
        }
    }

    /// The edge of `kind` pointing at `target`, if present.
    pub fn find(&self, kind: RelationKind, target: &IssueRef) -> Option<&DependencyRelation> {
        self.relations(kind)
            .iter()
            .find(|relation| relation.matches(target))
    }

    /// All edges, blocked-by first, each list in API order.
    pub fn all_relations(&self) -> impl Iterator<Item = &DependencyRelation> {
        self.blocked_by.iter().chain(self.blocking.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}
