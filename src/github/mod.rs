pub mod fetcher;
#[cfg(test)]
pub mod testing;

pub use fetcher::DependencyFetcher;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{AppError, ErrorKind};
use crate::issue::{Issue, IssueRef, Label, RelationKind, User};

const USER_AGENT: &str = "gh-deps";
const API_VERSION: &str = "2022-11-28";

/// Caller's access level on a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RepoPermission {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub maintain: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

impl RepoPermission {
    pub fn can_write(&self) -> bool {
        self.push || self.maintain || self.admin
    }
}

/// Remote operations the dependency engine needs.
/// Implementations must be Send + Sync so reads can run concurrently.
#[async_trait]
pub trait DependencyApi: Send + Sync {
    /// GET a single issue.
    async fn get_issue(&self, issue: &IssueRef) -> Result<Issue, AppError>;

    /// GET the issues on one side of `issue`'s dependency edges.
    async fn list_dependencies(
        &self,
        issue: &IssueRef,
        kind: RelationKind,
    ) -> Result<Vec<Issue>, AppError>;

    /// GET the caller's permissions on a repository.
    async fn repository_permission(&self, owner: &str, repo: &str)
        -> Result<RepoPermission, AppError>;

    /// DELETE one dependency edge of `source`, addressed by the target's
    /// issue id.
    async fn remove_dependency(
        &self,
        source: &IssueRef,
        kind: RelationKind,
        target_id: u64,
    ) -> Result<(), AppError>;
}

/// `DependencyApi` backed by the GitHub REST API.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct IssueResponse {
    id: u64,
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    assignees: Vec<User>,
    #[serde(default)]
    labels: Vec<Label>,
    html_url: String,
    repository_url: String,
}

impl IssueResponse {
    fn into_issue(self) -> Issue {
        // repository_url is ".../repos/{owner}/{repo}"
        let repository = self
            .repository_url
            .rsplit_once("/repos/")
            .map(|(_, name)| name.trim_end_matches('/').to_string())
            .unwrap_or_default();
        Issue {
            id: self.id,
            number: self.number,
            title: self.title,
            state: self.state,
            assignees: self.assignees,
            labels: self.labels,
            url: self.html_url,
            repository,
        }
    }
}

#[derive(Deserialize)]
struct RepositoryResponse {
    #[serde(default)]
    permissions: Option<RepoPermission>,
}

impl GitHubClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AppError::internal("failed to build HTTP client").with_cause(err))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Build a client from configuration. Fails with an authentication
    /// error before any request when no token is available.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let token = config.github_token().ok_or_else(|| {
            AppError::authentication("GitHub token not found")
                .with_suggestion("Set GITHUB_TOKEN or GH_TOKEN, or add token to .gh-deps.toml")
        })?;
        Self::new(config.api_url(), token)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request and turn non-2xx statuses into typed errors.
    async fn send(
        &self,
        builder: RequestBuilder,
        not_found: ErrorKind,
        what: &str,
    ) -> Result<Response, AppError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "GitHub API error response");
        Err(status_error(status, not_found, what))
    }
}

fn status_error(status: StatusCode, not_found: ErrorKind, what: &str) -> AppError {
    let message = match status.as_u16() {
        401 => format!("authentication failed while fetching {}", what),
        403 => format!("access denied to {}", what),
        404 => format!("{} not found", what),
        429 => format!("rate limited while accessing {}", what),
        _ => format!("GitHub API returned {} for {}", status, what),
    };
    AppError::from_status(status.as_u16(), not_found, message)
}

#[async_trait]
impl DependencyApi for GitHubClient {
    #[instrument(skip(self), fields(issue = %issue))]
    async fn get_issue(&self, issue: &IssueRef) -> Result<Issue, AppError> {
        let path = format!("/repos/{}/{}/issues/{}", issue.owner, issue.repo, issue.number);
        let response = self
            .send(self.request(Method::GET, &path), ErrorKind::Issue, &format!("issue {}", issue))
            .await?;
        let body = response.json::<IssueResponse>().await?;
        debug!(title = %body.title, "received issue");
        Ok(body.into_issue())
    }

    #[instrument(skip(self), fields(issue = %issue, kind = %kind))]
    async fn list_dependencies(
        &self,
        issue: &IssueRef,
        kind: RelationKind,
    ) -> Result<Vec<Issue>, AppError> {
        let path = format!(
            "/repos/{}/{}/issues/{}/dependencies/{}",
            issue.owner,
            issue.repo,
            issue.number,
            kind.api_segment()
        );
        let response = self
            .send(
                self.request(Method::GET, &path).query(&[("per_page", "100")]),
                ErrorKind::Issue,
                &format!("{} dependencies of {}", kind, issue),
            )
            .await?;
        let body = response.json::<Vec<IssueResponse>>().await?;
        debug!(count = body.len(), "received dependencies");
        Ok(body.into_iter().map(IssueResponse::into_issue).collect())
    }

    #[instrument(skip(self))]
    async fn repository_permission(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<RepoPermission, AppError> {
        let path = format!("/repos/{}/{}", owner, repo);
        let response = self
            .send(
                self.request(Method::GET, &path),
                ErrorKind::Repository,
                &format!("repository {}/{}", owner, repo),
            )
            .await?;
        let body = response.json::<RepositoryResponse>().await?;
        Ok(body.permissions.unwrap_or_default())
    }

    #[instrument(skip(self), fields(source = %source, kind = %kind))]
    async fn remove_dependency(
        &self,
        source: &IssueRef,
        kind: RelationKind,
        target_id: u64,
    ) -> Result<(), AppError> {
        let path = format!(
            "/repos/{}/{}/issues/{}/dependencies/{}/{}",
            source.owner,
            source.repo,
            source.number,
            kind.api_segment(),
            target_id
        );
        self.send(
            self.request(Method::DELETE, &path),
            ErrorKind::Issue,
            &format!("{} dependency of {}", kind, source),
        )
        .await?;
        debug!("dependency removed");
        Ok(())
    }
}
