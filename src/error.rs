use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Machine-readable category of a failure.
///
/// The CLI host maps these onto process exit codes via [`AppError::exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Permission,
    Network,
    Validation,
    Api,
    Repository,
    Issue,
    Internal,
}

impl ErrorKind {
    /// Map an HTTP status code onto an error kind.
    ///
    /// `not_found` decides what a 404 means for the endpoint being called:
    /// a missing issue and a missing repository are different failures.
    pub fn from_status(status: u16, not_found: ErrorKind) -> ErrorKind {
        match status {
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Permission,
            404 => not_found,
            422 => ErrorKind::Validation,
            429 | 500..=599 => ErrorKind::Api,
            _ => ErrorKind::Api,
        }
    }

    /// Remediation hint attached to every error of this kind.
    fn default_suggestion(self) -> &'static str {
        match self {
            ErrorKind::Authentication => {
                "Run `gh auth login` or export a valid GITHUB_TOKEN"
            }
            ErrorKind::Permission => {
                "Check that you have write access to the source repository"
            }
            ErrorKind::Network => "Check your network connection and try again",
            ErrorKind::Validation => "Check the command arguments and issue references",
            ErrorKind::Api => "GitHub may be degraded; wait a moment and try again",
            ErrorKind::Repository => "Check the repository name and that it is visible to you",
            ErrorKind::Issue => "Run `gh-deps list <issue>` to see current dependencies",
            ErrorKind::Internal => "Re-run with RUST_LOG=debug and report the output",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Permission => "permission",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Api => "api",
            ErrorKind::Repository => "repository",
            ErrorKind::Issue => "issue",
            ErrorKind::Internal => "internal",
        };
        f.write_str(tag)
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type shared by every layer of the tool.
///
/// Built where the failure happens, then enriched with context and
/// suggestions on the way up. Never mutated once handed to the caller.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<BoxError>,
    status: Option<u16>,
    context: Vec<(String, String)>,
    suggestions: Vec<String>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            status: None,
            context: Vec::new(),
            suggestions: vec![kind.default_suggestion().to_string()],
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn issue(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Issue, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Error for a non-2xx HTTP response.
    pub fn from_status(status: u16, not_found: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_status(status, not_found), message).with_status(status)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Wrap this error under a new message, keeping kind, status, context
    /// and suggestions so exit-code mapping is unaffected.
    pub fn wrap(self, message: impl Into<String>) -> Self {
        let kind = self.kind;
        let status = self.status;
        let context = self.context.clone();
        let suggestions = self.suggestions.clone();
        Self {
            kind,
            message: message.into(),
            cause: Some(Box::new(self)),
            status,
            context,
            suggestions,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Value of the first context entry under `key`.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Process exit code for the CLI host.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::Validation => 2,
            ErrorKind::Authentication => 3,
            ErrorKind::Permission => 4,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let code = status.as_u16();
            return AppError::from_status(
                code,
                ErrorKind::Api,
                format!("GitHub API returned {}", status),
            )
            .with_cause(err);
        }
        if err.is_timeout() {
            return AppError::network("request to GitHub timed out").with_cause(err);
        }
        if err.is_decode() {
            return AppError::new(ErrorKind::Api, "unexpected response body from GitHub")
                .with_cause(err);
        }
        AppError::network("could not reach GitHub").with_cause(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::validation(err.to_string())
            .with_cause(err)
            .with_suggestion("Fix or remove .gh-deps.toml")
    }
}
