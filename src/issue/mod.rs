pub mod types;

pub use types::{DependencyRelation, DependencySnapshot, Issue, IssueRef, Label, RelationKind, User};

use crate::error::AppError;

/// Split an `owner/repo` string into its two halves.
pub fn parse_repo(input: &str) -> Result<(String, String), AppError> {
    let invalid = || {
        AppError::validation(format!("invalid repository '{}': expected owner/repo", input))
            .with_suggestion("Pass the repository as owner/repo, e.g. octo-org/octo-repo")
    };
    let (owner, repo) = input.trim().split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(invalid());
    }
    Ok((owner.to_string(), repo.to_string()))
}

/// Parse an issue designator into an `IssueRef`.
///
/// Accepted forms:
/// - `123` or `#123`, resolved against `default_repo`
/// - `owner/repo#123`
/// - `https://github.com/owner/repo/issues/123`
pub fn parse_issue_ref(input: &str, default_repo: Option<&str>) -> Result<IssueRef, AppError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::validation("issue reference is empty"));
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        return parse_issue_url(input);
    }

    if let Some((repo_part, number_part)) = input.split_once('#') {
        if !repo_part.is_empty() {
            let (owner, repo) = parse_repo(repo_part)?;
            let number = parse_issue_number(number_part, input)?;
            return IssueRef::new(owner, repo, number);
        }
    }

    let number = parse_issue_number(input.trim_start_matches('#'), input)?;
    let default_repo = default_repo.ok_or_else(|| {
        AppError::validation(format!(
            "issue '{}' has no repository and no default repository is set",
            input
        ))
        .with_suggestion("Use owner/repo#number or pass --repo owner/repo")
    })?;
    let (owner, repo) = parse_repo(default_repo)?;
    IssueRef::new(owner, repo, number)
}

/// Parse a comma-separated list of issue designators, preserving order.
pub fn parse_issue_list(
    input: &str,
    default_repo: Option<&str>,
) -> Result<Vec<IssueRef>, AppError> {
    let refs = input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_issue_ref(part, default_repo))
        .collect::<Result<Vec<_>, _>>()?;
    if refs.is_empty() {
        return Err(AppError::validation("no target issues given"));
    }
    Ok(refs)
}

fn parse_issue_number(number: &str, original: &str) -> Result<u64, AppError> {
    let parsed = number.trim().parse::<u64>().map_err(|_| {
        AppError::validation(format!("invalid issue number in '{}'", original))
    })?;
    if parsed == 0 {
        return Err(AppError::validation(format!(
            "issue number must be positive in '{}'",
            original
        )));
    }
    Ok(parsed)
}

fn parse_issue_url(url: &str) -> Result<IssueRef, AppError> {
    let invalid = || {
        AppError::validation(format!("invalid issue URL: {}", url))
            .with_suggestion("Expected https://github.com/owner/repo/issues/123")
    };
    let parsed = reqwest::Url::parse(url).map_err(|_| invalid())?;

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty())
        .collect();

    match segments.as_slice() {
        [owner, repo, "issues", number] => {
            let number = parse_issue_number(number, url)?;
            IssueRef::new(*owner, *repo, number)
        }
        _ => Err(invalid()),
    }
}
