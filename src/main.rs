use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use gh_deps::cache::ResponseCache;
use gh_deps::config::Config;
use gh_deps::error::AppError;
use gh_deps::github::{DependencyFetcher, GitHubClient};
use gh_deps::issue::{parse_issue_list, parse_issue_ref, RelationKind};
use gh_deps::remove::{RemovalOutcome, RemoveOptions, Remover, StdinConfirm};
use gh_deps::report;

/// gh-deps: manage "blocked by" / "blocks" dependencies between GitHub issues.
#[derive(Parser, Debug)]
#[command(name = "gh-deps", version, about)]
struct Cli {
    /// Repository used for bare issue numbers (owner/repo)
    #[arg(short = 'R', long, global = true, env = "GH_REPO")]
    repo: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove dependency relationships from an issue
    #[command(group(
        ArgGroup::new("targets")
            .required(true)
            .args(["blocked_by", "blocks", "all"])
    ))]
    Remove {
        /// Source issue: 123, owner/repo#123 or an issue URL
        issue: String,

        /// Comma-separated issues that block the source issue
        #[arg(long)]
        blocked_by: Option<String>,

        /// Comma-separated issues the source issue blocks
        #[arg(long)]
        blocks: Option<String>,

        /// Remove every relationship of the source issue
        #[arg(long)]
        all: bool,

        /// Show what would be removed without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List the dependencies of an issue
    List {
        /// Issue: 123, owner/repo#123 or an issue URL
        issue: String,
    },

    /// Maintain the local response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Delete expired and unreadable entries
    Clean,
    /// Delete every entry
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report::print_error(&err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    info!("loading configuration");
    let config = Config::load()?;
    let default_repo = config.default_repo(cli.repo.as_deref());
    let default_repo = default_repo.as_deref();

    match cli.command {
        Command::Remove {
            issue,
            blocked_by,
            blocks,
            all,
            dry_run,
            force,
        } => {
            let _span = info_span!("remove", issue = %issue).entered();
            let source = parse_issue_ref(&issue, default_repo)?;
            let (kind, targets) = match (blocked_by, blocks) {
                (Some(list), None) => (RelationKind::BlockedBy, list),
                (None, Some(list)) => (RelationKind::Blocks, list),
                _ if all => (RelationKind::BlockedBy, String::new()),
                _ => {
                    return Err(AppError::validation(
                        "pass exactly one of --blocked-by, --blocks or --all",
                    ))
                }
            };
            let opts = RemoveOptions { dry_run, force };
            debug!(source = %source, all, dry_run, force, "parsed remove command");

            let fetcher = build_fetcher(&config)?;
            let mut confirm = StdinConfirm;
            let mut remover = Remover::new(&fetcher, &mut confirm);
            let outcome = if all {
                remover.remove_all(&source, opts).await?
            } else {
                let targets = parse_issue_list(&targets, default_repo)?;
                remover.remove(&source, &targets, kind, opts).await?
            };

            report::print_outcome(&outcome);
            if let RemovalOutcome::Completed(report) = outcome {
                info!(removed = report.removed_count(), failed = report.failed_count(), "done");
                report.into_result()?;
            }
            Ok(())
        }
        Command::List { issue } => {
            let source = parse_issue_ref(&issue, default_repo)?;
            let fetcher = build_fetcher(&config)?;
            let snapshot = fetcher.fetch(&source).await?;
            report::print_dependencies(&snapshot);
            Ok(())
        }
        Command::Cache { action } => {
            let cache = build_cache(&config);
            let removed = match action {
                CacheAction::Clean => cache.sweep()?,
                CacheAction::Clear => cache.clear()?,
            };
            println!("Removed {} cache entries.", removed);
            Ok(())
        }
    }
}

fn build_cache(config: &Config) -> ResponseCache {
    match config.cache_dir() {
        Some(dir) => {
            debug!(dir = %dir.display(), "using on-disk cache");
            ResponseCache::on_disk(dir)
        }
        None => ResponseCache::in_memory(),
    }
}

fn build_fetcher(config: &Config) -> Result<DependencyFetcher<GitHubClient>, AppError> {
    let client = GitHubClient::from_config(config)?;
    Ok(DependencyFetcher::new(client, build_cache(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_remove_requires_a_target_flag() {
        assert!(Cli::try_parse_from(["gh-deps", "remove", "123"]).is_err());
        assert!(
            Cli::try_parse_from(["gh-deps", "remove", "123", "--all", "--blocks", "4"]).is_err()
        );
    }

    #[test]
    fn test_remove_flags() {
        let cli = Cli::try_parse_from([
            "gh-deps",
            "remove",
            "octo/repo#123",
            "--blocked-by",
            "456,other/repo#7",
            "--dry-run",
            "-f",
        ])
        .unwrap();
        match cli.command {
            Command::Remove {
                issue,
                blocked_by,
                dry_run,
                force,
                all,
                ..
            } => {
                assert_eq!(issue, "octo/repo#123");
                assert_eq!(blocked_by.as_deref(), Some("456,other/repo#7"));
                assert!(dry_run && force && !all);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_repo_flag_is_global() {
        let cli = Cli::try_parse_from(["gh-deps", "list", "5", "-R", "octo/repo"]).unwrap();
        assert_eq!(cli.repo.as_deref(), Some("octo/repo"));
    }

    #[test]
    fn test_cache_subcommand() {
        let cli = Cli::try_parse_from(["gh-deps", "cache", "clean"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Clean
            }
        ));
    }
}
