use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

const CONFIG_FILE: &str = ".gh-deps.toml";
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Top-level configuration loaded from .gh-deps.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub-specific settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN / GH_TOKEN.
    pub token: Option<String>,

    /// API base URL, for GitHub Enterprise. Defaults to api.github.com.
    pub api_url: Option<String>,

    /// Repository used for bare issue numbers (owner/repo).
    pub default_repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Set to false to keep fetched snapshots in memory only.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override of the per-user cache directory.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from .gh-deps.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// then GITHUB_TOKEN, then GH_TOKEN.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }

    pub fn api_url(&self) -> String {
        self.github
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// Resolve the default repository: the `--repo` value (which clap already
    /// fills from GH_REPO), then config.
    pub fn default_repo(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| self.github.default_repo.clone())
            .filter(|repo| !repo.trim().is_empty())
    }

    /// Directory for on-disk cache entries, or None when disk caching is off
    /// or no per-user cache directory can be determined.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if !self.cache.enabled {
            return None;
        }
        self.cache.dir.clone().or_else(|| {
            directories::ProjectDirs::from("dev", "gh-deps", "gh-deps")
                .map(|dirs| dirs.cache_dir().to_path_buf())
        })
    }
}
