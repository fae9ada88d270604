// ABOUTME: Configuration for the documentation mirror
// ABOUTME: Upstream repository, sparse paths, cache location and sync resilience settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{MirrorError, Result};

/// Where the documentation comes from and how it is kept fresh.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    /// Upstream git repository holding the docs
    #[serde(default = "default_repo_url")]
    pub repo_url: String,

    /// Branch to track (default: main)
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Directories materialized by the sparse checkout
    #[serde(default = "default_sparse_paths")]
    pub sparse_paths: Vec<String>,

    /// Component docs directory, relative to the checkout root
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Where the checkout lives on disk
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Serve an existing directory instead of cloning
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Upper bound for a single git invocation (default: 120s)
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,

    /// Extra attempts after a failed sync (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First retry delay, doubled per attempt (default: 500ms)
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// A checkout younger than this is not fetched again (default: 1h)
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Background refresh period; 0 disables (default: 6h)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            branch: default_branch(),
            sparse_paths: default_sparse_paths(),
            content_dir: default_content_dir(),
            cache_dir: default_cache_dir(),
            local_path: None,
            git_timeout_secs: default_git_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            stale_after_secs: default_stale_after(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl MirrorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.local_path.is_none() {
            if self.repo_url.trim().is_empty() {
                return Err(MirrorError::InvalidConfig("repo_url is empty".into()));
            }
            if self.branch.trim().is_empty() || self.branch.starts_with('-') {
                return Err(MirrorError::InvalidConfig(format!(
                    "invalid branch name: {:?}",
                    self.branch
                )));
            }
            if self.sparse_paths.is_empty() {
                return Err(MirrorError::InvalidConfig(
                    "at least one sparse path is required".into(),
                ));
            }
        }
        if self.git_timeout_secs == 0 {
            return Err(MirrorError::InvalidConfig(
                "git_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Directory the query handlers read component files from.
    pub fn content_root(&self) -> PathBuf {
        match &self.local_path {
            Some(path) => path.clone(),
            None => self.cache_dir.join(&self.content_dir),
        }
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

fn default_repo_url() -> String {
    "https://github.com/shadcn-ui/ui.git".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_sparse_paths() -> Vec<String> {
    vec![default_content_dir()]
}

fn default_content_dir() -> String {
    "apps/www/content/docs/components".to_string()
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("uidocs")
        .join("mirror")
}

fn default_git_timeout() -> u64 {
    120
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_stale_after() -> u64 {
    3600
}

fn default_refresh_interval() -> u64 {
    6 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: MirrorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.branch, "main");
        assert_eq!(config.sparse_paths, vec![config.content_dir.clone()]);
        assert!(config.cache_dir.ends_with("uidocs/mirror"));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(21600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_content_root_prefers_local_path() {
        let mut config = MirrorConfig::default();
        assert!(config
            .content_root()
            .ends_with("apps/www/content/docs/components"));

        config.local_path = Some(PathBuf::from("/srv/docs"));
        assert_eq!(config.content_root(), PathBuf::from("/srv/docs"));
    }

    #[test]
    fn test_validate_rejects_option_like_branch() {
        let config = MirrorConfig {
            branch: "--upload-pack=evil".into(),
            ..MirrorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MirrorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_refresh_interval_disables_refresh() {
        let config = MirrorConfig {
            refresh_interval_secs: 0,
            ..MirrorConfig::default()
        };
        assert_eq!(config.refresh_interval(), None);
    }
}
