// ABOUTME: DocsMirror trait plus the git-backed implementation
// ABOUTME: Clones sparsely on first use, fast-forwards when stale, re-clones corrupt checkouts

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::repo::{self, CheckoutInspection};
use crate::{backoff_durations, GitCli, MirrorConfig, MirrorError, Result};

/// Result of a successful [`DocsMirror::ensure_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Commit the content root reflects, when the source is versioned.
    pub revision: Option<String>,
    /// True when the revision moved during this call.
    pub changed: bool,
}

/// Introspection snapshot reported by `status` and the mirror resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorStatus {
    pub source: String,
    pub content_root: PathBuf,
    pub present: bool,
    pub structurally_valid: bool,
    pub revision: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[async_trait]
pub trait DocsMirror: Send + Sync {
    /// Make the content root usable, syncing from upstream when needed.
    async fn ensure_ready(&self) -> Result<SyncOutcome>;

    async fn status(&self) -> MirrorStatus;

    fn content_root(&self) -> PathBuf;
}

#[derive(Debug, Default)]
struct SyncState {
    synced_at: Option<(Instant, DateTime<Utc>)>,
    revision: Option<String>,
    last_checked_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shallow, sparse clone of the upstream docs repository.
pub struct GitMirror {
    config: MirrorConfig,
    git: GitCli,
    sync_lock: tokio::sync::Mutex<()>,
    state: Mutex<SyncState>,
}

impl GitMirror {
    pub fn new(config: MirrorConfig) -> Self {
        let git = GitCli::new(config.git_timeout());
        Self {
            config,
            git,
            sync_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn with_git(mut self, git: GitCli) -> Self {
        self.git = git;
        self
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    fn checkout_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    async fn inspect(&self) -> Result<CheckoutInspection> {
        let checkout = self.checkout_dir().to_path_buf();
        let content_dir = self.config.content_dir.clone();
        let inspection =
            tokio::task::spawn_blocking(move || repo::inspect_checkout(&checkout, &content_dir))
                .await?;
        Ok(inspection)
    }

    fn is_fresh(&self, inspection: &CheckoutInspection) -> bool {
        if !inspection.structurally_valid {
            return false;
        }
        let state = self.state.lock();
        match state.synced_at {
            Some((at, _)) => at.elapsed() < self.config.stale_after(),
            None => false,
        }
    }

    async fn sync_once(&self) -> Result<String> {
        let inspection = self.inspect().await?;
        let checkout = self.checkout_dir();

        if inspection.structurally_valid {
            self.update(checkout).await?;
        } else {
            if inspection.present {
                warn!(
                    path = %checkout.display(),
                    problem = inspection.problem.as_deref().unwrap_or("unknown"),
                    "Discarding unusable checkout"
                );
                tokio::fs::remove_dir_all(checkout).await?;
            }
            self.clone_fresh(checkout).await?;
        }

        let path = checkout.to_path_buf();
        let revision = tokio::task::spawn_blocking(move || repo::head_revision(&path)).await??;

        if !checkout.join(&self.config.content_dir).is_dir() {
            return Err(MirrorError::MissingDirectory(self.config.content_dir.clone()));
        }
        Ok(revision)
    }

    async fn clone_fresh(&self, checkout: &Path) -> Result<()> {
        let parent = checkout
            .parent()
            .ok_or_else(|| MirrorError::InvalidConfig("cache_dir has no parent".into()))?;
        tokio::fs::create_dir_all(parent).await?;

        let target = checkout
            .file_name()
            .ok_or_else(|| MirrorError::InvalidConfig("cache_dir has no final component".into()))?
            .to_string_lossy();
        info!(url = %self.config.repo_url, branch = %self.config.branch, "Cloning docs mirror");
        self.git
            .run(
                parent,
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--filter=blob:none",
                    "--sparse",
                    "--branch",
                    self.config.branch.as_str(),
                    "--",
                    self.config.repo_url.as_str(),
                    &*target,
                ],
            )
            .await?;
        self.apply_sparse_paths(checkout).await
    }

    async fn update(&self, checkout: &Path) -> Result<()> {
        debug!(path = %checkout.display(), "Fetching docs mirror");
        self.apply_sparse_paths(checkout).await?;
        self.git
            .run(checkout, &["fetch", "--depth", "1", "origin", self.config.branch.as_str()])
            .await?;
        self.git
            .run(checkout, &["reset", "--hard", "FETCH_HEAD"])
            .await?;
        Ok(())
    }

    async fn apply_sparse_paths(&self, checkout: &Path) -> Result<()> {
        let mut args = vec!["sparse-checkout", "set", "--"];
        args.extend(self.config.sparse_paths.iter().map(String::as_str));
        self.git.run(checkout, &args).await?;
        Ok(())
    }
}

#[async_trait]
impl DocsMirror for GitMirror {
    async fn ensure_ready(&self) -> Result<SyncOutcome> {
        self.config.validate()?;
        let _guard = self.sync_lock.lock().await;

        let inspection = self.inspect().await?;
        self.state.lock().last_checked_at = Some(Utc::now());
        if self.is_fresh(&inspection) {
            debug!("Docs mirror is fresh, skipping fetch");
            return Ok(SyncOutcome {
                revision: inspection.revision,
                changed: false,
            });
        }

        let previous = inspection.revision;
        let mut last_error = None;
        let delays = std::iter::once(None)
            .chain(backoff_durations(self.config.max_retries, self.config.retry_base_delay()).map(Some));

        for (attempt, delay) in delays.enumerate() {
            if let Some(delay) = delay {
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Retrying docs sync");
                tokio::time::sleep(delay).await;
            }

            match self.sync_once().await {
                Ok(revision) => {
                    let changed = previous.as_deref() != Some(revision.as_str());
                    let mut state = self.state.lock();
                    state.synced_at = Some((Instant::now(), Utc::now()));
                    state.revision = Some(revision.clone());
                    state.last_error = None;
                    info!(%revision, changed, "Docs mirror ready");
                    return Ok(SyncOutcome {
                        revision: Some(revision),
                        changed,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Docs sync failed");
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let err = last_error.unwrap_or_else(|| MirrorError::InvalidConfig("no sync attempted".into()));
        self.state.lock().last_error = Some(err.to_string());
        Err(err)
    }

    async fn status(&self) -> MirrorStatus {
        let inspection = match self.inspect().await {
            Ok(inspection) => inspection,
            Err(e) => CheckoutInspection {
                problem: Some(e.to_string()),
                ..Default::default()
            },
        };

        let mut state = self.state.lock();
        state.last_checked_at = Some(Utc::now());
        MirrorStatus {
            source: format!("{}#{}", self.config.repo_url, self.config.branch),
            content_root: self.content_root(),
            present: inspection.present,
            structurally_valid: inspection.structurally_valid,
            revision: inspection.revision.or_else(|| state.revision.clone()),
            last_checked_at: state.last_checked_at,
            last_synced_at: state.synced_at.map(|(_, at)| at),
            error: state.last_error.clone().or(inspection.problem),
        }
    }

    fn content_root(&self) -> PathBuf {
        self.config.content_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn offline_config(dir: &Path) -> MirrorConfig {
        MirrorConfig {
            cache_dir: dir.join("checkout"),
            max_retries: 2,
            retry_base_delay_ms: 1,
            ..MirrorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_status_of_missing_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = GitMirror::new(offline_config(dir.path()));
        let status = mirror.status().await;
        assert!(!status.present);
        assert!(!status.structurally_valid);
        assert!(status.revision.is_none());
        assert!(status.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_git_fails_without_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = GitMirror::new(offline_config(dir.path())).with_git(
            GitCli::new(Duration::from_secs(5)).with_program("definitely-not-a-git-binary"),
        );
        let err = mirror.ensure_ready().await.unwrap_err();
        assert!(matches!(err, MirrorError::GitUnavailable));

        let status = mirror.status().await;
        assert!(status.error.unwrap().contains("git executable"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_sync() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.sparse_paths.clear();
        let mirror = GitMirror::new(config);
        assert!(matches!(
            mirror.ensure_ready().await,
            Err(MirrorError::InvalidConfig(_))
        ));
    }
}
