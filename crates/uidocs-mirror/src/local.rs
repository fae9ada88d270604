use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::mirror::{DocsMirror, MirrorStatus, SyncOutcome};
use crate::{MirrorError, Result};

/// Serves a directory that is already on disk, e.g. a local checkout.
pub struct LocalDocsDir {
    root: PathBuf,
    last_checked: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl LocalDocsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_checked: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DocsMirror for LocalDocsDir {
    async fn ensure_ready(&self) -> Result<SyncOutcome> {
        *self.last_checked.lock() = Some(Utc::now());
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(SyncOutcome {
                revision: None,
                changed: false,
            }),
            _ => Err(MirrorError::MissingDirectory(
                self.root.display().to_string(),
            )),
        }
    }

    async fn status(&self) -> MirrorStatus {
        let now = Utc::now();
        *self.last_checked.lock() = Some(now);
        let meta = tokio::fs::metadata(&self.root).await.ok();
        let is_dir = meta.as_ref().is_some_and(|m| m.is_dir());
        MirrorStatus {
            source: self.root.display().to_string(),
            content_root: self.root.clone(),
            present: meta.is_some(),
            structurally_valid: is_dir,
            revision: None,
            last_checked_at: Some(now),
            last_synced_at: None,
            error: (!is_dir).then(|| format!("{} is not a directory", self.root.display())),
        }
    }

    fn content_root(&self) -> PathBuf {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_directory_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalDocsDir::new(dir.path());
        let outcome = local.ensure_ready().await.unwrap();
        assert!(!outcome.changed);
        assert!(local.status().await.structurally_valid);
    }

    #[tokio::test]
    async fn test_missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalDocsDir::new(dir.path().join("nope"));
        assert!(matches!(
            local.ensure_ready().await,
            Err(MirrorError::MissingDirectory(_))
        ));
        let status = local.status().await;
        assert!(!status.present);
        assert!(status.error.is_some());
    }
}
