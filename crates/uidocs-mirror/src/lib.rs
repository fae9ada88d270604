//! Local mirror of a component library's documentation.
//!
//! The mirror is a sparse, shallow git checkout that only materializes the
//! documentation directories. Query handlers read files from
//! [`DocsMirror::content_root`]; the server only cares whether
//! [`DocsMirror::ensure_ready`] succeeded and what [`DocsMirror::status`]
//! reports.

pub mod backoff;
pub mod config;
pub mod errors;
pub mod git;
pub mod local;
pub mod mirror;
pub mod repo;

pub use backoff::backoff_durations;
pub use config::MirrorConfig;
pub use errors::{MirrorError, Result};
pub use git::GitCli;
pub use local::LocalDocsDir;
pub use mirror::{DocsMirror, GitMirror, MirrorStatus, SyncOutcome};
