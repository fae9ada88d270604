use std::path::Path;

use git2::Repository;

use crate::Result;

/// What is on disk at the checkout location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutInspection {
    pub present: bool,
    pub structurally_valid: bool,
    pub revision: Option<String>,
    pub problem: Option<String>,
}

/// Commit id `HEAD` points at.
pub fn head_revision(path: &Path) -> Result<String> {
    let repo = Repository::open(path)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// Check that `checkout` is a non-bare repository with a resolvable `HEAD`
/// and that `content_dir` exists inside its working tree.
pub fn inspect_checkout(checkout: &Path, content_dir: &str) -> CheckoutInspection {
    if !checkout.exists() {
        return CheckoutInspection::default();
    }

    let mut inspection = CheckoutInspection {
        present: true,
        ..Default::default()
    };

    let repo = match Repository::open(checkout) {
        Ok(repo) => repo,
        Err(e) => {
            inspection.problem = Some(format!("not a git repository: {}", e.message()));
            return inspection;
        }
    };

    if repo.is_bare() {
        inspection.problem = Some("repository is bare".into());
        return inspection;
    }

    match repo.head().and_then(|head| head.peel_to_commit()) {
        Ok(commit) => inspection.revision = Some(commit.id().to_string()),
        Err(e) => {
            inspection.problem = Some(format!("HEAD does not resolve: {}", e.message()));
            return inspection;
        }
    }

    if !checkout.join(content_dir).is_dir() {
        inspection.problem = Some(format!("{} is missing from the checkout", content_dir));
        return inspection;
    }

    inspection.structurally_valid = true;
    inspection
}
