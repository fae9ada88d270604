use std::fs;
use std::path::Path;

use git2::{Repository, Signature};
use tempfile::tempdir;
use uidocs_mirror::repo::{head_revision, inspect_checkout};

const CONTENT_DIR: &str = "apps/www/content/docs/components";

fn write_file<P: AsRef<Path>>(p: P, content: &str) {
    fs::create_dir_all(p.as_ref().parent().unwrap()).unwrap();
    fs::write(p, content).unwrap();
}

fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let sig = Signature::now("Tester", "tester@example.com").unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let parents: Vec<_> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<_> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

#[test]
fn valid_checkout_reports_head() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    write_file(dir.path().join(CONTENT_DIR).join("button.mdx"), "# Button\n");
    let oid = commit_all(&repo, "docs");

    let inspection = inspect_checkout(dir.path(), CONTENT_DIR);
    assert!(inspection.present);
    assert!(inspection.structurally_valid);
    assert_eq!(inspection.revision.as_deref(), Some(oid.to_string().as_str()));
    assert_eq!(head_revision(dir.path()).unwrap(), oid.to_string());
}

#[test]
fn revision_tracks_new_commits() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    write_file(dir.path().join(CONTENT_DIR).join("button.mdx"), "# Button\n");
    let first = commit_all(&repo, "c1");
    write_file(dir.path().join(CONTENT_DIR).join("card.mdx"), "# Card\n");
    let second = commit_all(&repo, "c2");

    assert_ne!(first, second);
    assert_eq!(head_revision(dir.path()).unwrap(), second.to_string());
}

#[test]
fn missing_content_dir_is_invalid() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    write_file(dir.path().join("README.md"), "hello");
    commit_all(&repo, "init");

    let inspection = inspect_checkout(dir.path(), CONTENT_DIR);
    assert!(inspection.present);
    assert!(!inspection.structurally_valid);
    assert!(inspection.revision.is_some());
    assert!(inspection.problem.unwrap().contains(CONTENT_DIR));
}

#[test]
fn repository_without_commits_is_invalid() {
    let dir = tempdir().unwrap();
    Repository::init(dir.path()).unwrap();

    let inspection = inspect_checkout(dir.path(), CONTENT_DIR);
    assert!(inspection.present);
    assert!(!inspection.structurally_valid);
    assert!(inspection.problem.unwrap().contains("HEAD"));
}

#[test]
fn plain_directory_is_not_a_checkout() {
    let dir = tempdir().unwrap();
    write_file(dir.path().join(CONTENT_DIR).join("button.mdx"), "# Button\n");

    let inspection = inspect_checkout(dir.path(), CONTENT_DIR);
    assert!(inspection.present);
    assert!(!inspection.structurally_valid);
    assert!(inspection.revision.is_none());
}

#[test]
fn absent_path_is_not_present() {
    let dir = tempdir().unwrap();
    let inspection = inspect_checkout(&dir.path().join("missing"), CONTENT_DIR);
    assert!(!inspection.present);
    assert!(!inspection.structurally_valid);
}
