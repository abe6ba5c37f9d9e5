//! Working-copy checkout: materializing a tree into the work tree via the
//! pluggable file backend, and rewriting the index to match.

use std::collections::BTreeSet;

use bstr::{BString, ByteSlice};
use git_hash::ObjectId;
use git_index::{EntryFlags, Index, IndexEntry, Stage, StatData};
use git_object::{Object, Tree};
use git_odb::ObjectDatabase;
use git_ref::{RefName, RefStore, RefTransaction};
use git_repository::Repository;
use git_utils::backend::Backend;

use crate::MergeError;

/// Options controlling [`checkout_tree`] / [`checkout_branch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutOptions {
    /// Proceed even if the working copy has uncommitted changes.
    pub force: bool,
}

/// Materialize `tree_oid` into the work tree via `backend` (expected rooted
/// at the repository's work tree) and rewrite the index to stage-0 entries
/// matching it. Refuses if the working copy has uncommitted changes
/// relative to the current HEAD/index, unless `options.force` is set.
pub fn checkout_tree(
    repo: &mut Repository,
    backend: &dyn Backend,
    tree_oid: &ObjectId,
    options: &CheckoutOptions,
) -> Result<(), MergeError> {
    if !options.force {
        ensure_clean(repo)?;
    }

    let mut new_index = Index::new();
    let prefix = BString::from("");
    materialize_tree(repo.odb(), backend, tree_oid, &prefix, &mut new_index)?;

    // Delete files tracked by the old index but absent from the new tree.
    let old_paths: Vec<BString> = repo
        .index()?
        .iter()
        .filter(|e| e.stage == Stage::Normal)
        .map(|e| e.path.clone())
        .collect();
    let new_paths: BTreeSet<&BString> = new_index.iter().map(|e| &e.path).collect();
    for path in &old_paths {
        if !new_paths.contains(path) {
            let _ = backend.delete(std::path::Path::new(path.to_str_lossy().as_ref()));
        }
    }

    repo.set_index(new_index);
    repo.write_index()?;
    Ok(())
}

/// Check out the tip commit of `branch` (a short name, e.g. `"main"`) and
/// atomically repoint HEAD at `refs/heads/<branch>`.
pub fn checkout_branch(
    repo: &mut Repository,
    backend: &dyn Backend,
    branch: &str,
    options: &CheckoutOptions,
) -> Result<(), MergeError> {
    let branch_ref = RefName::new(format!("refs/heads/{branch}"))?;
    let target_oid = repo
        .refs()
        .resolve_to_oid(&branch_ref)?
        .ok_or_else(|| MergeError::InvalidPatch(format!("no such branch: {branch}")))?;

    let tree_oid = commit_tree(repo.odb(), &target_oid)?;
    checkout_tree(repo, backend, &tree_oid, options)?;

    let head_ref = RefName::new("HEAD")?;
    let mut txn = RefTransaction::new();
    txn.set_symbolic(head_ref, branch_ref, format!("checkout: moving to {branch}"));
    repo.refs().commit_transaction(txn)?;

    Ok(())
}

/// Refuse checkout if the working copy has any tracked-path change (staged
/// or unstaged) or an unresolved conflict. Untracked/ignored paths never
/// block a checkout.
fn ensure_clean(repo: &mut Repository) -> Result<(), MergeError> {
    use git_diff::status::{StatusCalculator, StatusKind, StatusOptions};

    let mut calc = StatusCalculator::new(repo);
    let statuses = calc.status(&StatusOptions::default())?;

    for entry in &statuses {
        let dirty = |k: StatusKind| {
            !matches!(k, StatusKind::Unmodified | StatusKind::Untracked | StatusKind::Ignored)
        };
        if dirty(entry.index_status) || dirty(entry.worktree_status) {
            return Err(MergeError::InvalidPatch(format!(
                "checkout would overwrite uncommitted changes in {:?}",
                entry.path
            )));
        }
    }
    Ok(())
}

fn commit_tree(odb: &ObjectDatabase, commit_oid: &ObjectId) -> Result<ObjectId, MergeError> {
    let obj = odb
        .read(commit_oid)?
        .ok_or(MergeError::ObjectNotFound(*commit_oid))?;
    match obj {
        Object::Commit(commit) => Ok(commit.tree),
        other => Err(MergeError::UnexpectedObjectType {
            oid: *commit_oid,
            expected: "commit",
            actual: other.object_type().to_string(),
        }),
    }
}

/// Recursively write `tree_oid`'s blobs into `backend` and accumulate
/// stage-0 index entries for them.
///
/// Symlinks are written as regular files containing the link target text:
/// the [`Backend`] abstraction has no symlink primitive, so this is a known
/// fidelity loss (documented alongside the rest of C1's).
fn materialize_tree(
    odb: &ObjectDatabase,
    backend: &dyn Backend,
    tree_oid: &ObjectId,
    prefix: &BString,
    index: &mut Index,
) -> Result<(), MergeError> {
    let obj = odb.read(tree_oid)?.ok_or(MergeError::ObjectNotFound(*tree_oid))?;
    let tree: Tree = match obj {
        Object::Tree(t) => t,
        other => {
            return Err(MergeError::UnexpectedObjectType {
                oid: *tree_oid,
                expected: "tree",
                actual: other.object_type().to_string(),
            })
        }
    };

    if !prefix.is_empty() {
        backend.mkdir(std::path::Path::new(prefix.to_str_lossy().as_ref()))?;
    }

    for entry in &tree.entries {
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(&entry.name);

        if entry.mode.is_tree() {
            materialize_tree(odb, backend, &entry.oid, &path, index)?;
            continue;
        }

        let blob_obj = odb.read(&entry.oid)?.ok_or(MergeError::ObjectNotFound(entry.oid))?;
        let content = match blob_obj {
            Object::Blob(blob) => blob.data,
            other => {
                return Err(MergeError::UnexpectedObjectType {
                    oid: entry.oid,
                    expected: "blob",
                    actual: other.object_type().to_string(),
                })
            }
        };

        backend.write(std::path::Path::new(path.to_str_lossy().as_ref()), &content)?;
        index.add(IndexEntry {
            path: path.clone(),
            oid: entry.oid,
            mode: entry.mode,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_utils::backend::FsBackend;
    use std::process::Command;

    fn run_git(dir: &std::path::Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn checkout_tree_materializes_new_content() {
        let dir = tempfile::tempdir().unwrap();
        let work_tree = std::fs::canonicalize(dir.path()).unwrap();
        run_git(&work_tree, &["init"]);
        std::fs::write(work_tree.join("a.txt"), "one\n").unwrap();
        run_git(&work_tree, &["add", "a.txt"]);
        run_git(&work_tree, &["commit", "-m", "first"]);

        run_git(&work_tree, &["checkout", "-b", "feature"]);
        std::fs::write(work_tree.join("a.txt"), "two\n").unwrap();
        run_git(&work_tree, &["commit", "-am", "second"]);
        let feature_tree = String::from_utf8(
            Command::new("git")
                .args(["rev-parse", "feature^{tree}"])
                .current_dir(&work_tree)
                .output()
                .unwrap()
                .stdout,
        )
        .unwrap()
        .trim()
        .to_string();

        run_git(&work_tree, &["checkout", "main"]);
        assert_eq!(std::fs::read_to_string(work_tree.join("a.txt")).unwrap(), "one\n");

        let mut repo = Repository::open(&work_tree).unwrap();
        let backend = FsBackend::new(&work_tree);
        let tree_oid = git_hash::ObjectId::from_hex(feature_tree.as_bytes()).unwrap();

        checkout_tree(&mut repo, &backend, &tree_oid, &CheckoutOptions::default()).unwrap();

        assert_eq!(std::fs::read_to_string(work_tree.join("a.txt")).unwrap(), "two\n");
    }

    #[test]
    fn checkout_tree_refuses_on_dirty_worktree() {
        let dir = tempfile::tempdir().unwrap();
        let work_tree = std::fs::canonicalize(dir.path()).unwrap();
        run_git(&work_tree, &["init"]);
        std::fs::write(work_tree.join("a.txt"), "one\n").unwrap();
        run_git(&work_tree, &["add", "a.txt"]);
        run_git(&work_tree, &["commit", "-m", "first"]);

        std::fs::write(work_tree.join("a.txt"), "dirty\n").unwrap();

        let mut repo = Repository::open(&work_tree).unwrap();
        let backend = FsBackend::new(&work_tree);
        let head_tree = resolve_head(&mut repo);

        let result = checkout_tree(&mut repo, &backend, &head_tree, &CheckoutOptions::default());
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(work_tree.join("a.txt")).unwrap(), "dirty\n");
    }

    #[test]
    fn checkout_tree_with_force_overwrites_dirty_worktree() {
        let dir = tempfile::tempdir().unwrap();
        let work_tree = std::fs::canonicalize(dir.path()).unwrap();
        run_git(&work_tree, &["init"]);
        std::fs::write(work_tree.join("a.txt"), "one\n").unwrap();
        run_git(&work_tree, &["add", "a.txt"]);
        run_git(&work_tree, &["commit", "-m", "first"]);

        std::fs::write(work_tree.join("a.txt"), "dirty\n").unwrap();

        let mut repo = Repository::open(&work_tree).unwrap();
        let backend = FsBackend::new(&work_tree);
        let head_tree = resolve_head(&mut repo);

        checkout_tree(
            &mut repo,
            &backend,
            &head_tree,
            &CheckoutOptions { force: true },
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(work_tree.join("a.txt")).unwrap(), "one\n");
    }

    #[test]
    fn checkout_branch_updates_head_symbolically() {
        let dir = tempfile::tempdir().unwrap();
        let work_tree = std::fs::canonicalize(dir.path()).unwrap();
        run_git(&work_tree, &["init"]);
        std::fs::write(work_tree.join("a.txt"), "one\n").unwrap();
        run_git(&work_tree, &["add", "a.txt"]);
        run_git(&work_tree, &["commit", "-m", "first"]);
        run_git(&work_tree, &["branch", "feature"]);

        let mut repo = Repository::open(&work_tree).unwrap();
        let backend = FsBackend::new(&work_tree);

        checkout_branch(&mut repo, &backend, "feature", &CheckoutOptions::default()).unwrap();

        let head_contents = std::fs::read_to_string(work_tree.join(".git").join("HEAD")).unwrap();
        assert_eq!(head_contents.trim(), "ref: refs/heads/feature");
    }

    fn resolve_head(repo: &mut Repository) -> git_hash::ObjectId {
        let head_oid = repo.head_oid().unwrap().unwrap();
        commit_tree(repo.odb(), &head_oid).unwrap()
    }
}
