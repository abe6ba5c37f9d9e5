//! Working-copy status: per-path comparison across HEAD, the index, and the
//! working tree.
//!
//! Mirrors `worktree.rs`'s stat-first/content-fallback comparison but
//! produces a full per-path map (including untracked and ignored paths)
//! rather than only the paths that changed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use bstr::{BStr, BString};
use git_ignore::IgnoreManager;
use git_index::{Index, IndexEntry, Stage};
use git_repository::Repository;

use crate::rename::detect_renames;
use crate::tree::diff_trees;
use crate::worktree::{diff_index_to_worktree, resolve_head_tree};
use crate::{DiffError, DiffOptions, DiffResult, FileStatus};

/// Status of one side (HEAD→index or index→worktree) of a path's comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Unmodified,
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Untracked,
    Ignored,
    Conflicted,
}

/// Combined status for a single path.
#[derive(Debug, Clone)]
pub struct PathStatus {
    /// Path relative to the repository root.
    pub path: BString,
    /// HEAD vs index (staged changes).
    pub index_status: StatusKind,
    /// Index vs working tree (unstaged changes).
    pub worktree_status: StatusKind,
    /// For a rename/copy: the path it was renamed/copied from.
    pub rename_from: Option<BString>,
}

/// Options controlling a status scan.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    /// Restrict the scan to paths under these prefixes (None = everything).
    pub pathspec: Option<Vec<BString>>,
    /// Include ignored paths in the result (normally suppressed, like
    /// `git status` without `--ignored`).
    pub include_ignored: bool,
}

/// Computes working-copy status against a repository's HEAD/index/worktree.
pub struct StatusCalculator<'r> {
    repo: &'r mut Repository,
}

impl<'r> StatusCalculator<'r> {
    pub fn new(repo: &'r mut Repository) -> Self {
        Self { repo }
    }

    /// Compute the full per-path status list, sorted by path.
    pub fn status(&mut self, options: &StatusOptions) -> Result<Vec<PathStatus>, DiffError> {
        let work_tree = self
            .repo
            .work_tree()
            .ok_or(git_repository::RepoError::BareNoWorkTree)?
            .to_path_buf();

        let (conflicted, stage0): (BTreeSet<BString>, Vec<IndexEntry>) = {
            let index = self.repo.index()?;
            let conflicted = index.conflicts().iter().map(|p| (*p).to_owned()).collect();
            let stage0 = index
                .iter()
                .filter(|e| e.stage == Stage::Normal)
                .cloned()
                .collect();
            (conflicted, stage0)
        };

        let mut results: BTreeMap<BString, PathStatus> = BTreeMap::new();

        // HEAD -> index (staged changes), computed against a stage-0-only
        // projection of the index so an in-progress conflict elsewhere
        // doesn't block `write_tree`.
        let mut stage0_index = Index::new();
        for entry in &stage0 {
            stage0_index.add(entry.clone());
        }
        let index_tree_oid = stage0_index
            .write_tree(self.repo.odb())
            .map_err(|e| DiffError::Io(std::io::Error::other(e.to_string())))?;
        let head_tree_oid = resolve_head_tree(self.repo)?;

        let diff_opts = DiffOptions {
            pathspec: options.pathspec.clone(),
            ..DiffOptions::default()
        };

        let mut staged = diff_trees(
            self.repo.odb(),
            head_tree_oid.as_ref(),
            Some(&index_tree_oid),
            &diff_opts,
        )?;
        detect_renames(self.repo.odb(), &mut staged)?;
        merge_side(&mut results, &staged, Side::Index);

        // Index -> worktree (unstaged changes).
        let mut unstaged = diff_index_to_worktree(self.repo, &diff_opts)?;
        detect_renames(self.repo.odb(), &mut unstaged)?;
        merge_side(&mut results, &unstaged, Side::Worktree);

        // Every tracked, otherwise-untouched path is unmodified on both sides.
        for entry in &stage0 {
            if !conflicted.contains(&entry.path) && passes_pathspec(&entry.path, options) {
                results.entry(entry.path.clone()).or_insert(PathStatus {
                    path: entry.path.clone(),
                    index_status: StatusKind::Unmodified,
                    worktree_status: StatusKind::Unmodified,
                    rename_from: None,
                });
            }
        }

        // Conflicted paths override whatever the diffs above computed.
        for path in &conflicted {
            if !passes_pathspec(path, options) {
                continue;
            }
            results.insert(
                path.clone(),
                PathStatus {
                    path: path.clone(),
                    index_status: StatusKind::Conflicted,
                    worktree_status: StatusKind::Conflicted,
                    rename_from: None,
                },
            );
        }

        // Untracked and ignored paths.
        let tracked: BTreeSet<&BString> = stage0.iter().map(|e| &e.path).collect();
        let ignore = build_ignore_manager(self.repo, &work_tree)?;
        let mut untracked = Vec::new();
        walk_untracked(&work_tree, &work_tree, &tracked, &ignore, &mut untracked)?;

        for (path, is_ignored) in untracked {
            if !passes_pathspec(&path, options) {
                continue;
            }
            if is_ignored && !options.include_ignored {
                continue;
            }
            let kind = if is_ignored {
                StatusKind::Ignored
            } else {
                StatusKind::Untracked
            };
            results.insert(
                path.clone(),
                PathStatus {
                    path,
                    index_status: kind,
                    worktree_status: kind,
                    rename_from: None,
                },
            );
        }

        Ok(results.into_values().collect())
    }
}

#[derive(Clone, Copy)]
enum Side {
    Index,
    Worktree,
}

fn merge_side(results: &mut BTreeMap<BString, PathStatus>, diff: &DiffResult, side: Side) {
    for file in &diff.files {
        let kind = status_kind_for(file.status);
        let path = file.path().clone();
        let rename_from = file.old_path.clone().filter(|_| {
            matches!(file.status, FileStatus::Renamed | FileStatus::Copied)
        });

        let entry = results.entry(path.clone()).or_insert(PathStatus {
            path: path.clone(),
            index_status: StatusKind::Unmodified,
            worktree_status: StatusKind::Unmodified,
            rename_from: None,
        });

        match side {
            Side::Index => entry.index_status = kind,
            Side::Worktree => entry.worktree_status = kind,
        }
        if rename_from.is_some() {
            entry.rename_from = rename_from;
        }

        // A file deleted from the index also needs an entry keyed by its old
        // path (the new-path key above doesn't exist for a pure deletion).
        if file.status == FileStatus::Deleted {
            if let Some(ref old_path) = file.old_path {
                let entry = results.entry(old_path.clone()).or_insert(PathStatus {
                    path: old_path.clone(),
                    index_status: StatusKind::Unmodified,
                    worktree_status: StatusKind::Unmodified,
                    rename_from: None,
                });
                match side {
                    Side::Index => entry.index_status = kind,
                    Side::Worktree => entry.worktree_status = kind,
                }
            }
        }
    }
}

fn status_kind_for(status: FileStatus) -> StatusKind {
    match status {
        FileStatus::Added => StatusKind::Added,
        FileStatus::Deleted => StatusKind::Deleted,
        FileStatus::Modified | FileStatus::TypeChanged => StatusKind::Modified,
        FileStatus::Renamed => StatusKind::Renamed,
        FileStatus::Copied => StatusKind::Copied,
        FileStatus::Unmerged => StatusKind::Conflicted,
    }
}

fn passes_pathspec(path: &BString, options: &StatusOptions) -> bool {
    match &options.pathspec {
        None => true,
        Some(specs) => specs.iter().any(|spec| path.starts_with(spec.as_slice())),
    }
}

/// Build an `IgnoreManager` from `.gitignore` files found under the work
/// tree, plus `.git/info/exclude` and `core.excludesFile`.
fn build_ignore_manager(repo: &Repository, work_tree: &Path) -> Result<IgnoreManager, DiffError> {
    let mut manager = IgnoreManager::new();

    if let Ok(Some(global_path)) = repo.config().get_path("core.excludesFile") {
        if let Ok(contents) = std::fs::read(&global_path) {
            manager.set_global_patterns(&contents);
        }
    }

    let exclude_path = repo.git_dir().join("info").join("exclude");
    if let Ok(contents) = std::fs::read(&exclude_path) {
        manager.set_exclude_patterns(&contents);
    }

    load_gitignore_files(work_tree, work_tree, &mut manager)?;
    Ok(manager)
}

fn load_gitignore_files(
    work_tree: &Path,
    dir: &Path,
    manager: &mut IgnoreManager,
) -> Result<(), DiffError> {
    let gitignore = dir.join(".gitignore");
    if let Ok(contents) = std::fs::read(&gitignore) {
        let rel = dir
            .strip_prefix(work_tree)
            .unwrap_or(dir)
            .to_string_lossy()
            .replace('\\', "/");
        manager.add_ignore_file(rel, &contents);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() && entry.file_name() != ".git" {
            load_gitignore_files(work_tree, &entry.path(), manager)?;
        }
    }
    Ok(())
}

/// Recursively collect paths under `dir` not present in `tracked`, tagging
/// each with whether it's ignored. A directory that is itself ignored is
/// reported once and not descended into (matching `git status`'s untracked
/// file collapsing for ignored directories).
fn walk_untracked(
    work_tree: &Path,
    dir: &Path,
    tracked: &BTreeSet<&BString>,
    ignore: &IgnoreManager,
    out: &mut Vec<(BString, bool)>,
) -> Result<(), DiffError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name == ".git" {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        let rel = path
            .strip_prefix(work_tree)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let rel_bstring = BString::from(rel.as_str());

        if file_type.is_dir() {
            let is_ignored = ignore.is_ignored(BStr::new(&rel_bstring), true);
            if is_ignored {
                out.push((rel_bstring, true));
                continue;
            }
            walk_untracked(work_tree, &path, tracked, ignore, out)?;
        } else {
            if tracked.contains(&rel_bstring) {
                continue;
            }
            let is_ignored = ignore.is_ignored(BStr::new(&rel_bstring), false);
            out.push((rel_bstring, is_ignored));
        }
    }
    Ok(())
}
