//! Bulk index rebuild (`Builder`) and incremental merge editing (`Editor`).
//!
//! Both mutate an [`Index`]'s entry array without going through the
//! one-at-a-time [`Index::add`]/[`Index::remove`] API, which is too slow for
//! whole-tree operations like `read-tree` or `reset --hard`.

use std::cmp::Ordering;

use bstr::BStr;

use crate::entry::IndexEntry;
use crate::{cmp_entries, Index, IndexError, Stage};

/// Rebuilds an index's entry array from scratch, alternating between
/// "keep a slice of the existing array verbatim" and "insert a new entry".
///
/// This mirrors how a real tree-walk rebuild works: most paths are unchanged
/// and can be copied in bulk runs, while only the touched paths need a fresh
/// [`IndexEntry`]. Validation (sort order, duplicate `(path, stage)` pairs,
/// stage-0/conflict-stage mixing) happens once in [`Builder::finish`] rather
/// than per-entry.
pub struct Builder<'a> {
    source: &'a [IndexEntry],
    entries: Vec<IndexEntry>,
}

impl<'a> Builder<'a> {
    /// Start a rebuild sourced from `index`'s current entries.
    pub fn new(index: &'a Index) -> Self {
        Self {
            source: &index.entries,
            entries: Vec::with_capacity(index.entries.len()),
        }
    }

    /// Number of entries available to [`Builder::keep`] from the source index.
    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    /// Copy `source[pos..pos + len]` verbatim into the rebuilt array.
    pub fn keep(&mut self, pos: usize, len: usize) {
        self.entries.extend_from_slice(&self.source[pos..pos + len]);
    }

    /// Append a freshly constructed entry.
    pub fn add(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    /// Validate and produce the rebuilt index.
    ///
    /// Fails if the accumulated entries aren't in strictly ascending
    /// `(path, stage)` order, contain a duplicate `(path, stage)` pair, or mix
    /// a stage-0 entry with conflict-stage entries for the same path.
    pub fn finish(self) -> Result<Index, IndexError> {
        validate_entries(&self.entries)?;
        Ok(Index {
            version: 2,
            entries: self.entries,
            cache_tree: None,
            resolve_undo: None,
            unknown_extensions: Vec::new(),
            _checksum: git_hash::ObjectId::NULL_SHA1,
        })
    }
}

/// Check sort order, duplicates, and stage-0/conflict mixing.
fn validate_entries(entries: &[IndexEntry]) -> Result<(), IndexError> {
    for pair in entries.windows(2) {
        match cmp_entries(&pair[0], &pair[1]) {
            Ordering::Less => {}
            Ordering::Equal => {
                return Err(IndexError::InvalidEntry {
                    offset: 0,
                    reason: format!(
                        "duplicate entry for {:?} at stage {}",
                        pair[0].path,
                        pair[0].stage.as_u8()
                    ),
                })
            }
            Ordering::Greater => {
                return Err(IndexError::InvalidEntry {
                    offset: 0,
                    reason: "entries not sorted by (path, stage)".into(),
                })
            }
        }
    }

    let mut i = 0;
    while i < entries.len() {
        let path = &entries[i].path;
        let mut j = i;
        let mut saw_normal = false;
        let mut saw_conflict = false;
        while j < entries.len() && entries[j].path == *path {
            match entries[j].stage {
                Stage::Normal => saw_normal = true,
                _ => saw_conflict = true,
            }
            j += 1;
        }
        if saw_normal && saw_conflict {
            return Err(IndexError::InvalidEntry {
                offset: 0,
                reason: format!("{:?} has a stage-0 entry mixed with conflict stages", path),
            });
        }
        i = j;
    }

    Ok(())
}

/// A single incremental edit, applied during [`Editor::apply`]'s merge pass.
pub trait EditCommand {
    /// Path this command targets.
    fn path(&self) -> &BStr;

    /// Stage this command targets (most commands only touch stage 0).
    fn stage(&self) -> Stage {
        Stage::Normal
    }

    /// Given the existing entry at this `(path, stage)` (if any), produce the
    /// entry that should occupy that slot afterwards. Returning `None`
    /// deletes the entry (a no-op if there was none).
    fn apply(&self, existing: Option<&IndexEntry>) -> Option<IndexEntry>;
}

/// Replace (or insert) a single entry.
pub struct PutEntry(pub IndexEntry);

impl EditCommand for PutEntry {
    fn path(&self) -> &BStr {
        BStr::new(&self.0.path)
    }

    fn stage(&self) -> Stage {
        self.0.stage
    }

    fn apply(&self, _existing: Option<&IndexEntry>) -> Option<IndexEntry> {
        Some(self.0.clone())
    }
}

/// Delete the entry at a `(path, stage)`, if present.
pub struct DeleteEntry {
    pub path: bstr::BString,
    pub stage: Stage,
}

impl EditCommand for DeleteEntry {
    fn path(&self) -> &BStr {
        BStr::new(&self.path)
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn apply(&self, _existing: Option<&IndexEntry>) -> Option<IndexEntry> {
        None
    }
}

/// Applies a batch of [`EditCommand`]s to an index in a single linear merge
/// pass over the sorted entry array, rather than one lookup-and-splice per
/// command.
pub struct Editor<'a> {
    index: &'a mut Index,
}

impl<'a> Editor<'a> {
    pub fn new(index: &'a mut Index) -> Self {
        Self { index }
    }

    /// Merge `commands` (sorted internally by `(path, stage)`) against the
    /// current entries in one pass.
    pub fn apply(self, mut commands: Vec<Box<dyn EditCommand>>) -> Result<(), IndexError> {
        commands.sort_by(|a, b| key_cmp(a.path(), a.stage(), b.path(), b.stage()));

        let existing = std::mem::take(&mut self.index.entries);
        let mut result = Vec::with_capacity(existing.len() + commands.len());

        let mut existing_iter = existing.into_iter().peekable();
        let mut command_iter = commands.into_iter().peekable();
        let mut touched: Vec<bstr::BString> = Vec::new();

        loop {
            match (existing_iter.peek(), command_iter.peek()) {
                (None, None) => break,
                (Some(_), None) => result.push(existing_iter.next().unwrap()),
                (None, Some(_)) => {
                    let cmd = command_iter.next().unwrap();
                    touched.push(cmd.path().to_owned());
                    if let Some(entry) = cmd.apply(None) {
                        result.push(entry);
                    }
                }
                (Some(entry), Some(cmd)) => {
                    match key_cmp(BStr::new(&entry.path), entry.stage, cmd.path(), cmd.stage()) {
                        Ordering::Less => result.push(existing_iter.next().unwrap()),
                        Ordering::Greater => {
                            let cmd = command_iter.next().unwrap();
                            touched.push(cmd.path().to_owned());
                            if let Some(entry) = cmd.apply(None) {
                                result.push(entry);
                            }
                        }
                        Ordering::Equal => {
                            let entry = existing_iter.next().unwrap();
                            let cmd = command_iter.next().unwrap();
                            touched.push(cmd.path().to_owned());
                            if let Some(new_entry) = cmd.apply(Some(&entry)) {
                                result.push(new_entry);
                            }
                        }
                    }
                }
            }
        }

        validate_entries(&result)?;
        self.index.entries = result;
        for path in &touched {
            if let Some(ref mut tree) = self.index.cache_tree {
                tree.invalidate(BStr::new(path));
            }
        }
        Ok(())
    }
}

fn key_cmp(path_a: &BStr, stage_a: Stage, path_b: &BStr, stage_b: Stage) -> Ordering {
    path_a
        .cmp(path_b)
        .then(stage_a.as_u8().cmp(&stage_b.as_u8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::ObjectId;
    use git_object::FileMode;

    fn entry(path: &str, stage: Stage) -> IndexEntry {
        IndexEntry {
            path: path.into(),
            oid: ObjectId::NULL_SHA1,
            mode: FileMode::Regular,
            stage,
            stat: Default::default(),
            flags: Default::default(),
        }
    }

    #[test]
    fn builder_keeps_and_inserts() {
        let mut index = Index::new();
        index.add(entry("a.txt", Stage::Normal));
        index.add(entry("c.txt", Stage::Normal));

        let mut builder = Builder::new(&index);
        builder.keep(0, 1); // a.txt
        builder.add(entry("b.txt", Stage::Normal));
        builder.keep(1, 1); // c.txt
        let rebuilt = builder.finish().unwrap();

        let paths: Vec<_> = rebuilt.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn builder_rejects_duplicate() {
        let index = Index::new();
        let mut builder = Builder::new(&index);
        builder.add(entry("a.txt", Stage::Normal));
        builder.add(entry("a.txt", Stage::Normal));
        assert!(builder.finish().is_err());
    }

    #[test]
    fn builder_rejects_stage_zero_mixed_with_conflict() {
        let index = Index::new();
        let mut builder = Builder::new(&index);
        builder.add(entry("a.txt", Stage::Normal));
        builder.add(entry("a.txt", Stage::Ours));
        assert!(builder.finish().is_err());
    }

    #[test]
    fn builder_allows_all_three_conflict_stages() {
        let index = Index::new();
        let mut builder = Builder::new(&index);
        builder.add(entry("a.txt", Stage::Base));
        builder.add(entry("a.txt", Stage::Ours));
        builder.add(entry("a.txt", Stage::Theirs));
        assert!(builder.finish().is_ok());
    }

    #[test]
    fn editor_add_update_delete_in_one_pass() {
        let mut index = Index::new();
        index.add(entry("a.txt", Stage::Normal));
        index.add(entry("b.txt", Stage::Normal));
        index.add(entry("d.txt", Stage::Normal));

        let mut updated_b = entry("b.txt", Stage::Normal);
        updated_b.oid = ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap();

        let commands: Vec<Box<dyn EditCommand>> = vec![
            Box::new(PutEntry(updated_b.clone())),
            Box::new(PutEntry(entry("c.txt", Stage::Normal))),
            Box::new(DeleteEntry {
                path: "d.txt".into(),
                stage: Stage::Normal,
            }),
        ];

        Editor::new(&mut index).apply(commands).unwrap();

        let paths: Vec<_> = index.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(index.get(BStr::new(b"b.txt"), Stage::Normal).unwrap().oid, updated_b.oid);
    }

    #[test]
    fn editor_delete_of_absent_path_is_noop() {
        let mut index = Index::new();
        index.add(entry("a.txt", Stage::Normal));

        let commands: Vec<Box<dyn EditCommand>> = vec![Box::new(DeleteEntry {
            path: "missing.txt".into(),
            stage: Stage::Normal,
        })];

        Editor::new(&mut index).apply(commands).unwrap();
        assert_eq!(index.len(), 1);
    }
}
