//! Rename and copy detection.
//!
//! Matches DELETED/ADDED file pairs by equal blob id (100% similarity).
//! Similarity-scoring detection below 100% is a documented extension point,
//! not implemented here.

use git_odb::ObjectDatabase;

use crate::{DiffError, DiffResult, FileDiff, FileStatus};

/// Run exact-match rename detection on a `DiffResult`, converting matching
/// delete+add pairs (equal blob id) into renames.
pub fn detect_renames(_odb: &ObjectDatabase, result: &mut DiffResult) -> Result<(), DiffError> {
    let deleted: Vec<usize> = result
        .files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.status == FileStatus::Deleted)
        .map(|(i, _)| i)
        .collect();

    let added: Vec<usize> = result
        .files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.status == FileStatus::Added)
        .map(|(i, _)| i)
        .collect();

    if deleted.is_empty() || added.is_empty() {
        return Ok(());
    }

    let mut matched_added = vec![false; added.len()];
    let mut renames: Vec<(usize, usize)> = Vec::new();

    for &del_idx in &deleted {
        let del_oid = match result.files[del_idx].old_oid {
            Some(oid) => oid,
            None => continue,
        };

        for (ai, &add_idx) in added.iter().enumerate() {
            if matched_added[ai] {
                continue;
            }
            let add_oid = match result.files[add_idx].new_oid {
                Some(oid) => oid,
                None => continue,
            };

            if del_oid == add_oid {
                matched_added[ai] = true;
                renames.push((del_idx, add_idx));
                break;
            }
        }
    }

    for (del_idx, add_idx) in renames {
        let old_path = result.files[del_idx].old_path.clone();
        let old_mode = result.files[del_idx].old_mode;
        let old_oid = result.files[del_idx].old_oid;

        let add_file = &mut result.files[add_idx];
        add_file.status = FileStatus::Renamed;
        add_file.old_path = old_path;
        add_file.old_mode = old_mode;
        add_file.old_oid = old_oid;
        add_file.similarity = Some(100);

        // Mark the consumed deleted entry for removal.
        result.files[del_idx].similarity = Some(255);
    }

    result.files.retain(|f| f.similarity != Some(255));

    Ok(())
}

/// Run exact-match copy detection on a `DiffResult`: an added file whose
/// blob id matches any other file in `all_files` (old or new side) is
/// marked as a copy of that file.
pub fn detect_copies(
    _odb: &ObjectDatabase,
    result: &mut DiffResult,
    all_files: &[FileDiff],
) -> Result<(), DiffError> {
    let added: Vec<usize> = result
        .files
        .iter()
        .enumerate()
        .filter(|(_, f)| f.status == FileStatus::Added)
        .map(|(i, _)| i)
        .collect();

    if added.is_empty() {
        return Ok(());
    }

    for &add_idx in &added {
        let add_oid = match result.files[add_idx].new_oid {
            Some(oid) => oid,
            None => continue,
        };

        let source = all_files
            .iter()
            .find(|f| f.old_oid == Some(add_oid) || f.new_oid == Some(add_oid));

        if let Some(source) = source {
            let add_file = &mut result.files[add_idx];
            add_file.status = FileStatus::Copied;
            add_file.old_path = source.new_path.clone().or_else(|| source.old_path.clone());
            add_file.old_mode = source.new_mode.or(source.old_mode);
            add_file.old_oid = source.new_oid.or(source.old_oid);
            add_file.similarity = Some(100);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::{HashAlgorithm, ObjectId};

    fn oid(byte: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        ObjectId::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap()
    }

    fn deleted(path: &str, blob: ObjectId) -> FileDiff {
        FileDiff {
            status: FileStatus::Deleted,
            old_path: Some(path.into()),
            new_path: None,
            old_mode: None,
            new_mode: None,
            old_oid: Some(blob),
            new_oid: None,
            hunks: Vec::new(),
            is_binary: false,
            similarity: None,
        }
    }

    fn added(path: &str, blob: ObjectId) -> FileDiff {
        FileDiff {
            status: FileStatus::Added,
            old_path: None,
            new_path: Some(path.into()),
            old_mode: None,
            new_mode: None,
            old_oid: None,
            new_oid: Some(blob),
            hunks: Vec::new(),
            is_binary: false,
            similarity: None,
        }
    }

    #[test]
    fn exact_rename_match() {
        let odb_dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(odb_dir.path()).unwrap();
        let mut result = DiffResult {
            files: vec![deleted("old.txt", oid(1)), added("new.txt", oid(1))],
        };
        detect_renames(&odb, &mut result).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].status, FileStatus::Renamed);
        assert_eq!(result.files[0].similarity, Some(100));
    }

    #[test]
    fn no_match_leaves_both() {
        let odb_dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(odb_dir.path()).unwrap();
        let mut result = DiffResult {
            files: vec![deleted("old.txt", oid(1)), added("new.txt", oid(2))],
        };
        detect_renames(&odb, &mut result).unwrap();
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.files[0].status, FileStatus::Deleted);
        assert_eq!(result.files[1].status, FileStatus::Added);
    }

    #[test]
    fn exact_copy_match() {
        let odb_dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(odb_dir.path()).unwrap();
        let source = deleted("original.txt", oid(7));
        let all_files = vec![source.clone()];
        let mut result = DiffResult {
            files: vec![added("copy.txt", oid(7))],
        };
        detect_copies(&odb, &mut result, &all_files).unwrap();
        assert_eq!(result.files[0].status, FileStatus::Copied);
        assert_eq!(result.files[0].similarity, Some(100));
    }
}
