//! Racy-clean detection: an entry can look unmodified by stat comparison
//! alone yet have changed within the same mtime tick the index was written
//! in. Git's fix is to fall back to a content hash whenever an entry's mtime
//! is too close to the index's own write time to be trusted.

use std::path::Path;
use std::time::SystemTime;

use git_hash::hasher::Hasher;
use git_hash::HashAlgorithm;
use git_object::{header, ObjectType};

use crate::entry::{IndexEntry, StatData};
use crate::IndexError;

/// Default `racyThresholdMs`: entries whose mtime is within this many
/// milliseconds of the index's write time are considered racy.
pub const DEFAULT_RACY_THRESHOLD_MS: u64 = 3000;

/// Outcome of comparing an index entry against the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacyStatus {
    /// Stat data disagrees outright: the file has changed.
    Modified,
    /// Stat data matches and the entry's mtime is safely older than the
    /// index write time: trusted without reading file content.
    Clean,
    /// Stat data matches but the entry's mtime falls within the racy window;
    /// content was (or must be) hashed to decide.
    Racy,
}

/// Compare `entry` against metadata freshly stat'd from the working tree,
/// given the index file's own mtime. Uses [`DEFAULT_RACY_THRESHOLD_MS`].
///
/// Returns [`RacyStatus::Racy`] rather than resolving the ambiguity itself;
/// callers that need a definite answer should follow up with
/// [`resolve_racy`].
pub fn classify(entry: &IndexEntry, meta: &std::fs::Metadata, index_mtime: SystemTime) -> RacyStatus {
    classify_with_threshold(entry, &StatData::from_metadata(meta), index_mtime, DEFAULT_RACY_THRESHOLD_MS)
}

/// Same as [`classify`] but with an explicit `racyThresholdMs`.
pub fn classify_with_threshold(
    entry: &IndexEntry,
    other: &StatData,
    index_mtime: SystemTime,
    threshold_ms: u64,
) -> RacyStatus {
    if entry.stat.size != other.size
        || entry.stat.mtime_secs != other.mtime_secs
        || entry.stat.mtime_nsecs != other.mtime_nsecs
        || entry.stat.ctime_secs != other.ctime_secs
        || entry.stat.ctime_nsecs != other.ctime_nsecs
        || (entry.stat.ino != 0 && other.ino != 0 && entry.stat.ino != other.ino)
        || (entry.stat.dev != 0 && other.dev != 0 && entry.stat.dev != other.dev)
    {
        return RacyStatus::Modified;
    }

    let entry_mtime = SystemTime::UNIX_EPOCH
        + std::time::Duration::new(entry.stat.mtime_secs as u64, entry.stat.mtime_nsecs);

    let is_racy = match index_mtime.checked_sub(std::time::Duration::from_millis(threshold_ms)) {
        Some(cutoff) => entry_mtime >= cutoff,
        // index_mtime predates the threshold window entirely: treat as always racy.
        None => true,
    };

    if is_racy {
        RacyStatus::Racy
    } else {
        RacyStatus::Clean
    }
}

/// Resolve a [`RacyStatus::Racy`] verdict by hashing the file's current
/// content and comparing it to `entry.oid`. Returns `true` if the content is
/// unchanged.
pub fn resolve_racy(entry: &IndexEntry, abs_path: &Path) -> Result<bool, IndexError> {
    let content = std::fs::read(abs_path)?;
    let computed = hash_blob(&content)?;
    Ok(computed == entry.oid)
}

fn hash_blob(content: &[u8]) -> Result<git_hash::ObjectId, IndexError> {
    let hdr = header::write_header(ObjectType::Blob, content.len());
    let mut hasher = Hasher::new(HashAlgorithm::Sha1);
    hasher.update(&hdr);
    hasher.update(content);
    hasher.finalize().map_err(|_| IndexError::InvalidEntry {
        offset: 0,
        reason: "failed to hash blob content for racy-clean check".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryFlags, Stage};
    use git_object::FileMode;
    use std::time::Duration;

    fn make_entry(mtime_secs: u32, size: u32) -> IndexEntry {
        IndexEntry {
            path: "a.txt".into(),
            oid: git_hash::ObjectId::NULL_SHA1,
            mode: FileMode::Regular,
            stage: Stage::Normal,
            stat: StatData {
                mtime_secs,
                size,
                ..Default::default()
            },
            flags: EntryFlags::default(),
        }
    }

    #[test]
    fn clean_when_mtime_well_before_index_write() {
        let index_mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let entry = make_entry(1_000_000 - 10, 5);

        let status = classify_with_threshold(&entry, &entry.stat, index_mtime, DEFAULT_RACY_THRESHOLD_MS);
        assert_eq!(status, RacyStatus::Clean);
    }

    #[test]
    fn racy_when_mtime_within_threshold_of_index_write() {
        let index_mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let entry = make_entry(1_000_000 - 1, 5);

        let status = classify_with_threshold(&entry, &entry.stat, index_mtime, DEFAULT_RACY_THRESHOLD_MS);
        assert_eq!(status, RacyStatus::Racy);
    }

    #[test]
    fn modified_when_size_differs() {
        let index_mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let entry = make_entry(1_000_000 - 10, 5);
        let mut mismatched = entry.stat;
        mismatched.size = 6;

        let status = classify_with_threshold(&entry, &mismatched, index_mtime, DEFAULT_RACY_THRESHOLD_MS);
        assert_eq!(status, RacyStatus::Modified);
    }

    #[test]
    fn resolve_racy_detects_unchanged_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let hdr = header::write_header(ObjectType::Blob, 5);
        let mut hasher = Hasher::new(HashAlgorithm::Sha1);
        hasher.update(&hdr);
        hasher.update(b"hello");
        let oid = hasher.finalize().unwrap();

        let mut entry = make_entry(0, 5);
        entry.oid = oid;

        assert!(resolve_racy(&entry, &path).unwrap());

        std::fs::write(&path, b"world").unwrap();
        assert!(!resolve_racy(&entry, &path).unwrap());
    }
}
