//! Abstract byte-addressable storage: the File API every on-disk component
//! (loose objects, refs, the index) is built on top of.
//!
//! A [`Backend`] exposes the small set of operations the rest of the crate
//! needs from a tree of named blobs: read, write, stat, list, delete, mkdir,
//! exists, rename. [`FsBackend`] implements it over the real filesystem;
//! [`MemoryBackend`] implements it over an in-process map, for tests and for
//! embedding contexts where no filesystem is available.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Kind of entry found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata about a single entry, as returned by [`Backend::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    pub len: u64,
}

impl Stat {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Abstract byte-addressable tree backing loose object storage, ref storage,
/// and the staging index.
///
/// Paths are always relative to the backend's root; callers never see an
/// absolute filesystem path when using [`MemoryBackend`].
pub trait Backend: Send + Sync {
    /// Read the full contents of a file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write the full contents of a file, creating or truncating it.
    /// Does not create parent directories; call [`Backend::mkdir`] first.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Stat a path: file or directory, and its length.
    fn stat(&self, path: &Path) -> io::Result<Stat>;

    /// List the immediate children of a directory (file names only, no path prefix).
    fn list(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Delete a file.
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and all missing parent directories.
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Whether a path exists (file or directory).
    fn exists(&self, path: &Path) -> bool;

    /// Atomically rename/move a path. Used for lock-file commits and for
    /// installing content-addressed objects without a partial-write window.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// [`Backend`] over the real filesystem, rooted at an arbitrary directory.
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Backend for FsBackend {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(path), data)
    }

    fn stat(&self, path: &Path) -> io::Result<Stat> {
        let meta = fs::metadata(self.resolve(path))?;
        Ok(Stat {
            kind: if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            len: meta.len(),
        })
    }

    fn list(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))
    }
}

/// In-memory [`Backend`], keyed by normalized path. Useful for tests and for
/// hosting environments with no real filesystem.
#[derive(Default)]
pub struct MemoryBackend {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<std::collections::BTreeSet<PathBuf>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(std::collections::BTreeSet::new()),
        }
    }

    fn normalize(path: &Path) -> PathBuf {
        // Collapse to a consistent relative form so "a/b" and "./a/b" collide.
        let mut out = PathBuf::new();
        for component in path.components() {
            out.push(component);
        }
        out
    }

    fn parents(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
        path.ancestors().skip(1).map(Path::to_path_buf)
    }
}

impl Backend for MemoryBackend {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let key = Self::normalize(path);
        self.files
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let key = Self::normalize(path);
        let mut dirs = self.dirs.lock().unwrap();
        for parent in Self::parents(&key) {
            if !parent.as_os_str().is_empty() {
                dirs.insert(parent);
            }
        }
        drop(dirs);
        self.files.lock().unwrap().insert(key, data.to_vec());
        Ok(())
    }

    fn stat(&self, path: &Path) -> io::Result<Stat> {
        let key = Self::normalize(path);
        if let Some(data) = self.files.lock().unwrap().get(&key) {
            return Ok(Stat {
                kind: EntryKind::File,
                len: data.len() as u64,
            });
        }
        if self.dirs.lock().unwrap().contains(&key) || key.as_os_str().is_empty() {
            return Ok(Stat {
                kind: EntryKind::Directory,
                len: 0,
            });
        }
        Err(io::Error::new(io::ErrorKind::NotFound, "no such path"))
    }

    fn list(&self, path: &Path) -> io::Result<Vec<String>> {
        let key = Self::normalize(path);
        let mut names = std::collections::BTreeSet::new();
        let files = self.files.lock().unwrap();
        let dirs = self.dirs.lock().unwrap();
        for candidate in files.keys().chain(dirs.iter()) {
            if let Ok(rest) = candidate.strip_prefix(&key) {
                let mut components = rest.components();
                if let Some(first) = components.next() {
                    if components.next().is_none() {
                        names.insert(first.as_os_str().to_string_lossy().into_owned());
                    }
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        let key = Self::normalize(path);
        self.files
            .lock()
            .unwrap()
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        let key = Self::normalize(path);
        let mut dirs = self.dirs.lock().unwrap();
        let mut current = PathBuf::new();
        for component in key.components() {
            current.push(component);
            dirs.insert(current.clone());
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let key = Self::normalize(path);
        self.files.lock().unwrap().contains_key(&key) || self.dirs.lock().unwrap().contains(&key)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from_key = Self::normalize(from);
        let to_key = Self::normalize(to);
        let mut files = self.files.lock().unwrap();
        if let Some(data) = files.remove(&from_key) {
            drop(files);
            if let Some(parent) = to_key.parent() {
                if !parent.as_os_str().is_empty() {
                    self.dirs.lock().unwrap().insert(parent.to_path_buf());
                }
            }
            self.files.lock().unwrap().insert(to_key, data);
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no such file to rename",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.mkdir(Path::new("ab")).unwrap();
        backend.write(Path::new("ab/cdef"), b"hello").unwrap();
        assert!(backend.exists(Path::new("ab/cdef")));
        assert_eq!(backend.read(Path::new("ab/cdef")).unwrap(), b"hello");
        let names = backend.list(Path::new("ab")).unwrap();
        assert_eq!(names, vec!["cdef".to_string()]);
        backend
            .rename(Path::new("ab/cdef"), Path::new("ab/renamed"))
            .unwrap();
        assert!(!backend.exists(Path::new("ab/cdef")));
        assert!(backend.exists(Path::new("ab/renamed")));
        backend.delete(Path::new("ab/renamed")).unwrap();
        assert!(!backend.exists(Path::new("ab/renamed")));
    }

    #[test]
    fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        backend.mkdir(Path::new("ab")).unwrap();
        backend.write(Path::new("ab/cdef"), b"hello").unwrap();
        assert!(backend.exists(Path::new("ab/cdef")));
        assert_eq!(backend.read(Path::new("ab/cdef")).unwrap(), b"hello");
        assert_eq!(backend.stat(Path::new("ab/cdef")).unwrap().len, 5);
        assert!(backend.stat(Path::new("ab")).unwrap().is_dir());
        let names = backend.list(Path::new("ab")).unwrap();
        assert_eq!(names, vec!["cdef".to_string()]);
    }

    #[test]
    fn memory_backend_rename_and_delete() {
        let backend = MemoryBackend::new();
        backend.write(Path::new("a.txt"), b"1").unwrap();
        backend
            .rename(Path::new("a.txt"), Path::new("dir/b.txt"))
            .unwrap();
        assert!(!backend.exists(Path::new("a.txt")));
        assert_eq!(backend.read(Path::new("dir/b.txt")).unwrap(), b"1");
        backend.delete(Path::new("dir/b.txt")).unwrap();
        assert!(backend.read(Path::new("dir/b.txt")).is_err());
    }

    #[test]
    fn memory_backend_missing_file_errors() {
        let backend = MemoryBackend::new();
        assert!(backend.read(Path::new("missing")).is_err());
        assert!(backend.delete(Path::new("missing")).is_err());
    }
}
