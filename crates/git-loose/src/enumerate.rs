use std::path::PathBuf;

use git_hash::ObjectId;
use git_utils::backend::Backend;

use crate::{LooseError, LooseObjectStore};

/// Iterator over loose object OIDs.
///
/// Walks the fan-out directories (`00`–`ff`) under the objects directory and
/// yields each valid OID found, through the store's [`Backend`].
pub struct LooseObjectIter<'a> {
    backend: &'a dyn Backend,
    /// Sorted list of fan-out directory paths.
    dirs: Vec<PathBuf>,
    dir_index: usize,
    /// Sorted entries (file names) in the current fan-out directory.
    current_entries: Vec<String>,
    entry_index: usize,
    /// Two-char hex prefix of the current fan-out directory.
    current_prefix: String,
}

impl<'a> LooseObjectIter<'a> {
    fn new(backend: &'a dyn Backend, objects_dir: &std::path::Path) -> Result<Self, LooseError> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if backend.exists(objects_dir) {
            for name in backend.list(objects_dir)? {
                // Fan-out directories are exactly 2 hex chars.
                if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
                    let path = objects_dir.join(&name);
                    if backend.stat(&path).map(|s| s.is_dir()).unwrap_or(false) {
                        dirs.push(path);
                    }
                }
            }
        }
        dirs.sort();

        Ok(Self {
            backend,
            dirs,
            dir_index: 0,
            current_entries: Vec::new(),
            entry_index: 0,
            current_prefix: String::new(),
        })
    }

    /// Load entries from the next non-empty fan-out directory.
    fn advance_dir(&mut self) -> Result<bool, LooseError> {
        while self.dir_index < self.dirs.len() {
            let dir_path = self.dirs[self.dir_index].clone();
            self.dir_index += 1;
            self.current_prefix = dir_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_lowercase();

            let mut entries: Vec<String> = Vec::new();
            for name in self.backend.list(&dir_path)? {
                if self
                    .backend
                    .stat(&dir_path.join(&name))
                    .map(|s| s.is_file())
                    .unwrap_or(false)
                {
                    entries.push(name);
                }
            }
            entries.sort();

            if !entries.is_empty() {
                self.current_entries = entries;
                self.entry_index = 0;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<'a> Iterator for LooseObjectIter<'a> {
    type Item = Result<ObjectId, LooseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.entry_index < self.current_entries.len() {
                let filename = self.current_entries[self.entry_index].clone();
                self.entry_index += 1;

                // Skip non-hex filenames (temp files, etc.).
                if !filename.chars().all(|c| c.is_ascii_hexdigit()) {
                    continue;
                }

                let hex = format!("{}{}", self.current_prefix, filename);
                match ObjectId::from_hex(&hex) {
                    Ok(oid) => return Some(Ok(oid)),
                    Err(_) => continue,
                }
            }

            // Advance to the next fan-out directory.
            match self.advance_dir() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl LooseObjectStore {
    /// Iterate over all loose object OIDs.
    pub fn iter(&self) -> Result<LooseObjectIter<'_>, LooseError> {
        LooseObjectIter::new(self.backend(), self.objects_dir())
    }
}
