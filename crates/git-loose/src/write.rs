use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::header;
use git_object::{Object, ObjectType};
use git_utils::backend::Backend;

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    /// Write an object to the loose store. Returns the OID.
    ///
    /// No-op if the object already exists (idempotent).
    /// The file is written atomically (temp file + rename).
    pub fn write(&self, obj: &Object) -> Result<ObjectId, LooseError> {
        let content = obj.serialize_content();
        self.write_raw(obj.object_type(), &content)
    }

    /// Write raw bytes with a known type. Returns the OID.
    ///
    /// No-op if the object already exists (idempotent).
    pub fn write_raw(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(obj_type, content.len());

        // Compute the OID from uncompressed header + content.
        let oid = {
            let mut hasher = Hasher::new(self.hash_algo());
            hasher.update(&hdr);
            hasher.update(content);
            hasher.finalize()?
        };

        // Skip if object already exists.
        if self.contains(&oid) {
            return Ok(oid);
        }

        // Ensure the fan-out directory exists.
        let final_path = self.object_path(&oid);
        if let Some(parent) = final_path.parent() {
            self.backend().mkdir(parent)?;
        }

        // Compress header + content, write to a temp path, then move into place
        // atomically so a reader never observes a partial object.
        let compressed = compress(&hdr, content, self.compression_level);
        let tmp_path = self.temp_path();
        self.backend().write(&tmp_path, &compressed)?;

        finalize_object(self.backend(), &tmp_path, &final_path)?;

        Ok(oid)
    }

    /// Write from a stream with known type and size. Returns the OID.
    pub fn write_stream(
        &self,
        obj_type: ObjectType,
        size: usize,
        reader: &mut dyn std::io::Read,
    ) -> Result<ObjectId, LooseError> {
        let mut content = Vec::with_capacity(size);
        reader.read_to_end(&mut content)?;

        if content.len() != size {
            return Err(LooseError::Corrupt {
                oid: String::new(),
                reason: format!(
                    "stream size mismatch: declared {}, got {}",
                    size,
                    content.len()
                ),
            });
        }

        self.write_raw(obj_type, &content)
    }

    /// A process- and time-unique temp file name under the objects directory.
    fn temp_path(&self) -> std::path::PathBuf {
        self.objects_dir().join(format!(
            "tmp_obj_{}",
            std::process::id()
                ^ std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos()
        ))
    }
}

/// Zlib-compress header + content into one buffer.
fn compress(hdr: &[u8], content: &[u8], level: flate2::Compression) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(hdr).expect("writing to an in-memory buffer cannot fail");
    encoder.write_all(content).expect("writing to an in-memory buffer cannot fail");
    encoder.finish().expect("flushing an in-memory buffer cannot fail")
}

/// Atomically move a temp file to its final destination.
///
/// If the destination already exists (race with another writer), the temp file
/// is removed and the write is treated as successful (content-addressed idempotency).
fn finalize_object(backend: &dyn Backend, tmp: &Path, final_path: &Path) -> Result<(), LooseError> {
    match backend.rename(tmp, final_path) {
        Ok(()) => Ok(()),
        Err(_) if backend.exists(final_path) => {
            // Another writer won the race — clean up our temp file.
            let _ = backend.delete(tmp);
            Ok(())
        }
        Err(e) => {
            let _ = backend.delete(tmp);
            Err(LooseError::Io(e))
        }
    }
}
