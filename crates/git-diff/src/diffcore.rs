//! Diffcore transformation pipeline.
//!
//! Processes raw tree diff results through the rename/copy detection stage.

use bstr::BString;
use git_odb::ObjectDatabase;

use crate::rename::{detect_copies, detect_renames};
use crate::{DiffError, DiffOptions, DiffResult};

/// Run the diffcore pipeline on a raw diff result: exact-match rename and
/// copy detection (see [`crate::rename`]).
pub fn run_diffcore(
    odb: &ObjectDatabase,
    result: &mut DiffResult,
    options: &DiffOptions,
) -> Result<(), DiffError> {
    if options.detect_renames {
        detect_renames(odb, result)?;
    }

    if options.detect_copies {
        let all_files = result.files.clone();
        detect_copies(odb, result, &all_files)?;
    }

    Ok(())
}

/// Filter diff results by pathspec.
pub fn filter_pathspec(result: &mut DiffResult, pathspecs: &[BString]) {
    if pathspecs.is_empty() {
        return;
    }
    result.files.retain(|f| {
        let path = f.path();
        pathspecs
            .iter()
            .any(|spec| path.starts_with(spec.as_slice()))
    });
}
