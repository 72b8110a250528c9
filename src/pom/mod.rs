//! Project descriptors (`pom.xml`): reading, patching, and resolving by identity.
//!
//! - [`model`]: read-only structured view of a descriptor
//! - [`patch`]: in-place rewrite of individual version values
//! - [`resolve`]: lookup of descriptors that are not on disk in the tree

pub mod model;
pub mod patch;
pub mod resolve;

use std::fs;
use std::io::Write;
use std::path::Path;

pub use model::{
    ArtifactIdentity, DeclaredVersion, Dependency, DistributionManagement, ModuleDescriptor,
    ParentRef, Scm,
};
pub use patch::Location;
pub use resolve::{LocalRepository, ProjectResolver, RemoteRepository, ResolverChain};

use crate::error::{BgavError, Result};

/// Replace `path` with `contents` via a sibling temp file, fsync and rename,
/// so a crash never leaves a half-written file behind.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map_or_else(|| "file".into(), |n| n.to_string_lossy());
    let tmp_path = dir.join(format!(".{name}.bgav.tmp"));

    let mut file = fs::File::create(&tmp_path).map_err(|e| BgavError::io(&tmp_path, e))?;
    file.write_all(contents)
        .map_err(|e| BgavError::io(&tmp_path, e))?;
    file.sync_all().map_err(|e| BgavError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        BgavError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pom.xml");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!dir.path().join(".pom.xml.bgav.tmp").exists());
    }

    #[test]
    fn write_atomic_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("pom.xml");
        assert!(matches!(
            write_atomic(&path, b"x"),
            Err(BgavError::Io { .. })
        ));
    }
}
