//! Access to the entries packaged in an artifact.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

/// Lists and reads the entries of a resolved artifact location.
///
/// Entry names use `/` separators and are relative to the artifact root,
/// e.g. `org/example/Mojo.class` or `META-INF/anvil/plugin.toml`.
pub trait ArtifactContents: Send + Sync + fmt::Debug {
    /// All entry names under `location`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the location cannot be listed.
    fn entries(&self, location: &Path) -> io::Result<Arc<BTreeSet<String>>>;

    /// Read one entry, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the entry exists but cannot be read.
    fn read(&self, location: &Path, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Artifacts exploded into directories on the local filesystem.
///
/// A location that is a regular file (a packed archive) has no readable
/// entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryContents;

impl ArtifactContents for DirectoryContents {
    fn entries(&self, location: &Path) -> io::Result<Arc<BTreeSet<String>>> {
        let metadata = std::fs::metadata(location)?;
        if !metadata.is_dir() {
            return Ok(Arc::new(BTreeSet::new()));
        }

        let mut names = BTreeSet::new();
        for entry in WalkDir::new(location).follow_links(true) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(location) else {
                continue;
            };
            let name: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            names.insert(name.join("/"));
        }
        Ok(Arc::new(names))
    }

    fn read(&self, location: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
        if !location.is_dir() {
            return Ok(None);
        }
        let path = name
            .split('/')
            .filter(|seg| !seg.is_empty())
            .fold(location.to_path_buf(), |acc, seg| acc.join(seg));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("org/example")).unwrap();
        std::fs::write(dir.path().join("org/example/Mojo.class"), b"").unwrap();
        std::fs::create_dir_all(dir.path().join("META-INF/anvil")).unwrap();
        std::fs::write(dir.path().join("META-INF/anvil/plugin.toml"), b"x = 1").unwrap();

        let entries = DirectoryContents.entries(dir.path()).unwrap();
        assert!(entries.contains("org/example/Mojo.class"));
        assert!(entries.contains("META-INF/anvil/plugin.toml"));
        assert_eq!(entries.len(), 2);

        let bytes = DirectoryContents
            .read(dir.path(), "META-INF/anvil/plugin.toml")
            .unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"x = 1"[..]));
        assert!(DirectoryContents.read(dir.path(), "missing").unwrap().is_none());
    }

    #[test]
    fn test_regular_file_has_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("lib.jar");
        std::fs::write(&jar, b"PK").unwrap();
        assert!(DirectoryContents.entries(&jar).unwrap().is_empty());
    }

    #[test]
    fn test_missing_location_is_error() {
        assert!(DirectoryContents.entries(Path::new("/nonexistent/lib")).is_err());
    }
}
