//! In-memory artifact contents.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_plugin::ArtifactContents;
use anvil_plugin::realm::class_resource;
use dashmap::DashMap;

/// Artifact entries held in memory, keyed by artifact location.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactContents {
    locations: Arc<DashMap<PathBuf, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryArtifactContents {
    /// Create empty contents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `location` exist with no entries.
    pub fn add_location(&self, location: impl Into<PathBuf>) {
        self.locations.entry(location.into()).or_default();
    }

    /// Add an entry to the artifact at `location`.
    pub fn add_entry(&self, location: impl Into<PathBuf>, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.locations
            .entry(location.into())
            .or_default()
            .insert(name.into(), bytes.into());
    }

    /// Add an empty class file for `class_name`.
    pub fn add_class(&self, location: impl Into<PathBuf>, class_name: &str) {
        self.add_entry(location, class_resource(class_name), Vec::new());
    }
}

impl ArtifactContents for MemoryArtifactContents {
    fn entries(&self, location: &Path) -> io::Result<Arc<BTreeSet<String>>> {
        let entries = self.locations.get(location).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no artifact at {}", location.display()),
            )
        })?;
        Ok(Arc::new(entries.keys().cloned().collect()))
    }

    fn read(&self, location: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .locations
            .get(location)
            .and_then(|entries| entries.get(name).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_and_read() {
        let contents = MemoryArtifactContents::new();
        contents.add_class("/repo/a", "org.example.Echo");
        contents.add_entry("/repo/a", "META-INF/anvil/plugin.toml", "x = 1");

        let entries = contents.entries(Path::new("/repo/a")).unwrap();
        assert!(entries.contains("org/example/Echo.class"));
        assert_eq!(
            contents
                .read(Path::new("/repo/a"), "META-INF/anvil/plugin.toml")
                .unwrap()
                .as_deref(),
            Some(&b"x = 1"[..])
        );
        assert!(contents.read(Path::new("/repo/a"), "missing").unwrap().is_none());
        assert!(contents.entries(Path::new("/repo/b")).is_err());
    }
}
