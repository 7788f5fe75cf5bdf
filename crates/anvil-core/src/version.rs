//! Snapshot version normalization.
//!
//! Repositories publish snapshots under timestamped versions
//! (`1.0-20240115.103000-7`). Within one build every timestamp of the same
//! snapshot must map to one cache entry, so keys use the base form
//! (`1.0-SNAPSHOT`).

use std::sync::LazyLock;

use regex::Regex;

/// Suffix marking a snapshot base version.
pub const SNAPSHOT: &str = "SNAPSHOT";

static TIMESTAMPED_SNAPSHOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)-(\d{8}\.\d{6})-(\d+)$").expect("invalid regex"));

/// Whether `version` is a snapshot, timestamped or not.
#[must_use]
pub fn is_snapshot(version: &str) -> bool {
    version.ends_with(SNAPSHOT) || TIMESTAMPED_SNAPSHOT.is_match(version)
}

/// Collapse a timestamped snapshot version to its `-SNAPSHOT` base form.
///
/// Release versions and already-normalized snapshots are returned unchanged.
#[must_use]
pub fn to_snapshot_version(version: &str) -> String {
    match TIMESTAMPED_SNAPSHOT.captures(version) {
        Some(caps) => format!("{}-{SNAPSHOT}", &caps[1]),
        None => version.to_string(),
    }
}
