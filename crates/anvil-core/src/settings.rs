//! User settings.

use std::any::Any;
use std::path::PathBuf;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::value::{PropertyAccess, PropertyResult, PropertyTable, Value};

/// Effective user settings for a build session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local repository directory.
    pub local_repository: PathBuf,
    /// Work offline.
    pub offline: bool,
    /// Allow interactive prompts.
    pub interactive_mode: bool,
    /// Explicitly activated profiles.
    pub active_profiles: Vec<String>,
    /// Additional plugin group prefixes searched for goal prefixes.
    pub plugin_groups: Vec<String>,
}

impl Settings {
    /// Settings pointing at the given local repository.
    #[must_use]
    pub fn new(local_repository: impl Into<PathBuf>) -> Self {
        Self {
            local_repository: local_repository.into(),
            interactive_mode: true,
            ..Self::default()
        }
    }
}

static SETTINGS: LazyLock<PropertyTable<Settings>> = LazyLock::new(|| {
    PropertyTable::<Settings>::new("anvil.settings.Settings")
        .property("localRepository", |s| {
            Some(Value::from(s.local_repository.as_path()))
        })
        .property("offline", |s| Some(Value::Bool(s.offline)))
        .property("interactiveMode", |s| Some(Value::Bool(s.interactive_mode)))
        .property("activeProfiles", |s| {
            Some(Value::List(
                s.active_profiles.iter().map(Value::from).collect(),
            ))
        })
        .property("pluginGroups", |s| {
            Some(Value::List(s.plugin_groups.iter().map(Value::from).collect()))
        })
});

impl PropertyAccess for Settings {
    fn class_name(&self) -> &str {
        SETTINGS.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        SETTINGS.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_properties() {
        let mut settings = Settings::new("/home/user/.anvil/repository");
        settings.active_profiles.push("ci".into());

        assert_eq!(
            settings.property("localRepository").unwrap(),
            Some(Value::Path("/home/user/.anvil/repository".into()))
        );
        assert_eq!(
            settings.property("interactiveMode").unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(
            settings.property("activeProfiles").unwrap(),
            Some(Value::List(vec![Value::from("ci")]))
        );
    }

    #[test]
    fn test_settings_deserialize_defaults() {
        let settings: Settings = toml::from_str("offline = true").unwrap();
        assert!(settings.offline);
        assert!(settings.active_profiles.is_empty());
    }
}
