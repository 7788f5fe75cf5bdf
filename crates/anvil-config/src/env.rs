//! Environment variable fallbacks.
//!
//! `ANVIL_*` variables only fill fields that no config file set explicitly;
//! a value written in a file always wins over the environment.

use std::collections::HashMap;

use tracing::warn;

use crate::merge::{ConfigLayer, FieldSources};

/// How an environment value is converted into TOML.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
}

/// Variable name → (dotted field path, value kind).
const ENV_FIELDS: &[(&str, &str, Kind)] = &[
    ("ANVIL_LOG_LEVEL", "logging.level", Kind::Str),
    ("ANVIL_LOG_FORMAT", "logging.format", Kind::Str),
    ("ANVIL_EXECUTOR_THREADS", "executor.threads", Kind::Int),
    ("ANVIL_RUNTIME_VERSION", "plugins.runtime_version", Kind::Str),
    ("ANVIL_LEGACY_EVALUATOR", "plugins.legacy_evaluator", Kind::Bool),
    ("ANVIL_FLUSH_ON_BUILD_END", "cache.flush_on_build_end", Kind::Bool),
];

/// Snapshot the `ANVIL_*` environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("ANVIL_"))
        .collect()
}

/// Apply environment fallbacks to fields still at their default.
///
/// Returns the number of fields set from the environment.
pub fn apply_env_fallbacks(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env: &HashMap<String, String>,
) -> usize {
    let mut applied = 0usize;
    for (var, path, kind) in ENV_FIELDS {
        let Some(raw) = env.get(*var) else {
            continue;
        };
        if sources
            .get(*path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }
        let Some(value) = convert(raw, *kind) else {
            warn!(var, value = %raw, "ignoring malformed environment override");
            continue;
        };
        if set_path(merged, path, value) {
            sources.insert((*path).to_owned(), ConfigLayer::Environment((*var).to_owned()));
            applied = applied.saturating_add(1);
        }
    }
    applied
}

fn convert(raw: &str, kind: Kind) -> Option<toml::Value> {
    match kind {
        Kind::Str => Some(toml::Value::String(raw.to_owned())),
        Kind::Int => raw.trim().parse::<i64>().ok().map(toml::Value::Integer),
        Kind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Some(toml::Value::Boolean(false)),
            _ => None,
        },
    }
}

fn set_path(root: &mut toml::Value, path: &str, value: toml::Value) -> bool {
    let mut parts = path.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        let Some(table) = node.as_table_mut() else {
            return false;
        };
        if parts.peek().is_none() {
            table.insert(part.to_owned(), value);
            return true;
        }
        node = table
            .entry(part.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_env_fills_default_fields() {
        let mut merged: toml::Value = toml::from_str("[executor]\nthreads = 4").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("executor.threads".into(), ConfigLayer::Defaults);

        let n = apply_env_fallbacks(
            &mut merged,
            &mut sources,
            &env(&[("ANVIL_EXECUTOR_THREADS", "12"), ("ANVIL_LEGACY_EVALUATOR", "yes")]),
        );
        assert_eq!(n, 2);
        assert_eq!(merged["executor"]["threads"].as_integer(), Some(12));
        assert_eq!(merged["plugins"]["legacy_evaluator"].as_bool(), Some(true));
    }

    #[test]
    fn test_env_does_not_override_files() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".into(), ConfigLayer::User);

        let n = apply_env_fallbacks(&mut merged, &mut sources, &env(&[("ANVIL_LOG_LEVEL", "trace")]));
        assert_eq!(n, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn test_malformed_env_ignored() {
        let mut merged: toml::Value = toml::from_str("[executor]\nthreads = 4").unwrap();
        let mut sources = FieldSources::new();
        let n = apply_env_fallbacks(
            &mut merged,
            &mut sources,
            &env(&[("ANVIL_EXECUTOR_THREADS", "many")]),
        );
        assert_eq!(n, 0);
        assert_eq!(merged["executor"]["threads"].as_integer(), Some(4));
    }
}
