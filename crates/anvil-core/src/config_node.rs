//! Attribute/child configuration trees.
//!
//! Plugin configuration is a tree of named nodes, each with an optional text
//! value, string attributes and ordered children. Configuration declared at
//! several levels is combined with [`ConfigNode::merge`], where the dominant
//! tree wins and the recessive tree fills gaps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute on a dominant node controlling how its children merge.
pub const COMBINE_CHILDREN: &str = "combine.children";
/// Attribute on a dominant node controlling whether it merges at all.
pub const COMBINE_SELF: &str = "combine.self";
/// `combine.children` value: append recessive children after dominant ones.
pub const CHILDREN_APPEND: &str = "append";
/// `combine.self` value: ignore the recessive node entirely.
pub const SELF_OVERRIDE: &str = "override";

/// A node of a configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigNode {
    /// Element name.
    pub name: String,
    /// Text value.
    #[serde(default)]
    pub value: Option<String>,
    /// Attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Ordered children.
    #[serde(default)]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    /// Create an empty node.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a leaf node carrying a value.
    #[must_use]
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name).with_value(value)
    }

    /// Set the text value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    /// First child with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether the node has neither a value nor children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.as_deref().is_none_or(str::is_empty) && self.children.is_empty()
    }

    /// Merge `recessive` into a copy of `dominant`.
    ///
    /// Either side may be absent. The dominant value and attributes win;
    /// missing ones are filled from the recessive node. Children merge by name
    /// unless the dominant node asks for `combine.children="append"`.
    #[must_use]
    pub fn merge(dominant: Option<&ConfigNode>, recessive: Option<&ConfigNode>) -> Option<Self> {
        match (dominant, recessive) {
            (None, None) => None,
            (Some(d), None) => Some(d.clone()),
            (None, Some(r)) => Some(r.clone()),
            (Some(d), Some(r)) => {
                let mut merged = d.clone();
                merge_into(&mut merged, r);
                Some(merged)
            },
        }
    }

    /// Merge a sequence of levels where later levels take precedence.
    #[must_use]
    pub fn merge_levels<'a, I>(levels: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<&'a ConfigNode>>,
    {
        levels.into_iter().fold(None, |acc, level| {
            ConfigNode::merge(level, acc.as_ref())
        })
    }

    /// Keep only the children whose names satisfy `keep`.
    #[must_use]
    pub fn retain_children<F>(mut self, keep: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        self.children.retain(|c| keep(&c.name));
        self
    }
}

fn merge_into(dominant: &mut ConfigNode, recessive: &ConfigNode) {
    if dominant.attribute(COMBINE_SELF) == Some(SELF_OVERRIDE) {
        return;
    }

    if dominant.value.as_deref().is_none_or(str::is_empty) && recessive.value.is_some() {
        dominant.value.clone_from(&recessive.value);
    }
    for (name, value) in &recessive.attributes {
        dominant
            .attributes
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }

    if recessive.children.is_empty() {
        return;
    }

    if dominant.attribute(COMBINE_CHILDREN) == Some(CHILDREN_APPEND) {
        dominant.children.extend(recessive.children.iter().cloned());
        return;
    }

    // Pair same-named children by position; recessive names unknown to the
    // dominant side are appended.
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let mut appended = Vec::new();
    for child in &recessive.children {
        let index = seen.entry(child.name.as_str()).or_insert(0);
        let position = *index;
        *index = index.saturating_add(1);

        let has_any = dominant.children.iter().any(|c| c.name == child.name);
        let target = dominant
            .children
            .iter_mut()
            .filter(|c| c.name == child.name)
            .nth(position);
        if let Some(target) = target {
            merge_into(target, child);
        } else if !has_any {
            appended.push(child.clone());
        }
    }
    dominant.children.extend(appended);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_value_wins() {
        let d = ConfigNode::new("configuration").with_child(ConfigNode::leaf("source", "17"));
        let r = ConfigNode::new("configuration")
            .with_child(ConfigNode::leaf("source", "11"))
            .with_child(ConfigNode::leaf("target", "11"));

        let merged = ConfigNode::merge(Some(&d), Some(&r)).unwrap();
        assert_eq!(merged.child("source").unwrap().value.as_deref(), Some("17"));
        assert_eq!(merged.child("target").unwrap().value.as_deref(), Some("11"));
    }

    #[test]
    fn test_recessive_fills_empty_value_and_attributes() {
        let d = ConfigNode::new("outputDirectory");
        let r = ConfigNode::leaf("outputDirectory", "${project.build.outputDirectory}")
            .with_attribute("default-value", "target/classes");

        let merged = ConfigNode::merge(Some(&d), Some(&r)).unwrap();
        assert_eq!(
            merged.value.as_deref(),
            Some("${project.build.outputDirectory}")
        );
        assert_eq!(merged.attribute("default-value"), Some("target/classes"));
    }

    #[test]
    fn test_append_children() {
        let d = ConfigNode::new("args")
            .with_attribute(COMBINE_CHILDREN, CHILDREN_APPEND)
            .with_child(ConfigNode::leaf("arg", "-a"));
        let r = ConfigNode::new("args").with_child(ConfigNode::leaf("arg", "-b"));

        let merged = ConfigNode::merge(Some(&d), Some(&r)).unwrap();
        let values: Vec<_> = merged
            .children
            .iter()
            .map(|c| c.value.as_deref().unwrap())
            .collect();
        assert_eq!(values, vec!["-a", "-b"]);
    }

    #[test]
    fn test_combine_self_override() {
        let d = ConfigNode::new("excludes").with_attribute(COMBINE_SELF, SELF_OVERRIDE);
        let r = ConfigNode::new("excludes").with_child(ConfigNode::leaf("exclude", "**/*.tmp"));
        let merged = ConfigNode::merge(Some(&d), Some(&r)).unwrap();
        assert!(merged.children.is_empty());
    }

    #[test]
    fn test_merge_levels_later_wins() {
        let plugin = ConfigNode::new("configuration").with_child(ConfigNode::leaf("level", "plugin"));
        let execution =
            ConfigNode::new("configuration").with_child(ConfigNode::leaf("level", "execution"));
        let goal = ConfigNode::new("configuration").with_child(ConfigNode::leaf("level", "goal"));

        let merged =
            ConfigNode::merge_levels([Some(&plugin), Some(&execution), Some(&goal)]).unwrap();
        assert_eq!(merged.child("level").unwrap().value.as_deref(), Some("goal"));

        let merged = ConfigNode::merge_levels([Some(&plugin), None, Some(&execution)]).unwrap();
        assert_eq!(
            merged.child("level").unwrap().value.as_deref(),
            Some("execution")
        );
    }
}
