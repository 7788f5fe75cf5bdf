//! Dynamic values and named-property access.
//!
//! Expression evaluation walks dotted paths such as
//! `project.build.outputDirectory` across host objects. Instead of runtime
//! reflection, objects that can appear in such a path implement
//! [`PropertyAccess`]; most do so through a [`PropertyTable`] built once per
//! type and cached in a `static`.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A dynamically typed value flowing through expression evaluation and mojo
/// configuration.
#[derive(Debug, Clone)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// String.
    Str(String),
    /// Filesystem path.
    Path(PathBuf),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// A host object exposing named properties.
    Object(Arc<dyn PropertyAccess>),
}

impl Value {
    /// Short name of the value's kind, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
            Self::Path(_) => "path",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(o) => o.class_name(),
        }
    }

    /// Borrow the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the object payload, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&Arc<dyn PropertyAccess>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Downcast an object payload to a concrete host type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_object().and_then(|o| o.as_any().downcast_ref::<T>())
    }

    /// Render the value as text, the way it appears when interpolated into
    /// a larger string.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => s.clone(),
            Self::Path(p) => p.display().to_string(),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Self::to_text).collect();
                format!("[{}]", parts.join(", "))
            },
            Self::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.to_text()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            },
            Self::Object(o) => format!("{o:?}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for Value {
    fn from(p: &Path) -> Self {
        Self::Path(p.to_path_buf())
    }
}

impl<T: PropertyAccess + 'static> From<Arc<T>> for Value {
    fn from(o: Arc<T>) -> Self {
        Self::Object(o)
    }
}

/// A property getter failed while producing its value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to read property '{property}': {message}")]
pub struct PropertyError {
    /// Property being read.
    pub property: String,
    /// Failure description.
    pub message: String,
}

/// Result of reading a named property: `Ok(None)` means "no such property".
pub type PropertyResult = Result<Option<Value>, PropertyError>;

/// Capability to read named properties of a host object.
pub trait PropertyAccess: Send + Sync + fmt::Debug + Any {
    /// Fully qualified class name of the object, as seen by class realms.
    fn class_name(&self) -> &str;

    /// Read a named property.
    ///
    /// # Errors
    ///
    /// Returns a [`PropertyError`] if the property exists but producing its
    /// value failed.
    fn property(&self, name: &str) -> PropertyResult;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

enum Getter<T> {
    Plain(fn(&T) -> Option<Value>),
    Fallible(fn(&T) -> PropertyResult),
}

/// Per-type table of named property getters.
///
/// Build one per host type inside a `LazyLock` so lookups after the first
/// are a single hash probe.
pub struct PropertyTable<T: 'static> {
    class_name: &'static str,
    getters: HashMap<&'static str, Getter<T>>,
}

impl<T: 'static> PropertyTable<T> {
    /// Start a table for the given class name.
    #[must_use]
    pub fn new(class_name: &'static str) -> Self {
        Self {
            class_name,
            getters: HashMap::new(),
        }
    }

    /// Register an infallible getter.
    #[must_use]
    pub fn property(mut self, name: &'static str, getter: fn(&T) -> Option<Value>) -> Self {
        self.getters.insert(name, Getter::Plain(getter));
        self
    }

    /// Register a getter that may fail.
    #[must_use]
    pub fn fallible(mut self, name: &'static str, getter: fn(&T) -> PropertyResult) -> Self {
        self.getters.insert(name, Getter::Fallible(getter));
        self
    }

    /// Class name this table describes.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    /// Names of all registered properties, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.getters.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Read `name` from `target`.
    ///
    /// # Errors
    ///
    /// Propagates failures from fallible getters.
    pub fn get(&self, target: &T, name: &str) -> PropertyResult {
        match self.getters.get(name) {
            Some(Getter::Plain(f)) => Ok(f(target)),
            Some(Getter::Fallible(f)) => f(target),
            None => Ok(None),
        }
    }
}

impl<T: 'static> fmt::Debug for PropertyTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTable")
            .field("class_name", &self.class_name)
            .field("properties", &self.names())
            .finish()
    }
}

/// Wrap a string map as a `Value::Map`.
#[must_use]
pub fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Map(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
            .collect(),
    )
}
