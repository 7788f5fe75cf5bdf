//! Class realms: isolated classpaths with explicit imports.

mod class_realm;
mod contents;
mod context;
mod manager;
mod world;

pub use class_realm::{
    ClassRealm, ClassRealmBuilder, ClasspathEntry, ImportPattern, LoadedClass, RealmId,
    class_resource,
};
pub use contents::{ArtifactContents, DirectoryContents};
pub use context::{ContextRealm, ContextRealmGuard, LookupRealmGuard};
pub use manager::{
    COMPATIBILITY_IMPORTS, CORE_CLASSES, CORE_EXPORTED_ARTIFACTS, CORE_EXPORTED_PACKAGES,
    CORE_REALM_ID, CoreExports, ForeignImport, RealmManager, artifact_set_hash, composite_key,
};
pub use world::{ClassWorld, WorldError};
