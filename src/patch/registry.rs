//! Object registry: type name → factory.
//!
//! A registry is assembled once through `RegistryBuilder` and is immutable
//! afterwards. The built-in catalog lives in a lazily-initialized static and
//! is shared by every runtime in the process.

use crate::error::{PatchError, Result};
use crate::patch::object::PatchObject;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ObjectFactory = Box<dyn Fn() -> Box<dyn PatchObject> + Send + Sync>;

/// Catalog grouping used by host menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
    Audio,
    Data,
    Gui,
    Math,
    Sound,
}

impl ObjectCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ObjectCategory::Audio => "Audio",
            ObjectCategory::Data => "Data",
            ObjectCategory::Gui => "GUI",
            ObjectCategory::Math => "Math",
            ObjectCategory::Sound => "Sound",
        }
    }
}

impl std::fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDescriptor {
    pub type_name: &'static str,
    pub category: ObjectCategory,
    pub description: &'static str,
    /// At most one live instance per patch.
    pub singleton: bool,
}

struct Entry {
    descriptor: ObjectDescriptor,
    factory: ObjectFactory,
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<&'static str, Entry>,
    special: Vec<(&'static str, &'static str)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Re-registering a name replaces the earlier entry.
    pub fn register<F>(mut self, descriptor: ObjectDescriptor, factory: F) -> Self
    where
        F: Fn() -> Box<dyn PatchObject> + Send + Sync + 'static,
    {
        if self.entries.contains_key(descriptor.type_name) {
            tracing::warn!("Object type '{}' registered twice", descriptor.type_name);
        }
        self.entries.insert(
            descriptor.type_name,
            Entry {
                descriptor,
                factory: Box::new(factory),
            },
        );
        self
    }

    /// Declare that linking `from` into `to` triggers a special connection.
    pub fn special_connection(mut self, from: &'static str, to: &'static str) -> Self {
        self.special.push((from, to));
        self
    }

    pub fn build(self) -> ObjectRegistry {
        ObjectRegistry {
            entries: self.entries,
            special: self.special,
        }
    }
}

pub struct ObjectRegistry {
    entries: BTreeMap<&'static str, Entry>,
    special: Vec<(&'static str, &'static str)>,
}

static BUILTIN: Lazy<Arc<ObjectRegistry>> = Lazy::new(|| {
    let registry = crate::patch::objects::register_builtins(RegistryBuilder::new()).build();
    tracing::debug!("Built-in registry: {} object types", registry.len());
    Arc::new(registry)
});

impl ObjectRegistry {
    /// The process-wide catalog of built-in objects.
    pub fn builtin() -> Arc<ObjectRegistry> {
        BUILTIN.clone()
    }

    pub fn create(&self, type_name: &str) -> Result<Box<dyn PatchObject>> {
        self.entries
            .get(type_name)
            .map(|e| (e.factory)())
            .ok_or_else(|| PatchError::UnknownType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    pub fn descriptor(&self, type_name: &str) -> Option<&ObjectDescriptor> {
        self.entries.get(type_name).map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Descriptors grouped by category, each group sorted by name.
    pub fn catalog(&self) -> BTreeMap<ObjectCategory, Vec<&ObjectDescriptor>> {
        let mut catalog: BTreeMap<ObjectCategory, Vec<&ObjectDescriptor>> = BTreeMap::new();
        for entry in self.entries.values() {
            catalog
                .entry(entry.descriptor.category)
                .or_default()
                .push(&entry.descriptor);
        }
        catalog
    }

    pub fn is_special_connection(&self, from: &str, to: &str) -> bool {
        self.special.iter().any(|(f, t)| *f == from && *t == to)
    }
}
