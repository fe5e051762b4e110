//! Instance registry
//!
//! Process-lifetime table from an input's remote name to the handle already
//! created for it, so an input shared by several scenes is created once.
//! Nothing here is persisted; restart recovery is the ownership ledger's job.

use crate::handle::Input;
use scenesync_model::InputDeclaration;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    input: Input,
    applied: InputDeclaration,
}

/// Registry of input handles created during this session
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    inputs: HashMap<String, Entry>,
}

impl InstanceRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle registered under `name`
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Input> {
        self.inputs.get(name).map(|e| &e.input)
    }

    /// Check if `name` has been instantiated
    #[inline]
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    /// Register a handle along with the declaration last applied to it
    ///
    /// Re-registering a name replaces the applied declaration.
    pub fn register(&mut self, input: Input, applied: InputDeclaration) {
        self.inputs
            .insert(input.name().to_string(), Entry { input, applied });
    }

    /// Declaration last applied to `name`
    #[inline]
    #[must_use]
    pub fn applied(&self, name: &str) -> Option<&InputDeclaration> {
        self.inputs.get(name).map(|e| &e.applied)
    }

    /// Drop `name`, e.g. after the remote object was deleted
    pub fn remove(&mut self, name: &str) -> Option<Input> {
        self.inputs.remove(name).map(|e| e.input)
    }

    /// Drop every entry
    #[inline]
    pub fn clear(&mut self) {
        self.inputs.clear();
    }

    /// Registered names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}
