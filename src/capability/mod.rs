//! Capability export table - late-bound native function sharing
//!
//! Design: one bridge module publishes a table of native function pointers
//! under a versioned name; other, independently compiled bridge modules
//! resolve and bind to it at runtime. Resolution goes through the runtime's
//! own module loading rather than the native linker, so an importer needs
//! only the exporter's function-kind declarations at compile time, never its
//! object code.
//!
//! Publication happens during single-threaded module initialization and
//! tables are immutable afterwards, so lookups need no locking. A duplicate
//! name is a startup-time fatal condition, not a recoverable error:
//! capability names are unique per process.

use crate::error::{fatal_violation, BridgeError};
use crate::logging::{log_capability_imported, log_capability_published};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
mod tests;

/// Process-wide capability registry
static CAPABILITIES: Lazy<CapabilityRegistry> = Lazy::new(CapabilityRegistry::new);

/// Get the process-wide registry instance
pub fn global() -> &'static CapabilityRegistry {
    &CAPABILITIES
}

/// Exported native function pointer
///
/// Importers cast back to the concrete `extern "C" fn` type declared by the
/// exporter and call through it exactly as if statically linked.
#[derive(Clone, Copy)]
pub struct CapabilityFn(*const ());

// Safety: the wrapped pointer designates immutable native code, never data.
unsafe impl Send for CapabilityFn {}
unsafe impl Sync for CapabilityFn {}

impl CapabilityFn {
    pub const fn new(ptr: *const ()) -> Self {
        Self(ptr)
    }

    pub const fn as_ptr(self) -> *const () {
        self.0
    }

    /// Cast back to a concrete function pointer type
    ///
    /// # Safety
    /// `F` must be the exact `extern "C" fn` type the exporter declared for
    /// this entry; calling through a mismatched type is undefined behavior.
    pub unsafe fn cast<F: Copy>(self) -> F {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*const ()>(),
            "capability entries must be plain function pointers"
        );
        std::mem::transmute_copy(&self.0)
    }
}

impl std::fmt::Debug for CapabilityFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapabilityFn({:p})", self.0)
    }
}

/// Immutable, versioned table of named native entry points
pub struct CapabilityTable {
    name: String,
    version: u32,
    entries: HashMap<String, CapabilityFn>,
}

impl CapabilityTable {
    /// Capability name, of the form `"<module>.<capability>"`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Published version (single monotonically increasing integer)
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Look up one entry by name
    pub fn entry(&self, name: &str) -> Option<CapabilityFn> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of all entries, in no particular order
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityTable")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Process-wide registry of published capability tables
///
/// Explicit, injectable state with init-on-first-publish: constructible for
/// isolated testing, with a process-wide default behind [`global`]. Names
/// are never removed during normal operation.
pub struct CapabilityRegistry {
    tables: DashMap<String, Arc<CapabilityTable>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Publish a table under a versioned name
    ///
    /// Called during single-threaded module initialization. A malformed
    /// name or a name already published by another module instance is a
    /// startup-time fatal condition.
    pub fn publish(
        &self,
        name: &str,
        version: u32,
        entries: impl IntoIterator<Item = (String, CapabilityFn)>,
    ) -> Arc<CapabilityTable> {
        if !is_valid_name(name) {
            fatal_violation("capability name must have the form '<module>.<capability>'");
        }

        let table = Arc::new(CapabilityTable {
            name: name.to_string(),
            version,
            entries: entries.into_iter().collect(),
        });

        // Check before inserting so the table already published under this
        // name is never clobbered on the way to the fatal report.
        match self.tables.entry(name.to_string()) {
            Entry::Occupied(_) => {
                fatal_violation("capability name published twice in one process")
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&table));
            }
        }

        log_capability_published(name, version, table.len());
        table
    }

    /// Resolve a published table by name and minimum version
    ///
    /// Fails `Import` when the name is absent or the published version is
    /// less than `min_version`. The returned table is read-only.
    pub fn import(
        &self,
        name: &str,
        min_version: u32,
    ) -> Result<Arc<CapabilityTable>, BridgeError> {
        let table = self
            .tables
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BridgeError::Import {
                name: name.to_string(),
                message: "not published".into(),
            })?;

        if table.version < min_version {
            return Err(BridgeError::Import {
                name: name.to_string(),
                message: format!(
                    "published version {} is older than required {}",
                    table.version, min_version
                ),
            });
        }

        log_capability_imported(name, table.version);
        Ok(table)
    }

    /// Whether a name has been published
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Number of published tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((module, capability)) => !module.is_empty() && !capability.is_empty(),
        None => false,
    }
}
