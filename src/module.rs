//! Bridge module descriptor - bindings and published capabilities
//!
//! A bridge module declares its native entry points once at load time and
//! may publish them as a capability table so independently compiled bridge
//! modules can bind to them at runtime without static linkage.

use crate::capability::{CapabilityRegistry, CapabilityTable};
use crate::marshal::NativeFunctionBinding;
use std::collections::HashMap;
use std::sync::Arc;

/// One independently compiled bridge module
///
/// Built during module initialization and immutable once loading completes.
pub struct BridgeModule {
    name: String,
    bindings: HashMap<String, NativeFunctionBinding>,
}

impl BridgeModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: HashMap::new(),
        }
    }

    /// Module name, the `<module>` half of published capability names
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare one entry point (module load time only)
    pub fn bind(mut self, binding: NativeFunctionBinding) -> Self {
        self.bindings.insert(binding.name().to_string(), binding);
        self
    }

    /// Look up a declared binding
    pub fn binding(&self, name: &str) -> Option<&NativeFunctionBinding> {
        self.bindings.get(name)
    }

    /// Number of declared bindings
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Publish this module's entry points as `"<module>.<capability>"`
    ///
    /// Follows publication rules: startup-time fatal on a duplicate name.
    pub fn publish_capability(
        &self,
        registry: &CapabilityRegistry,
        capability: &str,
        version: u32,
    ) -> Arc<CapabilityTable> {
        let name = format!("{}.{}", self.name, capability);
        registry.publish(
            &name,
            version,
            self.bindings
                .iter()
                .map(|(entry_name, binding)| (entry_name.clone(), binding.entry())),
        )
    }
}

impl std::fmt::Debug for BridgeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeModule")
            .field("name", &self.name)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
