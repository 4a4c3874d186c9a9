//! Plugins shipped with grab-core.

pub mod direct;
pub mod har;

use crate::registry::{PluginRegistry, RegistryBuilder};

/// Registers every built-in plugin. The HAR plugin goes first so `.har`
/// identifiers are never mistaken for anything else.
pub fn register_builtin(builder: RegistryBuilder) -> RegistryBuilder {
    builder.register_all(har::register).register_all(direct::register)
}

/// Registry holding only the built-in plugins.
pub fn builtin() -> PluginRegistry {
    register_builtin(PluginRegistry::builder()).build()
}
