//! `grab plugins` – list registered plugins.

use grab_core::PluginRegistry;

pub fn run_plugins(registry: &PluginRegistry) {
    for (i, name) in registry.names().into_iter().enumerate() {
        println!("{:<3} {}", i + 1, name);
    }
}
