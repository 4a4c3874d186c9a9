//! Plugin registry: identifier -> task resolution.
//!
//! Built once at startup through [`RegistryBuilder`] and passed by reference
//! afterwards; it is never mutated once built. Resolution asks each plugin in
//! registration order and the first one that claims the identifier wins.

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::task::{Task, TaskHandle};

/// Object-safe claim interface stored by the registry.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap string inspection only; no I/O. `None` if the identifier is not ours.
    fn try_claim(&self, identifier: &str) -> Option<Box<dyn Task>>;
}

/// Convenience for task types that construct themselves from an identifier.
pub trait FromIdentifier: Task + Sized {
    const NAME: &'static str;

    fn from_identifier(identifier: &str) -> Option<Self>;
}

struct Claimer<T>(PhantomData<fn() -> T>);

impl<T: FromIdentifier> Plugin for Claimer<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn try_claim(&self, identifier: &str) -> Option<Box<dyn Task>> {
        T::from_identifier(identifier).map(|t| Box::new(t) as Box<dyn Task>)
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    plugins: Vec<Box<dyn Plugin>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: FromIdentifier>(self) -> Self {
        self.register_plugin(Claimer::<T>(PhantomData))
    }

    pub fn register_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        tracing::debug!(plugin = plugin.name(), "plugin registered");
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Hands the builder to a module's registration entry point.
    pub fn register_all(self, register: impl FnOnce(Self) -> Self) -> Self {
        register(self)
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: self.plugins,
        }
    }
}

pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Plugin names in resolution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Task for `identifier` from the first plugin that claims it.
    pub fn resolve(&self, identifier: &str) -> Result<TaskHandle> {
        for plugin in &self.plugins {
            if let Some(task) = plugin.try_claim(identifier) {
                tracing::debug!(plugin = plugin.name(), identifier, "identifier claimed");
                return Ok(TaskHandle::new(plugin.name(), task));
            }
        }
        Err(Error::UnsupportedIdentifier(identifier.to_string()))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
