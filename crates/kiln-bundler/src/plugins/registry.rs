//! Phase-ordered collection of engine plugins.

use std::sync::Arc;

use rolldown_plugin::Plugin;
use rolldown_plugin::__inner::SharedPluginable;

/// Plugins run in phase order, lower first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginPhase {
    /// Modules that do not exist on disk.
    Virtual = 0,
    /// External classification and custom resolution.
    Resolve = 10,
    #[default]
    Transform = 20,
    PostProcess = 100,
}

/// Rolldown plugins tagged with their phase.
///
/// Sorting happens once in [`PluginRegistry::into_rolldown_plugins`]; the
/// sort is stable so plugins of one phase keep insertion order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<(PluginPhase, SharedPluginable)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<P: Plugin + 'static>(&mut self, plugin: P, phase: PluginPhase) {
        self.plugins.push((phase, Arc::new(plugin)));
    }

    pub fn into_rolldown_plugins(mut self) -> Vec<SharedPluginable> {
        self.plugins.sort_by_key(|(phase, _)| *phase);
        self.plugins.into_iter().map(|(_, plugin)| plugin).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
