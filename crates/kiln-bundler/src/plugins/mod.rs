//! Engine-neutral plugin model.
//!
//! A [`UnifiedPlugin`] wraps a [`PluginHooks`] handler together with the set of
//! hooks it implements, computed once at construction. Adapters translate
//! unified plugins into engine plugins (see [`crate::adapter`]); hooks an
//! engine cannot host are rejected per plugin rather than failing the build.
//!
//! Plugins are obtained from a [`PluginProviderRegistry`] by name.
//! Providers that report themselves unavailable are skipped with a warning.

mod builtin;
mod registry;
pub(crate) mod rolldown;

pub use builtin::{ReplacePlugin, ReplaceProvider};
pub use registry::{PluginPhase, PluginRegistry};

use std::fmt;
use std::ops::BitOr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use kiln_config::{OutputFormat, PluginOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    ResolveId,
    Load,
    Transform,
    RenderChunk,
}

impl HookKind {
    pub const ALL: [HookKind; 4] = [
        HookKind::ResolveId,
        HookKind::Load,
        HookKind::Transform,
        HookKind::RenderChunk,
    ];

    fn bit(self) -> u8 {
        match self {
            HookKind::ResolveId => 1,
            HookKind::Load => 1 << 1,
            HookKind::Transform => 1 << 2,
            HookKind::RenderChunk => 1 << 3,
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::ResolveId => "resolveId",
            HookKind::Load => "load",
            HookKind::Transform => "transform",
            HookKind::RenderChunk => "renderChunk",
        })
    }
}

/// Set of hooks a plugin implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet(u8);

impl HookSet {
    pub const fn empty() -> Self {
        HookSet(0)
    }

    pub fn contains(self, kind: HookKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = HookKind> {
        HookKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl From<HookKind> for HookSet {
    fn from(kind: HookKind) -> Self {
        HookSet(kind.bit())
    }
}

impl BitOr for HookKind {
    type Output = HookSet;

    fn bitor(self, rhs: HookKind) -> HookSet {
        HookSet(self.bit() | rhs.bit())
    }
}

impl BitOr<HookKind> for HookSet {
    type Output = HookSet;

    fn bitor(self, rhs: HookKind) -> HookSet {
        HookSet(self.0 | rhs.bit())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedId {
    pub id: String,
    pub external: bool,
}

/// What a `render_chunk` hook knows about the chunk it rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub file_name: String,
    pub format: OutputFormat,
    pub is_entry: bool,
}

/// Hook implementations. Every hook defaults to "not handled".
#[async_trait]
pub trait PluginHooks: Send + Sync {
    /// Hooks this handler implements; read once when wrapped.
    fn hooks(&self) -> HookSet;

    async fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
    ) -> anyhow::Result<Option<ResolvedId>> {
        Ok(None)
    }

    async fn load(&self, _id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn transform(&self, _id: &str, _code: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn render_chunk(
        &self,
        _code: &str,
        _chunk: &ChunkInfo,
    ) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct UnifiedPlugin {
    name: String,
    hooks: HookSet,
    phase: PluginPhase,
    handler: Arc<dyn PluginHooks>,
}

impl UnifiedPlugin {
    pub fn new(name: impl Into<String>, handler: impl PluginHooks + 'static) -> Self {
        Self::from_arc(name, Arc::new(handler))
    }

    pub fn from_arc(name: impl Into<String>, handler: Arc<dyn PluginHooks>) -> Self {
        let hooks = handler.hooks();
        Self {
            name: name.into(),
            hooks,
            phase: PluginPhase::Transform,
            handler,
        }
    }

    pub fn with_phase(mut self, phase: PluginPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> HookSet {
        self.hooks
    }

    pub fn phase(&self) -> PluginPhase {
        self.phase
    }

    pub fn handler(&self) -> &Arc<dyn PluginHooks> {
        &self.handler
    }

    pub fn implements(&self, kind: HookKind) -> bool {
        self.hooks.contains(kind)
    }
}

impl fmt::Debug for UnifiedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedPlugin")
            .field("name", &self.name)
            .field("hooks", &self.hooks.iter().collect::<Vec<_>>())
            .field("phase", &self.phase)
            .finish()
    }
}

/// A plugin a strategy would like in the build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub options: Value,
    /// Missing required plugins fail the build instead of warning.
    #[serde(default)]
    pub required: bool,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
            required: false,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl From<&PluginOptions> for PluginDescriptor {
    fn from(options: &PluginOptions) -> Self {
        Self {
            name: options.name.clone(),
            options: options.options.clone(),
            required: true,
        }
    }
}

/// Builds one kind of plugin.
pub trait PluginProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the plugin can run for the project at `root`.
    fn is_available(&self, _root: &Path) -> bool {
        true
    }

    fn instantiate(&self, options: &Value) -> anyhow::Result<UnifiedPlugin>;
}

/// Plugins resolved from descriptors, plus what was skipped and why.
#[derive(Debug, Default)]
pub struct ResolvedPlugins {
    pub plugins: Vec<UnifiedPlugin>,
    pub warnings: Vec<String>,
}

pub struct PluginProviderRegistry {
    providers: IndexMap<String, Arc<dyn PluginProvider>>,
}

impl Default for PluginProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: IndexMap::new(),
        }
    }

    /// Registry with the built-in providers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(ReplaceProvider);
        registry
    }

    pub fn register(&mut self, provider: impl PluginProvider + 'static) {
        let provider: Arc<dyn PluginProvider> = Arc::new(provider);
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PluginProvider>> {
        self.providers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Instantiate every descriptor, de-duplicated by name (first wins).
    pub fn resolve(&self, descriptors: &[PluginDescriptor], root: &Path) -> Result<ResolvedPlugins> {
        let mut resolved = ResolvedPlugins::default();
        let mut seen = Vec::new();

        for descriptor in descriptors {
            if seen.contains(&descriptor.name) {
                continue;
            }
            seen.push(descriptor.name.clone());

            let Some(provider) = self.providers.get(&descriptor.name) else {
                let message = format!("No provider registered for plugin '{}'", descriptor.name);
                if descriptor.required {
                    return Err(Error::Plugin {
                        plugin: descriptor.name.clone(),
                        message,
                    });
                }
                warn!("{message}, skipping");
                resolved.warnings.push(message);
                continue;
            };

            if !provider.is_available(root) {
                let message = format!("Plugin '{}' is not available, skipping", descriptor.name);
                warn!("{message}");
                resolved.warnings.push(message);
                continue;
            }

            match provider.instantiate(&descriptor.options) {
                Ok(plugin) => {
                    debug!(plugin = plugin.name(), "Instantiated plugin");
                    resolved.plugins.push(plugin);
                }
                Err(err) if descriptor.required => {
                    return Err(Error::Plugin {
                        plugin: descriptor.name.clone(),
                        message: format!("{err:#}"),
                    });
                }
                Err(err) => {
                    let message = format!("Plugin '{}' failed to initialize: {err:#}", descriptor.name);
                    warn!("{message}");
                    resolved.warnings.push(message);
                }
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl PluginHooks for Noop {
        fn hooks(&self) -> HookSet {
            HookKind::Transform | HookKind::RenderChunk
        }
    }

    struct Unavailable;

    impl PluginProvider for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn is_available(&self, _root: &Path) -> bool {
            false
        }

        fn instantiate(&self, _options: &Value) -> anyhow::Result<UnifiedPlugin> {
            Ok(UnifiedPlugin::new("unavailable", Noop))
        }
    }

    #[test]
    fn hook_set_is_computed_once() {
        let plugin = UnifiedPlugin::new("noop", Noop);
        assert!(plugin.implements(HookKind::Transform));
        assert!(!plugin.implements(HookKind::Load));
        assert_eq!(plugin.hooks().iter().count(), 2);
    }

    #[test]
    fn registry_skips_unavailable_and_unknown() {
        let mut registry = PluginProviderRegistry::new();
        registry.register(Unavailable);

        let resolved = registry
            .resolve(
                &[
                    PluginDescriptor::new("unavailable"),
                    PluginDescriptor::new("vue"),
                    PluginDescriptor::new("replace")
                        .with_options(json!({ "values": { "__DEV__": "false" } })),
                ],
                Path::new("."),
            )
            .unwrap();

        assert_eq!(resolved.plugins.len(), 1);
        assert_eq!(resolved.plugins[0].name(), "replace");
        assert_eq!(resolved.warnings.len(), 2);
    }

    #[test]
    fn missing_required_plugin_is_an_error() {
        let registry = PluginProviderRegistry::new();
        let err = registry
            .resolve(&[PluginDescriptor::new("svelte").required()], Path::new("."))
            .unwrap_err();
        assert_eq!(err.code(), "PLUGIN_ERROR");
    }
}
