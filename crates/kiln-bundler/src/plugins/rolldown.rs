//! Rolldown plugins: the unified-plugin bridge plus the plugins the rolldown
//! engine installs itself (external classification, virtual entries).

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rolldown_common::{ModuleType, ResolvedExternal};
use rolldown_plugin::{
    HookLoadArgs, HookLoadOutput, HookLoadReturn, HookResolveIdArgs, HookResolveIdOutput,
    HookResolveIdReturn, HookTransformArgs, HookTransformOutput, HookTransformReturn, HookUsage,
    Plugin, PluginContext, SharedTransformPluginContext,
};

use super::{HookKind, UnifiedPlugin};
use crate::unified::External;

/// Hosts a [`UnifiedPlugin`] inside rolldown.
///
/// `render_chunk` is not forwarded; the adapter driver runs it on emitted
/// chunks for every engine.
#[derive(Debug, Clone)]
pub(crate) struct BridgePlugin {
    plugin: UnifiedPlugin,
}

impl BridgePlugin {
    pub fn new(plugin: UnifiedPlugin) -> Self {
        Self { plugin }
    }

    /// Hooks rolldown can host for this plugin.
    pub fn hosts_any(plugin: &UnifiedPlugin) -> bool {
        plugin.implements(HookKind::ResolveId)
            || plugin.implements(HookKind::Load)
            || plugin.implements(HookKind::Transform)
    }
}

impl Plugin for BridgePlugin {
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("kiln:{}", self.plugin.name()))
    }

    fn register_hook_usage(&self) -> HookUsage {
        let mut usage = HookUsage::empty();
        if self.plugin.implements(HookKind::ResolveId) {
            usage |= HookUsage::ResolveId;
        }
        if self.plugin.implements(HookKind::Load) {
            usage |= HookUsage::Load;
        }
        if self.plugin.implements(HookKind::Transform) {
            usage |= HookUsage::Transform;
        }
        usage
    }

    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs<'_>,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let specifier = args.specifier.to_string();
        let importer = args.importer.map(|s| s.to_string());
        let handler = Arc::clone(self.plugin.handler());
        let name = self.plugin.name().to_string();
        let enabled = self.plugin.implements(HookKind::ResolveId);

        async move {
            if !enabled {
                return Ok(None);
            }
            let resolved = handler
                .resolve_id(&specifier, importer.as_deref())
                .await
                .with_context(|| format!("Plugin '{name}' failed to resolve '{specifier}'"))?;

            Ok(resolved.map(|r| HookResolveIdOutput {
                id: r.id.into(),
                external: Some(ResolvedExternal::Bool(r.external)),
                ..Default::default()
            }))
        }
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let id = args.id.to_string();
        let handler = Arc::clone(self.plugin.handler());
        let name = self.plugin.name().to_string();
        let enabled = self.plugin.implements(HookKind::Load);

        async move {
            if !enabled {
                return Ok(None);
            }
            let loaded = handler
                .load(&id)
                .await
                .with_context(|| format!("Plugin '{name}' failed to load {id}"))?;

            Ok(loaded.map(|code| HookLoadOutput {
                code: code.into(),
                module_type: Some(infer_module_type(&id)),
                ..Default::default()
            }))
        }
    }

    fn transform(
        &self,
        _ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let id = args.id.to_string();
        let code = args.code.to_string();
        let handler = Arc::clone(self.plugin.handler());
        let name = self.plugin.name().to_string();
        let enabled = self.plugin.implements(HookKind::Transform);

        async move {
            if !enabled {
                return Ok(None);
            }
            let transformed = handler
                .transform(&id, &code)
                .await
                .with_context(|| format!("Plugin '{name}' failed to transform {id}"))?;

            Ok(transformed.map(|code| HookTransformOutput {
                code: Some(code),
                map: None,
                side_effects: None,
                module_type: None,
            }))
        }
    }
}

/// Marks bare specifiers matched by the external policy as external.
#[derive(Debug, Clone)]
pub(crate) struct ExternalPlugin {
    external: External,
}

impl ExternalPlugin {
    pub fn new(external: External) -> Self {
        Self { external }
    }
}

pub(crate) fn is_bare_specifier(specifier: &str) -> bool {
    !(specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with('\0')
        || specifier.starts_with("kiln:")
        || Path::new(specifier).is_absolute())
}

impl Plugin for ExternalPlugin {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("kiln:external")
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::ResolveId
    }

    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs<'_>,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let specifier = args.specifier.to_string();
        let is_external = is_bare_specifier(&specifier) && self.external.matches(&specifier);

        async move {
            if !is_external {
                return Ok(None);
            }
            Ok(Some(HookResolveIdOutput {
                id: specifier.into(),
                external: Some(ResolvedExternal::Bool(true)),
                ..Default::default()
            }))
        }
    }
}

/// Serves one in-memory module, used for the multi-entry UMD/IIFE wrapper.
#[derive(Debug, Clone)]
pub(crate) struct VirtualEntryPlugin {
    id: String,
    code: String,
}

impl VirtualEntryPlugin {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
        }
    }
}

impl Plugin for VirtualEntryPlugin {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("kiln:virtual-entry")
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::ResolveId | HookUsage::Load
    }

    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs<'_>,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let claimed = args.specifier == self.id.as_str();
        let id = self.id.clone();

        async move {
            if !claimed {
                return Ok(None);
            }
            Ok(Some(HookResolveIdOutput {
                id: id.into(),
                external: Some(ResolvedExternal::Bool(false)),
                ..Default::default()
            }))
        }
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let served = (args.id == self.id.as_str()).then(|| self.code.clone());

        async move {
            Ok(served.map(|code| HookLoadOutput {
                code: code.into(),
                module_type: Some(ModuleType::Js),
                ..Default::default()
            }))
        }
    }
}

fn infer_module_type(id: &str) -> ModuleType {
    match Path::new(id).extension().and_then(|e| e.to_str()) {
        Some("tsx") => ModuleType::Tsx,
        Some("ts" | "mts" | "cts") => ModuleType::Ts,
        Some("jsx") => ModuleType::Jsx,
        Some("css") => ModuleType::Css,
        Some("json") => ModuleType::Json,
        _ => ModuleType::Js,
    }
}
