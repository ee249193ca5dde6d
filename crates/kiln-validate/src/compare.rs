//! Source-versus-bundle comparisons.
//!
//! Every comparison is a pure function over already-extracted data, so the
//! stages in [`crate::validator`] only gather inputs and report.

use std::collections::{BTreeMap, BTreeSet};

use kiln_bundler::{External, OutputFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::{ApiKind, ApiSignature, Introspection, SourceExports};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportComparison {
    pub entry: String,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    /// The source side is incomplete, so unexpected bundle exports are not reported.
    pub partial: bool,
}

impl ExportComparison {
    pub fn identical(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    pub fn discrepancies(&self) -> Vec<String> {
        let missing = self
            .missing
            .iter()
            .map(|name| format!("{}: missing export '{name}'", self.entry));
        let extra = self
            .extra
            .iter()
            .map(|name| format!("{}: unexpected export '{name}'", self.entry));
        missing.chain(extra).collect()
    }
}

pub fn compare_exports(entry: &str, source: &SourceExports, bundle: &BTreeSet<String>) -> ExportComparison {
    let missing = source.values.difference(bundle).cloned().collect();
    let extra = if source.partial {
        Vec::new()
    } else {
        bundle.difference(&source.values).cloned().collect()
    };
    ExportComparison {
        entry: entry.to_string(),
        missing,
        extra,
        partial: source.partial,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportComparison {
    /// Packages the source imports and the config marks external, but the
    /// bundle never imports: they were inlined or dropped.
    pub missing: Vec<String>,
    /// Packages the bundle imports that neither the source nor the manifest knows.
    pub extra: Vec<String>,
}

impl ImportComparison {
    pub fn identical(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    pub fn discrepancies(&self) -> Vec<String> {
        let missing = self
            .missing
            .iter()
            .map(|name| format!("external '{name}' is not imported by the bundle"));
        let extra = self
            .extra
            .iter()
            .map(|name| format!("bundle imports undeclared package '{name}'"));
        missing.chain(extra).collect()
    }
}

pub fn compare_imports(
    source: &BTreeSet<String>,
    bundle: &BTreeSet<String>,
    external: &External,
    manifest: Option<&Value>,
) -> ImportComparison {
    let declared = declared_packages(manifest);
    ImportComparison {
        missing: source
            .iter()
            .filter(|name| external.matches(name) && !bundle.contains(*name))
            .cloned()
            .collect(),
        extra: bundle
            .iter()
            .filter(|name| !source.contains(*name) && !declared.contains(*name))
            .cloned()
            .collect(),
    }
}

/// Names from `dependencies`, `peerDependencies` and `optionalDependencies`.
pub fn declared_packages(manifest: Option<&Value>) -> BTreeSet<String> {
    let Some(manifest) = manifest else {
        return BTreeSet::new();
    };
    ["dependencies", "peerDependencies", "optionalDependencies"]
        .iter()
        .filter_map(|field| manifest.get(field).and_then(Value::as_object))
        .flat_map(|deps| deps.keys().cloned())
        .collect()
}

/// The externals a build used: the configured policy, or the manifest's
/// runtime and peer dependencies when none is configured.
pub fn expected_external(configured: Option<External>, manifest: Option<&Value>) -> External {
    match configured {
        Some(external) => external,
        None => {
            let packages: Vec<String> = ["dependencies", "peerDependencies"]
                .iter()
                .filter_map(|field| manifest.and_then(|m| m.get(field)).and_then(Value::as_object))
                .flat_map(|deps| deps.keys().cloned())
                .collect();
            External::None.with_packages(packages)
        }
    }
}

/// One assertion of the generated smoke suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorCase {
    pub entry: String,
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BehaviorCase {
    fn new(entry: &str, name: String, failure: Option<String>) -> Self {
        Self {
            entry: entry.to_string(),
            name,
            passed: failure.is_none(),
            detail: failure,
        }
    }
}

/// The smoke suite for one entry: each format loads, every export is
/// defined, and the ESM and CJS builds expose the same names.
pub fn behavior_cases(
    entry: &str,
    loads: &[(OutputFormat, std::result::Result<Introspection, String>)],
) -> Vec<BehaviorCase> {
    let mut cases = Vec::new();
    let mut loaded: BTreeMap<OutputFormat, &Introspection> = BTreeMap::new();

    for (format, outcome) in loads {
        match outcome {
            Ok(introspection) => {
                cases.push(BehaviorCase::new(entry, format!("{format} loads"), None));
                let undefined: Vec<&str> = introspection
                    .exports
                    .iter()
                    .filter(|(_, export)| export.kind == "undefined")
                    .map(|(name, _)| name.as_str())
                    .collect();
                let failure = (!undefined.is_empty())
                    .then(|| format!("undefined exports: {}", undefined.join(", ")));
                cases.push(BehaviorCase::new(entry, format!("{format} exports defined"), failure));
                loaded.insert(*format, introspection);
            }
            Err(error) => {
                cases.push(BehaviorCase::new(entry, format!("{format} loads"), Some(error.clone())));
            }
        }
    }

    if let (Some(esm), Some(cjs)) = (loaded.get(&OutputFormat::Esm), loaded.get(&OutputFormat::Cjs)) {
        let names = |i: &Introspection| -> BTreeSet<String> {
            i.names().into_iter().filter(|n| n != "default").collect()
        };
        let (esm_names, cjs_names) = (names(*esm), names(*cjs));
        let failure = (esm_names != cjs_names).then(|| {
            let only_esm: Vec<_> = esm_names.difference(&cjs_names).cloned().collect();
            let only_cjs: Vec<_> = cjs_names.difference(&esm_names).cloned().collect();
            format!("esm only: [{}], cjs only: [{}]", only_esm.join(", "), only_cjs.join(", "))
        });
        cases.push(BehaviorCase::new(entry, "esm/cjs format parity".to_string(), failure));
    }
    cases
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiComparison {
    pub breaking: Vec<String>,
    pub deprecated: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ApiComparison {
    pub fn compatible(&self) -> bool {
        self.breaking.is_empty()
    }
}

/// Diff the declared API of an entry against what the bundle exposes.
pub fn compare_api(
    entry: &str,
    source: &SourceExports,
    signatures: &BTreeMap<String, ApiSignature>,
    deprecated: &BTreeSet<String>,
    bundle: &Introspection,
) -> ApiComparison {
    let mut api = ApiComparison::default();
    let exposed = bundle.names();

    for name in source.values.difference(&exposed) {
        api.removed.push(name.clone());
        api.breaking.push(format!("{entry}: '{name}' was removed"));
    }
    if !source.partial {
        api.added = exposed.difference(&source.values).cloned().collect();
    }

    for (name, declared) in signatures {
        let Some(actual) = bundle.exports.get(name).map(|e| e.signature()) else {
            continue;
        };
        if !kinds_compatible(declared.kind, actual.kind) {
            api.breaking.push(format!(
                "{entry}: '{name}' changed from {} to {}",
                kind_name(declared.kind),
                kind_name(actual.kind)
            ));
            continue;
        }
        if let (Some(expected), Some(found)) = (declared.arity, actual.arity) {
            if declared.kind == ApiKind::Function && expected != found {
                api.breaking.push(format!(
                    "{entry}: '{name}' takes {found} parameter(s), declared {expected}"
                ));
            }
        }
    }

    api.deprecated = deprecated.intersection(&exposed).cloned().collect();
    api
}

/// Down-levelled classes become functions.
fn kinds_compatible(declared: ApiKind, actual: ApiKind) -> bool {
    declared == actual || (declared == ApiKind::Class && actual == ApiKind::Function)
}

fn kind_name(kind: ApiKind) -> &'static str {
    match kind {
        ApiKind::Function => "function",
        ApiKind::Class => "class",
        ApiKind::Value => "value",
    }
}

/// Load-time measurements. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceComparison {
    pub entry: String,
    pub bundle_load_ms: f64,
    pub bundle_heap_bytes: u64,
    /// Wall-clock time of the whole `node` process loading the bundle.
    pub bundle_process_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_load_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_heap_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_delta_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_delta_percent: Option<f64>,
}

pub fn compare_performance(
    entry: &str,
    bundle: &Introspection,
    bundle_process_ms: u64,
    source: Option<&Introspection>,
) -> PerformanceComparison {
    let mut comparison = PerformanceComparison {
        entry: entry.to_string(),
        bundle_load_ms: bundle.load_ms,
        bundle_heap_bytes: bundle.heap_bytes,
        bundle_process_ms,
        ..PerformanceComparison::default()
    };
    if let Some(source) = source {
        let delta = bundle.load_ms - source.load_ms;
        comparison.source_load_ms = Some(source.load_ms);
        comparison.source_heap_bytes = Some(source.heap_bytes);
        comparison.load_delta_ms = Some(delta);
        comparison.load_delta_percent = (source.load_ms > 0.0).then(|| delta / source.load_ms * 100.0);
    }
    comparison
}

impl PerformanceComparison {
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}: bundle loads in {:.2}ms ({} KiB heap, {}ms process)",
            self.entry,
            self.bundle_load_ms,
            self.bundle_heap_bytes / 1024,
            self.bundle_process_ms
        );
        if let (Some(source), Some(percent)) = (self.source_load_ms, self.load_delta_percent) {
            line.push_str(&format!(", source {source:.2}ms ({percent:+.1}%)"));
        }
        line
    }
}
