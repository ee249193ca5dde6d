//! Export and import extraction.
//!
//! Source files are scanned with regular expressions. This is an
//! approximation: it sees syntactic `export`/`import` forms, not what a
//! module evaluates to. Sets built from it are marked partial whenever a
//! re-export could not be followed. The bundle side is read from `node`
//! itself, by loading each entry and describing what it exports.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use kiln_bundler::OutputFormat;
use regex::Regex;
use serde::{Deserialize, Serialize};

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($re).ok());
    };
}

pattern!(BLOCK_COMMENT, r"(?s)/\*.*?\*/");
pattern!(LINE_COMMENT, r"(?m)(^|[\s;{}])//[^\n]*");
pattern!(
    DECLARATION,
    r"(?m)\bexport\s+(?:declare\s+)?(?:(default)\s+)?(async\s+function\*?|function\*?|abstract\s+class|class|const\s+enum|const|let|var|enum)\s+([A-Za-z_$][\w$]*)"
);
pattern!(DEFAULT_EXPORT, r"\bexport\s+default\b");
pattern!(TYPE_DECLARATION, r"(?m)\bexport\s+(?:declare\s+)?(interface|type)\s+([A-Za-z_$][\w$]*)");
pattern!(NAMED_LIST, r"\bexport\s+(type\s+)?\{([^}]*)\}(\s*from\s*['\x22]([^'\x22]+)['\x22])?");
pattern!(STAR_EXPORT, r#"\bexport\s+\*\s*(?:as\s+([A-Za-z_$][\w$]*)\s+)?from\s*['"]([^'"]+)['"]"#);
pattern!(
    STATIC_IMPORT,
    r#"\b(?:import|export)\s+(?:type\s+)?(?:[\w$*{},\s]+?\s+from\s+)?['"]([^'"]+)['"]"#
);
pattern!(DYNAMIC_IMPORT, r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#);
pattern!(REQUIRE, r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#);
pattern!(TYPE_ONLY_IMPORT, r#"\bimport\s+type\s+[^;]*?from\s+['"]([^'"]+)['"]"#);
pattern!(
    DEPRECATED,
    r"(?s)/\*\*((?:[^*]|\*[^/])*)\*/\s*export\s+(?:declare\s+)?(?:default\s+)?(?:async\s+)?(?:function\*?|const|let|var|class|abstract\s+class|enum|interface|type)\s+([A-Za-z_$][\w$]*)"
);
pattern!(
    FUNCTION_SIGNATURE,
    r"\bexport\s+(?:declare\s+)?(?:default\s+)?(?:async\s+)?function\*?\s+([A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\("
);
pattern!(
    ARROW_SIGNATURE,
    r"\bexport\s+const\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:<[^>(]*>)?\s*(\(|[A-Za-z_$][\w$]*\s*=>)"
);
pattern!(CLASS_DECLARATION, r"\bexport\s+(?:declare\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)");

/// Extensions tried when following a relative re-export.
const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "js", "jsx", "mjs", "cjs"];

/// What a source module exports, as far as the scanner can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceExports {
    /// Runtime exports, `default` included.
    pub values: BTreeSet<String>,
    /// Type-only exports; absent from the bundle by construction.
    pub types: BTreeSet<String>,
    /// A star re-export could not be followed, so `values` may be incomplete.
    pub partial: bool,
}

/// Strip comments so commented-out code does not produce matches.
pub fn strip_comments(code: &str) -> String {
    let without_blocks = match BLOCK_COMMENT.as_ref() {
        Some(re) => re.replace_all(code, " ").into_owned(),
        None => code.to_string(),
    };
    match LINE_COMMENT.as_ref() {
        Some(re) => re.replace_all(&without_blocks, "$1").into_owned(),
        None => without_blocks,
    }
}

/// Exports declared in `code` itself; star re-exports are not followed.
pub fn extract_exports(code: &str) -> SourceExports {
    let code = strip_comments(code);
    let mut exports = SourceExports::default();

    if let Some(re) = DECLARATION.as_ref() {
        for caps in re.captures_iter(&code) {
            if caps.get(1).is_some() {
                exports.values.insert("default".to_string());
            } else {
                exports.values.insert(caps[3].to_string());
            }
        }
    }
    if DEFAULT_EXPORT.as_ref().is_some_and(|re| re.is_match(&code)) {
        exports.values.insert("default".to_string());
    }
    if let Some(re) = TYPE_DECLARATION.as_ref() {
        for caps in re.captures_iter(&code) {
            exports.types.insert(caps[2].to_string());
        }
    }
    if let Some(re) = NAMED_LIST.as_ref() {
        for caps in re.captures_iter(&code) {
            let type_only_list = caps.get(1).is_some();
            for item in caps[2].split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (type_only, item) = match item.strip_prefix("type ") {
                    Some(rest) => (true, rest.trim()),
                    None => (type_only_list, item),
                };
                let exported = item
                    .split_once(" as ")
                    .map(|(_, alias)| alias.trim())
                    .unwrap_or(item);
                if type_only {
                    exports.types.insert(exported.to_string());
                } else {
                    exports.values.insert(exported.to_string());
                }
            }
        }
    }
    if let Some(re) = STAR_EXPORT.as_ref() {
        for caps in re.captures_iter(&code) {
            match caps.get(1) {
                Some(namespace) => {
                    exports.values.insert(namespace.as_str().to_string());
                }
                None => exports.partial = true,
            }
        }
    }
    exports
}

/// Exports of the module at `path`, following relative `export * from` chains.
pub fn extract_source_exports(path: &Path) -> std::io::Result<SourceExports> {
    let mut visited = BTreeSet::new();
    collect_exports(path, &mut visited)
}

fn collect_exports(path: &Path, visited: &mut BTreeSet<PathBuf>) -> std::io::Result<SourceExports> {
    if !visited.insert(path.to_path_buf()) {
        return Ok(SourceExports::default());
    }
    let code = fs::read_to_string(path)?;
    let mut exports = extract_exports(&code);
    if !exports.partial {
        return Ok(exports);
    }

    exports.partial = false;
    let stripped = strip_comments(&code);
    let Some(re) = STAR_EXPORT.as_ref() else {
        exports.partial = true;
        return Ok(exports);
    };
    let base = path.parent().unwrap_or(Path::new("."));
    for caps in re.captures_iter(&stripped) {
        if caps.get(1).is_some() {
            continue;
        }
        let specifier = &caps[2];
        let resolved = specifier
            .starts_with('.')
            .then(|| resolve_relative(base, specifier))
            .flatten();
        match resolved {
            Some(target) => {
                let nested = collect_exports(&target, visited)?;
                // `export *` never forwards the default export.
                exports.values.extend(nested.values.into_iter().filter(|n| n != "default"));
                exports.types.extend(nested.types);
                exports.partial |= nested.partial;
            }
            None => exports.partial = true,
        }
    }
    Ok(exports)
}

fn resolve_relative(base: &Path, specifier: &str) -> Option<PathBuf> {
    let candidate = base.join(specifier);
    if candidate.is_file() {
        return Some(candidate);
    }
    // `./util.js` in TypeScript sources refers to `./util.ts`.
    let stem = match candidate.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs" | "cjs" | "jsx") => candidate.with_extension(""),
        _ => candidate.clone(),
    };
    RESOLVE_EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{}.{ext}", stem.display())))
        .chain(RESOLVE_EXTENSIONS.iter().map(|ext| candidate.join(format!("index.{ext}"))))
        .find(|p| p.is_file())
}

/// Bare package names `code` imports at runtime. Relative paths, node
/// builtins and type-only imports are excluded.
pub fn extract_imports(code: &str) -> BTreeSet<String> {
    let code = strip_comments(code);
    let type_only: BTreeSet<&str> = TYPE_ONLY_IMPORT
        .as_ref()
        .map(|re| re.captures_iter(&code).filter_map(|c| c.get(1)).map(|m| m.as_str()).collect())
        .unwrap_or_default();

    let mut specifiers: BTreeSet<&str> = BTreeSet::new();
    for re in [STATIC_IMPORT.as_ref(), DYNAMIC_IMPORT.as_ref(), REQUIRE.as_ref()]
        .into_iter()
        .flatten()
    {
        specifiers.extend(re.captures_iter(&code).filter_map(|c| c.get(1)).map(|m| m.as_str()));
    }

    specifiers
        .into_iter()
        .filter(|s| !type_only.contains(s) || runtime_import_of(&code, s))
        .filter_map(package_name)
        .collect()
}

fn runtime_import_of(code: &str, specifier: &str) -> bool {
    let quoted = [format!("'{specifier}'"), format!("\"{specifier}\"")];
    code.lines()
        .filter(|line| quoted.iter().any(|q| line.contains(q.as_str())))
        .any(|line| !line.contains("import type"))
}

/// `lodash/clamp` → `lodash`, `@scope/pkg/sub` → `@scope/pkg`.
pub fn package_name(specifier: &str) -> Option<String> {
    if specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("node:")
        || specifier.starts_with("data:")
        || specifier.contains("://")
        || specifier.starts_with('#')
        || specifier.starts_with('\0')
    {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    let name = if first.starts_with('@') {
        format!("{first}/{}", parts.next()?)
    } else {
        first.to_string()
    };
    (!name.is_empty() && !is_node_builtin(&name)).then_some(name)
}

fn is_node_builtin(name: &str) -> bool {
    const BUILTINS: &[&str] = &[
        "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "crypto",
        "dgram", "dns", "events", "fs", "http", "http2", "https", "module", "net", "os", "path",
        "perf_hooks", "process", "querystring", "readline", "stream", "string_decoder", "timers",
        "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
    ];
    BUILTINS.contains(&name)
}

/// Names whose JSDoc block carries `@deprecated`.
pub fn deprecated_exports(code: &str) -> BTreeSet<String> {
    let Some(re) = DEPRECATED.as_ref() else {
        return BTreeSet::new();
    };
    re.captures_iter(code)
        .filter(|caps| {
            // Only the JSDoc block directly above the export counts.
            let doc = &caps[1];
            let last_block = doc.rsplit("/**").next().unwrap_or(doc);
            last_block.contains("@deprecated")
        })
        .map(|caps| caps[2].to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    Function,
    Class,
    Value,
}

/// The shape of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSignature {
    pub kind: ApiKind,
    /// `Function.length`: parameters before the first default or rest parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arity: Option<u32>,
}

/// Signatures of the functions and classes `code` declares as exports.
pub fn extract_signatures(code: &str) -> BTreeMap<String, ApiSignature> {
    let code = strip_comments(code);
    let mut signatures = BTreeMap::new();

    if let Some(re) = FUNCTION_SIGNATURE.as_ref() {
        for caps in re.captures_iter(&code) {
            let Some(whole) = caps.get(0) else { continue };
            let arity = parameter_list(&code[whole.end()..]).map(function_length);
            signatures.insert(caps[1].to_string(), ApiSignature { kind: ApiKind::Function, arity });
        }
    }
    if let Some(re) = ARROW_SIGNATURE.as_ref() {
        for caps in re.captures_iter(&code) {
            let Some(whole) = caps.get(0) else { continue };
            let arity = if &caps[2] == "(" {
                parameter_list(&code[whole.end()..]).map(function_length)
            } else {
                Some(1)
            };
            signatures.insert(caps[1].to_string(), ApiSignature { kind: ApiKind::Function, arity });
        }
    }
    if let Some(re) = CLASS_DECLARATION.as_ref() {
        for caps in re.captures_iter(&code) {
            signatures.insert(caps[1].to_string(), ApiSignature { kind: ApiKind::Class, arity: None });
        }
    }
    signatures
}

/// The text between an opening parenthesis (already consumed) and its match.
fn parameter_list(rest: &str) -> Option<&str> {
    let mut depth = 1usize;
    for (index, ch) in rest.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..index]);
                }
            }
            _ => {}
        }
    }
    None
}

/// What `Function.prototype.length` reports for a parameter list.
fn function_length(params: &str) -> u32 {
    let mut count = 0;
    for param in split_top_level(params) {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        if param.starts_with("...") || has_top_level_default(param) {
            break;
        }
        // TypeScript's `this` parameter is erased.
        if param == "this" || param.starts_with("this:") || param.starts_with("this ") {
            continue;
        }
        count += 1;
    }
    count
}

fn split_top_level(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut previous = '\0';
    for (index, ch) in params.char_indices() {
        match ch {
            '(' | '[' | '{' | '<' => depth += 1,
            // `=>` in a function type is not a closing bracket.
            '>' if previous == '=' => {}
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&params[start..index]);
                start = index + 1;
            }
            _ => {}
        }
        previous = ch;
    }
    parts.push(&params[start..]);
    parts
}

fn has_top_level_default(param: &str) -> bool {
    let mut depth = 0i32;
    let chars: Vec<char> = param.chars().collect();
    for (i, ch) in chars.iter().enumerate() {
        match ch {
            '(' | '[' | '{' | '<' => depth += 1,
            '>' if i > 0 && chars[i - 1] == '=' => {}
            ')' | ']' | '}' | '>' => depth -= 1,
            '=' if depth == 0 => {
                let next = chars.get(i + 1).copied();
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                if next != Some('>') && next != Some('=') && prev != Some('!') && prev != Some('=') {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// A `node -e` program that loads `file` and prints
/// `{"exports": {name: {type, arity?}}, "loadMs", "heapBytes"}` as JSON.
///
/// `global` names the variable an IIFE bundle assigns.
pub fn introspection_script(file: &Path, format: OutputFormat, global: Option<&str>) -> String {
    let file = serde_json::to_string(&file.to_string_lossy()).unwrap_or_else(|_| "\"\"".to_string());
    let global = serde_json::to_string(&global).unwrap_or_else(|_| "null".to_string());
    let load = match format {
        OutputFormat::Esm => "await import(pathToFileURL(FILE).href)",
        OutputFormat::Cjs | OutputFormat::Umd => "require(FILE)",
        OutputFormat::Iife => "loadIife(FILE, GLOBAL)",
    };
    format!(
        r#"const {{ pathToFileURL }} = require('node:url');
const FILE = {file};
const GLOBAL = {global};
function loadIife(file, name) {{
  const vm = require('node:vm');
  const code = require('node:fs').readFileSync(file, 'utf8');
  const context = vm.createContext({{ console }});
  const before = new Set(Object.keys(context));
  vm.runInContext(code, context, {{ filename: file }});
  if (name && context[name] !== undefined) return context[name];
  const added = Object.keys(context).filter((k) => !before.has(k));
  return added.length === 1 ? context[added[0]] : Object.fromEntries(added.map((k) => [k, context[k]]));
}}
function describe(value) {{
  if (typeof value === 'function') {{
    const source = Function.prototype.toString.call(value);
    return {{ type: /^class[\s{{]/.test(source) ? 'class' : 'function', arity: value.length }};
  }}
  return {{ type: value === null ? 'null' : typeof value }};
}}
(async () => {{
  const heapBefore = process.memoryUsage().heapUsed;
  const started = process.hrtime.bigint();
  const mod = {load};
  const loadMs = Number(process.hrtime.bigint() - started) / 1e6;
  const heapBytes = Math.max(0, process.memoryUsage().heapUsed - heapBefore);
  const exports = {{}};
  if (mod !== null && (typeof mod === 'object' || typeof mod === 'function')) {{
    for (const key of Object.keys(mod)) {{
      if (key === '__esModule') continue;
      exports[key] = describe(mod[key]);
    }}
    if (typeof mod === 'function' && !('default' in exports)) exports.default = describe(mod);
  }} else if (mod !== undefined) {{
    exports.default = describe(mod);
  }}
  console.log(JSON.stringify({{ exports, loadMs, heapBytes }}));
}})().catch((error) => {{
  console.error((error && error.stack) || String(error));
  process.exit(1);
}});
"#
    )
}

/// One export as described by the introspection script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeExport {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arity: Option<u32>,
}

impl RuntimeExport {
    pub fn signature(&self) -> ApiSignature {
        let kind = match self.kind.as_str() {
            "function" => ApiKind::Function,
            "class" => ApiKind::Class,
            _ => ApiKind::Value,
        };
        ApiSignature { kind, arity: self.arity }
    }
}

/// Parsed output of [`introspection_script`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Introspection {
    pub exports: BTreeMap<String, RuntimeExport>,
    #[serde(default)]
    pub load_ms: f64,
    #[serde(default)]
    pub heap_bytes: u64,
}

impl Introspection {
    pub fn names(&self) -> BTreeSet<String> {
        self.exports.keys().cloned().collect()
    }
}
