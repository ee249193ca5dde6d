//! Plugins that ship with kiln.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{HookKind, HookSet, PluginHooks, PluginProvider, UnifiedPlugin};

/// Replaces identifiers such as `process.env.NODE_ENV` with literal code.
///
/// Only whole tokens are replaced: `__DEV__` does not match `__DEV__X`.
#[derive(Debug, Clone)]
pub struct ReplacePlugin {
    values: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplaceOptions {
    #[serde(default)]
    values: BTreeMap<String, String>,
}

impl ReplacePlugin {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn apply(&self, code: &str) -> Option<String> {
        let mut output = code.to_string();
        let mut changed = false;
        // Longest keys first so `a.b.c` wins over `a.b`.
        let mut keys: Vec<&String> = self.values.keys().filter(|k| !k.is_empty()).collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

        for key in keys {
            let replacement = &self.values[key];
            let (next, hit) = replace_token(&output, key, replacement);
            if hit {
                output = next;
                changed = true;
            }
        }
        changed.then_some(output)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn replace_token(code: &str, token: &str, replacement: &str) -> (String, bool) {
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    let mut hit = false;

    while let Some(pos) = rest.find(token) {
        let before = rest[..pos].chars().next_back();
        let after = rest[pos + token.len()..].chars().next();
        let bounded_before = before.is_none_or(|c| !is_ident_char(c) && c != '.');
        let bounded_after = after.is_none_or(|c| !is_ident_char(c));

        out.push_str(&rest[..pos]);
        if bounded_before && bounded_after {
            out.push_str(replacement);
            hit = true;
        } else {
            out.push_str(token);
        }
        rest = &rest[pos + token.len()..];
    }
    out.push_str(rest);
    (out, hit)
}

#[async_trait]
impl PluginHooks for ReplacePlugin {
    fn hooks(&self) -> HookSet {
        HookKind::Transform.into()
    }

    async fn transform(&self, id: &str, code: &str) -> anyhow::Result<Option<String>> {
        if id.contains("/node_modules/") || self.values.is_empty() {
            return Ok(None);
        }
        Ok(self.apply(code))
    }
}

pub struct ReplaceProvider;

impl PluginProvider for ReplaceProvider {
    fn name(&self) -> &str {
        "replace"
    }

    fn instantiate(&self, options: &Value) -> anyhow::Result<UnifiedPlugin> {
        let options: ReplaceOptions = if options.is_null() {
            ReplaceOptions::default()
        } else {
            serde_json::from_value(options.clone()).context("Invalid options for 'replace'")?
        };
        Ok(UnifiedPlugin::new("replace", ReplacePlugin::new(options.values)))
    }
}
