//! Project fixtures and a `kiln` command builder for the CLI tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, contents).expect("write fixture file");
}

/// `kiln` with colors off and no inherited `KILN_*` overrides.
pub fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").expect("kiln binary");
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG").env_remove("KILN_BUILD__ROOT");
    cmd
}

/// A dependency-free TypeScript library with two entry exports.
pub fn ts_library() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "package.json",
        r#"{
  "name": "acme-strings",
  "version": "0.1.0",
  "devDependencies": { "typescript": "^5.4.0" }
}"#,
    );
    write(root, "tsconfig.json", r#"{ "compilerOptions": { "strict": true } }"#);
    write(
        root,
        "src/index.ts",
        r#"export function shout(value: string): string {
  return value.toUpperCase();
}

export const VERSION: string = '0.1.0';
"#,
    );
    dir
}

/// A Vue 3 single-file-component library, for detection only.
pub fn vue_library() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "package.json",
        r#"{
  "name": "acme-vue",
  "version": "1.0.0",
  "peerDependencies": { "vue": "^3.4.0" },
  "devDependencies": { "@vitejs/plugin-vue": "^5.0.0" }
}"#,
    );
    write(
        root,
        "src/Button.vue",
        "<script setup lang=\"ts\">\ndefineProps<{ label: string }>()\n</script>\n<template><button>{{ label }}</button></template>\n",
    );
    write(root, "src/index.ts", "export { default as Button } from './Button.vue';\n");
    dir
}
