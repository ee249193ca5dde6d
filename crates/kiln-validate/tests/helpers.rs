//! Built-library fixtures for the kiln-validate integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use kiln_bundler::{BuildMode, BuildResult, BuilderConfig, BundlerKind, LibraryType, OutputArtifact, OutputFormat};
use kiln_config::StageToggles;
use tempfile::TempDir;

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, contents).expect("write fixture file");
}

const ESM: &str = "const add = (a, b) => a + b;\nfunction sub(a, b) { return a - b; }\nexport { add, sub };\n";
const CJS: &str = "'use strict';\nconst add = (a, b) => a + b;\nfunction sub(a, b) { return a - b; }\nexports.add = add;\nexports.sub = sub;\n";

/// A project whose `dist/` holds ESM and CJS builds exporting `add` and `sub`,
/// next to a source entry with the given body.
pub fn built_library(source: &str) -> (TempDir, BuildResult) {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(root, "package.json", r#"{ "name": "acme-math", "version": "1.0.0" }"#);
    write(root, "src/index.ts", source);
    write(root, "dist/es/index.mjs", ESM);
    write(root, "dist/cjs/index.js", CJS);

    let mut result = BuildResult::new(BundlerKind::Rolldown, BuildMode::Production, LibraryType::Typescript);
    for (file, format, code) in [("es/index.mjs", OutputFormat::Esm, ESM), ("cjs/index.js", OutputFormat::Cjs, CJS)] {
        let mut chunk = OutputArtifact::chunk(file, format, code);
        chunk.name = Some("index".to_string());
        chunk.is_entry = true;
        chunk.exports = vec!["add".to_string(), "sub".to_string()];
        chunk.hash = format!("{:x}", code.len());
        result.outputs.push(chunk);
    }
    (dir, result)
}

/// Validation config for `root` with only `stages` enabled and no installs.
pub fn config(root: &Path, stages: StageToggles) -> BuilderConfig {
    let mut config = BuilderConfig::new(root)
        .with_input("src/index.ts")
        .with_formats([OutputFormat::Esm, OutputFormat::Cjs]);
    config.validation.enabled = true;
    config.validation.install_dependencies = false;
    config.validation.stages = stages;
    config.validation.snapshot_path = Some(root.join(".kiln/snapshots.json"));
    config
}

pub fn only_exports() -> StageToggles {
    StageToggles {
        exports: true,
        ..StageToggles::none()
    }
}

pub fn only_snapshot() -> StageToggles {
    StageToggles {
        snapshot: true,
        ..StageToggles::none()
    }
}
