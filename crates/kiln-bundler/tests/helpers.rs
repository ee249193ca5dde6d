//! Project fixtures shared by the kiln-bundler integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, contents).expect("write fixture file");
}

/// A small TypeScript library with one dependency kept external.
pub fn ts_library() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "package.json",
        r#"{
  "name": "@acme/math",
  "version": "1.0.0",
  "types": "dist/index.d.ts",
  "typings": "dist/index.d.ts",
  "dependencies": { "lodash": "^4.17.21" },
  "devDependencies": { "typescript": "^5.4.0" }
}"#,
    );
    write(root, "tsconfig.json", r#"{ "compilerOptions": { "strict": true } }"#);
    write(
        root,
        "src/index.ts",
        r#"export { add } from './add';
export { clampAll } from './clamp';
export const VERSION: string = '1.0.0';
"#,
    );
    write(
        root,
        "src/add.ts",
        r#"export function add(a: number, b: number): number {
  return a + b;
}
"#,
    );
    write(
        root,
        "src/clamp.ts",
        r#"import clamp from 'lodash/clamp';

export function clampAll(values: number[], lower: number, upper: number): number[] {
  return values.map((v) => clamp(v, lower, upper));
}
"#,
    );
    write(
        root,
        "src/add.test.ts",
        r#"import { add } from './add';
if (add(1, 2) !== 3) throw new Error('add');
"#,
    );
    dir
}

/// Two independent entries, for multi-entry planning.
pub fn two_entry_library() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(root, "package.json", r#"{ "name": "twins", "version": "0.1.0" }"#);
    write(root, "src/a.ts", "export const a = 'a';\n");
    write(root, "src/b.ts", "export const b = 'b';\n");
    dir
}

pub fn react_library() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "package.json",
        r#"{
  "name": "acme-ui",
  "version": "2.0.0",
  "peerDependencies": { "react": "^18.2.0", "react-dom": "^18.2.0" }
}"#,
    );
    for name in ["Button", "Card", "Dialog", "Input", "Menu", "Select", "Tabs", "Toast", "Tooltip", "Badge"] {
        write(
            root,
            &format!("src/{name}.tsx"),
            &format!("export function {name}() {{ return null; }}\n"),
        );
    }
    dir
}

pub fn vue_library(vue_range: &str) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "package.json",
        &format!(r#"{{ "name": "acme-vue", "peerDependencies": {{ "vue": "{vue_range}" }} }}"#),
    );
    write(root, "src/Widget.vue", "<template><div /></template>\n");
    write(root, "src/index.ts", "export { default as Widget } from './Widget.vue';\n");
    dir
}
