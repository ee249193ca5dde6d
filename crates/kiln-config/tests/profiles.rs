//! Tests for config discovery, profiles and environment overrides.

use kiln_config::{BundlerKind, ConfigDiscovery, LibraryType, OutputFormat};
use std::fs;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvGuard(&'static [&'static str]);

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for var in self.0 {
            unsafe { std::env::remove_var(var) };
        }
    }
}

#[test]
fn profile_overrides_build_options() {
    let _guard = test_lock().lock().expect("lock");
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("kiln.toml"),
        r#"
[build]
input = "src/index.ts"
type = "react"

[build.output]
formats = ["esm"]

[build.performance]
minify = false

[profiles.production.build.performance]
minify = true
size_limit = "20kb"
"#,
    )
    .expect("write config");

    let config = ConfigDiscovery::new(dir.path())
        .without_env()
        .load_with_profile("production")
        .expect("load with profile");

    assert!(config.build.performance.minify);
    assert_eq!(config.build.performance.size_limit, Some(20 * 1024));
    assert_eq!(config.build.library_type, Some(LibraryType::React));
    assert_eq!(config.build.output.formats, vec![OutputFormat::Esm]);
}

#[test]
fn profile_overrides_validation_table() {
    let _guard = test_lock().lock().expect("lock");
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("kiln.toml"),
        r#"
[validation]
enabled = true

[profiles.ci.validation]
strict = true
keep_temp_files = true
"#,
    )
    .expect("write config");

    let config = ConfigDiscovery::new(dir.path())
        .without_env()
        .load_with_profile("ci")
        .expect("load with profile");

    let build = config.builder_config();
    assert!(build.validation.enabled);
    assert!(build.validation.strict);
    assert!(build.validation.keep_temp_files);
}

#[test]
fn package_json_field_is_loaded() {
    let _guard = test_lock().lock().expect("lock");
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("package.json"),
        r#"{
  "name": "my-lib",
  "kiln": {
    "build": {
      "input": ["src/a.ts", "src/b.ts"],
      "bundler": "esbuild",
      "output": { "dir": "lib" }
    }
  }
}"#,
    )
    .expect("write package.json");

    let config = ConfigDiscovery::new(dir.path())
        .without_env()
        .load()
        .expect("load package.json config");

    assert_eq!(config.build.bundler, BundlerKind::Esbuild);
    assert_eq!(config.build.output.dir, std::path::PathBuf::from("lib"));
    assert_eq!(config.build.root, dir.path());
}

#[test]
fn environment_overrides_file_values() {
    let _guard = test_lock().lock().expect("lock");
    let _env = EnvGuard(&["KILN_BUILD__BUNDLER", "KILN_BUILD__STRICT"]);
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("kiln.toml"),
        r#"
[build]
bundler = "rolldown"
strict = false
"#,
    )
    .expect("write config");

    unsafe {
        std::env::set_var("KILN_BUILD__BUNDLER", "esbuild");
        std::env::set_var("KILN_BUILD__STRICT", "true");
    }

    let config = ConfigDiscovery::new(dir.path())
        .load()
        .expect("load with env");

    assert_eq!(config.build.bundler, BundlerKind::Esbuild);
    assert!(config.build.strict);
}

#[test]
fn invalid_toml_reports_configuration_error() {
    let _guard = test_lock().lock().expect("lock");
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("kiln.toml"), "[build\nbroken").expect("write config");

    let err = ConfigDiscovery::new(dir.path())
        .without_env()
        .load()
        .expect_err("invalid toml must fail");

    assert!(err.to_string().contains("configuration"));
}
