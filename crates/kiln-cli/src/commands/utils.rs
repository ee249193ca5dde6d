//! Config loading and flag merging shared by the commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use kiln_bundler::{BuilderOptions, DetectorOptions};
use kiln_config::{BuilderConfig, ConfigDiscovery, KilnConfig};
use serde_json::Value;

use crate::cli::{ProjectArgs, Stage, ValidationArgs};
use crate::error::{CliError, Result};
use crate::ui;

/// A loaded project: the build config plus the global settings it came with.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: BuilderConfig,
    pub detector: DetectorOptions,
}

impl Project {
    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            detector: self.detector.clone(),
            ..BuilderOptions::default()
        }
    }
}

pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(CliError::RootNotFound(root.to_path_buf()));
    }
    Ok(root.canonicalize()?)
}

/// Read config for the project (explicit file, discovered file, or defaults),
/// apply the profile, and anchor relative roots at the project directory.
pub fn load_project(args: &ProjectArgs) -> Result<Project> {
    let root = resolve_root(&args.root)?;
    let discovery = ConfigDiscovery::new(&root);
    let loaded: KilnConfig = match &args.config {
        Some(path) => {
            let path = if path.is_relative() && !path.exists() { root.join(path) } else { path.clone() };
            discovery.load_from(&path)?
        }
        None => discovery.load_or_default()?,
    };

    if let Some(profile) = &args.profile {
        if !loaded.profiles.contains_key(profile) {
            ui::warning(&format!("profile '{profile}' is not defined; using the base config"));
        }
    }
    let loaded = loaded.materialize_profile(args.profile.as_deref())?;

    let mut config = loaded.builder_config();
    config.root = if config.root.is_relative() {
        let joined = root.join(&config.root);
        joined.canonicalize().unwrap_or(joined)
    } else {
        config.root
    };
    tracing::debug!(root = %config.root.display(), "Loaded project config");

    Ok(Project {
        root,
        config,
        detector: DetectorOptions::from(&loaded.settings.detection),
    })
}

/// Fold validation flags into `config`. Enables validation.
pub fn apply_validation_args(config: &mut BuilderConfig, args: &ValidationArgs) {
    let settings = &mut config.validation;
    settings.enabled = true;
    settings.strict |= args.strict_validation;
    if args.no_install {
        settings.install_dependencies = false;
    }
    settings.update_snapshots |= args.update_snapshots;
    settings.keep_temp_files |= args.keep_temp;
    if !args.stages.is_empty() {
        settings.stages = Stage::toggles(&args.stages);
    }
    if let Some(command) = &args.test_command {
        settings.test_command = Some(command.clone());
    }
    if let Some(path) = &args.snapshot_path {
        settings.snapshot_path = Some(path.clone());
    }
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project_args(root: &Path) -> ProjectArgs {
        ProjectArgs {
            root: root.to_path_buf(),
            config: None,
            profile: None,
        }
    }

    #[test]
    fn test_missing_root_is_reported() {
        let err = resolve_root(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, CliError::RootNotFound(_)));
    }

    #[test]
    fn test_load_project_defaults_without_config() {
        let dir = TempDir::new().unwrap();
        let project = load_project(&project_args(dir.path())).unwrap();
        assert_eq!(project.config.root, dir.path().canonicalize().unwrap());
        assert!(!project.config.validation.enabled);
    }

    #[test]
    fn test_load_project_applies_profile() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            r#"
[build]
input = "src/index.ts"

[build.output]
dir = "dist"

[profiles.ci.build.output]
dir = "build"
"#,
        )
        .unwrap();

        let mut args = project_args(dir.path());
        args.profile = Some("ci".into());
        let project = load_project(&args).unwrap();
        assert_eq!(project.config.output.dir, PathBuf::from("build"));
    }

    #[test]
    fn test_validation_args_enable_and_select_stages() {
        let mut config = BuilderConfig::default();
        let args = ValidationArgs {
            no_install: true,
            update_snapshots: true,
            stages: vec![Stage::Exports],
            ..ValidationArgs::default()
        };
        apply_validation_args(&mut config, &args);

        assert!(config.validation.enabled);
        assert!(!config.validation.install_dependencies);
        assert!(config.validation.update_snapshots);
        assert!(config.validation.stages.exports);
        assert!(!config.validation.stages.snapshot);
    }
}
