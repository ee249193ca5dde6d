//! `kiln build`: load config, merge flags, build, and optionally validate.

use std::sync::Arc;
use std::time::Instant;

use kiln_bundler::report::write_build_report;
use kiln_bundler::{BuildMode, BuildResult, BuilderConfig, LibraryBuilder, WatchEvent};
use kiln_config::{EntryConfig, ExternalConfig};
use kiln_validate::Validator;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::BuildArgs;
use crate::commands::utils;
use crate::error::{CliError, Result};
use crate::ui;

pub async fn execute(args: BuildArgs) -> Result<()> {
    let started = Instant::now();
    let mut project = utils::load_project(&args.project)?;
    apply_build_args(&mut project.config, &args);
    if args.validate {
        utils::apply_validation_args(&mut project.config, &args.validation);
    }

    let mut options = project.builder_options();
    if project.config.validation.enabled {
        options = options.with_validator(Arc::new(Validator::default()));
    }
    let builder = LibraryBuilder::new(options);

    if args.watch {
        return watch(&builder, project.config).await;
    }

    let spinner = ui::Spinner::new(&format!("Building {}", project.root.display()));
    let outcome = builder.build(project.config).await;
    builder.dispose().await;
    let result = match outcome {
        Ok(result) => {
            spinner.finish(&format!("Built {} library", result.library_type));
            result
        }
        Err(error) => {
            spinner.fail("Build failed");
            return Err(error.into());
        }
    };

    if let Some(path) = &args.report {
        write_build_report(&result, path)?;
        ui::info(&format!("Build report written to {}", path.display()));
    }

    if args.json {
        utils::print_json(&serde_json::to_value(&result)?)?;
    } else {
        ui::print_build_summary(&result);
        if let Some(validation) = &result.validation {
            ui::print_validation(validation);
        }
    }

    check_validation(&result)?;
    ui::success(&format!(
        "Build completed in {}",
        ui::format_duration(started.elapsed())
    ));
    Ok(())
}

/// Command-line flags win over the config file.
pub fn apply_build_args(config: &mut BuilderConfig, args: &BuildArgs) {
    match args.input.as_slice() {
        [] => {}
        [single] => config.input = Some(EntryConfig::Single(single.clone())),
        many => config.input = Some(EntryConfig::Multiple(many.to_vec())),
    }
    if !args.format.is_empty() {
        config.output.formats = args.format.clone();
    }
    if let Some(dir) = &args.out_dir {
        config.output.dir = dir.clone();
    }
    if let Some(library_type) = args.library_type {
        config.library_type = Some(library_type);
    }
    if let Some(bundler) = args.bundler {
        config.bundler = bundler;
    }
    if let Some(name) = &args.name {
        config.output.name = Some(name.clone());
    }
    if !args.external.is_empty() {
        config.external = Some(ExternalConfig::List(args.external.clone()));
    }
    if args.dev {
        config.mode = BuildMode::Development;
        config.performance.minify = false;
    }
    config.performance.minify |= args.minify;
    config.output.sourcemap |= args.sourcemap;
    config.clean |= args.clean;
    config.strict |= args.strict;
    config.dts |= args.dts;
}

fn check_validation(result: &BuildResult) -> Result<()> {
    match &result.validation {
        Some(validation) if !validation.success => Err(CliError::ValidationFailed {
            count: validation.failed_stages().max(1),
        }),
        _ => Ok(()),
    }
}

async fn watch(builder: &LibraryBuilder, config: BuilderConfig) -> Result<()> {
    let watcher = builder.watch(config).await?;
    let roots: Vec<String> = watcher.roots().iter().map(|r| r.display().to_string()).collect();
    ui::info(&format!("Watching {} (Ctrl+C to stop)", roots.join(", ")));

    let mut events = watcher.on();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(WatchEvent::BuildStart) => ui::info("Rebuilding..."),
                Ok(WatchEvent::BuildEnd(result)) => ui::success(&format!(
                    "Rebuilt {} files in {}",
                    result.outputs.len(),
                    ui::format_duration(std::time::Duration::from_millis(result.duration_ms))
                )),
                Ok(WatchEvent::Error(message)) => ui::error(&message),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "Watch output lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    watcher.close().await;
    builder.dispose().await;
    ui::info("Stopped watching");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use kiln_config::{LibraryType, OutputFormat};

    fn build_args(argv: &[&str]) -> BuildArgs {
        let mut full = vec!["kiln", "build"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Build(args) => args,
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = BuilderConfig::default();
        config.output.formats = vec![OutputFormat::Esm];
        let args = build_args(&[
            "--input", "src/a.ts", "--input", "src/b.ts", "--format", "cjs,umd", "--type", "react",
            "--external", "react,react-dom", "--out-dir", "lib", "--minify", "--clean",
        ]);
        apply_build_args(&mut config, &args);

        assert_eq!(
            config.input,
            Some(EntryConfig::Multiple(vec!["src/a.ts".into(), "src/b.ts".into()]))
        );
        assert_eq!(config.output.formats, [OutputFormat::Cjs, OutputFormat::Umd]);
        assert_eq!(config.library_type, Some(LibraryType::React));
        assert_eq!(
            config.external,
            Some(ExternalConfig::List(vec!["react".into(), "react-dom".into()]))
        );
        assert_eq!(config.output.dir, std::path::PathBuf::from("lib"));
        assert!(config.performance.minify);
        assert!(config.clean);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = BuilderConfig::default().with_input("src/main.ts");
        config.performance.minify = true;
        apply_build_args(&mut config, &build_args(&[]));
        assert_eq!(config.input, Some(EntryConfig::Single("src/main.ts".into())));
        assert!(config.performance.minify);
        assert_eq!(config.mode, BuildMode::Production);
    }

    #[test]
    fn test_dev_turns_off_minify() {
        let mut config = BuilderConfig::default();
        config.performance.minify = true;
        apply_build_args(&mut config, &build_args(&["--dev"]));
        assert_eq!(config.mode, BuildMode::Development);
        assert!(!config.performance.minify);
    }
}
