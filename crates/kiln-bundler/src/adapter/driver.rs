//! The build pipeline shared by every engine.

use std::time::Instant;

use futures::future::try_join_all;
use tracing::{debug, info};

use super::{BundlerAdapter, EngineOutput, FormatConfig};
use crate::output::{BuildStats, OutputArtifact, enhance, validate_outputs};
use crate::plugins::{ChunkInfo, HookKind, UnifiedPlugin};
use crate::result::{BuildPerformance, BuildResult};
use crate::unified::{UnifiedConfig, UnifiedOutputConfig};
use crate::{Error, Result};

/// Up to this many format builds run concurrently; more run one by one.
pub const PARALLEL_FORMAT_LIMIT: usize = 3;

/// Plan, build every format, then decorate, enhance and check the artifacts.
pub(crate) async fn drive<A>(adapter: &A, config: &UnifiedConfig) -> Result<BuildResult>
where
    A: BundlerAdapter + ?Sized,
{
    let started = Instant::now();
    let plan = adapter.plan(config)?;
    let plugins = adapter.transform_plugins(&config.plugins);

    let mut warnings = config.warnings.clone();
    warnings.extend(plan.warnings.iter().cloned());
    for rejection in &plugins.rejected {
        warnings.push(format!(
            "Plugin '{}' is not used by {}: {}",
            rejection.plugin,
            adapter.kind(),
            rejection.reason
        ));
    }

    let parallel = plan.configs.len() <= PARALLEL_FORMAT_LIMIT;
    info!(
        bundler = %adapter.kind(),
        formats = ?plan.formats(),
        parallel,
        "Building library"
    );

    let builds = if parallel {
        try_join_all(
            plan.configs
                .iter()
                .map(|format| timed(adapter, config, format, &plugins.accepted)),
        )
        .await?
    } else {
        let mut builds = Vec::with_capacity(plan.configs.len());
        for format in &plan.configs {
            builds.push(timed(adapter, config, format, &plugins.accepted).await?);
        }
        builds
    };

    let mut performance = BuildPerformance {
        parallel,
        ..BuildPerformance::default()
    };
    let mut outputs = Vec::new();
    for (format, output, elapsed_ms) in builds {
        performance.per_format.insert(format.format, elapsed_ms);
        warnings.extend(output.warnings);

        for mut artifact in output.artifacts {
            tag(&mut artifact, format);
            if artifact.is_chunk() && !artifact.is_sourcemap() {
                render_chunk(&plugins.accepted, &mut artifact).await?;
                apply_addons(&mut artifact, &format.output);
            }
            enhance(&mut artifact);
            debug!(
                file = %artifact.file_name,
                size = artifact.size,
                gzip = artifact.gzip_size,
                "Emitted artifact"
            );
            outputs.push(artifact);
        }
    }

    if outputs.is_empty() {
        return Err(Error::EmptyOutput);
    }

    let output_warnings = validate_outputs(&outputs, &plan.formats(), config.sourcemap);
    if config.strict && !output_warnings.is_empty() {
        return Err(Error::StrictWarnings {
            warnings: output_warnings,
        });
    }
    warnings.extend(output_warnings);

    let mut result = BuildResult::new(adapter.kind(), config.mode, config.library_type);
    result.stats = BuildStats::from_artifacts(&outputs);
    result.outputs = outputs;
    result.warnings = warnings;
    result.duration_ms = started.elapsed().as_millis() as u64;
    performance.total_ms = result.duration_ms;
    result.performance = performance;

    info!(
        build_id = %result.build_id,
        files = result.stats.file_count,
        bytes = result.stats.total_size,
        duration_ms = result.duration_ms,
        "Build finished"
    );
    Ok(result)
}

async fn timed<'a, A>(
    adapter: &A,
    config: &UnifiedConfig,
    format: &'a FormatConfig,
    plugins: &[UnifiedPlugin],
) -> Result<(&'a FormatConfig, EngineOutput, u64)>
where
    A: BundlerAdapter + ?Sized,
{
    let started = Instant::now();
    debug!(format = %format.format, dir = %format.dir.display(), "Building format");
    let output = adapter.build_format(config, format, plugins).await?;
    Ok((format, output, started.elapsed().as_millis() as u64))
}

/// Place the artifact under its format directory and record how it was built.
fn tag(artifact: &mut OutputArtifact, format: &FormatConfig) {
    let prefix = format!("{}/", format.dir_name());
    if !artifact.file_name.starts_with(&prefix) {
        artifact.file_name = format!("{prefix}{}", artifact.file_name.trim_start_matches("./"));
    }
    artifact.format = format.format;
    artifact.preserve_modules = format.preserve_modules;
    artifact.sourcemap = format.sourcemap;
}

async fn render_chunk(plugins: &[UnifiedPlugin], artifact: &mut OutputArtifact) -> Result<()> {
    for plugin in plugins.iter().filter(|p| p.implements(HookKind::RenderChunk)) {
        let Some(code) = artifact.code.as_deref() else {
            return Ok(());
        };
        let chunk = ChunkInfo {
            file_name: artifact.file_name.clone(),
            format: artifact.format,
            is_entry: artifact.is_entry,
        };
        let rendered = plugin
            .handler()
            .render_chunk(code, &chunk)
            .await
            .map_err(|e| Error::Plugin {
                plugin: plugin.name().to_string(),
                message: format!("{e:#}"),
            })?;
        if let Some(code) = rendered {
            artifact.set_code(code);
        }
    }
    Ok(())
}

/// Banner and intro go first, outro and footer last, each on its own line.
fn apply_addons(artifact: &mut OutputArtifact, output: &UnifiedOutputConfig) {
    let head: Vec<&String> = [&output.banner, &output.intro].into_iter().flatten().collect();
    let tail: Vec<&String> = [&output.outro, &output.footer].into_iter().flatten().collect();
    if head.is_empty() && tail.is_empty() {
        return;
    }
    let Some(code) = artifact.code.take() else {
        return;
    };

    let mut decorated = String::with_capacity(code.len() + 128);
    for addon in head {
        decorated.push_str(addon);
        decorated.push('\n');
    }
    decorated.push_str(&code);
    for addon in tail {
        if !decorated.ends_with('\n') {
            decorated.push('\n');
        }
        decorated.push_str(addon);
    }
    artifact.set_code(decorated);
}
