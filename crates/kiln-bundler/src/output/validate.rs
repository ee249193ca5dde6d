//! Non-fatal checks over emitted artifacts.

use std::collections::BTreeSet;

use kiln_config::OutputFormat;

use super::OutputArtifact;

/// Problems worth reporting about a finished build. Never fails the build by
/// itself; strict mode upgrades the returned warnings to an error.
///
/// Chunks must have a `.map` sibling when `sourcemap` is set or the chunk
/// itself was built with source maps.
pub fn validate_outputs(
    artifacts: &[OutputArtifact],
    requested: &[OutputFormat],
    sourcemap: bool,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let names: BTreeSet<&str> = artifacts.iter().map(|a| a.file_name.as_str()).collect();

    for artifact in artifacts {
        if artifact.size == 0 {
            warnings.push(format!("{} is empty", artifact.file_name));
        }

        if artifact.is_chunk() && artifact.format == OutputFormat::Cjs && artifact.is_entry {
            let code = artifact.code.as_deref().unwrap_or_default();
            if !(code.contains("exports.")
                || code.contains("module.exports")
                || code.contains("exports[")
                || code.contains("Object.defineProperty(exports"))
            {
                warnings.push(format!(
                    "{} is a CommonJS entry without any exports",
                    artifact.file_name
                ));
            }
        }

        if (sourcemap || artifact.sourcemap) && artifact.is_chunk() && !artifact.is_sourcemap() {
            let map = format!("{}.map", artifact.file_name);
            if !names.contains(map.as_str()) {
                warnings.push(format!("{} has no source map ({map})", artifact.file_name));
            }
        }
    }

    for format in requested {
        if !artifacts.iter().any(|a| a.format == *format) {
            warnings.push(format!("No output was produced for the {format} format"));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_empty_and_exportless_cjs() {
        let mut cjs = OutputArtifact::chunk("cjs/index.js", OutputFormat::Cjs, "console.log(1);");
        cjs.is_entry = true;
        let empty = OutputArtifact::chunk("es/empty.js", OutputFormat::Esm, "");

        let warnings = validate_outputs(&[cjs, empty], &[OutputFormat::Esm, OutputFormat::Cjs], false);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("without any exports")));
        assert!(warnings.iter().any(|w| w.contains("es/empty.js is empty")));
    }

    #[test]
    fn flags_missing_formats_and_maps() {
        let chunk = OutputArtifact::chunk("es/index.js", OutputFormat::Esm, "export {}");
        let warnings = validate_outputs(&[chunk], &[OutputFormat::Esm, OutputFormat::Umd], true);
        assert!(warnings.iter().any(|w| w.contains("umd format")));
        assert!(warnings.iter().any(|w| w.contains("es/index.js.map")));
    }

    #[test]
    fn clean_build_has_no_warnings() {
        let mut cjs = OutputArtifact::chunk("cjs/index.js", OutputFormat::Cjs, "exports.a = 1;");
        cjs.is_entry = true;
        let map = OutputArtifact::asset("cjs/index.js.map", OutputFormat::Cjs, b"{}".to_vec());
        assert!(validate_outputs(&[cjs, map], &[OutputFormat::Cjs], true).is_empty());
    }
}
