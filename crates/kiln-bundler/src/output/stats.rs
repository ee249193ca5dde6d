//! Aggregated size statistics.

use std::collections::{BTreeMap, BTreeSet};

use kiln_config::OutputFormat;
use serde::{Deserialize, Serialize};

use super::OutputArtifact;
use crate::plugins::rolldown::is_bare_specifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargestArtifact {
    pub file_name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatStats {
    pub size: u64,
    pub gzip_size: u64,
    pub file_count: usize,
    pub largest: Option<LargestArtifact>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub total_size: u64,
    pub total_gzip_size: u64,
    pub file_count: usize,
    pub formats: BTreeMap<OutputFormat, FormatStats>,
    /// Bare module specifiers the emitted chunks import.
    pub externals: BTreeSet<String>,
}

impl BuildStats {
    pub fn from_artifacts(artifacts: &[OutputArtifact]) -> Self {
        let mut stats = BuildStats::default();
        let emitted: BTreeSet<&str> = artifacts
            .iter()
            .flat_map(|a| [a.file_name.as_str(), base_name(&a.file_name)])
            .collect();

        for artifact in artifacts {
            stats.total_size += artifact.size;
            stats.total_gzip_size += artifact.gzip_size;
            stats.file_count += 1;

            let format = stats.formats.entry(artifact.format).or_default();
            format.size += artifact.size;
            format.gzip_size += artifact.gzip_size;
            format.file_count += 1;
            if format.largest.as_ref().is_none_or(|l| artifact.size > l.size) {
                format.largest = Some(LargestArtifact {
                    file_name: artifact.file_name.clone(),
                    size: artifact.size,
                });
            }

            for import in &artifact.imports {
                if is_bare_specifier(import) && !emitted.contains(import.as_str()) {
                    stats.externals.insert(import.clone());
                }
            }
        }
        stats
    }
}

fn base_name(file_name: &str) -> &str {
    file_name.rsplit('/').next().unwrap_or(file_name)
}
