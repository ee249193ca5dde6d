//! Global configuration settings shared across profiles.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub color: Option<bool>,

    #[serde(default)]
    pub detection: DetectionSettings,

    /// Extra environment passed to engine and test subprocesses.
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Below this confidence the detector answers `mixed`.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default)]
    pub cache: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            cache: false,
        }
    }
}

fn default_min_confidence() -> f64 {
    0.6
}
