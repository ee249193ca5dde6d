use clap::ValueEnum;
use kiln_config::StageToggles;

/// A post-build validation stage that can be switched on from the command line.
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Stage {
    /// Compare exported names between source and bundle
    #[value(name = "exports")]
    Exports,

    /// Compare package imports against declared dependencies
    #[value(name = "imports")]
    Imports,

    /// Load every format and check it exposes the same API
    #[value(name = "behavior")]
    Behavior,

    /// Run the project's own test command against the bundle
    #[value(name = "runtime")]
    Runtime,

    /// Check exported signatures stayed compatible
    #[value(name = "api")]
    Api,

    /// Measure bundle load time and heap (advisory)
    #[value(name = "performance")]
    Performance,

    /// Import the package by its own name
    #[value(name = "integration")]
    Integration,

    /// Compare output sizes and hashes with the stored baseline
    #[value(name = "snapshot")]
    Snapshot,
}

impl Stage {
    /// Toggles with exactly `stages` enabled.
    pub fn toggles(stages: &[Stage]) -> StageToggles {
        let mut toggles = StageToggles::none();
        for stage in stages {
            match stage {
                Stage::Exports => toggles.exports = true,
                Stage::Imports => toggles.imports = true,
                Stage::Behavior => toggles.behavior = true,
                Stage::Runtime => toggles.runtime = true,
                Stage::Api => toggles.api = true,
                Stage::Performance => toggles.performance = true,
                Stage::Integration => toggles.integration = true,
                Stage::Snapshot => toggles.snapshot = true,
            }
        }
        toggles
    }
}
