//! `kiln detect`: report what kind of library a directory holds.

use kiln_bundler::{DetectorOptions, LibraryTypeDetector};
use kiln_config::ConfigDiscovery;

use crate::cli::DetectArgs;
use crate::commands::utils;
use crate::error::Result;
use crate::ui;

pub async fn execute(args: DetectArgs) -> Result<()> {
    let root = utils::resolve_root(&args.root)?;
    let settings = ConfigDiscovery::new(&root).load_or_default()?.settings.detection;

    let mut options = DetectorOptions::from(&settings);
    if let Some(min_confidence) = args.min_confidence {
        options.min_confidence = min_confidence;
    }
    let detection = LibraryTypeDetector::new(options).detect(&root).await;

    if args.json {
        return utils::print_json(&serde_json::to_value(&detection)?);
    }
    ui::print_detection(&detection);
    if detection.is_fallback() {
        ui::warning("Detection failed; defaulting to a plain TypeScript library");
    }
    Ok(())
}
