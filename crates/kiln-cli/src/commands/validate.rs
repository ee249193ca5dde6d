//! `kiln validate`: build the library and re-test the emitted package.

use std::sync::Arc;

use kiln_bundler::{LibraryBuilder, ValidationSummary};
use kiln_validate::Validator;
use serde_json::Value;

use crate::cli::ValidateArgs;
use crate::commands::utils;
use crate::error::{CliError, Result};
use crate::ui;

pub async fn execute(args: ValidateArgs) -> Result<()> {
    let mut project = utils::load_project(&args.project)?;
    utils::apply_validation_args(&mut project.config, &args.validation);

    let validator = Arc::new(Validator::default());
    if validator.node().is_none() {
        ui::warning("node was not found; stages that load the bundle will be skipped");
    }
    let builder = LibraryBuilder::new(project.builder_options().with_validator(validator));

    let spinner = ui::Spinner::new(&format!("Building and validating {}", project.root.display()));
    let outcome = builder.build(project.config).await;
    builder.dispose().await;
    let result = match outcome {
        Ok(result) => result,
        Err(error) => {
            spinner.fail("Validation aborted");
            return Err(error.into());
        }
    };
    let Some(summary) = result.validation else {
        spinner.fail("No validation ran");
        return Err(CliError::InvalidArgument(
            "validation is disabled for this build".to_string(),
        ));
    };
    if summary.success {
        spinner.finish("Validation passed");
    } else {
        spinner.fail("Validation found problems");
    }

    if let Some(path) = &args.report {
        utils::write_json(path, &report_value(&summary)?)?;
        ui::info(&format!("Validation report written to {}", path.display()));
    }
    if args.json {
        utils::print_json(&serde_json::to_value(&summary)?)?;
    } else {
        ui::print_validation(&summary);
    }

    if summary.success {
        Ok(())
    } else {
        Err(CliError::ValidationFailed {
            count: summary.failed_stages().max(1),
        })
    }
}

/// The full stage report when the validator attached one, else the summary.
fn report_value(summary: &ValidationSummary) -> Result<Value> {
    match &summary.report {
        Some(report) => Ok(report.clone()),
        None => Ok(serde_json::to_value(summary)?),
    }
}
