//! kiln command line entry point.

use clap::Parser;
use kiln_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Build(build_args) => commands::build_execute(build_args).await,
        cli::Command::Detect(detect_args) => commands::detect_execute(detect_args).await,
        cli::Command::Validate(validate_args) => commands::validate_execute(validate_args).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", error::cli_error_to_miette(err));
        std::process::exit(code);
    }
}
