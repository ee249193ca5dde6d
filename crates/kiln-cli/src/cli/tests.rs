#[cfg(test)]
mod tests {
    use crate::cli::validation::{parse_confidence, parse_global};
    use crate::cli::{Cli, Command, Stage};
    use clap::{Parser, ValueEnum};
    use kiln_config::{LibraryType, OutputFormat};
    use std::path::PathBuf;

    #[test]
    fn test_parse_global_valid_identifiers() {
        assert_eq!(parse_global("MyLibrary"), Ok("MyLibrary".to_string()));
        assert_eq!(parse_global("_private"), Ok("_private".to_string()));
        assert_eq!(parse_global("$jquery"), Ok("$jquery".to_string()));
        assert_eq!(parse_global("My_Lib$123"), Ok("My_Lib$123".to_string()));
        assert_eq!(parse_global("café"), Ok("café".to_string()));
    }

    #[test]
    fn test_parse_global_invalid() {
        assert!(parse_global("123lib").is_err());
        assert!(parse_global("@lib").is_err());
        assert!(parse_global("my-lib").is_err());
        assert!(parse_global("my lib").is_err());
        assert_eq!(parse_global("").unwrap_err(), "Global name cannot be empty");
    }

    #[test]
    fn test_parse_confidence_bounds() {
        assert_eq!(parse_confidence("0.75"), Ok(0.75));
        assert!(parse_confidence("1.5").is_err());
        assert!(parse_confidence("high").is_err());
    }

    #[test]
    fn test_stage_values() {
        let names: Vec<_> = Stage::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            ["exports", "imports", "behavior", "runtime", "api", "performance", "integration", "snapshot"]
        );
    }

    #[test]
    fn test_stage_toggles_enable_only_listed_stages() {
        let toggles = Stage::toggles(&[Stage::Exports, Stage::Snapshot]);
        assert!(toggles.exports);
        assert!(toggles.snapshot);
        assert!(!toggles.imports);
        assert!(!toggles.runtime);
    }

    #[test]
    fn test_cli_verbose_quiet_conflict() {
        let result = Cli::try_parse_from(["kiln", "--verbose", "--quiet", "build"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_args_defaults() {
        let args = Cli::try_parse_from(["kiln", "build"]).unwrap();
        let Command::Build(build) = args.command else {
            panic!("Expected Build command");
        };
        assert_eq!(build.project.root, PathBuf::from("."));
        assert!(build.input.is_empty());
        assert!(build.format.is_empty());
        assert!(build.out_dir.is_none());
        assert!(build.library_type.is_none());
        assert!(!build.validate);
        assert!(build.validation.stages.is_empty());
    }

    #[test]
    fn test_build_args_parse_formats_and_type() {
        let args = Cli::try_parse_from([
            "kiln", "build", "lib", "--format", "esm,cjs", "--format", "umd", "--type", "vue", "--name", "MyLib",
        ])
        .unwrap();
        let Command::Build(build) = args.command else {
            panic!("Expected Build command");
        };
        assert_eq!(build.project.root, PathBuf::from("lib"));
        assert_eq!(build.format, [OutputFormat::Esm, OutputFormat::Cjs, OutputFormat::Umd]);
        assert_eq!(build.library_type, Some(LibraryType::Vue3));
        assert_eq!(build.name.as_deref(), Some("MyLib"));
    }

    #[test]
    fn test_build_args_reject_bad_values() {
        assert!(Cli::try_parse_from(["kiln", "build", "--format", "amd"]).is_err());
        assert!(Cli::try_parse_from(["kiln", "build", "--type", "elm"]).is_err());
        assert!(Cli::try_parse_from(["kiln", "build", "--name", "my-lib"]).is_err());
        assert!(Cli::try_parse_from(["kiln", "build", "--watch", "--validate"]).is_err());
    }

    #[test]
    fn test_validate_args_stages() {
        let args = Cli::try_parse_from([
            "kiln", "validate", "--stages", "exports,snapshot", "--update-snapshots", "--no-install",
        ])
        .unwrap();
        let Command::Validate(validate) = args.command else {
            panic!("Expected Validate command");
        };
        assert_eq!(validate.validation.stages, [Stage::Exports, Stage::Snapshot]);
        assert!(validate.validation.update_snapshots);
        assert!(validate.validation.no_install);
        assert!(!validate.validation.strict_validation);
    }

    #[test]
    fn test_detect_args() {
        let args = Cli::try_parse_from(["kiln", "detect", "pkg", "--json", "--min-confidence", "0.8"]).unwrap();
        let Command::Detect(detect) = args.command else {
            panic!("Expected Detect command");
        };
        assert_eq!(detect.root, PathBuf::from("pkg"));
        assert!(detect.json);
        assert_eq!(detect.min_confidence, Some(0.8));
    }
}
