//! Strategy selection and config unification on real project layouts.

mod helpers;

use std::path::PathBuf;

use helpers::{react_library, ts_library, two_entry_library, vue_library, write};
use kiln_bundler::{
    BuilderConfig, Error, LibraryType, OutputFormat, StrategyManager, UnifiedInput,
};
use kiln_config::ExternalConfig;
use tempfile::TempDir;

#[test]
fn manager_registers_a_strategy_for_every_type() {
    let manager = StrategyManager::new();
    for library_type in LibraryType::ALL {
        assert!(manager.has_strategy(library_type), "missing {library_type}");
    }
    assert_eq!(manager.library_types().len(), LibraryType::ALL.len());
}

#[test]
fn typescript_entries_are_discovered_without_tests() {
    let project = ts_library();
    let config = BuilderConfig::new(project.path());
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::Typescript)
        .expect("typescript strategy");

    let unified = strategy.apply_strategy(&config).expect("apply strategy");
    let UnifiedInput::Named(entries) = &unified.input else {
        panic!("expected discovered entries, got {:?}", unified.input);
    };
    assert_eq!(entries.keys().collect::<Vec<_>>(), ["add", "clamp", "index"]);
    assert_eq!(entries["index"], PathBuf::from("src/index.ts"));

    assert!(unified.external.matches("lodash"));
    assert!(unified.external.matches("lodash/clamp"));
    assert!(!unified.external.matches("lodash-es"));
    assert!(!unified.external.matches("typescript"));
}

#[test]
fn react_runtime_subpaths_stay_external() {
    let project = react_library();
    let config = BuilderConfig::new(project.path())
        .with_input("src/Button.tsx")
        .with_formats([OutputFormat::Esm, OutputFormat::Umd]);
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::React)
        .expect("react strategy");

    let unified = strategy.apply_strategy(&config).expect("apply strategy");
    assert!(unified.external.matches("react"));
    assert!(unified.external.matches("react/jsx-runtime"));
    assert!(unified.external.matches("react-dom/client"));

    let umd = &unified.output[1];
    assert_eq!(umd.format, OutputFormat::Umd);
    assert_eq!(umd.name.as_deref(), Some("acmeUi"));
    assert_eq!(umd.globals.get("react").map(String::as_str), Some("React"));
    assert_eq!(umd.globals.get("react-dom").map(String::as_str), Some("ReactDOM"));
}

#[test]
fn glob_entries_expand_to_named_inputs() {
    let project = two_entry_library();
    let config = BuilderConfig::new(project.path()).with_input("src/*.ts");
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::Typescript)
        .expect("typescript strategy");

    let unified = strategy.apply_strategy(&config).expect("apply strategy");
    assert_eq!(
        unified.input,
        UnifiedInput::Named(
            [
                ("a".to_string(), PathBuf::from("src/a.ts")),
                ("b".to_string(), PathBuf::from("src/b.ts")),
            ]
            .into_iter()
            .collect()
        )
    );
}

#[test]
fn glob_without_matches_is_reported() {
    let project = two_entry_library();
    let config = BuilderConfig::new(project.path()).with_input("lib/**/*.ts");
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::Typescript)
        .expect("typescript strategy");

    match strategy.apply_strategy(&config) {
        Err(Error::NoEntryMatches { patterns }) => assert_eq!(patterns, ["lib/**/*.ts"]),
        other => panic!("expected NoEntryMatches, got {other:?}"),
    }
}

#[test]
fn multi_entry_single_file_formats_warn_during_validation() {
    let project = two_entry_library();
    let config = BuilderConfig::new(project.path())
        .with_input("src/*.ts")
        .with_formats([OutputFormat::Esm, OutputFormat::Iife]);
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::Typescript)
        .expect("typescript strategy");

    let validation = strategy.validate_config(&config);
    assert!(validation.valid);
    assert!(validation.warnings.iter().any(|w| w.contains("IIFE")));
    assert!(!validation.suggestions.is_empty());
}

#[test]
fn strategy_refuses_a_config_declaring_another_type() {
    let project = ts_library();
    let config = BuilderConfig::new(project.path()).with_library_type(LibraryType::React);
    let manager = StrategyManager::new();

    assert!(!manager
        .get_strategy(LibraryType::Typescript)
        .expect("typescript strategy")
        .is_applicable(&config));
    assert!(manager
        .get_strategy(LibraryType::React)
        .expect("react strategy")
        .is_applicable(&config));
}

#[test]
fn vue_without_compiler_provider_warns() {
    let project = vue_library("^3.4.0");
    let config = BuilderConfig::new(project.path()).with_input("src/index.ts");
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::Vue3)
        .expect("vue3 strategy");

    let validation = strategy.validate_config(&config);
    assert!(validation.warnings.iter().any(|w| w.contains("'vue'")));

    let unified = strategy.apply_strategy(&config).expect("apply strategy");
    assert!(unified.external.matches("vue"));
    assert!(!unified.warnings.is_empty());
}

#[test]
fn user_regex_externals_gain_runtime_packages() {
    let project = react_library();
    let mut config = BuilderConfig::new(project.path()).with_input("src/Card.tsx");
    config.external = Some(ExternalConfig::Pattern {
        regex: "^@acme/".to_string(),
    });
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::React)
        .expect("react strategy");

    let unified = strategy.apply_strategy(&config).expect("apply strategy");
    assert_eq!(unified.external.kind(), "pattern");
    assert!(unified.external.matches("@acme/icons"));
    assert!(unified.external.matches("react"));
    assert!(!unified.external.matches("reactive"));
}

#[test]
fn style_strategy_emits_only_esm() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "package.json", r#"{ "name": "acme-css" }"#);
    write(dir.path(), "src/index.css", ".btn { color: red; }\n");

    let config = BuilderConfig::new(dir.path()).with_formats([OutputFormat::Esm, OutputFormat::Cjs]);
    let strategy = StrategyManager::new()
        .get_strategy(LibraryType::Style)
        .expect("style strategy");

    let unified = strategy.apply_strategy(&config).expect("apply strategy");
    assert_eq!(unified.input, UnifiedInput::Single(PathBuf::from("src/index.css")));
    assert_eq!(unified.formats(), vec![OutputFormat::Esm]);
    assert!(!unified.treeshake);
}
