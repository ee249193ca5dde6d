//! Per-type evidence tables.

use kiln_config::LibraryType;

/// Evidence a library type leaves in a project.
#[derive(Debug, Clone, Copy)]
pub struct TypePattern {
    pub library_type: LibraryType,
    /// Tie-break and argmax multiplier, applied as `priority / 10`.
    pub priority: u8,
    pub weight: f64,
    /// Globs relative to the project root.
    pub files: &'static [&'static str],
    pub dependencies: &'static [&'static str],
    /// Files expected at the project root.
    pub configs: &'static [&'static str],
    /// Top-level `package.json` keys.
    pub package_fields: &'static [&'static str],
}

pub(crate) const FILE_FACTOR: f64 = 1.0;
pub(crate) const DEPENDENCY_FACTOR: f64 = 0.8;
pub(crate) const CONFIG_FACTOR: f64 = 0.6;
pub(crate) const FIELD_FACTOR: f64 = 0.4;

impl TypePattern {
    /// Highest raw score the signals of this pattern can produce.
    pub fn max_score(&self) -> f64 {
        let mut max = 0.0;
        if !self.files.is_empty() {
            max += FILE_FACTOR;
        }
        if !self.dependencies.is_empty() {
            max += DEPENDENCY_FACTOR;
        }
        if !self.configs.is_empty() {
            max += CONFIG_FACTOR;
        }
        if !self.package_fields.is_empty() {
            max += FIELD_FACTOR;
        }
        max * self.weight
    }

    pub fn priority_factor(&self) -> f64 {
        f64::from(self.priority) / 10.0
    }
}

/// Declaration order doubles as the final tie-break.
pub const PATTERNS: &[TypePattern] = &[
    TypePattern {
        library_type: LibraryType::Typescript,
        priority: 5,
        weight: 1.0,
        files: &["**/*.ts", "**/*.mts", "**/*.cts"],
        dependencies: &["typescript"],
        configs: &["tsconfig.json"],
        package_fields: &["types", "typings"],
    },
    TypePattern {
        library_type: LibraryType::Style,
        priority: 6,
        weight: 1.0,
        files: &["**/*.css", "**/*.scss", "**/*.sass", "**/*.less", "**/*.styl"],
        dependencies: &["sass", "postcss"],
        configs: &["postcss.config.js", "postcss.config.cjs", "stylelint.config.js"],
        package_fields: &["style", "sass"],
    },
    TypePattern {
        library_type: LibraryType::Vue2,
        priority: 9,
        weight: 1.0,
        files: &["**/*.vue"],
        dependencies: &["vue", "vue-template-compiler"],
        configs: &["vue.config.js"],
        package_fields: &[],
    },
    TypePattern {
        library_type: LibraryType::Vue3,
        priority: 9,
        weight: 1.0,
        files: &["**/*.vue"],
        dependencies: &["vue"],
        configs: &["vue.config.js"],
        package_fields: &[],
    },
    TypePattern {
        library_type: LibraryType::React,
        priority: 8,
        weight: 1.0,
        files: &["**/*.jsx", "**/*.tsx"],
        dependencies: &["react", "react-dom"],
        configs: &[],
        package_fields: &[],
    },
    TypePattern {
        library_type: LibraryType::Svelte,
        priority: 9,
        weight: 1.0,
        files: &["**/*.svelte"],
        dependencies: &["svelte"],
        configs: &["svelte.config.js"],
        package_fields: &["svelte"],
    },
    TypePattern {
        library_type: LibraryType::Solid,
        priority: 8,
        weight: 1.0,
        files: &["**/*.jsx", "**/*.tsx"],
        dependencies: &["solid-js"],
        configs: &[],
        package_fields: &[],
    },
    TypePattern {
        library_type: LibraryType::Preact,
        priority: 8,
        weight: 1.0,
        files: &["**/*.jsx", "**/*.tsx"],
        dependencies: &["preact"],
        configs: &[],
        package_fields: &[],
    },
    TypePattern {
        library_type: LibraryType::Lit,
        priority: 8,
        weight: 1.0,
        files: &["**/*-element.ts", "**/*-element.js", "**/*.lit.ts"],
        dependencies: &["lit"],
        configs: &["custom-elements-manifest.config.js"],
        package_fields: &["customElements"],
    },
    TypePattern {
        library_type: LibraryType::Angular,
        priority: 9,
        weight: 1.0,
        files: &["**/*.component.ts", "**/*.module.ts", "**/*.service.ts"],
        dependencies: &["@angular/core", "@angular/common"],
        configs: &["angular.json", "ng-package.json"],
        package_fields: &["ngPackage"],
    },
];

pub fn pattern_for(library_type: LibraryType) -> Option<&'static TypePattern> {
    PATTERNS.iter().find(|p| p.library_type == library_type)
}
