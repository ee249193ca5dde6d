/// Parse a global variable name for UMD/IIFE bundles.
///
/// The name must be a JavaScript identifier: a letter, `_` or `$` first,
/// then letters, digits, `_` or `$`.
pub fn parse_global(s: &str) -> Result<String, String> {
    let Some(first) = s.chars().next() else {
        return Err("Global name cannot be empty".to_string());
    };
    if !first.is_alphabetic() && first != '_' && first != '$' {
        return Err(format!(
            "Global name must start with a letter, underscore, or dollar sign: '{s}'"
        ));
    }
    if s.chars().any(|c| !c.is_alphanumeric() && c != '_' && c != '$') {
        return Err(format!(
            "Global name can only contain letters, numbers, underscores, or dollar signs: '{s}'"
        ));
    }
    Ok(s.to_string())
}

/// Parse a confidence threshold in `0.0..=1.0`.
pub fn parse_confidence(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("not a number: '{s}'"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("confidence must be between 0 and 1, got {value}"))
    }
}
