//! JSON Schema validation for transformation configuration documents.
//!
//! The configuration schema is embedded at compile time from
//! `schemas/transformation-config.json` and checked with JSON Schema Draft 7
//! before the document is decoded, so every structural problem is reported at
//! once instead of as the first serde error.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use bgstrans::validation::validate_config;
//!
//! let config = json!({ "validCSs": ["cs1"], "validHSs": ["hs1"] });
//! assert!(validate_config(&config).is_ok());
//! ```

use once_cell::sync::Lazy;
use serde_json::Value;

const CONFIG_SCHEMA_SOURCE: &str = include_str!("../../schemas/transformation-config.json");

static CONFIG_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(CONFIG_SCHEMA_SOURCE).map_err(|e| format!("Invalid embedded schema: {e}"))
});

/// Validate a JSON value against a JSON schema.
///
/// Returns every violation message.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {e}")])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Yes/no variant of [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate against the embedded configuration schema.
pub fn validate_config(data: &Value) -> Result<(), Vec<String>> {
    let schema = CONFIG_SCHEMA.as_ref().map_err(|e| vec![e.clone()])?;
    validate(schema, data)
}

/// Quick check against the configuration schema.
pub fn is_valid_config(data: &Value) -> bool {
    validate_config(data).is_ok()
}
