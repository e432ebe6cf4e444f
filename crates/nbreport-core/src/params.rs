// nbreport-core/src/params.rs
// ============================================================================
// Module: Parameter Coercion
// Description: Typed coercion of raw request parameters.
// Purpose: Produce the request-scoped parameters file injected into the
//          template execution stage.
// Dependencies: crate::literal, serde_json, tokio
// ============================================================================

//! ## Overview
//! Raw query parameters are strings. Each value is parsed as a strict
//! literal when possible and kept as its original string otherwise, so
//! `4` becomes an integer while `cherry ` stays a string. The coerced map is
//! written to a `parameters.json` file inside the request's scratch
//! directory; the execution engine reads parameters from that file only,
//! which keeps shell metacharacters in values away from the command line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;

use crate::literal::parse_literal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Filename of the request-scoped parameters file.
pub const PARAMETERS_FILE_NAME: &str = "parameters.json";

// ============================================================================
// SECTION: Coercion
// ============================================================================

/// Coerces raw request parameters into typed values.
///
/// Only the first occurrence of a repeated key is honored; later duplicates
/// are ignored. Values that do not parse as literals fall back to their
/// original string form.
#[must_use]
pub fn coerce_parameters(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut parameters = Map::new();
    for (key, raw) in pairs {
        if parameters.contains_key(key) {
            continue;
        }
        let value = match parse_literal(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(parameter = %key, error = %err, "keeping raw string for parameter");
                Value::String(raw.clone())
            }
        };
        parameters.insert(key.clone(), value);
    }
    parameters
}

/// Writes the coerced parameters file into a scratch directory.
///
/// # Errors
///
/// Returns an [`std::io::Error`] when serialization or the write fails.
pub async fn write_parameters_file(
    dir: &Path,
    parameters: &Map<String, Value>,
) -> Result<PathBuf, std::io::Error> {
    let path = dir.join(PARAMETERS_FILE_NAME);
    let payload = serde_json::to_vec(&Value::Object(parameters.clone()))?;
    tokio::fs::write(&path, payload).await?;
    Ok(path)
}
