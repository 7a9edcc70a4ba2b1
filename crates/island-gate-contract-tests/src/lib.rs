//! Helpers for validating persisted blobs and external responses against the
//! frozen JSON schemas under the workspace `contracts/` directory.

use std::path::PathBuf;

use jsonschema::JSONSchema;
use serde_json::Value;

/// Absolute path of a file under `contracts/`.
pub fn contract_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../contracts")
        .join(relative)
}

/// Reads and parses a JSON file under `contracts/`.
///
/// # Panics
/// Panics when the file is missing or not valid JSON; contract files are
/// checked-in fixtures.
pub fn load_json(relative: &str) -> Value {
    let path = contract_path(relative);
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|error| panic!("{} should be readable: {error}", path.display()));
    serde_json::from_str(&raw)
        .unwrap_or_else(|error| panic!("{} should be valid json: {error}", path.display()))
}

/// Compiles the schema at `relative`.
///
/// # Panics
/// Panics when the schema does not compile.
pub fn compile_validator(relative: &str) -> JSONSchema {
    let schema = load_json(relative);
    JSONSchema::compile(&schema).expect("schema should compile")
}
