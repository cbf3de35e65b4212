//! Locations of the frozen gateway response contracts.

use std::path::PathBuf;

/// Root `contracts/` directory of the workspace.
pub fn contracts_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts"))
}

/// Path of a schema file, e.g. `guide-response.schema.json`.
pub fn schema_path(name: &str) -> PathBuf {
    contracts_dir().join(name)
}

/// Path of a fixture file, e.g. `guide-response.valid.json`.
pub fn fixture_path(name: &str) -> PathBuf {
    contracts_dir().join("fixtures").join(name)
}
