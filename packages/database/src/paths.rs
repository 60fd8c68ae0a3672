#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the catalog database.
//!
//! The default location is `data/catchments.duckdb` under the workspace
//! root. `CATCHMENT_MAP_DB` overrides it, and an explicit path overrides
//! both.

use std::path::{Path, PathBuf};

/// Environment variable naming the catalog database file.
pub const DB_ENV_VAR: &str = "CATCHMENT_MAP_DB";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`. Falls back to the
/// manifest directory itself if it has no grandparent.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.ancestors().nth(2).unwrap_or(manifest).to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the default catalog database path.
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join("catchments.duckdb")
}

/// Picks the catalog path: `explicit`, then `CATCHMENT_MAP_DB`, then the
/// default.
#[must_use]
pub fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    resolve_with(explicit, std::env::var_os(DB_ENV_VAR).map(PathBuf::from))
}

fn resolve_with(explicit: Option<&Path>, from_env: Option<PathBuf>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| from_env.filter(|p| !p.as_os_str().is_empty()))
        .unwrap_or_else(default_db_path)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
