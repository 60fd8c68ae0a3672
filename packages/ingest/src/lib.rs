#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Import of catchment exports, store masters, and approved-property
//! payloads into the catalog.
//!
//! Spreadsheet layouts are declared in TOML under `layouts/` and embedded
//! at compile time, so a new export format is a new file rather than new
//! code. Every import upserts by its key in one transaction and reports what it
//! read, wrote, and skipped.

pub mod markets;
pub mod points;
pub mod properties;
pub mod reader;
pub mod registry;

pub use markets::{
    CentroidReport, ReparseReport, compute_centroids, import_markets, reparse_markets,
};
pub use points::import_points;
pub use properties::import_properties;
pub use registry::{all_layouts, layout, market_layout, point_layout};

use catchment_map_database::DbError;
use catchment_map_ingest_models::PointKey;

/// Errors that can occur while importing.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error reading the input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog read or write failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// No layout is registered under this id.
    #[error("Unknown import layout: {id}")]
    UnknownLayout {
        /// Requested layout id.
        id: String,
    },

    /// The layout targets a different table than the importer writes.
    #[error("Layout {layout} does not describe {expected}")]
    WrongTarget {
        /// Layout id.
        layout: String,
        /// What the importer needed.
        expected: &'static str,
    },

    /// A required column is missing from the header row.
    #[error("Layout {layout}: required column {column:?} not found")]
    MissingColumn {
        /// Layout id.
        layout: String,
        /// Configured header name.
        column: String,
    },

    /// The layout keys points on a column it does not map.
    #[error("Layout {layout}: key column {key} is not mapped")]
    UnmappedKey {
        /// Layout id.
        layout: String,
        /// Configured key.
        key: PointKey,
    },

    /// The file has no non-empty row to use as a header.
    #[error("Input has no header row")]
    NoHeader,
}
