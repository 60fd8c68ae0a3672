#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Import layout definitions and import result types.
//!
//! A layout says which spreadsheet columns feed which catalog fields and
//! how the file is encoded. Layouts are written in TOML and embedded in
//! the ingest crate at compile time.

use std::time::Duration;

use catchment_map_market_models::PointKind;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Text encoding of a source file.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8. Invalid sequences are replaced.
    #[default]
    Utf8,
    /// ISO-8859-1. Every byte maps to the code point of the same value.
    Latin1,
}

/// A CSV import layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLayout {
    /// Unique layout identifier (e.g. `"catchments"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the export is and where it comes from.
    #[serde(default)]
    pub description: Option<String>,
    /// File encoding.
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Non-blank rows to discard before the header row.
    #[serde(default)]
    pub skip_rows: usize,
    /// Destination table and column mapping.
    pub target: LayoutTarget,
}

/// Where a layout's rows go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutTarget {
    /// Rows become markets.
    Markets {
        /// Source column for each market field.
        columns: MarketColumns,
    },
    /// Rows become stores or approved properties.
    Points {
        /// Which point table receives the rows.
        point_kind: PointKind,
        /// Source column for each point field.
        columns: PointColumns,
    },
}

/// Column names for a catchment export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketColumns {
    /// Integer market id.
    pub market_id: String,
    /// Encoded market name.
    pub name: String,
    /// Boundary WKT.
    pub boundary: String,
    /// Raw city column.
    #[serde(default)]
    pub city: Option<String>,
    /// Zone label.
    #[serde(default)]
    pub zone: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub additional_info: Option<String>,
    /// Creation timestamp (`%Y-%m-%d %H:%M:%S`, fraction ignored).
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Which column identifies a point across re-imports.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointKey {
    /// The integer id column.
    #[default]
    Id,
    /// The code column. Ids are allocated by the catalog.
    Code,
}

/// Column names for a store or property export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointColumns {
    /// Key used to match rows with stored points.
    #[serde(default)]
    pub key: PointKey,
    /// Integer point id. Required when keyed by id.
    #[serde(default)]
    pub id: Option<String>,
    /// Store code or property label.
    #[serde(default)]
    pub code: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Latitude.
    pub latitude: String,
    /// Longitude.
    pub longitude: String,
}

/// Counters for one import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Data rows read after the header.
    pub rows_read: u64,
    /// Rows written to the catalog.
    pub imported: u64,
    /// Rows rejected (bad or missing key, bad timestamp).
    pub skipped: u64,
    /// Markets whose name had fewer than four segments.
    pub non_standard_names: u64,
    /// Imported records with no usable location (no centroid for markets,
    /// no coordinates for points).
    pub without_location: u64,
    /// Wall-clock time spent.
    pub duration: Duration,
}
