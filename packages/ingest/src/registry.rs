//! Compile-time registry of import layouts.
//!
//! Each entry is a `(name, toml_content)` pair embedded via `include_str!`.
//! Supporting a new export format means adding a TOML file in `layouts/`
//! and a corresponding entry here.

use catchment_map_ingest_models::{ImportLayout, LayoutTarget};
use catchment_map_market_models::PointKind;

use crate::IngestError;

/// Number of registered layouts. Enforced by a test.
#[cfg(test)]
const EXPECTED_LAYOUT_COUNT: usize = 3;

/// Embedded TOML layout definitions.
const LAYOUT_TOMLS: &[(&str, &str)] = &[
    ("catchments", include_str!("../layouts/catchments.toml")),
    ("stores", include_str!("../layouts/stores.toml")),
    (
        "approved_properties",
        include_str!("../layouts/approved_properties.toml"),
    ),
];

/// Returns all registered import layouts.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_layouts() -> Vec<ImportLayout> {
    LAYOUT_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse import layout '{name}': {e}"))
        })
        .collect()
}

/// Looks up a layout by id.
///
/// # Errors
///
/// Returns [`IngestError::UnknownLayout`] if no layout has this id.
pub fn layout(id: &str) -> Result<ImportLayout, IngestError> {
    all_layouts()
        .into_iter()
        .find(|l| l.id == id)
        .ok_or_else(|| IngestError::UnknownLayout { id: id.to_string() })
}

/// The catchment export layout.
///
/// # Errors
///
/// Returns [`IngestError::UnknownLayout`] if the layout is not registered.
pub fn market_layout() -> Result<ImportLayout, IngestError> {
    layout("catchments")
}

/// The default layout for a point kind.
///
/// # Errors
///
/// Returns [`IngestError::UnknownLayout`] if no layout targets this kind.
pub fn point_layout(kind: PointKind) -> Result<ImportLayout, IngestError> {
    all_layouts()
        .into_iter()
        .find(|l| matches!(l.target, LayoutTarget::Points { point_kind, .. } if point_kind == kind))
        .ok_or_else(|| IngestError::UnknownLayout {
            id: kind.table().to_string(),
        })
}
