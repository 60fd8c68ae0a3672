#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Market (catchment) and locatable point types.
//!
//! A market is a named trade area with an optional boundary polygon and an
//! optional centroid. Stores and approved properties are locatable points
//! that get assigned to at most one market. These types are shared by the
//! parser, the spatial matchers, the assignment writer, and the catalog
//! database.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Fields derived from an encoded market name such as
/// `Telangana_Hyderabad(55/290)_Kukatpally(3/12)_Market 1`.
///
/// Every field is optional: a non-standard name leaves all of them unset,
/// and a segment without a `(rank/total)` pair leaves that pair unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDetails {
    /// Circle (top-level region).
    pub circle: Option<String>,
    /// Hub name, without its rank suffix.
    pub hub_name: Option<String>,
    /// City name, without its rank suffix.
    pub city: Option<String>,
    /// Market level name (last segment).
    pub level_name: Option<String>,
    /// Rank of the hub within its circle.
    pub hub_rank: Option<u32>,
    /// Number of hubs in the circle.
    pub hub_total: Option<u32>,
    /// Rank of the city within its hub.
    pub city_rank: Option<u32>,
    /// Number of cities in the hub.
    pub city_total: Option<u32>,
}

impl MarketDetails {
    /// Returns `true` when no field has been derived.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.circle.is_none()
            && self.hub_name.is_none()
            && self.city.is_none()
            && self.level_name.is_none()
            && self.hub_rank.is_none()
            && self.hub_total.is_none()
            && self.city_rank.is_none()
            && self.city_total.is_none()
    }
}

/// A market (catchment) record as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// Unique market identifier.
    pub market_id: i64,
    /// Encoded market name (`Circle_Hub(r/t)_City(r/t)_Level`).
    pub name: String,
    /// Raw city column from the source export.
    pub source_city: Option<String>,
    /// Zone label from the source export.
    pub zone: Option<String>,
    /// Free-form additional info from the source export.
    pub additional_info: Option<String>,
    /// Boundary polygon as WKT text.
    pub boundary_wkt: Option<String>,
    /// Centroid as `POINT (lon lat)` WKT, or legacy `lat, lon` text.
    pub centroid: Option<String>,
    /// Fields derived from [`Self::name`].
    pub details: MarketDetails,
    /// `false` when the encoded name has fewer than four segments.
    pub name_standard: bool,
    /// Whether at least one store is assigned to this market.
    pub has_store: bool,
    /// Creation timestamp from the source export.
    pub created_at: Option<NaiveDateTime>,
}

impl Market {
    /// Returns the boundary text if it is present and non-blank.
    #[must_use]
    pub fn boundary_text(&self) -> Option<&str> {
        self.boundary_wkt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the centroid text if it is present and non-blank.
    #[must_use]
    pub fn centroid_text(&self) -> Option<&str> {
        self.centroid
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// The kind of locatable point being assigned.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum PointKind {
    /// An operating retail store.
    #[default]
    Store,
    /// A property approved for a future store.
    ApprovedProperty,
}

impl PointKind {
    /// All point kinds, in assignment order.
    pub const ALL: &[Self] = &[Self::Store, Self::ApprovedProperty];

    /// Catalog table holding points of this kind.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Store => "stores",
            Self::ApprovedProperty => "approved_properties",
        }
    }
}

/// A store or approved property with optional coordinates and an optional
/// market assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatablePoint {
    /// Point identifier, unique within its kind.
    pub id: i64,
    /// Kind of point.
    pub kind: PointKind,
    /// Store code or property label.
    pub code: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Currently assigned market, if any.
    pub market_id: Option<i64>,
}

impl LocatablePoint {
    /// Returns `(latitude, longitude)` when both are present.
    #[must_use]
    pub const fn lat_lng(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Why a market or point was left out of a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    /// Market boundary WKT failed to parse.
    InvalidGeometry,
    /// Market centroid text failed to parse.
    UnparseableCentroid,
    /// Point is missing latitude or longitude.
    MissingCoordinates,
    /// Point fell inside no boundary.
    NoMatch,
}

impl ExclusionReason {
    /// Returns `true` for reasons that refer to a market rather than a point.
    #[must_use]
    pub const fn is_market(self) -> bool {
        matches!(self, Self::InvalidGeometry | Self::UnparseableCentroid)
    }
}

/// A single excluded record with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exclusion {
    /// Market identifier or point identifier, depending on the reason.
    pub id: i64,
    /// Why the record was excluded.
    pub reason: ExclusionReason,
    /// Parser message or other context.
    pub detail: Option<String>,
}

impl Exclusion {
    /// Creates an exclusion without detail text.
    #[must_use]
    pub const fn new(id: i64, reason: ExclusionReason) -> Self {
        Self {
            id,
            reason,
            detail: None,
        }
    }

    /// Creates an exclusion carrying a diagnostic message.
    #[must_use]
    pub fn with_detail(id: i64, reason: ExclusionReason, detail: impl Into<String>) -> Self {
        Self {
            id,
            reason,
            detail: Some(detail.into()),
        }
    }
}

/// Counters and exclusions reported at the end of every assignment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Points examined.
    pub considered: u64,
    /// Points whose assignment changed.
    pub updated: u64,
    /// Points with a match equal to their stored assignment.
    pub unchanged: u64,
    /// Points skipped for missing coordinates or no match.
    pub skipped: u64,
    /// Per-record exclusions, markets first, then points in input order.
    pub exclusions: Vec<Exclusion>,
}

impl RunSummary {
    /// Identifiers excluded for `reason`, in recorded order.
    #[must_use]
    pub fn ids_for(&self, reason: ExclusionReason) -> Vec<i64> {
        self.exclusions
            .iter()
            .filter(|e| e.reason == reason)
            .map(|e| e.id)
            .collect()
    }
}
