#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial catchment matching.
//!
//! Loads market boundaries and centroids from WKT, then answers "which
//! market does this point belong to" either by polygon containment
//! ([`SpatialIndex`]) or by nearest centroid ([`CentroidSet`]). Both sit
//! behind [`MarketMatcher`] so the assignment writer does not care which
//! strategy produced a match.

pub mod centroid;
pub mod geometry;
pub mod index;

use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use catchment_map_market_models::Exclusion;
pub use centroid::{CentroidEntry, CentroidSet, haversine_km};
pub use geometry::{Boundary, GeometryParseError, LatLng, centroid_of, parse_boundary, parse_point};
pub use index::{IndexBackend, IndexEntry, SpatialIndex};

/// Errors that end a matching run before any point is examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpatialError {
    /// No market has a usable boundary.
    #[error("no market has a usable boundary ({excluded} excluded for invalid geometry)")]
    EmptySpatialIndex {
        /// Markets excluded for invalid geometry.
        excluded: usize,
    },

    /// No market has a usable centroid.
    #[error("no market has a usable centroid ({excluded} excluded as unparseable)")]
    EmptyCentroidSet {
        /// Markets excluded for unparseable centroids.
        excluded: usize,
    },
}

/// Matching strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Strategy {
    /// First boundary (in build order) containing the point.
    #[default]
    Containment,
    /// Closest centroid by great-circle distance.
    NearestCentroid,
}

/// A market chosen for a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketMatch {
    /// Matched market.
    pub market_id: i64,
    /// Distance to the market centroid, for centroid matches.
    pub distance_km: Option<f64>,
}

/// A built matcher together with the markets that could not be loaded.
#[derive(Debug)]
pub struct Built<T> {
    /// The ready-to-use matcher.
    pub matcher: T,
    /// Markets left out, in input order.
    pub excluded: Vec<Exclusion>,
}

/// Assigns a point to at most one market.
pub trait MarketMatcher {
    /// Strategy implemented by this matcher.
    fn strategy(&self) -> Strategy;

    /// Number of candidate markets.
    fn len(&self) -> usize;

    /// Returns `true` when there are no candidates.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the market for a point, or `None` when nothing matches.
    fn match_point(&self, at: LatLng) -> Option<MarketMatch>;
}
