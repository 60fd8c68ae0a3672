//! Nearest-centroid matching.
//!
//! Used when boundaries are unavailable. Every point is compared against
//! every market centroid by great-circle distance and assigned to the
//! closest one. Exact ties go to the centroid loaded first.

use catchment_map_market_models::{Exclusion, ExclusionReason, Market};
use geo::{Distance, Haversine};

use crate::geometry::{LatLng, parse_point};
use crate::{Built, MarketMatch, MarketMatcher, SpatialError, Strategy};

/// One market centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidEntry {
    /// Market identifier.
    pub market_id: i64,
    /// Market display name.
    pub name: String,
    /// Centroid position.
    pub centroid: LatLng,
}

/// Market centroids in load order.
#[derive(Debug, Clone, Default)]
pub struct CentroidSet {
    entries: Vec<CentroidEntry>,
}

impl CentroidSet {
    /// Loads centroids from every market holding non-blank centroid text.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptyCentroidSet`] if no market has a usable
    /// centroid.
    pub fn build(markets: &[Market]) -> Result<Built<Self>, SpatialError> {
        let mut entries = Vec::new();
        let mut excluded = Vec::new();

        for market in markets {
            let Some(text) = market.centroid_text() else {
                continue;
            };

            match parse_point(text) {
                Ok(centroid) => entries.push(CentroidEntry {
                    market_id: market.market_id,
                    name: market.name.clone(),
                    centroid,
                }),
                Err(e) => {
                    log::warn!(
                        "Skipping market {} ({}): unparseable centroid {text:?}: {e}",
                        market.market_id,
                        market.name
                    );
                    excluded.push(Exclusion::with_detail(
                        market.market_id,
                        ExclusionReason::UnparseableCentroid,
                        e.to_string(),
                    ));
                }
            }
        }

        if entries.is_empty() {
            return Err(SpatialError::EmptyCentroidSet {
                excluded: excluded.len(),
            });
        }

        log::info!(
            "Loaded {} market centroids ({} excluded)",
            entries.len(),
            excluded.len()
        );

        Ok(Built {
            matcher: Self { entries },
            excluded,
        })
    }

    /// Creates a set from already-parsed entries, kept in the given order.
    #[must_use]
    pub const fn from_entries(entries: Vec<CentroidEntry>) -> Self {
        Self { entries }
    }

    /// Entries in load order.
    #[must_use]
    pub fn entries(&self) -> &[CentroidEntry] {
        &self.entries
    }

    /// Returns the closest centroid and its distance in kilometres.
    ///
    /// The running minimum only moves on a strictly smaller distance, so
    /// the first-loaded centroid wins an exact tie.
    #[must_use]
    pub fn nearest(&self, at: LatLng) -> Option<(&CentroidEntry, f64)> {
        let mut best: Option<(&CentroidEntry, f64)> = None;

        for entry in &self.entries {
            let distance = haversine_km(at, entry.centroid);
            match best {
                Some((_, current)) if distance >= current => {}
                _ => best = Some((entry, distance)),
            }
        }

        best
    }
}

impl MarketMatcher for CentroidSet {
    fn strategy(&self) -> Strategy {
        Strategy::NearestCentroid
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn match_point(&self, at: LatLng) -> Option<MarketMatch> {
        self.nearest(at).map(|(entry, distance)| MarketMatch {
            market_id: entry.market_id,
            distance_km: Some(distance),
        })
    }
}

/// Great-circle distance in kilometres on a mean-radius sphere.
#[must_use]
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    Haversine.distance(a.to_point(), b.to_point()) / 1000.0
}
