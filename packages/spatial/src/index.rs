//! Boundary index and containment matching.
//!
//! Built once per run from every market with boundary text. Lookups return
//! the first boundary, in build order, that contains the point. Overlapping
//! boundaries are not reported; the earlier market simply wins.
//!
//! Two backends share these semantics: a linear scan over all entries, and
//! an R-tree that narrows the scan to boundaries whose bounding box holds
//! the point before applying the same first-in-build-order rule.

use catchment_map_market_models::{Exclusion, ExclusionReason, Market};
use geo::{BoundingRect, Contains, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::geometry::{LatLng, parse_boundary};
use crate::{Built, MarketMatch, MarketMatcher, SpatialError, Strategy};

/// How candidate boundaries are found for a point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum IndexBackend {
    /// Test every boundary in build order.
    #[default]
    Linear,
    /// Filter by bounding box first, then test in build order.
    Rtree,
}

/// One market boundary in the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Market identifier.
    pub market_id: i64,
    /// Market display name.
    pub name: String,
    /// Validated (possibly repaired) boundary.
    pub shape: MultiPolygon<f64>,
}

/// Bounding box of an entry, pointing back at its build position.
struct EnvelopeRef {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EnvelopeRef {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Market boundaries in build order.
pub struct SpatialIndex {
    entries: Vec<IndexEntry>,
    tree: Option<RTree<EnvelopeRef>>,
}

impl SpatialIndex {
    /// Builds the index from every market holding non-blank boundary text.
    ///
    /// Markets whose text fails to parse are logged and returned as
    /// exclusions. Markets without boundary text are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::EmptySpatialIndex`] if no market yields a
    /// boundary.
    pub fn build(markets: &[Market], backend: IndexBackend) -> Result<Built<Self>, SpatialError> {
        let mut entries = Vec::new();
        let mut excluded = Vec::new();
        let mut repaired = 0usize;

        for market in markets {
            let Some(text) = market.boundary_text() else {
                continue;
            };

            match parse_boundary(text) {
                Ok(boundary) => {
                    if boundary.repaired {
                        log::debug!(
                            "Repaired invalid boundary for market {} ({})",
                            market.market_id,
                            market.name
                        );
                        repaired += 1;
                    }
                    entries.push(IndexEntry {
                        market_id: market.market_id,
                        name: market.name.clone(),
                        shape: boundary.shape,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "Skipping market {} ({}): invalid boundary: {e}",
                        market.market_id,
                        market.name
                    );
                    excluded.push(Exclusion::with_detail(
                        market.market_id,
                        ExclusionReason::InvalidGeometry,
                        e.to_string(),
                    ));
                }
            }
        }

        if entries.is_empty() {
            return Err(SpatialError::EmptySpatialIndex {
                excluded: excluded.len(),
            });
        }

        log::info!(
            "Loaded {} market boundaries into spatial index ({backend} backend, {repaired} repaired, {} excluded)",
            entries.len(),
            excluded.len()
        );

        Ok(Built {
            matcher: Self::from_entries(entries, backend),
            excluded,
        })
    }

    /// Creates an index over already-validated entries, kept in the given
    /// order.
    #[must_use]
    pub fn from_entries(entries: Vec<IndexEntry>, backend: IndexBackend) -> Self {
        let tree = match backend {
            IndexBackend::Linear => None,
            IndexBackend::Rtree => Some(RTree::bulk_load(
                entries
                    .iter()
                    .enumerate()
                    .filter_map(|(ordinal, entry)| {
                        compute_envelope(&entry.shape).map(|envelope| EnvelopeRef {
                            ordinal,
                            envelope,
                        })
                    })
                    .collect(),
            )),
        };

        Self { entries, tree }
    }

    /// Number of indexed boundaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in build order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Returns the earliest-built boundary containing the point.
    ///
    /// Points exactly on a boundary edge are not contained.
    #[must_use]
    pub fn locate(&self, at: LatLng) -> Option<&IndexEntry> {
        let point = at.to_point();

        match &self.tree {
            None => self.entries.iter().find(|e| e.shape.contains(&point)),
            Some(tree) => {
                let query_env = AABB::from_point([at.lng, at.lat]);
                tree.locate_in_envelope_intersecting(&query_env)
                    .map(|r| r.ordinal)
                    .filter(|&i| self.entries[i].shape.contains(&point))
                    .min()
                    .map(|i| &self.entries[i])
            }
        }
    }
}

impl MarketMatcher for SpatialIndex {
    fn strategy(&self) -> Strategy {
        Strategy::Containment
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn match_point(&self, at: LatLng) -> Option<MarketMatch> {
        self.locate(at).map(|entry| MarketMatch {
            market_id: entry.market_id,
            distance_km: None,
        })
    }
}

/// Bounding box of a shape, or `None` for an empty shape.
fn compute_envelope(shape: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    shape
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use catchment_map_market_models::MarketDetails;

    use super::*;

    fn market(id: i64, wkt: Option<&str>) -> Market {
        Market {
            market_id: id,
            name: format!("Circle_Hub(1/2)_City(1/2)_Market {id}"),
            source_city: None,
            zone: None,
            additional_info: None,
            boundary_wkt: wkt.map(ToString::to_string),
            centroid: None,
            details: MarketDetails::default(),
            name_standard: true,
            has_store: false,
            created_at: None,
        }
    }

    /// Square from (x, y) with side `s`, in WKT lon/lat order.
    fn square(x: f64, y: f64, s: f64) -> String {
        format!(
            "POLYGON (({x} {y}, {x2} {y}, {x2} {y2}, {x} {y2}, {x} {y}))",
            x2 = x + s,
            y2 = y + s
        )
    }

    fn both_backends() -> [IndexBackend; 2] {
        [IndexBackend::Linear, IndexBackend::Rtree]
    }

    #[test]
    fn locates_containing_market() {
        let markets = vec![
            market(1, Some(&square(80.0, 20.0, 1.0))),
            market(2, Some(&square(85.0, 20.0, 1.0))),
        ];
        for backend in both_backends() {
            let built = SpatialIndex::build(&markets, backend).unwrap();
            let found = built.matcher.locate(LatLng::new(20.5, 85.5)).unwrap();
            assert_eq!(found.market_id, 2, "{backend}");
        }
    }

    #[test]
    fn overlapping_boundaries_resolve_to_first_built() {
        let markets = vec![
            market(7, Some(&square(80.0, 20.0, 2.0))),
            market(3, Some(&square(81.0, 21.0, 2.0))),
        ];
        for backend in both_backends() {
            let index = SpatialIndex::build(&markets, backend).unwrap().matcher;
            for _ in 0..5 {
                let found = index.locate(LatLng::new(21.5, 81.5)).unwrap();
                assert_eq!(found.market_id, 7, "{backend}");
            }
        }

        let reversed = vec![markets[1].clone(), markets[0].clone()];
        for backend in both_backends() {
            let index = SpatialIndex::build(&reversed, backend).unwrap().matcher;
            let found = index.locate(LatLng::new(21.5, 81.5)).unwrap();
            assert_eq!(found.market_id, 3, "{backend}");
        }
    }

    #[test]
    fn point_outside_every_boundary_has_no_match() {
        let markets = vec![market(1, Some(&square(80.0, 20.0, 1.0)))];
        for backend in both_backends() {
            let index = SpatialIndex::build(&markets, backend).unwrap().matcher;
            assert!(index.locate(LatLng::new(10.0, 10.0)).is_none());
            assert!(index.match_point(LatLng::new(10.0, 10.0)).is_none());
        }
    }

    #[test]
    fn boundary_edge_is_not_contained() {
        let markets = vec![market(1, Some(&square(80.0, 20.0, 1.0)))];
        let index = SpatialIndex::build(&markets, IndexBackend::Linear)
            .unwrap()
            .matcher;
        assert!(index.locate(LatLng::new(20.0, 80.5)).is_none());
    }

    #[test]
    fn lat_lng_is_swapped_into_polygon_order() {
        // Tall thin box: lon 85..86, lat 10..30. (20.5, 85.5) is inside, but
        // the swapped reading (85.5, 20.5) is not.
        let markets = vec![market(
            1,
            Some("POLYGON ((85 10, 86 10, 86 30, 85 30, 85 10))"),
        )];
        let index = SpatialIndex::build(&markets, IndexBackend::Linear)
            .unwrap()
            .matcher;
        assert!(index.locate(LatLng::new(20.5, 85.5)).is_some());
    }

    #[test]
    fn invalid_text_is_excluded_not_fatal() {
        let markets = vec![
            market(1, Some("POLYGON ((broken")),
            market(2, None),
            market(3, Some("  ")),
            market(4, Some(&square(80.0, 20.0, 1.0))),
        ];
        let built = SpatialIndex::build(&markets, IndexBackend::Linear).unwrap();
        assert_eq!(built.matcher.len(), 1);
        assert_eq!(built.excluded.len(), 1);
        assert_eq!(built.excluded[0].id, 1);
        assert_eq!(built.excluded[0].reason, ExclusionReason::InvalidGeometry);
        assert!(built.excluded[0].detail.is_some());
    }

    #[test]
    fn empty_index_is_an_error() {
        let markets = vec![market(1, Some("not wkt")), market(2, None)];
        let err = SpatialIndex::build(&markets, IndexBackend::Linear).err();
        assert_eq!(err, Some(SpatialError::EmptySpatialIndex { excluded: 1 }));
    }

    #[test]
    fn boundaries_without_parts_are_excluded() {
        let markets = vec![
            market(1, Some("POLYGON EMPTY")),
            market(2, Some("MULTIPOLYGON EMPTY")),
            market(3, Some("POLYGON ((0 0, 1 1, 0 0))")),
        ];
        for backend in both_backends() {
            let err = SpatialIndex::build(&markets, backend).err();
            assert_eq!(err, Some(SpatialError::EmptySpatialIndex { excluded: 3 }));
        }

        let mut with_real = markets;
        with_real.push(market(4, Some(&square(10.0, 10.0, 1.0))));
        let built = SpatialIndex::build(&with_real, IndexBackend::Rtree).unwrap();
        assert_eq!(built.matcher.len(), 1);
        let ids: Vec<i64> = built.excluded.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(
            built
                .excluded
                .iter()
                .all(|e| e.reason == ExclusionReason::InvalidGeometry)
        );
    }

    #[test]
    fn repaired_boundary_participates_in_matching() {
        let markets = vec![market(9, Some("POLYGON ((0 0, 2 2, 2 0, 0 2, 0 0))"))];
        for backend in both_backends() {
            let index = SpatialIndex::build(&markets, backend).unwrap().matcher;
            let found = index.locate(LatLng::new(1.0, 0.3)).unwrap();
            assert_eq!(found.market_id, 9);
        }
    }

    #[test]
    fn backend_parses_from_kebab_case() {
        assert_eq!("rtree".parse::<IndexBackend>().unwrap(), IndexBackend::Rtree);
        assert_eq!(IndexBackend::Linear.to_string(), "linear");
    }
}
