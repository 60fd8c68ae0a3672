//! WKT geometry loading.
//!
//! Boundaries arrive as WKT `POLYGON`/`MULTIPOLYGON` text and centroids as
//! `POINT (lon lat)` text, or as legacy `"lat, lon"` strings written by
//! older imports. WKT is longitude-first; everything outside this module
//! works with [`LatLng`], so the swap happens exactly once, here.

use geo::{Centroid, Geometry, MultiPolygon, Point, Validation, unary_union};
use thiserror::Error;
use wkt::TryFromWkt;

/// Errors returned when geometry text cannot be turned into a shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryParseError {
    /// The text was empty or whitespace.
    #[error("geometry text is empty")]
    Empty,

    /// The WKT parser rejected the text.
    #[error("invalid WKT: {message}")]
    Wkt {
        /// Parser message.
        message: String,
    },

    /// Parsed, but not the expected geometry type.
    #[error("expected {expected}, found {found}")]
    UnsupportedGeometry {
        /// Geometry type that was expected.
        expected: &'static str,
        /// Geometry type that was found.
        found: &'static str,
    },

    /// Polygonal, but with no part that encloses anything.
    #[error("boundary has no polygon parts")]
    NoPolygonParts,

    /// Coordinates were missing, non-numeric, or out of range.
    #[error("invalid coordinates: {text}")]
    InvalidCoordinates {
        /// The offending text.
        text: String,
    },
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    /// Latitude, -90 to 90.
    pub lat: f64,
    /// Longitude, -180 to 180.
    pub lng: f64,
}

impl LatLng {
    /// Creates a new pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` when both values are finite and within range.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Converts to a `geo` point (`x` = longitude, `y` = latitude).
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }

    /// Converts from a `geo` point (`x` = longitude, `y` = latitude).
    #[must_use]
    pub fn from_point(point: Point<f64>) -> Self {
        Self {
            lat: point.y(),
            lng: point.x(),
        }
    }

    /// Formats as WKT, longitude first.
    #[must_use]
    pub fn to_wkt(self) -> String {
        format!("POINT ({} {})", self.lng, self.lat)
    }
}

/// A boundary ready for containment tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// The (possibly repaired) shape.
    pub shape: MultiPolygon<f64>,
    /// `true` when the parsed shape was invalid and had to be rebuilt.
    pub repaired: bool,
}

/// Parses WKT polygon or multipolygon text.
///
/// Invalid shapes (self-intersecting rings, overlapping parts) are rebuilt
/// by unioning their polygons, the zero-width-buffer equivalent. The repair
/// is best-effort: area is not guaranteed to be preserved.
///
/// # Errors
///
/// Returns [`GeometryParseError`] if the text is empty, is not WKT, is
/// not polygonal, or has no polygon parts before or after repair.
pub fn parse_boundary(text: &str) -> Result<Boundary, GeometryParseError> {
    let trimmed = strip_srid(text.trim());
    if trimmed.is_empty() {
        return Err(GeometryParseError::Empty);
    }

    let geometry = parse_wkt(trimmed)?;
    let shape = match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        Geometry::MultiPolygon(multi) => multi,
        other => {
            return Err(GeometryParseError::UnsupportedGeometry {
                expected: "Polygon or MultiPolygon",
                found: geometry_kind(&other),
            });
        }
    };

    if shape.0.iter().all(|polygon| polygon.exterior().0.is_empty()) {
        return Err(GeometryParseError::NoPolygonParts);
    }

    if shape.is_valid() {
        return Ok(Boundary {
            shape,
            repaired: false,
        });
    }

    let repaired = unary_union(shape.0.iter());
    if repaired.0.is_empty() {
        return Err(GeometryParseError::NoPolygonParts);
    }
    if !repaired.is_valid() {
        log::debug!("Boundary is still invalid after repair; using it as-is");
    }

    Ok(Boundary {
        shape: repaired,
        repaired: true,
    })
}

/// Parses centroid text: `POINT (lon lat)` WKT, or legacy `"lat, lon"`.
///
/// The format is chosen by probing for the `POINT` keyword.
///
/// # Errors
///
/// Returns [`GeometryParseError`] if the text is empty, malformed, or the
/// coordinates are out of range.
pub fn parse_point(text: &str) -> Result<LatLng, GeometryParseError> {
    let trimmed = strip_srid(text.trim());
    if trimmed.is_empty() {
        return Err(GeometryParseError::Empty);
    }

    let lat_lng = if trimmed.to_ascii_uppercase().contains("POINT") {
        match parse_wkt(trimmed)? {
            Geometry::Point(point) => LatLng::from_point(point),
            other => {
                return Err(GeometryParseError::UnsupportedGeometry {
                    expected: "Point",
                    found: geometry_kind(&other),
                });
            }
        }
    } else {
        parse_legacy_lat_lng(trimmed)?
    };

    if !lat_lng.is_valid() {
        return Err(GeometryParseError::InvalidCoordinates {
            text: trimmed.to_string(),
        });
    }

    Ok(lat_lng)
}

/// Area-weighted centroid of a boundary.
#[must_use]
pub fn centroid_of(shape: &MultiPolygon<f64>) -> Option<LatLng> {
    shape.centroid().map(LatLng::from_point)
}

fn parse_legacy_lat_lng(text: &str) -> Result<LatLng, GeometryParseError> {
    let invalid = || GeometryParseError::InvalidCoordinates {
        text: text.to_string(),
    };

    let mut parts = text.split(',');
    let (Some(lat), Some(lng), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    let lat = lat.trim().parse::<f64>().map_err(|_| invalid())?;
    let lng = lng.trim().parse::<f64>().map_err(|_| invalid())?;

    Ok(LatLng::new(lat, lng))
}

fn parse_wkt(text: &str) -> Result<Geometry<f64>, GeometryParseError> {
    Geometry::try_from_wkt_str(text).map_err(|e| GeometryParseError::Wkt {
        message: e.to_string(),
    })
}

/// Drops an EWKT `SRID=4326;` prefix.
fn strip_srid(text: &str) -> &str {
    if text
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SRID="))
        && let Some((_, rest)) = text.split_once(';')
    {
        return rest.trim();
    }
    text
}

const fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use geo::Contains;

    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn point_wkt_is_longitude_first() {
        let p = parse_point("POINT (85.8204 20.3208)").unwrap();
        assert_close(p.lat, 20.3208);
        assert_close(p.lng, 85.8204);
    }

    #[test]
    fn parses_point_without_space() {
        let p = parse_point("POINT(77.5946 12.9716)").unwrap();
        assert_close(p.lat, 12.9716);
        assert_close(p.lng, 77.5946);
    }

    #[test]
    fn parses_point_with_srid_prefix() {
        let p = parse_point("SRID=4326;POINT (78.4867 17.385)").unwrap();
        assert_close(p.lat, 17.385);
        assert_close(p.lng, 78.4867);
    }

    #[test]
    fn parses_legacy_lat_lon_text() {
        let p = parse_point("20.3208, 85.8204").unwrap();
        assert_close(p.lat, 20.3208);
        assert_close(p.lng, 85.8204);
    }

    #[test]
    fn rejects_malformed_points() {
        assert_eq!(parse_point("  "), Err(GeometryParseError::Empty));
        assert!(matches!(
            parse_point("20.3208"),
            Err(GeometryParseError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            parse_point("1, 2, 3"),
            Err(GeometryParseError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            parse_point("north, east"),
            Err(GeometryParseError::InvalidCoordinates { .. })
        ));
        assert!(matches!(
            parse_point("POINT (85.8"),
            Err(GeometryParseError::Wkt { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_points() {
        assert!(matches!(
            parse_point("95.0, 10.0"),
            Err(GeometryParseError::InvalidCoordinates { .. })
        ));
        // Swapped WKT order puts latitude out of range.
        assert!(matches!(
            parse_point("POINT (20.0 120.0)"),
            Err(GeometryParseError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn parses_valid_polygon_without_repair() {
        let b = parse_boundary("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))").unwrap();
        assert!(!b.repaired);
        assert_eq!(b.shape.0.len(), 1);
        assert!(b.shape.contains(&Point::new(2.0, 2.0)));
    }

    #[test]
    fn parses_multipolygon() {
        let b = parse_boundary(
            "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 1, 0 0)), ((5 5, 6 5, 6 6, 5 6, 5 5)))",
        )
        .unwrap();
        assert_eq!(b.shape.0.len(), 2);
        assert!(b.shape.contains(&Point::new(5.5, 5.5)));
    }

    #[test]
    fn repairs_self_intersecting_polygon() {
        // Bow-tie: the ring crosses itself at (1, 1).
        let b = parse_boundary("POLYGON ((0 0, 2 2, 2 0, 0 2, 0 0))").unwrap();
        assert!(b.repaired);
        assert!(b.shape.is_valid());
        assert!(b.shape.contains(&Point::new(0.3, 1.0)));
        assert!(!b.shape.contains(&Point::new(1.0, 1.9)));
    }

    #[test]
    fn rejects_non_polygon_boundary() {
        assert_eq!(
            parse_boundary("POINT (1 2)"),
            Err(GeometryParseError::UnsupportedGeometry {
                expected: "Polygon or MultiPolygon",
                found: "Point",
            })
        );
    }

    #[test]
    fn rejects_malformed_boundary() {
        assert!(matches!(
            parse_boundary("POLYGON ((0 0, 1 0, 1 1"),
            Err(GeometryParseError::Wkt { .. })
        ));
        assert_eq!(parse_boundary(""), Err(GeometryParseError::Empty));
    }

    #[test]
    fn rejects_boundaries_without_parts() {
        assert_eq!(
            parse_boundary("POLYGON EMPTY"),
            Err(GeometryParseError::NoPolygonParts)
        );
        assert_eq!(
            parse_boundary("MULTIPOLYGON EMPTY"),
            Err(GeometryParseError::NoPolygonParts)
        );
        // Zero-area ring: repair leaves nothing behind.
        assert_eq!(
            parse_boundary("POLYGON ((0 0, 1 1, 0 0))"),
            Err(GeometryParseError::NoPolygonParts)
        );
    }

    #[test]
    fn centroid_round_trips_through_wkt() {
        let b = parse_boundary("POLYGON ((80 20, 82 20, 82 22, 80 22, 80 20))").unwrap();
        let c = centroid_of(&b.shape).unwrap();
        assert_close(c.lat, 21.0);
        assert_close(c.lng, 81.0);
        assert!(c.to_wkt().starts_with("POINT (81"));
        assert_eq!(parse_point(&c.to_wkt()).unwrap(), c);
    }
}
