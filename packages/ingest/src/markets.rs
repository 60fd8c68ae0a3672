//! Catchment import, market name re-parse, and centroid derivation.
//!
//! All three paths derive name fields through
//! [`catchment_map_market::parse_market_name`] and centroids through
//! [`derive_centroid`], so an imported market and a re-processed one always
//! agree.

use std::io::Read;
use std::time::Instant;

use catchment_map_assign::progress::ProgressCallback;
use catchment_map_database::catalog_db::{self, MarketDetailsUpdate};
use catchment_map_ingest_models::{ImportLayout, ImportReport, LayoutTarget};
use catchment_map_market::{parse_market_name, reparse_if_changed};
use catchment_map_market_models::Market;
use catchment_map_spatial::{LatLng, centroid_of, parse_boundary, parse_point};
use chrono::NaiveDateTime;
use duckdb::Connection;

use crate::IngestError;
use crate::reader::{cell, clean_id, read_table};

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Imports a catchment export and upserts every good row in one
/// transaction.
///
/// Rows with an unparseable market id or timestamp are skipped and
/// counted. Names with fewer than four segments are imported with empty
/// derived fields. Boundaries that fail to parse are imported without a
/// centroid.
///
/// # Errors
///
/// Returns [`IngestError`] if the layout is not a market layout, a
/// required column is missing, the file cannot be read, or the write
/// fails.
pub fn import_markets<R: Read>(
    conn: &Connection,
    reader: R,
    layout: &ImportLayout,
    progress: &dyn ProgressCallback,
) -> Result<ImportReport, IngestError> {
    let start = Instant::now();

    let LayoutTarget::Markets { columns } = &layout.target else {
        return Err(IngestError::WrongTarget {
            layout: layout.id.clone(),
            expected: "markets",
        });
    };

    let table = read_table(reader, layout.encoding, layout.skip_rows)?;
    let id_col = Some(table.require(&layout.id, &columns.market_id)?);
    let name_col = Some(table.require(&layout.id, &columns.name)?);
    let boundary_col = Some(table.require(&layout.id, &columns.boundary)?);
    let city_col = table.optional(&layout.id, columns.city.as_deref());
    let zone_col = table.optional(&layout.id, columns.zone.as_deref());
    let info_col = table.optional(&layout.id, columns.additional_info.as_deref());
    let created_col = table.optional(&layout.id, columns.created_at.as_deref());

    let mut report = ImportReport::default();
    let mut markets = Vec::with_capacity(table.rows().len());

    progress.set_total(table.rows().len() as u64);
    progress.set_message(format!("Reading {}", layout.name));

    for row in table.rows() {
        report.rows_read += 1;
        progress.inc(1);

        let Some(market_id) = cell(row, id_col).and_then(clean_id) else {
            log::warn!(
                "Skipping row {}: invalid market id {:?}",
                report.rows_read,
                cell(row, id_col)
            );
            report.skipped += 1;
            continue;
        };

        let created_at = match parse_created_at(cell(row, created_col)) {
            Ok(dt) => dt,
            Err(e) => {
                log::warn!("Skipping market {market_id}: invalid Created_At: {e}");
                report.skipped += 1;
                continue;
            }
        };

        let name = cell(row, name_col).unwrap_or_default().to_string();
        let parsed = parse_market_name(&name);
        if !parsed.is_standard() {
            report.non_standard_names += 1;
        }

        let boundary_wkt = cell(row, boundary_col).map(ToString::to_string);
        let centroid = boundary_wkt.as_deref().and_then(|wkt| derive_centroid(market_id, wkt));
        if centroid.is_none() {
            report.without_location += 1;
        }

        markets.push(Market {
            market_id,
            name,
            source_city: cell(row, city_col).map(ToString::to_string),
            zone: cell(row, zone_col).map(ToString::to_string),
            additional_info: cell(row, info_col).map(ToString::to_string),
            boundary_wkt,
            centroid,
            name_standard: parsed.is_standard(),
            details: parsed.details,
            has_store: false,
            created_at,
        });
    }

    report.imported = catalog_db::upsert_markets(conn, &markets)?;
    report.duration = start.elapsed();

    progress.finish(format!(
        "Imported {} market(s), skipped {}",
        report.imported, report.skipped
    ));
    log::info!(
        "Imported {} market(s) from {} row(s) in {:.1}s ({} skipped, {} non-standard, {} without centroid)",
        report.imported,
        report.rows_read,
        report.duration.as_secs_f64(),
        report.skipped,
        report.non_standard_names,
        report.without_location
    );

    Ok(report)
}

/// Parses a `Created_At` cell, dropping any fractional seconds.
///
/// A blank cell is `Ok(None)`.
///
/// # Errors
///
/// Returns the chrono parse error for malformed text.
pub fn parse_created_at(raw: Option<&str>) -> Result<Option<NaiveDateTime>, chrono::ParseError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let whole_seconds = raw.split('.').next().unwrap_or(raw).trim();
    NaiveDateTime::parse_from_str(whole_seconds, CREATED_AT_FORMAT).map(Some)
}

/// Centroid of a boundary as `POINT (lon lat)`, or `None` if the boundary
/// does not parse.
#[must_use]
pub fn derive_centroid(market_id: i64, boundary_wkt: &str) -> Option<String> {
    match parse_boundary(boundary_wkt) {
        Ok(boundary) => centroid_of(&boundary.shape).map(LatLng::to_wkt),
        Err(e) => {
            log::warn!("Market {market_id}: cannot derive centroid: {e}");
            None
        }
    }
}

/// Counters for a re-parse pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReparseReport {
    /// Markets examined.
    pub examined: u64,
    /// Markets whose derived fields changed and were written.
    pub updated: u64,
    /// Markets whose name has fewer than four segments.
    pub non_standard: u64,
}

/// Re-parses every stored market name and writes back only the markets
/// whose derived fields changed, in one batch.
///
/// # Errors
///
/// Returns [`IngestError`] if the markets cannot be read or written.
pub fn reparse_markets(
    conn: &Connection,
    progress: &dyn ProgressCallback,
) -> Result<ReparseReport, IngestError> {
    let start = Instant::now();
    let markets = catalog_db::load_markets(conn)?;

    let mut report = ReparseReport::default();
    let mut updates = Vec::new();

    progress.set_total(markets.len() as u64);
    for market in &markets {
        report.examined += 1;
        progress.inc(1);

        let parsed = reparse_if_changed(market);
        let standard = parsed.as_ref().map_or(market.name_standard, |p| p.is_standard());
        if !standard {
            report.non_standard += 1;
        }

        if let Some(parsed) = parsed {
            updates.push(MarketDetailsUpdate {
                market_id: market.market_id,
                name_standard: parsed.is_standard(),
                details: parsed.details,
            });
        }
    }

    report.updated = catalog_db::update_market_details(conn, &updates)?;

    progress.finish(format!("Re-parsed {} market name(s)", report.examined));
    log::info!(
        "Re-parsed {} market(s) in {:.1}s: {} updated, {} non-standard",
        report.examined,
        start.elapsed().as_secs_f64(),
        report.updated,
        report.non_standard
    );

    Ok(report)
}

/// Counters for a centroid pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CentroidReport {
    /// Markets with boundary text.
    pub with_boundary: u64,
    /// Centroids written.
    pub updated: u64,
    /// Markets that already had a centroid and were left alone.
    pub kept: u64,
    /// Markets whose boundary did not parse.
    pub failed: u64,
}

/// Derives centroids from boundaries and stores them as `POINT (lon lat)`.
///
/// Without `force`, markets that already have a parseable centroid are
/// left alone. With `force`, every centroid is recomputed, which also
/// rewrites legacy `lat, lon` text in WKT form.
///
/// # Errors
///
/// Returns [`IngestError`] if the markets cannot be read or written.
pub fn compute_centroids(
    conn: &Connection,
    force: bool,
    progress: &dyn ProgressCallback,
) -> Result<CentroidReport, IngestError> {
    let start = Instant::now();
    let markets = catalog_db::load_markets(conn)?;

    let mut report = CentroidReport::default();
    let mut updates = Vec::new();

    progress.set_total(markets.len() as u64);
    for market in &markets {
        progress.inc(1);

        let Some(boundary) = market.boundary_text() else {
            continue;
        };
        report.with_boundary += 1;

        let existing = market.centroid_text();
        if !force && existing.is_some_and(|text| parse_point(text).is_ok()) {
            report.kept += 1;
            continue;
        }

        match derive_centroid(market.market_id, boundary) {
            Some(centroid) if existing == Some(centroid.as_str()) => report.kept += 1,
            Some(centroid) => updates.push((market.market_id, centroid)),
            None => report.failed += 1,
        }
    }

    report.updated = catalog_db::update_centroids(conn, &updates)?;

    progress.finish(format!("Computed {} centroid(s)", report.updated));
    log::info!(
        "Centroids computed in {:.1}s: {} updated, {} kept, {} failed",
        start.elapsed().as_secs_f64(),
        report.updated,
        report.kept,
        report.failed
    );

    Ok(report)
}
