//! Approved-property payload import.
//!
//! The partner API returns `{"data": [...]}` with loosely typed fields:
//! ids and coordinates arrive as numbers or as strings depending on the
//! record. Fetching the payload is out of scope; this reads a saved copy.

use std::io::Read;
use std::time::Instant;

use catchment_map_assign::progress::ProgressCallback;
use catchment_map_database::catalog_db::{self, ReportedMarket};
use catchment_map_ingest_models::ImportReport;
use catchment_map_market::{
    MIN_SEGMENTS, NameContext, parse_market_name_in, strip_circle_prefixes,
};
use catchment_map_market_models::{LocatablePoint, PointKind};
use duckdb::Connection;
use serde::Deserialize;
use serde_json::Value;

use crate::IngestError;
use crate::reader::{clean_id, clean_number};

/// Top-level API payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyFeed {
    /// Property records.
    #[serde(default)]
    pub data: Vec<PropertyRecord>,
}

/// One approved property as reported by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyRecord {
    /// Property id (number or numeric string).
    #[serde(default)]
    pub property_id: Option<Value>,
    /// Display name.
    #[serde(default)]
    pub property_name: Option<String>,
    /// Latitude (number or string).
    #[serde(default)]
    pub property_lat: Option<Value>,
    /// Longitude (number or string).
    #[serde(default)]
    pub property_lng: Option<Value>,
    /// Full market path as typed into the approval deck.
    #[serde(default)]
    pub market_name: Option<String>,
}

impl PropertyRecord {
    /// Property id, if present and integral.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        match self.property_id.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => clean_id(s),
            _ => None,
        }
    }

    /// `(latitude, longitude)`, each `None` when missing or malformed.
    #[must_use]
    pub fn coordinates(&self) -> (Option<f64>, Option<f64>) {
        (
            loose_number(self.property_lat.as_ref()),
            loose_number(self.property_lng.as_ref()),
        )
    }

    /// Circle named by the reported market.
    ///
    /// Market names in approval decks carry presentation noise such as
    /// `"PPT Telangana_..."`, so the slide-text rules apply. A name that is
    /// not a full market path is treated as a bare circle.
    #[must_use]
    pub fn reported_circle(&self) -> Option<String> {
        let name = self.market_name.as_deref()?.trim();
        if name.is_empty() {
            return None;
        }
        if name.split('_').count() >= MIN_SEGMENTS {
            return parse_market_name_in(name, NameContext::SlideText).details.circle;
        }
        let bare = strip_circle_prefixes(name.split('_').next().unwrap_or(name));
        (!bare.is_empty()).then(|| bare.to_string())
    }
}

fn loose_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => clean_number(s),
        _ => None,
    }
}

/// Imports a saved API payload into `approved_properties`.
///
/// Records without a usable id are skipped and counted. The reported market
/// name and its circle are stored alongside the point.
///
/// # Errors
///
/// Returns [`IngestError`] if the payload is not valid JSON or the write
/// fails.
pub fn import_properties<R: Read>(
    conn: &Connection,
    reader: R,
    progress: &dyn ProgressCallback,
) -> Result<ImportReport, IngestError> {
    let start = Instant::now();
    let feed: PropertyFeed = serde_json::from_reader(reader)?;

    let mut report = ImportReport::default();
    let mut points = Vec::with_capacity(feed.data.len());
    let mut reports = Vec::with_capacity(feed.data.len());

    progress.set_total(feed.data.len() as u64);
    progress.set_message("Reading property payload".to_string());

    for record in &feed.data {
        report.rows_read += 1;
        progress.inc(1);

        let Some(id) = record.id() else {
            log::warn!(
                "Skipping property record {}: invalid id {:?}",
                report.rows_read,
                record.property_id
            );
            report.skipped += 1;
            continue;
        };

        let (latitude, longitude) = record.coordinates();
        if latitude.is_none() || longitude.is_none() {
            report.without_location += 1;
        }

        points.push(LocatablePoint {
            id,
            kind: PointKind::ApprovedProperty,
            code: None,
            name: record.property_name.clone(),
            latitude,
            longitude,
            market_id: None,
        });
        reports.push(ReportedMarket {
            property_id: id,
            market_name: record.market_name.clone(),
            market_circle: record.reported_circle(),
        });
    }

    report.imported = catalog_db::in_transaction(conn, |tx| {
        let written = catalog_db::write_points(tx, PointKind::ApprovedProperty, &points)?;
        catalog_db::write_reported_markets(tx, &reports)?;
        Ok(written)
    })?;
    report.duration = start.elapsed();

    progress.finish(format!("Imported {} approved properties", report.imported));
    log::info!(
        "Imported {} approved properties from {} record(s) in {:.1}s ({} skipped, {} without coordinates)",
        report.imported,
        report.rows_read,
        report.duration.as_secs_f64(),
        report.skipped,
        report.without_location
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use catchment_map_assign::progress::NullProgress;
    use catchment_map_database::catalog_db::{load_points, open_in_memory};

    use super::*;

    fn reported(conn: &Connection, id: i64) -> (Option<String>, Option<String>) {
        conn.query_row(
            "SELECT reported_market, market_circle FROM approved_properties WHERE id = ?",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
    }

    const PAYLOAD: &str = r#"{
        "data": [
            {
                "property_id": 501,
                "property_name": "Madhapur High Street",
                "property_lat": 17.4483,
                "property_lng": "78.3915",
                "market_name": "PPT Telangana_Hyderabad(55/290)_Madhapur(4/12)_Market 9"
            },
            {
                "property_id": "502",
                "property_name": "Patia Square",
                "property_lat": "-",
                "property_lng": null,
                "market_name": "BD Odisha"
            },
            {
                "property_id": null,
                "property_name": "No id"
            }
        ]
    }"#;

    #[test]
    fn imports_payload() {
        let conn = open_in_memory().unwrap();

        let report = import_properties(&conn, PAYLOAD.as_bytes(), &NullProgress).unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.without_location, 1);

        let properties = load_points(&conn, PointKind::ApprovedProperty).unwrap();
        assert_eq!(properties[0].id, 501);
        assert_eq!(properties[0].lat_lng(), Some((17.4483, 78.3915)));
        assert_eq!(properties[1].lat_lng(), None);

        let (name, circle) = reported(&conn, 501);
        assert!(name.unwrap().starts_with("PPT Telangana"));
        assert_eq!(circle.as_deref(), Some("Telangana"));

        let (_, circle) = reported(&conn, 502);
        assert_eq!(circle.as_deref(), Some("Odisha"));
    }

    #[test]
    fn failed_market_write_rolls_back_points() {
        let conn = open_in_memory().unwrap();
        conn.execute_batch("ALTER TABLE approved_properties DROP COLUMN market_circle")
            .unwrap();

        let err = import_properties(&conn, PAYLOAD.as_bytes(), &NullProgress).unwrap_err();
        assert!(matches!(err, IngestError::Database(_)));
        assert!(
            load_points(&conn, PointKind::ApprovedProperty)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn bare_circle_names_resolve() {
        let record = PropertyRecord {
            market_name: Some("Add Odisha".to_string()),
            ..PropertyRecord::default()
        };
        assert_eq!(record.reported_circle().as_deref(), Some("Odisha"));

        let partial = PropertyRecord {
            market_name: Some("BD Kerala_Kochi".to_string()),
            ..PropertyRecord::default()
        };
        assert_eq!(partial.reported_circle().as_deref(), Some("Kerala"));
    }

    #[test]
    fn reported_circle_strips_deck_prefixes() {
        let record = PropertyRecord {
            market_name: Some("Presentation Add Karnataka_Bengaluru_Indiranagar_M1".to_string()),
            ..PropertyRecord::default()
        };
        assert_eq!(record.reported_circle().as_deref(), Some("Karnataka"));

        let blank = PropertyRecord {
            market_name: Some("  ".to_string()),
            ..PropertyRecord::default()
        };
        assert_eq!(blank.reported_circle(), None);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let conn = open_in_memory().unwrap();
        let err = import_properties(&conn, "{\"data\": [".as_bytes(), &NullProgress).unwrap_err();
        assert!(matches!(err, IngestError::Json(_)));
    }
}
