//! Store and approved-property spreadsheet import.

use std::io::Read;
use std::time::Instant;

use catchment_map_assign::progress::ProgressCallback;
use catchment_map_database::catalog_db;
use catchment_map_ingest_models::{ImportLayout, ImportReport, LayoutTarget, PointKey};
use catchment_map_market_models::LocatablePoint;
use duckdb::Connection;

use crate::IngestError;
use crate::reader::{cell, clean_id, clean_number, read_table};

/// Imports a store or property export and upserts every good row in one
/// transaction.
///
/// Rows are matched with stored points by the layout's [`PointKey`]. Keyed
/// by id, rows whose id does not parse are skipped; keyed by code, rows
/// with a blank code are skipped and ids come from the catalog. Skipped
/// rows are counted. Coordinates go through [`clean_number`]; a point with
/// a missing coordinate is still imported and is skipped later by
/// assignment runs.
///
/// # Errors
///
/// Returns [`IngestError`] if the layout is not a point layout or does not
/// map its key column, a required column is missing, the file cannot be
/// read, or the write fails.
pub fn import_points<R: Read>(
    conn: &Connection,
    reader: R,
    layout: &ImportLayout,
    progress: &dyn ProgressCallback,
) -> Result<ImportReport, IngestError> {
    let start = Instant::now();

    let LayoutTarget::Points {
        point_kind: kind,
        columns,
    } = &layout.target
    else {
        return Err(IngestError::WrongTarget {
            layout: layout.id.clone(),
            expected: "points",
        });
    };
    let kind = *kind;

    let key_column = match columns.key {
        PointKey::Id => columns.id.as_deref(),
        PointKey::Code => columns.code.as_deref(),
    }
    .ok_or_else(|| IngestError::UnmappedKey {
        layout: layout.id.clone(),
        key: columns.key,
    })?;

    let table = read_table(reader, layout.encoding, layout.skip_rows)?;
    let key_col = Some(table.require(&layout.id, key_column)?);
    let lat_col = Some(table.require(&layout.id, &columns.latitude)?);
    let lng_col = Some(table.require(&layout.id, &columns.longitude)?);
    let id_col = match columns.key {
        PointKey::Id => key_col,
        PointKey::Code => None,
    };
    let code_col = match columns.key {
        PointKey::Id => table.optional(&layout.id, columns.code.as_deref()),
        PointKey::Code => key_col,
    };
    let name_col = table.optional(&layout.id, columns.name.as_deref());

    let mut report = ImportReport::default();
    let mut points = Vec::with_capacity(table.rows().len());

    progress.set_total(table.rows().len() as u64);
    progress.set_message(format!("Reading {}", layout.name));

    for row in table.rows() {
        report.rows_read += 1;
        progress.inc(1);

        let code = cell(row, code_col).map(ToString::to_string);
        let id = match columns.key {
            PointKey::Id => cell(row, id_col).and_then(clean_id),
            PointKey::Code => code.as_ref().map(|_| 0),
        };
        let Some(id) = id else {
            log::warn!(
                "Skipping {kind} row {}: invalid {} {:?}",
                report.rows_read,
                columns.key,
                cell(row, key_col)
            );
            report.skipped += 1;
            continue;
        };

        let latitude = cell(row, lat_col).and_then(clean_number);
        let longitude = cell(row, lng_col).and_then(clean_number);
        if latitude.is_none() || longitude.is_none() {
            log::debug!(
                "{kind} {}: no usable coordinates",
                code.as_deref().map_or_else(|| id.to_string(), ToString::to_string)
            );
            report.without_location += 1;
        }

        points.push(LocatablePoint {
            id,
            kind,
            code,
            name: cell(row, name_col).map(ToString::to_string),
            latitude,
            longitude,
            market_id: None,
        });
    }

    report.imported = match columns.key {
        PointKey::Id => catalog_db::upsert_points(conn, kind, &points)?,
        PointKey::Code => catalog_db::upsert_points_by_code(conn, kind, &points)?,
    };
    report.duration = start.elapsed();

    progress.finish(format!("Imported {} {kind} point(s)", report.imported));
    log::info!(
        "Imported {} {kind} point(s) from {} row(s) in {:.1}s ({} skipped, {} without coordinates)",
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
    use catchment_map_market_models::PointKind;

    use super::*;
    use crate::registry::point_layout;

    const STORE_MASTER: &str = ",,,,
Sales,,,,Footfall
Store Code,Store Name,Store Address,Latitude,Longitude
LK001,Banjara Hills,Road No. 12,17.4156,78.4347
LK002,Jubilee Hills,Road No. 36,-,None
LK003,Gachibowli,DLF Cyber City,\"17,440.1\",78.3489
,Broken,No code,17.1,78.1
,,,,
";

    #[test]
    fn imports_store_master_keyed_by_code() {
        let conn = open_in_memory().unwrap();
        let layout = point_layout(PointKind::Store).unwrap();

        let report = import_points(&conn, STORE_MASTER.as_bytes(), &layout, &NullProgress).unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.imported, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.without_location, 1);

        let stores = load_points(&conn, PointKind::Store).unwrap();
        assert_eq!(stores.len(), 3);
        assert_eq!(stores[0].id, 1);
        assert_eq!(stores[0].code.as_deref(), Some("LK001"));
        assert_eq!(stores[0].name.as_deref(), Some("Banjara Hills"));
        assert_eq!(stores[0].lat_lng(), Some((17.4156, 78.4347)));
        assert_eq!(stores[1].latitude, None);
        assert_eq!(stores[1].longitude, None);
        assert_eq!(stores[2].latitude, Some(17440.1));
    }

    #[test]
    fn reimport_does_not_duplicate() {
        let conn = open_in_memory().unwrap();
        let layout = point_layout(PointKind::Store).unwrap();
        import_points(&conn, STORE_MASTER.as_bytes(), &layout, &NullProgress).unwrap();

        let moved = "Sales,,,,Footfall
Store Code,Store Name,Store Address,Latitude,Longitude
LK004,Kondapur,Botanical Garden Rd,17.46,78.36
LK002,Jubilee Hills,Road No. 36,17.43,78.40
";
        import_points(&conn, moved.as_bytes(), &layout, &NullProgress).unwrap();

        let stores = load_points(&conn, PointKind::Store).unwrap();
        assert_eq!(stores.len(), 4);
        assert_eq!(stores[1].code.as_deref(), Some("LK002"));
        assert_eq!(stores[1].lat_lng(), Some((17.43, 78.40)));
        assert_eq!(stores[3].id, 4);
        assert_eq!(stores[3].code.as_deref(), Some("LK004"));
    }

    #[test]
    fn code_key_without_code_column_is_an_error() {
        let conn = open_in_memory().unwrap();
        let mut layout = point_layout(PointKind::Store).unwrap();
        if let LayoutTarget::Points { columns, .. } = &mut layout.target {
            columns.code = None;
        }

        let err = import_points(&conn, STORE_MASTER.as_bytes(), &layout, &NullProgress).unwrap_err();
        assert!(matches!(
            err,
            IngestError::UnmappedKey {
                key: PointKey::Code,
                ..
            }
        ));
    }

    #[test]
    fn property_layout_writes_property_table() {
        let conn = open_in_memory().unwrap();
        let layout = point_layout(PointKind::ApprovedProperty).unwrap();
        let csv = "Property ID,Property Name,Latitude,Longitude\n900,Hitech City,17.45,78.38\n";

        import_points(&conn, csv.as_bytes(), &layout, &NullProgress).unwrap();

        assert!(load_points(&conn, PointKind::Store).unwrap().is_empty());
        let properties = load_points(&conn, PointKind::ApprovedProperty).unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].kind, PointKind::ApprovedProperty);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let conn = open_in_memory().unwrap();
        let layout = point_layout(PointKind::Store).unwrap();
        let csv = "skip\nStore ID,Latitude\n1,17.4\n";
        let err = import_points(&conn, csv.as_bytes(), &layout, &NullProgress).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingColumn { ref column, .. } if column == "Store Code"
        ));
    }
}
