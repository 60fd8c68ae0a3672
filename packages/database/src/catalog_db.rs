//! Market and point catalog stored in `DuckDB`.
//!
//! Markets are keyed by `market_id`; stores and approved properties by
//! `id`, which the catalog allocates for points imported by code. Point
//! tables carry a nullable `market_id` written only by
//! assignment runs, so re-importing a point never clears its market.

use std::collections::BTreeMap;
use std::path::Path;

use catchment_map_assign::{AssignmentStore, AssignmentUpdate};
use catchment_map_market_models::{LocatablePoint, Market, MarketDetails, PointKind};
use chrono::NaiveDateTime;
use duckdb::Connection;

use crate::DbError;

const MARKET_COLUMNS: &str = "market_id, name, source_city, zone, additional_info,
    boundary_wkt, centroid, circle, hub_name, city, level_name,
    hub_rank, hub_total, city_rank, city_total,
    name_standard, has_store, CAST(created_at AS VARCHAR)";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Opens (or creates) the catalog database and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.execute_batch("SET threads = 4;")?;
    create_schema(&conn)?;

    log::debug!("Opened catalog at {}", path.display());

    Ok(conn)
}

/// Opens the catalog at `explicit`, `CATCHMENT_MAP_DB`, or the default
/// path, in that order.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default(explicit: Option<&Path>) -> Result<Connection, DbError> {
    open(&crate::paths::resolve_db_path(explicit))
}

/// Opens an empty in-memory catalog.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS markets (
            market_id BIGINT NOT NULL PRIMARY KEY,
            name TEXT NOT NULL,
            source_city TEXT,
            zone TEXT,
            additional_info TEXT,
            boundary_wkt TEXT,
            centroid TEXT,
            circle TEXT,
            hub_name TEXT,
            city TEXT,
            level_name TEXT,
            hub_rank BIGINT,
            hub_total BIGINT,
            city_rank BIGINT,
            city_total BIGINT,
            name_standard BOOLEAN NOT NULL DEFAULT FALSE,
            has_store BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS stores (
            id BIGINT NOT NULL PRIMARY KEY,
            code TEXT,
            name TEXT,
            latitude DOUBLE,
            longitude DOUBLE,
            market_id BIGINT
        );

        CREATE TABLE IF NOT EXISTS approved_properties (
            id BIGINT NOT NULL PRIMARY KEY,
            code TEXT,
            name TEXT,
            latitude DOUBLE,
            longitude DOUBLE,
            market_id BIGINT,
            reported_market TEXT,
            market_circle TEXT
        );",
    )?;

    Ok(())
}

/// Runs `f` between `BEGIN TRANSACTION` and `COMMIT`, rolling back if it
/// fails.
///
/// # Errors
///
/// Returns whatever `f` returns, or [`DbError`] if the transaction cannot
/// be started or committed.
pub fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, DbError>,
) -> Result<T, DbError> {
    conn.execute_batch("BEGIN TRANSACTION")?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::error!("Rollback failed after {e}: {rollback}");
            }
            Err(e)
        }
    }
}

/// Inserts or replaces markets, all in one transaction.
///
/// Later duplicates of a `market_id` within the batch win.
///
/// # Errors
///
/// Returns [`DbError`] if any row fails; no row is written in that case.
pub fn upsert_markets(conn: &Connection, markets: &[Market]) -> Result<u64, DbError> {
    if markets.is_empty() {
        return Ok(0);
    }

    let mut last_seen: BTreeMap<i64, usize> = BTreeMap::new();
    for (i, market) in markets.iter().enumerate() {
        last_seen.insert(market.market_id, i);
    }
    if last_seen.len() < markets.len() {
        log::info!(
            "Deduplicated market batch: {} -> {} rows",
            markets.len(),
            last_seen.len()
        );
    }

    in_transaction(conn, |conn| {
        let mut stmt = conn.prepare(
            "INSERT INTO markets (
                market_id, name, source_city, zone, additional_info,
                boundary_wkt, centroid, circle, hub_name, city, level_name,
                hub_rank, hub_total, city_rank, city_total,
                name_standard, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (market_id) DO UPDATE SET
                name = EXCLUDED.name,
                source_city = EXCLUDED.source_city,
                zone = EXCLUDED.zone,
                additional_info = EXCLUDED.additional_info,
                boundary_wkt = EXCLUDED.boundary_wkt,
                centroid = EXCLUDED.centroid,
                circle = EXCLUDED.circle,
                hub_name = EXCLUDED.hub_name,
                city = EXCLUDED.city,
                level_name = EXCLUDED.level_name,
                hub_rank = EXCLUDED.hub_rank,
                hub_total = EXCLUDED.hub_total,
                city_rank = EXCLUDED.city_rank,
                city_total = EXCLUDED.city_total,
                name_standard = EXCLUDED.name_standard,
                created_at = EXCLUDED.created_at",
        )?;

        let mut total = 0u64;
        for &i in last_seen.values() {
            let market = &markets[i];
            let d = &market.details;
            let created_at = market
                .created_at
                .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string());

            let rows = stmt.execute(duckdb::params![
                market.market_id,
                market.name,
                market.source_city.as_deref(),
                market.zone.as_deref(),
                market.additional_info.as_deref(),
                market.boundary_wkt.as_deref(),
                market.centroid.as_deref(),
                d.circle.as_deref(),
                d.hub_name.as_deref(),
                d.city.as_deref(),
                d.level_name.as_deref(),
                d.hub_rank.map(i64::from),
                d.hub_total.map(i64::from),
                d.city_rank.map(i64::from),
                d.city_total.map(i64::from),
                market.name_standard,
                created_at,
            ])?;
            total += u64::try_from(rows).unwrap_or(0);
        }

        Ok(total)
    })
}

/// Returns every market in ascending `market_id` order.
///
/// This order is the build order of the spatial index and centroid set,
/// so it decides which of two overlapping markets wins.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_markets(conn: &Connection) -> Result<Vec<Market>, DbError> {
    let sql = format!("SELECT {MARKET_COLUMNS} FROM markets ORDER BY market_id");
    let mut stmt = conn.prepare(&sql)?;

    let markets = stmt
        .query_map([], |row| {
            Ok(Market {
                market_id: row.get(0)?,
                name: row.get(1)?,
                source_city: row.get(2)?,
                zone: row.get(3)?,
                additional_info: row.get(4)?,
                boundary_wkt: row.get(5)?,
                centroid: row.get(6)?,
                details: MarketDetails {
                    circle: row.get(7)?,
                    hub_name: row.get(8)?,
                    city: row.get(9)?,
                    level_name: row.get(10)?,
                    hub_rank: to_rank(row.get(11)?),
                    hub_total: to_rank(row.get(12)?),
                    city_rank: to_rank(row.get(13)?),
                    city_total: to_rank(row.get(14)?),
                },
                name_standard: row.get(15)?,
                has_store: row.get(16)?,
                created_at: row
                    .get::<_, Option<String>>(17)?
                    .as_deref()
                    .and_then(parse_timestamp),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(markets)
}

/// A re-parsed market name ready to be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDetailsUpdate {
    /// Market being updated.
    pub market_id: i64,
    /// Newly derived fields.
    pub details: MarketDetails,
    /// Whether the name had at least four segments.
    pub name_standard: bool,
}

/// Writes derived name fields for a batch of markets in one transaction.
///
/// # Errors
///
/// Returns [`DbError`] if any update fails; no update is kept in that case.
pub fn update_market_details(
    conn: &Connection,
    updates: &[MarketDetailsUpdate],
) -> Result<u64, DbError> {
    if updates.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| {
        let mut stmt = conn.prepare(
            "UPDATE markets SET
                circle = ?, hub_name = ?, city = ?, level_name = ?,
                hub_rank = ?, hub_total = ?, city_rank = ?, city_total = ?,
                name_standard = ?
             WHERE market_id = ?",
        )?;

        let mut total = 0u64;
        for update in updates {
            let d = &update.details;
            let rows = stmt.execute(duckdb::params![
                d.circle.as_deref(),
                d.hub_name.as_deref(),
                d.city.as_deref(),
                d.level_name.as_deref(),
                d.hub_rank.map(i64::from),
                d.hub_total.map(i64::from),
                d.city_rank.map(i64::from),
                d.city_total.map(i64::from),
                update.name_standard,
                update.market_id,
            ])?;
            total += u64::try_from(rows).unwrap_or(0);
        }

        Ok(total)
    })
}

/// Writes `(market_id, centroid_text)` pairs in one transaction.
///
/// # Errors
///
/// Returns [`DbError`] if any update fails; no update is kept in that case.
pub fn update_centroids(conn: &Connection, centroids: &[(i64, String)]) -> Result<u64, DbError> {
    if centroids.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| {
        let mut stmt = conn.prepare("UPDATE markets SET centroid = ? WHERE market_id = ?")?;
        let mut total = 0u64;
        for (market_id, centroid) in centroids {
            let rows = stmt.execute(duckdb::params![centroid, market_id])?;
            total += u64::try_from(rows).unwrap_or(0);
        }
        Ok(total)
    })
}

/// Inserts or updates points of one kind, in one transaction.
///
/// Existing rows keep their `market_id`. Later duplicates of an id within
/// the batch win.
///
/// # Errors
///
/// Returns [`DbError`] if any row fails; no row is written in that case.
pub fn upsert_points(
    conn: &Connection,
    kind: PointKind,
    points: &[LocatablePoint],
) -> Result<u64, DbError> {
    if points.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| write_points(conn, kind, points))
}

/// Inserts or updates points keyed by their `code` rather than their id.
///
/// A code already in the table keeps its id; new codes get ids after the
/// current maximum. Later duplicates of a code within the batch win, and
/// points without a code are not written. Everything runs in one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError`] if any row fails; no row is written in that case.
pub fn upsert_points_by_code(
    conn: &Connection,
    kind: PointKind,
    points: &[LocatablePoint],
) -> Result<u64, DbError> {
    let mut by_code: BTreeMap<&str, &LocatablePoint> = BTreeMap::new();
    for point in points {
        if let Some(code) = point.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            by_code.insert(code, point);
        }
    }
    if by_code.is_empty() {
        return Ok(0);
    }

    let table = kind.table();
    in_transaction(conn, |conn| {
        let mut known: BTreeMap<String, i64> = BTreeMap::new();
        let mut stmt = conn.prepare(&format!(
            "SELECT TRIM(code), id FROM {table} WHERE code IS NOT NULL ORDER BY id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (code, id) = row?;
            known.entry(code).or_insert(id);
        }

        let mut next_id: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {table}"),
            [],
            |row| row.get(0),
        )?;

        let keyed: Vec<LocatablePoint> = by_code
            .into_iter()
            .map(|(code, point)| {
                let id = known.get(code).copied().unwrap_or_else(|| {
                    let id = next_id;
                    next_id += 1;
                    id
                });
                LocatablePoint {
                    id,
                    code: Some(code.to_string()),
                    ..point.clone()
                }
            })
            .collect();

        write_points(conn, kind, &keyed)
    })
}

/// Writes points of one kind without opening a transaction of its own.
///
/// Run it inside [`in_transaction`] together with the other writes that
/// must commit with it. Existing rows keep their `market_id`; later
/// duplicates of an id win.
///
/// # Errors
///
/// Returns [`DbError`] on the first failing row.
pub fn write_points(
    conn: &Connection,
    kind: PointKind,
    points: &[LocatablePoint],
) -> Result<u64, DbError> {
    let mut last_seen: BTreeMap<i64, usize> = BTreeMap::new();
    for (i, point) in points.iter().enumerate() {
        last_seen.insert(point.id, i);
    }

    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (id, code, name, latitude, longitude)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            code = EXCLUDED.code,
            name = EXCLUDED.name,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude",
        kind.table()
    ))?;

    let mut total = 0u64;
    for &i in last_seen.values() {
        let point = &points[i];
        let rows = stmt.execute(duckdb::params![
            point.id,
            point.code.as_deref(),
            point.name.as_deref(),
            point.latitude,
            point.longitude,
        ])?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Market text reported for an approved property by the partner feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedMarket {
    /// Approved property id.
    pub property_id: i64,
    /// Market name as reported.
    pub market_name: Option<String>,
    /// Circle derived from the reported name.
    pub market_circle: Option<String>,
}

/// Stores reported market names for approved properties in one
/// transaction. Properties that do not exist are ignored.
///
/// # Errors
///
/// Returns [`DbError`] if any update fails; no update is kept in that case.
pub fn update_reported_markets(
    conn: &Connection,
    reports: &[ReportedMarket],
) -> Result<u64, DbError> {
    if reports.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| write_reported_markets(conn, reports))
}

/// Writes reported market names without opening a transaction of its own.
///
/// # Errors
///
/// Returns [`DbError`] on the first failing update.
pub fn write_reported_markets(
    conn: &Connection,
    reports: &[ReportedMarket],
) -> Result<u64, DbError> {
    let mut stmt = conn.prepare(
        "UPDATE approved_properties SET reported_market = ?, market_circle = ?
         WHERE id = ?",
    )?;
    let mut total = 0u64;
    for report in reports {
        let rows = stmt.execute(duckdb::params![
            report.market_name.as_deref(),
            report.market_circle.as_deref(),
            report.property_id,
        ])?;
        total += u64::try_from(rows).unwrap_or(0);
    }
    Ok(total)
}

/// Returns every point of one kind in ascending id order.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_points(conn: &Connection, kind: PointKind) -> Result<Vec<LocatablePoint>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, code, name, latitude, longitude, market_id
         FROM {} ORDER BY id",
        kind.table()
    ))?;

    let points = stmt
        .query_map([], |row| {
            Ok(LocatablePoint {
                id: row.get(0)?,
                kind,
                code: row.get(1)?,
                name: row.get(2)?,
                latitude: row.get(3)?,
                longitude: row.get(4)?,
                market_id: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(points)
}

/// Approved properties per reported circle, ordered by circle.
///
/// Properties without a reported circle are not counted.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn reported_circle_counts(conn: &Connection) -> Result<Vec<(String, u64)>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT market_circle, COUNT(*) FROM approved_properties
         WHERE market_circle IS NOT NULL
         GROUP BY market_circle ORDER BY market_circle",
    )?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(circle, n)| (circle, u64::try_from(n).unwrap_or(0)))
        .collect())
}

/// Writes a batch of assignments in one transaction.
///
/// For stores, every market's `has_store` flag is recomputed inside the
/// same transaction.
///
/// # Errors
///
/// Returns [`DbError`] if any update fails; no update is kept in that case.
pub fn apply_assignments(
    conn: &Connection,
    kind: PointKind,
    updates: &[AssignmentUpdate],
) -> Result<u64, DbError> {
    if updates.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| {
        let mut stmt = conn.prepare(&format!(
            "UPDATE {} SET market_id = ? WHERE id = ?",
            kind.table()
        ))?;

        let mut total = 0u64;
        for update in updates {
            let rows = stmt.execute(duckdb::params![update.market_id, update.point_id])?;
            total += u64::try_from(rows).unwrap_or(0);
        }

        if kind == PointKind::Store {
            let flagged = refresh_has_store(conn)?;
            log::debug!("{flagged} market(s) have at least one store");
        }

        Ok(total)
    })
}

/// Recomputes `has_store` for every market and returns how many are set.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub fn refresh_has_store(conn: &Connection) -> Result<u64, DbError> {
    conn.execute_batch(
        "UPDATE markets SET has_store = market_id IN (
            SELECT DISTINCT market_id FROM stores WHERE market_id IS NOT NULL
        );",
    )?;

    count(conn, "SELECT COUNT(*) FROM markets WHERE has_store")
}

/// Row counts describing the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    /// All markets.
    pub markets: u64,
    /// Markets whose name had at least four segments.
    pub standard_names: u64,
    /// Markets with boundary text.
    pub with_boundary: u64,
    /// Markets with centroid text.
    pub with_centroid: u64,
    /// Markets with at least one store.
    pub with_store: u64,
    /// All stores.
    pub stores: u64,
    /// Stores with a market.
    pub stores_assigned: u64,
    /// All approved properties.
    pub properties: u64,
    /// Approved properties with a market.
    pub properties_assigned: u64,
}

/// Counts markets and points.
///
/// # Errors
///
/// Returns [`DbError`] if any query fails.
pub fn summary(conn: &Connection) -> Result<CatalogSummary, DbError> {
    Ok(CatalogSummary {
        markets: count(conn, "SELECT COUNT(*) FROM markets")?,
        standard_names: count(conn, "SELECT COUNT(*) FROM markets WHERE name_standard")?,
        with_boundary: count(
            conn,
            "SELECT COUNT(*) FROM markets WHERE TRIM(COALESCE(boundary_wkt, '')) <> ''",
        )?,
        with_centroid: count(
            conn,
            "SELECT COUNT(*) FROM markets WHERE TRIM(COALESCE(centroid, '')) <> ''",
        )?,
        with_store: count(conn, "SELECT COUNT(*) FROM markets WHERE has_store")?,
        stores: count(conn, "SELECT COUNT(*) FROM stores")?,
        stores_assigned: count(
            conn,
            "SELECT COUNT(*) FROM stores WHERE market_id IS NOT NULL",
        )?,
        properties: count(conn, "SELECT COUNT(*) FROM approved_properties")?,
        properties_assigned: count(
            conn,
            "SELECT COUNT(*) FROM approved_properties WHERE market_id IS NOT NULL",
        )?,
    })
}

fn count(conn: &Connection, sql: &str) -> Result<u64, DbError> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    u64::try_from(n).map_err(|_| DbError::Conversion {
        message: format!("negative count {n} from {sql:?}"),
    })
}

fn to_rank(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }

    log::warn!("Failed to parse timestamp: {s:?}");
    None
}

/// [`AssignmentStore`] backed by a catalog connection.
pub struct CatalogStore<'a> {
    conn: &'a Connection,
}

impl<'a> CatalogStore<'a> {
    /// Wraps an open catalog connection.
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AssignmentStore for CatalogStore<'_> {
    type Error = DbError;

    fn markets(&self) -> Result<Vec<Market>, DbError> {
        load_markets(self.conn)
    }

    fn points(&self, kind: PointKind) -> Result<Vec<LocatablePoint>, DbError> {
        load_points(self.conn, kind)
    }

    fn apply_assignments(
        &mut self,
        kind: PointKind,
        updates: &[AssignmentUpdate],
    ) -> Result<u64, DbError> {
        apply_assignments(self.conn, kind, updates)
    }
}

#[cfg(test)]
mod tests {
    use catchment_map_assign::progress::NullProgress;
    use catchment_map_assign::{RunOptions, run};
    use chrono::NaiveDate;

    use super::*;

    fn market(id: i64, boundary: Option<&str>) -> Market {
        Market {
            market_id: id,
            name: format!("Telangana_Hyderabad(55/290)_Kukatpally(3/12)_Market {id}"),
            source_city: Some("Hyderabad".to_string()),
            zone: Some("South".to_string()),
            additional_info: None,
            boundary_wkt: boundary.map(ToString::to_string),
            centroid: None,
            details: MarketDetails {
                circle: Some("Telangana".to_string()),
                hub_name: Some("Hyderabad".to_string()),
                city: Some("Kukatpally".to_string()),
                level_name: Some(format!("Market {id}")),
                hub_rank: Some(55),
                hub_total: Some(290),
                city_rank: Some(3),
                city_total: Some(12),
            },
            name_standard: true,
            has_store: false,
            created_at: NaiveDate::from_ymd_opt(2023, 4, 5)
                .and_then(|d| d.and_hms_opt(10, 30, 0)),
        }
    }

    fn store(id: i64, lat: Option<f64>, lng: Option<f64>) -> LocatablePoint {
        LocatablePoint {
            id,
            kind: PointKind::Store,
            code: Some(format!("ST{id}")),
            name: Some(format!("Store {id}")),
            latitude: lat,
            longitude: lng,
            market_id: None,
        }
    }

    const SQUARE: &str = "POLYGON ((78 17, 79 17, 79 18, 78 18, 78 17))";

    #[test]
    fn markets_round_trip() {
        let conn = open_in_memory().unwrap();
        let written = upsert_markets(&conn, &[market(2, Some(SQUARE)), market(1, None)]).unwrap();
        assert_eq!(written, 2);

        let loaded = load_markets(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].market_id, 1);
        assert_eq!(loaded[1], market(2, Some(SQUARE)));
    }

    #[test]
    fn market_upsert_replaces_existing_row() {
        let conn = open_in_memory().unwrap();
        upsert_markets(&conn, &[market(1, None)]).unwrap();

        let mut changed = market(1, Some(SQUARE));
        changed.zone = Some("North".to_string());
        upsert_markets(&conn, &[changed]).unwrap();

        let loaded = load_markets(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].zone.as_deref(), Some("North"));
        assert_eq!(loaded[0].boundary_wkt.as_deref(), Some(SQUARE));
    }

    #[test]
    fn point_upsert_keeps_assignment() {
        let conn = open_in_memory().unwrap();
        upsert_points(&conn, PointKind::Store, &[store(1, Some(17.5), Some(78.5))]).unwrap();
        apply_assignments(
            &conn,
            PointKind::Store,
            &[AssignmentUpdate {
                point_id: 1,
                previous: None,
                market_id: 9,
                distance_km: None,
            }],
        )
        .unwrap();

        upsert_points(&conn, PointKind::Store, &[store(1, Some(17.6), None)]).unwrap();

        let points = load_points(&conn, PointKind::Store).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].market_id, Some(9));
        assert_eq!(points[0].longitude, None);
    }

    #[test]
    fn failed_batch_rolls_back() {
        let conn = open_in_memory().unwrap();
        upsert_markets(&conn, &[market(1, None)]).unwrap();

        let result = in_transaction(&conn, |conn| {
            conn.execute("UPDATE markets SET zone = 'Changed' WHERE market_id = 1", [])?;
            conn.execute("UPDATE no_such_table SET x = 1", [])?;
            Ok(())
        });

        assert!(result.is_err());
        let loaded = load_markets(&conn).unwrap();
        assert_eq!(loaded[0].zone.as_deref(), Some("South"));
    }

    #[test]
    fn store_assignment_sets_has_store() {
        let conn = open_in_memory().unwrap();
        upsert_markets(&conn, &[market(1, Some(SQUARE)), market(2, None)]).unwrap();
        upsert_points(&conn, PointKind::Store, &[store(1, Some(17.5), Some(78.5))]).unwrap();

        let mut store = CatalogStore::new(&conn);
        let report = run(&mut store, RunOptions::default(), &NullProgress).unwrap();
        assert_eq!(report.written, 1);

        let markets = load_markets(&conn).unwrap();
        assert!(markets[0].has_store);
        assert!(!markets[1].has_store);

        let second = run(&mut store, RunOptions::default(), &NullProgress).unwrap();
        assert_eq!(second.summary.updated, 0);
        assert_eq!(second.written, 0);
    }

    #[test]
    fn details_and_centroids_update_in_batches() {
        let conn = open_in_memory().unwrap();
        upsert_markets(&conn, &[market(1, Some(SQUARE))]).unwrap();

        let updated = update_market_details(
            &conn,
            &[MarketDetailsUpdate {
                market_id: 1,
                details: MarketDetails::default(),
                name_standard: false,
            }],
        )
        .unwrap();
        assert_eq!(updated, 1);
        update_centroids(&conn, &[(1, "POINT (78.5 17.5)".to_string())]).unwrap();

        let loaded = &load_markets(&conn).unwrap()[0];
        assert!(loaded.details.is_empty());
        assert!(!loaded.name_standard);
        assert_eq!(loaded.centroid.as_deref(), Some("POINT (78.5 17.5)"));
    }

    fn reported(conn: &Connection, id: i64) -> Option<(Option<String>, Option<String>)> {
        conn.query_row(
            "SELECT reported_market, market_circle FROM approved_properties WHERE id = ?",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok()
    }

    #[test]
    fn reported_market_is_stored_for_properties() {
        let conn = open_in_memory().unwrap();
        let property = |id| LocatablePoint {
            kind: PointKind::ApprovedProperty,
            ..store(id, Some(17.5), Some(78.5))
        };
        upsert_points(
            &conn,
            PointKind::ApprovedProperty,
            &[property(7), property(9), property(11)],
        )
        .unwrap();

        let report = |property_id, circle: &str| ReportedMarket {
            property_id,
            market_name: Some(format!("PPT {circle}_Hyderabad_Kukatpally_M1")),
            market_circle: Some(circle.to_string()),
        };
        let written = update_reported_markets(
            &conn,
            &[
                report(7, "Telangana"),
                report(9, "Odisha"),
                report(11, "Telangana"),
                report(8, "Kerala"),
            ],
        )
        .unwrap();
        assert_eq!(written, 3);

        let (name, circle) = reported(&conn, 7).unwrap();
        assert!(name.unwrap().starts_with("PPT"));
        assert_eq!(circle.as_deref(), Some("Telangana"));
        assert_eq!(reported(&conn, 8), None);

        assert_eq!(
            reported_circle_counts(&conn).unwrap(),
            vec![("Odisha".to_string(), 1), ("Telangana".to_string(), 2)]
        );
    }

    #[test]
    fn code_keyed_upsert_reuses_ids() {
        let conn = open_in_memory().unwrap();
        upsert_points(&conn, PointKind::Store, &[store(4, Some(17.5), Some(78.5))]).unwrap();
        apply_assignments(
            &conn,
            PointKind::Store,
            &[AssignmentUpdate {
                point_id: 4,
                previous: None,
                market_id: 9,
                distance_km: None,
            }],
        )
        .unwrap();

        let keyed = |code: Option<&str>, name: &str| LocatablePoint {
            code: code.map(ToString::to_string),
            name: Some(name.to_string()),
            ..store(0, Some(17.6), Some(78.6))
        };
        let written = upsert_points_by_code(
            &conn,
            PointKind::Store,
            &[
                keyed(Some(" ST4 "), "Renamed"),
                keyed(Some("HYD-20"), "First"),
                keyed(None, "No code"),
                keyed(Some("HYD-20"), "Second"),
            ],
        )
        .unwrap();
        assert_eq!(written, 2);

        let points = load_points(&conn, PointKind::Store).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, 4);
        assert_eq!(points[0].name.as_deref(), Some("Renamed"));
        assert_eq!(points[0].market_id, Some(9));
        assert_eq!(points[1].id, 5);
        assert_eq!(points[1].code.as_deref(), Some("HYD-20"));
        assert_eq!(points[1].name.as_deref(), Some("Second"));

        upsert_points_by_code(&conn, PointKind::Store, &[keyed(Some("HYD-20"), "Third")]).unwrap();
        let points = load_points(&conn, PointKind::Store).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].name.as_deref(), Some("Third"));
    }

    #[test]
    fn summary_counts_catalog() {
        let conn = open_in_memory().unwrap();
        let mut bare = market(2, Some("  "));
        bare.name_standard = false;
        upsert_markets(&conn, &[market(1, Some(SQUARE)), bare]).unwrap();
        upsert_points(
            &conn,
            PointKind::Store,
            &[store(1, Some(17.5), Some(78.5)), store(2, None, None)],
        )
        .unwrap();

        let mut catalog = CatalogStore::new(&conn);
        run(&mut catalog, RunOptions::default(), &NullProgress).unwrap();

        let s = summary(&conn).unwrap();
        assert_eq!(s.markets, 2);
        assert_eq!(s.standard_names, 1);
        assert_eq!(s.with_boundary, 1);
        assert_eq!(s.with_centroid, 0);
        assert_eq!(s.with_store, 1);
        assert_eq!(s.stores, 2);
        assert_eq!(s.stores_assigned, 1);
        assert_eq!(s.properties, 0);
    }
}
