//! Reconciling matcher output against stored assignments.
//!
//! Every point is examined once. Points without coordinates or without a
//! match are skipped and keep whatever they had. Points whose match equals
//! the stored market are left alone. Only the remainder is staged, and the
//! staged set is handed to the store in a single batch.

use catchment_map_market_models::{
    Exclusion, ExclusionReason, LocatablePoint, PointKind, RunSummary,
};
use catchment_map_spatial::{LatLng, MarketMatcher, Strategy};

use crate::progress::ProgressCallback;
use crate::{AssignError, AssignmentStore};

/// Progress is reported every this many points.
const PROGRESS_STEP: u64 = 500;

/// A staged change to one point's market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignmentUpdate {
    /// Point being reassigned.
    pub point_id: i64,
    /// Market stored before this run.
    pub previous: Option<i64>,
    /// Market chosen by this run.
    pub market_id: i64,
    /// Centroid distance, for nearest-centroid runs.
    pub distance_km: Option<f64>,
}

/// Staged changes plus counters for one kind of point.
#[derive(Debug, Clone)]
pub struct AssignmentPlan {
    /// Kind of point planned.
    pub kind: PointKind,
    /// Strategy that produced the matches.
    pub strategy: Strategy,
    /// Changed points only, in input order.
    pub updates: Vec<AssignmentUpdate>,
    /// Counters and point exclusions.
    pub summary: RunSummary,
}

/// Matches every point and stages the ones whose market changed.
#[must_use]
pub fn plan_assignments<M: MarketMatcher + ?Sized>(
    matcher: &M,
    kind: PointKind,
    points: &[LocatablePoint],
    progress: &dyn ProgressCallback,
) -> AssignmentPlan {
    let mut summary = RunSummary::default();
    let mut updates = Vec::new();

    progress.set_total(points.len() as u64);

    for point in points {
        summary.considered += 1;
        if summary.considered % PROGRESS_STEP == 0 {
            progress.inc(PROGRESS_STEP);
        }

        let Some((lat, lng)) = point.lat_lng() else {
            log::debug!("{kind} {}: no coordinates, skipping", point.id);
            summary.skipped += 1;
            summary
                .exclusions
                .push(Exclusion::new(point.id, ExclusionReason::MissingCoordinates));
            continue;
        };

        let at = LatLng::new(lat, lng);
        if !at.is_valid() {
            log::debug!("{kind} {}: coordinates ({lat}, {lng}) out of range", point.id);
            summary.skipped += 1;
            summary.exclusions.push(Exclusion::with_detail(
                point.id,
                ExclusionReason::MissingCoordinates,
                format!("out of range: ({lat}, {lng})"),
            ));
            continue;
        }

        let Some(found) = matcher.match_point(at) else {
            summary.skipped += 1;
            summary
                .exclusions
                .push(Exclusion::new(point.id, ExclusionReason::NoMatch));
            continue;
        };

        if point.market_id == Some(found.market_id) {
            summary.unchanged += 1;
            continue;
        }

        updates.push(AssignmentUpdate {
            point_id: point.id,
            previous: point.market_id,
            market_id: found.market_id,
            distance_km: found.distance_km,
        });
    }

    summary.updated = updates.len() as u64;
    progress.finish(format!(
        "{} {kind} point(s): {} to update, {} unchanged, {} skipped",
        summary.considered, summary.updated, summary.unchanged, summary.skipped
    ));

    AssignmentPlan {
        kind,
        strategy: matcher.strategy(),
        updates,
        summary,
    }
}

/// Persists a plan's updates in one batch.
///
/// Returns the number of rows the store reports as written. Nothing is
/// written when the plan has no updates.
///
/// # Errors
///
/// Returns [`AssignError::Store`] if the batch fails. The store is
/// expected to leave no partial state behind.
pub fn write_plan<S: AssignmentStore + ?Sized>(
    store: &mut S,
    plan: &AssignmentPlan,
) -> Result<u64, AssignError> {
    if plan.updates.is_empty() {
        log::info!(
            "No updates required; all {} points are correctly mapped",
            plan.kind
        );
        return Ok(0);
    }

    let written = store
        .apply_assignments(plan.kind, &plan.updates)
        .map_err(|e| AssignError::Store {
            operation: "apply assignments",
            source: Box::new(e),
        })?;

    if written != plan.updates.len() as u64 {
        log::warn!(
            "Store wrote {written} of {} staged {} assignment(s)",
            plan.updates.len(),
            plan.kind
        );
    }

    log::info!("Updated {written} {} point(s)", plan.kind);

    Ok(written)
}
