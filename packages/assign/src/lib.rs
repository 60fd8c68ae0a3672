#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point-to-market assignment runs.
//!
//! A run loads every market and every point of one kind from an
//! [`AssignmentStore`], builds the matcher for the requested
//! [`Strategy`], plans which points changed market, and writes the changes
//! back in one batch. Markets and points that cannot be used are reported
//! in the returned [`RunReport`] rather than failing the run.

pub mod progress;
pub mod writer;

use std::time::Instant;

use catchment_map_market_models::{Exclusion, LocatablePoint, Market, PointKind, RunSummary};
use catchment_map_spatial::{
    CentroidSet, IndexBackend, MarketMatcher, SpatialError, SpatialIndex, Strategy,
};
use thiserror::Error;

use crate::progress::ProgressCallback;
pub use crate::writer::{AssignmentPlan, AssignmentUpdate, plan_assignments, write_plan};

/// Boxed error returned by a store implementation.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort an assignment run.
#[derive(Debug, Error)]
pub enum AssignError {
    /// The matcher could not be built.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Reading from or writing to the store failed.
    #[error("failed to {operation}: {source}")]
    Store {
        /// What was being attempted.
        operation: &'static str,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

/// Persistent source and sink for assignment runs.
pub trait AssignmentStore {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// All markets, in stable catalog order.
    ///
    /// # Errors
    ///
    /// Returns an error if the markets cannot be read.
    fn markets(&self) -> Result<Vec<Market>, Self::Error>;

    /// All points of one kind, with their current assignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the points cannot be read.
    fn points(&self, kind: PointKind) -> Result<Vec<LocatablePoint>, Self::Error>;

    /// Writes every update as one atomic batch and returns the number of
    /// rows written. A failure must leave no update applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch fails.
    fn apply_assignments(
        &mut self,
        kind: PointKind,
        updates: &[AssignmentUpdate],
    ) -> Result<u64, Self::Error>;
}

/// Parameters for one assignment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Which points to assign.
    pub kind: PointKind,
    /// How points are matched to markets.
    pub strategy: Strategy,
    /// Candidate lookup for containment runs.
    pub backend: IndexBackend,
    /// Plan without writing.
    pub dry_run: bool,
}

/// Outcome of one assignment run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Options the run used.
    pub options: RunOptions,
    /// Markets the matcher was built from.
    pub markets_loaded: usize,
    /// Counters plus market and point exclusions, markets first.
    pub summary: RunSummary,
    /// The staged updates, written unless `options.dry_run` is set.
    pub updates: Vec<AssignmentUpdate>,
    /// Rows written to the store.
    pub written: u64,
}

impl RunReport {
    /// Market exclusions only.
    #[must_use]
    pub fn excluded_markets(&self) -> Vec<&Exclusion> {
        self.summary
            .exclusions
            .iter()
            .filter(|e| e.reason.is_market())
            .collect()
    }

    /// Point exclusions only.
    #[must_use]
    pub fn skipped_points(&self) -> Vec<&Exclusion> {
        self.summary
            .exclusions
            .iter()
            .filter(|e| !e.reason.is_market())
            .collect()
    }
}

/// Builds the matcher for `strategy` from the given markets.
///
/// # Errors
///
/// Returns [`SpatialError`] if no market is usable for the strategy.
pub fn build_matcher(
    markets: &[Market],
    strategy: Strategy,
    backend: IndexBackend,
) -> Result<(Box<dyn MarketMatcher>, Vec<Exclusion>), SpatialError> {
    Ok(match strategy {
        Strategy::Containment => {
            let built = SpatialIndex::build(markets, backend)?;
            (Box::new(built.matcher), built.excluded)
        }
        Strategy::NearestCentroid => {
            let built = CentroidSet::build(markets)?;
            (Box::new(built.matcher), built.excluded)
        }
    })
}

/// Runs one assignment pass against `store`.
///
/// The store is only written when at least one point changed market and
/// `dry_run` is off. If the matcher cannot be built, the run stops before
/// any point is read.
///
/// # Errors
///
/// Returns [`AssignError::Spatial`] if no market is usable, or
/// [`AssignError::Store`] if the store fails.
pub fn run<S: AssignmentStore + ?Sized>(
    store: &mut S,
    options: RunOptions,
    progress: &dyn ProgressCallback,
) -> Result<RunReport, AssignError> {
    let start = Instant::now();

    let markets = store.markets().map_err(|e| AssignError::Store {
        operation: "load markets",
        source: Box::new(e),
    })?;

    let (matcher, market_exclusions) =
        build_matcher(&markets, options.strategy, options.backend)?;

    let points = store.points(options.kind).map_err(|e| AssignError::Store {
        operation: "load points",
        source: Box::new(e),
    })?;

    log::info!(
        "Assigning {} {} point(s) to {} market(s) by {}",
        points.len(),
        options.kind,
        matcher.len(),
        options.strategy
    );

    progress.set_message(format!("Assigning {}", options.kind));
    let mut plan = plan_assignments(matcher.as_ref(), options.kind, &points, progress);

    let written = if options.dry_run {
        log::info!(
            "Dry run: {} {} assignment(s) not written",
            plan.updates.len(),
            options.kind
        );
        0
    } else {
        write_plan(store, &plan)?
    };

    let mut exclusions = market_exclusions;
    exclusions.append(&mut plan.summary.exclusions);
    plan.summary.exclusions = exclusions;

    log::info!(
        "Assignment of {} finished in {:.1}s: {} updated, {} unchanged, {} skipped",
        options.kind,
        start.elapsed().as_secs_f64(),
        plan.summary.updated,
        plan.summary.unchanged,
        plan.summary.skipped
    );

    Ok(RunReport {
        options,
        markets_loaded: matcher.len(),
        summary: plan.summary,
        updates: plan.updates,
        written,
    })
}
