#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the catchment map toolchain.
//!
//! Imports catchment exports and point masters into the `DuckDB` catalog,
//! maintains derived market fields, and assigns stores and approved
//! properties to markets.

mod report;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use catchment_map_assign::progress::ProgressCallback;
use catchment_map_assign::{RunOptions, run};
use catchment_map_cli_utils::{IndicatifProgress, MultiProgress};
use catchment_map_database::catalog_db::{self, CatalogStore};
use catchment_map_ingest::{
    all_layouts, compute_centroids, import_markets, import_points, import_properties, layout,
    market_layout, point_layout, reparse_markets,
};
use catchment_map_market_models::PointKind;
use catchment_map_spatial::{IndexBackend, Strategy};
use clap::{Parser, Subcommand};
use duckdb::Connection;

#[derive(Parser)]
#[command(name = "catchment_map_cli", about = "Market catchment assignment tool")]
struct Cli {
    /// Catalog database path (overrides `CATCHMENT_MAP_DB`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a catchment export (market names, boundaries, metadata)
    ImportMarkets {
        /// Path to the CSV export
        csv: PathBuf,
        /// Import layout id (see `layouts`)
        #[arg(long)]
        layout: Option<String>,
    },
    /// Import a store master or approved-property spreadsheet
    ImportPoints {
        /// Path to the CSV export
        csv: PathBuf,
        /// Point kind: `store` or `approved-property`
        #[arg(long, default_value_t = PointKind::Store)]
        kind: PointKind,
        /// Import layout id; defaults to the registered layout for `--kind`
        #[arg(long)]
        layout: Option<String>,
    },
    /// Import a saved approved-property API payload (`{"data": [...]}`)
    ImportProperties {
        /// Path to the JSON payload
        json: PathBuf,
    },
    /// Re-parse every stored market name and write back changed fields
    ParseMarkets,
    /// Derive market centroids from boundaries
    Centroids {
        /// Recompute centroids that already exist
        #[arg(long)]
        force: bool,
    },
    /// Assign points to markets
    Assign {
        /// Point kind to assign; all kinds when omitted
        #[arg(long)]
        kind: Option<PointKind>,
        /// Matching strategy: `containment` or `nearest-centroid`
        #[arg(long, default_value_t = Strategy::Containment)]
        strategy: Strategy,
        /// Containment candidate lookup: `linear` or `rtree`
        #[arg(long, default_value_t = IndexBackend::Linear)]
        backend: IndexBackend,
        /// Plan and report without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List the registered import layouts
    Layouts,
    /// Print catalog counts
    Summary,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = catchment_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Layouts => {
            report::print_layouts(&all_layouts());
        }
        Commands::Summary => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            report::print_catalog(&catalog_db::summary(&conn)?);
            report::print_reported_circles(&catalog_db::reported_circle_counts(&conn)?);
        }
        Commands::ImportMarkets { csv, layout: id } => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            let import_layout = id.map_or_else(market_layout, |id| layout(&id))?;
            let progress = IndicatifProgress::records_bar(&multi, "Reading catchments");
            let result =
                import_markets(&conn, open_input(&csv)?, &import_layout, progress.as_ref())?;
            report::print_import(&import_layout.name, &result);
        }
        Commands::ImportPoints {
            csv,
            kind,
            layout: id,
        } => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            let import_layout = id.map_or_else(|| point_layout(kind), |id| layout(&id))?;
            let progress = IndicatifProgress::records_bar(&multi, "Reading points");
            let result =
                import_points(&conn, open_input(&csv)?, &import_layout, progress.as_ref())?;
            report::print_import(&import_layout.name, &result);
        }
        Commands::ImportProperties { json } => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            let progress = IndicatifProgress::records_bar(&multi, "Reading property payload");
            let result = import_properties(&conn, open_input(&json)?, progress.as_ref())?;
            report::print_import("Approved property payload", &result);
        }
        Commands::ParseMarkets => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            let progress = IndicatifProgress::records_bar(&multi, "Parsing market names");
            let result = reparse_markets(&conn, progress.as_ref())?;
            println!(
                "Examined {} market(s): {} updated, {} non-standard name(s)",
                result.examined, result.updated, result.non_standard
            );
        }
        Commands::Centroids { force } => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            let progress = IndicatifProgress::records_bar(&multi, "Computing centroids");
            let result = compute_centroids(&conn, force, progress.as_ref())?;
            println!(
                "{} market(s) with boundaries: {} centroid(s) written, {} kept, {} failed",
                result.with_boundary, result.updated, result.kept, result.failed
            );
        }
        Commands::Assign {
            kind,
            strategy,
            backend,
            dry_run,
        } => {
            let conn = catalog_db::open_default(cli.db.as_deref())?;
            let kinds = kind.map_or_else(|| PointKind::ALL.to_vec(), |k| vec![k]);
            assign_kinds(&multi, &conn, &kinds, strategy, backend, dry_run)?;
        }
    }

    Ok(())
}

fn open_input(path: &Path) -> Result<BufReader<File>, std::io::Error> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

fn assign_kinds(
    multi: &MultiProgress,
    conn: &Connection,
    kinds: &[PointKind],
    strategy: Strategy,
    backend: IndexBackend,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let steps = IndicatifProgress::steps_bar(multi, "Point kinds", kinds.len() as u64);
    let mut store = CatalogStore::new(conn);

    for &kind in kinds {
        steps.set_message(format!("Assigning {kind}"));
        let progress = IndicatifProgress::records_bar(multi, &format!("Assigning {kind}"));
        let options = RunOptions {
            kind,
            strategy,
            backend,
            dry_run,
        };
        let result = run(&mut store, options, progress.as_ref())?;
        report::print_run(&result);
        steps.inc(1);
    }

    steps.finish("Assignment complete".to_string());
    Ok(())
}
