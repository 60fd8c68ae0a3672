//! Plain-text summaries printed after each command.

use catchment_map_assign::RunReport;
use catchment_map_database::catalog_db::CatalogSummary;
use catchment_map_ingest_models::{ImportLayout, ImportReport, LayoutTarget};
use catchment_map_market_models::ExclusionReason;

/// Reasons listed after a run, markets first.
const REASONS: &[ExclusionReason] = &[
    ExclusionReason::InvalidGeometry,
    ExclusionReason::UnparseableCentroid,
    ExclusionReason::MissingCoordinates,
    ExclusionReason::NoMatch,
];

pub fn print_layouts(layouts: &[ImportLayout]) {
    println!("{:<22} {:<20} {:<8} NAME", "ID", "TARGET", "ENCODING");
    println!("{}", "-".repeat(72));
    for layout in layouts {
        let target = match &layout.target {
            LayoutTarget::Markets { .. } => "markets".to_string(),
            LayoutTarget::Points { point_kind, .. } => point_kind.to_string(),
        };
        println!(
            "{:<22} {:<20} {:<8} {}",
            layout.id, target, layout.encoding, layout.name
        );
    }
}

pub fn print_import(label: &str, report: &ImportReport) {
    println!("{label}");
    println!("  Rows read:           {}", report.rows_read);
    println!("  Imported:            {}", report.imported);
    println!("  Skipped:             {}", report.skipped);
    if report.non_standard_names > 0 {
        println!("  Non-standard names:  {}", report.non_standard_names);
    }
    println!("  Without location:    {}", report.without_location);
    println!("  Elapsed:             {:.1}s", report.duration.as_secs_f64());
}

pub fn print_run(report: &RunReport) {
    let summary = &report.summary;
    let mode = if report.options.dry_run {
        " (dry run)"
    } else {
        ""
    };

    println!(
        "Assigned {} by {}{mode}",
        report.options.kind, report.options.strategy
    );
    println!("  Markets loaded:      {}", report.markets_loaded);
    println!("  Points considered:   {}", summary.considered);
    println!("  Updated:             {}", summary.updated);
    println!("  Unchanged:           {}", summary.unchanged);
    println!("  Skipped:             {}", summary.skipped);
    println!("  Rows written:        {}", report.written);

    for &reason in REASONS {
        let ids = summary.ids_for(reason);
        if !ids.is_empty() {
            println!("  {reason} ({}): {}", ids.len(), join_ids(&ids));
        }
    }
}

pub fn print_catalog(summary: &CatalogSummary) {
    println!("Markets:               {}", summary.markets);
    println!("  Standard names:      {}", summary.standard_names);
    println!("  With boundary:       {}", summary.with_boundary);
    println!("  With centroid:       {}", summary.with_centroid);
    println!("  With store:          {}", summary.with_store);
    println!(
        "Stores:                {} ({} assigned)",
        summary.stores, summary.stores_assigned
    );
    println!(
        "Approved properties:   {} ({} assigned)",
        summary.properties, summary.properties_assigned
    );
}

pub fn print_reported_circles(counts: &[(String, u64)]) {
    if counts.is_empty() {
        return;
    }
    println!("Reported circles:");
    for (circle, n) in counts {
        println!("  {circle:<20} {n}");
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
