#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Market name hierarchy parser.
//!
//! Encoded market names look like
//! `Telangana_Hyderabad(55/290)_Kukatpally(3/12)_Market 1`: an
//! underscore-delimited path of circle, hub, city, and market level, where
//! the hub and city segments may carry a `(rank/total)` pair.
//!
//! Segments are anchored from the end of the name, so any number of extra
//! prefix tokens before the circle are tolerated. The import path and the
//! re-parse path both call [`parse_market_name`]; neither derives these
//! fields on its own.

use std::sync::LazyLock;

use catchment_map_market_models::{Market, MarketDetails};
use regex::Regex;
use thiserror::Error;

/// Minimum number of `_` segments in a standard market name.
pub const MIN_SEGMENTS: usize = 4;

/// `(rank/total)` anywhere in a segment.
static RANK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((?P<rank>\d+)/(?P<total>\d+)\)").unwrap_or_else(|_| unreachable!())
});

/// Leading presentation noise on circle names taken from slide text,
/// e.g. `"BD PPT Telangana"`.
static CIRCLE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:add|bd|presentation|ppt)\b[\s:\-]*)+").unwrap_or_else(|_| unreachable!())
});

/// Diagnostics for names that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MarketNameError {
    /// Fewer than [`MIN_SEGMENTS`] underscore-delimited segments.
    #[error("market name has {found} segment(s), expected at least {MIN_SEGMENTS}")]
    TooFewSegments {
        /// Number of segments found.
        found: usize,
    },
}

/// Where the encoded name came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameContext {
    /// Catchment export or stored catalog row. Circle is used as-is.
    #[default]
    Catalog,
    /// Text scraped from a presentation. Known prefix tokens are stripped
    /// from the circle.
    SlideText,
}

/// Result of parsing an encoded market name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarketName {
    /// Derived fields. All `None` when [`Self::error`] is set.
    pub details: MarketDetails,
    /// Set when the name is non-standard.
    pub error: Option<MarketNameError>,
}

impl ParsedMarketName {
    /// Returns `true` when the name had enough segments to parse.
    #[must_use]
    pub const fn is_standard(&self) -> bool {
        self.error.is_none()
    }
}

/// A `(rank/total)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOfTotal {
    /// Position within the parent level.
    pub rank: u32,
    /// Number of siblings in the parent level.
    pub total: u32,
}

/// Extracts the first `(rank/total)` pair from a segment.
///
/// Returns `None` when there is no pair or either number overflows.
#[must_use]
pub fn extract_rank(segment: &str) -> Option<RankOfTotal> {
    let caps = RANK_RE.captures(segment)?;
    let rank = caps.name("rank")?.as_str().parse().ok()?;
    let total = caps.name("total")?.as_str().parse().ok()?;
    Some(RankOfTotal { rank, total })
}

/// Text before the first `(`, trimmed. Empty results become `None`.
#[must_use]
pub fn label_before_paren(segment: &str) -> Option<String> {
    let label = segment.split('(').next().unwrap_or_default().trim();
    non_empty(label)
}

/// Strips leading `Add`, `BD`, `Presentation`, and `PPT` tokens
/// (case-insensitive, whole words, repeated).
#[must_use]
pub fn strip_circle_prefixes(circle: &str) -> &str {
    let trimmed = circle.trim();
    CIRCLE_PREFIX_RE
        .find(trimmed)
        .map_or(trimmed, |m| trimmed[m.end()..].trim())
}

/// Parses a catalog market name.
#[must_use]
pub fn parse_market_name(name: &str) -> ParsedMarketName {
    parse_market_name_in(name, NameContext::Catalog)
}

/// Parses an encoded market name in the given context.
///
/// Never fails: a name with fewer than [`MIN_SEGMENTS`] segments is logged
/// as non-standard and yields empty details plus a [`MarketNameError`].
#[must_use]
pub fn parse_market_name_in(name: &str, context: NameContext) -> ParsedMarketName {
    let segments: Vec<&str> = name.split('_').collect();
    let n = segments.len();

    if n < MIN_SEGMENTS {
        log::warn!(
            "Non-standard market name {name:?}: {n} segment(s), expected at least {MIN_SEGMENTS}"
        );
        return ParsedMarketName {
            details: MarketDetails::default(),
            error: Some(MarketNameError::TooFewSegments { found: n }),
        };
    }

    let circle_seg = segments[n - 4];
    let hub_seg = segments[n - 3];
    let city_seg = segments[n - 2];
    let level_seg = segments[n - 1];

    let circle = match context {
        NameContext::Catalog => circle_seg.trim(),
        NameContext::SlideText => strip_circle_prefixes(circle_seg),
    };

    let hub_rank = extract_rank(hub_seg);
    let city_rank = extract_rank(city_seg);

    ParsedMarketName {
        details: MarketDetails {
            circle: non_empty(circle),
            hub_name: label_before_paren(hub_seg),
            city: label_before_paren(city_seg),
            level_name: non_empty(level_seg.trim()),
            hub_rank: hub_rank.map(|r| r.rank),
            hub_total: hub_rank.map(|r| r.total),
            city_rank: city_rank.map(|r| r.rank),
            city_total: city_rank.map(|r| r.total),
        },
        error: None,
    }
}

/// Re-parses a stored market and returns the new parse only if it differs
/// from what is stored.
#[must_use]
pub fn reparse_if_changed(market: &Market) -> Option<ParsedMarketName> {
    let parsed = parse_market_name(&market.name);
    if parsed.details == market.details && parsed.is_standard() == market.name_standard {
        None
    } else {
        Some(parsed)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
