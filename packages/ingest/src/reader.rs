//! Spreadsheet export reading.
//!
//! Exports are read as raw byte records so Latin-1 files decode correctly.
//! Header names are trimmed, and lookups fall back to a case-insensitive
//! match because exported headers drift in case and spacing.

use std::collections::BTreeMap;
use std::io::Read;

use catchment_map_ingest_models::TextEncoding;

use crate::IngestError;

/// A decoded export: trimmed headers plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: BTreeMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Data rows in file order, blank rows removed.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of a column by header name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.get(name).copied().or_else(|| {
            self.headers
                .iter()
                .find(|(h, _)| h.eq_ignore_ascii_case(name))
                .map(|(_, &i)| i)
        })
    }

    /// Index of a column the layout requires.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MissingColumn`] if the header is absent.
    pub fn require(&self, layout: &str, name: &str) -> Result<usize, IngestError> {
        self.find(name).ok_or_else(|| IngestError::MissingColumn {
            layout: layout.to_string(),
            column: name.to_string(),
        })
    }

    /// Index of an optional column. A configured but absent column is
    /// logged and treated as unmapped.
    #[must_use]
    pub fn optional(&self, layout: &str, name: Option<&str>) -> Option<usize> {
        let name = name?;
        let found = self.find(name);
        if found.is_none() {
            log::warn!("Layout {layout}: column {name:?} not found, leaving it empty");
        }
        found
    }
}

/// Returns the trimmed cell at `index`, or `None` when the column is
/// unmapped, the row is short, or the cell is blank.
#[must_use]
pub fn cell(row: &[String], index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Reads an export, discarding `skip_rows` non-blank rows before the
/// header. Blank rows are dropped wherever they appear.
///
/// # Errors
///
/// Returns [`IngestError`] if the CSV is malformed or has no header row.
pub fn read_table<R: Read>(
    reader: R,
    encoding: TextEncoding,
    skip_rows: usize,
) -> Result<Table, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = csv_reader
        .byte_records()
        .filter(|record| !matches!(record, Ok(r) if r.iter().all(<[u8]>::is_empty)))
        .skip(skip_rows);

    let header_record = records.next().ok_or(IngestError::NoHeader)??;

    let mut headers = BTreeMap::new();
    for (i, field) in header_record.iter().enumerate() {
        let name = decode(field, encoding).trim().to_string();
        if !name.is_empty() {
            headers.entry(name).or_insert(i);
        }
    }

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        let row: Vec<String> = record.iter().map(|f| decode(f, encoding)).collect();
        if row.iter().any(|v| !v.trim().is_empty()) {
            rows.push(row);
        }
    }

    Ok(Table { headers, rows })
}

/// Decodes one field.
#[must_use]
pub fn decode(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Parses a number from a spreadsheet cell.
///
/// Blank, `-`, and `None` are treated as missing. Thousands separators
/// are removed. Anything else that does not parse is missing too.
#[must_use]
pub fn clean_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if matches!(trimmed, "" | "-" | "None") {
        return None;
    }
    trimmed
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parses an integer id, accepting a trailing `.0` left by spreadsheets.
#[must_use]
pub fn clean_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_latin1_bytes() {
        // 0xE9 is é in Latin-1.
        let text = decode(b"Mysore caf\xe9", TextEncoding::Latin1);
        assert_eq!(text, "Mysore café");
    }

    #[test]
    fn utf8_replaces_invalid_bytes() {
        let text = decode(b"caf\xe9", TextEncoding::Utf8);
        assert_eq!(text, "caf\u{FFFD}");
    }

    #[test]
    fn headers_are_trimmed_and_case_insensitive() {
        let csv = " Market_ID , Market_Name\n1,A_B_C_D\n";
        let table = read_table(csv.as_bytes(), TextEncoding::Utf8, 0).unwrap();
        assert_eq!(table.find("Market_ID"), Some(0));
        assert_eq!(table.find("market_name"), Some(1));
        assert_eq!(table.rows().len(), 1);
        assert!(matches!(
            table.require("catchments", "Market_Geometry"),
            Err(IngestError::MissingColumn { .. })
        ));
    }

    #[test]
    fn skips_leading_rows_and_blank_lines() {
        let csv = "Sales,,Footfall\n\nStore ID,Latitude\n1,20.1\n,\n2,20.2\n";
        let table = read_table(csv.as_bytes(), TextEncoding::Utf8, 1).unwrap();
        assert_eq!(table.find("Store ID"), Some(0));
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[1][0], "2");
    }

    #[test]
    fn blank_rows_before_the_banner_are_not_counted() {
        let csv = ",,\n,,\nSales,,Footfall\nStore Code,Latitude\nLK001,20.1\n";
        let table = read_table(csv.as_bytes(), TextEncoding::Utf8, 1).unwrap();
        assert_eq!(table.find("Store Code"), Some(0));
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn empty_file_has_no_header() {
        assert!(matches!(
            read_table("".as_bytes(), TextEncoding::Utf8, 0),
            Err(IngestError::NoHeader)
        ));
    }

    #[test]
    fn quoted_wkt_survives_commas() {
        let csv = "id,geom\n1,\"POLYGON ((0 0, 1 0, 1 1, 0 0))\"\n";
        let table = read_table(csv.as_bytes(), TextEncoding::Utf8, 0).unwrap();
        assert_eq!(
            cell(&table.rows()[0], table.find("geom")),
            Some("POLYGON ((0 0, 1 0, 1 1, 0 0))")
        );
    }

    #[test]
    fn cleans_numbers() {
        assert_eq!(clean_number(" 20.3208 "), Some(20.3208));
        assert_eq!(clean_number("1,234.5"), Some(1234.5));
        assert_eq!(clean_number("-"), None);
        assert_eq!(clean_number("None"), None);
        assert_eq!(clean_number(""), None);
        assert_eq!(clean_number("n/a"), None);
        assert_eq!(clean_number("-12.5"), Some(-12.5));
    }

    #[test]
    fn cleans_ids() {
        assert_eq!(clean_id("42"), Some(42));
        assert_eq!(clean_id(" 42.0 "), Some(42));
        assert_eq!(clean_id("ST-42"), None);
    }

    #[test]
    fn cell_treats_blank_and_missing_alike() {
        let row = vec!["a".to_string(), "  ".to_string()];
        assert_eq!(cell(&row, Some(0)), Some("a"));
        assert_eq!(cell(&row, Some(1)), None);
        assert_eq!(cell(&row, Some(5)), None);
        assert_eq!(cell(&row, None), None);
    }
}
