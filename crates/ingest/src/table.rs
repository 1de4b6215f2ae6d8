//! Untyped CSV tables. Every cell is kept as text so cleaning can decide
//! what to coerce and what to drop.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use funnel_core::{FunnelError, FunnelResult};

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Reads a CSV with a header row. Ragged rows are accepted; missing
    /// trailing cells read as empty.
    pub fn from_reader<R: Read>(rdr: R) -> FunnelResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(rdr);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path) -> FunnelResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of the first present column among `names`, or a schema error
    /// naming the first alternative.
    pub fn require_column(&self, names: &[&str]) -> FunnelResult<usize> {
        names
            .iter()
            .find_map(|name| self.column(name))
            .ok_or_else(|| FunnelError::MissingColumn(names.first().copied().unwrap_or_default().into()))
    }

    /// Trimmed cell value; empty and missing cells are `None`.
    pub fn cell(row: &[String], idx: Option<usize>) -> Option<&str> {
        idx.and_then(|i| row.get(i))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Parses the timestamp layouts seen in exported event logs. Date-only
/// values are read as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    for layout in LAYOUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
