//! Report export — writes analysis tables into the outputs directory as CSV
//! or JSON.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use funnel_core::config::OutputFormat;
use funnel_core::FunnelResult;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::funnel::{SegmentConversion, SegmentedFunnel};

pub const FUNNEL_COUNTS: &str = "funnel_counts";
pub const FUNNEL_CONVERSION_RATES: &str = "funnel_conversion_rates";
pub const TOP_PRODUCTS: &str = "top_products";
pub const REVENUE_BY_CATEGORY: &str = "revenue_by_category";
pub const DAILY_REVENUE: &str = "daily_revenue";
pub const KPIS: &str = "kpis";
pub const REVENUE_HEATMAP: &str = "revenue_heatmap";
pub const CLEANING_SUMMARY: &str = "cleaning_summary";

const SEGMENTED_COLUMNS: [&str; 5] = [
    "stage",
    "count",
    "conversion_from_visit_pct",
    "conversion_from_previous_stage_pct",
    "drop_off_from_previous_pct",
];

pub struct ReportWriter {
    dir: PathBuf,
    format: OutputFormat,
}

impl ReportWriter {
    /// Creates the output directory if needed.
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> FunnelResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.format.extension()))
    }

    pub fn write_table<T: Serialize>(&self, name: &str, rows: &[T]) -> FunnelResult<PathBuf> {
        let path = self.path_for(name);
        let file = File::create(&path)?;
        match self.format {
            OutputFormat::Csv => write_csv(file, rows)?,
            OutputFormat::Json => serde_json::to_writer_pretty(file, rows)?,
        }
        info!(table = name, rows = rows.len(), path = %path.display(), "Table written");
        Ok(path)
    }

    /// Writes `funnel_by_<attribute>`. In both formats the segment value is
    /// keyed by the attribute name (`device`, `region`, ...).
    pub fn write_segmented(&self, funnel: &SegmentedFunnel) -> FunnelResult<PathBuf> {
        let name = format!("funnel_by_{}", funnel.attribute);
        let path = self.path_for(&name);
        let file = File::create(&path)?;
        match self.format {
            OutputFormat::Csv => write_segmented_csv(file, funnel)?,
            OutputFormat::Json => write_segmented_json(file, funnel)?,
        }
        info!(table = %name, rows = funnel.rows.len(), path = %path.display(), "Table written");
        Ok(path)
    }

    /// Writes a single value as pretty JSON regardless of the table format.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> FunnelResult<PathBuf> {
        let path = self.dir.join(format!("{name}.json"));
        let mut file = File::create(&path)?;
        serde_json::to_writer_pretty(&mut file, value)?;
        file.write_all(b"\n")?;
        info!(path = %path.display(), "JSON written");
        Ok(path)
    }
}

pub fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> FunnelResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_segmented_csv<W: Write>(writer: W, funnel: &SegmentedFunnel) -> FunnelResult<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(SEGMENTED_COLUMNS.iter().copied().chain([funnel.attribute.as_str()]))?;
    for row in &funnel.rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_segmented_json<W: Write>(writer: W, funnel: &SegmentedFunnel) -> FunnelResult<()> {
    let rows: Vec<AttributeRow<'_>> = funnel
        .rows
        .iter()
        .map(|row| AttributeRow {
            attribute: &funnel.attribute,
            row,
        })
        .collect();
    serde_json::to_writer_pretty(writer, &rows)?;
    Ok(())
}

/// A segment row whose segment field is named after its attribute.
struct AttributeRow<'a> {
    attribute: &'a str,
    row: &'a SegmentConversion,
}

impl Serialize for AttributeRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SEGMENTED_COLUMNS.len() + 1))?;
        map.serialize_entry("stage", &self.row.stage)?;
        map.serialize_entry("count", &self.row.count)?;
        map.serialize_entry("conversion_from_visit_pct", &self.row.conversion_from_visit_pct)?;
        map.serialize_entry(
            "conversion_from_previous_stage_pct",
            &self.row.conversion_from_previous_stage_pct,
        )?;
        map.serialize_entry("drop_off_from_previous_pct", &self.row.drop_off_from_previous_pct)?;
        map.serialize_entry(self.attribute, &self.row.segment)?;
        map.end()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
