//! Strict loading and saving of cleaned tables. A cleaned event log must be
//! fully typed; anything malformed here is a hard failure.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use funnel_core::types::EVENT_COLUMNS;
use funnel_core::{Event, EventLog, FunnelError, FunnelResult, FunnelStage, Product, ProductCatalog};
use tracing::debug;

use crate::table::{parse_timestamp, RawTable};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column names accepted for the event kind, canonical first.
pub(crate) const EVENT_KIND_COLUMNS: [&str; 2] = ["event_type", "event_kind"];

pub fn load_event_log(path: &Path) -> FunnelResult<EventLog> {
    let log = read_event_log(File::open(path)?)?;
    debug!(path = %path.display(), events = log.len(), "Event log loaded");
    Ok(log)
}

pub fn read_event_log<R: Read>(rdr: R) -> FunnelResult<EventLog> {
    event_log_from_table(&RawTable::from_reader(rdr)?)
}

/// Types every row of a cleaned event table. Columns outside the fixed event
/// schema become segment attributes.
pub fn event_log_from_table(table: &RawTable) -> FunnelResult<EventLog> {
    let session_idx = table.require_column(&["session_id"])?;
    let kind_idx = table.require_column(&EVENT_KIND_COLUMNS)?;
    let ts_idx = table.require_column(&["timestamp"])?;
    let event_id_idx = table.column("event_id");
    let user_idx = table.column("user_id");
    let product_idx = table.column("product_id");
    let quantity_idx = table.column("quantity");

    let segment_cols: Vec<(usize, &str)> = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| !EVENT_COLUMNS.contains(&h.as_str()) && !EVENT_KIND_COLUMNS.contains(&h.as_str()))
        .map(|(i, h)| (i, h.as_str()))
        .collect();

    let mut events = Vec::with_capacity(table.len());
    for (i, row) in table.rows().iter().enumerate() {
        let row_no = i + 1;
        let session_id = RawTable::cell(row, Some(session_idx))
            .ok_or_else(|| FunnelError::Validation(format!("empty session_id at row {row_no}")))?;

        let raw_kind = RawTable::cell(row, Some(kind_idx)).unwrap_or_default();
        let kind: FunnelStage = raw_kind.parse().map_err(|_| FunnelError::UnknownEventKind {
            row: row_no,
            value: raw_kind.to_string(),
        })?;

        let raw_ts = RawTable::cell(row, Some(ts_idx)).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| FunnelError::InvalidTimestamp {
            row: row_no,
            value: raw_ts.to_string(),
        })?;

        let quantity = match RawTable::cell(row, quantity_idx) {
            Some(q) => q.parse::<u32>().map_err(|_| {
                FunnelError::Validation(format!("invalid quantity `{q}` at row {row_no}"))
            })?,
            None => 1,
        };

        let segments: BTreeMap<String, String> = segment_cols
            .iter()
            .filter_map(|&(idx, name)| {
                RawTable::cell(row, Some(idx)).map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        events.push(Event {
            event_id: RawTable::cell(row, event_id_idx).map(str::to_string),
            session_id: session_id.to_string(),
            user_id: RawTable::cell(row, user_idx).map(str::to_string),
            kind,
            timestamp,
            product_id: RawTable::cell(row, product_idx).map(str::to_string),
            quantity,
            segments,
        });
    }

    // the kind column is recorded under its canonical name
    let columns = table
        .headers()
        .iter()
        .map(|h| match h.as_str() {
            h if EVENT_KIND_COLUMNS.contains(&h) => EVENT_KIND_COLUMNS[0].to_string(),
            h => h.to_string(),
        })
        .collect();
    Ok(EventLog::new(columns, events))
}

/// Writes the event log with the fixed event columns first, then its segment
/// columns in schema order.
pub fn write_event_log<W: Write>(log: &EventLog, writer: W) -> FunnelResult<()> {
    let segment_cols = log.segment_columns();
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(EVENT_COLUMNS.iter().copied().chain(segment_cols.iter().copied()))?;

    for event in log.events() {
        let mut record: Vec<String> = vec![
            event.event_id.clone().unwrap_or_default(),
            event.session_id.clone(),
            event.user_id.clone().unwrap_or_default(),
            event.kind.as_str().to_string(),
            event.product_id.clone().unwrap_or_default(),
            event.quantity.to_string(),
            event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ];
        record.extend(
            segment_cols
                .iter()
                .map(|c| event.segments.get(*c).cloned().unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_event_log(log: &EventLog, path: &Path) -> FunnelResult<()> {
    ensure_parent(path)?;
    write_event_log(log, File::create(path)?)
}

pub fn read_products<R: Read>(rdr: R) -> FunnelResult<ProductCatalog> {
    let mut rdr = csv::Reader::from_reader(rdr);
    let mut products = Vec::new();
    for res in rdr.deserialize() {
        let product: Product = res?;
        products.push(product);
    }
    Ok(ProductCatalog::new(products))
}

pub fn load_products(path: &Path) -> FunnelResult<ProductCatalog> {
    read_products(File::open(path)?)
}

pub fn write_products<W: Write>(products: &[Product], writer: W) -> FunnelResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for product in products {
        wtr.serialize(product)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_products(products: &[Product], path: &Path) -> FunnelResult<()> {
    ensure_parent(path)?;
    write_products(products, File::create(path)?)
}

pub(crate) fn ensure_parent(path: &Path) -> FunnelResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
