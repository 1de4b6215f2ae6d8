//! Raw table cleaning — event type normalization, timestamp sanity checks,
//! de-duplication, and default segment values.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime, NaiveTime};
use funnel_core::config::CleaningConfig;
use funnel_core::types::{DEFAULT_SEGMENT_ATTRIBUTES, EVENT_COLUMNS};
use funnel_core::{Event, EventLog, FunnelResult, FunnelStage, Product, FUNNEL_STAGES};
use serde::Serialize;
use tracing::info;

use crate::loader::EVENT_KIND_COLUMNS;
use crate::table::{parse_timestamp, RawTable};

/// Row accounting for one cleaning run, written next to the cleaned data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningSummary {
    pub events_rows_in: usize,
    pub events_rows: usize,
    pub products_rows_in: usize,
    pub products_rows: usize,
    pub dropped_missing_session: usize,
    pub dropped_unknown_event_type: usize,
    pub dropped_invalid_timestamp: usize,
    pub dropped_out_of_range: usize,
    pub dropped_duplicates: usize,
    pub event_types: BTreeMap<FunnelStage, usize>,
}

/// Cleans a raw event table into a typed event log.
///
/// `session_id` and `event_type` must be present; the timestamp is read from
/// `timestamp`, falling back to `event_time`. Rows are dropped when the event
/// type has no stage mapping, the timestamp does not parse or falls outside
/// `[min_date, now + future_tolerance_days]`, or the row repeats an earlier
/// one. `summary` receives the event-side counts.
pub fn clean_events(
    table: &RawTable,
    config: &CleaningConfig,
    now: NaiveDateTime,
    summary: &mut CleaningSummary,
) -> FunnelResult<EventLog> {
    let session_idx = table.require_column(&["session_id"])?;
    let kind_idx = table.require_column(&EVENT_KIND_COLUMNS)?;
    let ts_idx = table.require_column(&["timestamp", "event_time"])?;
    let event_id_idx = table.column("event_id");
    let user_idx = table.column("user_id");
    let product_idx = table.column("product_id");
    let quantity_idx = table.column("quantity");

    let extra_cols: Vec<(usize, &str)> = table
        .headers()
        .iter()
        .enumerate()
        .map(|(i, h)| (i, h.as_str()))
        .filter(|(_, h)| {
            !EVENT_COLUMNS.contains(h)
                && !EVENT_KIND_COLUMNS.contains(h)
                && *h != "event_time"
                && !DEFAULT_SEGMENT_ATTRIBUTES.contains(h)
        })
        .collect();
    let segment_idx: Vec<(&str, Option<usize>)> = DEFAULT_SEGMENT_ATTRIBUTES
        .iter()
        .map(|&attr| (attr, table.column(attr)))
        .collect();

    let earliest = config.min_date.and_time(NaiveTime::MIN);
    let latest = now + Duration::days(config.future_tolerance_days);

    summary.events_rows_in = table.len();
    let mut seen: HashSet<Event> = HashSet::with_capacity(table.len());
    let mut events = Vec::with_capacity(table.len());

    for row in table.rows() {
        let Some(session_id) = RawTable::cell(row, Some(session_idx)) else {
            summary.dropped_missing_session += 1;
            continue;
        };
        let kind = RawTable::cell(row, Some(kind_idx))
            .and_then(|raw| FunnelStage::from_alias(&raw.to_lowercase()));
        let Some(kind) = kind else {
            summary.dropped_unknown_event_type += 1;
            continue;
        };
        let Some(timestamp) = RawTable::cell(row, Some(ts_idx)).and_then(parse_timestamp) else {
            summary.dropped_invalid_timestamp += 1;
            continue;
        };
        if timestamp < earliest || timestamp > latest {
            summary.dropped_out_of_range += 1;
            continue;
        }

        let mut segments = BTreeMap::new();
        for &(attr, idx) in &segment_idx {
            let value = RawTable::cell(row, idx).unwrap_or(&config.default_segment_value);
            segments.insert(attr.to_string(), value.to_string());
        }
        for &(idx, name) in &extra_cols {
            if let Some(value) = RawTable::cell(row, Some(idx)) {
                segments.insert(name.to_string(), value.to_string());
            }
        }

        let event = Event {
            event_id: RawTable::cell(row, event_id_idx).map(str::to_string),
            session_id: session_id.to_string(),
            user_id: RawTable::cell(row, user_idx).map(str::to_string),
            kind,
            timestamp,
            product_id: RawTable::cell(row, product_idx).map(str::to_string),
            quantity: parse_quantity(RawTable::cell(row, quantity_idx)),
            segments,
        };
        if !seen.insert(event.clone()) {
            summary.dropped_duplicates += 1;
            continue;
        }
        events.push(event);
    }

    summary.events_rows = events.len();
    summary.event_types = FUNNEL_STAGES.iter().map(|&s| (s, 0)).collect();
    for event in &events {
        *summary.event_types.entry(event.kind).or_default() += 1;
    }

    let columns = EVENT_COLUMNS
        .iter()
        .chain(DEFAULT_SEGMENT_ATTRIBUTES.iter())
        .copied()
        .chain(extra_cols.iter().map(|&(_, name)| name))
        .map(str::to_string)
        .collect();

    info!(
        rows_in = summary.events_rows_in,
        rows_out = summary.events_rows,
        unknown_event_type = summary.dropped_unknown_event_type,
        invalid_timestamp = summary.dropped_invalid_timestamp,
        out_of_range = summary.dropped_out_of_range,
        duplicates = summary.dropped_duplicates,
        "Events cleaned"
    );

    Ok(EventLog::new(columns, events))
}

/// Quantities are coerced to whole units; anything unreadable counts as 1.
fn parse_quantity(raw: Option<&str>) -> u32 {
    raw.and_then(|q| q.parse::<f64>().ok())
        .filter(|q| q.is_finite() && *q >= 0.0)
        .map(|q| q as u32)
        .unwrap_or(1)
}

/// Cleans the raw product table. Missing categories fall back to the
/// configured default; rows without a usable non-negative price are dropped,
/// as are repeated product ids after the first.
pub fn clean_products(
    table: &RawTable,
    config: &CleaningConfig,
    summary: &mut CleaningSummary,
) -> FunnelResult<Vec<Product>> {
    let id_idx = table.require_column(&["product_id"])?;
    let price_idx = table.require_column(&["price"])?;
    let name_idx = table.column("product_name");
    let category_idx = table.column("category");

    summary.products_rows_in = table.len();
    let mut seen = HashSet::new();
    let mut products = Vec::new();
    for row in table.rows() {
        let Some(product_id) = RawTable::cell(row, Some(id_idx)) else {
            continue;
        };
        let price = RawTable::cell(row, Some(price_idx))
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p >= 0.0);
        let Some(price) = price else {
            continue;
        };
        if !seen.insert(product_id.to_string()) {
            continue;
        }
        products.push(Product {
            product_id: product_id.to_string(),
            product_name: RawTable::cell(row, name_idx).unwrap_or(product_id).to_string(),
            category: RawTable::cell(row, category_idx)
                .unwrap_or(&config.default_category)
                .to_string(),
            price,
        });
    }
    summary.products_rows = products.len();

    info!(
        rows_in = summary.products_rows_in,
        rows_out = summary.products_rows,
        "Products cleaned"
    );
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use funnel_core::FunnelError;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn clean(csv: &str) -> (EventLog, CleaningSummary) {
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        let mut summary = CleaningSummary::default();
        let log = clean_events(&table, &CleaningConfig::default(), now(), &mut summary).unwrap();
        (log, summary)
    }

    #[test]
    fn test_normalizes_event_type_aliases() {
        let (log, summary) = clean(
            "session_id,event_type,timestamp\n\
             S1, Page_View ,2024-10-01 10:00:00\n\
             S1,REGISTER,2024-10-01 10:01:00\n\
             S1,add to cart,2024-10-01 10:02:00\n\
             S1,Checkout,2024-10-01 10:03:00\n\
             S1,wishlist,2024-10-01 10:04:00\n",
        );
        let kinds: Vec<FunnelStage> = log.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, FUNNEL_STAGES.to_vec());
        assert_eq!(summary.dropped_unknown_event_type, 1);
        assert_eq!(summary.event_types[&FunnelStage::Visit], 1);
    }

    #[test]
    fn test_drops_bad_and_out_of_range_timestamps() {
        let (log, summary) = clean(
            "session_id,event_type,event_time\n\
             S1,visit,2024-10-01 10:00:00\n\
             S2,visit,garbage\n\
             S3,visit,2019-12-31 23:59:59\n\
             S4,visit,2025-01-03 00:00:00\n\
             S5,visit,2025-01-01 12:00:00\n",
        );
        let sessions: Vec<&str> = log.events().iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["S1", "S5"]);
        assert_eq!(summary.dropped_invalid_timestamp, 1);
        assert_eq!(summary.dropped_out_of_range, 2);
    }

    #[test]
    fn test_drops_duplicates_and_missing_sessions() {
        let (log, summary) = clean(
            "session_id,event_type,timestamp,device\n\
             S1,visit,2024-10-01 10:00:00,mobile\n\
             S1,visit,2024-10-01 10:00:00,mobile\n\
             ,visit,2024-10-01 10:00:00,mobile\n",
        );
        assert_eq!(log.len(), 1);
        assert_eq!(summary.dropped_duplicates, 1);
        assert_eq!(summary.dropped_missing_session, 1);
    }

    #[test]
    fn test_fills_default_segments() {
        let (log, _) = clean(
            "session_id,event_type,timestamp,device,browser,quantity\n\
             S1,visit,2024-10-01 10:00:00, tablet ,firefox,2.0\n\
             S2,visit,2024-10-01 10:00:00,,,\n",
        );
        let first = &log.events()[0];
        assert_eq!(first.segment("device"), Some("tablet"));
        assert_eq!(first.segment("region"), Some("unknown"));
        assert_eq!(first.segment("browser"), Some("firefox"));
        assert_eq!(first.quantity, 2);
        let second = &log.events()[1];
        assert_eq!(second.segment("device"), Some("unknown"));
        assert_eq!(second.segment("browser"), None);
        assert_eq!(second.quantity, 1);
        assert!(log.has_column("campaign_source"));
        assert!(log.has_column("browser"));
    }

    #[test]
    fn test_missing_required_column() {
        let table = RawTable::from_reader("user_id,event_type,timestamp\n".as_bytes()).unwrap();
        let mut summary = CleaningSummary::default();
        let err = clean_events(&table, &CleaningConfig::default(), now(), &mut summary).unwrap_err();
        assert!(matches!(err, FunnelError::MissingColumn(ref c) if c == "session_id"));
    }

    #[test]
    fn test_clean_products() {
        let table = RawTable::from_reader(
            "product_id,product_name,category,price\n\
             P1,Lamp,,19.99\n\
             P2,Chair,Home & Garden,-4\n\
             P3,Desk,Home & Garden,n/a\n\
             P1,Lamp again,Home & Garden,25\n\
             P4,Book, Books ,12\n"
                .as_bytes(),
        )
        .unwrap();
        let mut summary = CleaningSummary::default();
        let products = clean_products(&table, &CleaningConfig::default(), &mut summary).unwrap();
        let ids: Vec<&str> = products.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P4"]);
        assert_eq!(products[0].category, "Uncategorized");
        assert_eq!(products[0].product_name, "Lamp");
        assert_eq!(products[1].category, "Books");
        assert_eq!(summary.products_rows_in, 5);
        assert_eq!(summary.products_rows, 2);
    }
}
