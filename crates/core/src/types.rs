//! Shared domain types — funnel stages, events, the event log and the
//! product catalog.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::FunnelError;

// ─── Funnel Stages ──────────────────────────────────────────────────────────

/// One step of the fixed visit → signup → add_to_cart → purchase journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Visit,
    Signup,
    AddToCart,
    Purchase,
}

/// The funnel in progression order. Stage indices are positions in this list.
pub const FUNNEL_STAGES: [FunnelStage; 4] = [
    FunnelStage::Visit,
    FunnelStage::Signup,
    FunnelStage::AddToCart,
    FunnelStage::Purchase,
];

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::Visit => "visit",
            FunnelStage::Signup => "signup",
            FunnelStage::AddToCart => "add_to_cart",
            FunnelStage::Purchase => "purchase",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Maps a raw event type onto a stage. The input must already be trimmed
    /// and lower-cased; unrecognised names yield `None`.
    pub fn from_alias(raw: &str) -> Option<Self> {
        match raw {
            "visit" | "page_view" => Some(FunnelStage::Visit),
            "signup" | "register" => Some(FunnelStage::Signup),
            "add_to_cart" | "add to cart" => Some(FunnelStage::AddToCart),
            "purchase" | "checkout" | "order" => Some(FunnelStage::Purchase),
            _ => None,
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunnelStage {
    type Err = FunnelError;

    /// Accepts canonical stage names only; aliases are resolved while cleaning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FUNNEL_STAGES
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| FunnelError::Validation(format!("unknown funnel stage `{s}`")))
    }
}

// ─── Segment Attributes ─────────────────────────────────────────────────────

pub const SEGMENT_DEVICE: &str = "device";
pub const SEGMENT_REGION: &str = "region";
pub const SEGMENT_CAMPAIGN_SOURCE: &str = "campaign_source";

/// Segment attributes produced by the cleaning step and analysed by default.
pub const DEFAULT_SEGMENT_ATTRIBUTES: [&str; 3] =
    [SEGMENT_DEVICE, SEGMENT_REGION, SEGMENT_CAMPAIGN_SOURCE];

/// Columns with a fixed meaning in an event table. Anything else is a
/// segment attribute.
pub const EVENT_COLUMNS: [&str; 7] = [
    "event_id",
    "session_id",
    "user_id",
    "event_type",
    "product_id",
    "quantity",
    "timestamp",
];

// ─── Events ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Option<String>,
    pub session_id: String,
    pub user_id: Option<String>,
    pub kind: FunnelStage,
    pub timestamp: NaiveDateTime,
    pub product_id: Option<String>,
    pub quantity: u32,
    pub segments: BTreeMap<String, String>,
}

impl Event {
    pub fn new(session_id: impl Into<String>, kind: FunnelStage, timestamp: NaiveDateTime) -> Self {
        Self {
            event_id: None,
            session_id: session_id.into(),
            user_id: None,
            kind,
            timestamp,
            product_id: None,
            quantity: 1,
            segments: BTreeMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>, quantity: u32) -> Self {
        self.product_id = Some(product_id.into());
        self.quantity = quantity;
        self
    }

    pub fn with_segment(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.segments.insert(attribute.into(), value.into());
        self
    }

    /// The event's value for a segment attribute, ignoring empty values.
    pub fn segment(&self, attribute: &str) -> Option<&str> {
        self.segments
            .get(attribute)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// An in-memory event table: the source column names plus the events in
/// source order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    columns: Vec<String>,
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(columns: Vec<String>, events: Vec<Event>) -> Self {
        Self { columns, events }
    }

    /// Builds a log whose schema is the standard event columns plus every
    /// segment attribute carried by at least one event.
    pub fn from_events(events: Vec<Event>) -> Self {
        let segment_columns: BTreeSet<&String> =
            events.iter().flat_map(|e| e.segments.keys()).collect();
        let columns = EVENT_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(segment_columns.into_iter().cloned())
            .collect();
        Self { columns, events }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Columns outside the fixed event schema, in source order.
    pub fn segment_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| !EVENT_COLUMNS.contains(c))
            .collect()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ─── Products ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
    by_id: HashMap<String, usize>,
}

impl ProductCatalog {
    /// Indexes products by id. When ids repeat, the first product wins.
    pub fn new(products: Vec<Product>) -> Self {
        let mut by_id = HashMap::with_capacity(products.len());
        for (idx, product) in products.iter().enumerate() {
            by_id.entry(product.product_id.clone()).or_insert(idx);
        }
        Self { products, by_id }
    }

    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.by_id.get(product_id).map(|&idx| &self.products[idx])
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
