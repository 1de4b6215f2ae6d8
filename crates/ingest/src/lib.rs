//! Event log adapter — raw CSV tables, cleaning, strict loading of cleaned
//! event logs, and seeded sample data generation.

pub mod cleaning;
pub mod generator;
pub mod loader;
pub mod table;

pub use cleaning::{clean_events, clean_products, CleaningSummary};
pub use generator::{SampleData, SampleGenerator};
pub use loader::{load_event_log, load_products, save_event_log, save_products};
pub use table::RawTable;
