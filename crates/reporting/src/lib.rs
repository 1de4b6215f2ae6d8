//! Funnel and sales reporting — ordered conversion funnels, segment
//! breakdowns, product and revenue insights, and table export.

pub mod export;
pub mod funnel;
pub mod insights;

pub use export::ReportWriter;
pub use funnel::{FunnelAnalyzer, FunnelReport, SegmentedFunnel};
pub use insights::SalesInsights;
