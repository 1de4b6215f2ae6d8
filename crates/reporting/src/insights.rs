//! Sales insights over purchase events — product and category rankings,
//! daily revenue, headline KPIs, and weekday × hour seasonality.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Timelike};
use funnel_core::{Event, EventLog, FunnelStage, Product, ProductCatalog};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::funnel::round2;

pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

// ─── Output rows ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub units_sold: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySales {
    pub category: String,
    pub units_sold: u64,
    pub revenue: f64,
    pub orders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
    pub orders: u64,
    pub units: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_revenue: f64,
    pub aov: f64,
    pub total_orders: u64,
    pub repeat_purchaser_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRevenue {
    pub weekday: String,
    pub hour: u32,
    pub revenue: f64,
}

// ─── Purchase join ──────────────────────────────────────────────────────────

/// A purchase event joined to its catalog entry.
struct PurchaseLine<'a> {
    event: &'a Event,
    product: Option<&'a Product>,
    revenue: f64,
}

pub struct SalesInsights<'a> {
    lines: Vec<PurchaseLine<'a>>,
}

impl<'a> SalesInsights<'a> {
    /// Joins every purchase in the log against the catalog. Purchases of
    /// unknown products are kept with zero revenue.
    pub fn new(log: &'a EventLog, catalog: &'a ProductCatalog) -> Self {
        let lines: Vec<PurchaseLine<'a>> = log
            .events()
            .iter()
            .filter(|e| e.kind == FunnelStage::Purchase)
            .map(|event| {
                let product = event.product_id.as_deref().and_then(|id| catalog.get(id));
                let revenue = product.map_or(0.0, |p| p.price * f64::from(event.quantity));
                PurchaseLine {
                    event,
                    product,
                    revenue,
                }
            })
            .collect();

        let unmatched = lines.iter().filter(|l| l.product.is_none()).count();
        if unmatched > 0 {
            debug!(purchases = unmatched, "Purchases without a catalog product");
        }
        info!(purchases = lines.len(), products = catalog.len(), "Sales insights prepared");
        Self { lines }
    }

    pub fn purchase_count(&self) -> usize {
        self.lines.len()
    }

    /// Per-product units and revenue, highest revenue first.
    pub fn top_products(&self) -> Vec<ProductSales> {
        let mut by_product: BTreeMap<&str, (&Product, u64, f64)> = BTreeMap::new();
        for line in &self.lines {
            if let Some(product) = line.product {
                let entry = by_product
                    .entry(product.product_id.as_str())
                    .or_insert((product, 0, 0.0));
                entry.1 += u64::from(line.event.quantity);
                entry.2 += line.revenue;
            }
        }

        let mut rows: Vec<ProductSales> = by_product
            .into_values()
            .map(|(product, units_sold, revenue)| ProductSales {
                product_id: product.product_id.clone(),
                product_name: product.product_name.clone(),
                category: product.category.clone(),
                units_sold,
                revenue: round2(revenue),
            })
            .collect();
        rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
        rows
    }

    pub fn revenue_by_category(&self) -> Vec<CategorySales> {
        let mut by_category: BTreeMap<&str, (u64, f64, BTreeSet<&str>)> = BTreeMap::new();
        for line in &self.lines {
            if let Some(product) = line.product {
                let (units, revenue, sessions) = by_category.entry(product.category.as_str()).or_default();
                *units += u64::from(line.event.quantity);
                *revenue += line.revenue;
                sessions.insert(line.event.session_id.as_str());
            }
        }

        let mut rows: Vec<CategorySales> = by_category
            .into_iter()
            .map(|(category, (units_sold, revenue, sessions))| CategorySales {
                category: category.to_string(),
                units_sold,
                revenue: round2(revenue),
                orders: sessions.len() as u64,
            })
            .collect();
        rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
        rows
    }

    pub fn daily_revenue(&self) -> Vec<DailyRevenue> {
        let mut by_day: BTreeMap<NaiveDate, (f64, BTreeSet<&str>, u64)> = BTreeMap::new();
        for line in &self.lines {
            let (revenue, sessions, units) = by_day.entry(line.event.timestamp.date()).or_default();
            *revenue += line.revenue;
            sessions.insert(line.event.session_id.as_str());
            *units += u64::from(line.event.quantity);
        }

        by_day
            .into_iter()
            .map(|(date, (revenue, sessions, units))| DailyRevenue {
                date,
                revenue: round2(revenue),
                orders: sessions.len() as u64,
                units,
            })
            .collect()
    }

    /// An order is a session with at least one purchase. A repeat purchaser
    /// is a user who ordered in more than one session; purchases without a
    /// user id are not attributed to anyone.
    pub fn kpis(&self) -> Kpis {
        let mut per_order: BTreeMap<&str, f64> = BTreeMap::new();
        let mut per_user: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for line in &self.lines {
            *per_order.entry(line.event.session_id.as_str()).or_default() += line.revenue;
            if let Some(user) = line.event.user_id.as_deref() {
                per_user
                    .entry(user)
                    .or_default()
                    .insert(line.event.session_id.as_str());
            }
        }

        let total_revenue: f64 = per_order.values().sum();
        let total_orders = per_order.len() as u64;
        let aov = if total_orders == 0 {
            0.0
        } else {
            total_revenue / total_orders as f64
        };
        let repeaters = per_user.values().filter(|sessions| sessions.len() > 1).count();
        let repeat_purchaser_pct = if per_user.is_empty() {
            0.0
        } else {
            repeaters as f64 / per_user.len() as f64 * 100.0
        };

        Kpis {
            total_revenue: round2(total_revenue),
            aov: round2(aov),
            total_orders,
            repeat_purchaser_pct: round2(repeat_purchaser_pct),
        }
    }

    /// Revenue for every weekday × hour cell, Monday 00h first. Empty cells
    /// are reported as zero so the grid is always complete.
    pub fn seasonality(&self) -> Vec<HourlyRevenue> {
        let mut grid = [[0.0_f64; 24]; 7];
        for line in &self.lines {
            let ts = line.event.timestamp;
            grid[ts.weekday().num_days_from_monday() as usize][ts.hour() as usize] += line.revenue;
        }

        WEEKDAYS
            .iter()
            .zip(grid.iter())
            .flat_map(|(weekday, hours)| {
                hours.iter().enumerate().map(move |(hour, revenue)| HourlyRevenue {
                    weekday: weekday.to_string(),
                    hour: hour as u32,
                    revenue: round2(*revenue),
                })
            })
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        // 2024-10-07 is a Monday
        NaiveDate::from_ymd_opt(2024, 10, day)
            .unwrap()
            .and_hms_opt(hour, 15, 0)
            .unwrap()
    }

    fn product(id: &str, category: &str, price: f64) -> Product {
        Product {
            product_id: id.into(),
            product_name: format!("Product_{id}"),
            category: category.into(),
            price,
        }
    }

    fn fixture() -> (EventLog, ProductCatalog) {
        let catalog = ProductCatalog::new(vec![
            product("P1", "Books", 10.0),
            product("P2", "Toys", 25.0),
            product("P3", "Books", 4.5),
        ]);
        let buy = |session: &str, user: &str, pid: &str, qty: u32, ts: NaiveDateTime| {
            Event::new(session, FunnelStage::Purchase, ts)
                .with_user(user)
                .with_product(pid, qty)
        };
        let events = vec![
            Event::new("S1", FunnelStage::Visit, at(7, 9)).with_user("U1"),
            buy("S1", "U1", "P1", 2, at(7, 9)),
            buy("S1", "U1", "P2", 1, at(7, 9)),
            buy("S2", "U1", "P3", 4, at(8, 14)),
            buy("S3", "U2", "P2", 2, at(8, 20)),
            buy("S4", "U3", "P404", 1, at(9, 11)),
        ];
        (EventLog::from_events(events), catalog)
    }

    #[test]
    fn test_top_products_ranked_by_revenue() {
        let (log, catalog) = fixture();
        let insights = SalesInsights::new(&log, &catalog);
        assert_eq!(insights.purchase_count(), 5);

        let top = insights.top_products();
        let ids: Vec<&str> = top.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P1", "P3"]);
        assert_eq!(top[0].units_sold, 3);
        assert_eq!(top[0].revenue, 75.0);
        assert_eq!(top[2].revenue, 18.0);
    }

    #[test]
    fn test_revenue_by_category_counts_distinct_orders() {
        let (log, catalog) = fixture();
        let categories = SalesInsights::new(&log, &catalog).revenue_by_category();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].category, "Toys");
        assert_eq!(categories[0].orders, 2);
        assert_eq!(categories[1].category, "Books");
        assert_eq!(categories[1].revenue, 38.0);
        assert_eq!(categories[1].units_sold, 6);
        assert_eq!(categories[1].orders, 2);
    }

    #[test]
    fn test_daily_revenue_ascending() {
        let (log, catalog) = fixture();
        let daily = SalesInsights::new(&log, &catalog).daily_revenue();
        let dates: Vec<u32> = daily.iter().map(|d| d.date.day()).collect();
        assert_eq!(dates, vec![7, 8, 9]);
        assert_eq!(daily[0].revenue, 45.0);
        assert_eq!(daily[1].orders, 2);
        assert_eq!(daily[1].units, 6);
        assert_eq!(daily[2].revenue, 0.0);
    }

    #[test]
    fn test_kpis() {
        let (log, catalog) = fixture();
        let kpis = SalesInsights::new(&log, &catalog).kpis();
        assert_eq!(kpis.total_revenue, 113.0);
        assert_eq!(kpis.total_orders, 4);
        assert_eq!(kpis.aov, 28.25);
        assert_eq!(kpis.repeat_purchaser_pct, 33.33);
    }

    #[test]
    fn test_kpis_without_purchases() {
        let log = EventLog::from_events(vec![Event::new("S1", FunnelStage::Visit, at(7, 9))]);
        let catalog = ProductCatalog::default();
        let insights = SalesInsights::new(&log, &catalog);
        let kpis = insights.kpis();
        assert_eq!(kpis.total_orders, 0);
        assert_eq!(kpis.aov, 0.0);
        assert_eq!(kpis.repeat_purchaser_pct, 0.0);
        assert!(insights.top_products().is_empty());
    }

    #[test]
    fn test_seasonality_grid() {
        let (log, catalog) = fixture();
        let cells = SalesInsights::new(&log, &catalog).seasonality();
        assert_eq!(cells.len(), 7 * 24);
        assert_eq!(cells[9].weekday, "Mon");
        assert_eq!(cells[9].hour, 9);
        assert_eq!(cells[9].revenue, 45.0);
        let tuesday_evening = &cells[24 + 20];
        assert_eq!(tuesday_evening.weekday, "Tue");
        assert_eq!(tuesday_evening.revenue, 50.0);
        let total: f64 = cells.iter().map(|c| c.revenue).sum();
        assert_eq!(total, 113.0);
    }
}
