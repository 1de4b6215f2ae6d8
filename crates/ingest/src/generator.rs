//! Seeded synthetic e-commerce data — a product catalog, session plans, and
//! the raw event stream they produce, using the same schema real exports
//! arrive in.

use std::fs::File;
use std::path::Path;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use funnel_core::config::GeneratorConfig;
use funnel_core::{FunnelError, FunnelResult, FunnelStage, Product};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::LogNormal;
use serde::Serialize;
use tracing::info;

use crate::loader::{ensure_parent, write_products, TIMESTAMP_FORMAT};

pub const CATEGORIES: [&str; 8] = [
    "Electronics",
    "Clothing",
    "Home & Garden",
    "Sports",
    "Books",
    "Beauty",
    "Toys",
    "Food & Beverage",
];
pub const REGIONS: [&str; 5] = ["North", "South", "East", "West", "Central"];
pub const DEVICES: [(&str, f64); 3] = [("mobile", 0.5), ("desktop", 0.4), ("tablet", 0.1)];
pub const CAMPAIGNS: [(&str, f64); 5] = [
    ("organic", 0.3),
    ("google", 0.25),
    ("facebook", 0.2),
    ("email", 0.15),
    ("direct", 0.1),
];

/// What a generated session will do, drawn before its events are emitted.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPlan {
    pub session_id: String,
    pub user_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub session_start: NaiveDateTime,
    pub device: String,
    pub region: String,
    pub campaign_source: String,
    pub is_signup: bool,
    pub add_to_cart: bool,
    pub cart_items: u32,
    pub purchase: bool,
    pub purchase_items: u32,
}

/// One row of the raw event export.
#[derive(Debug, Clone, Serialize)]
pub struct RawEvent {
    pub event_id: String,
    pub session_id: String,
    pub user_id: String,
    pub event_type: String,
    pub product_id: Option<String>,
    pub quantity: Option<u32>,
    pub timestamp: String,
    pub region: String,
    pub device: String,
    pub campaign_source: String,
}

#[derive(Debug, Clone)]
pub struct SampleData {
    pub products: Vec<Product>,
    pub sessions: Vec<SessionPlan>,
    pub events: Vec<RawEvent>,
}

/// Log-normal price parameters (mean and std-dev of the underlying normal)
/// and the clip range, in currency units.
const PRICE_MU: f64 = 2.5;
const PRICE_SIGMA: f64 = 1.2;
const PRICE_RANGE: (f64, f64) = (5.0, 500.0);

pub struct SampleGenerator {
    config: GeneratorConfig,
    rng: StdRng,
}

impl SampleGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Fails with a config error, instead of panicking mid-generation, when the
    /// generator settings leave an empty range to sample from.
    pub fn generate(&mut self) -> FunnelResult<SampleData> {
        self.config.validate()?;
        let products = self.generate_products()?;
        let sessions = self.generate_sessions()?;
        let events = self.generate_events(&sessions, &products);
        info!(
            products = products.len(),
            sessions = sessions.len(),
            events = events.len(),
            seed = self.config.seed,
            "Sample data generated"
        );
        Ok(SampleData {
            products,
            sessions,
            events,
        })
    }

    /// Prices are log-normal, clipped to `PRICE_RANGE` and rounded to cents.
    fn generate_products(&mut self) -> FunnelResult<Vec<Product>> {
        let price_dist = LogNormal::new(PRICE_MU, PRICE_SIGMA)
            .map_err(|e| FunnelError::Config(format!("invalid price distribution: {e}")))?;
        let products = (0..self.config.n_products)
            .map(|i| {
                let category = CATEGORIES[self.rng.gen_range(0..CATEGORIES.len())];
                let price = price_dist.sample(&mut self.rng).clamp(PRICE_RANGE.0, PRICE_RANGE.1);
                Product {
                    product_id: format!("P{i:05}"),
                    product_name: format!("Product_{i}"),
                    category: category.to_string(),
                    price: (price * 100.0).round() / 100.0,
                }
            })
            .collect();
        Ok(products)
    }

    fn generate_sessions(&mut self) -> FunnelResult<Vec<SessionPlan>> {
        let device_idx = weighted(&DEVICES)?;
        let campaign_idx = weighted(&CAMPAIGNS)?;
        let start = self.config.start_date.and_time(NaiveTime::MIN);

        let mut sessions = Vec::with_capacity(self.config.n_sessions);
        for i in 0..self.config.n_sessions {
            let offset = Duration::days(self.rng.gen_range(0..self.config.n_days) as i64)
                + Duration::hours(self.rng.gen_range(0..24))
                + Duration::minutes(self.rng.gen_range(0..60));
            let is_signup = self.rng.gen::<f64>() < self.config.signup_rate;
            let add_to_cart = self.rng.gen::<f64>() < self.config.add_to_cart_rate;
            let purchase = add_to_cart && self.rng.gen::<f64>() < self.config.purchase_rate;
            sessions.push(SessionPlan {
                session_id: format!("S{i:08}"),
                user_id: format!("U{:06}", self.rng.gen_range(0..self.config.n_users)),
                session_start: start + offset,
                device: DEVICES[device_idx.sample(&mut self.rng)].0.to_string(),
                region: REGIONS[self.rng.gen_range(0..REGIONS.len())].to_string(),
                campaign_source: CAMPAIGNS[campaign_idx.sample(&mut self.rng)].0.to_string(),
                is_signup,
                add_to_cart,
                cart_items: if add_to_cart { self.rng.gen_range(1..4) } else { 0 },
                purchase,
                purchase_items: if purchase { self.rng.gen_range(1..3) } else { 0 },
            });
        }
        Ok(sessions)
    }

    fn generate_events(&mut self, sessions: &[SessionPlan], products: &[Product]) -> Vec<RawEvent> {
        let mut events = Vec::new();
        for plan in sessions {
            let start = plan.session_start;
            let emit = |events: &mut Vec<RawEvent>,
                            kind: FunnelStage,
                            at: NaiveDateTime,
                            item: Option<(String, u32)>| {
                let (product_id, quantity) = match item {
                    Some((p, q)) => (Some(p), Some(q)),
                    None => (None, None),
                };
                events.push(RawEvent {
                    event_id: format!("E{:08}", events.len()),
                    session_id: plan.session_id.clone(),
                    user_id: plan.user_id.clone(),
                    event_type: kind.as_str().to_string(),
                    product_id,
                    quantity,
                    timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
                    region: plan.region.clone(),
                    device: plan.device.clone(),
                    campaign_source: plan.campaign_source.clone(),
                });
            };

            emit(&mut events, FunnelStage::Visit, start, None);

            if plan.is_signup {
                let at = start + Duration::minutes(self.rng.gen_range(1..5));
                emit(&mut events, FunnelStage::Signup, at, None);
            }

            let mut cart = Vec::new();
            if plan.add_to_cart && !products.is_empty() {
                for _ in 0..plan.cart_items {
                    let product = &products[self.rng.gen_range(0..products.len())];
                    let quantity = self.rng.gen_range(1..4);
                    let at = start + Duration::minutes(self.rng.gen_range(5..25));
                    cart.push((product.product_id.clone(), quantity));
                    emit(&mut events, FunnelStage::AddToCart, at, Some((product.product_id.clone(), quantity)));
                }
            }

            if plan.purchase {
                for item in cart.into_iter().take(plan.purchase_items as usize) {
                    let at = start + Duration::minutes(self.rng.gen_range(30..60));
                    emit(&mut events, FunnelStage::Purchase, at, Some(item));
                }
            }
        }
        events
    }
}

fn serialize_timestamp<S: serde::Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

fn weighted(choices: &[(&str, f64)]) -> FunnelResult<WeightedIndex<f64>> {
    WeightedIndex::new(choices.iter().map(|(_, w)| *w))
        .map_err(|e| FunnelError::Config(format!("invalid sampling weights: {e}")))
}

/// Writes `products.csv`, `sessions.csv` and `events.csv` into `dir`.
pub fn write_sample_data(data: &SampleData, dir: &Path) -> FunnelResult<()> {
    let products_path = dir.join("products.csv");
    ensure_parent(&products_path)?;
    write_products(&data.products, File::create(&products_path)?)?;
    write_rows(&data.sessions, &dir.join("sessions.csv"))?;
    write_rows(&data.events, &dir.join("events.csv"))?;
    info!(dir = %dir.display(), "Sample data written");
    Ok(())
}

fn write_rows<T: Serialize>(rows: &[T], path: &Path) -> FunnelResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            n_users: 20,
            n_sessions: 200,
            n_products: 10,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let a = SampleGenerator::new(&small_config()).generate().unwrap();
        let b = SampleGenerator::new(&small_config()).generate().unwrap();
        assert_eq!(a.events.len(), b.events.len());
        assert_eq!(a.products, b.products);
        let ids_a: Vec<_> = a.events.iter().map(|e| (&e.session_id, &e.event_type, &e.timestamp)).collect();
        let ids_b: Vec<_> = b.events.iter().map(|e| (&e.session_id, &e.event_type, &e.timestamp)).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_every_session_has_exactly_one_visit() {
        let data = SampleGenerator::new(&small_config()).generate().unwrap();
        let mut visits: HashMap<&str, usize> = HashMap::new();
        for e in data.events.iter().filter(|e| e.event_type == "visit") {
            *visits.entry(e.session_id.as_str()).or_default() += 1;
        }
        assert_eq!(visits.len(), data.sessions.len());
        assert!(visits.values().all(|&n| n == 1));
    }

    #[test]
    fn test_purchases_follow_cart() {
        let data = SampleGenerator::new(&small_config()).generate().unwrap();
        let carted: HashSet<(&str, &str)> = data
            .events
            .iter()
            .filter(|e| e.event_type == "add_to_cart")
            .filter_map(|e| e.product_id.as_deref().map(|p| (e.session_id.as_str(), p)))
            .collect();
        for purchase in data.events.iter().filter(|e| e.event_type == "purchase") {
            let product = purchase.product_id.as_deref().unwrap();
            assert!(carted.contains(&(purchase.session_id.as_str(), product)));
        }
    }

    #[test]
    fn test_prices_and_weights_in_range() {
        let data = SampleGenerator::new(&small_config()).generate().unwrap();
        assert_eq!(data.products.len(), 10);
        assert!(data.products.iter().all(|p| (5.0..=500.0).contains(&p.price)));
        assert!(data
            .sessions
            .iter()
            .all(|s| DEVICES.iter().any(|(d, _)| *d == s.device)));
        assert!(data.sessions.iter().all(|s| !s.purchase || s.add_to_cart));
    }

    #[test]
    fn test_empty_sampling_range_is_config_error() {
        for config in [
            GeneratorConfig { n_users: 0, ..small_config() },
            GeneratorConfig { n_days: 0, ..small_config() },
            GeneratorConfig { purchase_rate: 1.5, ..small_config() },
        ] {
            let err = SampleGenerator::new(&config).generate().unwrap_err();
            assert!(matches!(err, FunnelError::Config(_)), "{err}");
        }
    }

    #[test]
    fn test_write_sample_data() {
        let dir = tempfile::tempdir().unwrap();
        let data = SampleGenerator::new(&small_config()).generate().unwrap();
        write_sample_data(&data, &dir.path().join("raw")).unwrap();
        let events = std::fs::read_to_string(dir.path().join("raw").join("events.csv")).unwrap();
        assert!(events.starts_with(
            "event_id,session_id,user_id,event_type,product_id,quantity,timestamp,region,device,campaign_source"
        ));
        assert_eq!(events.lines().count(), data.events.len() + 1);
    }
}
