use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{FunnelError, FunnelResult};
use crate::types::DEFAULT_SEGMENT_ATTRIBUTES;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `FUNNEL_INSIGHTS__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub funnel: FunnelConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_cleaned_dir")]
    pub cleaned_dir: PathBuf,
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunnelConfig {
    /// Segment attributes analysed after the unsegmented funnel. Attributes
    /// missing from the event log are skipped.
    #[serde(default = "default_segment_attributes")]
    pub segment_attributes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleaningConfig {
    #[serde(default = "default_min_date")]
    pub min_date: NaiveDate,
    #[serde(default = "default_future_tolerance_days")]
    pub future_tolerance_days: i64,
    #[serde(default = "default_segment_value")]
    pub default_segment_value: String,
    #[serde(default = "default_category")]
    pub default_category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_n_users")]
    pub n_users: usize,
    #[serde(default = "default_n_sessions")]
    pub n_sessions: usize,
    #[serde(default = "default_n_products")]
    pub n_products: usize,
    #[serde(default = "default_n_days")]
    pub n_days: u32,
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    #[serde(default = "default_signup_rate")]
    pub signup_rate: f64,
    #[serde(default = "default_cart_rate")]
    pub add_to_cart_rate: f64,
    #[serde(default = "default_purchase_rate")]
    pub purchase_rate: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unsupported output format `{other}` (expected csv or json)")),
        }
    }
}

// Default functions
fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_cleaned_dir() -> PathBuf {
    PathBuf::from("data/cleaned")
}
fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}
fn default_segment_attributes() -> Vec<String> {
    DEFAULT_SEGMENT_ATTRIBUTES.iter().map(|a| a.to_string()).collect()
}
fn default_min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default()
}
fn default_future_tolerance_days() -> i64 {
    1
}
fn default_segment_value() -> String {
    "unknown".to_string()
}
fn default_category() -> String {
    "Uncategorized".to_string()
}
fn default_seed() -> u64 {
    42
}
fn default_n_users() -> usize {
    800
}
fn default_n_sessions() -> usize {
    3000
}
fn default_n_products() -> usize {
    100
}
fn default_n_days() -> u32 {
    90
}
fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 1).unwrap_or_default()
}
fn default_signup_rate() -> f64 {
    0.35
}
fn default_cart_rate() -> f64 {
    0.45
}
fn default_purchase_rate() -> f64 {
    0.55
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            cleaned_dir: default_cleaned_dir(),
            outputs_dir: default_outputs_dir(),
        }
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            segment_attributes: default_segment_attributes(),
        }
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_date: default_min_date(),
            future_tolerance_days: default_future_tolerance_days(),
            default_segment_value: default_segment_value(),
            default_category: default_category(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            n_users: default_n_users(),
            n_sessions: default_n_sessions(),
            n_products: default_n_products(),
            n_days: default_n_days(),
            start_date: default_start_date(),
            signup_rate: default_signup_rate(),
            add_to_cart_rate: default_cart_rate(),
            purchase_rate: default_purchase_rate(),
        }
    }
}

impl GeneratorConfig {
    /// Rejects generator settings that would leave nothing to sample from.
    pub fn validate(&self) -> FunnelResult<()> {
        for (name, rate) in [
            ("signup_rate", self.signup_rate),
            ("add_to_cart_rate", self.add_to_cart_rate),
            ("purchase_rate", self.purchase_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(FunnelError::Config(format!(
                    "generator.{name} must be within [0, 1], got {rate}"
                )));
            }
        }
        if self.n_users == 0 || self.n_products == 0 || self.n_days == 0 {
            return Err(FunnelError::Config(
                "generator.n_users, n_products and n_days must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment
    /// variables. Environment variables take precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FUNNEL_INSIGHTS")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("funnel.segment_attributes"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> FunnelResult<()> {
        self.generator.validate()?;
        if self.cleaning.future_tolerance_days < 0 {
            return Err(FunnelError::Config(
                "cleaning.future_tolerance_days must not be negative".into(),
            ));
        }
        Ok(())
    }
}
