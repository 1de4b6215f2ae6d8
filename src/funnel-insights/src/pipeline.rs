//! Pipeline steps. Each step reads the previous step's files from disk, so
//! any step can be rerun on its own.

use std::path::{Path, PathBuf};

use anyhow::Context;
use funnel_core::AppConfig;
use funnel_ingest::generator::write_sample_data;
use funnel_ingest::{
    clean_events, clean_products, load_event_log, load_products, save_event_log, save_products, CleaningSummary,
    RawTable, SampleGenerator,
};
use funnel_reporting::export::{
    CLEANING_SUMMARY, DAILY_REVENUE, FUNNEL_CONVERSION_RATES, FUNNEL_COUNTS, KPIS, REVENUE_BY_CATEGORY,
    REVENUE_HEATMAP, TOP_PRODUCTS,
};
use funnel_reporting::insights::Kpis;
use funnel_reporting::{FunnelAnalyzer, FunnelReport, ReportWriter, SalesInsights};
use tracing::info;

const RAW_EVENTS: &str = "events.csv";
const RAW_PRODUCTS: &str = "products.csv";
const CLEANED_EVENTS: &str = "events_cleaned.csv";
const CLEANED_PRODUCTS: &str = "products_cleaned.csv";

fn raw_path(config: &AppConfig, file: &str) -> PathBuf {
    config.data.raw_dir.join(file)
}

fn cleaned_path(config: &AppConfig, file: &str) -> PathBuf {
    config.data.cleaned_dir.join(file)
}

fn report_writer(config: &AppConfig) -> anyhow::Result<ReportWriter> {
    ReportWriter::new(&config.data.outputs_dir, config.output.format).with_context(|| {
        format!(
            "failed to create outputs directory {}",
            config.data.outputs_dir.display()
        )
    })
}

fn read_raw(path: &Path) -> anyhow::Result<RawTable> {
    RawTable::from_path(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn generate(config: &AppConfig) -> anyhow::Result<()> {
    let data = SampleGenerator::new(&config.generator).generate()?;
    write_sample_data(&data, &config.data.raw_dir)
        .with_context(|| format!("failed to write sample data to {}", config.data.raw_dir.display()))?;
    Ok(())
}

pub fn clean(config: &AppConfig) -> anyhow::Result<CleaningSummary> {
    let now = chrono::Local::now().naive_local();
    let mut summary = CleaningSummary::default();

    let events_path = raw_path(config, RAW_EVENTS);
    let events = clean_events(&read_raw(&events_path)?, &config.cleaning, now, &mut summary)
        .with_context(|| format!("failed to clean {}", events_path.display()))?;
    let products_path = raw_path(config, RAW_PRODUCTS);
    let products = clean_products(&read_raw(&products_path)?, &config.cleaning, &mut summary)
        .with_context(|| format!("failed to clean {}", products_path.display()))?;

    save_event_log(&events, &cleaned_path(config, CLEANED_EVENTS))?;
    save_products(&products, &cleaned_path(config, CLEANED_PRODUCTS))?;
    report_writer(config)?.write_json(CLEANING_SUMMARY, &summary)?;

    info!(
        events = summary.events_rows,
        products = summary.products_rows,
        dir = %config.data.cleaned_dir.display(),
        "Cleaning complete"
    );
    Ok(summary)
}

/// Writes the overall funnel plus one table per segment attribute present in
/// the cleaned log. Attributes the log lacks are skipped.
pub fn funnel(config: &AppConfig, attributes: &[String]) -> anyhow::Result<FunnelReport> {
    let events_path = cleaned_path(config, CLEANED_EVENTS);
    let log = load_event_log(&events_path).with_context(|| format!("failed to load {}", events_path.display()))?;

    let analyzer = FunnelAnalyzer::new();
    let report = analyzer.analyze(&log);
    let writer = report_writer(config)?;
    writer.write_table(FUNNEL_COUNTS, &report.counts)?;
    writer.write_table(FUNNEL_CONVERSION_RATES, &report.conversions)?;

    let mut written = 0;
    for attribute in attributes {
        if let Some(segmented) = analyzer.analyze_by_segment(&log, attribute) {
            writer.write_segmented(&segmented)?;
            written += 1;
        }
    }

    info!(
        sessions = report.sessions,
        purchase_pct = report.conversions.last().map_or(0.0, |c| c.conversion_from_visit_pct),
        segment_tables = written,
        "Funnel analysis complete"
    );
    Ok(report)
}

pub fn insights(config: &AppConfig) -> anyhow::Result<Kpis> {
    let events_path = cleaned_path(config, CLEANED_EVENTS);
    let products_path = cleaned_path(config, CLEANED_PRODUCTS);
    let log = load_event_log(&events_path).with_context(|| format!("failed to load {}", events_path.display()))?;
    let catalog =
        load_products(&products_path).with_context(|| format!("failed to load {}", products_path.display()))?;

    let insights = SalesInsights::new(&log, &catalog);
    let kpis = insights.kpis();
    let writer = report_writer(config)?;
    writer.write_table(TOP_PRODUCTS, &insights.top_products())?;
    writer.write_table(REVENUE_BY_CATEGORY, &insights.revenue_by_category())?;
    writer.write_table(DAILY_REVENUE, &insights.daily_revenue())?;
    writer.write_table(KPIS, std::slice::from_ref(&kpis))?;
    writer.write_table(REVENUE_HEATMAP, &insights.seasonality())?;

    info!(
        total_revenue = kpis.total_revenue,
        orders = kpis.total_orders,
        aov = kpis.aov,
        "Insights complete"
    );
    Ok(kpis)
}

/// Runs every step in order, stopping at the first failure.
pub fn run(config: &AppConfig, skip_generate: bool) -> anyhow::Result<()> {
    if !skip_generate {
        generate(config).context("step `generate` failed")?;
    }
    clean(config).context("step `clean` failed")?;
    funnel(config, &config.funnel.segment_attributes).context("step `funnel` failed")?;
    insights(config).context("step `insights` failed")?;
    info!(outputs = %config.data.outputs_dir.display(), "Pipeline complete");
    Ok(())
}
