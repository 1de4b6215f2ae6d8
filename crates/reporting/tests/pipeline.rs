use std::fs;

use chrono::NaiveDate;
use funnel_core::config::{CleaningConfig, GeneratorConfig, OutputFormat};
use funnel_core::types::DEFAULT_SEGMENT_ATTRIBUTES;
use funnel_ingest::generator::write_sample_data;
use funnel_ingest::{
    clean_events, clean_products, load_event_log, load_products, save_event_log, save_products, CleaningSummary,
    RawTable, SampleGenerator,
};
use funnel_reporting::export::{FUNNEL_CONVERSION_RATES, FUNNEL_COUNTS, KPIS, TOP_PRODUCTS};
use funnel_reporting::{FunnelAnalyzer, ReportWriter, SalesInsights};

#[test]
fn generated_data_flows_through_to_reports() {
    let dir = tempfile::tempdir().unwrap();
    let raw_dir = dir.path().join("raw");
    let cleaned_dir = dir.path().join("cleaned");
    let outputs_dir = dir.path().join("outputs");

    let config = GeneratorConfig {
        n_users: 50,
        n_sessions: 300,
        n_products: 20,
        ..GeneratorConfig::default()
    };
    let data = SampleGenerator::new(&config).generate().unwrap();
    write_sample_data(&data, &raw_dir).unwrap();

    let now = NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let cleaning = CleaningConfig::default();
    let mut summary = CleaningSummary::default();
    let events = clean_events(
        &RawTable::from_path(&raw_dir.join("events.csv")).unwrap(),
        &cleaning,
        now,
        &mut summary,
    )
    .unwrap();
    let products = clean_products(
        &RawTable::from_path(&raw_dir.join("products.csv")).unwrap(),
        &cleaning,
        &mut summary,
    )
    .unwrap();
    assert_eq!(summary.events_rows, data.events.len());
    assert_eq!(products.len(), 20);

    save_event_log(&events, &cleaned_dir.join("events_cleaned.csv")).unwrap();
    save_products(&products, &cleaned_dir.join("products_cleaned.csv")).unwrap();
    let log = load_event_log(&cleaned_dir.join("events_cleaned.csv")).unwrap();
    let catalog = load_products(&cleaned_dir.join("products_cleaned.csv")).unwrap();

    let analyzer = FunnelAnalyzer::new();
    let report = analyzer.analyze(&log);
    assert_eq!(report.sessions, 300);
    // every generated session opens with a visit
    assert_eq!(report.counts[0].count, 300);
    let purchasing: usize = data.sessions.iter().filter(|s| s.purchase && s.is_signup).count();
    assert_eq!(report.counts[3].count, purchasing as u64);

    let writer = ReportWriter::new(&outputs_dir, OutputFormat::Csv).unwrap();
    writer.write_table(FUNNEL_COUNTS, &report.counts).unwrap();
    writer.write_table(FUNNEL_CONVERSION_RATES, &report.conversions).unwrap();
    for attribute in DEFAULT_SEGMENT_ATTRIBUTES {
        let segmented = analyzer.analyze_by_segment(&log, attribute).unwrap();
        assert_eq!(segmented.conflicting_sessions, 0);
        let visits: u64 = segmented.rows.iter().step_by(4).map(|r| r.count).sum();
        assert_eq!(visits, 300);
        writer.write_segmented(&segmented).unwrap();
    }

    let insights = SalesInsights::new(&log, &catalog);
    writer.write_table(TOP_PRODUCTS, &insights.top_products()).unwrap();
    let kpis = insights.kpis();
    writer.write_table(KPIS, std::slice::from_ref(&kpis)).unwrap();
    assert_eq!(kpis.total_orders, data.sessions.iter().filter(|s| s.purchase).count() as u64);

    for name in [
        "funnel_counts.csv",
        "funnel_conversion_rates.csv",
        "funnel_by_device.csv",
        "funnel_by_region.csv",
        "funnel_by_campaign_source.csv",
        "top_products.csv",
        "kpis.csv",
    ] {
        assert!(outputs_dir.join(name).exists(), "{name} missing");
    }
    let counts = fs::read_to_string(outputs_dir.join("funnel_counts.csv")).unwrap();
    assert!(counts.starts_with("stage,count\nvisit,300\n"));
}
