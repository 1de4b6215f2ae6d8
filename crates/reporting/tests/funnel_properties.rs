use chrono::{NaiveDate, NaiveDateTime};
use funnel_core::{Event, EventLog, FUNNEL_STAGES};
use funnel_reporting::FunnelAnalyzer;
use proptest::prelude::*;

fn ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 2)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// Each session is a set of stage flags plus an optional device value. The
/// `device` column is always declared, even when no event carries it.
fn build_log(sessions: &[([bool; 4], Option<u8>)]) -> EventLog {
    let devices = ["mobile", "desktop", "tablet"];
    let mut events = Vec::new();
    for (i, (flags, device)) in sessions.iter().enumerate() {
        let id = format!("S{i:04}");
        for (stage, _) in FUNNEL_STAGES.iter().zip(flags).filter(|(_, f)| **f) {
            let mut event = Event::new(&id, *stage, ts());
            if let Some(d) = device {
                event = event.with_segment("device", devices[*d as usize % devices.len()]);
            }
            events.push(event);
        }
    }
    let mut log = EventLog::from_events(events);
    if !log.has_column("device") {
        let mut columns = log.columns().to_vec();
        columns.push("device".into());
        log = EventLog::new(columns, log.events().to_vec());
    }
    log
}

fn sessions_strategy() -> impl Strategy<Value = Vec<([bool; 4], Option<u8>)>> {
    prop::collection::vec((any::<[bool; 4]>(), prop::option::of(0u8..3)), 0..60)
}

proptest! {
    #[test]
    fn counts_never_increase(sessions in sessions_strategy()) {
        let report = FunnelAnalyzer::new().analyze(&build_log(&sessions));
        for pair in report.counts.windows(2) {
            prop_assert!(pair[1].count <= pair[0].count);
        }
    }

    #[test]
    fn rates_stay_in_bounds(sessions in sessions_strategy()) {
        let report = FunnelAnalyzer::new().analyze(&build_log(&sessions));
        for row in &report.conversions {
            prop_assert!((0.0..=100.0).contains(&row.conversion_from_visit_pct));
            prop_assert!((0.0..=100.0).contains(&row.conversion_from_previous_stage_pct));
            prop_assert!((0.0..=100.0).contains(&row.drop_off_from_previous_pct));
        }
    }

    #[test]
    fn first_stage_is_identity(sessions in sessions_strategy()) {
        let report = FunnelAnalyzer::new().analyze(&build_log(&sessions));
        let first = &report.conversions[0];
        prop_assert_eq!(first.conversion_from_previous_stage_pct, 100.0);
        prop_assert_eq!(first.drop_off_from_previous_pct, 0.0);
        if first.count > 0 {
            prop_assert_eq!(first.conversion_from_visit_pct, 100.0);
        }
    }

    #[test]
    fn drop_off_complements_conversion(sessions in sessions_strategy()) {
        let report = FunnelAnalyzer::new().analyze(&build_log(&sessions));
        for (i, row) in report.conversions.iter().enumerate().skip(1) {
            let sum = row.conversion_from_previous_stage_pct + row.drop_off_from_previous_pct;
            prop_assert!((sum - 100.0).abs() <= 0.011, "stage {} sums to {}", i, sum);
            if report.counts[i - 1].count == 0 {
                prop_assert_eq!(row.drop_off_from_previous_pct, 100.0);
            }
        }
    }

    #[test]
    fn segments_partition_sessions(sessions in sessions_strategy()) {
        let log = build_log(&sessions);
        let analyzer = FunnelAnalyzer::new();
        let overall = analyzer.analyze(&log);
        let segmented = analyzer.analyze_by_segment(&log, "device").unwrap();

        prop_assert_eq!(segmented.rows.len(), segmented.segments().len() * 4);
        let expected: u64 = sessions
            .iter()
            .filter(|(flags, device)| flags[0] && device.is_some())
            .count() as u64;
        let segmented_visits: u64 = segmented
            .rows
            .iter()
            .filter(|r| r.stage == FUNNEL_STAGES[0])
            .map(|r| r.count)
            .sum();
        prop_assert_eq!(segmented_visits, expected);
        prop_assert!(segmented_visits <= overall.counts[0].count);
    }
}
