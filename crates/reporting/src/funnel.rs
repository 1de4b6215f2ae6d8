//! Funnel analysis — tracks session progression through the ordered
//! visit → signup → add_to_cart → purchase funnel, overall and per segment.

use std::collections::BTreeMap;

use funnel_core::{EventLog, FunnelStage, FUNNEL_STAGES};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const STAGE_COUNT: usize = FUNNEL_STAGES.len();

/// Which stages one session produced events for. Ordering is not enforced
/// here: a session may have `purchase` set without `signup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStages {
    pub session_id: String,
    pub flags: [bool; STAGE_COUNT],
    pub segment: Option<String>,
}

impl SessionStages {
    pub fn has(&self, stage: FunnelStage) -> bool {
        self.flags[stage.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: FunnelStage,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConversion {
    pub stage: FunnelStage,
    pub count: u64,
    pub conversion_from_visit_pct: f64,
    pub conversion_from_previous_stage_pct: f64,
    pub drop_off_from_previous_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConversion {
    pub stage: FunnelStage,
    pub count: u64,
    pub conversion_from_visit_pct: f64,
    pub conversion_from_previous_stage_pct: f64,
    pub drop_off_from_previous_pct: f64,
    pub segment: String,
}

impl SegmentConversion {
    fn new(segment: &str, row: StageConversion) -> Self {
        Self {
            stage: row.stage,
            count: row.count,
            conversion_from_visit_pct: row.conversion_from_visit_pct,
            conversion_from_previous_stage_pct: row.conversion_from_previous_stage_pct,
            drop_off_from_previous_pct: row.drop_off_from_previous_pct,
            segment: segment.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelReport {
    pub sessions: usize,
    pub counts: Vec<StageCount>,
    pub conversions: Vec<StageConversion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentedFunnel {
    pub attribute: String,
    pub rows: Vec<SegmentConversion>,
    /// Sessions whose events disagreed on the segment value.
    pub conflicting_sessions: usize,
}

impl SegmentedFunnel {
    /// Distinct segment values, in output order.
    pub fn segments(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for row in &self.rows {
            if out.last() != Some(&row.segment.as_str()) {
                out.push(&row.segment);
            }
        }
        out
    }

    pub fn rows_for<'a>(&'a self, segment: &'a str) -> impl Iterator<Item = &'a SegmentConversion> {
        self.rows.iter().filter(move |r| r.segment == segment)
    }
}

/// Computes strictly ordered funnels over an event log. The stage order is
/// fixed at construction.
pub struct FunnelAnalyzer {
    stages: [FunnelStage; STAGE_COUNT],
}

impl FunnelAnalyzer {
    pub fn new() -> Self {
        Self {
            stages: FUNNEL_STAGES,
        }
    }

    pub fn stages(&self) -> &[FunnelStage] {
        &self.stages
    }

    /// Reduces the log to one record per session (ascending session id),
    /// flagging every stage the session produced at least one event for.
    pub fn detect_sessions(&self, log: &EventLog) -> Vec<SessionStages> {
        self.collect_sessions(log, None).0
    }

    /// Groups events by session. With an attribute, each session takes the
    /// first non-empty value seen in log order; the second return value
    /// counts sessions whose later events disagree with that value.
    fn collect_sessions(&self, log: &EventLog, attribute: Option<&str>) -> (Vec<SessionStages>, usize) {
        let mut by_session: BTreeMap<&str, ([bool; STAGE_COUNT], Option<&str>, bool)> = BTreeMap::new();
        for event in log.events() {
            let (flags, segment, conflict) = by_session.entry(event.session_id.as_str()).or_default();
            if let Some(i) = self.position(event.kind) {
                flags[i] = true;
            }
            if let Some(value) = attribute.and_then(|a| event.segment(a)) {
                match segment {
                    None => *segment = Some(value),
                    Some(first) if *first != value => *conflict = true,
                    Some(_) => {}
                }
            }
        }

        let conflicts = by_session.values().filter(|(_, _, c)| *c).count();
        let sessions = by_session
            .into_iter()
            .map(|(session_id, (flags, segment, _))| SessionStages {
                session_id: session_id.to_string(),
                flags,
                segment: segment.map(str::to_string),
            })
            .collect();
        (sessions, conflicts)
    }

    fn position(&self, stage: FunnelStage) -> Option<usize> {
        self.stages.iter().position(|s| *s == stage)
    }

    /// Counts, per stage, the sessions that reached that stage and every
    /// stage before it.
    pub fn count_stages(&self, sessions: &[SessionStages]) -> Vec<StageCount> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, &stage)| {
                let count = sessions
                    .iter()
                    .filter(|s| s.flags[..=i].iter().all(|&reached| reached))
                    .count() as u64;
                StageCount { stage, count }
            })
            .collect()
    }

    /// Derives conversion and drop-off percentages from ordered stage counts.
    ///
    /// A zero denominator yields a 0% conversion instead of an error, so an
    /// empty previous stage reports 100% drop-off. The first stage is always
    /// 100% converted from itself with no drop-off. Values are rounded to two
    /// decimals after computing at full precision.
    pub fn conversion_rates(&self, counts: &[StageCount]) -> Vec<StageConversion> {
        let first = counts.first().map_or(0, |c| c.count);
        counts
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let (from_previous, drop_off) = match i {
                    0 => (100.0, 0.0),
                    _ => {
                        let pct = percentage(row.count, counts[i - 1].count);
                        (pct, 100.0 - pct)
                    }
                };
                StageConversion {
                    stage: row.stage,
                    count: row.count,
                    conversion_from_visit_pct: round2(percentage(row.count, first)),
                    conversion_from_previous_stage_pct: round2(from_previous),
                    drop_off_from_previous_pct: round2(drop_off),
                }
            })
            .collect()
    }

    /// Runs the full unsegmented funnel over the log.
    pub fn analyze(&self, log: &EventLog) -> FunnelReport {
        let sessions = self.detect_sessions(log);
        let counts = self.count_stages(&sessions);
        let conversions = self.conversion_rates(&counts);
        info!(
            events = log.len(),
            sessions = sessions.len(),
            counts = ?counts.iter().map(|c| c.count).collect::<Vec<_>>(),
            "Funnel computed"
        );
        FunnelReport {
            sessions: sessions.len(),
            counts,
            conversions,
        }
    }

    /// Runs the funnel independently for every value of `attribute`.
    ///
    /// Returns `None` when the attribute is not a segment column of the log;
    /// fixed event columns such as `session_id` never qualify. Sessions
    /// without a value for the attribute are left out; segments are emitted
    /// in ascending order, four rows each.
    pub fn analyze_by_segment(&self, log: &EventLog, attribute: &str) -> Option<SegmentedFunnel> {
        if !log.segment_columns().contains(&attribute) {
            debug!(attribute, "Not a segment attribute of the event log, skipping");
            return None;
        }

        let (sessions, conflicting_sessions) = self.collect_sessions(log, Some(attribute));
        if conflicting_sessions > 0 {
            warn!(
                attribute,
                sessions = conflicting_sessions,
                "Sessions carry conflicting segment values, keeping the first seen"
            );
        }

        let mut partitions: BTreeMap<String, Vec<SessionStages>> = BTreeMap::new();
        for session in sessions {
            if let Some(segment) = session.segment.clone() {
                partitions.entry(segment).or_default().push(session);
            }
        }

        let rows = partitions
            .iter()
            .flat_map(|(segment, group)| {
                let counts = self.count_stages(group);
                self.conversion_rates(&counts)
                    .into_iter()
                    .map(move |row| SegmentConversion::new(segment, row))
            })
            .collect();

        info!(attribute, segments = partitions.len(), "Segmented funnel computed");
        Some(SegmentedFunnel {
            attribute: attribute.to_string(),
            rows,
            conflicting_sessions,
        })
    }
}

impl Default for FunnelAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─── Tests ──────────────────────────────────────────────────────────────────
