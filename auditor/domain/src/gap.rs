use crate::AuditWindow;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Gaps strictly longer than this are reported as [`GapSeverity::High`].
pub const HIGH_SEVERITY_THRESHOLD_SECONDS: i64 = 3_600;

/// A missing range `[start, end)` inside an audited window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration_seconds: i64,
    expected_records: i64,
}

impl GapInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, interval_seconds: i64) -> Self {
        let duration_seconds = (end - start).num_seconds().max(0);
        let expected_records = if interval_seconds > 0 {
            duration_seconds / interval_seconds
        } else {
            0
        };

        Self {
            start,
            end,
            duration_seconds,
            expected_records,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    pub fn expected_records(&self) -> i64 {
        self.expected_records
    }

    pub fn severity(&self) -> GapSeverity {
        GapSeverity::from_duration(self.duration_seconds)
    }

    /// Whether this gap is large enough to count as actionable.
    pub fn is_at_least(&self, min_gap_seconds: i64) -> bool {
        self.duration_seconds >= min_gap_seconds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapSeverity {
    Medium,
    High,
}

impl GapSeverity {
    pub fn from_duration(duration_seconds: i64) -> Self {
        if duration_seconds > HIGH_SEVERITY_THRESHOLD_SECONDS {
            GapSeverity::High
        } else {
            GapSeverity::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GapSeverity::Medium => "medium",
            GapSeverity::High => "high",
        }
    }
}

impl fmt::Display for GapSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the gap audit log persists for every emitted [`GapInterval`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapAuditEntry {
    pub id: Uuid,
    pub dataset_id: String,
    pub symbol: String,
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    pub severity: GapSeverity,
    pub logged_at: DateTime<Utc>,
}

impl GapAuditEntry {
    pub fn new(window: &AuditWindow, gap: &GapInterval, logged_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id: window.dataset_id(),
            symbol: window.symbol().to_string(),
            gap_start: gap.start(),
            gap_end: gap.end(),
            severity: gap.severity(),
            logged_at,
        }
    }
}

/// Walks the record timestamps of `window` and returns the missing ranges in
/// chronological order.
///
/// Timestamps may arrive unsorted and may repeat; anything outside the window
/// is ignored. A record is late, not missing, while it arrives no later than
/// one interval plus `tolerance_seconds` after its predecessor (or after the
/// window start for the first record).
pub fn detect_gaps(
    window: &AuditWindow,
    mut timestamps: Vec<DateTime<Utc>>,
    interval_seconds: i64,
    tolerance_seconds: i64,
) -> Vec<GapInterval> {
    timestamps.retain(|ts| window.contains(*ts));
    timestamps.sort_unstable();

    let (first, last) = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return vec![GapInterval::new(
                window.start(),
                window.end(),
                interval_seconds,
            )]
        }
    };

    let interval = TimeDelta::try_seconds(interval_seconds);
    let slack = interval
        .zip(TimeDelta::try_seconds(tolerance_seconds.max(0)))
        .and_then(|(interval, tolerance)| interval.checked_add(&tolerance));
    let mut gaps = Vec::new();

    // A threshold that overflows the calendar cannot be crossed.
    let late_after = |ts: DateTime<Utc>| slack.and_then(|slack| ts.checked_add_signed(slack));
    let next_expected = |ts: DateTime<Utc>| interval.and_then(|i| ts.checked_add_signed(i));

    if late_after(window.start()).is_some_and(|threshold| first > threshold) {
        gaps.push(GapInterval::new(window.start(), first, interval_seconds));
    }

    for pair in timestamps.windows(2) {
        if late_after(pair[0]).is_some_and(|threshold| pair[1] > threshold) {
            if let Some(expected_next) = next_expected(pair[0]) {
                gaps.push(GapInterval::new(expected_next, pair[1], interval_seconds));
            }
        }
    }

    let early_before = slack.and_then(|slack| window.end().checked_sub_signed(slack));
    if early_before.is_some_and(|threshold| last < threshold) {
        if let Some(gap_start) = next_expected(last) {
            gaps.push(GapInterval::new(gap_start, window.end(), interval_seconds));
        }
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const TOLERANCE: i64 = 60;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(offset_seconds: i64) -> DateTime<Utc> {
        base() + Duration::seconds(offset_seconds)
    }

    fn window(timeframe: &str, start: i64, end: i64) -> AuditWindow {
        AuditWindow::new("BTCUSDT", timeframe, at(start), at(end)).unwrap()
    }

    #[test]
    fn test_empty_window_is_one_gap() {
        let window = window("1h", 0, 86_400);

        let gaps = detect_gaps(&window, Vec::new(), 3_600, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), window.start());
        assert_eq!(gaps[0].end(), window.end());
        assert_eq!(gaps[0].duration_seconds(), 86_400);
        assert_eq!(gaps[0].expected_records(), 24);
    }

    #[test]
    fn test_zero_length_window_without_records() {
        let window = window("1m", 0, 0);

        let gaps = detect_gaps(&window, Vec::new(), 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration_seconds(), 0);
        assert_eq!(gaps[0].expected_records(), 0);
    }

    #[test]
    fn test_no_gaps_within_tolerance() {
        let offsets = [0, 60, 121, 240, 359, 420, 480];
        let window = window("1m", 0, 540);
        let timestamps = offsets.iter().map(|o| at(*o)).collect();

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_records_61_seconds_apart_are_not_a_gap() {
        let window = window("1m", 0, 121);

        let gaps = detect_gaps(&window, vec![at(0), at(61)], 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_interior_gap_precision() {
        let t1 = 3 * 60 + TOLERANCE + 1;
        let window = window("1m", 0, t1 + 1);

        let gaps = detect_gaps(&window, vec![at(0), at(t1)], 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(60));
        assert_eq!(gaps[0].end(), at(t1));
        assert_eq!(gaps[0].duration_seconds(), t1 - 60);
        assert_eq!(gaps[0].expected_records(), (t1 - 60) / 60);
    }

    #[test]
    fn test_missing_first_records_is_leading_gap_only() {
        let window = window("1m", 0, 600);
        let timestamps = (3..10).map(|i| at(i * 60)).collect();

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(0));
        assert_eq!(gaps[0].end(), at(180));
        assert_eq!(gaps[0].expected_records(), 3);
    }

    #[test]
    fn test_trailing_gap() {
        let window = window("1m", 0, 3_600);
        let timestamps = (0..=10).map(|i| at(i * 60)).collect();

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(660));
        assert_eq!(gaps[0].end(), at(3_600));
        assert_eq!(gaps[0].duration_seconds(), 2_940);
        assert_eq!(gaps[0].expected_records(), 49);
    }

    #[test]
    fn test_hourly_scenario_with_three_missing_candles() {
        let window = window("1h", 0, 86_400);
        let timestamps = (0..24)
            .filter(|hour| !(12..15).contains(hour))
            .map(|hour| at(hour * 3_600))
            .collect();

        let gaps = detect_gaps(&window, timestamps, 3_600, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(12 * 3_600));
        assert_eq!(gaps[0].end(), at(15 * 3_600));
        assert_eq!(gaps[0].duration_seconds(), 10_800);
        assert_eq!(gaps[0].expected_records(), 3);
        assert_eq!(gaps[0].severity(), GapSeverity::High);
    }

    #[test]
    fn test_unsorted_and_duplicate_timestamps() {
        let window = window("1m", 0, 300);
        let timestamps = vec![at(240), at(0), at(60), at(60), at(180), at(120), at(0)];

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_out_of_window_timestamps_ignored() {
        let window = window("1m", 600, 900);
        let timestamps = vec![at(0), at(600), at(660), at(720), at(780), at(840), at(900)];

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_gaps_are_ordered_and_disjoint() {
        let window = window("1m", 0, 7_200);
        let timestamps = vec![at(1_000), at(1_060), at(2_000), at(2_060), at(4_000), at(4_060)];

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert_eq!(gaps.len(), 4);
        for pair in gaps.windows(2) {
            assert!(pair[0].start() < pair[1].start());
            assert!(pair[0].end() <= pair[1].start());
        }
        for gap in &gaps {
            assert!(gap.expected_records() * 60 <= gap.duration_seconds());
        }
    }

    #[test]
    fn test_consecutive_records_exactly_at_tolerance_are_not_a_gap() {
        let window = window("1m", 0, 180);

        let gaps = detect_gaps(&window, vec![at(0), at(60 + TOLERANCE)], 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_consecutive_records_one_second_past_tolerance_are_a_gap() {
        let window = window("1m", 0, 181);

        let gaps = detect_gaps(&window, vec![at(0), at(60 + TOLERANCE + 1)], 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(60));
        assert_eq!(gaps[0].end(), at(60 + TOLERANCE + 1));
    }

    #[test]
    fn test_first_record_exactly_at_leading_threshold_is_on_time() {
        let first = 60 + TOLERANCE;
        let window = window("1m", 0, first + 60);

        let gaps = detect_gaps(&window, vec![at(first)], 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_first_record_one_second_past_leading_threshold_is_a_gap() {
        let first = 60 + TOLERANCE + 1;
        let window = window("1m", 0, first + 60);

        let gaps = detect_gaps(&window, vec![at(first)], 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(0));
        assert_eq!(gaps[0].end(), at(first));
    }

    #[test]
    fn test_last_record_exactly_at_trailing_threshold_is_on_time() {
        let end = 600;
        let window = window("1m", 0, end);
        let last = end - 60 - TOLERANCE;
        let timestamps = (0..=last / 60).map(|i| at(i * 60)).collect();

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_last_record_one_second_before_trailing_threshold_is_a_gap() {
        let end = 601;
        let window = window("1m", 0, end);
        let timestamps = (0..=8).map(|i| at(i * 60)).collect();

        let gaps = detect_gaps(&window, timestamps, 60, TOLERANCE);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start(), at(540));
        assert_eq!(gaps[0].end(), at(end));
    }

    #[test]
    fn test_interval_past_calendar_range_reports_no_boundary_gap() {
        let window = window("100000000d", 0, 86_400);

        let gaps = detect_gaps(&window, vec![at(0)], 8_640_000_000_000, TOLERANCE);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_out_of_range_tolerance_does_not_panic() {
        let window = window("1m", 0, 3_600);

        let gaps = detect_gaps(&window, vec![at(0), at(1_800)], 60, 9_999_999_999_999_999);

        assert!(gaps.is_empty());
    }

    #[test]
    fn test_severity_threshold() {
        assert_eq!(GapSeverity::from_duration(3_600), GapSeverity::Medium);
        assert_eq!(GapSeverity::from_duration(3_601), GapSeverity::High);
        assert_eq!(
            serde_json::to_string(&GapSeverity::High).unwrap(),
            "\"high\""
        );
    }

    #[test]
    fn test_audit_entry_carries_dataset_id() {
        let window = window("5m", 0, 3_600);
        let gap = GapInterval::new(at(300), at(900), 300);

        let entry = GapAuditEntry::new(&window, &gap, at(3_600));

        assert_eq!(entry.dataset_id, "candles_BTCUSDT_5m");
        assert_eq!(entry.symbol, "BTCUSDT");
        assert_eq!(entry.gap_start, at(300));
        assert_eq!(entry.severity, GapSeverity::Medium);
    }
}
