use std::cmp::Ordering;

use log::debug;
use serde::Serialize;

use super::LapRange;
use crate::{
    EnduroError,
    race::{Row, RowStore},
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GapSample {
    pub lap_number: u32,
    /// Reference session time minus the other car's, positive when the reference is behind
    pub delta_seconds: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct YellowSpan {
    pub start_lap: u32,
    pub end_lap: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PitEvent {
    pub car_id: String,
    pub lap_number: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct GapAnalysis {
    pub reference: String,
    pub other: String,
    pub lap_range: LapRange,
    pub gaps: Vec<GapSample>,
    pub yellow_spans: Vec<YellowSpan>,
    pub reference_pits: Vec<PitEvent>,
    pub other_pits: Vec<PitEvent>,
}

/// Merge walk over two cars' rows in lap order. Where both cars have the lap the gap is
/// measured; where one car skips ahead the last measured gap is carried forward. The walk
/// must open on a shared lap, otherwise there is nothing to carry.
pub fn align_gaps(
    reference: &[&Row],
    other: &[&Row],
    lap_range: LapRange,
) -> Result<Vec<GapSample>, EnduroError> {
    let undefined = |lap: u32| EnduroError::UndefinedInitialGap {
        reference: reference
            .first()
            .map(|r| r.car_id.clone())
            .unwrap_or_default(),
        other: other.first().map(|r| r.car_id.clone()).unwrap_or_default(),
        lap,
    };
    if reference.is_empty() || other.is_empty() {
        return Err(undefined(lap_range.lo));
    }

    let mut gaps: Vec<GapSample> = Vec::with_capacity(reference.len().max(other.len()));
    let mut last_gap: Option<f64> = None;
    let (mut i, mut j) = (0, 0);

    while i < reference.len() && j < other.len() {
        let (a, b) = (reference[i], other[j]);
        let (lap_number, measured) = match a.lap_number.cmp(&b.lap_number) {
            Ordering::Equal => {
                i += 1;
                j += 1;
                let measured = a
                    .session_seconds()
                    .zip(b.session_seconds())
                    .map(|(ta, tb)| ta - tb);
                (a.lap_number, measured)
            }
            Ordering::Greater => {
                j += 1;
                (b.lap_number, None)
            }
            Ordering::Less => {
                i += 1;
                (a.lap_number, None)
            }
        };

        let delta_seconds = measured.or(last_gap).ok_or_else(|| undefined(lap_number))?;
        last_gap = Some(delta_seconds);
        gaps.push(GapSample {
            lap_number,
            delta_seconds,
        });
    }
    Ok(gaps)
}

/// Second walk over the same rows, only looking at shared laps. A span opens when either
/// car shows yellow and closes on the next shared lap where either car shows green. A span
/// still open when the walk runs out is closed at the top of the lap range. Cars can log
/// several rows for one lap, so a caution that resumes on the lap its span closed on
/// extends that span rather than starting an overlapping one.
pub fn detect_yellow_spans(
    reference: &[&Row],
    other: &[&Row],
    lap_range: LapRange,
) -> Vec<YellowSpan> {
    let mut spans: Vec<YellowSpan> = Vec::new();
    let mut open_since: Option<u32> = None;
    let (mut i, mut j) = (0, 0);

    while i < reference.len() && j < other.len() {
        let (a, b) = (reference[i], other[j]);
        match a.lap_number.cmp(&b.lap_number) {
            Ordering::Equal => {
                let yellow = a.is_yellow() || b.is_yellow();
                let green = a.is_green() || b.is_green();
                match open_since {
                    None if yellow => {
                        let resumed = spans
                            .last()
                            .copied()
                            .filter(|span| span.end_lap == a.lap_number);
                        if resumed.is_some() {
                            spans.pop();
                        }
                        open_since = Some(resumed.map_or(a.lap_number, |span| span.start_lap));
                    }
                    Some(start_lap) if green => {
                        spans.push(YellowSpan {
                            start_lap,
                            end_lap: a.lap_number,
                        });
                        open_since = None;
                    }
                    _ => {}
                }
                i += 1;
                j += 1;
            }
            Ordering::Greater => j += 1,
            Ordering::Less => i += 1,
        }
    }

    if let Some(start_lap) = open_since {
        spans.push(YellowSpan {
            start_lap,
            end_lap: lap_range.hi,
        });
    }
    spans
}

/// One event per pit stop, at the first lap that ends in the pit lane
pub fn collect_pit_events(rows: &[&Row]) -> Vec<PitEvent> {
    let mut events = Vec::new();
    let mut in_pit = false;
    for row in rows {
        if row.in_pit() && !in_pit {
            events.push(PitEvent {
                car_id: row.car_id.clone(),
                lap_number: row.lap_number,
            });
        }
        in_pit = row.in_pit();
    }
    events
}

pub struct GapAligner<'store> {
    store: &'store RowStore,
}

impl<'store> GapAligner<'store> {
    pub fn new(store: &'store RowStore) -> Self {
        Self { store }
    }

    fn rows_for(&self, car_id: &str, lap_range: LapRange) -> Result<Vec<&'store Row>, EnduroError> {
        if !self.store.contains_car(car_id) {
            return Err(EnduroError::UnknownCar {
                car_id: car_id.to_string(),
            });
        }
        Ok(self
            .store
            .car_rows_in_range(car_id, lap_range.lo, lap_range.hi))
    }

    pub fn pit_events(
        &self,
        car_id: &str,
        lap_range: LapRange,
    ) -> Result<Vec<PitEvent>, EnduroError> {
        Ok(collect_pit_events(&self.rows_for(car_id, lap_range)?))
    }

    pub fn compare(
        &self,
        reference: &str,
        other: &str,
        lap_range: LapRange,
    ) -> Result<GapAnalysis, EnduroError> {
        let reference_rows = self.rows_for(reference, lap_range)?;
        let other_rows = self.rows_for(other, lap_range)?;
        debug!(
            "Comparing #{} ({} rows) with #{} ({} rows) over laps {}-{}",
            reference,
            reference_rows.len(),
            other,
            other_rows.len(),
            lap_range.lo,
            lap_range.hi
        );

        let gaps = align_gaps(&reference_rows, &other_rows, lap_range).map_err(|e| match e {
            EnduroError::UndefinedInitialGap { lap, .. } => EnduroError::UndefinedInitialGap {
                reference: reference.to_string(),
                other: other.to_string(),
                lap,
            },
            e => e,
        })?;

        Ok(GapAnalysis {
            reference: reference.to_string(),
            other: other.to_string(),
            lap_range,
            gaps,
            yellow_spans: detect_yellow_spans(&reference_rows, &other_rows, lap_range),
            reference_pits: collect_pit_events(&reference_rows),
            other_pits: collect_pit_events(&other_rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::test_support::{green, row};
    use crate::race::{Flag, TrackState};
    use itertools::Itertools;

    fn range(lo: u32, hi: u32) -> LapRange {
        LapRange::new(lo, hi).unwrap()
    }

    fn flagged(car_id: &str, lap: u32, flag: Flag) -> Row {
        row(car_id, lap, 105., lap as f64 * 105., flag, TrackState::Track)
    }

    fn caution_on(laps: std::ops::RangeInclusive<u32>) -> impl Fn(u32) -> Flag {
        move |lap| {
            if laps.contains(&lap) {
                Flag::Yellow
            } else {
                Flag::Green
            }
        }
    }

    fn gaps_between(a: &[Row], b: &[Row], lap_range: LapRange) -> Vec<GapSample> {
        align_gaps(&a.iter().collect_vec(), &b.iter().collect_vec(), lap_range).unwrap()
    }

    fn spans_between(a: &[Row], b: &[Row], lap_range: LapRange) -> Vec<YellowSpan> {
        detect_yellow_spans(&a.iter().collect_vec(), &b.iter().collect_vec(), lap_range)
    }

    #[test]
    fn test_gap_carried_forward_over_missing_lap() {
        let a = [green("A", 1, 100.), green("A", 2, 210.), green("A", 4, 430.)];
        let b = [
            green("B", 1, 100.),
            green("B", 2, 210.),
            green("B", 3, 320.),
            green("B", 4, 430.),
        ];
        let gaps = gaps_between(&a, &b, range(1, 4));

        assert_eq!(
            gaps.iter().map(|g| g.lap_number).collect_vec(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(gaps[2].delta_seconds, gaps[1].delta_seconds);
        assert!(gaps.iter().all(|g| g.delta_seconds == 0.));
    }

    #[test]
    fn test_carried_gap_is_not_interpolated() {
        let a = [green("A", 1, 100.), green("A", 2, 212.), green("A", 4, 440.)];
        let b = [
            green("B", 1, 99.),
            green("B", 2, 209.),
            green("B", 3, 318.),
            green("B", 4, 428.),
        ];
        let gaps = gaps_between(&a, &b, range(1, 4));
        assert_eq!(
            gaps.iter().map(|g| g.delta_seconds).collect_vec(),
            vec![1., 3., 3., 12.]
        );
    }

    #[test]
    fn test_reference_skip_advances_reference_side() {
        let a = [green("A", 1, 100.), green("A", 2, 205.), green("A", 3, 310.)];
        let b = [green("B", 1, 101.), green("B", 3, 312.)];
        let gaps = gaps_between(&a, &b, range(1, 3));
        assert_eq!(
            gaps,
            vec![
                GapSample {
                    lap_number: 1,
                    delta_seconds: -1.
                },
                GapSample {
                    lap_number: 2,
                    delta_seconds: -1.
                },
                GapSample {
                    lap_number: 3,
                    delta_seconds: -2.
                },
            ]
        );
    }

    #[test]
    fn test_repeated_lap_rows_are_paired_in_order() {
        // a flag change mid-lap logs a second row for the same lap
        let a = [
            flagged("A", 5, Flag::Yellow),
            flagged("A", 6, Flag::Green),
            row("A", 6, 105., 640., Flag::Yellow, TrackState::Track),
            flagged("A", 7, Flag::Yellow),
        ];
        let b = [
            row("B", 5, 105., 527., Flag::Yellow, TrackState::Track),
            row("B", 6, 105., 632., Flag::Green, TrackState::Track),
            row("B", 6, 105., 641., Flag::Yellow, TrackState::Track),
            row("B", 7, 105., 737., Flag::Yellow, TrackState::Track),
        ];
        let gaps = gaps_between(&a, &b, range(5, 9));
        assert_eq!(
            gaps.iter()
                .map(|g| (g.lap_number, g.delta_seconds))
                .collect_vec(),
            vec![(5, -2.), (6, -2.), (6, -1.), (7, -2.)]
        );
    }

    #[test]
    fn test_undefined_initial_gap() {
        let a = [green("A", 2, 210.), green("A", 3, 315.)];
        let b = [green("B", 1, 100.), green("B", 2, 211.)];
        let result = align_gaps(&a.iter().collect_vec(), &b.iter().collect_vec(), range(1, 3));
        assert!(matches!(
            result,
            Err(EnduroError::UndefinedInitialGap { lap: 1, .. })
        ));

        let empty: Vec<&Row> = Vec::new();
        assert!(align_gaps(&empty, &b.iter().collect_vec(), range(1, 3)).is_err());
    }

    #[test]
    fn test_yellow_span_closed_on_green() {
        let flag = caution_on(3..=5);
        let a = (1..=8).map(|lap| flagged("A", lap, flag(lap))).collect_vec();
        let b = (1..=8).map(|lap| flagged("B", lap, flag(lap))).collect_vec();
        assert_eq!(
            spans_between(&a, &b, range(1, 8)),
            vec![YellowSpan {
                start_lap: 3,
                end_lap: 6
            }]
        );
    }

    #[test]
    fn test_unterminated_yellow_span_closed_at_range_end() {
        let flag = caution_on(10..=20);
        let a = (1..=20).map(|lap| flagged("A", lap, flag(lap))).collect_vec();
        let b = (1..=20).map(|lap| flagged("B", lap, flag(lap))).collect_vec();
        assert_eq!(
            spans_between(&a, &b, range(1, 50)),
            vec![YellowSpan {
                start_lap: 10,
                end_lap: 50
            }]
        );
    }

    #[test]
    fn test_yellow_only_checked_on_shared_laps() {
        let a = [
            flagged("A", 1, Flag::Green),
            flagged("A", 2, Flag::Yellow),
            flagged("A", 3, Flag::Yellow),
            flagged("A", 4, Flag::Green),
        ];
        let b = [
            flagged("B", 1, Flag::Green),
            flagged("B", 3, Flag::Yellow),
            flagged("B", 4, Flag::Green),
        ];
        assert_eq!(
            spans_between(&a, &b, range(1, 4)),
            vec![YellowSpan {
                start_lap: 3,
                end_lap: 4
            }]
        );
    }

    #[test]
    fn test_caution_resumed_on_closing_lap_extends_span() {
        let rows = |car_id: &str| {
            [
                flagged(car_id, 5, Flag::Yellow),
                flagged(car_id, 6, Flag::Green),
                flagged(car_id, 6, Flag::Yellow),
            ]
        };
        let spans = spans_between(&rows("A"), &rows("B"), range(5, 9));
        assert_eq!(
            spans,
            vec![YellowSpan {
                start_lap: 5,
                end_lap: 9
            }]
        );
    }

    #[test]
    fn test_spans_never_overlap_with_repeated_laps() {
        let rows = |car_id: &str| {
            [
                flagged(car_id, 1, Flag::Yellow),
                flagged(car_id, 2, Flag::Green),
                flagged(car_id, 2, Flag::Yellow),
                flagged(car_id, 3, Flag::Green),
                flagged(car_id, 5, Flag::Yellow),
                flagged(car_id, 6, Flag::Green),
            ]
        };
        let spans = spans_between(&rows("A"), &rows("B"), range(1, 6));
        assert_eq!(
            spans,
            vec![
                YellowSpan {
                    start_lap: 1,
                    end_lap: 3
                },
                YellowSpan {
                    start_lap: 5,
                    end_lap: 6
                },
            ]
        );
        for pair in spans.windows(2) {
            assert!(pair[1].start_lap > pair[0].end_lap);
        }
    }

    #[test]
    fn test_consecutive_pit_rows_collapse() {
        let rows = [
            green("A", 1, 100.),
            row("A", 2, 160., 260., Flag::Green, TrackState::Pit),
            row("A", 3, 150., 410., Flag::Green, TrackState::Pit),
            green("A", 4, 515.),
            row("A", 5, 160., 675., Flag::Yellow, TrackState::Pit),
        ];
        let events = collect_pit_events(&rows.iter().collect_vec());
        assert_eq!(
            events.iter().map(|e| e.lap_number).collect_vec(),
            vec![2, 5]
        );
    }

    #[test]
    fn test_compare_restricts_to_range() {
        let store = RowStore::new(vec![
            green("27", 1, 100.),
            green("70", 1, 102.),
            green("27", 2, 205.),
            row("70", 2, 170., 272., Flag::Yellow, TrackState::Pit),
            green("27", 3, 310.),
            green("70", 3, 380.),
            green("27", 4, 415.),
            green("70", 4, 485.),
        ]);
        let aligner = GapAligner::new(&store);
        let analysis = aligner.compare("27", "70", range(2, 3)).unwrap();

        assert_eq!(
            analysis.gaps.iter().map(|g| g.delta_seconds).collect_vec(),
            vec![-67., -70.]
        );
        assert_eq!(
            analysis.yellow_spans,
            vec![YellowSpan {
                start_lap: 2,
                end_lap: 3
            }]
        );
        assert!(analysis.reference_pits.is_empty());
        assert_eq!(
            analysis.other_pits,
            vec![PitEvent {
                car_id: "70".to_string(),
                lap_number: 2
            }]
        );
    }

    #[test]
    fn test_compare_reports_car_names() {
        let store = RowStore::new(vec![green("27", 5, 500.), green("70", 6, 610.)]);
        let aligner = GapAligner::new(&store);
        match aligner.compare("27", "70", range(5, 6)) {
            Err(EnduroError::UndefinedInitialGap {
                reference,
                other,
                lap,
            }) => {
                assert_eq!(reference, "27");
                assert_eq!(other, "70");
                assert_eq!(lap, 5);
            }
            other => panic!(
                "Expected UndefinedInitialGap, got {:?}",
                other.map(|a| a.gaps)
            ),
        }
        assert!(matches!(
            aligner.compare("27", "99", range(5, 6)),
            Err(EnduroError::UnknownCar { .. })
        ));
    }
}
