use itertools::Itertools;
use log::warn;
use serde::Serialize;

use super::{
    LapRange,
    gap::{GapAligner, GapAnalysis, PitEvent},
};
use crate::{EnduroError, race::RowStore};

#[derive(Clone, Debug, Serialize)]
pub struct ComparisonFailure {
    pub car_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MultiCarGapAnalysis {
    pub reference: String,
    pub lap_range: LapRange,
    pub comparisons: Vec<GapAnalysis>,
    pub failures: Vec<ComparisonFailure>,
    /// Pit stops of the reference and every compared car, one list for combined display
    pub pit_events: Vec<PitEvent>,
}

/// Gaps from one reference car to each of `others` over the same laps. A pair that cannot
/// be aligned is recorded as a failure and the remaining pairs are still computed.
pub fn compare_many<S: AsRef<str>>(
    store: &RowStore,
    reference: &str,
    others: &[S],
    lap_range: LapRange,
) -> Result<MultiCarGapAnalysis, EnduroError> {
    let aligner = GapAligner::new(store);
    let mut pit_events = aligner.pit_events(reference, lap_range)?;
    let mut comparisons = Vec::with_capacity(others.len());
    let mut failures = Vec::new();

    for other in others.iter().map(|o| o.as_ref()) {
        match aligner.compare(reference, other, lap_range) {
            Ok(analysis) => comparisons.push(analysis),
            Err(e) => {
                warn!("Skipping gap from #{} to #{}: {}", reference, other, e);
                failures.push(ComparisonFailure {
                    car_id: other.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for other in others
        .iter()
        .map(|o| o.as_ref())
        .unique()
        .filter(|o| *o != reference)
    {
        if let Ok(events) = aligner.pit_events(other, lap_range) {
            pit_events.extend(events);
        }
    }

    Ok(MultiCarGapAnalysis {
        reference: reference.to_string(),
        lap_range,
        comparisons,
        failures,
        pit_events,
    })
}
