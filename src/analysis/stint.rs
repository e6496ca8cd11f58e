use std::ops::Range;

use itertools::Itertools;
use serde::Serialize;

use crate::race::Row;

/// One lap of a car as seen by the degradation analysis. The first row of a car never
/// becomes a sample because its lap time cannot be checked against a previous lap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CarSample {
    pub lap_number: u32,
    /// Absolute seconds from race start, `None` when the clock could not be parsed
    pub session_time: Option<f64>,
    /// `None` when the lap is not representative of race pace
    pub lap_time: Option<f64>,
    pub in_pit: bool,
}

impl CarSample {
    pub fn is_valid(&self) -> bool {
        self.lap_time.is_some()
    }
}

/// A lap time only counts when neither it nor the lap before it ran under yellow or
/// touched the pit lane, so every caution or stop knocks out two consecutive laps.
pub fn is_representative_lap(previous: &Row, current: &Row) -> bool {
    !(current.is_yellow() || previous.is_yellow() || current.in_pit() || previous.in_pit())
}

/// Builds the per-lap samples for one car from its rows in file order
pub fn car_samples(rows: &[&Row]) -> Vec<CarSample> {
    rows.iter()
        .tuple_windows()
        .map(|(previous, current)| {
            let session_time = current.session_seconds();
            let lap_time = if is_representative_lap(previous, current) && session_time.is_some()
            {
                current.lap_seconds()
            } else {
                None
            };
            CarSample {
                lap_number: current.lap_number,
                session_time,
                lap_time,
                in_pit: current.in_pit(),
            }
        })
        .collect()
}

/// Maximal run of valid samples. `start..end` indexes into the car's sample list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Stint {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Stint {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

pub fn segment_stints(samples: &[CarSample]) -> Vec<Stint> {
    let mut stints = Vec::new();
    let mut open: Option<usize> = None;

    for (i, sample) in samples.iter().enumerate() {
        match (sample.is_valid(), open) {
            (true, None) => open = Some(i),
            (false, Some(start)) => {
                stints.push(Stint {
                    index: stints.len(),
                    start,
                    end: i,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        stints.push(Stint {
            index: stints.len(),
            start,
            end: samples.len(),
        });
    }
    stints
}
