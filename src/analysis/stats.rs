use itertools::Itertools;
use serde::Serialize;

use super::{LapRange, gap::GapAligner};
use crate::{
    EnduroError,
    race::{Flag, Row, RowStore},
};

/// Running pit-lane state for one car, built fresh on every scan
#[derive(Debug, Default)]
struct PitScan {
    in_pit: bool,
    last_exit_lap: u32,
    stops: usize,
    stops_under_green: usize,
    stops_under_yellow: usize,
    stint_laps: Vec<u32>,
}

impl PitScan {
    fn observe(&mut self, row: &Row) {
        if row.in_pit() && !self.in_pit {
            self.in_pit = true;
            self.stops += 1;
            self.stint_laps
                .push(row.lap_number.saturating_sub(self.last_exit_lap));
            match row.flag {
                Flag::Green => self.stops_under_green += 1,
                Flag::Yellow => self.stops_under_yellow += 1,
                _ => {}
            }
        } else if !row.in_pit() && self.in_pit {
            self.in_pit = false;
            self.last_exit_lap = row.lap_number;
        }
    }

    fn average_stint_laps(&self) -> Option<f64> {
        if self.stint_laps.is_empty() {
            return None;
        }
        Some(self.stint_laps.iter().sum::<u32>() as f64 / self.stint_laps.len() as f64)
    }

    fn yellow_green_ratio(&self) -> f64 {
        if self.stops_under_green == 0 {
            1.
        } else {
            self.stops_under_yellow as f64 / self.stops_under_green as f64
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CarSummary {
    pub car_id: String,
    pub pit_stops: usize,
    pub average_stint_laps: Option<f64>,
    pub yellow_green_pit_ratio: f64,
    pub average_green_lap_time: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PitGapProjection {
    pub lap_number: u32,
    pub gap_before_s: f64,
    pub gap_after_s: f64,
}

pub fn average_pit_duration(total_pit_time_s: f64, stops: usize) -> Option<f64> {
    (stops > 0).then(|| total_pit_time_s / stops as f64)
}

pub struct RaceStats<'store> {
    store: &'store RowStore,
}

impl<'store> RaceStats<'store> {
    pub fn new(store: &'store RowStore) -> Self {
        Self { store }
    }

    fn rows(&self, car_id: &str) -> Result<Vec<&'store Row>, EnduroError> {
        let rows = self.store.car_rows(car_id);
        if rows.is_empty() {
            return Err(EnduroError::UnknownCar {
                car_id: car_id.to_string(),
            });
        }
        Ok(rows)
    }

    fn pit_scan(&self, car_id: &str) -> Result<PitScan, EnduroError> {
        let mut scan = PitScan::default();
        for row in self.rows(car_id)? {
            scan.observe(row);
        }
        Ok(scan)
    }

    /// Cars of `class` still running at the end, in the order they crossed the line on
    /// the final lap. Walks back from the end of the log until the first car seen shows up
    /// a second time.
    pub fn cars_that_finished(&self, class: &str) -> Vec<String> {
        let mut finishers: Vec<&str> = Vec::new();
        for row in self.store.rows().iter().rev().filter(|r| r.class == class) {
            if finishers.first() == Some(&row.car_id.as_str()) {
                break;
            }
            if !finishers.contains(&row.car_id.as_str()) {
                finishers.push(&row.car_id);
            }
        }
        finishers.iter().rev().map(|c| c.to_string()).collect()
    }

    pub fn pit_stop_count(&self, car_id: &str) -> Result<usize, EnduroError> {
        Ok(self.pit_scan(car_id)?.stops)
    }

    /// Mean number of laps between leaving the pits (or the start) and the next stop
    pub fn average_stint_laps(&self, car_id: &str) -> Result<Option<f64>, EnduroError> {
        Ok(self.pit_scan(car_id)?.average_stint_laps())
    }

    pub fn yellow_green_pit_ratio(&self, car_id: &str) -> Result<f64, EnduroError> {
        Ok(self.pit_scan(car_id)?.yellow_green_ratio())
    }

    /// Mean lap time over laps run entirely under green: the lap and the one before it both
    /// show a green flag and neither touched the pit lane. Red, white and unrecognised
    /// flags do not count.
    pub fn average_green_lap_time(&self, car_id: &str) -> Result<f64, EnduroError> {
        let lap_times = self
            .rows(car_id)?
            .into_iter()
            .tuple_windows()
            .filter(|(previous, current)| {
                previous.is_green() && current.is_green() && !previous.in_pit() && !current.in_pit()
            })
            .filter_map(|(_, current)| current.lap_seconds())
            .collect::<Vec<_>>();
        if lap_times.is_empty() {
            return Err(EnduroError::NoValidLaps {
                car_id: car_id.to_string(),
            });
        }
        Ok(lap_times.iter().sum::<f64>() / lap_times.len() as f64)
    }

    pub fn car_summary(&self, car_id: &str) -> Result<CarSummary, EnduroError> {
        let scan = self.pit_scan(car_id)?;
        let average_green_lap_time = match self.average_green_lap_time(car_id) {
            Ok(lap_time) => Some(lap_time),
            Err(EnduroError::NoValidLaps { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(CarSummary {
            car_id: car_id.to_string(),
            pit_stops: scan.stops,
            average_stint_laps: scan.average_stint_laps(),
            yellow_green_pit_ratio: scan.yellow_green_ratio(),
            average_green_lap_time,
        })
    }

    /// Gap to `opponent` at one lap, and what it becomes once `reference` serves a stop
    /// of average length
    pub fn gap_after_pitting(
        &self,
        reference: &str,
        opponent: &str,
        lap_number: u32,
        average_pit_duration_s: f64,
    ) -> Result<PitGapProjection, EnduroError> {
        let lap_range = LapRange::new(lap_number, lap_number)?;
        let analysis = GapAligner::new(self.store).compare(reference, opponent, lap_range)?;
        let gap_before_s = analysis
            .gaps
            .first()
            .map(|g| g.delta_seconds)
            .ok_or_else(|| EnduroError::UndefinedInitialGap {
                reference: reference.to_string(),
                other: opponent.to_string(),
                lap: lap_number,
            })?;
        Ok(PitGapProjection {
            lap_number,
            gap_before_s,
            gap_after_s: gap_before_s - average_pit_duration_s,
        })
    }

    /// [`Self::gap_after_pitting`] with the stop length averaged from the total time
    /// `reference` spent in the pit lane over its stops in the log
    pub fn gap_after_average_stop(
        &self,
        reference: &str,
        opponent: &str,
        lap_number: u32,
        total_pit_time_s: f64,
    ) -> Result<PitGapProjection, EnduroError> {
        let stops = self.pit_stop_count(reference)?;
        let average = average_pit_duration(total_pit_time_s, stops).ok_or_else(|| {
            EnduroError::NoPitStops {
                car_id: reference.to_string(),
            }
        })?;
        self.gap_after_pitting(reference, opponent, lap_number, average)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::race::test_support::{green, row};
    use crate::race::TrackState;

    fn pit(car_id: &str, lap: u32, session_time_s: f64, flag: Flag) -> Row {
        row(car_id, lap, 160., session_time_s, flag, TrackState::Pit)
    }

    fn race() -> RowStore {
        let mut rows = Vec::new();
        let mut clock = 0.;
        for lap in 1..=20u32 {
            clock += 105.;
            for (offset, car) in ["27", "70"].iter().enumerate() {
                let t = clock + offset as f64;
                let r = match (*car, lap) {
                    ("27", 5) | ("27", 6) => pit(car, lap, t, Flag::Green),
                    ("27", 12) => pit(car, lap, t, Flag::Yellow),
                    ("70", 8) => pit(car, lap, t, Flag::Yellow),
                    _ => green(car, lap, t),
                };
                rows.push(r);
            }
        }
        let mut lmp = green("8", 20, clock + 5.);
        lmp.class = "LMP2".to_string();
        rows.push(lmp);
        RowStore::new(rows)
    }

    #[test]
    fn test_cars_that_finished_in_crossing_order() {
        let store = race();
        let stats = RaceStats::new(&store);
        assert_eq!(stats.cars_that_finished("GTD"), vec!["27", "70"]);
        assert_eq!(stats.cars_that_finished("LMP2"), vec!["8"]);
        assert!(stats.cars_that_finished("GTP").is_empty());
    }

    #[test]
    fn test_pit_counts_and_stints() {
        let store = race();
        let stats = RaceStats::new(&store);
        assert_eq!(stats.pit_stop_count("27").unwrap(), 2);
        // 5 laps to the first stop, then 12 - 7 after leaving on lap 7
        assert_eq!(stats.average_stint_laps("27").unwrap(), Some(5.));
        assert_eq!(stats.pit_stop_count("70").unwrap(), 1);
        assert_eq!(stats.average_stint_laps("70").unwrap(), Some(8.));
    }

    #[test]
    fn test_yellow_green_ratio() {
        let store = race();
        let stats = RaceStats::new(&store);
        assert_eq!(stats.yellow_green_pit_ratio("27").unwrap(), 1.);
        // no green-flag stops
        assert_eq!(stats.yellow_green_pit_ratio("70").unwrap(), 1.);
    }

    #[test]
    fn test_average_green_lap_time_skips_pit_laps() {
        let store = race();
        let stats = RaceStats::new(&store);
        assert_eq!(stats.average_green_lap_time("70").unwrap(), 105.);
        assert!(matches!(
            stats.average_green_lap_time("44"),
            Err(EnduroError::UnknownCar { .. })
        ));
    }

    #[test]
    fn test_average_green_lap_time_needs_green_on_both_laps() {
        let store = RowStore::new(vec![
            row("27", 1, 100., 100., Flag::Green, TrackState::Track),
            row("27", 2, 101., 201., Flag::Green, TrackState::Track),
            row("27", 3, 140., 341., Flag::Red, TrackState::Track),
            row("27", 4, 120., 461., Flag::Green, TrackState::Track),
            row("27", 5, 103., 564., Flag::Green, TrackState::Track),
            row("27", 6, 110., 674., Flag::White, TrackState::Track),
            row("27", 7, 130., 804., Flag::Other("Code60".to_string()), TrackState::Track),
        ]);
        let stats = RaceStats::new(&store);
        // only laps 2 and 5 follow a green lap and are green themselves
        assert_eq!(stats.average_green_lap_time("27").unwrap(), 102.);

        let cautioned = RowStore::new(vec![
            row("70", 1, 100., 100., Flag::Green, TrackState::Track),
            row("70", 2, 140., 240., Flag::Red, TrackState::Track),
            row("70", 3, 130., 370., Flag::White, TrackState::Track),
        ]);
        assert!(matches!(
            RaceStats::new(&cautioned).average_green_lap_time("70"),
            Err(EnduroError::NoValidLaps { .. })
        ));
    }

    #[test]
    fn test_car_summary() {
        let store = race();
        let summary = RaceStats::new(&store).car_summary("27").unwrap();
        assert_eq!(summary.pit_stops, 2);
        assert_eq!(summary.average_green_lap_time, Some(105.));
    }

    #[test]
    fn test_gap_after_pitting() {
        let store = race();
        let stats = RaceStats::new(&store);
        let projection = stats.gap_after_pitting("70", "27", 10, 45.).unwrap();
        assert_eq!(projection.gap_before_s, 1.);
        assert_eq!(projection.gap_after_s, -44.);
    }

    #[test]
    fn test_gap_after_average_stop() {
        let store = race();
        let stats = RaceStats::new(&store);
        // two stops for #27, 90 s in the pit lane in total
        let projection = stats.gap_after_average_stop("27", "70", 10, 90.).unwrap();
        assert_eq!(projection.gap_before_s, -1.);
        assert_eq!(projection.gap_after_s, -46.);

        let store = RowStore::new(vec![green("27", 1, 100.), green("70", 1, 101.)]);
        assert!(matches!(
            RaceStats::new(&store).gap_after_average_stop("27", "70", 1, 90.),
            Err(EnduroError::NoPitStops { .. })
        ));
    }

    #[test]
    fn test_average_pit_duration() {
        assert_eq!(average_pit_duration(300., 4), Some(75.));
        assert_eq!(average_pit_duration(300., 0), None);
    }
}
