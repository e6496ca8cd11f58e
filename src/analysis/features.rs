use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    race::{Row, RowStore},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RacePosition {
    Leader,
    Pursuer,
}

/// Race-state features for one row, as consumed by the pit-call model
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureRow {
    pub car_id: String,
    pub lap_number: u32,
    pub race_progress: f64,
    pub tire_age: f64,
    pub driver_duration: f64,
    pub remaining_pit_stops: u32,
    pub yellow_flag: bool,
    pub position: RacePosition,
    pub close_ahead: bool,
    pub pursuer_tire_change: bool,
}

/// Per-car running state threaded through the row scan
#[derive(Debug, Default)]
struct CarAccumulator<'row> {
    tire_age: f64,
    driver: Option<&'row str>,
    driver_since_s: f64,
    pit_rows: u32,
}

pub struct FeatureExtractor {
    race_duration_s: f64,
    max_pit_stops: u32,
    close_ahead_gap_s: f64,
    yellow_tire_wear_factor: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl FeatureExtractor {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            race_duration_s: config.race_duration_s,
            max_pit_stops: config.max_pit_stops,
            close_ahead_gap_s: config.close_ahead_gap_s,
            yellow_tire_wear_factor: config.yellow_tire_wear_factor,
        }
    }

    /// Rows of `class` for the given cars that carry a session time, ordered by lap and
    /// then by the time they crossed the line
    fn ordered_rows<'row, S: AsRef<str>>(
        store: &'row RowStore,
        class: &str,
        cars: &[S],
    ) -> Vec<(&'row Row, f64)> {
        let mut rows = store
            .rows()
            .iter()
            .filter(|r| r.class == class && cars.iter().any(|c| c.as_ref() == r.car_id))
            .filter_map(|r| match r.session_seconds() {
                Some(t) => Some((r, t)),
                None => {
                    debug!(
                        "Dropping car #{} lap {} without a session time",
                        r.car_id, r.lap_number
                    );
                    None
                }
            })
            .collect::<Vec<_>>();
        rows.sort_by(|(a, ta), (b, tb)| a.lap_number.cmp(&b.lap_number).then(ta.total_cmp(tb)));
        rows
    }

    pub fn extract<S: AsRef<str>>(
        &self,
        store: &RowStore,
        class: &str,
        cars: &[S],
    ) -> Vec<FeatureRow> {
        let rows = Self::ordered_rows(store, class, cars);

        let mut leaders: HashMap<u32, &str> = HashMap::new();
        for (row, _) in &rows {
            leaders.entry(row.lap_number).or_insert(row.car_id.as_str());
        }

        let pursuer_tire_change = Self::pursuer_tire_changes(&rows);
        let mut accumulators: HashMap<&str, CarAccumulator> = HashMap::new();
        let mut features = Vec::with_capacity(rows.len());

        for (i, (row, session_s)) in rows.iter().enumerate() {
            let acc = accumulators.entry(row.car_id.as_str()).or_default();

            if row.in_pit() {
                acc.tire_age = 0.;
                acc.pit_rows += 1;
            } else {
                let lap_share = row.lap_seconds().unwrap_or(0.) / self.race_duration_s;
                acc.tire_age += if row.is_yellow() {
                    lap_share * self.yellow_tire_wear_factor
                } else {
                    lap_share
                };
                if acc.driver != Some(row.driver.as_str()) {
                    acc.driver = Some(row.driver.as_str());
                    acc.driver_since_s = *session_s;
                }
            }

            let close_ahead = rows.get(i + 1).is_some_and(|(next, next_s)| {
                next.lap_number == row.lap_number && next_s - session_s < self.close_ahead_gap_s
            });
            let position = if leaders.get(&row.lap_number) == Some(&row.car_id.as_str()) {
                RacePosition::Leader
            } else {
                RacePosition::Pursuer
            };

            features.push(FeatureRow {
                car_id: row.car_id.clone(),
                lap_number: row.lap_number,
                race_progress: session_s / self.race_duration_s,
                tire_age: acc.tire_age,
                driver_duration: (session_s - acc.driver_since_s) / self.race_duration_s,
                remaining_pit_stops: self.max_pit_stops.saturating_sub(acc.pit_rows),
                yellow_flag: row.is_yellow(),
                position,
                close_ahead,
                pursuer_tire_change: pursuer_tire_change[i],
            });
        }
        features
    }

    /// For each row, whether the car right behind on the same lap was in the pit the last
    /// time it was seen directly behind another car
    fn pursuer_tire_changes(rows: &[(&Row, f64)]) -> Vec<bool> {
        let mut pitted: HashMap<&str, bool> = HashMap::new();
        let mut changes = vec![false; rows.len()];
        for (i, pair) in rows.windows(2).enumerate() {
            let (current, pursuer) = (pair[0].0, pair[1].0);
            if current.lap_number == pursuer.lap_number {
                changes[i] = pitted.get(pursuer.car_id.as_str()).copied().unwrap_or(false);
                pitted.insert(pursuer.car_id.as_str(), pursuer.in_pit());
            }
        }
        changes
    }
}
