pub mod clock;
pub mod loader;

use std::{fmt, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use clock::NormalizationReport;
pub use loader::{load_race_csv, read_race_csv};

/// Track status reported by race control on a lap row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    Green,
    Yellow,
    Red,
    White,
    Checkered,
    Other(String),
}

impl From<&str> for Flag {
    fn from(value: &str) -> Self {
        match value {
            "Green" => Flag::Green,
            "Yellow" => Flag::Yellow,
            "Red" => Flag::Red,
            "White" => Flag::White,
            "Checkered" => Flag::Checkered,
            other => Flag::Other(other.to_string()),
        }
    }
}

/// Whether the car finished the lap on track or in the pit lane
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    Track,
    Pit,
}

impl FromStr for TrackState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Track" => Ok(TrackState::Track),
            "Pit" => Ok(TrackState::Pit),
            other => Err(format!("unknown track state {:?}", other)),
        }
    }
}

/// A time column as it moves through normalization. Raw values keep the text from the
/// log until they are parsed, and stay raw if they never parse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TimeField {
    Raw(String),
    Seconds(f64),
}

impl TimeField {
    pub fn seconds(&self) -> Option<f64> {
        match self {
            TimeField::Seconds(s) => Some(*s),
            TimeField::Raw(_) => None,
        }
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeField::Raw(raw) => write!(f, "{}", raw),
            TimeField::Seconds(s) => write!(f, "{:.3}", s),
        }
    }
}

/// One lap (or flag transition) event for one car
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub car_id: String,
    pub class: String,
    pub driver: String,
    pub lap_number: u32,
    /// `MM:SS.sss` in the log, seconds once normalized
    pub lap_time: TimeField,
    /// `MM:SS.sss` in the log (no hour), absolute seconds from race start once normalized
    pub session_time: TimeField,
    pub flag: Flag,
    pub track_state: TrackState,
}

impl Row {
    pub fn lap_seconds(&self) -> Option<f64> {
        self.lap_time.seconds()
    }

    pub fn session_seconds(&self) -> Option<f64> {
        self.session_time.seconds()
    }

    pub fn is_yellow(&self) -> bool {
        self.flag == Flag::Yellow
    }

    pub fn is_green(&self) -> bool {
        self.flag == Flag::Green
    }

    pub fn in_pit(&self) -> bool {
        self.track_state == TrackState::Pit
    }
}

/// All rows of one race in file order. Per-car views are borrowed projections; the only
/// mutation is the one-time normalization of the two time columns.
#[derive(Clone, Debug, Default)]
pub struct RowStore {
    rows: Vec<Row>,
    session_clock_normalized: bool,
}

impl RowStore {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            session_clock_normalized: false,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct car ids in order of first appearance
    pub fn car_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|r| r.car_id.as_str())
            .unique()
            .collect_vec()
    }

    pub fn contains_car(&self, car_id: &str) -> bool {
        self.rows.iter().any(|r| r.car_id == car_id)
    }

    pub fn car_rows(&self, car_id: &str) -> Vec<&Row> {
        self.rows.iter().filter(|r| r.car_id == car_id).collect()
    }

    /// Rows for a car whose lap number lies in the inclusive range `[lo, hi]`
    pub fn car_rows_in_range(&self, car_id: &str, lo: u32, hi: u32) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|r| r.car_id == car_id && (lo..=hi).contains(&r.lap_number))
            .collect()
    }

    pub fn is_session_clock_normalized(&self) -> bool {
        self.session_clock_normalized
    }

    /// Rebuilds absolute session seconds across the whole race. Only the first call does
    /// any work; later calls return an empty report.
    pub fn normalize_session_clock(&mut self) -> NormalizationReport {
        if self.session_clock_normalized {
            log::debug!("Session clock already normalized, skipping");
            return NormalizationReport::default();
        }
        let report = clock::normalize_session_clock(&mut self.rows);
        self.session_clock_normalized = true;
        report
    }

    /// Converts lap times to seconds. Rows that already hold seconds are left alone, so
    /// repeated calls are harmless.
    pub fn normalize_lap_times(&mut self) -> NormalizationReport {
        clock::normalize_lap_times(&mut self.rows)
    }

    pub fn normalize(&mut self) -> NormalizationReport {
        let mut report = self.normalize_session_clock();
        report.merge(self.normalize_lap_times());
        report
    }
}
