use log::{debug, warn};

use super::{Row, TimeField};
use crate::EnduroError;

const SECONDS_PER_HOUR: f64 = 3600.;
const SECONDS_PER_MINUTE: f64 = 60.;

/// Outcome of a normalization pass. Malformed rows are kept as warnings and left
/// untouched in the store.
#[derive(Debug, Default)]
pub struct NormalizationReport {
    /// Rows whose field was parsed to seconds during this pass
    pub normalized: usize,
    /// Rows that already held seconds
    pub already_normalized: usize,
    pub warnings: Vec<EnduroError>,
}

impl NormalizationReport {
    pub fn merge(&mut self, other: NormalizationReport) {
        self.normalized += other.normalized;
        self.already_normalized += other.already_normalized;
        self.warnings.extend(other.warnings);
    }

    pub fn malformed_rows(&self) -> Vec<usize> {
        self.warnings
            .iter()
            .filter_map(|w| match w {
                EnduroError::MalformedTimestamp { row_index, .. } => Some(*row_index),
                _ => None,
            })
            .collect()
    }
}

/// Splits a `MM:SS.sss` fragment into whole minutes and fractional seconds
pub fn parse_clock_fragment(raw: &str) -> Option<(u32, f64)> {
    let (minutes, seconds) = raw.trim().split_once(':')?;
    let minutes = minutes.trim().parse::<u32>().ok()?;
    let seconds = seconds.trim().parse::<f64>().ok()?;
    if !(0.0..SECONDS_PER_MINUTE).contains(&seconds) {
        return None;
    }
    Some((minutes, seconds))
}

/// Parses a `MM:SS.sss` lap time into seconds
pub fn parse_lap_time(raw: &str) -> Option<f64> {
    parse_clock_fragment(raw).map(|(m, s)| m as f64 * SECONDS_PER_MINUTE + s)
}

/// The log only carries minutes and seconds of the session clock. The hour is inferred by
/// walking the rows in file order and bumping it whenever the minute value goes backwards
/// (59 -> 0). Assumes rows arrive in chronological order across all cars.
pub(crate) fn normalize_session_clock(rows: &mut [Row]) -> NormalizationReport {
    let mut report = NormalizationReport::default();
    let mut hour: u32 = 0;
    let mut prev_minutes: Option<u32> = None;

    for (row_index, row) in rows.iter_mut().enumerate() {
        let raw = match &row.session_time {
            TimeField::Seconds(s) => {
                // rows that already carry absolute time re-seed the counters
                hour = (s / SECONDS_PER_HOUR).floor() as u32;
                prev_minutes = Some(((s % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE).floor() as u32);
                report.already_normalized += 1;
                continue;
            }
            TimeField::Raw(raw) => raw,
        };

        let Some((minutes, seconds)) = parse_clock_fragment(raw) else {
            let warning = EnduroError::MalformedTimestamp {
                row_index,
                raw: raw.clone(),
            };
            warn!("Skipping session time: {}", warning);
            report.warnings.push(warning);
            continue;
        };

        if prev_minutes.is_some_and(|prev| prev > minutes) {
            hour += 1;
        }
        prev_minutes = Some(minutes);
        row.session_time = TimeField::Seconds(
            hour as f64 * SECONDS_PER_HOUR + minutes as f64 * SECONDS_PER_MINUTE + seconds,
        );
        report.normalized += 1;
    }

    debug!(
        "Session clock normalized: {} rows, {} hour rollovers, {} malformed",
        report.normalized,
        hour,
        report.warnings.len()
    );
    report
}

pub(crate) fn normalize_lap_times(rows: &mut [Row]) -> NormalizationReport {
    let mut report = NormalizationReport::default();

    for (row_index, row) in rows.iter_mut().enumerate() {
        let raw = match &row.lap_time {
            TimeField::Seconds(_) => {
                report.already_normalized += 1;
                continue;
            }
            TimeField::Raw(raw) => raw,
        };

        match parse_lap_time(raw) {
            Some(seconds) => {
                row.lap_time = TimeField::Seconds(seconds);
                report.normalized += 1;
            }
            None => {
                let warning = EnduroError::MalformedTimestamp {
                    row_index,
                    raw: raw.clone(),
                };
                warn!("Skipping lap time: {}", warning);
                report.warnings.push(warning);
            }
        }
    }
    report
}
