use std::{fs::File, io::Read, path::Path};

use log::info;
use serde::Deserialize;

use super::{Flag, Row, RowStore, TimeField, TrackState};
use crate::EnduroError;

/// Column layout of the timing export, in file order
#[derive(Debug, Deserialize)]
struct RawRow {
    car_id: String,
    class: String,
    driver: String,
    lap_number: u32,
    lap_time: String,
    session_time: String,
    flag: String,
    track_state: String,
}

impl RawRow {
    fn into_row(self, line: u64) -> Result<Row, EnduroError> {
        let track_state = self
            .track_state
            .parse::<TrackState>()
            .map_err(|reason| EnduroError::InvalidRow { line, reason })?;
        Ok(Row {
            car_id: self.car_id,
            class: self.class,
            driver: self.driver,
            lap_number: self.lap_number,
            lap_time: TimeField::Raw(self.lap_time),
            session_time: TimeField::Raw(self.session_time),
            flag: Flag::from(self.flag.as_str()),
            track_state,
        })
    }
}

/// Reads a race log with a header row and the eight positional columns. Time columns are
/// kept raw; call [`RowStore::normalize`] before analysing.
pub fn read_race_csv<R: Read>(reader: R) -> Result<RowStore, EnduroError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| EnduroError::CsvReadError { source: e })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let raw: RawRow = record
            .deserialize(None)
            .map_err(|e| EnduroError::CsvReadError { source: e })?;
        rows.push(raw.into_row(line)?);
    }

    Ok(RowStore::new(rows))
}

pub fn load_race_csv(path: &Path) -> Result<RowStore, EnduroError> {
    let file = File::open(path).map_err(|e| EnduroError::CsvReadError { source: e.into() })?;
    let store = read_race_csv(file)?;
    info!(
        "Loaded {:?}, found {} rows for {} cars",
        path,
        store.len(),
        store.car_ids().len()
    );
    Ok(store)
}
