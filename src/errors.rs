// Error types for enduro

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum EnduroError {
    // Errors while loading the lap log
    #[snafu(display("Error reading race log"))]
    CsvReadError { source: csv::Error },
    #[snafu(display("Invalid row at line {line}: {reason}"))]
    InvalidRow { line: u64, reason: String },

    // Per-row recoverable errors raised during normalization
    #[snafu(display("Malformed timestamp {raw:?} in row {row_index}"))]
    MalformedTimestamp { row_index: usize, raw: String },

    // Analysis input errors
    #[snafu(display("Car #{car_id} does not appear in the race log"))]
    UnknownCar { car_id: String },
    #[snafu(display("Car #{car_id} has no valid green-flag laps"))]
    NoValidLaps { car_id: String },
    #[snafu(display("Invalid lap range [{lo}, {hi}]"))]
    InvalidLapRange { lo: u32, hi: u32 },

    // Structural analysis errors
    #[snafu(display(
        "Cars #{reference} and #{other} share no lap at the start of the range (lap {lap})"
    ))]
    UndefinedInitialGap {
        reference: String,
        other: String,
        lap: u32,
    },
    #[snafu(display("Stint {stint_index} has {samples} usable samples, cannot fit a trend"))]
    DegenerateStint { stint_index: usize, samples: usize },
    #[snafu(display("None of the {stints} stints show a positive degradation slope"))]
    NoPositiveDegradation { stints: usize },
    #[snafu(display("Car #{car_id} never pitted, cannot average its pit time"))]
    NoPitStops { car_id: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Errors for the results writer
    #[snafu(display("Error writing results file"))]
    WriterError { source: io::Error },
}
