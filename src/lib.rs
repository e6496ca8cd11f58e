// Library interface for enduro
// This allows integration tests and benches to access internal modules

pub mod analysis;
pub mod config;
pub mod errors;
pub mod race;
pub mod writer;

// Re-export commonly used types
pub use analysis::{
    DegradationModel, DegradationReport, GapAligner, GapAnalysis, LapRange, MultiCarGapAnalysis,
    RaceStats, compare_many,
};
pub use config::AnalysisConfig;
pub use errors::EnduroError;
pub use race::{Flag, Row, RowStore, TimeField, TrackState, load_race_csv, read_race_csv};
