pub mod degradation;
pub mod features;
pub mod gap;
pub mod multi_gap;
pub mod regression;
pub mod stats;
pub mod stint;

use serde::{Deserialize, Serialize};

use crate::EnduroError;

pub use degradation::{
    DegenerateStintPolicy, DegradationModel, DegradationPoint, DegradationReport, StintTrend,
    average_positive_slope,
};
pub use features::{FeatureExtractor, FeatureRow, RacePosition};
pub use gap::{GapAligner, GapAnalysis, GapSample, PitEvent, YellowSpan};
pub use multi_gap::{ComparisonFailure, MultiCarGapAnalysis, compare_many};
pub use regression::{FitMethod, HuberRegressor, LinearTrend, OrdinaryLeastSquares, TrendFit};
pub use stats::{CarSummary, PitGapProjection, RaceStats, average_pit_duration};
pub use stint::{CarSample, Stint, car_samples, segment_stints};

/// Inclusive range of lap numbers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapRange {
    pub lo: u32,
    pub hi: u32,
}

impl LapRange {
    pub fn new(lo: u32, hi: u32) -> Result<Self, EnduroError> {
        if lo > hi {
            return Err(EnduroError::InvalidLapRange { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    pub fn contains(&self, lap: u32) -> bool {
        (self.lo..=self.hi).contains(&lap)
    }
}
