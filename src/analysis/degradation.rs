use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{
    regression::{FitMethod, HuberRegressor, LinearTrend, OrdinaryLeastSquares, TrendFit},
    stint::{CarSample, Stint, car_samples, segment_stints},
};
use crate::{EnduroError, config::AnalysisConfig, race::RowStore};

const SECONDS_PER_HOUR: f64 = 3600.;

/// What to do with a stint that cannot support a fitted line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegenerateStintPolicy {
    /// Keep the stint with a flat trend at its mean lap time
    Flatten,
    /// Abort the analysis with `DegenerateStint`
    Reject,
}

/// Fitted trend for one stint. Slopes are seconds of lap time per hour of session time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StintTrend {
    pub stint: Stint,
    pub method: FitMethod,
    pub trend: LinearTrend,
}

impl StintTrend {
    pub fn is_degenerate(&self) -> bool {
        self.method == FitMethod::Flat
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DegradationPoint {
    pub lap_number: u32,
    pub session_time_h: Option<f64>,
    pub lap_time: Option<f64>,
    pub predicted_lap_time: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DegradationReport {
    pub car_id: String,
    pub points: Vec<DegradationPoint>,
    pub trends: Vec<StintTrend>,
    /// Session hours of every lap that ended in the pit lane
    pub pit_times_h: Vec<f64>,
    pub average_slope: f64,
}

/// Mean of the strictly positive stint slopes. Stints where the car got faster are left
/// out; if none degraded the result is `NoPositiveDegradation`.
pub fn average_positive_slope(trends: &[StintTrend]) -> Result<f64, EnduroError> {
    let positive = trends
        .iter()
        .map(|t| t.trend.slope)
        .filter(|slope| *slope > 0.)
        .collect::<Vec<_>>();
    if positive.is_empty() {
        return Err(EnduroError::NoPositiveDegradation {
            stints: trends.len(),
        });
    }
    Ok(positive.iter().sum::<f64>() / positive.len() as f64)
}

fn hours(session_time_s: f64) -> f64 {
    session_time_s / SECONDS_PER_HOUR
}

/// Fits one lap-time trend per stint. Every stint but the last goes through the robust
/// estimator since it is bounded by a stop or caution on both ends; the final stint is
/// fitted with the closed-form estimator.
pub struct DegradationModel {
    interior_fit: Box<dyn TrendFit>,
    final_fit: Box<dyn TrendFit>,
    degenerate_policy: DegenerateStintPolicy,
}

impl Default for DegradationModel {
    fn default() -> Self {
        Self::new(
            Box::new(HuberRegressor::default()),
            Box::new(OrdinaryLeastSquares),
            DegenerateStintPolicy::Flatten,
        )
    }
}

impl DegradationModel {
    pub fn new(
        interior_fit: Box<dyn TrendFit>,
        final_fit: Box<dyn TrendFit>,
        degenerate_policy: DegenerateStintPolicy,
    ) -> Self {
        Self {
            interior_fit,
            final_fit,
            degenerate_policy,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            Box::new(HuberRegressor::new(
                config.huber_epsilon,
                config.huber_max_iterations,
            )),
            Box::new(OrdinaryLeastSquares),
            config.degenerate_stints,
        )
    }

    fn fitter_for(&self, stint_index: usize, stint_count: usize) -> &dyn TrendFit {
        if stint_index + 1 == stint_count {
            self.final_fit.as_ref()
        } else {
            self.interior_fit.as_ref()
        }
    }

    pub fn fit_stints(
        &self,
        samples: &[CarSample],
        stints: &[Stint],
    ) -> Result<Vec<StintTrend>, EnduroError> {
        let mut trends = Vec::with_capacity(stints.len());
        for stint in stints {
            let points = samples[stint.range()]
                .iter()
                .filter_map(|s| Some((hours(s.session_time?), s.lap_time?)))
                .collect::<Vec<_>>();
            let fitter = self.fitter_for(stint.index, stints.len());

            let trend_fit = match fitter.fit(&points) {
                Some(trend) => StintTrend {
                    stint: stint.clone(),
                    method: fitter.method(),
                    trend,
                },
                None => self.degenerate_trend(stint, &points)?,
            };
            trends.push(trend_fit);
        }
        Ok(trends)
    }

    fn degenerate_trend(
        &self,
        stint: &Stint,
        points: &[(f64, f64)],
    ) -> Result<StintTrend, EnduroError> {
        match self.degenerate_policy {
            DegenerateStintPolicy::Reject => Err(EnduroError::DegenerateStint {
                stint_index: stint.index,
                samples: points.len(),
            }),
            DegenerateStintPolicy::Flatten => {
                warn!(
                    "Stint {} has {} usable samples, using a flat trend",
                    stint.index,
                    points.len()
                );
                let mean = points.iter().map(|(_, y)| y).sum::<f64>() / points.len().max(1) as f64;
                Ok(StintTrend {
                    stint: stint.clone(),
                    method: FitMethod::Flat,
                    trend: LinearTrend {
                        slope: 0.,
                        intercept: mean,
                    },
                })
            }
        }
    }

    /// Model lap time at every sample, using the trend of the stint the sample belongs to.
    /// Samples outside any stint stay `None`.
    pub fn predict(samples: &[CarSample], trends: &[StintTrend]) -> Vec<Option<f64>> {
        let mut predicted = vec![None; samples.len()];
        for stint_trend in trends {
            for i in stint_trend.stint.range() {
                predicted[i] = samples[i]
                    .session_time
                    .map(|t| stint_trend.trend.predict(hours(t)));
            }
        }
        predicted
    }

    pub fn analyze(
        &self,
        store: &RowStore,
        car_id: &str,
    ) -> Result<DegradationReport, EnduroError> {
        let rows = store.car_rows(car_id);
        if rows.is_empty() {
            return Err(EnduroError::UnknownCar {
                car_id: car_id.to_string(),
            });
        }

        let samples = car_samples(&rows);
        let stints = segment_stints(&samples);
        debug!(
            "Car #{}: {} samples split into {} stints",
            car_id,
            samples.len(),
            stints.len()
        );
        if stints.is_empty() {
            return Err(EnduroError::NoValidLaps {
                car_id: car_id.to_string(),
            });
        }

        let trends = self.fit_stints(&samples, &stints)?;
        let average_slope = average_positive_slope(&trends)?;
        let predicted = Self::predict(&samples, &trends);

        let points = samples
            .iter()
            .zip(predicted)
            .map(|(sample, predicted_lap_time)| DegradationPoint {
                lap_number: sample.lap_number,
                session_time_h: sample.session_time.map(hours),
                lap_time: sample.lap_time,
                predicted_lap_time,
            })
            .collect();
        let pit_times_h = samples
            .iter()
            .filter(|s| s.in_pit)
            .filter_map(|s| s.session_time.map(hours))
            .collect();

        Ok(DegradationReport {
            car_id: car_id.to_string(),
            points,
            trends,
            pit_times_h,
            average_slope,
        })
    }
}
