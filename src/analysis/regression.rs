use serde::{Deserialize, Serialize};

/// Residual scale is floored so exact fits do not divide by zero
const MIN_SCALE: f64 = 1e-9;
/// Turns the median absolute deviation into a consistent estimate of sigma
const MAD_TO_SIGMA: f64 = 0.6745;
const MIN_X_VARIANCE: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitMethod {
    OrdinaryLeastSquares,
    Huber,
    /// Fallback for stints that cannot support a line
    Flat,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fits a straight line through `(x, y)` points. Returns `None` when the points cannot
/// pin down a line (fewer than two, or all at the same x).
pub trait TrendFit {
    fn method(&self) -> FitMethod;
    fn fit(&self, points: &[(f64, f64)]) -> Option<LinearTrend>;
}

fn weighted_least_squares(points: &[(f64, f64)], weights: &[f64]) -> Option<LinearTrend> {
    if points.len() < 2 {
        return None;
    }
    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0. {
        return None;
    }
    let mean_x = points.iter().zip(weights).map(|((x, _), w)| w * x).sum::<f64>() / total_weight;
    let mean_y = points.iter().zip(weights).map(|((_, y), w)| w * y).sum::<f64>() / total_weight;

    let mut sxx = 0.;
    let mut sxy = 0.;
    for ((x, y), w) in points.iter().zip(weights) {
        let dx = x - mean_x;
        sxx += w * dx * dx;
        sxy += w * dx * (y - mean_y);
    }
    if sxx <= MIN_X_VARIANCE {
        return None;
    }
    let slope = sxy / sxx;
    Some(LinearTrend {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.
    } else {
        values[middle]
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OrdinaryLeastSquares;

impl TrendFit for OrdinaryLeastSquares {
    fn method(&self) -> FitMethod {
        FitMethod::OrdinaryLeastSquares
    }

    fn fit(&self, points: &[(f64, f64)]) -> Option<LinearTrend> {
        weighted_least_squares(points, &vec![1.; points.len()])
    }
}

/// Huber M-estimator solved by iteratively reweighted least squares. Residuals within
/// `epsilon` robust standard deviations keep full weight; larger ones are down-weighted
/// in proportion to their size, so a single caution-affected lap barely moves the line.
#[derive(Clone, Copy, Debug)]
pub struct HuberRegressor {
    pub epsilon: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for HuberRegressor {
    fn default() -> Self {
        Self {
            epsilon: 1.35,
            max_iterations: 100,
            tolerance: 1e-9,
        }
    }
}

impl HuberRegressor {
    pub fn new(epsilon: f64, max_iterations: usize) -> Self {
        Self {
            epsilon,
            max_iterations,
            ..Default::default()
        }
    }

    fn converged(&self, previous: &LinearTrend, next: &LinearTrend) -> bool {
        (next.slope - previous.slope).abs() <= self.tolerance * (1. + previous.slope.abs())
            && (next.intercept - previous.intercept).abs()
                <= self.tolerance * (1. + previous.intercept.abs())
    }
}

impl TrendFit for HuberRegressor {
    fn method(&self) -> FitMethod {
        FitMethod::Huber
    }

    fn fit(&self, points: &[(f64, f64)]) -> Option<LinearTrend> {
        let mut trend = OrdinaryLeastSquares.fit(points)?;

        for _ in 0..self.max_iterations {
            let residuals = points
                .iter()
                .map(|(x, y)| y - trend.predict(*x))
                .collect::<Vec<_>>();
            let mut abs_residuals = residuals.iter().map(|r| r.abs()).collect::<Vec<_>>();
            let scale = (median(&mut abs_residuals) / MAD_TO_SIGMA).max(MIN_SCALE);
            let threshold = self.epsilon * scale;

            let weights = residuals
                .iter()
                .map(|r| {
                    if r.abs() <= threshold {
                        1.
                    } else {
                        threshold / r.abs()
                    }
                })
                .collect::<Vec<_>>();

            let next = weighted_least_squares(points, &weights)?;
            let done = self.converged(&trend, &next);
            trend = next;
            if done {
                break;
            }
        }
        Some(trend)
    }
}
