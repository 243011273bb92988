//! Ordinary least squares of gas used against payload size.
//!
//! All sums are accumulated as exact integers, so the fit depends only on the
//! multiset of observations: permuting the input cannot change a single bit of
//! the result. Floating point only enters when the final ratios are formed.

use serde::{Deserialize, Serialize};

/// One `(payload_size, gas_used)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obs {
    pub x: u64,
    pub y: u64,
}

impl From<(u64, u64)> for Obs {
    fn from((x, y): (u64, u64)) -> Self {
        Obs { x, y }
    }
}

/// `gas ≈ intercept + slope × size`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub label: String,
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub samples: usize,
}

impl RegressionResult {
    pub fn predict(&self, size: f64) -> f64 {
        self.intercept + self.slope * size
    }

    pub fn formula(&self) -> String {
        format!("Total Gas = {:.2} + {:.2} × size", self.intercept, self.slope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegressionError {
    #[error("insufficient data: need at least 2 confirmed samples, found {found}")]
    InsufficientData { found: usize },
    #[error("insufficient variance: {reason}")]
    InsufficientVariance { reason: &'static str },
}

/// Exact integer moments of a sample set.
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    n: i128,
    sum_x: i128,
    sum_y: i128,
    sum_x2: i128,
    sum_y2: i128,
    sum_xy: i128,
}

impl Moments {
    fn collect(obs: &[Obs]) -> Self {
        let mut m = Moments::default();
        for o in obs {
            let (x, y) = (o.x as i128, o.y as i128);
            m.n += 1;
            m.sum_x += x;
            m.sum_y += y;
            m.sum_x2 += x * x;
            m.sum_y2 += y * y;
            m.sum_xy += x * y;
        }
        m
    }
}

/// Linear regression of gas on payload size.
///
/// https://www.mathsisfun.com/data/least-squares-regression.html
///
/// Fails closed: fewer than two observations, or no spread in `x`, yields an
/// error instead of NaN/Infinity coefficients.
pub fn least_squares(
    label: impl Into<String>,
    obs: &[Obs],
) -> Result<RegressionResult, RegressionError> {
    if obs.len() < 2 {
        return Err(RegressionError::InsufficientData { found: obs.len() });
    }
    let m = Moments::collect(obs);

    // n·Sxx, n·Syy, n·Sxy, all exact.
    let sxx = m.n * m.sum_x2 - m.sum_x * m.sum_x;
    let syy = m.n * m.sum_y2 - m.sum_y * m.sum_y;
    let sxy = m.n * m.sum_xy - m.sum_x * m.sum_y;

    if sxx == 0 {
        return Err(RegressionError::InsufficientVariance {
            reason: "all samples share one payload size; slope is undefined",
        });
    }

    let n = m.n as f64;
    let (slope, intercept, r_squared) = if syy == 0 {
        // Constant gas: the flat line through every point.
        if sxy != 0 {
            return Err(RegressionError::InsufficientVariance {
                reason: "zero total variance with non-zero residuals",
            });
        }
        (0.0, m.sum_y as f64 / n, 1.0)
    } else {
        let slope = sxy as f64 / sxx as f64;
        let intercept = (m.sum_y as f64 - slope * m.sum_x as f64) / n;
        // R² = 1 - RSS/TSS, which for the OLS line equals Sxy² / (Sxx·Syy).
        let sxy_f = sxy as f64;
        let r_squared = ((sxy_f * sxy_f) / (sxx as f64 * syy as f64)).clamp(0.0, 1.0);
        (slope, intercept, r_squared)
    };

    if !(slope.is_finite() && intercept.is_finite() && r_squared.is_finite()) {
        return Err(RegressionError::InsufficientVariance { reason: "non-finite coefficients" });
    }

    Ok(RegressionResult { label: label.into(), intercept, slope, r_squared, samples: obs.len() })
}

/// Overall fit plus the small/large split around `threshold` (inclusive on the small side).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedRegression {
    pub threshold: u64,
    pub overall: Result<RegressionResult, RegressionError>,
    pub small: Result<RegressionResult, RegressionError>,
    pub large: Result<RegressionResult, RegressionError>,
}

pub fn fit_segmented(label: &str, obs: &[Obs], threshold: u64) -> SegmentedRegression {
    let (small, large): (Vec<Obs>, Vec<Obs>) = obs.iter().partition(|o| o.x <= threshold);
    SegmentedRegression {
        threshold,
        overall: least_squares(label, obs),
        small: least_squares(format!("{label} (≤ {threshold} bytes)"), &small),
        large: least_squares(format!("{label} (> {threshold} bytes)"), &large),
    }
}
