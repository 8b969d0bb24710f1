//! Ordinary least squares trends of yearly values against calendar year

use super::detrend::polyfit;
use super::parallel::reduce_lanes;
use super::time::YearWindow;
use crate::errors::Result;
use crate::grid::{AxisKind, GridArray};
use chrono::Datelike;
use serde::Serialize;

/// Fitted straight line `value = intercept + slope * year`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearTrend {
    /// Change per calendar year
    pub slope: f64,
    /// Value at year zero
    pub intercept: f64,
    /// Number of valid years used
    pub samples: usize,
}

impl LinearTrend {
    #[must_use]
    pub fn value_at(&self, year: i32) -> f64 {
        self.intercept + self.slope * f64::from(year)
    }
}

/// OLS line through the valid `(year, value)` pairs, `None` with fewer than two
/// valid samples or a single distinct year.
#[must_use]
pub fn linear_trend(years: &[i32], values: &[Option<f64>]) -> Option<LinearTrend> {
    let pairs: Vec<(f64, f64)> = years
        .iter()
        .zip(values)
        .filter_map(|(&y, v)| v.map(|v| (f64::from(y), v)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / pairs.len() as f64;
    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.iter().map(|&(x, y)| (x - mean_x, y)).unzip();
    let coefficients = polyfit(&xs, &ys, 1)?;

    let slope = coefficients[1];
    Some(LinearTrend {
        slope,
        intercept: coefficients[0] - slope * mean_x,
        samples: pairs.len(),
    })
}

/// Per-cell trend slope of a yearly series, optionally restricted to `window`.
///
/// # Errors
///
/// Returns [`crate::ClimVarError::Dimension`] without a dated time axis.
pub fn trend_field(series: &GridArray, window: Option<YearWindow>) -> Result<GridArray> {
    let t = series.require_axis(AxisKind::Time)?;
    let years: Vec<i32> = series.times()?.iter().map(|d| d.year()).collect();
    let keep: Vec<bool> = years
        .iter()
        .map(|&y| window.map_or(true, |w| w.contains(y)))
        .collect();

    let data = reduce_lanes(series.data(), t, series.fill_value(), |lane| {
        let values: Vec<Option<f64>> = lane
            .iter()
            .zip(&keep)
            .map(|(&v, &k)| if k { v } else { None })
            .collect();
        linear_trend(&years, &values).map(|trend| trend.slope)
    })?;

    let mut axes = series.axes().to_vec();
    axes.remove(t);
    series.derive(data, axes)
}
