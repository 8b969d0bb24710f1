//! Polynomial detrending along one axis
//!
//! Each lane is fitted independently by least squares against its sample index.
//! The index is centered and scaled to `[-1, 1]` before the Vandermonde system is
//! built, so century-long series stay well conditioned.

use super::parallel::map_lanes;
use crate::errors::Result;
use crate::grid::{AxisKind, GridArray};
use nalgebra::{DMatrix, DVector};

/// Polynomial degree of the removed trend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDegree {
    Linear,
    Quadratic,
}

impl TrendDegree {
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::Linear => 1,
            Self::Quadratic => 2,
        }
    }

    /// Valid samples a lane needs before it is fitted at all
    #[must_use]
    pub const fn min_samples(self) -> usize {
        self.order() + 2
    }
}

/// Removes a fitted polynomial from every lane of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detrender {
    degree: TrendDegree,
    restore_mean: bool,
}

impl Detrender {
    /// Residuals are zero-mean unless [`Detrender::with_restored_mean`] is set.
    #[must_use]
    pub const fn new(degree: TrendDegree) -> Self {
        Self {
            degree,
            restore_mean: false,
        }
    }

    /// Add the lane's mean back into its residuals
    #[must_use]
    pub const fn with_restored_mean(mut self, restore_mean: bool) -> Self {
        self.restore_mean = restore_mean;
        self
    }

    #[must_use]
    pub const fn degree(&self) -> TrendDegree {
        self.degree
    }

    /// Detrend every lane of `grid` along `axis`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClimVarError::Dimension`] if the axis is absent.
    pub fn detrend(&self, grid: &GridArray, axis: AxisKind) -> Result<GridArray> {
        let index = grid.require_axis(axis)?;
        let len = grid.shape()[index];
        let data = map_lanes(grid.data(), index, len, grid.fill_value(), |lane| {
            self.detrend_lane(lane)
        })?;
        grid.derive(data, grid.axes().to_vec())
    }

    /// Residuals of one lane; all missing when too few samples are valid.
    #[must_use]
    pub fn detrend_lane(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let xs = scaled_positions(values.len());
        let (fit_x, fit_y): (Vec<f64>, Vec<f64>) = values
            .iter()
            .zip(&xs)
            .filter_map(|(v, &x)| v.map(|y| (x, y)))
            .unzip();

        if fit_y.len() < self.degree.min_samples() {
            return vec![None; values.len()];
        }
        let Some(coefficients) = polyfit(&fit_x, &fit_y, self.degree.order()) else {
            return vec![None; values.len()];
        };

        #[allow(clippy::cast_precision_loss)]
        let offset = if self.restore_mean {
            fit_y.iter().sum::<f64>() / fit_y.len() as f64
        } else {
            0.0
        };

        values
            .iter()
            .zip(&xs)
            .map(|(v, &x)| v.map(|y| y - polyval(&coefficients, x) + offset))
            .collect()
    }
}

/// Sample positions mapped onto `[-1, 1]`
#[allow(clippy::cast_precision_loss)]
fn scaled_positions(n: usize) -> Vec<f64> {
    let center = (n as f64 - 1.0) / 2.0;
    let scale = center.max(1.0);
    (0..n).map(|i| (i as f64 - center) / scale).collect()
}

/// Singular values below this fraction of the largest one count as zero
const RANK_TOLERANCE: f64 = 1e-10;

/// Least-squares polynomial coefficients, lowest power first
///
/// Solves the Vandermonde system by singular value decomposition; returns `None`
/// when the samples cannot determine every coefficient.
#[must_use]
pub fn polyfit(xs: &[f64], ys: &[f64], order: usize) -> Option<Vec<f64>> {
    let size = order + 1;
    if xs.len() != ys.len() || xs.len() < size {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let design = DMatrix::from_fn(xs.len(), size, |row, col| xs[row].powi(col as i32));
    let rhs = DVector::from_column_slice(ys);

    let svd = design.svd(true, true);
    let tolerance = svd.singular_values.max() * RANK_TOLERANCE;
    if svd.rank(tolerance) < size {
        return None;
    }
    let solution = svd.solve(&rhs, tolerance).ok()?;
    Some(solution.iter().copied().collect())
}

/// Evaluate a polynomial given lowest power first
#[must_use]
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}
