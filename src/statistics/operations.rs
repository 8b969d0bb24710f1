//! Core statistical operations and traits
//!
//! All reductions work on masked lanes (`&[Option<f64>]`) so that missing samples are
//! excluded explicitly instead of relying on NaN arithmetic.

use super::parallel::reduce_lanes;
use crate::errors::Result;
use crate::grid::{AxisKind, GridArray};

/// Supported statistical operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOperation {
    /// Arithmetic mean of the valid samples
    Mean,
    /// Sum of the valid samples
    Sum,
    /// Sample standard deviation (n - 1 denominator)
    StdDev,
}

impl StatOperation {
    /// Get the string representation of the operation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::StdDev => "stddev",
        }
    }

    /// Apply the operation to one masked lane
    #[must_use]
    pub fn apply(self, values: &[Option<f64>]) -> Option<f64> {
        match self {
            Self::Mean => masked_mean(values, 1),
            Self::Sum => masked_sum(values),
            Self::StdDev => masked_std(values),
        }
    }
}

/// Number of non-missing samples in a lane
#[must_use]
pub fn valid_count(values: &[Option<f64>]) -> usize {
    values.iter().flatten().count()
}

/// Mean of the valid samples, missing when fewer than `min_valid` are present
#[must_use]
pub fn masked_mean(values: &[Option<f64>], min_valid: usize) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0_f64, 0_usize), |(s, n), &v| (s + v, n + 1));
    if count == 0 || count < min_valid {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    Some(sum / n)
}

/// Sum of the valid samples, missing when the lane holds none
#[must_use]
pub fn masked_sum(values: &[Option<f64>]) -> Option<f64> {
    let mut valid = values.iter().flatten().peekable();
    valid.peek()?;
    Some(valid.sum())
}

/// Sample standard deviation of the valid samples; needs at least two of them.
#[must_use]
pub fn masked_std(values: &[Option<f64>]) -> Option<f64> {
    let valid: Vec<f64> = values.iter().flatten().copied().collect();
    if valid.len() < 2 {
        return None;
    }
    // identical samples have exactly zero spread; skip the rounding of the two-pass sum
    if valid.iter().all(|&v| v == valid[0]) {
        return Some(0.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    let ss: f64 = valid.iter().map(|v| (v - mean).powi(2)).sum();
    Some((ss / (n - 1.0)).sqrt())
}

/// Trait for grids that can be reduced along a named axis
pub trait MaskedReduction {
    /// Collapse `axis` with `operation`, dropping it from the result
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The axis is not present on the grid
    /// - The reduced buffer cannot be reshaped
    fn reduce_along(&self, axis: AxisKind, operation: StatOperation) -> Result<GridArray>;
}

impl MaskedReduction for GridArray {
    fn reduce_along(&self, axis: AxisKind, operation: StatOperation) -> Result<GridArray> {
        let index = self.require_axis(axis)?;
        let data = reduce_lanes(self.data(), index, self.fill_value(), |lane| {
            operation.apply(lane)
        })?;

        let mut axes = self.axes().to_vec();
        axes.remove(index);
        self.derive(data, axes)
    }
}
