//! Parallel lane processing for masked reductions
//!
//! Every statistic in the crate is expressed as a function over the 1-D lanes of an
//! array along one axis. The helpers here move that axis last, hand each lane to
//! the closure on the rayon pool, and put the axis back afterwards.

use crate::errors::{ClimVarError, Result};
use crate::grid::masked;
use ndarray::{ArrayD, Axis};
use rayon::prelude::*;

/// Maps every lane along `axis` to a new lane of length `out_len`
///
/// Missing samples (the fill constant or NaN) reach `f` as `None`, and `None`
/// results are written back as `fill_value`.
///
/// # Errors
///
/// Returns an error if the axis is out of bounds or `f` returns a lane of the
/// wrong length.
pub fn map_lanes<F>(
    data: &ArrayD<f64>,
    axis: usize,
    out_len: usize,
    fill_value: f64,
    f: F,
) -> Result<ArrayD<f64>>
where
    F: Fn(&[Option<f64>]) -> Vec<Option<f64>> + Sync,
{
    let ndim = data.ndim();
    if axis >= ndim {
        return Err(ClimVarError::Statistics(format!(
            "Axis {axis} is out of bounds for array with {ndim} dimensions"
        )));
    }

    let axis_len = data.shape()[axis];
    let mut perm: Vec<usize> = (0..ndim).filter(|&d| d != axis).collect();
    perm.push(axis);

    // Logical iteration order of the permuted view puts each lane contiguously
    let values: Vec<Option<f64>> = data
        .view()
        .permuted_axes(perm.clone())
        .iter()
        .map(|&v| masked(v, fill_value))
        .collect();

    let outer_shape: Vec<usize> = perm[..ndim - 1].iter().map(|&d| data.shape()[d]).collect();
    let n_lanes: usize = outer_shape.iter().product();

    log::debug!(
        "Processing {n_lanes} lanes of length {axis_len} across {} threads",
        rayon::current_num_threads()
    );

    let lanes: Vec<Vec<Option<f64>>> = (0..n_lanes)
        .into_par_iter()
        .map(|lane| f(&values[lane * axis_len..(lane + 1) * axis_len]))
        .collect();

    if let Some(bad) = lanes.iter().find(|lane| lane.len() != out_len) {
        return Err(ClimVarError::Statistics(format!(
            "lane function returned {} values, expected {out_len}",
            bad.len()
        )));
    }

    let flat: Vec<f64> = lanes
        .into_iter()
        .flatten()
        .map(|v| v.unwrap_or(fill_value))
        .collect();

    let mut moved_shape = outer_shape;
    moved_shape.push(out_len);
    let moved = ArrayD::from_shape_vec(moved_shape, flat)?;

    // Undo the permutation: original axis `d` sits at position `inverse[d]` of `moved`
    let mut inverse = vec![0; ndim];
    for (position, &d) in perm.iter().enumerate() {
        inverse[d] = position;
    }
    Ok(moved
        .permuted_axes(inverse)
        .as_standard_layout()
        .into_owned())
}

/// Reduces every lane along `axis` to a single value, removing the axis
///
/// # Errors
///
/// Returns an error if the axis is out of bounds.
pub fn reduce_lanes<F>(
    data: &ArrayD<f64>,
    axis: usize,
    fill_value: f64,
    f: F,
) -> Result<ArrayD<f64>>
where
    F: Fn(&[Option<f64>]) -> Option<f64> + Sync,
{
    let reduced = map_lanes(data, axis, 1, fill_value, |lane| vec![f(lane)])?;
    Ok(reduced.index_axis_move(Axis(axis), 0))
}
