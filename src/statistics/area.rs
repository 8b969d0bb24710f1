//! Area-weighted reductions over a latitude/longitude box
//!
//! Cell weights are `cos(lat) * dlat * dlon` (radians) with the cell widths taken
//! from the spacing of neighbouring coordinates. Sums are scaled by the Earth's
//! radius squared so that flux densities integrate to totals in `m2` units.

use crate::errors::{ClimVarError, Result};
use crate::grid::{masked, AxisKind, GridArray};
use crate::region::RegionBox;
use ndarray::ArrayD;
use rayon::prelude::*;

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6.371e6;

/// How cells inside the box are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaOperation {
    /// Area-weighted sum, for flux densities
    Sum,
    /// Area-weighted mean, for state variables
    Average,
}

impl AreaOperation {
    /// Sum flux densities (units per square metre), average everything else
    #[must_use]
    pub fn for_units(units: &str) -> Self {
        if units.split_whitespace().any(|token| token == "m-2" || token == "m^-2") {
            Self::Sum
        } else {
            Self::Average
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "average",
        }
    }
}

/// Reduces the lat/lon axes of a grid over a region box
#[derive(Debug, Clone, Copy)]
pub struct AreaReducer {
    region: RegionBox,
    operation: AreaOperation,
}

impl AreaReducer {
    #[must_use]
    pub const fn new(region: RegionBox, operation: AreaOperation) -> Self {
        Self { region, operation }
    }

    /// Collapse the lat and lon axes; every other axis is kept in order.
    ///
    /// Output entries whose box holds no valid cell are missing.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] without lat/lon axes and
    /// [`ClimVarError::EmptyRegion`] when no valid cell falls inside the box.
    pub fn reduce(&self, grid: &GridArray) -> Result<GridArray> {
        let lat_axis = grid.require_axis(AxisKind::Lat)?;
        let lon_axis = grid.require_axis(AxisKind::Lon)?;
        let lats = grid.coordinate_values(AxisKind::Lat)?;
        let lons = grid.coordinate_values(AxisKind::Lon)?;

        let weights = self.cell_weights(lats, lons);
        if weights.iter().all(|&w| w == 0.0) {
            return Err(self.empty_region());
        }

        // Move lat and lon last so each outer index owns one contiguous (lat, lon) block
        let ndim = grid.ndim();
        let mut perm: Vec<usize> = (0..ndim)
            .filter(|&d| d != lat_axis && d != lon_axis)
            .collect();
        let outer = perm.len();
        perm.push(lat_axis);
        perm.push(lon_axis);

        let fill = grid.fill_value();
        let block = lats.len() * lons.len();
        let values: Vec<f64> = grid
            .data()
            .view()
            .permuted_axes(perm.clone())
            .iter()
            .copied()
            .collect();
        let outer_shape: Vec<usize> = perm[..outer].iter().map(|&d| grid.shape()[d]).collect();
        let n_outer: usize = outer_shape.iter().product();

        let reduced: Vec<Option<f64>> = (0..n_outer)
            .into_par_iter()
            .map(|i| {
                let cells = &values[i * block..(i + 1) * block];
                let (weighted, total_weight) = cells
                    .iter()
                    .zip(&weights)
                    .filter(|&(_, &w)| w > 0.0)
                    .filter_map(|(&v, &w)| masked(v, fill).map(|v| (v * w, w)))
                    .fold((0.0, 0.0), |(s, ws), (vw, w)| (s + vw, ws + w));
                if total_weight == 0.0 {
                    return None;
                }
                Some(match self.operation {
                    AreaOperation::Sum => weighted * EARTH_RADIUS_M * EARTH_RADIUS_M,
                    AreaOperation::Average => weighted / total_weight,
                })
            })
            .collect();

        if reduced.iter().all(Option::is_none) {
            return Err(self.empty_region());
        }

        let data = ArrayD::from_shape_vec(
            outer_shape,
            reduced.into_iter().map(|v| v.unwrap_or(fill)).collect(),
        )?;
        let axes = perm[..outer].iter().map(|&d| grid.axes()[d].clone()).collect();
        let mut result = grid.derive(data, axes)?;
        if self.operation == AreaOperation::Sum {
            let units = &mut result.attributes_mut().units;
            *units = collapse_area_units(units);
        }
        Ok(result)
    }

    /// Row-major (lat, lon) weights; zero outside the box
    fn cell_weights(&self, lats: &[f64], lons: &[f64]) -> Vec<f64> {
        let lat_widths = cell_widths(lats, 180.0, Some((-90.0, 90.0)));
        let lon_widths = cell_widths(lons, 360.0, None);
        let mut weights = Vec::with_capacity(lats.len() * lons.len());
        for (&lat, &dlat) in lats.iter().zip(&lat_widths) {
            for (&lon, &dlon) in lons.iter().zip(&lon_widths) {
                if self.region.contains(lat, lon) {
                    let cos_lat = lat.to_radians().cos().max(0.0);
                    weights.push(cos_lat * dlat.to_radians() * dlon.to_radians());
                } else {
                    weights.push(0.0);
                }
            }
        }
        weights
    }

    fn empty_region(&self) -> ClimVarError {
        ClimVarError::EmptyRegion {
            lat_min: self.region.lat_min,
            lat_max: self.region.lat_max,
            lon_min: self.region.lon_min,
            lon_max: self.region.lon_max,
        }
    }
}

/// Widths (degrees) of the cells centred on `coords`, from midpoints between neighbours
///
/// Cell edges are clamped to `limits` when given (the poles for latitude).
fn cell_widths(coords: &[f64], full_span: f64, limits: Option<(f64, f64)>) -> Vec<f64> {
    match coords.len() {
        0 => Vec::new(),
        1 => vec![full_span],
        n => (0..n)
            .map(|i| {
                let lower = if i == 0 {
                    coords[0] - (coords[1] - coords[0]) / 2.0
                } else {
                    (coords[i - 1] + coords[i]) / 2.0
                };
                let upper = if i == n - 1 {
                    coords[n - 1] + (coords[n - 1] - coords[n - 2]) / 2.0
                } else {
                    (coords[i] + coords[i + 1]) / 2.0
                };
                match limits {
                    Some((lo, hi)) => (upper.clamp(lo, hi) - lower.clamp(lo, hi)).abs(),
                    None => (upper - lower).abs(),
                }
            })
            .collect(),
    }
}

/// Drop the per-area factor from flux-density units ("kg m-2 s-1" -> "kg s-1")
fn collapse_area_units(units: &str) -> String {
    units
        .split_whitespace()
        .filter(|token| *token != "m-2" && *token != "m^-2")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Area-reduce every time step of a grid into a one-dimensional series.
///
/// # Errors
///
/// Same conditions as [`AreaReducer::reduce`], plus [`ClimVarError::Dimension`]
/// when axes other than time survive the reduction.
pub fn area_series(grid: &GridArray, reducer: &AreaReducer) -> Result<GridArray> {
    let reduced = reducer.reduce(grid)?;
    if reduced.ndim() != 1 || reduced.axis_index(AxisKind::Time).is_none() {
        return Err(ClimVarError::dimension(
            grid.dataset(),
            "area series needs a grid with only time, lat and lon axes",
        ));
    }
    Ok(reduced)
}

/// Scale every valid sample by `factor`, leaving missing samples in place.
///
/// # Errors
///
/// Returns an error only if the grid buffer cannot be rebuilt.
pub fn scale(grid: &GridArray, factor: f64) -> Result<GridArray> {
    let data = grid
        .data()
        .mapv(|v| if grid.is_missing(v) { v } else { v * factor });
    grid.derive(data, grid.axes().to_vec())
}

/// Seconds in a 365-day model year
pub const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Kilograms per petagram
const KG_PER_PG: f64 = 1.0e12;

/// Conversion of area-summed carbon quantities to conventional reporting units
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConversion {
    pub factor: f64,
    pub units: String,
}

impl UnitConversion {
    /// Conversion for units left after area reduction.
    ///
    /// Fluxes in `kg s-1` become `PgC y-1`, stocks in `kg` become `PgC`; anything
    /// else is passed through unchanged.
    #[must_use]
    pub fn for_units(units: &str) -> Self {
        match units.trim() {
            "kg s-1" | "kg s^-1" => Self {
                factor: SECONDS_PER_YEAR / KG_PER_PG,
                units: "PgC y-1".to_string(),
            },
            "kg" => Self {
                factor: 1.0 / KG_PER_PG,
                units: "PgC".to_string(),
            },
            other => Self {
                factor: 1.0,
                units: other.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.factor == 1.0
    }

    /// Apply the conversion to every valid sample and relabel the units.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`scale`].
    pub fn apply(&self, grid: &GridArray) -> Result<GridArray> {
        if self.is_identity() {
            return Ok(grid.clone());
        }
        let mut converted = scale(grid, self.factor)?;
        converted.attributes_mut().units.clone_from(&self.units);
        Ok(converted)
    }
}
