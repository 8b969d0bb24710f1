//! Multi-model combination of variability fields
//!
//! [`IavAccumulator`] folds per-dataset variability into a multi-model mean; the
//! model variability index compares one dataset's spread against a reference.

use super::operations::{MaskedReduction, StatOperation};
use super::time::{PeriodKind, ReduceOptions, TimeReducer, YearWindow};
use super::variability::VariabilityResult;
use crate::errors::{ClimVarError, Result};
use crate::grid::{is_missing, AxisKind, GridArray};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::SQRT_2;

/// Factor applied to every dataset's variability before it enters the mean
pub const IAV_SCALING: f64 = SQRT_2;

/// Raw index values at or above this are replaced by [`MVI_CAP`]
pub const MVI_THRESHOLD: f64 = 10.0;

/// Value assigned to every cell whose raw index reaches [`MVI_THRESHOLD`]
pub const MVI_CAP: f64 = 50.0;

/// Running multi-model sum of scaled variability fields
#[derive(Debug)]
pub struct IavAccumulator {
    template: Option<GridArray>,
    sum: ArrayD<f64>,
    count: ArrayD<u32>,
    contributors: BTreeMap<i64, Vec<String>>,
    datasets: Vec<String>,
}

impl Default for IavAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl IavAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            template: None,
            sum: ArrayD::zeros(IxDyn(&[0])),
            count: ArrayD::zeros(IxDyn(&[0])),
            contributors: BTreeMap::new(),
            datasets: Vec::new(),
        }
    }

    /// Accumulator whose common grid is fixed up front, typically by the
    /// reference dataset's field.
    #[must_use]
    pub fn on_grid(template: &GridArray) -> Self {
        Self {
            template: Some(template.clone()),
            sum: ArrayD::zeros(template.data().raw_dim()),
            count: ArrayD::zeros(template.data().raw_dim()),
            contributors: BTreeMap::new(),
            datasets: Vec::new(),
        }
    }

    /// Datasets folded in so far, in fold order
    #[must_use]
    pub fn datasets(&self) -> &[String] {
        &self.datasets
    }

    /// Add one dataset's variability, scaled by [`IAV_SCALING`].
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] if the field is not on the common grid
    /// and [`ClimVarError::InsufficientData`] if it has no valid cell; the
    /// accumulator is left untouched either way.
    pub fn add(&mut self, result: &VariabilityResult) -> Result<()> {
        let field = &result.field;
        let season_axis = field.require_axis(AxisKind::Season)?;
        if field.valid_count() == 0 {
            return Err(ClimVarError::insufficient_data(
                result.dataset.clone(),
                "variability field has no valid cell",
            ));
        }

        match &self.template {
            Some(template) if !template.same_grid(field) => {
                return Err(ClimVarError::dimension(
                    result.dataset.clone(),
                    "variability field is not on the common grid; regrid before aggregating",
                ));
            }
            Some(_) => {}
            None => {
                self.sum = ArrayD::zeros(field.data().raw_dim());
                self.count = ArrayD::zeros(field.data().raw_dim());
                self.template = Some(field.clone());
            }
        }

        let fill = field.fill_value();
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(field.data())
            .for_each(|sum, count, &v| {
                if !is_missing(v, fill) {
                    *sum += v * IAV_SCALING;
                    *count += 1;
                }
            });

        let seasons = field.coordinate_values(AxisKind::Season)?;
        for (i, &season) in seasons.iter().enumerate() {
            let slice = field.data().index_axis(Axis(season_axis), i);
            if slice.iter().any(|&v| !is_missing(v, fill)) {
                #[allow(clippy::cast_possible_truncation)]
                let key = season.round() as i64;
                self.contributors
                    .entry(key)
                    .or_default()
                    .push(result.dataset.clone());
            }
        }

        self.datasets.push(result.dataset.clone());
        log::info!("Added '{}' to the multi-model mean", result.dataset);
        Ok(())
    }

    /// Divide the running sum by the per-cell number of contributing datasets.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Statistics`] when no dataset was added or no cell
    /// received a valid value.
    pub fn finish(self) -> Result<MultiModelMean> {
        let template = match self.template {
            Some(template) if self.count.iter().any(|&c| c > 0) => template,
            _ => {
                return Err(ClimVarError::Statistics(
                    "no dataset contributed to the multi-model mean".to_string(),
                ))
            }
        };

        let fill = template.fill_value();
        let mut data: ArrayD<f64> = ArrayD::zeros(self.sum.raw_dim());
        Zip::from(&mut data)
            .and(&self.sum)
            .and(&self.count)
            .for_each(|out, &sum, &count| {
                *out = if count == 0 {
                    fill
                } else {
                    sum / f64::from(count)
                };
            });

        let comment = format!(
            "Multi-model mean of interannual variability (scaled by sqrt(2)) from: {}",
            self.datasets.join(", ")
        );
        let mut field = template
            .derive(data, template.axes().to_vec())?
            .with_dataset("MultiModelMean");
        let attributes = field.attributes_mut();
        attributes.comment.clone_from(&comment);
        if !attributes.short_name.is_empty() {
            attributes.long_name =
                format!("Interannual variability of {}", attributes.short_name);
            attributes.short_name = format!("{}_iav", attributes.short_name);
        }

        Ok(MultiModelMean {
            field,
            provenance: self.contributors,
            datasets: self.datasets,
            comment,
        })
    }
}

/// Grid the multi-model mean is built on.
///
/// The named reference dataset's field wins when present; otherwise the grid
/// shared by most results, ties going to the one seen first.
pub fn common_grid<'a>(
    results: impl IntoIterator<Item = &'a VariabilityResult>,
    reference: Option<&str>,
) -> Option<&'a GridArray> {
    let mut groups: Vec<(&GridArray, usize)> = Vec::new();
    for result in results {
        if reference == Some(result.dataset.as_str()) {
            return Some(&result.field);
        }
        match groups.iter_mut().find(|(grid, _)| grid.same_grid(&result.field)) {
            Some((_, count)) => *count += 1,
            None => groups.push((&result.field, 1)),
        }
    }

    let mut best: Option<(&GridArray, usize)> = None;
    for (grid, count) in groups {
        if best.map_or(true, |(_, most)| count > most) {
            best = Some((grid, count));
        }
    }
    best.map(|(grid, _)| grid)
}

/// Fold results into a multi-model mean in dataset-name order.
///
/// The mean is built on the majority grid; results on another grid or without
/// any valid cell are logged and skipped.
///
/// # Errors
///
/// Returns an error when no result could be aggregated.
pub fn fold_iav(results: impl IntoIterator<Item = VariabilityResult>) -> Result<MultiModelMean> {
    let mut results: Vec<_> = results.into_iter().collect();
    results.sort_by(|a, b| a.dataset.cmp(&b.dataset));

    let mut accumulator =
        common_grid(&results, None).map_or_else(IavAccumulator::new, IavAccumulator::on_grid);
    for result in &results {
        if let Err(e) = accumulator.add(result) {
            log::warn!("Skipping '{}': {e}", result.dataset);
        }
    }
    accumulator.finish()
}

/// Multi-model mean of scaled variability with its provenance
#[derive(Debug, Clone, Serialize)]
pub struct MultiModelMean {
    pub field: GridArray,
    /// Season index -> datasets with at least one valid cell in that season
    pub provenance: BTreeMap<i64, Vec<String>>,
    /// Every dataset folded into the mean
    pub datasets: Vec<String>,
    pub comment: String,
}

/// Two-tier clamped model variability index for one pair of standard deviations.
///
/// Missing or exactly-zero deviations give a missing index.
#[must_use]
pub fn model_variability_index(sigma_model: Option<f64>, sigma_ref: Option<f64>) -> Option<f64> {
    let (model, reference) = (sigma_model?, sigma_ref?);
    if model == 0.0 || reference == 0.0 {
        return None;
    }

    let raw = (model / reference - reference / model).powi(2);
    if raw < MVI_THRESHOLD {
        Some(raw)
    } else {
        Some(MVI_CAP)
    }
}

/// Cell-wise model variability index of two standard deviation fields.
///
/// # Errors
///
/// Returns [`ClimVarError::Dimension`] when the fields are on different grids.
pub fn mvi_field(model_sigma: &GridArray, reference_sigma: &GridArray) -> Result<GridArray> {
    if !model_sigma.same_grid(reference_sigma) {
        return Err(ClimVarError::dimension(
            model_sigma.dataset(),
            format!(
                "standard deviation field is not on the grid of reference '{}'",
                reference_sigma.dataset()
            ),
        ));
    }

    let fill = model_sigma.fill_value();
    let mut data: ArrayD<f64> = ArrayD::zeros(model_sigma.data().raw_dim());
    Zip::from(&mut data)
        .and(model_sigma.data())
        .and(reference_sigma.data())
        .for_each(|out, &m, &r| {
            *out = model_variability_index(model_sigma.masked(m), reference_sigma.masked(r))
                .unwrap_or(fill);
        });

    let mut field = model_sigma.derive(data, model_sigma.axes().to_vec())?;
    let attributes = field.attributes_mut();
    attributes.units = "1".to_string();
    attributes.comment = format!(
        "Model variability index against '{}'",
        reference_sigma.dataset()
    );
    Ok(field)
}

/// Standard deviation of yearly means within `window`, per cell
///
/// # Errors
///
/// Propagates range and dimension errors of the yearly reduction.
pub fn yearly_sigma(
    grid: &GridArray,
    window: YearWindow,
    options: ReduceOptions,
) -> Result<GridArray> {
    TimeReducer::new(options)
        .reduce(grid, window.start, window.end, &PeriodKind::Yearly)?
        .reduce_along(AxisKind::Time, StatOperation::StdDev)
}
