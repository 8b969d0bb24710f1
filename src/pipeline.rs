//! Dataset loops driving the diagnostics
//!
//! Each dataset is read and reduced on the rayon pool; the per-dataset results are
//! then folded sequentially in dataset-name order so the output never depends on
//! scheduling. A failing dataset is logged and skipped unless the error concerns
//! the whole run (see [`ClimVarError::is_run_fatal`]) or the reference dataset.

use crate::config::{DiagnosticConfig, ScalarSettings};
use crate::data_source::{DataReader, DatasetMeta};
use crate::errors::{ClimVarError, Result};
use crate::grid::GridArray;
use crate::statistics::aggregate::{
    common_grid, model_variability_index, IavAccumulator, MultiModelMean,
};
use crate::statistics::area::{area_series, AreaOperation, AreaReducer, UnitConversion};
use crate::statistics::operations::{masked_mean, masked_std};
use crate::statistics::time::{PeriodKind, ReduceOptions, TimeOperation, TimeReducer, YearWindow};
use crate::statistics::trend::{linear_trend, LinearTrend};
use crate::statistics::variability::{VariabilityEngine, VariabilityResult};
use chrono::Datelike;
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;

/// A dataset left out of a diagnostic and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDataset {
    pub dataset: String,
    pub reason: String,
}

/// Output of [`run_iav`]
#[derive(Debug, Clone, Serialize)]
pub struct IavReport {
    pub multi_model_mean: MultiModelMean,
    pub skipped: Vec<SkippedDataset>,
}

/// Scalar diagnostics of one dataset's area-reduced yearly series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarDiagnostic {
    pub dataset: String,
    pub units: String,
    /// Mean over `mean_time_range` (whole series when unset)
    pub mean: Option<f64>,
    /// Least squares trend over `trend_time_range`
    pub trend: Option<LinearTrend>,
    /// Standard deviation of yearly values over `mvi_time_range`
    pub sigma: Option<f64>,
    /// Model variability index against the reference dataset
    pub mvi: Option<f64>,
}

/// Output of [`run_scalar_diagnostics`]
#[derive(Debug, Clone, Serialize)]
pub struct ScalarReport {
    pub region: String,
    pub reference: String,
    pub rows: Vec<ScalarDiagnostic>,
    pub skipped: Vec<SkippedDataset>,
}

impl ScalarReport {
    /// Row of the named dataset
    #[must_use]
    pub fn row(&self, dataset: &str) -> Option<&ScalarDiagnostic> {
        self.rows.iter().find(|row| row.dataset == dataset)
    }
}

/// Compute the multi-model mean of interannual variability.
///
/// # Errors
///
/// Returns configuration errors before any dataset is read, a dimension error
/// when the reference dataset lacks an axis the engine needs, and a statistics
/// error when no dataset survives. The reference field, when usable, fixes the
/// common grid; otherwise the grid shared by most datasets does.
pub fn run_iav<R: DataReader + Sync>(reader: &R, config: &DiagnosticConfig) -> Result<IavReport> {
    let engine = VariabilityEngine::new(config.iav_settings()?);
    let reference = config.ref_dataset.as_deref();
    let datasets = sorted_datasets(reader)?;

    let start = Instant::now();
    let outcomes: Vec<(DatasetMeta, Result<VariabilityResult>)> = datasets
        .into_par_iter()
        .map(|meta| {
            let outcome = reader.read_dataset(&meta).and_then(|grid| {
                meta.check_coordinates(&grid)?;
                engine.compute(&grid, &meta)
            });
            (meta, outcome)
        })
        .collect();
    log::debug!("Variability of {} datasets computed in {:?}", outcomes.len(), start.elapsed());

    let valid = outcomes.iter().filter_map(|(_, outcome)| outcome.as_ref().ok());
    let mut accumulator =
        common_grid(valid, reference).map_or_else(IavAccumulator::new, IavAccumulator::on_grid);
    let mut skipped = Vec::new();
    for (meta, outcome) in outcomes {
        let added = outcome.and_then(|result| accumulator.add(&result));
        if let Err(error) = added {
            let is_reference = reference == Some(meta.name.as_str());
            if is_reference && matches!(error, ClimVarError::Dimension { .. }) {
                log::error!("Reference dataset '{}' is unusable: {error}", meta.name);
                return Err(error);
            }
            skip(&meta, error, &mut skipped)?;
        }
    }

    let multi_model_mean = accumulator.finish()?;
    log::info!(
        "Multi-model mean built from {} datasets ({} skipped)",
        multi_model_mean.datasets.len(),
        skipped.len()
    );
    Ok(IavReport {
        multi_model_mean,
        skipped,
    })
}

/// Compute area mean, trend, variability and model variability index per dataset.
///
/// # Errors
///
/// Returns configuration errors up front, any error raised for the reference
/// dataset, and run-fatal errors such as an empty region.
pub fn run_scalar_diagnostics<R: DataReader + Sync>(
    reader: &R,
    config: &DiagnosticConfig,
) -> Result<ScalarReport> {
    let settings = config.scalar_settings()?;
    let datasets = sorted_datasets(reader)?;
    if !datasets.iter().any(|meta| meta.name == settings.reference) {
        return Err(ClimVarError::Config(format!(
            "reference dataset '{}' is not among the input datasets",
            settings.reference
        )));
    }
    log::info!(
        "Scalar diagnostics over region '{}' against '{}'",
        settings.region.display_name,
        settings.reference
    );

    let outcomes: Vec<(DatasetMeta, Result<ScalarDiagnostic>)> = datasets
        .into_par_iter()
        .map(|meta| {
            let outcome = scalar_diagnostic(reader, &settings, &meta);
            (meta, outcome)
        })
        .collect();

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for (meta, outcome) in outcomes {
        match outcome {
            Ok(row) => rows.push(row),
            Err(error) if meta.name == settings.reference => {
                log::error!("Reference dataset '{}' failed: {error}", meta.name);
                return Err(error);
            }
            Err(error) => skip(&meta, error, &mut skipped)?,
        }
    }

    let reference_sigma = rows
        .iter()
        .find(|row| row.dataset == settings.reference)
        .and_then(|row| row.sigma);
    if reference_sigma.is_none() {
        log::warn!(
            "Reference '{}' has no valid standard deviation; every index is missing",
            settings.reference
        );
    }
    for row in &mut rows {
        row.mvi = model_variability_index(row.sigma, reference_sigma);
    }

    Ok(ScalarReport {
        region: settings.region.display_name.to_string(),
        reference: settings.reference,
        rows,
        skipped,
    })
}

fn sorted_datasets<R: DataReader>(reader: &R) -> Result<Vec<DatasetMeta>> {
    let mut datasets = reader.list_datasets()?;
    if datasets.is_empty() {
        return Err(ClimVarError::Config("no input datasets".to_string()));
    }
    datasets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(datasets)
}

fn skip(meta: &DatasetMeta, error: ClimVarError, skipped: &mut Vec<SkippedDataset>) -> Result<()> {
    if error.is_run_fatal() {
        return Err(error);
    }
    log::warn!("Skipping dataset '{}': {error}", meta.name);
    skipped.push(SkippedDataset {
        dataset: meta.name.clone(),
        reason: error.to_string(),
    });
    Ok(())
}

/// Yearly means -> area reduction -> unit conversion -> windowed statistics
fn scalar_diagnostic<R: DataReader>(
    reader: &R,
    settings: &ScalarSettings,
    meta: &DatasetMeta,
) -> Result<ScalarDiagnostic> {
    let grid = reader.read_dataset(meta)?;
    meta.check_coordinates(&grid)?;

    let series = yearly_area_series(&grid, settings, meta)?;
    let years: Vec<i32> = series.times()?.iter().map(|d| d.year()).collect();
    let values: Vec<Option<f64>> = series.data().iter().map(|&v| series.masked(v)).collect();
    let within = |window: Option<YearWindow>| -> Vec<Option<f64>> {
        years
            .iter()
            .zip(&values)
            .map(|(&year, &v)| match window {
                Some(w) if !w.contains(year) => None,
                _ => v,
            })
            .collect()
    };

    Ok(ScalarDiagnostic {
        dataset: meta.name.clone(),
        units: series.attributes().units.clone(),
        mean: masked_mean(&within(settings.mean_window), 1),
        trend: linear_trend(&years, &within(settings.trend_window)),
        sigma: masked_std(&within(settings.mvi_window)),
        mvi: None,
    })
}

fn yearly_area_series(
    grid: &GridArray,
    settings: &ScalarSettings,
    meta: &DatasetMeta,
) -> Result<GridArray> {
    let reducer = TimeReducer::new(ReduceOptions {
        operation: TimeOperation::Average,
        normalize_bounds: true,
        max_missing_fraction: settings.max_missing_fraction,
    });
    let yearly = reducer.reduce(grid, meta.start_year, meta.end_year, &PeriodKind::Yearly)?;

    let operation = AreaOperation::for_units(&grid.attributes().units);
    log::debug!(
        "'{}': area {} over {}",
        meta.name,
        operation.as_str(),
        settings.region.display_name
    );
    let series = area_series(&yearly, &AreaReducer::new(settings.region.bounds, operation))?;
    UnitConversion::for_units(&series.attributes().units).apply(&series)
}
