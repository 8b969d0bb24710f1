//! Diagnostic configuration surface
//!
//! [`DiagnosticConfig`] mirrors the options a recipe hands to the diagnostic. It is
//! deserialized leniently and validated into typed settings before any dataset is
//! touched, so a bad option aborts the run up front.

use crate::errors::{ClimVarError, Result};
use crate::region::{Region, RegionSelector};
use crate::statistics::time::{Season, YearWindow, DEFAULT_MAX_MISSING_FRACTION};
use crate::statistics::variability::{TimeAvg, VariabilitySettings};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Raw diagnostic options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    /// `annualclim` or `seasonalclim` (required)
    pub time_avg: Option<String>,
    /// Segment length in years; whole-record variability when absent
    pub periodlength: Option<i64>,
    /// Indices of the standard seasons to keep (DJF=0, MAM=1, JJA=2, SON=3)
    pub seasons: Option<Vec<usize>>,
    pub region: Option<String>,
    #[serde(alias = "reference_dataset")]
    pub ref_dataset: Option<String>,
    pub mean_time_range: Option<[i32; 2]>,
    pub trend_time_range: Option<[i32; 2]>,
    pub mvi_time_range: Option<[i32; 2]>,
    pub max_missing_fraction: Option<f64>,
    #[serde(default)]
    pub restore_mean: bool,
    pub threads: Option<usize>,
}

/// Validated options for the area-mean / trend / MVI diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarSettings {
    pub time_avg: TimeAvg,
    pub region: Region,
    pub reference: String,
    pub mean_window: Option<YearWindow>,
    pub trend_window: Option<YearWindow>,
    pub mvi_window: Option<YearWindow>,
    pub max_missing_fraction: f64,
}

impl DiagnosticConfig {
    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Json`] for malformed input.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns I/O or JSON errors.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// The mandatory `time_avg` option.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Config`] when absent or not a known value.
    pub fn time_avg(&self) -> Result<TimeAvg> {
        self.time_avg
            .as_deref()
            .ok_or_else(|| ClimVarError::Config("missing required option 'time_avg'".to_string()))?
            .parse()
    }

    /// Settings for the interannual variability diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Config`] for missing or invalid options.
    pub fn iav_settings(&self) -> Result<VariabilitySettings> {
        let time_avg = self.time_avg()?;
        let mut settings = VariabilitySettings::new(time_avg);
        settings.max_missing_fraction = self.max_missing_fraction()?;
        settings.restore_mean = self.restore_mean;

        if let Some(length) = self.periodlength {
            let length = u32::try_from(length)
                .ok()
                .filter(|&l| l > 0)
                .ok_or_else(|| {
                    ClimVarError::Config(format!("'periodlength' must be a positive number of years, got {length}"))
                })?;
            settings = settings.with_period_length(length);
        }

        if let Some(indices) = &self.seasons {
            if time_avg == TimeAvg::AnnualClim {
                log::warn!("'seasons' is ignored for time_avg = annualclim");
            }
            settings = settings.with_seasons(Season::from_indices(indices)?);
        }
        Ok(settings)
    }

    /// Settings for the area-mean, trend and model variability index diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Config`] for missing options or inverted ranges and
    /// [`ClimVarError::UnknownRegion`] for unknown region names.
    pub fn scalar_settings(&self) -> Result<ScalarSettings> {
        let time_avg = self.time_avg()?;
        let region_name = self
            .region
            .as_deref()
            .ok_or_else(|| ClimVarError::Config("missing required option 'region'".to_string()))?;
        let region = RegionSelector::resolve(region_name)?;
        let reference = self.ref_dataset.clone().ok_or_else(|| {
            ClimVarError::Config(
                "missing required option 'ref_dataset' (or 'reference_dataset')".to_string(),
            )
        })?;

        Ok(ScalarSettings {
            time_avg,
            region,
            reference,
            mean_window: year_range("mean_time_range", self.mean_time_range)?,
            trend_window: year_range("trend_time_range", self.trend_time_range)?,
            mvi_window: year_range("mvi_time_range", self.mvi_time_range)?,
            max_missing_fraction: self.max_missing_fraction()?,
        })
    }

    fn max_missing_fraction(&self) -> Result<f64> {
        let fraction = self
            .max_missing_fraction
            .unwrap_or(DEFAULT_MAX_MISSING_FRACTION);
        if (0.0..=1.0).contains(&fraction) {
            Ok(fraction)
        } else {
            Err(ClimVarError::Config(format!(
                "'max_missing_fraction' must lie in [0, 1], got {fraction}"
            )))
        }
    }
}

fn year_range(option: &str, range: Option<[i32; 2]>) -> Result<Option<YearWindow>> {
    range
        .map(|[start, end]| {
            YearWindow::new(start, end).map_err(|_| {
                ClimVarError::Config(format!("'{option}' = [{start}, {end}] is not a valid year range"))
            })
        })
        .transpose()
}
