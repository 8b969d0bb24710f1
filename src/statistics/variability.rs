//! Interannual variability of control runs
//!
//! Two estimators are provided. Without a period length the whole post-spin-up
//! record is reduced to yearly (or season-yearly) means, detrended and its
//! standard deviation taken. With a period length the record is cut into
//! consecutive periods, each period is averaged, and the standard deviation is
//! taken across the detrended period means.

use super::detrend::{Detrender, TrendDegree};
use super::operations::{MaskedReduction, StatOperation};
use super::time::{
    remove_seasonal_cycle, season_axis, PeriodKind, ReduceOptions, Season, TimeOperation,
    TimeReducer, YearWindow, DEFAULT_MAX_MISSING_FRACTION,
};
use crate::data_source::DatasetMeta;
use crate::errors::{ClimVarError, Result};
use crate::grid::{AxisKind, GridArray, GridAxis};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Years discarded at the start of every control run
pub const SPINUP_YEARS: i32 = 100;

/// Usable record length below which a control run is flagged as short
pub const MIN_CONTROL_YEARS: i32 = 500;

/// Averaging applied before variability is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeAvg {
    #[serde(rename = "annualclim")]
    AnnualClim,
    #[serde(rename = "seasonalclim")]
    SeasonalClim,
}

impl FromStr for TimeAvg {
    type Err = ClimVarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "annualclim" => Ok(Self::AnnualClim),
            "seasonalclim" => Ok(Self::SeasonalClim),
            other => Err(ClimVarError::Config(format!(
                "time_avg must be 'annualclim' or 'seasonalclim', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TimeAvg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnnualClim => f.write_str("annualclim"),
            Self::SeasonalClim => f.write_str("seasonalclim"),
        }
    }
}

/// Validated settings driving [`VariabilityEngine`]
#[derive(Debug, Clone, PartialEq)]
pub struct VariabilitySettings {
    pub time_avg: TimeAvg,
    pub period_length: Option<u32>,
    /// Seasons kept for `seasonalclim`; ignored for `annualclim`
    pub seasons: Vec<Season>,
    pub max_missing_fraction: f64,
    pub restore_mean: bool,
}

impl VariabilitySettings {
    #[must_use]
    pub fn new(time_avg: TimeAvg) -> Self {
        Self {
            time_avg,
            period_length: None,
            seasons: Season::standard(),
            max_missing_fraction: DEFAULT_MAX_MISSING_FRACTION,
            restore_mean: false,
        }
    }

    #[must_use]
    pub fn with_period_length(mut self, period_length: u32) -> Self {
        self.period_length = Some(period_length);
        self
    }

    #[must_use]
    pub fn with_seasons(mut self, seasons: Vec<Season>) -> Self {
        self.seasons = seasons;
        self
    }

    fn period_kind(&self) -> PeriodKind {
        match self.time_avg {
            TimeAvg::AnnualClim => PeriodKind::Annual,
            TimeAvg::SeasonalClim => PeriodKind::Seasonal(self.seasons.clone()),
        }
    }
}

/// A consecutive block of years of a segmented record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start_year: i32,
    pub end_year: i32,
}

impl Period {
    /// Cut `[first_year, last_year]` into blocks of `length` years.
    ///
    /// The last block absorbs any remainder shorter than `length`. Returns an
    /// empty list when not even one full block fits.
    #[must_use]
    pub fn partition(first_year: i32, last_year: i32, length: u32) -> Vec<Self> {
        let Ok(length) = i32::try_from(length) else {
            return Vec::new();
        };
        if length == 0 || last_year < first_year {
            return Vec::new();
        }

        let n_full = (last_year - first_year + 1) / length;
        let mut periods: Vec<Self> = (0..n_full)
            .map(|i| {
                let start_year = first_year + i * length;
                Self {
                    start_year,
                    end_year: start_year + length - 1,
                }
            })
            .collect();
        if let Some(last) = periods.last_mut() {
            last.end_year = last_year;
        }
        periods
    }

    #[must_use]
    pub const fn years(&self) -> i32 {
        self.end_year - self.start_year + 1
    }
}

/// Which estimator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IavMode {
    WholePeriod,
    Segmented { period_length: u32, periods: usize },
}

/// Unscaled interannual variability of one dataset, season axis first
#[derive(Debug, Clone)]
pub struct VariabilityResult {
    pub dataset: String,
    pub field: GridArray,
    pub mode: IavMode,
    pub window: YearWindow,
}

/// Computes per-dataset interannual variability
#[derive(Debug, Clone)]
pub struct VariabilityEngine {
    settings: VariabilitySettings,
    detrender: Detrender,
}

impl VariabilityEngine {
    #[must_use]
    pub fn new(settings: VariabilitySettings) -> Self {
        let detrender =
            Detrender::new(TrendDegree::Quadratic).with_restored_mean(settings.restore_mean);
        Self {
            settings,
            detrender,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &VariabilitySettings {
        &self.settings
    }

    /// Interannual variability of one control run.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::InsufficientData`] when spin-up leaves too few
    /// years or periods to detrend, or when no cell gets a valid value, and
    /// propagates dimension/range errors of the underlying reductions.
    pub fn compute(&self, grid: &GridArray, meta: &DatasetMeta) -> Result<VariabilityResult> {
        let window = usable_window(meta)?;
        let field = match self.settings.period_length {
            None => self.whole_period(grid, window)?,
            Some(length) => self.segmented(grid, window, length, &meta.name)?,
        };
        if field.valid_count() == 0 {
            return Err(ClimVarError::insufficient_data(
                meta.name.clone(),
                "no grid cell has a valid variability value",
            ));
        }

        let mode = match self.settings.period_length {
            None => IavMode::WholePeriod,
            Some(period_length) => IavMode::Segmented {
                period_length,
                periods: Period::partition(window.start, window.end, period_length).len(),
            },
        };
        log::info!(
            "Computed {} interannual variability for '{}' over {}-{}",
            self.settings.time_avg,
            meta.name,
            window.start,
            window.end
        );

        Ok(VariabilityResult {
            dataset: meta.name.clone(),
            field,
            mode,
            window,
        })
    }

    fn reducer(&self, operation: TimeOperation) -> TimeReducer {
        TimeReducer::new(ReduceOptions {
            operation,
            normalize_bounds: true,
            max_missing_fraction: self.settings.max_missing_fraction,
        })
    }

    fn whole_period(&self, grid: &GridArray, window: YearWindow) -> Result<GridArray> {
        match self.settings.time_avg {
            TimeAvg::AnnualClim => {
                let yearly = self.reducer(TimeOperation::Average).reduce(
                    grid,
                    window.start,
                    window.end,
                    &PeriodKind::Yearly,
                )?;
                let field = self.series_std(&yearly)?;
                GridArray::stack(&[field], GridAxis::new(AxisKind::Season, vec![0.0]))
            }
            TimeAvg::SeasonalClim => {
                let record = self.reducer(TimeOperation::Extract).reduce(
                    grid,
                    window.start,
                    window.end,
                    &PeriodKind::Yearly,
                )?;
                let anomalies = remove_seasonal_cycle(&record)?;
                let averaging = self.reducer(TimeOperation::Average);
                let fields = self
                    .settings
                    .seasons
                    .iter()
                    .map(|season| {
                        let series =
                            averaging.season_series(&anomalies, window.start, window.end, season)?;
                        self.series_std(&series)
                    })
                    .collect::<Result<Vec<_>>>()?;
                GridArray::stack(&fields, season_axis(&self.settings.seasons))
            }
        }
    }

    fn segmented(
        &self,
        grid: &GridArray,
        window: YearWindow,
        length: u32,
        dataset: &str,
    ) -> Result<GridArray> {
        let periods = Period::partition(window.start, window.end, length);
        if periods.is_empty() {
            return Err(ClimVarError::insufficient_data(
                dataset,
                format!(
                    "{} usable years do not fill one {length}-year period",
                    window.years()
                ),
            ));
        }
        log::info!(
            "Split '{dataset}' into {} periods of {length} years",
            periods.len()
        );
        let needed = self.detrender.degree().min_samples();
        if periods.len() < needed {
            return Err(ClimVarError::insufficient_data(
                dataset,
                format!(
                    "{} periods of {length} years, fewer than the {needed} needed to detrend",
                    periods.len()
                ),
            ));
        }

        let reducer = self.reducer(TimeOperation::Average);
        let kind = self.settings.period_kind();
        let fields = periods
            .iter()
            .map(|p| reducer.reduce(grid, p.start_year, p.end_year, &kind))
            .collect::<Result<Vec<_>>>()?;

        let starts = periods.iter().map(|p| f64::from(p.start_year)).collect();
        let stacked = GridArray::stack(&fields, GridAxis::new(AxisKind::Period, starts))?;
        let residuals = self.detrender.detrend(&stacked, AxisKind::Period)?;
        residuals.reduce_along(AxisKind::Period, StatOperation::StdDev)
    }

    fn series_std(&self, series: &GridArray) -> Result<GridArray> {
        self.detrender
            .detrend(series, AxisKind::Time)?
            .reduce_along(AxisKind::Time, StatOperation::StdDev)
    }
}

/// Years left after spin-up; warns when the control run is short.
///
/// # Errors
///
/// Returns [`ClimVarError::InsufficientData`] when spin-up consumes the record.
pub fn usable_window(meta: &DatasetMeta) -> Result<YearWindow> {
    let start = meta.start_year + SPINUP_YEARS;
    if meta.end_year < start {
        return Err(ClimVarError::insufficient_data(
            meta.name.clone(),
            format!(
                "record {}-{} ends within the {SPINUP_YEARS}-year spin-up",
                meta.start_year, meta.end_year
            ),
        ));
    }

    let window = YearWindow::new(start, meta.end_year)?;
    if window.years() < MIN_CONTROL_YEARS {
        log::warn!(
            "Control run '{}' has only {} usable years (< {MIN_CONTROL_YEARS})",
            meta.name,
            window.years()
        );
    }
    Ok(window)
}
