//! Calendar-aligned reductions along the time axis
//!
//! [`TimeReducer`] slices a grid to a window of calendar years and averages it per
//! year, over the whole window, or per season. Bucket validity follows a
//! maximum-missing-fraction rule relative to the record's sampling density.

use super::operations::{masked_mean, MaskedReduction, StatOperation};
use super::parallel::map_lanes;
use crate::errors::{ClimVarError, Result};
use crate::grid::{AxisKind, GridArray, GridAxis};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Share of expected samples a bucket may lack before it is itself missing
pub const DEFAULT_MAX_MISSING_FRACTION: f64 = 0.5;

const STANDARD_SEASONS: [(&str, [u32; 3]); 4] = [
    ("DJF", [12, 1, 2]),
    ("MAM", [3, 4, 5]),
    ("JJA", [6, 7, 8]),
    ("SON", [9, 10, 11]),
];

/// Inclusive range of calendar years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearWindow {
    pub start: i32,
    pub end: i32,
}

impl YearWindow {
    /// # Errors
    ///
    /// Returns [`ClimVarError::InsufficientRange`] when `end < start`.
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if end < start {
            return Err(ClimVarError::InsufficientRange(format!(
                "end year {end} precedes start year {start}"
            )));
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }

    /// Number of calendar years covered
    #[must_use]
    pub const fn years(&self) -> i32 {
        self.end - self.start + 1
    }
}

/// A set of calendar months averaged together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Season {
    index: usize,
    label: String,
    months: Vec<u32>,
}

impl Season {
    /// DJF, MAM, JJA and SON with indices 0 to 3
    #[must_use]
    pub fn standard() -> Vec<Self> {
        STANDARD_SEASONS
            .iter()
            .enumerate()
            .map(|(index, (label, months))| Self {
                index,
                label: (*label).to_string(),
                months: months.to_vec(),
            })
            .collect()
    }

    /// Pick standard seasons by index.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Config`] for empty, repeated or out-of-range indices.
    pub fn from_indices(indices: &[usize]) -> Result<Vec<Self>> {
        if indices.is_empty() {
            return Err(ClimVarError::Config(
                "'seasons' must name at least one season".to_string(),
            ));
        }
        let standard = Self::standard();
        let mut picked: Vec<Self> = Vec::with_capacity(indices.len());
        for &index in indices {
            let season = standard.get(index).ok_or_else(|| {
                ClimVarError::Config(format!(
                    "season index {index} out of range (0-{})",
                    standard.len() - 1
                ))
            })?;
            if picked.iter().any(|s| s.index == index) {
                return Err(ClimVarError::Config(format!(
                    "season index {index} listed twice"
                )));
            }
            picked.push(season.clone());
        }
        Ok(picked)
    }

    /// Caller-defined season. Months are 1-12, listed in calendar order of the
    /// season; a decrease (e.g. `[11, 12, 1]`) marks a wrap into the next year.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Config`] for empty, repeated or invalid months.
    pub fn custom(index: usize, label: impl Into<String>, months: Vec<u32>) -> Result<Self> {
        let label = label.into();
        if months.is_empty() {
            return Err(ClimVarError::Config(format!("season '{label}' has no months")));
        }
        for (i, m) in months.iter().enumerate() {
            if !(1..=12).contains(m) || months[..i].contains(m) {
                return Err(ClimVarError::Config(format!(
                    "season '{label}' has invalid or repeated month {m}"
                )));
            }
        }
        Ok(Self {
            index,
            label,
            months,
        })
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn months(&self) -> &[u32] {
        &self.months
    }

    /// Season year a sample belongs to, `None` if its month is outside the season
    #[must_use]
    pub fn season_year(&self, date: NaiveDate) -> Option<i32> {
        let month = date.month();
        if !self.months.contains(&month) {
            return None;
        }
        let wraps = self.months.windows(2).any(|w| w[1] < w[0]);
        if wraps && month >= self.months[0] {
            Some(date.year() + 1)
        } else {
            Some(date.year())
        }
    }
}

/// Shape of the reduction result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodKind {
    /// One value per calendar year, time axis kept (dated 1 July)
    Yearly,
    /// Mean of the yearly values, as a size-1 season axis
    Annual,
    /// Mean of the yearly season values, one season-axis slice per season
    Seasonal(Vec<Season>),
}

/// Whether the window is only sliced or also averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOperation {
    Extract,
    #[default]
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceOptions {
    pub operation: TimeOperation,
    /// Clamp the requested window to the years present instead of failing
    pub normalize_bounds: bool,
    pub max_missing_fraction: f64,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            operation: TimeOperation::Average,
            normalize_bounds: false,
            max_missing_fraction: DEFAULT_MAX_MISSING_FRACTION,
        }
    }
}

/// Reduces grids along their time axis
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeReducer {
    options: ReduceOptions,
}

impl TimeReducer {
    #[must_use]
    pub const fn new(options: ReduceOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub const fn options(&self) -> &ReduceOptions {
        &self.options
    }

    /// Slice `grid` to `[start_year, end_year]` and reduce it per `kind`.
    ///
    /// With [`TimeOperation::Extract`] the sliced grid is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::InsufficientRange`] for inverted windows or windows
    /// without samples, and [`ClimVarError::Dimension`] without a dated time axis.
    pub fn reduce(
        &self,
        grid: &GridArray,
        start_year: i32,
        end_year: i32,
        kind: &PeriodKind,
    ) -> Result<GridArray> {
        let (sliced, window) = self.slice(grid, start_year, end_year)?;
        if self.options.operation == TimeOperation::Extract {
            return Ok(sliced);
        }

        let density = samples_per_year(grid.times()?);
        match kind {
            PeriodKind::Yearly => self.bucket_years(&sliced, window, None, density),
            PeriodKind::Annual => {
                let series = self.bucket_years(&sliced, window, None, density)?;
                let field = series.reduce_along(AxisKind::Time, StatOperation::Mean)?;
                GridArray::stack(&[field], GridAxis::new(AxisKind::Season, vec![0.0]))
            }
            PeriodKind::Seasonal(seasons) => {
                if seasons.is_empty() {
                    return Err(ClimVarError::Config(
                        "seasonal reduction needs at least one season".to_string(),
                    ));
                }
                let fields = seasons
                    .iter()
                    .map(|season| {
                        self.bucket_years(&sliced, window, Some(season), density)?
                            .reduce_along(AxisKind::Time, StatOperation::Mean)
                    })
                    .collect::<Result<Vec<_>>>()?;
                GridArray::stack(&fields, season_axis(seasons))
            }
        }
    }

    /// One mean per season year for a single season, time axis kept.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TimeReducer::reduce`].
    pub fn season_series(
        &self,
        grid: &GridArray,
        start_year: i32,
        end_year: i32,
        season: &Season,
    ) -> Result<GridArray> {
        let (sliced, window) = self.slice(grid, start_year, end_year)?;
        let density = samples_per_year(grid.times()?);
        self.bucket_years(&sliced, window, Some(season), density)
    }

    fn slice(&self, grid: &GridArray, start_year: i32, end_year: i32) -> Result<(GridArray, YearWindow)> {
        let mut window = YearWindow::new(start_year, end_year)?;
        if self.options.normalize_bounds {
            let (first, last) = grid.year_span()?;
            window = YearWindow::new(window.start.max(first), window.end.min(last))?;
        }

        let selected: Vec<usize> = grid
            .times()?
            .iter()
            .enumerate()
            .filter(|(_, d)| window.contains(d.year()))
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Err(ClimVarError::InsufficientRange(format!(
                "dataset '{}' has no samples in {}-{}",
                grid.dataset(),
                window.start,
                window.end
            )));
        }

        Ok((grid.select_along(AxisKind::Time, &selected)?, window))
    }

    /// Average samples per (season) year; years without any sample become missing entries.
    fn bucket_years(
        &self,
        sliced: &GridArray,
        window: YearWindow,
        season: Option<&Season>,
        density: usize,
    ) -> Result<GridArray> {
        let t = sliced.require_axis(AxisKind::Time)?;
        let mut buckets: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (i, date) in sliced.times()?.iter().enumerate() {
            let year = match season {
                Some(s) => s.season_year(*date),
                None => Some(date.year()),
            };
            if let Some(year) = year.filter(|y| window.contains(*y)) {
                buckets.entry(year).or_default().push(i);
            }
        }

        let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => {
                return Err(ClimVarError::InsufficientRange(format!(
                    "dataset '{}' has no samples for season {} in {}-{}",
                    sliced.dataset(),
                    season.map_or("annual", Season::label),
                    window.start,
                    window.end
                )))
            }
        };

        let years: Vec<i32> = (first..=last).collect();
        let groups: Vec<Vec<usize>> = years
            .iter()
            .map(|y| buckets.remove(y).unwrap_or_default())
            .collect();

        let expected = expected_samples(density, season);
        let min_valid = min_valid_count(expected, self.options.max_missing_fraction);
        log::debug!(
            "Averaging {} buckets, {min_valid} of {expected} samples required",
            groups.len()
        );

        let data = map_lanes(sliced.data(), t, groups.len(), sliced.fill_value(), |lane| {
            groups
                .iter()
                .map(|group| {
                    let values: Vec<Option<f64>> = group.iter().map(|&i| lane[i]).collect();
                    masked_mean(&values, min_valid)
                })
                .collect()
        })?;

        let dates = years
            .iter()
            .map(|&y| {
                NaiveDate::from_ymd_opt(y, 7, 1).ok_or_else(|| {
                    ClimVarError::InsufficientRange(format!("year {y} is not representable"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut axes = sliced.axes().to_vec();
        axes[t] = GridAxis::time(dates);
        sliced.derive(data, axes)
    }
}

/// Subtract each calendar month's multi-year mean from every sample of that month.
///
/// # Errors
///
/// Returns [`ClimVarError::Dimension`] without a dated time axis.
pub fn remove_seasonal_cycle(grid: &GridArray) -> Result<GridArray> {
    let t = grid.require_axis(AxisKind::Time)?;
    let months: Vec<usize> = grid.times()?.iter().map(|d| d.month0() as usize).collect();

    let data = map_lanes(grid.data(), t, months.len(), grid.fill_value(), |lane| {
        let mut sums = [0.0_f64; 12];
        let mut counts = [0_u32; 12];
        for (value, &m) in lane.iter().zip(&months) {
            if let Some(v) = value {
                sums[m] += v;
                counts[m] += 1;
            }
        }
        lane.iter()
            .zip(&months)
            .map(|(value, &m)| value.map(|v| v - sums[m] / f64::from(counts[m])))
            .collect()
    })?;

    grid.derive(data, grid.axes().to_vec())
}

/// Largest number of samples found in any calendar year of the record
fn samples_per_year(times: &[NaiveDate]) -> usize {
    let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();
    for date in times {
        *per_year.entry(date.year()).or_default() += 1;
    }
    per_year.values().copied().max().unwrap_or(1)
}

fn expected_samples(density: usize, season: Option<&Season>) -> usize {
    match season {
        None => density.max(1),
        Some(s) => (density * s.months().len()).div_ceil(12).max(1),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn min_valid_count(expected: usize, max_missing_fraction: f64) -> usize {
    let allowed_missing = (expected as f64 * max_missing_fraction.clamp(0.0, 1.0)).floor() as usize;
    expected.saturating_sub(allowed_missing).max(1)
}

/// Season coordinate of stacked season slices: the season indices when several
/// are kept, a lone `0` for a single season.
#[must_use]
pub fn season_axis(seasons: &[Season]) -> GridAxis {
    #[allow(clippy::cast_precision_loss)]
    let coords = match seasons {
        [_] => vec![0.0],
        _ => seasons.iter().map(|s| s.index() as f64).collect(),
    };
    GridAxis::new(AxisKind::Season, coords)
}
