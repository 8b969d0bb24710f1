//! Labeled N-dimensional grids with a missing-value sentinel
//!
//! A [`GridArray`] couples an `ndarray` buffer with one [`GridAxis`] per dimension.
//! Axis names coming from readers ("rlat", "plev", "i", ...) are resolved into
//! canonical [`AxisKind`]s when the grid is built, so the statistics code never
//! has to look at raw dimension names.

use crate::errors::{ClimVarError, Result};
use chrono::{Datelike, NaiveDate};
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fill constant used when a reader does not supply one
pub const DEFAULT_FILL_VALUE: f64 = 1.0e20;

/// Tolerance used when comparing numeric coordinates of two grids
const COORD_TOLERANCE: f64 = 1.0e-6;

/// Canonical axis identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Time,
    Level,
    Lat,
    Lon,
    Dataset,
    Season,
    Statistic,
    Period,
}

/// Accepted spellings for each canonical axis
const AXIS_ALIASES: &[(&str, AxisKind)] = &[
    ("time", AxisKind::Time),
    ("lev", AxisKind::Level),
    ("plev", AxisKind::Level),
    ("level", AxisKind::Level),
    ("lat", AxisKind::Lat),
    ("rlat", AxisKind::Lat),
    ("j", AxisKind::Lat),
    ("latitude", AxisKind::Lat),
    ("lon", AxisKind::Lon),
    ("rlon", AxisKind::Lon),
    ("i", AxisKind::Lon),
    ("longitude", AxisKind::Lon),
    ("dataset", AxisKind::Dataset),
    ("season", AxisKind::Season),
    ("statistic", AxisKind::Statistic),
    ("period", AxisKind::Period),
];

impl AxisKind {
    /// Resolve a dimension name as written by a reader into its canonical kind.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        AXIS_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|&(_, kind)| kind)
    }

    /// Get the canonical name of the axis
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Level => "lev",
            Self::Lat => "lat",
            Self::Lon => "lon",
            Self::Dataset => "dataset",
            Self::Season => "season",
            Self::Statistic => "statistic",
            Self::Period => "period",
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinate values attached to one axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordinates {
    Values(Vec<f64>),
    Dates(Vec<NaiveDate>),
}

impl Coordinates {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Values(v) => v.len(),
            Self::Dates(d) => d.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Self::Values(v) => Some(v),
            Self::Dates(_) => None,
        }
    }

    #[must_use]
    pub fn dates(&self) -> Option<&[NaiveDate]> {
        match self {
            Self::Dates(d) => Some(d),
            Self::Values(_) => None,
        }
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            Self::Values(v) => Self::Values(indices.iter().map(|&i| v[i]).collect()),
            Self::Dates(d) => Self::Dates(indices.iter().map(|&i| d[i]).collect()),
        }
    }

    fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Values(a), Self::Values(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| (x - y).abs() <= COORD_TOLERANCE)
            }
            (Self::Dates(a), Self::Dates(b)) => a == b,
            _ => false,
        }
    }
}

/// One labeled axis of a grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxis {
    pub kind: AxisKind,
    pub coords: Coordinates,
}

impl GridAxis {
    #[must_use]
    pub const fn new(kind: AxisKind, values: Vec<f64>) -> Self {
        Self {
            kind,
            coords: Coordinates::Values(values),
        }
    }

    #[must_use]
    pub const fn time(dates: Vec<NaiveDate>) -> Self {
        Self {
            kind: AxisKind::Time,
            coords: Coordinates::Dates(dates),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Variable attributes carried through to the output sink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarAttributes {
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub comment: String,
}

/// Labeled N-dimensional array of `f64` samples
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawGridArray", into = "RawGridArray")]
pub struct GridArray {
    data: ArrayD<f64>,
    axes: Vec<GridAxis>,
    fill_value: f64,
    attributes: VarAttributes,
    dataset: String,
}

impl GridArray {
    /// Build a grid, checking that axes are unique and match the array extents.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] if the axis list does not describe `data`.
    pub fn new(data: ArrayD<f64>, axes: Vec<GridAxis>, fill_value: f64) -> Result<Self> {
        if axes.len() != data.ndim() {
            return Err(ClimVarError::dimension(
                "",
                format!(
                    "{} axes given for an array with {} dimensions",
                    axes.len(),
                    data.ndim()
                ),
            ));
        }

        for (i, axis) in axes.iter().enumerate() {
            if axes[..i].iter().any(|other| other.kind == axis.kind) {
                return Err(ClimVarError::dimension(
                    "",
                    format!("axis '{}' appears more than once", axis.kind),
                ));
            }
            if axis.len() != data.shape()[i] {
                return Err(ClimVarError::dimension(
                    "",
                    format!(
                        "axis '{}' has {} coordinates but extent {}",
                        axis.kind,
                        axis.len(),
                        data.shape()[i]
                    ),
                ));
            }
        }

        Ok(Self {
            data,
            axes,
            fill_value,
            attributes: VarAttributes::default(),
            dataset: String::new(),
        })
    }

    /// Build a grid from reader-supplied dimension names, resolving alternate spellings.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] for unrecognised names or inconsistent extents.
    pub fn from_named(
        data: ArrayD<f64>,
        named_axes: Vec<(String, Coordinates)>,
        fill_value: f64,
    ) -> Result<Self> {
        let axes = named_axes
            .into_iter()
            .map(|(name, coords)| {
                AxisKind::resolve(&name)
                    .map(|kind| GridAxis { kind, coords })
                    .ok_or_else(|| {
                        ClimVarError::dimension("", format!("unrecognised axis name '{name}'"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(data, axes, fill_value)
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: VarAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub const fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    #[must_use]
    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    #[must_use]
    pub const fn fill_value(&self) -> f64 {
        self.fill_value
    }

    #[must_use]
    pub const fn attributes(&self) -> &VarAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut VarAttributes {
        &mut self.attributes
    }

    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Whether a raw sample is the fill constant (or NaN)
    #[must_use]
    pub fn is_missing(&self, value: f64) -> bool {
        is_missing(value, self.fill_value)
    }

    /// Lift a raw sample into the masked representation
    #[must_use]
    pub fn masked(&self, value: f64) -> Option<f64> {
        masked(value, self.fill_value)
    }

    #[must_use]
    pub fn axis_index(&self, kind: AxisKind) -> Option<usize> {
        self.axes.iter().position(|a| a.kind == kind)
    }

    #[must_use]
    pub fn axis(&self, kind: AxisKind) -> Option<&GridAxis> {
        self.axes.iter().find(|a| a.kind == kind)
    }

    /// Position of a mandatory axis.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] when the grid lacks the axis.
    pub fn require_axis(&self, kind: AxisKind) -> Result<usize> {
        self.axis_index(kind).ok_or_else(|| {
            ClimVarError::dimension(
                self.dataset.clone(),
                format!("required axis '{kind}' not found"),
            )
        })
    }

    /// Numeric coordinates of a mandatory axis
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] when the axis is absent or carries dates.
    pub fn coordinate_values(&self, kind: AxisKind) -> Result<&[f64]> {
        let index = self.require_axis(kind)?;
        self.axes[index].coords.values().ok_or_else(|| {
            ClimVarError::dimension(
                self.dataset.clone(),
                format!("axis '{kind}' does not carry numeric coordinates"),
            )
        })
    }

    /// Calendar dates of the time axis
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] when there is no dated time axis.
    pub fn times(&self) -> Result<&[NaiveDate]> {
        let index = self.require_axis(AxisKind::Time)?;
        self.axes[index].coords.dates().ok_or_else(|| {
            ClimVarError::dimension(
                self.dataset.clone(),
                "time axis does not carry calendar dates",
            )
        })
    }

    /// First and last calendar year present on the time axis
    ///
    /// # Errors
    ///
    /// Returns an error when the time axis is missing or empty.
    pub fn year_span(&self) -> Result<(i32, i32)> {
        let times = self.times()?;
        match (
            times.iter().map(|d| d.year()).min(),
            times.iter().map(|d| d.year()).max(),
        ) {
            (Some(first), Some(last)) => Ok((first, last)),
            _ => Err(ClimVarError::InsufficientRange(format!(
                "dataset '{}' has an empty time axis",
                self.dataset
            ))),
        }
    }

    /// Keep only the given positions along one axis.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] when the axis is missing.
    pub fn select_along(&self, kind: AxisKind, indices: &[usize]) -> Result<Self> {
        let index = self.require_axis(kind)?;
        let data = self.data.select(Axis(index), indices);
        let mut axes = self.axes.clone();
        axes[index].coords = axes[index].coords.select(indices);
        self.derive(data, axes)
    }

    /// Build a new grid from this one's metadata and a replacement buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] if `axes` do not describe `data`.
    pub fn derive(&self, data: ArrayD<f64>, axes: Vec<GridAxis>) -> Result<Self> {
        let mut grid = Self::new(data, axes, self.fill_value).map_err(|e| self.tag(e))?;
        grid.attributes = self.attributes.clone();
        grid.dataset = self.dataset.clone();
        Ok(grid)
    }

    /// Stack equally shaped grids along a new leading axis.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] when the grids differ in layout.
    pub fn stack(fields: &[Self], axis: GridAxis) -> Result<Self> {
        let first = fields.first().ok_or_else(|| {
            ClimVarError::Statistics("cannot stack an empty list of grids".to_string())
        })?;
        if let Some(other) = fields.iter().find(|f| !first.same_grid(f)) {
            return Err(ClimVarError::dimension(
                other.dataset.clone(),
                format!("cannot stack along '{}': grids differ", axis.kind),
            ));
        }

        let views: Vec<_> = fields.iter().map(|f| f.data.view()).collect();
        let data = ndarray::stack(Axis(0), &views)?;
        let mut axes = Vec::with_capacity(first.axes.len() + 1);
        axes.push(axis);
        axes.extend(first.axes.iter().cloned());
        first.derive(data, axes)
    }

    /// Whether two grids share axis layout and coordinates
    #[must_use]
    pub fn same_grid(&self, other: &Self) -> bool {
        self.axes.len() == other.axes.len()
            && self
                .axes
                .iter()
                .zip(&other.axes)
                .all(|(a, b)| a.kind == b.kind && a.coords.matches(&b.coords))
    }

    /// Number of non-missing samples
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_missing(v)).count()
    }

    /// Attach this grid's dataset name to a dimension error raised without one
    fn tag(&self, error: ClimVarError) -> ClimVarError {
        match error {
            ClimVarError::Dimension { dataset, message } if dataset.is_empty() => {
                ClimVarError::dimension(self.dataset.clone(), message)
            }
            other => other,
        }
    }
}

/// Whether `value` is the fill constant or NaN
#[must_use]
pub fn is_missing(value: f64, fill_value: f64) -> bool {
    value.is_nan() || value == fill_value
}

/// `None` for missing samples, `Some(value)` otherwise
#[must_use]
pub fn masked(value: f64, fill_value: f64) -> Option<f64> {
    if is_missing(value, fill_value) {
        None
    } else {
        Some(value)
    }
}

fn default_fill_value() -> f64 {
    DEFAULT_FILL_VALUE
}

/// Serialized form of a grid axis; names are resolved on load
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAxis {
    name: String,
    coords: Coordinates,
}

/// Serialized form of a grid
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawGridArray {
    data: ArrayD<f64>,
    axes: Vec<RawAxis>,
    #[serde(default = "default_fill_value")]
    fill_value: f64,
    #[serde(default)]
    attributes: VarAttributes,
    #[serde(default)]
    dataset: String,
}

impl TryFrom<RawGridArray> for GridArray {
    type Error = ClimVarError;

    fn try_from(raw: RawGridArray) -> Result<Self> {
        let named = raw.axes.into_iter().map(|a| (a.name, a.coords)).collect();
        let grid = Self::from_named(raw.data, named, raw.fill_value)?
            .with_attributes(raw.attributes)
            .with_dataset(raw.dataset);
        Ok(grid)
    }
}

impl From<GridArray> for RawGridArray {
    fn from(grid: GridArray) -> Self {
        Self {
            data: grid.data,
            axes: grid
                .axes
                .into_iter()
                .map(|a| RawAxis {
                    name: a.kind.as_str().to_string(),
                    coords: a.coords,
                })
                .collect(),
            fill_value: grid.fill_value,
            attributes: grid.attributes,
            dataset: grid.dataset,
        }
    }
}
