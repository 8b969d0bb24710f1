//! Data source abstraction feeding the statistics engine
//!
//! The engine never opens files itself. A [`DataReader`] lists the datasets of a
//! diagnostic together with their metadata and hands out one [`GridArray`] at a
//! time; grids are expected on a common grid already (regridding happens upstream).

use crate::errors::{ClimVarError, Result};
use crate::grid::{AxisKind, GridArray};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Dataset-level metadata supplied by the reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub name: String,
    pub start_year: i32,
    pub end_year: i32,
    /// Grid coordinate names as found in the source (e.g. "rlat", "plev")
    #[serde(default)]
    pub coordinate_names: Vec<String>,
}

impl DatasetMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, start_year: i32, end_year: i32) -> Self {
        Self {
            name: name.into(),
            start_year,
            end_year,
            coordinate_names: Vec::new(),
        }
    }

    /// Check that every declared coordinate resolves to an axis present on `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`ClimVarError::Dimension`] for unknown names or absent axes.
    pub fn check_coordinates(&self, grid: &GridArray) -> Result<()> {
        for name in &self.coordinate_names {
            let kind = AxisKind::resolve(name).ok_or_else(|| {
                ClimVarError::dimension(self.name.clone(), format!("unrecognised coordinate '{name}'"))
            })?;
            if grid.axis_index(kind).is_none() {
                return Err(ClimVarError::dimension(
                    self.name.clone(),
                    format!("coordinate '{name}' is declared but the grid has no '{kind}' axis"),
                ));
            }
        }
        Ok(())
    }
}

/// Basic data source interface for reading datasets
pub trait DataReader {
    /// List all datasets available to the diagnostic
    ///
    /// # Errors
    ///
    /// Returns an error if the listing itself cannot be produced.
    fn list_datasets(&self) -> Result<Vec<DatasetMeta>>;

    /// Read the variable of one dataset as a labeled grid
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is unknown or cannot be read.
    fn read_dataset(&self, meta: &DatasetMeta) -> Result<GridArray>;
}

/// One dataset of a bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub meta: DatasetMeta,
    pub grid: GridArray,
}

/// Reader over datasets already held in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryReader {
    datasets: Vec<DatasetEntry>,
}

impl InMemoryReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dataset; its grid is tagged with the dataset name.
    pub fn push(&mut self, meta: DatasetMeta, grid: GridArray) {
        let grid = grid.with_dataset(meta.name.clone());
        self.datasets.push(DatasetEntry { meta, grid });
    }

    #[must_use]
    pub fn with_dataset(mut self, meta: DatasetMeta, grid: GridArray) -> Self {
        self.push(meta, grid);
        self
    }

    /// Load a JSON bundle of datasets.
    ///
    /// # Errors
    ///
    /// Returns JSON errors for malformed bundles and dimension errors for grids
    /// with unrecognised axes.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let bundle: Self = serde_json::from_reader(reader)?;
        let mut loaded = Self::new();
        for entry in bundle.datasets {
            loaded.push(entry.meta, entry.grid);
        }
        Ok(loaded)
    }

    /// Load a JSON bundle from disk.
    ///
    /// # Errors
    ///
    /// Returns I/O errors in addition to those of [`InMemoryReader::from_json_reader`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_json_reader(BufReader::new(file))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DataReader for InMemoryReader {
    fn list_datasets(&self) -> Result<Vec<DatasetMeta>> {
        Ok(self.datasets.iter().map(|entry| entry.meta.clone()).collect())
    }

    fn read_dataset(&self, meta: &DatasetMeta) -> Result<GridArray> {
        self.datasets
            .iter()
            .find(|entry| entry.meta.name == meta.name)
            .map(|entry| entry.grid.clone())
            .ok_or_else(|| ClimVarError::dimension(meta.name.clone(), "dataset not found in reader"))
    }
}
