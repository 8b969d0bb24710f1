//! Defines command-line interface options using `clap` for the climvar binary.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Interannual variability and model variability diagnostics for gridded climate data
#[derive(Parser, Debug)]
#[command(name = "climvar", version, about)]
pub struct Args {
    /// Diagnostic configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Dataset bundle (JSON) holding the gridded input of every dataset
    #[arg(short, long)]
    pub input: PathBuf,

    /// Which diagnostic to run
    #[arg(short, long, value_enum, default_value_t = Diagnostic::Iav)]
    pub diagnostic: Diagnostic,

    /// Path to save the result as JSON. If not set, prints to stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of threads to use for parallel processing. Overrides the configuration;
    /// every available core is used when neither sets it.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Diagnostic {
    /// Multi-model mean of interannual variability
    Iav,
    /// Area mean, trend and model variability index per dataset
    Scalar,
}
