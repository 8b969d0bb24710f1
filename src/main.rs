//! Entry point for the climvar binary.
//! Handles CLI parsing, logging and thread pool setup, then dispatches the chosen diagnostic.

use clap::Parser;
use climvar::{
    run_iav, run_scalar_diagnostics, DiagnosticConfig, InMemoryReader, ParallelConfig,
    ParallelInfo,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
mod cli;

use cli::{Args, Diagnostic};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = DiagnosticConfig::from_path(&args.config)?;
    args.threads
        .or(config.threads)
        .map_or_else(ParallelConfig::all_cores, |n| ParallelConfig::new(Some(n)))
        .setup_global_pool()?;
    ParallelInfo::current().log();

    let reader = InMemoryReader::from_path(&args.input)?;
    log::info!("Loaded {} datasets from {}", reader.len(), args.input.display());

    let report = match args.diagnostic {
        Diagnostic::Iav => serde_json::to_value(run_iav(&reader, &config)?)?,
        Diagnostic::Scalar => serde_json::to_value(run_scalar_diagnostics(&reader, &config)?)?,
    };

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer.flush()?;
            log::info!("Saved result to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, &report)?;
            writeln!(handle)?;
        }
    }

    Ok(())
}
