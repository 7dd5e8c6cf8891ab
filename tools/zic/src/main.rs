//! Compiles zoneinfo source files.
//!
//! ```text
//! zic [-d OUTPUT_DIR] [--tzdata TZDATA_DIR] SOURCE...
//! ```
//!
//! Log verbosity is set with `RUST_LOG`.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use zoneinfo_compiler::{CompilationSession, ZoneInfoError};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Compiles zoneinfo source files into time zone data.",
    long_about = None
)]
struct Cli {
    /// Directory to write compiled zones and the zone index to. It must
    /// already exist.
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,

    /// A tzdata directory whose well known source files are parsed before
    /// any SOURCE.
    #[arg(long)]
    tzdata: Option<PathBuf>,

    /// Zoneinfo source files, parsed in order.
    #[arg(required_unless_present = "tzdata")]
    sources: Vec<PathBuf>,
}

fn run(cli: &Cli) -> Result<(), ZoneInfoError> {
    let mut session = match &cli.tzdata {
        Some(dir) => CompilationSession::from_zoneinfo_directory(dir)?,
        None => CompilationSession::default(),
    };
    for source in &cli.sources {
        log::debug!("Parsing {}", source.display());
        session.parse_file(source)?;
    }

    let compilation = match &cli.output_dir {
        Some(dir) => session.compile_to_directory(dir)?,
        None => session.compile(),
    };
    log::info!(
        "Compiled {} zones with {} ids, {} diagnostics",
        compilation.zones().len(),
        compilation.ids().len(),
        compilation.diagnostics().len()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
