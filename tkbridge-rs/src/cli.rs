//! Command-line arguments of the runner.
//!
//! Usage:
//!   tkbridge [OPTIONS] [SCRIPT]
//!
//! The script file (or `-c` text, evaluated after the file) runs once the
//! application is initialised; the event loop then runs until the root window
//! is destroyed, `--for` elapses or Ctrl-C is pressed.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::Backend;

/// Run a Tcl/Tk script through the bridge.
#[derive(Parser, Debug, Default)]
#[command(name = "tkbridge", version, about)]
pub struct CliArgs {
    /// Script file to evaluate.
    pub script: Option<PathBuf>,

    /// Script text to evaluate (after SCRIPT, if both are given).
    #[arg(short = 'c', long = "command", value_name = "SCRIPT")]
    pub command: Option<String>,

    /// Native backend; overrides the settings file.
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Settings file instead of the default one.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop the event loop after this many milliseconds.
    #[arg(long = "for", value_name = "MS")]
    pub run_for: Option<u64>,

    /// Exit after evaluating instead of running the event loop.
    #[arg(short = 'n', long)]
    pub no_loop: bool,

    /// Verbose logging.
    #[arg(short = 'd', long)]
    pub debug: bool,
}

impl CliArgs {
    pub fn run_for(&self) -> Option<Duration> {
        self.run_for.map(Duration::from_millis)
    }
}

/// Parse `std::env::args()`; exits with usage on error.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
