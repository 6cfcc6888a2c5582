//! sbac - snapshot-based version control
//!
//! This is the main entry point for the sbac command-line interface.

use std::process::ExitCode;

use clap::Parser;

use sbac::cli::{self, Cli};

fn main() -> ExitCode {
    cli::run(Cli::parse())
}
