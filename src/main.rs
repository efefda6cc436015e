//! Sluice CLI: run a cancellable pipeline demo; Ctrl-C shuts every stage down.

use anyhow::Result;
use clap::Parser;
use sluice::engine::arg_parser::Cli;
use sluice::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
