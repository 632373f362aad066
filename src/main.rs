//! Parbatch CLI: run one parallel batch operation over a list of integers.

use anyhow::Result;
use clap::Parser;
use parbatch::engine::arg_parser::Cli;
use parbatch::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
