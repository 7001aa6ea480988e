mod args;
mod bench;
mod tune;

use std::error::Error;
use std::fs::File;

use args::{Args, Command};
use clap::Parser;
use log::LevelFilter;
use simplelog::{Config, SimpleLogger, WriteLogger};

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    match &args.command {
        Command::Bench(bench_args) => bench::run(bench_args)?,
        Command::Tune(tune_args) => tune::run(tune_args)?,
    }

    Ok(())
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();

    let level: LevelFilter = args
        .log_level
        .parse()
        .map_err(|_| format!("Invalid log level '{}'", args.log_level))?;

    if let Some(log_file) = &args.log_file {
        WriteLogger::init(level, Config::default(), File::create(log_file)?)?;
    } else {
        SimpleLogger::init(level, Config::default())?;
    }

    let threads = args.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;
    log::info!("Using {} threads", threads);

    Ok(args)
}
