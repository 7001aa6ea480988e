use std::error::Error;

use nnue::dispatch::{Autotuner, Direction, TuneKey, TuneReport, TunerConfig};

use crate::args::TuneArgs;

pub fn run(args: &TuneArgs) -> Result<(), Box<dyn Error>> {
    let tuner = Autotuner::new(TunerConfig {
        batch_size: args.batch_size,
        num_features: args.num_features,
        iterations: args.iterations,
        ..Default::default()
    });
    let key = TuneKey {
        max_active_indices: args.max_active,
        output_size: args.output_size,
    };

    println!("Tuning {} (synthetic batch {})\n", key, args.batch_size);

    for direction in [Direction::Forward, Direction::Backward] {
        let report = tuner.measure(direction, key)?;
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &TuneReport) {
    println!("=== {} ===", report.direction);
    for &(block_size, elapsed) in &report.timings {
        let marker = if block_size == report.best { " *" } else { "" };
        println!("  block {:>5}: {:>12?}{}", block_size, elapsed, marker);
    }
    println!();
}
