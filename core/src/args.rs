use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ftbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Benchmark and tune the sparse feature transformer kernels")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Worker threads for the kernel pool. Defaults to the number of CPUs.
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Write logs to a file instead of the terminal.
    #[arg(short, long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Time forward and backward passes on a random problem.
    Bench(BenchArgs),
    /// Time every candidate block width for one shape.
    Tune(TuneArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct BenchArgs {
    /// Samples per batch.
    #[arg(long, default_value_t = 4096)]
    pub batch_size: usize,

    /// Active feature slots per sample.
    #[arg(long, default_value_t = 32)]
    pub max_active: usize,

    /// Width of the transformer output.
    #[arg(long, default_value_t = 1024)]
    pub output_size: usize,

    /// Rows of the weight matrix.
    #[arg(long, default_value_t = 22528)]
    pub num_features: usize,

    /// Timed forward/backward rounds.
    #[arg(long, default_value_t = 20)]
    pub iterations: usize,

    /// Pin the forward block width instead of autotuning.
    #[arg(long)]
    pub forward_block: Option<usize>,

    /// Pin the backward block width instead of autotuning.
    #[arg(long)]
    pub backward_block: Option<usize>,

    #[arg(long, default_value_t = 1)]
    pub seed: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TuneArgs {
    #[arg(long, default_value_t = 32)]
    pub max_active: usize,

    #[arg(long, default_value_t = 1024)]
    pub output_size: usize,

    /// Samples in the synthetic tuning batch.
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Rows of the synthetic weight matrix.
    #[arg(long, default_value_t = 2048)]
    pub num_features: usize,

    /// Timed runs per candidate.
    #[arg(long, default_value_t = 5)]
    pub iterations: usize,
}
