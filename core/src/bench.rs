use std::error::Error;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nnue::dispatch::{BlockPolicy, Dispatcher};
use nnue::{Shape, SENTINEL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::args::BenchArgs;

pub fn run(args: &BenchArgs) -> Result<(), Box<dyn Error>> {
    let benchmark = Benchmark::new(args);
    benchmark.run()
}

struct Benchmark {
    args: BenchArgs,
    shape: Shape,
    forward: Dispatcher,
    backward: Dispatcher,
}

impl Benchmark {
    fn new(args: &BenchArgs) -> Self {
        let policy = |block: Option<usize>| block.map_or(BlockPolicy::Autotune, BlockPolicy::Fixed);

        Self {
            args: args.clone(),
            shape: Shape::new(args.batch_size, args.max_active, args.output_size),
            forward: Dispatcher::new(policy(args.forward_block)),
            backward: Dispatcher::new(policy(args.backward_block)),
        }
    }

    fn run(self) -> Result<(), Box<dyn Error>> {
        self.print_header();

        log::info!("Generating random problem");
        let mut buffers = Buffers::random(self.shape, self.args.num_features, self.args.seed);

        // The first call per direction pays for tuning; keep it out of the timings.
        let forward_block = buffers.forward(&self.forward)?;
        let backward_block = buffers.backward(&self.backward)?;

        let progress = create_progress_bar(self.args.iterations)?;
        let mut result = BenchResult {
            forward_block,
            backward_block,
            ..Default::default()
        };

        for _ in 0..self.args.iterations {
            let start = Instant::now();
            buffers.forward(&self.forward)?;
            result.forward += start.elapsed();

            buffers.zero_grads();
            let start = Instant::now();
            buffers.backward(&self.backward)?;
            result.backward += start.elapsed();

            progress.inc(1);
        }
        progress.finish_and_clear();

        self.print_summary(&result);
        Ok(())
    }

    fn print_header(&self) {
        println!(
            "Running benchmark: batch {} x {} slots -> {} outputs ({} features), {} iterations\n",
            self.shape.batch_size,
            self.shape.max_active_indices,
            self.shape.output_size,
            self.args.num_features,
            self.args.iterations
        );
    }

    fn print_summary(&self, result: &BenchResult) {
        let iterations = self.args.iterations.max(1) as u32;
        let forward = result.forward / iterations;
        let backward = result.backward / iterations;

        println!("=== Benchmark Summary ===");
        println!("Forward:  {:?} / batch (block {})", forward, result.forward_block);
        println!("Backward: {:?} / batch (block {})", backward, result.backward_block);
        println!(
            "Throughput: {:.0} samples/s",
            self.shape.batch_size as f64 / (forward + backward).as_secs_f64().max(f64::EPSILON)
        );
    }
}

#[derive(Default)]
struct BenchResult {
    forward: Duration,
    backward: Duration,
    forward_block: usize,
    backward_block: usize,
}

struct Buffers {
    shape: Shape,
    indices: Vec<i64>,
    values: Vec<f32>,
    weight: Vec<f32>,
    bias: Vec<f32>,
    output: Vec<f32>,
    weight_grad: Vec<f32>,
    bias_grad: Vec<f32>,
}

impl Buffers {
    fn random(shape: Shape, num_features: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let capacity = shape.max_active_indices;
        let num_features = num_features.max(1);

        let mut indices = vec![SENTINEL; shape.input_len()];
        let mut values = vec![0.0; shape.input_len()];
        for sample in 0..shape.batch_size {
            let active = rng.gen_range(capacity / 2..=capacity);
            for slot in sample * capacity..sample * capacity + active {
                indices[slot] = rng.gen_range(0..num_features) as i64;
                values[slot] = 1.0;
            }
        }

        Self {
            shape,
            indices,
            values,
            weight: (0..num_features * shape.output_size)
                .map(|_| rng.gen_range(-0.1..0.1))
                .collect(),
            bias: vec![0.0; shape.output_size],
            output: vec![0.0; shape.output_len()],
            weight_grad: vec![0.0; num_features * shape.output_size],
            bias_grad: vec![0.0; shape.output_size],
        }
    }

    fn forward(&mut self, dispatcher: &Dispatcher) -> nnue::Result<usize> {
        dispatcher.forward(
            &self.indices,
            &self.values,
            &self.weight,
            &self.bias,
            &mut self.output,
            self.shape,
        )
    }

    // Feeds the forward output back in as the incoming gradient.
    fn backward(&mut self, dispatcher: &Dispatcher) -> nnue::Result<usize> {
        dispatcher.backward(
            &self.indices,
            &self.values,
            &self.output,
            &mut self.weight_grad,
            &mut self.bias_grad,
            self.shape,
        )
    }

    fn zero_grads(&mut self) {
        self.weight_grad.fill(0.0);
        self.bias_grad.fill(0.0);
    }
}

fn create_progress_bar(iterations: usize) -> Result<ProgressBar, Box<dyn Error>> {
    let bar = ProgressBar::new(iterations as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(" {spinner:.cyan} {pos}/{len} [{wide_bar:.cyan/blue}] {eta_precise}")?,
    );
    Ok(bar)
}
