use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::kernel::{self, Shape};
use crate::sparse::SENTINEL;

use super::{Direction, TuneKey, TuningCache};

#[derive(Debug, Clone)]
pub struct TunerConfig {
    /// Samples in the synthetic benchmark batch.
    pub batch_size: usize,
    /// Rows of the synthetic weight matrix.
    pub num_features: usize,
    /// Untimed runs per candidate.
    pub warmup: usize,
    /// Timed runs per candidate; the fastest one counts.
    pub iterations: usize,
    pub seed: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            num_features: 2048,
            warmup: 1,
            iterations: 3,
            seed: 0x5eed,
        }
    }
}

/// Timings of every candidate width for one direction and key.
#[derive(Debug, Clone)]
pub struct TuneReport {
    pub direction: Direction,
    pub key: TuneKey,
    pub timings: Vec<(usize, Duration)>,
    pub best: usize,
}

/// Picks output-block widths by timing every candidate once per shape key.
///
/// Measurements run on a seeded synthetic problem of the key's shape, never on
/// the caller's buffers, so tuning a backward call cannot leak extra gradient
/// into them.
pub struct Autotuner {
    config: TunerConfig,
    cache: TuningCache,
}

static GLOBAL: OnceLock<Arc<Autotuner>> = OnceLock::new();

impl Autotuner {
    pub fn new(config: TunerConfig) -> Self {
        Self {
            config,
            cache: TuningCache::new(),
        }
    }

    /// The process-wide tuner shared by every default dispatcher.
    pub fn global() -> Arc<Autotuner> {
        GLOBAL
            .get_or_init(|| Arc::new(Autotuner::new(TunerConfig::default())))
            .clone()
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn cache(&self) -> &TuningCache {
        &self.cache
    }

    /// Returns the cached width for the key, measuring the candidates first if
    /// the key has not been seen yet.
    pub fn block_size(&self, direction: Direction, key: TuneKey) -> Result<usize> {
        if let Some(block_size) = self.cache.get(direction, key) {
            return Ok(block_size);
        }

        let report = self.measure(direction, key)?;
        let block_size = self.cache.insert(direction, key, report.best);
        log::info!(
            "Tuned {} block size for {}: {}",
            direction,
            key,
            block_size
        );
        Ok(block_size)
    }

    /// Times every candidate width without touching the cache.
    pub fn measure(&self, direction: Direction, key: TuneKey) -> Result<TuneReport> {
        let mut problem = SyntheticProblem::generate(&self.config, key);
        let mut timings = Vec::with_capacity(direction.candidates().len());

        for &block_size in direction.candidates() {
            let elapsed = problem.time(direction, block_size, &self.config)?;
            log::trace!(
                "{} {} block {}: {:?}",
                direction,
                key,
                block_size,
                elapsed
            );
            timings.push((block_size, elapsed));
        }

        let best = timings
            .iter()
            .min_by_key(|(_, elapsed)| *elapsed)
            .map(|&(block_size, _)| block_size)
            .unwrap_or(direction.candidates()[0]);

        log::debug!("{} {}: fastest block {}", direction, key, best);

        Ok(TuneReport {
            direction,
            key,
            timings,
            best,
        })
    }
}

struct SyntheticProblem {
    shape: Shape,
    indices: Vec<i64>,
    values: Vec<f32>,
    weight: Vec<f32>,
    bias: Vec<f32>,
    output: Vec<f32>,
    weight_grad: Vec<f32>,
    bias_grad: Vec<f32>,
}

impl SyntheticProblem {
    fn generate(config: &TunerConfig, key: TuneKey) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let shape = Shape::new(
            config.batch_size,
            key.max_active_indices,
            key.output_size,
        );
        let num_features = config.num_features.max(1);

        let mut indices = vec![SENTINEL; shape.input_len()];
        let mut values = vec![0.0; shape.input_len()];

        // Each sample fills between half and all of its slots.
        let capacity = shape.max_active_indices;
        for sample in 0..shape.batch_size {
            let active = rng.gen_range(capacity / 2..=capacity);
            for slot in sample * capacity..sample * capacity + active {
                indices[slot] = rng.gen_range(0..num_features) as i64;
                values[slot] = 1.0;
            }
        }

        let weight = (0..num_features * shape.output_size)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        let bias = (0..shape.output_size)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        // Forward output doubles as the incoming gradient for backward timing.
        let output = (0..shape.output_len())
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();

        Self {
            shape,
            indices,
            values,
            weight,
            bias,
            output,
            weight_grad: vec![0.0; num_features * shape.output_size],
            bias_grad: vec![0.0; shape.output_size],
        }
    }

    fn time(
        &mut self,
        direction: Direction,
        block_size: usize,
        config: &TunerConfig,
    ) -> Result<Duration> {
        for _ in 0..config.warmup {
            self.run(direction, block_size)?;
        }

        let mut best = Duration::MAX;
        for _ in 0..config.iterations.max(1) {
            let start = Instant::now();
            self.run(direction, block_size)?;
            best = best.min(start.elapsed());
        }
        Ok(best)
    }

    fn run(&mut self, direction: Direction, block_size: usize) -> Result<()> {
        match direction {
            Direction::Forward => kernel::forward(
                &self.indices,
                &self.values,
                &self.weight,
                &self.bias,
                &mut self.output,
                self.shape,
                block_size,
            ),
            Direction::Backward => kernel::backward(
                &self.indices,
                &self.values,
                &self.output,
                &mut self.weight_grad,
                &mut self.bias_grad,
                self.shape,
                block_size,
            ),
        }
    }
}
