pub mod cache;
pub mod tuner;

pub use cache::TuningCache;
pub use tuner::{Autotuner, TuneReport, TunerConfig};

use std::fmt;
use std::sync::Arc;

use crate::error::{KernelError, Result};
use crate::kernel::{self, Element, Shape, MAX_BACKWARD_BLOCK, MAX_FORWARD_BLOCK};

/// Output-block widths tried for the forward pass.
pub const FORWARD_BLOCK_SIZES: [usize; 7] = [32, 64, 128, 256, 512, 1024, 2048];

/// Output-block widths tried for the backward pass. Narrower than forward
/// since backward tiles spend their time in atomic adds.
pub const BACKWARD_BLOCK_SIZES: [usize; 8] = [8, 16, 32, 64, 128, 256, 512, 1024];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn candidates(self) -> &'static [usize] {
        match self {
            Direction::Forward => &FORWARD_BLOCK_SIZES,
            Direction::Backward => &BACKWARD_BLOCK_SIZES,
        }
    }

    pub fn max_block_size(self) -> usize {
        match self {
            Direction::Forward => MAX_FORWARD_BLOCK,
            Direction::Backward => MAX_BACKWARD_BLOCK,
        }
    }

    pub(crate) fn check_block_size(self, block_size: usize) -> Result<()> {
        if block_size == 0 || block_size > self.max_block_size() {
            return Err(KernelError::UnsupportedBlock {
                direction: self,
                block_size,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// The part of a problem shape the tuned block width depends on.
///
/// Storage precision is not part of the key: widths are always measured on
/// f32 buffers, and f16/bf16 calls of the same shape reuse that entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TuneKey {
    pub max_active_indices: usize,
    pub output_size: usize,
}

impl From<Shape> for TuneKey {
    fn from(shape: Shape) -> Self {
        Self {
            max_active_indices: shape.max_active_indices,
            output_size: shape.output_size,
        }
    }
}

impl fmt::Display for TuneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_active={} output={}",
            self.max_active_indices, self.output_size
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPolicy {
    #[default]
    Autotune,
    Fixed(usize),
}

/// Resolves the output-block width for a call and runs the matching kernel.
#[derive(Clone)]
pub struct Dispatcher {
    policy: BlockPolicy,
    tuner: Arc<Autotuner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(BlockPolicy::Autotune)
    }
}

impl Dispatcher {
    pub fn new(policy: BlockPolicy) -> Self {
        Self::with_tuner(policy, Autotuner::global())
    }

    pub fn with_tuner(policy: BlockPolicy, tuner: Arc<Autotuner>) -> Self {
        Self { policy, tuner }
    }

    pub fn fixed(block_size: usize) -> Self {
        Self::new(BlockPolicy::Fixed(block_size))
    }

    pub fn policy(&self) -> BlockPolicy {
        self.policy
    }

    pub fn tuner(&self) -> &Autotuner {
        &self.tuner
    }

    /// Runs the forward engine and returns the block width it used.
    pub fn forward<T: Element>(
        &self,
        indices: &[i64],
        values: &[f32],
        weight: &[T],
        bias: &[T],
        output: &mut [T],
        shape: Shape,
    ) -> Result<usize> {
        // All buffers are checked before the width is resolved.
        shape.check_inputs(indices, values)?;
        shape.check_weight(weight.len())?;
        shape.check_bias("bias", bias.len())?;
        shape.check_output("output", output.len())?;
        let block_size = self.block_size(Direction::Forward, shape)?;

        kernel::forward(indices, values, weight, bias, output, shape, block_size)?;
        Ok(block_size)
    }

    /// Runs the backward engine and returns the block width it used.
    pub fn backward<T: Element>(
        &self,
        indices: &[i64],
        values: &[f32],
        output_grad: &[T],
        weight_grad: &mut [f32],
        bias_grad: &mut [f32],
        shape: Shape,
    ) -> Result<usize> {
        shape.check_inputs(indices, values)?;
        shape.check_output("output_grad", output_grad.len())?;
        shape.check_weight(weight_grad.len())?;
        shape.check_bias("bias_grad", bias_grad.len())?;
        let block_size = self.block_size(Direction::Backward, shape)?;

        kernel::backward(
            indices,
            values,
            output_grad,
            weight_grad,
            bias_grad,
            shape,
            block_size,
        )?;
        Ok(block_size)
    }

    pub fn block_size(&self, direction: Direction, shape: Shape) -> Result<usize> {
        let block_size = match self.policy {
            BlockPolicy::Fixed(block_size) => {
                direction.check_block_size(block_size)?;
                block_size
            }
            BlockPolicy::Autotune => self.tuner.block_size(direction, TuneKey::from(shape))?,
        };

        log::trace!(
            "{} batch {} x {} -> {}: block {}",
            direction,
            shape.batch_size,
            shape.max_active_indices,
            shape.output_size,
            block_size
        );
        Ok(block_size)
    }
}

/// Forward pass through the process-wide autotuned dispatcher.
pub fn sparse_linear_forward<T: Element>(
    indices: &[i64],
    values: &[f32],
    weight: &[T],
    bias: &[T],
    output: &mut [T],
    shape: Shape,
) -> Result<()> {
    Dispatcher::default()
        .forward(indices, values, weight, bias, output, shape)
        .map(|_| ())
}

/// Backward pass through the process-wide autotuned dispatcher.
pub fn sparse_linear_backward<T: Element>(
    indices: &[i64],
    values: &[f32],
    output_grad: &[T],
    weight_grad: &mut [f32],
    bias_grad: &mut [f32],
    shape: Shape,
) -> Result<()> {
    Dispatcher::default()
        .backward(indices, values, output_grad, weight_grad, bias_grad, shape)
        .map(|_| ())
}
