pub mod atomic;
pub mod backward;
pub mod element;
pub mod forward;
pub mod grid;

pub use atomic::AtomicF32;
pub use backward::backward;
pub use element::Element;
pub use forward::forward;
pub use grid::Grid;

use crate::error::{KernelError, Result};

/// Largest output-block width a forward tile can hold in its accumulator.
pub const MAX_FORWARD_BLOCK: usize = 2048;

/// Largest output-block width a backward tile can hold in its gradient buffer.
pub const MAX_BACKWARD_BLOCK: usize = 1024;

/// Per-call problem shape shared by the forward and backward engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub batch_size: usize,
    pub max_active_indices: usize,
    pub output_size: usize,
}

impl Shape {
    pub fn new(batch_size: usize, max_active_indices: usize, output_size: usize) -> Self {
        Self {
            batch_size,
            max_active_indices,
            output_size,
        }
    }

    pub fn input_len(&self) -> usize {
        self.batch_size * self.max_active_indices
    }

    pub fn output_len(&self) -> usize {
        self.batch_size * self.output_size
    }

    /// Checks the sparse inputs against the declared shape.
    pub(crate) fn check_inputs(&self, indices: &[i64], values: &[f32]) -> Result<()> {
        if self.output_size == 0 {
            return Err(KernelError::EmptyOutput);
        }
        check_len("input_indices", indices.len(), self.input_len())?;
        check_len("input_values", values.len(), self.input_len())
    }

    /// Checks a weight-shaped buffer and returns its implied feature count.
    pub(crate) fn check_weight(&self, len: usize) -> Result<usize> {
        if len % self.output_size != 0 {
            return Err(KernelError::WeightNotDivisible {
                len,
                output_size: self.output_size,
            });
        }
        Ok(len / self.output_size)
    }

    pub(crate) fn check_bias(&self, buffer: &'static str, len: usize) -> Result<()> {
        check_len(buffer, len, self.output_size)
    }

    pub(crate) fn check_output(&self, buffer: &'static str, len: usize) -> Result<()> {
        check_len(buffer, len, self.output_len())
    }
}

fn check_len(buffer: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(KernelError::ShapeMismatch {
            buffer,
            expected,
            actual,
        });
    }
    Ok(())
}
