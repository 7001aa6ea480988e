use std::error::Error;
use std::fmt;

use crate::dispatch::Direction;

pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors reported at the dispatch boundary.
///
/// The kernels themselves never fail; everything here is detected once per
/// call, before any tile runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    ShapeMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    EmptyOutput,
    WeightNotDivisible {
        len: usize,
        output_size: usize,
    },
    UnsupportedBlock {
        direction: Direction,
        block_size: usize,
    },
    SampleOverflow {
        active: usize,
        capacity: usize,
    },
    InvalidSlot {
        sample: usize,
        slot: usize,
        index: i64,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ShapeMismatch {
                buffer,
                expected,
                actual,
            } => write!(
                f,
                "{} has {} elements, expected {}",
                buffer, actual, expected
            ),
            KernelError::EmptyOutput => write!(f, "output_size must be greater than zero"),
            KernelError::WeightNotDivisible { len, output_size } => write!(
                f,
                "weight has {} elements, which is not a multiple of output_size {}",
                len, output_size
            ),
            KernelError::UnsupportedBlock {
                direction,
                block_size,
            } => write!(
                f,
                "block size {} is not usable for {} (max {})",
                block_size,
                direction,
                direction.max_block_size()
            ),
            KernelError::SampleOverflow { active, capacity } => write!(
                f,
                "sample has {} active features but capacity is {}",
                active, capacity
            ),
            KernelError::InvalidSlot {
                sample,
                slot,
                index,
            } => write!(
                f,
                "sample {} slot {} holds invalid feature index {}",
                sample, slot, index
            ),
        }
    }
}

impl Error for KernelError {}

impl From<KernelError> for candle_core::Error {
    fn from(err: KernelError) -> Self {
        candle_core::Error::Msg(err.to_string())
    }
}
