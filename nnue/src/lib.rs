pub mod dispatch;
pub mod error;
pub mod kernel;
pub mod network;
pub mod sparse;

#[cfg(test)]
mod tests;

pub use dispatch::{sparse_linear_backward, sparse_linear_forward, BlockPolicy, Dispatcher};
pub use error::{KernelError, Result};
pub use kernel::Shape;
pub use network::SparseLinear;
pub use sparse::{SparseBatch, SENTINEL};
