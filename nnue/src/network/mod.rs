pub mod op;
pub mod sparse_linear;

pub use op::SparseLinearOp;
pub use sparse_linear::SparseLinear;
