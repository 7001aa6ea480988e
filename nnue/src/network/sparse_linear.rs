use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::dispatch::Dispatcher;
use crate::sparse::SparseBatch;

use super::op::SparseLinearOp;

/// First layer of an NNUE: a linear map over sparse feature sets.
///
/// Weight layout is `[feature_idx][output_idx]`, so each active feature reads
/// one contiguous row.
pub struct SparseLinear {
    weight: Tensor,
    bias: Tensor,
    dispatcher: Dispatcher,
}

impl SparseLinear {
    pub fn new(num_features: usize, output_size: usize, vb: VarBuilder) -> Result<Self> {
        let bound = (1.0 / num_features.max(1) as f64).sqrt();
        let init = Init::Uniform {
            lo: -bound,
            up: bound,
        };

        let weight = vb.get_with_hints((num_features, output_size), "weight", init)?;
        let bias = vb.get_with_hints(output_size, "bias", init)?;

        Ok(Self::from_tensors(weight, bias))
    }

    pub fn from_tensors(weight: Tensor, bias: Tensor) -> Self {
        Self {
            weight,
            bias,
            dispatcher: Dispatcher::default(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    pub fn forward(&self, batch: &SparseBatch) -> Result<Tensor> {
        let values = Tensor::from_slice(
            batch.values(),
            (batch.batch_size(), batch.max_active_indices()),
            self.weight.device(),
        )?;
        self.apply(batch.indices().to_vec(), &values)
    }

    /// Forward pass over `(batch, max_active)` tensors of i64 indices and f32 values.
    pub fn forward_tensors(&self, indices: &Tensor, values: &Tensor) -> Result<Tensor> {
        if indices.dims() != values.dims() {
            candle_core::bail!(
                "sparse-linear: indices {:?} and values {:?} differ in shape",
                indices.dims(),
                values.dims()
            );
        }
        let indices = indices.flatten_all()?.to_vec1::<i64>()?;
        self.apply(indices, values)
    }

    /// Runs both perspectives of a position through the same weights.
    pub fn forward_pair(&self, us: &SparseBatch, them: &SparseBatch) -> Result<(Tensor, Tensor)> {
        Ok((self.forward(us)?, self.forward(them)?))
    }

    fn apply(&self, indices: Vec<i64>, values: &Tensor) -> Result<Tensor> {
        let op = SparseLinearOp::new(indices, self.dispatcher.clone());
        values.apply_op3(&self.weight, &self.bias, op)
    }
}
