use candle_core::backend::BackendStorage;
use candle_core::{CpuStorage, CustomOp3, DType, Layout, Result, Tensor, WithDType};
use half::{bf16, f16};

use crate::dispatch::Dispatcher;
use crate::kernel::{Element, Shape};

/// Sparse-input linear layer as a candle op over `(values, weight, bias)`.
///
/// The feature indices are captured by the op since they never receive a
/// gradient. Only CPU storage is implemented.
pub struct SparseLinearOp {
    indices: Vec<i64>,
    dispatcher: Dispatcher,
}

impl SparseLinearOp {
    pub fn new(indices: Vec<i64>, dispatcher: Dispatcher) -> Self {
        Self {
            indices,
            dispatcher,
        }
    }

    fn run_forward<T: Element + WithDType>(
        &self,
        values: &[f32],
        weight: (&CpuStorage, &Layout),
        bias: (&CpuStorage, &Layout),
        shape: Shape,
    ) -> Result<Vec<T>> {
        let weight = contiguous::<T>(weight.0, weight.1)?;
        let bias = contiguous::<T>(bias.0, bias.1)?;

        let mut output = vec![T::from_f32(0.0); shape.output_len()];
        self.dispatcher
            .forward(&self.indices, values, weight, bias, &mut output, shape)?;
        Ok(output)
    }
}

impl CustomOp3 for SparseLinearOp {
    fn name(&self) -> &'static str {
        "sparse-linear"
    }

    fn cpu_fwd(
        &self,
        values: &CpuStorage,
        values_layout: &Layout,
        weight: &CpuStorage,
        weight_layout: &Layout,
        bias: &CpuStorage,
        bias_layout: &Layout,
    ) -> Result<(CpuStorage, candle_core::Shape)> {
        let (batch_size, max_active_indices) = values_layout.shape().dims2()?;
        let (_, output_size) = weight_layout.shape().dims2()?;
        let shape = Shape::new(batch_size, max_active_indices, output_size);

        let values = contiguous::<f32>(values, values_layout)?;
        let weight = (weight, weight_layout);
        let bias = (bias, bias_layout);

        let output = match (weight.0, bias.0) {
            (CpuStorage::F32(_), CpuStorage::F32(_)) => {
                CpuStorage::F32(self.run_forward::<f32>(values, weight, bias, shape)?)
            }
            (CpuStorage::F16(_), CpuStorage::F16(_)) => {
                CpuStorage::F16(self.run_forward::<f16>(values, weight, bias, shape)?)
            }
            (CpuStorage::BF16(_), CpuStorage::BF16(_)) => {
                CpuStorage::BF16(self.run_forward::<bf16>(values, weight, bias, shape)?)
            }
            (w, b) => candle_core::bail!(
                "sparse-linear: unsupported weight/bias dtypes {:?}/{:?}",
                w.dtype(),
                b.dtype()
            ),
        };

        Ok((output, (batch_size, output_size).into()))
    }

    fn bwd(
        &self,
        values: &Tensor,
        weight: &Tensor,
        bias: &Tensor,
        _output: &Tensor,
        output_grad: &Tensor,
    ) -> Result<(Option<Tensor>, Option<Tensor>, Option<Tensor>)> {
        let (batch_size, max_active_indices) = values.dims2()?;
        let (num_features, output_size) = weight.dims2()?;
        let shape = Shape::new(batch_size, max_active_indices, output_size);

        let values = values.flatten_all()?.to_vec1::<f32>()?;
        let output_grad = output_grad
            .to_dtype(DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()?;

        let mut weight_grad = vec![0.0f32; num_features * output_size];
        let mut bias_grad = vec![0.0f32; output_size];
        self.dispatcher.backward(
            &self.indices,
            &values,
            &output_grad,
            &mut weight_grad,
            &mut bias_grad,
            shape,
        )?;

        let weight_grad =
            Tensor::from_vec(weight_grad, (num_features, output_size), weight.device())?
                .to_dtype(weight.dtype())?;
        let bias_grad =
            Tensor::from_vec(bias_grad, output_size, bias.device())?.to_dtype(bias.dtype())?;

        Ok((None, Some(weight_grad), Some(bias_grad)))
    }
}

fn contiguous<'a, T: WithDType>(storage: &'a CpuStorage, layout: &Layout) -> Result<&'a [T]> {
    let data = storage.as_slice::<T>()?;
    match layout.contiguous_offsets() {
        Some((start, end)) => Ok(&data[start..end]),
        None => candle_core::bail!("sparse-linear: inputs must be contiguous"),
    }
}
