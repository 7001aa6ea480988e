use rayon::prelude::*;

use crate::dispatch::Direction;
use crate::error::Result;
use crate::sparse::active_features;

use super::{AtomicF32, Element, Grid, Shape, MAX_BACKWARD_BLOCK};

/// Sparse-input linear backward pass with a fixed output-block width.
///
/// Accumulates into `weight_grad` and `bias_grad` without ever zeroing them, so
/// a fresh gradient needs zeroed buffers from the caller. Tiles of different
/// samples may hit the same feature row, so all writes go through atomic adds.
pub fn backward<T: Element>(
    indices: &[i64],
    values: &[f32],
    output_grad: &[T],
    weight_grad: &mut [f32],
    bias_grad: &mut [f32],
    shape: Shape,
    block_size: usize,
) -> Result<()> {
    shape.check_inputs(indices, values)?;
    shape.check_output("output_grad", output_grad.len())?;
    shape.check_weight(weight_grad.len())?;
    shape.check_bias("bias_grad", bias_grad.len())?;
    Direction::Backward.check_block_size(block_size)?;

    let grid = Grid::new(shape.batch_size, shape.output_size, block_size);
    let capacity = shape.max_active_indices;

    let weight_grad = AtomicF32::from_mut_slice(weight_grad);
    let bias_grad = AtomicF32::from_mut_slice(bias_grad);

    (0..grid.len()).into_par_iter().for_each(|tile| {
        let (sample, block) = grid.tile(tile);
        let slots = sample * capacity..(sample + 1) * capacity;
        let columns = grid.columns(block);
        let row = sample * grid.output_size;

        backward_tile(
            &indices[slots.clone()],
            &values[slots],
            &output_grad[row + columns.start..row + columns.end],
            weight_grad,
            bias_grad,
            columns.start,
            grid.output_size,
        );
    });

    Ok(())
}

#[inline(always)]
fn backward_tile<T: Element>(
    indices: &[i64],
    values: &[f32],
    output_grad: &[T],
    weight_grad: &[AtomicF32],
    bias_grad: &[AtomicF32],
    offset: usize,
    output_size: usize,
) {
    let width = output_grad.len();
    let mut grad = [0.0f32; MAX_BACKWARD_BLOCK];
    let grad = &mut grad[..width];

    for (g, &og) in grad.iter_mut().zip(output_grad) {
        *g = og.to_f32();
    }

    // Zero entries are skipped: adding zero never changes the target.
    for (cell, &g) in bias_grad[offset..offset + width].iter().zip(grad.iter()) {
        if g != 0.0 {
            cell.fetch_add(g);
        }
    }

    for (feature, value) in active_features(indices, values) {
        let row = feature * output_size + offset;
        for (cell, &g) in weight_grad[row..row + width].iter().zip(grad.iter()) {
            if g != 0.0 {
                cell.fetch_add(g * value);
            }
        }
    }
}
