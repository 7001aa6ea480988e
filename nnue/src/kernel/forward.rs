use rayon::prelude::*;

use crate::dispatch::Direction;
use crate::error::Result;
use crate::sparse::active_features;

use super::{Element, Grid, Shape, MAX_FORWARD_BLOCK};

/// Sparse-input linear forward pass with a fixed output-block width.
///
/// `output[b] = bias + sum(value * weight[index])` over the active features of
/// sample `b`. Every element of `output` is overwritten.
pub fn forward<T: Element>(
    indices: &[i64],
    values: &[f32],
    weight: &[T],
    bias: &[T],
    output: &mut [T],
    shape: Shape,
    block_size: usize,
) -> Result<()> {
    shape.check_inputs(indices, values)?;
    shape.check_weight(weight.len())?;
    shape.check_bias("bias", bias.len())?;
    shape.check_output("output", output.len())?;
    Direction::Forward.check_block_size(block_size)?;

    let grid = Grid::new(shape.batch_size, shape.output_size, block_size);
    let capacity = shape.max_active_indices;

    // Rows are disjoint, and so are the blocks within a row.
    output
        .par_chunks_mut(shape.output_size)
        .enumerate()
        .for_each(|(sample, row)| {
            let slots = sample * capacity..(sample + 1) * capacity;
            let indices = &indices[slots.clone()];
            let values = &values[slots];

            row.par_chunks_mut(block_size)
                .enumerate()
                .for_each(|(block, out)| {
                    let columns = grid.columns(block);
                    forward_tile(
                        indices,
                        values,
                        weight,
                        bias,
                        out,
                        columns.start,
                        grid.output_size,
                    );
                });
        });

    Ok(())
}

#[inline(always)]
fn forward_tile<T: Element>(
    indices: &[i64],
    values: &[f32],
    weight: &[T],
    bias: &[T],
    out: &mut [T],
    offset: usize,
    output_size: usize,
) {
    let width = out.len();
    let mut acc = [0.0f32; MAX_FORWARD_BLOCK];
    let acc = &mut acc[..width];

    for (a, &b) in acc.iter_mut().zip(&bias[offset..offset + width]) {
        *a = b.to_f32();
    }

    for (feature, value) in active_features(indices, values) {
        let row = feature * output_size + offset;
        for (a, &w) in acc.iter_mut().zip(&weight[row..row + width]) {
            *a += w.to_f32() * value;
        }
    }

    for (o, &a) in out.iter_mut().zip(acc.iter()) {
        *o = T::from_f32(a);
    }
}
