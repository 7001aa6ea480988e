mod kernel_tests;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::kernel::Shape;
use crate::sparse::{active_features, SENTINEL};

/// A random sparse-linear problem with its dense inputs.
pub(crate) struct Problem {
    pub shape: Shape,
    pub num_features: usize,
    pub indices: Vec<i64>,
    pub values: Vec<f32>,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub output_grad: Vec<f32>,
}

impl Problem {
    pub fn random(seed: u64, shape: Shape, num_features: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let capacity = shape.max_active_indices;

        let mut indices = vec![SENTINEL; shape.input_len()];
        let mut values = vec![0.0; shape.input_len()];
        for sample in 0..shape.batch_size {
            let active = rng.gen_range(0..=capacity);
            for slot in sample * capacity..sample * capacity + active {
                indices[slot] = rng.gen_range(0..num_features) as i64;
                values[slot] = rng.gen_range(0.5..2.0);
            }
        }

        Self {
            shape,
            num_features,
            indices,
            values,
            weight: (0..num_features * shape.output_size)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect(),
            bias: (0..shape.output_size)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect(),
            output_grad: (0..shape.output_len())
                .map(|_| {
                    // Some exact zeros to exercise the skipped entries.
                    if rng.gen_bool(0.2) {
                        0.0
                    } else {
                        rng.gen_range(-1.0..1.0)
                    }
                })
                .collect(),
        }
    }

    fn sample(&self, b: usize) -> (&[i64], &[f32]) {
        let capacity = self.shape.max_active_indices;
        let slots = b * capacity..(b + 1) * capacity;
        (&self.indices[slots.clone()], &self.values[slots])
    }

    /// Dense f64 evaluation of the forward pass.
    pub fn reference_forward(&self) -> Vec<f32> {
        let n = self.shape.output_size;
        let mut output = Vec::with_capacity(self.shape.output_len());

        for b in 0..self.shape.batch_size {
            let mut row: Vec<f64> = self.bias.iter().map(|&x| x as f64).collect();
            let (indices, values) = self.sample(b);
            for (feature, value) in active_features(indices, values) {
                for (o, acc) in row.iter_mut().enumerate() {
                    *acc += self.weight[feature * n + o] as f64 * value as f64;
                }
            }
            output.extend(row.into_iter().map(|x| x as f32));
        }
        output
    }

    /// Dense f64 evaluation of the backward pass: `(weight_grad, bias_grad)`.
    pub fn reference_backward(&self) -> (Vec<f32>, Vec<f32>) {
        let n = self.shape.output_size;
        let mut weight_grad = vec![0.0f64; self.num_features * n];
        let mut bias_grad = vec![0.0f64; n];

        for b in 0..self.shape.batch_size {
            let grad = &self.output_grad[b * n..(b + 1) * n];
            for (acc, &g) in bias_grad.iter_mut().zip(grad) {
                *acc += g as f64;
            }

            let (indices, values) = self.sample(b);
            for (feature, value) in active_features(indices, values) {
                for (o, &g) in grad.iter().enumerate() {
                    weight_grad[feature * n + o] += g as f64 * value as f64;
                }
            }
        }

        (
            weight_grad.into_iter().map(|x| x as f32).collect(),
            bias_grad.into_iter().map(|x| x as f32).collect(),
        )
    }
}

/// Asserts that two slices agree element-wise within a mixed absolute/relative tolerance.
pub(crate) fn assert_approx_eq(actual: &[f32], expected: &[f32], description: &str) {
    assert_close(actual, expected, 1e-4, description);
}

pub(crate) fn assert_close(actual: &[f32], expected: &[f32], epsilon: f32, description: &str) {
    assert_eq!(actual.len(), expected.len(), "{} lengths differ", description);
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= epsilon * (1.0 + e.abs()),
            "{} differ at {}: |{} - {}| = {}",
            description,
            i,
            a,
            e,
            (a - e).abs()
        );
    }
}
