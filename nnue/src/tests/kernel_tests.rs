use half::f16;

use crate::dispatch::{BACKWARD_BLOCK_SIZES, FORWARD_BLOCK_SIZES};
use crate::kernel::{backward, forward, Shape};

use super::{assert_approx_eq, assert_close, Problem};

fn run_forward(problem: &Problem, block_size: usize) -> Vec<f32> {
    let mut output = vec![0.0; problem.shape.output_len()];
    forward(
        &problem.indices,
        &problem.values,
        &problem.weight,
        &problem.bias,
        &mut output,
        problem.shape,
        block_size,
    )
    .unwrap();
    output
}

fn run_backward(problem: &Problem, block_size: usize) -> (Vec<f32>, Vec<f32>) {
    let mut weight_grad = vec![0.0; problem.weight.len()];
    let mut bias_grad = vec![0.0; problem.bias.len()];
    backward(
        &problem.indices,
        &problem.values,
        &problem.output_grad,
        &mut weight_grad,
        &mut bias_grad,
        problem.shape,
        block_size,
    )
    .unwrap();
    (weight_grad, bias_grad)
}

#[test]
fn test_forward_matches_reference() {
    let problem = Problem::random(7, Shape::new(16, 12, 100), 64);
    let output = run_forward(&problem, 32);
    assert_approx_eq(&output, &problem.reference_forward(), "Forward outputs");
}

#[test]
fn test_backward_matches_reference() {
    let problem = Problem::random(11, Shape::new(16, 12, 100), 64);
    let (weight_grad, bias_grad) = run_backward(&problem, 16);
    let (expected_weight, expected_bias) = problem.reference_backward();

    assert_approx_eq(&weight_grad, &expected_weight, "Weight gradients");
    assert_approx_eq(&bias_grad, &expected_bias, "Bias gradients");
}

#[test]
fn test_forward_identical_across_block_sizes() {
    // Output size not a multiple of any candidate, so every width has a partial block.
    let problem = Problem::random(3, Shape::new(9, 20, 1500), 200);
    let baseline = run_forward(&problem, FORWARD_BLOCK_SIZES[0]);

    for &block_size in &FORWARD_BLOCK_SIZES[1..] {
        assert_eq!(
            run_forward(&problem, block_size),
            baseline,
            "Forward output changed with block size {}",
            block_size
        );
    }
}

#[test]
fn test_backward_equivalent_across_block_sizes() {
    let problem = Problem::random(5, Shape::new(24, 16, 700), 40);
    let (baseline_weight, baseline_bias) = run_backward(&problem, BACKWARD_BLOCK_SIZES[0]);

    for &block_size in &BACKWARD_BLOCK_SIZES[1..] {
        // Only the order of atomic adds differs between widths.
        let (weight_grad, bias_grad) = run_backward(&problem, block_size);
        assert_close(&weight_grad, &baseline_weight, 1e-5, "Weight gradients");
        assert_close(&bias_grad, &baseline_bias, 1e-5, "Bias gradients");
    }
}

#[test]
fn test_zero_active_features_yield_bias() {
    let shape = Shape::new(3, 4, 5);
    let indices = vec![-1; shape.input_len()];
    let values = vec![0.0; shape.input_len()];
    let weight = vec![9.0; 10 * shape.output_size];
    let bias = vec![0.1, -0.2, 0.3, -0.4, 0.5];

    for &block_size in &FORWARD_BLOCK_SIZES {
        let mut output = vec![0.0; shape.output_len()];
        forward(&indices, &values, &weight, &bias, &mut output, shape, block_size).unwrap();
        for row in output.chunks(shape.output_size) {
            assert_eq!(row, bias.as_slice());
        }
    }
}

#[test]
fn test_zero_active_features_yield_bias_in_half_precision() {
    let shape = Shape::new(2, 3, 4);
    let indices = vec![-1; shape.input_len()];
    let values = vec![0.0; shape.input_len()];
    let weight = vec![f16::from_f32(1.0); 2 * shape.output_size];
    let bias: Vec<f16> = [0.1, 0.2, 0.3, 0.4].iter().map(|&x| f16::from_f32(x)).collect();
    let mut output = vec![f16::ZERO; shape.output_len()];

    forward(&indices, &values, &weight, &bias, &mut output, shape, 64).unwrap();
    assert_eq!(&output[..4], bias.as_slice());
    assert_eq!(&output[4..], bias.as_slice());
}

#[test]
fn test_bias_gradient_is_batch_sum() {
    let shape = Shape::new(4, 2, 3);
    let indices = vec![0, -1, 1, 2, -1, -1, 2, 0];
    let values = vec![1.0; shape.input_len()];
    let output_grad = vec![
        0.25, -1.0, 2.0, //
        0.5, 0.0, -0.75, //
        -1.5, 3.0, 0.25, //
        1.0, 0.5, 0.0,
    ];

    for &block_size in &BACKWARD_BLOCK_SIZES {
        let mut weight_grad = vec![0.0; 3 * shape.output_size];
        let mut bias_grad = vec![0.0; shape.output_size];
        backward(
            &indices,
            &values,
            &output_grad,
            &mut weight_grad,
            &mut bias_grad,
            shape,
            block_size,
        )
        .unwrap();
        assert_eq!(bias_grad, vec![0.25, 2.5, 1.5]);
    }
}

#[test]
fn test_weight_gradient_scatter_single_feature() {
    let shape = Shape::new(3, 2, 4);
    // Feature 5 appears only in sample 1, slot 0.
    let indices = vec![-1, -1, 5, -1, -1, -1];
    let values = vec![0.0, 0.0, 1.5, 0.0, 0.0, 0.0];
    let output_grad = vec![
        9.0, 9.0, 9.0, 9.0, //
        0.5, -2.0, 0.0, 1.25, //
        7.0, 7.0, 7.0, 7.0,
    ];
    let num_features = 8;

    let mut weight_grad = vec![0.0; num_features * shape.output_size];
    let mut bias_grad = vec![0.0; shape.output_size];
    backward(
        &indices,
        &values,
        &output_grad,
        &mut weight_grad,
        &mut bias_grad,
        shape,
        8,
    )
    .unwrap();

    for (feature, row) in weight_grad.chunks(shape.output_size).enumerate() {
        if feature == 5 {
            assert_eq!(row, &[0.75, -3.0, 0.0, 1.875]);
        } else {
            assert!(row.iter().all(|&g| g == 0.0), "row {} was touched", feature);
        }
    }
}

#[test]
fn test_slots_after_sentinel_are_ignored() {
    let shape = Shape::new(2, 4, 6);
    let clean = Problem {
        shape,
        num_features: 8,
        indices: vec![1, 4, -1, -1, 7, -1, -1, -1],
        values: vec![0.5, 2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        weight: (0..48).map(|i| i as f32 * 0.125 - 3.0).collect(),
        bias: vec![0.5; 6],
        output_grad: (0..12).map(|i| i as f32 * 0.25 - 1.0).collect(),
    };
    let garbage = Problem {
        indices: vec![1, 4, -1, 3, 7, -1, 0, 6],
        values: vec![0.5, 2.0, 0.0, 4.0, 1.0, 0.0, 5.0, 6.0],
        weight: clean.weight.clone(),
        bias: clean.bias.clone(),
        output_grad: clean.output_grad.clone(),
        ..clean
    };

    assert_eq!(run_forward(&garbage, 32), run_forward(&clean, 32));
    assert_eq!(run_backward(&garbage, 8), run_backward(&clean, 8));
}

#[test]
fn test_colliding_features_accumulate() {
    let shape = Shape::new(2, 1, 3);
    let indices = vec![2, 2];
    let values = vec![2.0, -0.5];
    let output_grad = vec![1.0, 2.0, 3.0, 4.0, 8.0, -2.0];

    let mut weight_grad = vec![0.0; 3 * shape.output_size];
    let mut bias_grad = vec![0.0; shape.output_size];
    backward(
        &indices,
        &values,
        &output_grad,
        &mut weight_grad,
        &mut bias_grad,
        shape,
        8,
    )
    .unwrap();

    assert_eq!(&weight_grad[6..9], &[0.0, 0.0, 7.0]);
    assert!(weight_grad[..6].iter().all(|&g| g == 0.0));
}

#[test]
fn test_heavy_contention_on_one_row() {
    let shape = Shape::new(512, 4, 64);
    let mut indices = vec![-1; shape.input_len()];
    let mut values = vec![0.0; shape.input_len()];
    for sample in 0..shape.batch_size {
        indices[sample * 4] = 0;
        values[sample * 4] = 1.0;
    }
    let output_grad = vec![1.0; shape.output_len()];

    for &block_size in &BACKWARD_BLOCK_SIZES {
        let mut weight_grad = vec![0.0; 2 * shape.output_size];
        let mut bias_grad = vec![0.0; shape.output_size];
        backward(
            &indices,
            &values,
            &output_grad,
            &mut weight_grad,
            &mut bias_grad,
            shape,
            block_size,
        )
        .unwrap();

        assert!(weight_grad[..64].iter().all(|&g| g == 512.0));
        assert!(weight_grad[64..].iter().all(|&g| g == 0.0));
        assert!(bias_grad.iter().all(|&g| g == 512.0));
    }
}

#[test]
fn test_end_to_end_example() {
    let shape = Shape::new(1, 3, 2);
    let indices = vec![2, -1, -1];
    let values = vec![1.5, 0.0, 0.0];
    let weight = vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0];
    let bias = vec![0.1, 0.2];

    for &block_size in &FORWARD_BLOCK_SIZES {
        let mut output = vec![0.0; 2];
        forward(&indices, &values, &weight, &bias, &mut output, shape, block_size).unwrap();
        assert_approx_eq(&output, &[1.6, 3.2], "End-to-end outputs");
    }
}

#[test]
fn test_sorted_and_duplicate_indices() {
    // Same multiset of features, once unique and once with a repeated index.
    let shape = Shape::new(2, 3, 4);
    let weight: Vec<f32> = (0..16).map(|i| i as f32 * 0.5).collect();
    let bias = vec![0.0; 4];
    let output_grad = vec![1.0, -1.0, 0.5, 2.0, 1.0, -1.0, 0.5, 2.0];

    let unique = Problem {
        shape,
        num_features: 4,
        indices: vec![1, 3, -1, 3, 1, -1],
        values: vec![3.0, 1.0, 0.0, 1.0, 3.0, 0.0],
        weight: weight.clone(),
        bias: bias.clone(),
        output_grad: output_grad.clone(),
    };
    let duplicated = Problem {
        indices: vec![1, 3, 1, 3, 1, 1],
        values: vec![1.0, 1.0, 2.0, 1.0, 1.0, 2.0],
        weight,
        bias,
        output_grad,
        ..unique
    };

    // Unsorted order within a sample does not change the sum.
    let unique_out = run_forward(&unique, 32);
    assert_eq!(&unique_out[..4], &unique_out[4..]);

    // Repeated indices add up like a single occurrence with the summed value.
    assert_approx_eq(&run_forward(&duplicated, 32), &unique_out, "Duplicate outputs");

    let (unique_weight, unique_bias) = run_backward(&unique, 8);
    let (dup_weight, dup_bias) = run_backward(&duplicated, 8);
    assert_approx_eq(&dup_weight, &unique_weight, "Duplicate weight gradients");
    assert_eq!(dup_bias, unique_bias);
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let shape = Shape::new(0, 4, 8);
    let mut output: Vec<f32> = Vec::new();
    forward(&[], &[], &[1.0; 8], &[0.0; 8], &mut output, shape, 32).unwrap();

    let mut weight_grad = vec![0.0; 8];
    let mut bias_grad = vec![0.0; 8];
    backward::<f32>(&[], &[], &[], &mut weight_grad, &mut bias_grad, shape, 8).unwrap();
    assert!(bias_grad.iter().all(|&g| g == 0.0));
}
