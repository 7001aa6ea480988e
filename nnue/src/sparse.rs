use crate::error::{KernelError, Result};

/// Feature index marking the end of a sample's active features.
pub const SENTINEL: i64 = -1;

// Layout (one row per sample, `max_active_indices` slots each):
//
//   [s0: f f f -1 -1][s1: f -1 -1 -1 -1][s2: f f f f f]
//    └─ capacity ──┘
//
// Slots at or after the first sentinel are padding and never read as active.

/// Iterates the active `(feature_index, value)` pairs of one sample, stopping at
/// the first sentinel or when the capacity is exhausted.
#[inline(always)]
pub fn active_features<'a>(
    indices: &'a [i64],
    values: &'a [f32],
) -> impl Iterator<Item = (usize, f32)> + 'a {
    indices
        .iter()
        .zip(values)
        .take_while(|&(&idx, _)| idx != SENTINEL)
        .map(|(&idx, &value)| (idx as usize, value))
}

/// A batch of sparse samples in the flat fixed-capacity layout the kernels consume.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBatch {
    indices: Vec<i64>,
    values: Vec<f32>,
    batch_size: usize,
    max_active_indices: usize,
}

impl SparseBatch {
    pub fn new(max_active_indices: usize) -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
            batch_size: 0,
            max_active_indices,
        }
    }

    pub fn with_capacity(max_active_indices: usize, batch_size: usize) -> Self {
        Self {
            indices: Vec::with_capacity(batch_size * max_active_indices),
            values: Vec::with_capacity(batch_size * max_active_indices),
            batch_size: 0,
            max_active_indices,
        }
    }

    /// Adopts already laid out buffers. Only lengths are checked.
    pub fn from_raw(
        indices: Vec<i64>,
        values: Vec<f32>,
        max_active_indices: usize,
    ) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(KernelError::ShapeMismatch {
                buffer: "input_values",
                expected: indices.len(),
                actual: values.len(),
            });
        }

        let batch_size = match max_active_indices {
            0 if indices.is_empty() => 0,
            0 => {
                return Err(KernelError::ShapeMismatch {
                    buffer: "input_indices",
                    expected: 0,
                    actual: indices.len(),
                })
            }
            cap if indices.len() % cap != 0 => {
                return Err(KernelError::ShapeMismatch {
                    buffer: "input_indices",
                    expected: (indices.len() / cap + 1) * cap,
                    actual: indices.len(),
                })
            }
            cap => indices.len() / cap,
        };

        Ok(Self {
            indices,
            values,
            batch_size,
            max_active_indices,
        })
    }

    /// Appends one sample, padding the unused slots with the sentinel.
    pub fn push_sample(&mut self, features: &[(usize, f32)]) -> Result<()> {
        if features.len() > self.max_active_indices {
            return Err(KernelError::SampleOverflow {
                active: features.len(),
                capacity: self.max_active_indices,
            });
        }

        for &(idx, value) in features {
            self.indices.push(idx as i64);
            self.values.push(value);
        }

        let padding = self.max_active_indices - features.len();
        self.indices.extend(std::iter::repeat(SENTINEL).take(padding));
        self.values.extend(std::iter::repeat(0.0).take(padding));

        self.batch_size += 1;
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_active_indices(&self) -> usize {
        self.max_active_indices
    }

    pub fn indices(&self) -> &[i64] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Slot slices of sample `b`.
    ///
    /// # Panics
    ///
    /// Panics if `b >= self.batch_size()`.
    pub fn sample(&self, b: usize) -> (&[i64], &[f32]) {
        assert!(b < self.batch_size, "sample {} out of range for batch of {}", b, self.batch_size);
        let start = b * self.max_active_indices;
        let end = start + self.max_active_indices;
        (&self.indices[start..end], &self.values[start..end])
    }

    pub fn active(&self, b: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (indices, values) = self.sample(b);
        active_features(indices, values)
    }

    /// Checks that every sample is well formed for a weight matrix with
    /// `num_features` rows. The kernels never call this.
    pub fn validate(&self, num_features: usize) -> Result<()> {
        for sample in 0..self.batch_size {
            let (indices, _) = self.sample(sample);
            let mut terminated = false;

            for (slot, &index) in indices.iter().enumerate() {
                let valid = if terminated {
                    index == SENTINEL
                } else if index == SENTINEL {
                    terminated = true;
                    true
                } else {
                    index >= 0 && (index as usize) < num_features
                };

                if !valid {
                    return Err(KernelError::InvalidSlot {
                        sample,
                        slot,
                        index,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_sample_pads_with_sentinel() {
        let mut batch = SparseBatch::new(4);
        batch.push_sample(&[(3, 1.0), (7, 0.5)]).unwrap();
        batch.push_sample(&[]).unwrap();

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.indices(), &[3, 7, -1, -1, -1, -1, -1, -1]);
        assert_eq!(batch.values(), &[1.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_push_sample_rejects_overflow() {
        let mut batch = SparseBatch::new(1);
        let err = batch.push_sample(&[(0, 1.0), (1, 1.0)]).unwrap_err();
        assert_eq!(
            err,
            KernelError::SampleOverflow {
                active: 2,
                capacity: 1
            }
        );
        assert_eq!(batch.batch_size(), 0);
    }

    #[test]
    fn test_active_stops_at_first_sentinel() {
        let batch =
            SparseBatch::from_raw(vec![4, -1, 9, 2], vec![2.0, 0.0, 3.0, 1.0], 4).unwrap();
        let active: Vec<_> = batch.active(0).collect();
        assert_eq!(active, vec![(4, 2.0)]);
    }

    #[test]
    #[should_panic]
    fn test_sample_out_of_range_panics() {
        let mut batch = SparseBatch::new(2);
        batch.push_sample(&[(1, 1.0)]).unwrap();
        batch.sample(1);
    }

    #[test]
    fn test_from_raw_checks_lengths() {
        assert!(SparseBatch::from_raw(vec![0, 1, 2], vec![1.0; 3], 2).is_err());
        assert!(SparseBatch::from_raw(vec![0, 1], vec![1.0], 2).is_err());

        let batch = SparseBatch::from_raw(vec![0, 1, 2, -1], vec![1.0; 4], 2).unwrap();
        assert_eq!(batch.batch_size(), 2);
    }

    #[test]
    fn test_validate() {
        let ok = SparseBatch::from_raw(vec![0, 5, -1, -1], vec![1.0; 4], 4).unwrap();
        assert!(ok.validate(6).is_ok());
        assert!(ok.validate(5).is_err());

        let gap = SparseBatch::from_raw(vec![0, -1, 3, -1], vec![1.0; 4], 4).unwrap();
        assert_eq!(
            gap.validate(6),
            Err(KernelError::InvalidSlot {
                sample: 0,
                slot: 2,
                index: 3
            })
        );
    }
}
