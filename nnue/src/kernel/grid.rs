use std::ops::Range;

/// The 2-D work-item grid of one dispatch: one tile per (sample, output-block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub batch_size: usize,
    pub blocks: usize,
    pub block_size: usize,
    pub output_size: usize,
}

impl Grid {
    pub fn new(batch_size: usize, output_size: usize, block_size: usize) -> Self {
        Self {
            batch_size,
            blocks: output_size.div_ceil(block_size),
            block_size,
            output_size,
        }
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.batch_size * self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps a flat tile id to its (sample, block) coordinates.
    #[inline(always)]
    pub fn tile(&self, id: usize) -> (usize, usize) {
        (id / self.blocks, id % self.blocks)
    }

    /// Output columns covered by `block`; the last block may be partial.
    #[inline(always)]
    pub fn columns(&self, block: usize) -> Range<usize> {
        let start = block * self.block_size;
        start..(start + self.block_size).min(self.output_size)
    }
}
