//! Tile and reshape geometry shared by the reshape and multiply kernels.

use crate::error::{GemmError, Result};
use crate::tensor::TensorShape;
use crate::types::DataType;

/// Rows gathered into one interleaved block of operand A.
pub const INTERLEAVE_HEIGHT: usize = 4;

/// Largest direct tile: 4 output rows by 16 output columns.
pub const MAX_DIRECT_ROWS: usize = 4;
pub const MAX_DIRECT_COLS: usize = 16;

/// Layout of the reshaped operands.
///
/// `transpose_width` (W) is the element count of one 16-byte vector of the
/// data type. `mult_transpose_width` (H) packs H transposed column blocks into
/// one destination row, `mult_interleave_height` (V) packs V interleaved row
/// blocks into one destination row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReshapeInfo {
    pub transpose_width: usize,
    pub mult_transpose_width: usize,
    pub mult_interleave_height: usize,
}

impl ReshapeInfo {
    pub fn new(data_type: DataType, mult_transpose_width: usize, mult_interleave_height: usize) -> Self {
        Self {
            transpose_width: data_type.vector_width(),
            mult_transpose_width,
            mult_interleave_height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.transpose_width == 0 || self.mult_transpose_width == 0 || self.mult_interleave_height == 0 {
            return Err(GemmError::InvalidConfig(format!(
                "reshape multiplicities must be non-zero: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Elements per interleaved destination row for one step of k: 4·V.
    #[inline(always)]
    pub fn interleave_block(&self) -> usize {
        INTERLEAVE_HEIGHT * self.mult_interleave_height
    }

    /// Elements per transposed destination row for one step of k: W·H.
    #[inline(always)]
    pub fn transpose_block(&self) -> usize {
        self.transpose_width * self.mult_transpose_width
    }

    /// Shape of operand A (M×K, plus batches) after interleave-4x4:
    /// x = K·4·V, y = ⌈⌈M/4⌉/V⌉.
    pub fn interleaved_shape(&self, a: &TensorShape) -> TensorShape {
        let mut shape = *a;
        let row_blocks = a.y().div_ceil(INTERLEAVE_HEIGHT);
        shape.set(0, a.x() * self.interleave_block());
        shape.set(1, row_blocks.div_ceil(self.mult_interleave_height));
        shape
    }

    /// Shape of operand B (K×N, plus batches) after transpose-1xW:
    /// x = K·W·H, y = ⌈⌈N/W⌉/H⌉.
    pub fn transposed_shape(&self, b: &TensorShape) -> TensorShape {
        let mut shape = *b;
        let col_blocks = b.x().div_ceil(self.transpose_width);
        shape.set(0, b.y() * self.transpose_block());
        shape.set(1, col_blocks.div_ceil(self.mult_transpose_width));
        shape
    }
}

/// Output tile computed by one work-item of the direct kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    pub rows: usize,
    pub cols: usize,
}

impl TileShape {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_DIRECT_ROWS).contains(&self.rows) || !(1..=MAX_DIRECT_COLS).contains(&self.cols) {
            return Err(GemmError::InvalidConfig(format!(
                "direct tile {}x{} outside 1..={}x1..={}",
                self.rows, self.cols, MAX_DIRECT_ROWS, MAX_DIRECT_COLS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_shape() {
        let info = ReshapeInfo::new(DataType::F32, 1, 2);
        // M = 9, K = 5: ⌈9/4⌉ = 3 row blocks, packed 2 per row
        let shape = info.interleaved_shape(&TensorShape::new(&[5, 9]));
        assert_eq!(shape.x(), 5 * 8);
        assert_eq!(shape.y(), 2);
    }

    #[test]
    fn test_transposed_shape() {
        let info = ReshapeInfo::new(DataType::F16, 2, 1);
        // K = 3, N = 20: W = 8, ⌈20/8⌉ = 3 column blocks, packed 2 per row
        let shape = info.transposed_shape(&TensorShape::new(&[20, 3, 4]));
        assert_eq!(shape.x(), 3 * 16);
        assert_eq!(shape.y(), 2);
        assert_eq!(shape.z(), 4);
    }

    #[test]
    fn test_tile_shape_bounds() {
        assert!(TileShape::new(4, 16).validate().is_ok());
        assert!(TileShape::new(0, 4).validate().is_err());
        assert!(TileShape::new(5, 4).validate().is_err());
        assert!(TileShape::new(1, 17).validate().is_err());
    }
}
