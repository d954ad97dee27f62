//! Operand reshape kernels.
//!
//! Both reshapes are pure permutations: they move elements byte-for-byte and
//! write zeros where a block reaches past the source matrix. No arithmetic is
//! ever applied to the values, so they work for every data type.

use tracing::debug;

use crate::error::{GemmError, Result};
use crate::launch::{launch, Grid};
use crate::tensor::{TensorInfo, TensorShape, TensorView};

use super::tiling::{ReshapeInfo, INTERLEAVE_HEIGHT};

#[inline(always)]
unsafe fn copy_element(src: &TensorView, src_offset: usize, dst: &TensorView, dst_offset: usize, size: usize) {
    std::ptr::copy_nonoverlapping(src.ptr_at(src_offset) as *const u8, dst.ptr_at(dst_offset), size);
}

#[inline(always)]
unsafe fn zero_element(dst: &TensorView, dst_offset: usize, size: usize) {
    std::ptr::write_bytes(dst.ptr_at(dst_offset), 0, size);
}

fn check_reshape(name: &str, src: &TensorInfo, dst: &TensorInfo, expected: &TensorShape) -> Result<()> {
    if src.data_type() != dst.data_type() {
        return Err(GemmError::DataTypeMismatch(src.data_type(), dst.data_type()));
    }
    if dst.dimension(0) != expected.x() || dst.dimension(1) != expected.y() || dst.batches() != src.batches() {
        return Err(GemmError::DimensionMismatch(format!(
            "{}: destination {} does not match expected {}",
            name,
            dst.shape(),
            expected
        )));
    }
    Ok(())
}

/// Interleave blocks of 4 rows of operand A.
///
/// Row block `r` lands in destination row `r / V`; element `A[4r + i][k]`
/// lands in column `k·4V + (r % V)·4 + i`. Rows past M are written as zero.
#[derive(Debug, Clone)]
pub struct Interleave4x4Kernel {
    src: TensorInfo,
    dst: TensorInfo,
    mult_interleave_height: usize,
    grid: Grid,
}

impl Interleave4x4Kernel {
    pub const NAME: &'static str = "gemm_interleave4x4";

    /// Destination info for interleaving `src`.
    pub fn output_info(src: &TensorInfo, mult_interleave_height: usize) -> TensorInfo {
        let reshape = ReshapeInfo::new(src.data_type(), 1, mult_interleave_height);
        TensorInfo::new(reshape.interleaved_shape(src.shape()), src.data_type())
    }

    pub fn configure(src: &TensorInfo, dst: &TensorInfo, mult_interleave_height: usize) -> Result<Self> {
        let reshape = ReshapeInfo::new(src.data_type(), 1, mult_interleave_height);
        reshape.validate()?;
        check_reshape(Self::NAME, src, dst, &reshape.interleaved_shape(src.shape()))?;

        let k = src.dimension(0);
        let row_blocks = dst.dimension(1) * mult_interleave_height;
        let grid = Grid::new(k.div_ceil(INTERLEAVE_HEIGHT), row_blocks, src.batches());

        debug!(src = %src.shape(), dst = %dst.shape(), v = mult_interleave_height, "configured interleave4x4");

        Ok(Self {
            src: *src,
            dst: *dst,
            mult_interleave_height,
            grid,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn run(&self, src: &TensorView, dst: &TensorView) {
        debug_assert_eq!(src.info(), &self.src);
        debug_assert_eq!(dst.info(), &self.dst);

        let m = self.src.dimension(1);
        let k_total = self.src.dimension(0);
        let v = self.mult_interleave_height;
        let size = self.src.element_size();
        let (src, dst) = (*src, *dst);

        launch(Self::NAME, self.grid, move |[x, r, z]| {
            let k_start = x * INTERLEAVE_HEIGHT;
            let k_end = (k_start + INTERLEAVE_HEIGHT).min(k_total);
            let dst_row = r / v;
            let lane = (r % v) * INTERLEAVE_HEIGHT;

            for k in k_start..k_end {
                for i in 0..INTERLEAVE_HEIGHT {
                    let row = r * INTERLEAVE_HEIGHT + i;
                    let dst_col = k * INTERLEAVE_HEIGHT * v + lane + i;
                    let dst_offset = dst.offset_3d(dst_col, dst_row, z);
                    unsafe {
                        if row < m {
                            copy_element(&src, src.offset_3d(k, row, z), &dst, dst_offset, size);
                        } else {
                            zero_element(&dst, dst_offset, size);
                        }
                    }
                }
            }
        });
    }
}

/// Transpose blocks of W columns of operand B.
///
/// Column block `c` lands in destination row `c / H`; element `B[k][cW + j]`
/// lands in column `k·W·H + (c % H)·W + j`. Columns past N are written as
/// zero.
#[derive(Debug, Clone)]
pub struct Transpose1xWKernel {
    src: TensorInfo,
    dst: TensorInfo,
    reshape: ReshapeInfo,
    grid: Grid,
}

impl Transpose1xWKernel {
    pub const NAME: &'static str = "gemm_transpose1xW";

    pub fn output_info(src: &TensorInfo, mult_transpose_width: usize) -> TensorInfo {
        let reshape = ReshapeInfo::new(src.data_type(), mult_transpose_width, 1);
        TensorInfo::new(reshape.transposed_shape(src.shape()), src.data_type())
    }

    pub fn configure(src: &TensorInfo, dst: &TensorInfo, mult_transpose_width: usize) -> Result<Self> {
        let reshape = ReshapeInfo::new(src.data_type(), mult_transpose_width, 1);
        reshape.validate()?;
        check_reshape(Self::NAME, src, dst, &reshape.transposed_shape(src.shape()))?;

        let col_blocks = dst.dimension(1) * mult_transpose_width;
        let grid = Grid::new(col_blocks, src.dimension(1), src.batches());

        debug!(
            src = %src.shape(),
            dst = %dst.shape(),
            w = reshape.transpose_width,
            h = mult_transpose_width,
            "configured transpose1xW"
        );

        Ok(Self {
            src: *src,
            dst: *dst,
            reshape,
            grid,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn run(&self, src: &TensorView, dst: &TensorView) {
        debug_assert_eq!(src.info(), &self.src);
        debug_assert_eq!(dst.info(), &self.dst);

        let n = self.src.dimension(0);
        let w = self.reshape.transpose_width;
        let h = self.reshape.mult_transpose_width;
        let size = self.src.element_size();
        let (src, dst) = (*src, *dst);

        launch(Self::NAME, self.grid, move |[c, k, z]| {
            let dst_row = c / h;
            let dst_col0 = k * w * h + (c % h) * w;
            for j in 0..w {
                let col = c * w + j;
                let dst_offset = dst.offset_3d(dst_col0 + j, dst_row, z);
                unsafe {
                    if col < n {
                        copy_element(&src, src.offset_3d(col, k, z), &dst, dst_offset, size);
                    } else {
                        zero_element(&dst, dst_offset, size);
                    }
                }
            }
        });
    }
}

/// Plain 2D transpose: `dst[x][y] = src[y][x]` for every batch.
#[derive(Debug, Clone)]
pub struct TransposeKernel {
    src: TensorInfo,
    dst: TensorInfo,
    grid: Grid,
}

impl TransposeKernel {
    pub const NAME: &'static str = "transpose";

    pub fn output_info(src: &TensorInfo) -> TensorInfo {
        let mut shape = *src.shape();
        shape.set(0, src.dimension(1));
        shape.set(1, src.dimension(0));
        TensorInfo::new(shape, src.data_type())
    }

    pub fn configure(src: &TensorInfo, dst: &TensorInfo) -> Result<Self> {
        let expected = Self::output_info(src);
        check_reshape(Self::NAME, src, dst, expected.shape())?;
        let grid = Grid::new(src.dimension(0), src.dimension(1), src.batches());
        Ok(Self {
            src: *src,
            dst: *dst,
            grid,
        })
    }

    pub fn run(&self, src: &TensorView, dst: &TensorView) {
        debug_assert_eq!(src.info(), &self.src);
        debug_assert_eq!(dst.info(), &self.dst);

        let size = self.src.element_size();
        let (src, dst) = (*src, *dst);
        launch(Self::NAME, self.grid, move |[x, y, z]| unsafe {
            copy_element(&src, src.offset_3d(x, y, z), &dst, dst.offset_3d(y, x, z), size);
        });
    }
}
