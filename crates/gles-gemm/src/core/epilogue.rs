use tracing::debug;

use crate::arch::dispatch_data_type;
use crate::error::{GemmError, Result};
use crate::launch::{launch, Grid};
use crate::tensor::{TensorInfo, TensorView};
use crate::types::{ElementKind, GemmScalar};

/// In-place `dst = dst + beta · src`, W lanes per work-item.
///
/// Fixed-point types compute each lane with one saturating multiply-add at
/// the tensor's fractional position.
#[derive(Debug, Clone)]
pub struct MatrixAdditionKernel {
    name: String,
    src: TensorInfo,
    dst: TensorInfo,
    beta: f32,
    grid: Grid,
}

impl MatrixAdditionKernel {
    pub fn validate(src: &TensorInfo, dst: &TensorInfo) -> Result<()> {
        if src.data_type() != dst.data_type() {
            return Err(GemmError::DataTypeMismatch(src.data_type(), dst.data_type()));
        }
        if src.data_type().kind() == ElementKind::S32 {
            return Err(GemmError::UnsupportedDataType(src.data_type()));
        }
        if src.dimension(0) != dst.dimension(0)
            || src.dimension(1) != dst.dimension(1)
            || src.batches() != dst.batches()
        {
            return Err(GemmError::DimensionMismatch(format!(
                "matrix addition: {} vs {}",
                src.shape(),
                dst.shape()
            )));
        }
        Ok(())
    }

    pub fn configure(src: &TensorInfo, dst: &TensorInfo, beta: f32) -> Result<Self> {
        Self::validate(src, dst)?;

        let data_type = dst.data_type();
        let grid = Grid::covering(
            [dst.dimension(0), dst.dimension(1), dst.batches()],
            [data_type.vector_width(), 1, 1],
        );
        let name = format!("gemm_ma_{}", data_type.kind().name().to_lowercase());
        debug!(kernel = %name, shape = %dst.shape(), beta, "configured matrix addition");

        Ok(Self {
            name,
            src: *src,
            dst: *dst,
            beta,
            grid,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, src: &TensorView, dst: &TensorView) {
        debug_assert_eq!(src.info(), &self.src);
        debug_assert_eq!(dst.info(), &self.dst);

        let data_type = self.dst.data_type();
        let fp = data_type.frac_bits();
        let width = data_type.vector_width();
        let cols = self.dst.dimension(0);
        let (src, dst) = (*src, *dst);

        dispatch_data_type!(data_type, T => {
            let beta = <T as GemmScalar>::from_f32(self.beta, fp);
            launch(&self.name, self.grid, move |[x, y, z]| {
                let x0 = x * width;
                for col in x0..(x0 + width).min(cols) {
                    let dst_offset = dst.offset_3d(col, y, z);
                    unsafe {
                        let value = dst.load::<T>(dst_offset);
                        let addend = src.load::<T>(src.offset_3d(col, y, z));
                        dst.store(dst_offset, value.scaled_add(addend, beta, fp));
                    }
                }
            })
        })
    }
}
