use tracing::debug;

use crate::arch::{dispatch_data_type, GemmConfig, GemmPath, KernelDispatch};
use crate::error::{GemmError, Result};
use crate::launch::Grid;
use crate::tensor::{TensorInfo, TensorView};
use crate::types::{DataType, ElementKind, GemmScalar};

use super::kernel::MultiplyArgs;
use super::tiling::{ReshapeInfo, INTERLEAVE_HEIGHT};

/// Problem size recovered from the operand infos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dims {
    m: usize,
    n: usize,
    k: usize,
    batches: usize,
    b_depth: usize,
}

fn check_data_types(a: &TensorInfo, b: &TensorInfo, dst: &TensorInfo) -> Result<DataType> {
    let dt = a.data_type();
    if matches!(dt.kind(), ElementKind::S32) {
        return Err(GemmError::UnsupportedDataType(dt));
    }
    for other in [b.data_type(), dst.data_type()] {
        if other != dt {
            return Err(GemmError::DataTypeMismatch(dt, other));
        }
    }
    Ok(dt)
}

fn mismatch(what: &str, expected: usize, got: usize) -> GemmError {
    GemmError::DimensionMismatch(format!("{}: expected {}, got {}", what, expected, got))
}

fn resolve_dims(a: &TensorInfo, b: &TensorInfo, dst: &TensorInfo, config: &GemmConfig) -> Result<Dims> {
    let m = dst.dimension(1);
    let n = dst.dimension(0);
    let batches = dst.batches();

    let k = match config.path {
        GemmPath::Reshaped { .. } => {
            let reshape = config
                .reshape_info(a.data_type())
                .ok_or_else(|| GemmError::InvalidConfig("missing reshape info".to_string()))?;
            reshape.validate()?;

            let block_a = reshape.interleave_block();
            if a.dimension(0) % block_a != 0 {
                return Err(GemmError::DimensionMismatch(format!(
                    "interleaved A width {} is not a multiple of {}",
                    a.dimension(0),
                    block_a
                )));
            }
            let k = a.dimension(0) / block_a;

            let a_rows = m.div_ceil(INTERLEAVE_HEIGHT).div_ceil(reshape.mult_interleave_height);
            let b_rows = n
                .div_ceil(reshape.transpose_width)
                .div_ceil(reshape.mult_transpose_width);
            if a.dimension(1) != a_rows {
                return Err(mismatch("interleaved A rows", a_rows, a.dimension(1)));
            }
            if b.dimension(0) != k * reshape.transpose_block() {
                return Err(mismatch("transposed B width", k * reshape.transpose_block(), b.dimension(0)));
            }
            if b.dimension(1) != b_rows {
                return Err(mismatch("transposed B rows", b_rows, b.dimension(1)));
            }
            k
        }
        GemmPath::Direct(tile) => {
            tile.validate()?;
            let k = a.dimension(0);
            if a.dimension(1) != m {
                return Err(mismatch("A rows", m, a.dimension(1)));
            }
            if b.dimension(1) != k {
                return Err(mismatch("B rows", k, b.dimension(1)));
            }
            if b.dimension(0) != n {
                return Err(mismatch("B columns", n, b.dimension(0)));
            }
            k
        }
    };

    if a.batches() != batches {
        return Err(mismatch("A batches", batches, a.batches()));
    }
    let b_depth = b.batches();
    if b_depth == 0 || b_depth > batches.max(1) {
        return Err(mismatch("B batches", batches, b_depth));
    }

    Ok(Dims {
        m,
        n,
        k,
        batches,
        b_depth,
    })
}

/// `dst = alpha · A × B` for one of the supported element types.
///
/// On the reshaped path A must already be interleaved and B transposed (see
/// [`Interleave4x4Kernel`](super::Interleave4x4Kernel) and
/// [`Transpose1xWKernel`](super::Transpose1xWKernel)); on the direct path
/// both are plain row-major matrices. Any dimension above the second is a
/// batch. When B has fewer batches than A, output batch `z` reads B batch
/// `z % b_depth`.
#[derive(Debug, Clone)]
pub struct MatrixMultiplyKernel {
    name: String,
    a: TensorInfo,
    b: TensorInfo,
    dst: TensorInfo,
    config: GemmConfig,
    reshape: Option<ReshapeInfo>,
    alpha: f32,
    dims: Dims,
    grid: Grid,
}

impl MatrixMultiplyKernel {
    pub fn validate(a: &TensorInfo, b: &TensorInfo, dst: &TensorInfo, config: &GemmConfig) -> Result<()> {
        check_data_types(a, b, dst)?;
        resolve_dims(a, b, dst, config).map(|_| ())
    }

    pub fn configure(
        a: &TensorInfo,
        b: &TensorInfo,
        dst: &TensorInfo,
        alpha: f32,
        config: &GemmConfig,
    ) -> Result<Self> {
        let data_type = check_data_types(a, b, dst)?;
        let dims = resolve_dims(a, b, dst, config)?;
        let reshape = config.reshape_info(data_type);

        let (path_name, grid) = match config.path {
            GemmPath::Reshaped { .. } => (
                "interleaved_transposed",
                Grid::covering(
                    [dims.n, dims.m, dims.batches],
                    [data_type.vector_width(), INTERLEAVE_HEIGHT, 1],
                ),
            ),
            GemmPath::Direct(tile) => (
                "direct",
                Grid::covering([dims.n, dims.m, dims.batches], [tile.cols, tile.rows, 1]),
            ),
        };
        let name = format!(
            "gemm_mm_{}_{}_{}",
            path_name,
            data_type.kind().name().to_lowercase(),
            config.target.name().to_lowercase()
        );

        debug!(
            kernel = %name,
            m = dims.m,
            n = dims.n,
            k = dims.k,
            batches = dims.batches,
            b_depth = dims.b_depth,
            alpha,
            "configured matrix multiply"
        );

        Ok(Self {
            name,
            a: *a,
            b: *b,
            dst: *dst,
            config: *config,
            reshape,
            alpha,
            dims,
            grid,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GemmConfig {
        &self.config
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn run(&self, a: &TensorView, b: &TensorView, dst: &TensorView) {
        debug_assert_eq!(a.info(), &self.a);
        debug_assert_eq!(b.info(), &self.b);
        debug_assert_eq!(dst.info(), &self.dst);

        let data_type = self.dst.data_type();
        let args = MultiplyArgs {
            a: *a,
            b: *b,
            dst: *dst,
            m: self.dims.m,
            n: self.dims.n,
            k: self.dims.k,
            b_depth: self.dims.b_depth,
            frac_bits: data_type.frac_bits(),
        };

        dispatch_data_type!(data_type, T => {
            let alpha = (self.alpha != 1.0).then(|| <T as GemmScalar>::from_f32(self.alpha, args.frac_bits));
            match (self.config.path, self.reshape) {
                (GemmPath::Reshaped { .. }, Some(reshape)) => {
                    T::launch_reshaped(&self.name, self.config.target, args, reshape, alpha, self.grid)
                }
                (GemmPath::Direct(tile), _) => {
                    T::launch_direct(&self.name, self.config.target, args, tile, alpha, self.grid)
                }
                (GemmPath::Reshaped { .. }, None) => {
                    unreachable!("reshape info is resolved when configuring")
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::GpuTarget;
    use crate::tensor::TensorShape;

    fn info(dims: &[usize]) -> TensorInfo {
        TensorInfo::new(TensorShape::new(dims), DataType::F32)
    }

    #[test]
    fn test_direct_small_matrix() {
        // [1 2; 3 4] × [5 6; 7 8]
        let mut a = vec![1.0f32, 2.0, 3.0, 4.0];
        let mut b = vec![5.0f32, 6.0, 7.0, 8.0];
        let mut c = vec![0.0f32; 4];
        let cfg = GemmConfig::direct(GpuTarget::Midgard, 2, 4);
        let kernel = MatrixMultiplyKernel::configure(&info(&[2, 2]), &info(&[2, 2]), &info(&[2, 2]), 1.0, &cfg).unwrap();
        unsafe {
            kernel.run(
                &TensorView::new(a.as_mut_ptr() as *mut u8, info(&[2, 2])),
                &TensorView::new(b.as_mut_ptr() as *mut u8, info(&[2, 2])),
                &TensorView::new(c.as_mut_ptr() as *mut u8, info(&[2, 2])),
            );
        }
        assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_rejects_mismatched_types() {
        let a = info(&[2, 2]);
        let b = TensorInfo::new(TensorShape::new(&[2, 2]), DataType::F16);
        let cfg = GemmConfig::direct(GpuTarget::Midgard, 2, 4);
        assert_eq!(
            MatrixMultiplyKernel::validate(&a, &b, &a, &cfg),
            Err(GemmError::DataTypeMismatch(DataType::F32, DataType::F16))
        );
    }

    #[test]
    fn test_rejects_s32() {
        let a = TensorInfo::new(TensorShape::new(&[2, 2]), DataType::S32);
        let cfg = GemmConfig::direct(GpuTarget::Midgard, 2, 4);
        assert_eq!(
            MatrixMultiplyKernel::validate(&a, &a, &a, &cfg),
            Err(GemmError::UnsupportedDataType(DataType::S32))
        );
    }

    #[test]
    fn test_rejects_unreshaped_operands_on_reshaped_path() {
        let cfg = GemmConfig::reshaped(GpuTarget::Bifrost, 1, 1);
        let a = info(&[3, 8]);
        let b = info(&[5, 3]);
        let dst = info(&[5, 8]);
        assert!(matches!(
            MatrixMultiplyKernel::validate(&a, &b, &dst, &cfg),
            Err(GemmError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_reshaped_grid_and_name() {
        let cfg = GemmConfig::reshaped(GpuTarget::Bifrost, 2, 2);
        let reshape = cfg.reshape_info(DataType::F32).unwrap();
        // M = 10, N = 9, K = 3
        let a = TensorInfo::new(reshape.interleaved_shape(&TensorShape::new(&[3, 10])), DataType::F32);
        let b = TensorInfo::new(reshape.transposed_shape(&TensorShape::new(&[9, 3])), DataType::F32);
        let dst = info(&[9, 10]);
        let kernel = MatrixMultiplyKernel::configure(&a, &b, &dst, 1.0, &cfg).unwrap();
        assert_eq!(kernel.grid(), Grid::new(3, 3, 1));
        assert_eq!(kernel.name(), "gemm_mm_interleaved_transposed_f32_bifrost");
    }
}
