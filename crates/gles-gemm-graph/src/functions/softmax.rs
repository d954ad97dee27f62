use std::sync::Arc;

use gles_gemm::{launch, DataType, Grid, TensorInfo, TensorShape, TensorView};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::memory::{MemoryGroup, MemoryManager, Slot};
use crate::tensor::GcTensor;

use super::{check_float, check_same_shape, check_same_type, Function};

/// Softmax along x: `exp(beta · (x − max)) / Σ`.
///
/// Runs as three kernels (row max, shifted exponent and sum, normalize) with
/// the per-row max and sum kept in a memory-managed scratch tensor.
#[derive(Debug)]
pub struct GcSoftmaxLayer {
    input: GcTensor,
    output: GcTensor,
    beta: f32,
    memory_group: MemoryGroup,
    stats_slot: Slot,
}

/// Byte offset of the first element of flattened row `row`.
#[inline(always)]
fn row_offset(view: &TensorView, row: usize) -> usize {
    let shape = view.info().shape();
    let (rows_y, rows_z) = (shape.y(), shape.z());
    view.offset_4d(0, row % rows_y, (row / rows_y) % rows_z, row / (rows_y * rows_z))
}

impl GcSoftmaxLayer {
    pub fn configure(
        input: &GcTensor,
        output: &GcTensor,
        beta: f32,
        memory_manager: Option<Arc<MemoryManager>>,
    ) -> Result<Self> {
        check_float(input.info())?;
        check_same_type(input.info(), output.info())?;
        check_same_shape("softmax", input.info(), output.info())?;

        let rows = input.shape().total_size_upper(1);
        let mut memory_group = MemoryGroup::new(memory_manager);
        let stats_slot = memory_group.manage(TensorInfo::new(TensorShape::new(&[2, rows]), DataType::F32));
        debug!(shape = %input.shape(), beta, "configured softmax");

        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            beta,
            memory_group,
            stats_slot,
        })
    }
}

impl Function for GcSoftmaxLayer {
    fn name(&self) -> &'static str {
        "GCSoftmaxLayer"
    }

    #[instrument(name = "GCSoftmaxLayer::run", skip_all)]
    fn run(&mut self) {
        let scope = self.memory_group.acquire();
        let stats = scope.tensor(self.stats_slot).view();
        let (src, dst) = (self.input.view(), self.output.view());
        let beta = self.beta;
        let cols = self.input.shape().x();
        let grid = Grid::new(1, self.input.shape().total_size_upper(1), 1);

        launch("softmax_layer_max", grid, move |[_, row, _]| unsafe {
            let base = row_offset(&src, row);
            let stride = src.info().stride(0);
            let max = (0..cols)
                .map(|i| src.load_f32(base + i * stride))
                .fold(f32::NEG_INFINITY, f32::max);
            stats.store(stats.offset_2d(0, row), max);
        });

        launch("softmax_layer_shift_exp_sum", grid, move |[_, row, _]| unsafe {
            let (src_base, dst_base) = (row_offset(&src, row), row_offset(&dst, row));
            let (src_stride, dst_stride) = (src.info().stride(0), dst.info().stride(0));
            let max: f32 = stats.load(stats.offset_2d(0, row));
            let mut sum = 0.0f32;
            for i in 0..cols {
                let value = ((src.load_f32(src_base + i * src_stride) - max) * beta).exp();
                dst.store_f32(dst_base + i * dst_stride, value);
                sum += value;
            }
            stats.store(stats.offset_2d(1, row), sum);
        });

        launch("softmax_layer_norm", grid, move |[_, row, _]| unsafe {
            let base = row_offset(&dst, row);
            let stride = dst.info().stride(0);
            let sum: f32 = stats.load(stats.offset_2d(1, row));
            for i in 0..cols {
                let offset = base + i * stride;
                dst.store_f32(offset, dst.load_f32(offset) / sum);
            }
        });
    }
}
