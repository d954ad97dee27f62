use std::sync::Arc;

use gles_gemm::{launch, GpuTarget, Grid, TensorInfo, TensorShape, TensorView};
use tracing::{debug, instrument};

use crate::error::{BackendError, Result};
use crate::layer_info::PadStrideInfo;
use crate::memory::{MemoryGroup, MemoryManager, Slot};
use crate::tensor::GcTensor;

use super::gemm::{GemmInfo, GemmPipeline};
use super::{check_float, check_same_type, launch_elements, Function};

/// Weights are `[kernel_w, kernel_h, IFM, OFM]`, bias `[OFM]`, activations
/// `[W, H, C, N]`.
fn validate_convolution(
    input: &TensorInfo,
    weights: &TensorInfo,
    bias: Option<&TensorInfo>,
    output: &TensorInfo,
    info: &PadStrideInfo,
) -> Result<()> {
    check_float(input)?;
    check_same_type(input, weights)?;
    check_same_type(input, output)?;
    if info.stride_x == 0 || info.stride_y == 0 {
        return Err(BackendError::Unsupported("zero convolution stride".to_string()));
    }
    if weights.dimension(2) != input.dimension(2) {
        return Err(BackendError::ShapeMismatch(format!(
            "weights {} for input {}",
            weights.shape(),
            input.shape()
        )));
    }

    let (out_w, out_h) = info.scaled_dimensions(
        input.dimension(0),
        input.dimension(1),
        weights.dimension(0),
        weights.dimension(1),
    );
    let expected = [out_w, out_h, weights.dimension(3), input.shape().total_size_upper(3)];
    let got = [
        output.dimension(0),
        output.dimension(1),
        output.dimension(2),
        output.shape().total_size_upper(3),
    ];
    if expected != got {
        return Err(BackendError::ShapeMismatch(format!(
            "convolution output {}, expected {}x{}x{}x{}",
            output.shape(),
            expected[0],
            expected[1],
            expected[2],
            expected[3]
        )));
    }

    if let Some(bias) = bias {
        check_same_type(input, bias)?;
        if bias.shape().total_size() != weights.dimension(3) {
            return Err(BackendError::ShapeMismatch(format!(
                "bias {} for {} output channels",
                bias.shape(),
                weights.dimension(3)
            )));
        }
    }
    Ok(())
}

/// Input coordinate under the window, or `None` inside the zero padding.
#[inline(always)]
fn source_index(out: usize, stride: usize, tap: usize, pad: usize, extent: usize) -> Option<usize> {
    (out * stride + tap).checked_sub(pad).filter(|&i| i < extent)
}

/// Sliding-window convolution for 1×1, 3×3 and 5×5 kernels.
#[derive(Debug)]
pub struct GcDirectConvolutionLayer {
    input: GcTensor,
    weights: GcTensor,
    bias: Option<GcTensor>,
    output: GcTensor,
    info: PadStrideInfo,
}

impl GcDirectConvolutionLayer {
    pub fn configure(
        input: &GcTensor,
        weights: &GcTensor,
        bias: Option<&GcTensor>,
        output: &GcTensor,
        info: PadStrideInfo,
    ) -> Result<Self> {
        validate_convolution(input.info(), weights.info(), bias.map(GcTensor::info), output.info(), &info)?;
        let (kernel_w, kernel_h) = (weights.shape().x(), weights.shape().y());
        if kernel_w != kernel_h || !matches!(kernel_w, 1 | 3 | 5) {
            return Err(BackendError::Unsupported(format!(
                "direct convolution with a {}x{} kernel",
                kernel_w, kernel_h
            )));
        }
        debug!(input = %input.shape(), weights = %weights.shape(), ?info, "configured direct convolution");

        Ok(Self {
            input: input.clone(),
            weights: weights.clone(),
            bias: bias.cloned(),
            output: output.clone(),
            info,
        })
    }
}

impl Function for GcDirectConvolutionLayer {
    fn name(&self) -> &'static str {
        "GCDirectConvolutionLayer"
    }

    fn run(&mut self) {
        let (src, wei, dst) = (self.input.view(), self.weights.view(), self.output.view());
        let bias = self.bias.as_ref().map(GcTensor::to_f32_vec);
        let info = self.info;
        let (width, height, channels) = (src.info().dimension(0), src.info().dimension(1), src.info().dimension(2));
        let kernel = wei.info().dimension(0);

        launch_elements("direct_convolution", self.output.shape(), move |x, y, ofm, n| {
            let mut acc = bias.as_ref().map_or(0.0, |bias| bias[ofm]);
            for c in 0..channels {
                for ky in 0..kernel {
                    let Some(iy) = source_index(y, info.stride_y, ky, info.pad_top, height) else {
                        continue;
                    };
                    for kx in 0..kernel {
                        let Some(ix) = source_index(x, info.stride_x, kx, info.pad_left, width) else {
                            continue;
                        };
                        unsafe {
                            acc += src.load_f32(src.offset_4d(ix, iy, c, n)) * wei.load_f32(wei.offset_4d(kx, ky, c, ofm));
                        }
                    }
                }
            }
            unsafe { dst.store_f32(dst.offset_4d(x, y, ofm, n), acc) };
        });
    }
}

/// Convolution lowered to a matrix multiply.
///
/// The input is unrolled into one row per output pixel (im2col, columns
/// ordered channel, then kernel row, then kernel column, plus a trailing 1
/// when there is a bias). The weights are reshaped once into a
/// `K × OFM` matrix with the bias as last row and shared by every batch.
/// The GEMM result is scattered back into `[W_out, H_out, OFM, N]`.
#[derive(Debug)]
pub struct GcConvolutionLayer {
    input: GcTensor,
    weights: GcTensor,
    bias: Option<GcTensor>,
    output: GcTensor,
    info: PadStrideInfo,
    weights_reshaped: GcTensor,
    gemm: GemmPipeline,
    memory_group: MemoryGroup,
    im2col_slot: Slot,
    gemm_output_slot: Slot,
    prepared: bool,
}

impl GcConvolutionLayer {
    pub fn configure(
        input: &GcTensor,
        weights: &GcTensor,
        bias: Option<&GcTensor>,
        output: &GcTensor,
        info: PadStrideInfo,
        memory_manager: Option<Arc<MemoryManager>>,
        gpu_target: GpuTarget,
    ) -> Result<Self> {
        validate_convolution(input.info(), weights.info(), bias.map(GcTensor::info), output.info(), &info)?;

        let data_type = input.data_type();
        let w = weights.shape();
        let k = w.x() * w.y() * w.z() + usize::from(bias.is_some());
        let ofm = w.w();
        let patches = output.shape().x() * output.shape().y();
        let batches = input.shape().total_size_upper(3);

        let im2col_info = TensorInfo::new(TensorShape::new(&[k, patches, batches]), data_type);
        let weights_info = TensorInfo::new(TensorShape::new(&[ofm, k]), data_type);
        let gemm_output_info = TensorInfo::new(TensorShape::new(&[ofm, patches, batches]), data_type);

        let gemm_info = GemmInfo {
            reshape_b_only_on_first_run: true,
            config: None,
        };
        let gemm = GemmPipeline::configure(
            &im2col_info,
            &weights_info,
            None,
            &gemm_output_info,
            1.0,
            0.0,
            gemm_info,
            memory_manager.clone(),
            gpu_target,
        )?;

        let mut memory_group = MemoryGroup::new(memory_manager);
        let im2col_slot = memory_group.manage(im2col_info);
        let gemm_output_slot = memory_group.manage(gemm_output_info);

        debug!(
            input = %input.shape(),
            weights = %weights.shape(),
            im2col = %im2col_info.shape(),
            config = ?gemm.config(),
            "configured GEMM convolution"
        );

        Ok(Self {
            input: input.clone(),
            weights: weights.clone(),
            bias: bias.cloned(),
            output: output.clone(),
            info,
            weights_reshaped: GcTensor::new(weights_info),
            gemm,
            memory_group,
            im2col_slot,
            gemm_output_slot,
            prepared: false,
        })
    }

    fn im2col(&self, dst: &TensorView) {
        let src = self.input.view();
        let info = self.info;
        let (width, height, channels) = (src.info().dimension(0), src.info().dimension(1), src.info().dimension(2));
        let (kernel_w, kernel_h) = (self.weights.shape().x(), self.weights.shape().y());
        let out_w = self.output.shape().x();
        let has_bias = self.bias.is_some();
        let dst = *dst;
        let grid = Grid::new(1, dst.info().dimension(1), dst.info().dimension(2));

        launch("im2col", grid, move |[_, patch, n]| {
            let (x, y) = (patch % out_w, patch / out_w);
            let mut col = 0;
            for c in 0..channels {
                for ky in 0..kernel_h {
                    let iy = source_index(y, info.stride_y, ky, info.pad_top, height);
                    for kx in 0..kernel_w {
                        let ix = source_index(x, info.stride_x, kx, info.pad_left, width);
                        let value = match (ix, iy) {
                            (Some(ix), Some(iy)) => unsafe { src.load_f32(src.offset_4d(ix, iy, c, n)) },
                            _ => 0.0,
                        };
                        unsafe { dst.store_f32(dst.offset_3d(col, patch, n), value) };
                        col += 1;
                    }
                }
            }
            if has_bias {
                unsafe { dst.store_f32(dst.offset_3d(col, patch, n), 1.0) };
            }
        });
    }
}

impl Function for GcConvolutionLayer {
    fn name(&self) -> &'static str {
        "GCConvolutionLayer"
    }

    fn prepare(&mut self) {
        if self.prepared {
            return;
        }
        let (wei, dst) = (self.weights.view(), self.weights_reshaped.view());
        let w = *self.weights.shape();
        let bias = self.bias.as_ref().map(GcTensor::to_f32_vec);
        let taps = w.x() * w.y() * w.z();

        launch("reshape_weights", Grid::new(w.w(), 1, 1), move |[ofm, _, _]| {
            let mut row = 0;
            for c in 0..w.z() {
                for ky in 0..w.y() {
                    for kx in 0..w.x() {
                        unsafe {
                            let value = wei.load_f32(wei.offset_4d(kx, ky, c, ofm));
                            dst.store_f32(dst.offset_2d(ofm, row), value);
                        }
                        row += 1;
                    }
                }
            }
            if let Some(bias) = &bias {
                unsafe { dst.store_f32(dst.offset_2d(ofm, taps), bias[ofm]) };
            }
        });
        self.prepared = true;
    }

    #[instrument(name = "GCConvolutionLayer::run", skip_all)]
    fn run(&mut self) {
        self.prepare();

        let scope = self.memory_group.acquire();
        let im2col = scope.tensor(self.im2col_slot);
        let gemm_output = scope.tensor(self.gemm_output_slot);

        self.im2col(&im2col.view());
        self.gemm
            .run(&im2col.view(), &self.weights_reshaped.view(), None, &gemm_output.view());

        let (src, dst) = (gemm_output.view(), self.output.view());
        let out_w = self.output.shape().x();
        launch_elements("col2im", self.output.shape(), move |x, y, ofm, n| unsafe {
            let value = src.load_f32(src.offset_3d(ofm, y * out_w + x, n));
            dst.store_f32(dst.offset_4d(x, y, ofm, n), value);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::DataType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tensor(dims: &[usize], values: &[f32]) -> GcTensor {
        GcTensor::from_f32(TensorInfo::new(TensorShape::new(dims), DataType::F32), values).unwrap()
    }

    fn random(rng: &mut StdRng, len: usize) -> Vec<f32> {
        (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }

    #[test]
    fn test_direct_3x3_with_padding() {
        // 3x3 single-channel input, all-ones kernel: each output sums its
        // in-range neighbourhood
        let input = tensor(&[3, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let weights = tensor(&[3, 3], &[1.0; 9]);
        let bias = tensor(&[1], &[0.5]);
        let output = tensor(&[3, 3], &[0.0; 9]);

        let mut conv =
            GcDirectConvolutionLayer::configure(&input, &weights, Some(&bias), &output, PadStrideInfo::new(1, 1, 1, 1))
                .unwrap();
        conv.run();
        assert_eq!(
            output.to_f32_vec(),
            vec![12.5, 21.5, 16.5, 27.5, 45.5, 33.5, 24.5, 39.5, 28.5]
        );
    }

    #[test]
    fn test_direct_rejects_even_kernel() {
        let input = tensor(&[4, 4], &[0.0; 16]);
        let weights = tensor(&[2, 2], &[0.0; 4]);
        let output = tensor(&[3, 3], &[0.0; 9]);
        assert!(matches!(
            GcDirectConvolutionLayer::configure(&input, &weights, None, &output, PadStrideInfo::default()),
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn test_gemm_matches_direct() {
        let mut rng = StdRng::seed_from_u64(3);
        let (w, h, ifm, ofm, n) = (7, 6, 3, 5, 2);
        let info = PadStrideInfo::new(2, 1, 1, 1);
        let (out_w, out_h) = info.scaled_dimensions(w, h, 3, 3);

        let input = tensor(&[w, h, ifm, n], &random(&mut rng, w * h * ifm * n));
        let weights = tensor(&[3, 3, ifm, ofm], &random(&mut rng, 9 * ifm * ofm));
        let bias = tensor(&[ofm], &random(&mut rng, ofm));
        let direct_out = tensor(&[out_w, out_h, ofm, n], &vec![0.0; out_w * out_h * ofm * n]);
        let gemm_out = tensor(&[out_w, out_h, ofm, n], &vec![0.0; out_w * out_h * ofm * n]);

        let mut direct = GcDirectConvolutionLayer::configure(&input, &weights, Some(&bias), &direct_out, info).unwrap();
        direct.run();

        for target in [GpuTarget::Midgard, GpuTarget::Bifrost] {
            let manager = Arc::new(MemoryManager::new());
            let mut conv = GcConvolutionLayer::configure(
                &input,
                &weights,
                Some(&bias),
                &gemm_out,
                info,
                Some(Arc::clone(&manager)),
                target,
            )
            .unwrap();
            conv.run();
            let allocations = manager.num_allocations();
            conv.run();
            assert_eq!(manager.num_allocations(), allocations);

            for (got, want) in gemm_out.to_f32_vec().iter().zip(direct_out.to_f32_vec()) {
                assert!((got - want).abs() < 1e-4, "{:?}: {} vs {}", target, got, want);
            }
        }
    }

    #[test]
    fn test_output_shape_checked() {
        let input = tensor(&[5, 5], &[0.0; 25]);
        let weights = tensor(&[3, 3], &[0.0; 9]);
        let output = tensor(&[5, 5], &[0.0; 25]);
        assert!(matches!(
            GcConvolutionLayer::configure(&input, &weights, None, &output, PadStrideInfo::default(), None, GpuTarget::Midgard),
            Err(BackendError::ShapeMismatch(_))
        ));
    }
}
