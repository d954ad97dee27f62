use std::sync::Arc;

use gles_gemm::{launch, GpuTarget, Grid, TensorShape, TransposeKernel};
use tracing::{debug, instrument};

use crate::error::{BackendError, Result};
use crate::memory::MemoryManager;
use crate::tensor::GcTensor;

use super::gemm::{GemmInfo, GemmPipeline};
use super::{check_float, check_same_type, Function};

/// `output = input × weightsᵀ + bias`.
///
/// The input is flattened to one row per batch. Weights are
/// `[num_inputs, num_outputs]` and are transposed into operand B once, on
/// the first run. The bias is added to every output row.
#[derive(Debug)]
pub struct GcFullyConnectedLayer {
    input: GcTensor,
    weights: GcTensor,
    bias: Option<GcTensor>,
    output: GcTensor,
    transpose: TransposeKernel,
    weights_transposed: GcTensor,
    gemm: GemmPipeline,
    prepared: bool,
}

impl GcFullyConnectedLayer {
    pub fn configure(
        input: &GcTensor,
        weights: &GcTensor,
        bias: Option<&GcTensor>,
        output: &GcTensor,
        memory_manager: Option<Arc<MemoryManager>>,
        gpu_target: GpuTarget,
    ) -> Result<Self> {
        check_float(input.info())?;
        check_same_type(input.info(), weights.info())?;
        check_same_type(input.info(), output.info())?;

        let num_outputs = output.shape().x();
        let batches = output.shape().total_size_upper(1);
        let num_inputs = input.shape().total_size() / batches.max(1);
        if weights.shape().x() != num_inputs
            || weights.shape().y() != num_outputs
            || num_inputs * batches != input.shape().total_size()
        {
            return Err(BackendError::ShapeMismatch(format!(
                "fully connected {} x weights {} -> {}",
                input.shape(),
                weights.shape(),
                output.shape()
            )));
        }
        if let Some(bias) = bias {
            check_same_type(input.info(), bias.info())?;
            if bias.shape().total_size() != num_outputs {
                return Err(BackendError::ShapeMismatch(format!(
                    "bias {} for {} outputs",
                    bias.shape(),
                    num_outputs
                )));
            }
        }

        let input_2d = input.reinterpret(TensorShape::new(&[num_inputs, batches]))?;
        let output_2d = output.reinterpret(TensorShape::new(&[num_outputs, batches]))?;
        let weights_transposed_info = TransposeKernel::output_info(weights.info());
        let transpose = TransposeKernel::configure(weights.info(), &weights_transposed_info)?;

        let gemm_info = GemmInfo {
            reshape_b_only_on_first_run: true,
            config: None,
        };
        let gemm = GemmPipeline::configure(
            input_2d.info(),
            &weights_transposed_info,
            None,
            output_2d.info(),
            1.0,
            0.0,
            gemm_info,
            memory_manager,
            gpu_target,
        )?;
        debug!(num_inputs, num_outputs, batches, config = ?gemm.config(), "configured fully connected");

        Ok(Self {
            input: input_2d,
            weights: weights.clone(),
            bias: bias.cloned(),
            output: output_2d,
            transpose,
            weights_transposed: GcTensor::new(weights_transposed_info),
            gemm,
            prepared: false,
        })
    }
}

impl Function for GcFullyConnectedLayer {
    fn name(&self) -> &'static str {
        "GCFullyConnectedLayer"
    }

    fn prepare(&mut self) {
        if !self.prepared {
            self.transpose.run(&self.weights.view(), &self.weights_transposed.view());
            self.prepared = true;
        }
    }

    #[instrument(name = "GCFullyConnectedLayer::run", skip_all)]
    fn run(&mut self) {
        self.prepare();
        self.gemm
            .run(&self.input.view(), &self.weights_transposed.view(), None, &self.output.view());

        if let Some(bias) = &self.bias {
            let (bias, dst) = (bias.view(), self.output.view());
            let shape = *self.output.shape();
            launch("accumulate_biases", Grid::new(shape.x(), shape.y(), 1), move |[x, y, _]| unsafe {
                let offset = dst.offset_2d(x, y);
                dst.store_f32(offset, dst.load_f32(offset) + bias.load_f32(bias.offset_2d(x, 0)));
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::{DataType, TensorInfo};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tensor(dims: &[usize], values: &[f32]) -> GcTensor {
        GcTensor::from_f32(TensorInfo::new(TensorShape::new(dims), DataType::F32), values).unwrap()
    }

    #[test]
    fn test_flattens_4d_input_with_bias() {
        let mut rng = StdRng::seed_from_u64(21);
        let (w, h, c, n, outputs) = (2, 2, 3, 5, 7);
        let inputs = w * h * c;
        let x: Vec<f32> = (0..inputs * n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        let weights: Vec<f32> = (0..inputs * outputs).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        let bias: Vec<f32> = (0..outputs).map(|i| i as f32).collect();

        let input = tensor(&[w, h, c, n], &x);
        let weights_tensor = tensor(&[inputs, outputs], &weights);
        let bias_tensor = tensor(&[outputs], &bias);
        let output = tensor(&[outputs, n], &vec![0.0; outputs * n]);

        for target in [GpuTarget::Midgard, GpuTarget::Bifrost] {
            let manager = Arc::new(MemoryManager::new());
            let mut fc = GcFullyConnectedLayer::configure(
                &input,
                &weights_tensor,
                Some(&bias_tensor),
                &output,
                Some(manager),
                target,
            )
            .unwrap();
            fc.run();
            fc.run();

            let got = output.to_f32_vec();
            for b in 0..n {
                for o in 0..outputs {
                    let want: f32 = bias[o]
                        + (0..inputs)
                            .map(|i| x[b * inputs + i] * weights[o * inputs + i])
                            .sum::<f32>();
                    assert!((got[b * outputs + o] - want).abs() < 1e-4, "{:?} b={} o={}", target, b, o);
                }
            }
        }
    }

    #[test]
    fn test_weight_shape_checked() {
        let input = tensor(&[4, 2], &[0.0; 8]);
        let weights = tensor(&[3, 5], &[0.0; 15]);
        let output = tensor(&[5, 2], &[0.0; 10]);
        assert!(matches!(
            GcFullyConnectedLayer::configure(&input, &weights, None, &output, None, GpuTarget::Midgard),
            Err(BackendError::ShapeMismatch(_))
        ));
    }
}
