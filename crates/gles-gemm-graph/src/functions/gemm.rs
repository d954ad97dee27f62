use std::sync::Arc;

use gles_gemm::{
    default_registry, GemmConfig, GpuTarget, Interleave4x4Kernel, MatrixAdditionKernel, MatrixMultiplyKernel,
    TensorInfo, TensorView, Transpose1xWKernel,
};
use tracing::{debug, instrument};

use crate::error::{BackendError, Result};
use crate::memory::{MemoryGroup, MemoryManager, Slot};
use crate::tensor::GcTensor;

use super::Function;

/// Options of a GEMM function.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GemmInfo {
    /// B is constant: transpose it on the first run only and keep the result.
    pub reshape_b_only_on_first_run: bool,
    /// Kernel configuration; looked up in the default registry when unset.
    pub config: Option<GemmConfig>,
}

#[derive(Debug)]
enum ReshapedB {
    Managed(Slot),
    Persistent { tensor: GcTensor, done: bool },
}

#[derive(Debug)]
struct ReshapeStage {
    interleave: Interleave4x4Kernel,
    transpose: Transpose1xWKernel,
    a_slot: Slot,
    b: ReshapedB,
}

/// The kernel sequence behind every GEMM-based function:
/// optional reshape, multiply, then `dst += beta · C`.
///
/// Works on infos at configure time and on views at run time, so callers can
/// feed it transient tensors.
#[derive(Debug)]
pub(crate) struct GemmPipeline {
    config: GemmConfig,
    reshape: Option<ReshapeStage>,
    multiply: MatrixMultiplyKernel,
    addition: Option<MatrixAdditionKernel>,
    memory_group: MemoryGroup,
}

impl GemmPipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn configure(
        a: &TensorInfo,
        b: &TensorInfo,
        c: Option<&TensorInfo>,
        output: &TensorInfo,
        alpha: f32,
        beta: f32,
        info: GemmInfo,
        memory_manager: Option<Arc<MemoryManager>>,
        gpu_target: GpuTarget,
    ) -> Result<Self> {
        if a.dimension(0) != b.dimension(1) {
            return Err(BackendError::ShapeMismatch(format!(
                "GEMM: A is {} but B is {}",
                a.shape(),
                b.shape()
            )));
        }
        if a.dimension(1) != output.dimension(1) || b.dimension(0) != output.dimension(0) {
            return Err(BackendError::ShapeMismatch(format!(
                "GEMM: output {} for A {} and B {}",
                output.shape(),
                a.shape(),
                b.shape()
            )));
        }

        let data_type = a.data_type();
        let config = info
            .config
            .unwrap_or_else(|| default_registry().lookup(data_type, output.dimension(1), gpu_target));
        let mut memory_group = MemoryGroup::new(memory_manager);

        let (reshape, multiply) = match config.reshape_info(data_type) {
            Some(reshape) => {
                let a_tmp = Interleave4x4Kernel::output_info(a, reshape.mult_interleave_height);
                let b_tmp = Transpose1xWKernel::output_info(b, reshape.mult_transpose_width);
                let interleave = Interleave4x4Kernel::configure(a, &a_tmp, reshape.mult_interleave_height)?;
                let transpose = Transpose1xWKernel::configure(b, &b_tmp, reshape.mult_transpose_width)?;
                let multiply = MatrixMultiplyKernel::configure(&a_tmp, &b_tmp, output, alpha, &config)?;

                let a_slot = memory_group.manage(a_tmp);
                let b = if info.reshape_b_only_on_first_run {
                    ReshapedB::Persistent {
                        tensor: GcTensor::new(b_tmp),
                        done: false,
                    }
                } else {
                    ReshapedB::Managed(memory_group.manage(b_tmp))
                };
                let stage = ReshapeStage {
                    interleave,
                    transpose,
                    a_slot,
                    b,
                };
                (Some(stage), multiply)
            }
            None => (None, MatrixMultiplyKernel::configure(a, b, output, alpha, &config)?),
        };

        let addition = match c {
            Some(c) if beta != 0.0 => Some(MatrixAdditionKernel::configure(c, output, beta)?),
            _ => None,
        };

        debug!(kernel = multiply.name(), ?config, "configured GEMM pipeline");

        Ok(Self {
            config,
            reshape,
            multiply,
            addition,
            memory_group,
        })
    }

    pub(crate) fn config(&self) -> &GemmConfig {
        &self.config
    }

    pub(crate) fn run(&mut self, a: &TensorView, b: &TensorView, c: Option<&TensorView>, dst: &TensorView) {
        let scope = self.memory_group.acquire();

        match &mut self.reshape {
            Some(stage) => {
                let a_tmp = scope.tensor(stage.a_slot);
                stage.interleave.run(a, &a_tmp.view());

                let b_tmp = match &mut stage.b {
                    ReshapedB::Managed(slot) => {
                        let tensor = scope.tensor(*slot);
                        stage.transpose.run(b, &tensor.view());
                        tensor
                    }
                    ReshapedB::Persistent { tensor, done } => {
                        if !*done {
                            stage.transpose.run(b, &tensor.view());
                            *done = true;
                        }
                        tensor.clone()
                    }
                };

                self.multiply.run(&a_tmp.view(), &b_tmp.view(), dst);
            }
            None => self.multiply.run(a, b, dst),
        }

        if let (Some(addition), Some(c)) = (&self.addition, c) {
            addition.run(c, dst);
        }
    }
}

/// `output = alpha · A × B + beta · C`.
///
/// Picks the reshaped or direct kernel path from the registry. Reshape
/// buffers are memory managed.
#[derive(Debug)]
pub struct GcGemm {
    pipeline: GemmPipeline,
    a: GcTensor,
    b: GcTensor,
    c: Option<GcTensor>,
    output: GcTensor,
}

impl GcGemm {
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        a: &GcTensor,
        b: &GcTensor,
        c: Option<&GcTensor>,
        output: &GcTensor,
        alpha: f32,
        beta: f32,
        info: GemmInfo,
        memory_manager: Option<Arc<MemoryManager>>,
        gpu_target: GpuTarget,
    ) -> Result<Self> {
        let pipeline = GemmPipeline::configure(
            a.info(),
            b.info(),
            c.map(GcTensor::info),
            output.info(),
            alpha,
            beta,
            info,
            memory_manager,
            gpu_target,
        )?;

        Ok(Self {
            pipeline,
            a: a.clone(),
            b: b.clone(),
            c: c.cloned(),
            output: output.clone(),
        })
    }

    pub fn config(&self) -> &GemmConfig {
        self.pipeline.config()
    }
}

impl Function for GcGemm {
    fn name(&self) -> &'static str {
        "GCGEMM"
    }

    #[instrument(name = "GCGEMM::run", skip_all)]
    fn run(&mut self) {
        let c = self.c.as_ref().map(GcTensor::view);
        self.pipeline
            .run(&self.a.view(), &self.b.view(), c.as_ref(), &self.output.view());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::{matmul_reference, DataType, Qs8, TensorShape};

    fn matrix(rows: usize, cols: usize, data_type: DataType, values: &[f32]) -> GcTensor {
        GcTensor::from_f32(TensorInfo::new(TensorShape::new(&[cols, rows]), data_type), values).unwrap()
    }

    fn configs() -> Vec<GemmConfig> {
        let mut configs = Vec::new();
        for target in [GpuTarget::Midgard, GpuTarget::Bifrost] {
            configs.push(GemmConfig::reshaped(target, 1, 1));
            configs.push(GemmConfig::reshaped(target, 2, 2));
            configs.push(GemmConfig::direct(target, 2, 4));
        }
        configs
    }

    #[test]
    fn test_alpha_beta_all_paths() {
        let (m, n, k) = (5, 6, 3);
        let a_values: Vec<f32> = (0..m * k).map(|i| i as f32).collect();
        let b_values: Vec<f32> = (0..k * n).map(|i| (i % 4) as f32).collect();
        let c_values: Vec<f32> = (0..m * n).map(|i| i as f32).collect();
        let product = matmul_reference(&a_values, m, k, &b_values, n, 2.0, 0);
        let expected: Vec<f32> = product.iter().zip(&c_values).map(|(p, c)| p + 0.5 * c).collect();

        for config in configs() {
            let a = matrix(m, k, DataType::F32, &a_values);
            let b = matrix(k, n, DataType::F32, &b_values);
            let c = matrix(m, n, DataType::F32, &c_values);
            let output = matrix(m, n, DataType::F32, &vec![0.0; m * n]);
            let info = GemmInfo {
                config: Some(config),
                ..Default::default()
            };
            let mut gemm =
                GcGemm::configure(&a, &b, Some(&c), &output, 2.0, 0.5, info, None, GpuTarget::Midgard).unwrap();
            gemm.run();
            assert_eq!(output.to_f32_vec(), expected, "{:?}", config);
        }
    }

    #[test]
    fn test_reshape_b_only_on_first_run_keeps_weights() {
        let (m, n, k) = (4, 4, 2);
        let a = matrix(m, k, DataType::F32, &[1.0; 8]);
        let b = matrix(k, n, DataType::F32, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let output = matrix(m, n, DataType::F32, &[0.0; 16]);
        let info = GemmInfo {
            reshape_b_only_on_first_run: true,
            config: Some(GemmConfig::reshaped(GpuTarget::Bifrost, 1, 1)),
        };
        let mut gemm = GcGemm::configure(&a, &b, None, &output, 1.0, 0.0, info, None, GpuTarget::Bifrost).unwrap();
        gemm.run();
        assert_eq!(&output.to_f32_vec()[..4], &[6.0, 8.0, 10.0, 12.0]);

        // later changes to B are not picked up
        b.write_f32(&[0.0; 8]).unwrap();
        gemm.run();
        assert_eq!(&output.to_f32_vec()[..4], &[6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn test_memory_managed_runs_reuse_pool() {
        let manager = Arc::new(MemoryManager::new());
        let dt = DataType::Qs8 { frac_bits: 2 };
        let (m, n, k) = (20, 9, 7);
        let a = matrix(m, k, dt, &vec![0.25; m * k]);
        let b = matrix(k, n, dt, &vec![0.5; k * n]);
        let output = matrix(m, n, dt, &vec![0.0; m * n]);
        let info = GemmInfo {
            config: Some(GemmConfig::reshaped(GpuTarget::Bifrost, 1, 2)),
            ..Default::default()
        };
        let mut gemm =
            GcGemm::configure(&a, &b, None, &output, 1.0, 0.0, info, Some(Arc::clone(&manager)), GpuTarget::Bifrost)
                .unwrap();

        gemm.run();
        let allocations = manager.num_allocations();
        assert_eq!(allocations, 2);
        for _ in 0..3 {
            gemm.run();
        }
        assert_eq!(manager.num_allocations(), allocations);

        let expected = matmul_reference(
            &a.to_vec::<Qs8>().unwrap(),
            m,
            k,
            &b.to_vec::<Qs8>().unwrap(),
            n,
            1.0,
            2,
        );
        assert_eq!(output.to_vec::<Qs8>().unwrap(), expected);
    }

    #[test]
    fn test_inner_dimension_mismatch() {
        let a = matrix(2, 3, DataType::F32, &[0.0; 6]);
        let b = matrix(4, 2, DataType::F32, &[0.0; 8]);
        let output = matrix(2, 2, DataType::F32, &[0.0; 4]);
        assert!(matches!(
            GcGemm::configure(&a, &b, None, &output, 1.0, 0.0, GemmInfo::default(), None, GpuTarget::Midgard),
            Err(BackendError::ShapeMismatch(_))
        ));
    }
}
