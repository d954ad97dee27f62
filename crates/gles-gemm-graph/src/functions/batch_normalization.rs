use tracing::debug;

use crate::error::{BackendError, Result};
use crate::layer_info::ActivationLayerInfo;
use crate::tensor::GcTensor;

use super::{check_float, check_same_shape, check_same_type, launch_elements, Function};

/// `gamma · (x − mean) / sqrt(var + epsilon) + beta` per channel, with an
/// optional fused activation.
///
/// Missing `beta` reads as 0 and missing `gamma` as 1.
#[derive(Debug)]
pub struct GcBatchNormalizationLayer {
    input: GcTensor,
    output: GcTensor,
    mean: GcTensor,
    var: GcTensor,
    beta: Option<GcTensor>,
    gamma: Option<GcTensor>,
    epsilon: f32,
    fused_activation: Option<ActivationLayerInfo>,
}

impl GcBatchNormalizationLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        input: &GcTensor,
        output: &GcTensor,
        mean: &GcTensor,
        var: &GcTensor,
        beta: Option<&GcTensor>,
        gamma: Option<&GcTensor>,
        epsilon: f32,
        fused_activation: Option<ActivationLayerInfo>,
    ) -> Result<Self> {
        check_float(input.info())?;
        check_same_type(input.info(), output.info())?;
        check_same_shape("batch normalization", input.info(), output.info())?;

        let channels = input.shape().z();
        for param in [Some(mean), Some(var), beta, gamma].into_iter().flatten() {
            check_same_type(input.info(), param.info())?;
            if param.shape().total_size() != channels {
                return Err(BackendError::ShapeMismatch(format!(
                    "batch normalization parameter {} for {} channels",
                    param.shape(),
                    channels
                )));
            }
        }
        debug!(shape = %input.shape(), epsilon, "configured batch normalization");

        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            mean: mean.clone(),
            var: var.clone(),
            beta: beta.cloned(),
            gamma: gamma.cloned(),
            epsilon,
            fused_activation,
        })
    }
}

impl Function for GcBatchNormalizationLayer {
    fn name(&self) -> &'static str {
        "GCBatchNormalizationLayer"
    }

    fn run(&mut self) {
        let channels = self.input.shape().z();
        let mean = self.mean.to_f32_vec();
        let var = self.var.to_f32_vec();
        let beta = self.beta.as_ref().map_or_else(|| vec![0.0; channels], GcTensor::to_f32_vec);
        let gamma = self.gamma.as_ref().map_or_else(|| vec![1.0; channels], GcTensor::to_f32_vec);

        // per channel: y = x * scale + shift
        let (scale, shift): (Vec<f32>, Vec<f32>) = (0..channels)
            .map(|c| {
                let scale = gamma[c] / (var[c] + self.epsilon).sqrt();
                (scale, beta[c] - mean[c] * scale)
            })
            .unzip();

        let (src, dst) = (self.input.view(), self.output.view());
        let act = self.fused_activation;
        launch_elements("batchnormalization_layer", self.input.shape(), move |x, y, z, w| unsafe {
            let value = src.load_f32(src.offset_4d(x, y, z, w)) * scale[z] + shift[z];
            let value = act.map_or(value, |act| act.apply(value));
            dst.store_f32(dst.offset_4d(x, y, z, w), value);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::{DataType, TensorInfo, TensorShape};

    fn vector(values: &[f32]) -> GcTensor {
        let info = TensorInfo::new(TensorShape::new(&[values.len()]), DataType::F32);
        GcTensor::from_f32(info, values).unwrap()
    }

    #[test]
    fn test_normalizes_per_channel() {
        let info = TensorInfo::new(TensorShape::new(&[2, 1, 2]), DataType::F32);
        let input = GcTensor::from_f32(info, &[1.0, 3.0, 10.0, 20.0]).unwrap();
        let output = GcTensor::new(info);
        let mean = vector(&[2.0, 15.0]);
        let var = vector(&[4.0, 25.0]);
        let beta = vector(&[0.5, -1.0]);
        let gamma = vector(&[2.0, 1.0]);

        let mut layer =
            GcBatchNormalizationLayer::configure(&input, &output, &mean, &var, Some(&beta), Some(&gamma), 0.0, None)
                .unwrap();
        layer.run();
        assert_eq!(output.to_f32_vec(), vec![-0.5, 1.5, -2.0, 0.0]);
    }

    #[test]
    fn test_defaults_and_fused_relu() {
        let info = TensorInfo::new(TensorShape::new(&[2]), DataType::F16);
        let input = GcTensor::from_f32(info, &[-4.0, 4.0]).unwrap();
        let output = GcTensor::new(info);
        let mean = GcTensor::from_f32(TensorInfo::new(TensorShape::new(&[1]), DataType::F16), &[0.0]).unwrap();
        let var = GcTensor::from_f32(*mean.info(), &[1.0]).unwrap();

        let mut layer = GcBatchNormalizationLayer::configure(
            &input,
            &output,
            &mean,
            &var,
            None,
            None,
            0.0,
            Some(ActivationLayerInfo::relu()),
        )
        .unwrap();
        layer.run();
        assert_eq!(output.to_f32_vec(), vec![0.0, 4.0]);
    }

    #[test]
    fn test_parameter_length_checked() {
        let info = TensorInfo::new(TensorShape::new(&[2, 2, 3]), DataType::F32);
        let t = GcTensor::new(info);
        let short = vector(&[0.0, 1.0]);
        assert!(matches!(
            GcBatchNormalizationLayer::configure(&t, &t, &short, &short, None, None, 1e-3, None),
            Err(BackendError::ShapeMismatch(_))
        ));
    }
}
