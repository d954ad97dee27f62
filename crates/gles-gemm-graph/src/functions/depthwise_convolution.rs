use tracing::debug;

use crate::error::{BackendError, Result};
use crate::layer_info::PadStrideInfo;
use crate::tensor::GcTensor;

use super::{check_float, check_same_type, launch_elements, Function};

/// Per-channel 3×3 convolution. Weights are `[3, 3, C]`, bias `[C]`.
#[derive(Debug)]
pub struct GcDepthwiseConvolutionLayer3x3 {
    input: GcTensor,
    weights: GcTensor,
    bias: Option<GcTensor>,
    output: GcTensor,
    info: PadStrideInfo,
}

impl GcDepthwiseConvolutionLayer3x3 {
    pub fn configure(
        input: &GcTensor,
        weights: &GcTensor,
        bias: Option<&GcTensor>,
        output: &GcTensor,
        info: PadStrideInfo,
    ) -> Result<Self> {
        check_float(input.info())?;
        check_same_type(input.info(), weights.info())?;
        check_same_type(input.info(), output.info())?;
        if weights.shape().x() != 3 || weights.shape().y() != 3 {
            return Err(BackendError::Unsupported(format!(
                "depthwise 3x3 convolution with weights {}",
                weights.shape()
            )));
        }
        if info.stride_x == 0 || info.stride_y == 0 {
            return Err(BackendError::Unsupported("zero convolution stride".to_string()));
        }

        let (input_shape, output_shape) = (input.shape(), output.shape());
        let channels = input_shape.z();
        let (out_w, out_h) = info.scaled_dimensions(input_shape.x(), input_shape.y(), 3, 3);
        if weights.shape().z() != channels
            || output_shape.x() != out_w
            || output_shape.y() != out_h
            || output_shape.z() != channels
            || output_shape.total_size_upper(3) != input_shape.total_size_upper(3)
        {
            return Err(BackendError::ShapeMismatch(format!(
                "depthwise convolution {} * {} -> {}",
                input_shape,
                weights.shape(),
                output_shape
            )));
        }
        if let Some(bias) = bias {
            check_same_type(input.info(), bias.info())?;
            if bias.shape().total_size() != channels {
                return Err(BackendError::ShapeMismatch(format!(
                    "bias {} for {} channels",
                    bias.shape(),
                    channels
                )));
            }
        }
        debug!(input = %input_shape, ?info, "configured depthwise convolution 3x3");

        Ok(Self {
            input: input.clone(),
            weights: weights.clone(),
            bias: bias.cloned(),
            output: output.clone(),
            info,
        })
    }
}

impl Function for GcDepthwiseConvolutionLayer3x3 {
    fn name(&self) -> &'static str {
        "GCDepthwiseConvolutionLayer3x3"
    }

    fn run(&mut self) {
        let (src, wei, dst) = (self.input.view(), self.weights.view(), self.output.view());
        let bias = self.bias.as_ref().map(GcTensor::to_f32_vec);
        let info = self.info;
        let (width, height) = (src.info().dimension(0), src.info().dimension(1));

        launch_elements("depthwise_convolution_3x3", self.output.shape(), move |x, y, c, n| {
            let mut acc = bias.as_ref().map_or(0.0, |bias| bias[c]);
            for ky in 0..3 {
                let iy = (y * info.stride_y + ky).checked_sub(info.pad_top);
                let Some(iy) = iy.filter(|&iy| iy < height) else {
                    continue;
                };
                for kx in 0..3 {
                    let ix = (x * info.stride_x + kx).checked_sub(info.pad_left);
                    let Some(ix) = ix.filter(|&ix| ix < width) else {
                        continue;
                    };
                    unsafe {
                        acc += src.load_f32(src.offset_4d(ix, iy, c, n)) * wei.load_f32(wei.offset_3d(kx, ky, c));
                    }
                }
            }
            unsafe { dst.store_f32(dst.offset_4d(x, y, c, n), acc) };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::{DataType, TensorInfo, TensorShape};

    fn tensor(dims: &[usize], values: &[f32]) -> GcTensor {
        GcTensor::from_f32(TensorInfo::new(TensorShape::new(dims), DataType::F32), values).unwrap()
    }

    #[test]
    fn test_channels_are_independent() {
        // channel 0 all ones, channel 1 all twos; centre-tap filter on c0,
        // box filter on c1
        let mut input = vec![1.0; 9];
        input.extend([2.0; 9]);
        let input = tensor(&[3, 3, 2], &input);
        let mut weights = vec![0.0; 9];
        weights[4] = 3.0;
        weights.extend([1.0; 9]);
        let weights = tensor(&[3, 3, 2], &weights);
        let bias = tensor(&[2], &[0.0, 1.0]);
        let output = tensor(&[1, 1, 2], &[0.0; 2]);

        let mut layer =
            GcDepthwiseConvolutionLayer3x3::configure(&input, &weights, Some(&bias), &output, PadStrideInfo::default())
                .unwrap();
        layer.run();
        assert_eq!(output.to_f32_vec(), vec![3.0, 19.0]);
    }

    #[test]
    fn test_stride_and_padding() {
        let input = tensor(&[4, 4], &(0..16).map(|i| i as f32).collect::<Vec<_>>());
        let weights = tensor(&[3, 3], &[1.0; 9]);
        let info = PadStrideInfo::new(2, 2, 1, 1);
        let output = tensor(&[2, 2], &[0.0; 4]);

        let mut layer = GcDepthwiseConvolutionLayer3x3::configure(&input, &weights, None, &output, info).unwrap();
        layer.run();
        // windows centred on (0,0), (2,0), (0,2), (2,2)
        assert_eq!(output.to_f32_vec(), vec![10.0, 24.0, 51.0, 90.0]);
    }

    #[test]
    fn test_rejects_5x5_weights() {
        let input = tensor(&[5, 5], &[0.0; 25]);
        let weights = tensor(&[5, 5], &[0.0; 25]);
        let output = tensor(&[1, 1], &[0.0]);
        assert!(GcDepthwiseConvolutionLayer3x3::configure(&input, &weights, None, &output, PadStrideInfo::default())
            .is_err());
    }
}
