use tracing::debug;

use crate::error::{BackendError, Result};
use crate::layer_info::{PadStrideInfo, PoolingLayerInfo, PoolingType};
use crate::tensor::GcTensor;

use super::{check_float, check_same_type, launch_elements, Function};

/// Max, average or L2 pooling over square windows, or over the whole plane
/// for global pooling.
#[derive(Debug)]
pub struct GcPoolingLayer {
    input: GcTensor,
    output: GcTensor,
    info: PoolingLayerInfo,
}

impl GcPoolingLayer {
    pub fn configure(input: &GcTensor, output: &GcTensor, info: PoolingLayerInfo) -> Result<Self> {
        check_float(input.info())?;
        check_same_type(input.info(), output.info())?;

        let (in_shape, out_shape) = (input.shape(), output.shape());
        let mut info = info;
        if info.is_global {
            if in_shape.x() != in_shape.y() {
                return Err(BackendError::Unsupported(format!(
                    "global pooling over a non-square plane {}",
                    in_shape
                )));
            }
            info.pool_size = in_shape.x();
            info.pad_stride = PadStrideInfo::default();
        }
        if info.pool_size == 0 || info.pad_stride.stride_x == 0 || info.pad_stride.stride_y == 0 {
            return Err(BackendError::Unsupported("empty pooling window".to_string()));
        }
        let pad = info.pad_stride;
        // a window entirely in padding has no elements to average
        if pad.pad_left.max(pad.pad_right) >= info.pool_size
            || pad.pad_top.max(pad.pad_bottom) >= info.pool_size
        {
            return Err(BackendError::Unsupported(format!(
                "padding {:?} covers a whole {}x{} window",
                pad, info.pool_size, info.pool_size
            )));
        }

        let (out_w, out_h) = pad.scaled_dimensions(in_shape.x(), in_shape.y(), info.pool_size, info.pool_size);
        if out_shape.x() != out_w
            || out_shape.y() != out_h
            || out_shape.z() != in_shape.z()
            || out_shape.total_size_upper(3) != in_shape.total_size_upper(3)
        {
            return Err(BackendError::ShapeMismatch(format!(
                "pooling {} -> {}, expected {}x{} planes",
                in_shape, out_shape, out_w, out_h
            )));
        }
        debug!(pool_type = ?info.pool_type, size = info.pool_size, ?pad, "configured pooling");

        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            info,
        })
    }
}

impl Function for GcPoolingLayer {
    fn name(&self) -> &'static str {
        "GCPoolingLayer"
    }

    fn run(&mut self) {
        let (src, dst) = (self.input.view(), self.output.view());
        let info = self.info;
        let pad = info.pad_stride;
        let (width, height) = (self.input.shape().x(), self.input.shape().y());

        launch_elements("pooling_layer", self.output.shape(), move |x, y, z, w| {
            // window in padded coordinates
            let x_start = x * pad.stride_x;
            let y_start = y * pad.stride_y;
            let x_end = (x_start + info.pool_size).min(width + pad.pad_left + pad.pad_right);
            let y_end = (y_start + info.pool_size).min(height + pad.pad_top + pad.pad_bottom);
            let padded_area = (x_end - x_start) * (y_end - y_start);

            let x_range = x_start.max(pad.pad_left) - pad.pad_left..(x_end - pad.pad_left).min(width);
            let y_range = y_start.max(pad.pad_top) - pad.pad_top..(y_end - pad.pad_top).min(height);
            let area = if info.exclude_padding {
                x_range.len() * y_range.len()
            } else {
                padded_area
            };

            let mut acc = match info.pool_type {
                PoolingType::Max => f32::NEG_INFINITY,
                PoolingType::Avg | PoolingType::L2 => 0.0,
            };
            for iy in y_range {
                for ix in x_range.clone() {
                    let value = unsafe { src.load_f32(src.offset_4d(ix, iy, z, w)) };
                    acc = match info.pool_type {
                        PoolingType::Max => acc.max(value),
                        PoolingType::Avg => acc + value,
                        PoolingType::L2 => acc + value * value,
                    };
                }
            }
            let result = match info.pool_type {
                PoolingType::Max => acc,
                PoolingType::Avg => acc / area as f32,
                PoolingType::L2 => (acc / area as f32).sqrt(),
            };
            unsafe { dst.store_f32(dst.offset_4d(x, y, z, w), result) };
        });
    }
}
