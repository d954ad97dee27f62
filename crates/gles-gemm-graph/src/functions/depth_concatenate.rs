use gles_gemm::TensorView;
use tracing::debug;

use crate::error::{BackendError, Result};
use crate::tensor::GcTensor;

use super::{check_same_type, launch_elements, Function};

/// Stacks its inputs along z.
///
/// Each input is centred in x/y within the output; when any input is
/// smaller than the output the output is zeroed first.
#[derive(Debug)]
pub struct GcDepthConcatenateLayer {
    inputs: Vec<GcTensor>,
    output: GcTensor,
    needs_fill: bool,
}

impl GcDepthConcatenateLayer {
    pub fn configure(inputs: &[GcTensor], output: &GcTensor) -> Result<Self> {
        if inputs.is_empty() {
            return Err(BackendError::Unsupported("depth concatenate without inputs".to_string()));
        }

        let out = output.shape();
        let mut depth = 0;
        let mut needs_fill = false;
        for input in inputs {
            check_same_type(input.info(), output.info())?;
            let shape = input.shape();
            if shape.x() > out.x()
                || shape.y() > out.y()
                || shape.total_size_upper(3) != out.total_size_upper(3)
            {
                return Err(BackendError::ShapeMismatch(format!(
                    "cannot centre {} in {}",
                    shape, out
                )));
            }
            needs_fill |= shape.x() != out.x() || shape.y() != out.y();
            depth += shape.z();
        }
        if depth != out.z() {
            return Err(BackendError::ShapeMismatch(format!(
                "inputs stack to depth {}, output is {}",
                depth, out
            )));
        }
        debug!(inputs = inputs.len(), output = %out, "configured depth concatenate");

        Ok(Self {
            inputs: inputs.to_vec(),
            output: output.clone(),
            needs_fill,
        })
    }
}

unsafe fn copy_element(src: &TensorView, src_offset: usize, dst: &TensorView, dst_offset: usize, size: usize) {
    std::ptr::copy_nonoverlapping(src.ptr_at(src_offset), dst.ptr_at(dst_offset), size);
}

impl Function for GcDepthConcatenateLayer {
    fn name(&self) -> &'static str {
        "GCDepthConcatenateLayer"
    }

    fn run(&mut self) {
        let dst = self.output.view();
        let size = self.output.info().element_size();

        if self.needs_fill {
            launch_elements("fill_border", self.output.shape(), move |x, y, z, w| unsafe {
                std::ptr::write_bytes(dst.ptr_at(dst.offset_4d(x, y, z, w)), 0, size);
            });
        }

        let mut depth_offset = 0;
        for input in &self.inputs {
            let src = input.view();
            let shape = input.shape();
            let left = (self.output.shape().x() - shape.x()) / 2;
            let top = (self.output.shape().y() - shape.y()) / 2;
            let z0 = depth_offset;

            launch_elements("concatenate_depth", shape, move |x, y, z, w| unsafe {
                copy_element(
                    &src,
                    src.offset_4d(x, y, z, w),
                    &dst,
                    dst.offset_4d(x + left, y + top, z + z0, w),
                    size,
                );
            });
            depth_offset += shape.z();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::{DataType, Qs16, TensorInfo, TensorShape};

    #[test]
    fn test_centres_smaller_input() {
        let dt = DataType::F32;
        let big = GcTensor::from_f32(TensorInfo::new(TensorShape::new(&[3, 3]), dt), &[1.0; 9]).unwrap();
        let small = GcTensor::from_f32(TensorInfo::new(TensorShape::new(&[1, 1]), dt), &[7.0]).unwrap();
        let output = GcTensor::from_f32(TensorInfo::new(TensorShape::new(&[3, 3, 2]), dt), &[9.0; 18]).unwrap();

        let mut layer = GcDepthConcatenateLayer::configure(&[big, small], &output).unwrap();
        layer.run();

        let values = output.to_f32_vec();
        assert_eq!(&values[..9], &[1.0; 9]);
        assert_eq!(&values[9..], &[0.0, 0.0, 0.0, 0.0, 7.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fixed_point_copied_raw() {
        let dt = DataType::Qs16 { frac_bits: 9 };
        let a = GcTensor::from_slice(TensorInfo::new(TensorShape::new(&[2, 1, 1]), dt), &[Qs16(1), Qs16(2)]).unwrap();
        let b = GcTensor::from_slice(TensorInfo::new(TensorShape::new(&[2, 1, 2]), dt), &[Qs16(3), Qs16(4), Qs16(5), Qs16(6)])
            .unwrap();
        let output = GcTensor::new(TensorInfo::new(TensorShape::new(&[2, 1, 3]), dt));

        let mut layer = GcDepthConcatenateLayer::configure(&[a, b], &output).unwrap();
        layer.run();
        assert_eq!(
            output.to_vec::<Qs16>().unwrap(),
            vec![Qs16(1), Qs16(2), Qs16(3), Qs16(4), Qs16(5), Qs16(6)]
        );
    }

    #[test]
    fn test_depth_must_add_up() {
        let dt = DataType::F16;
        let a = GcTensor::new(TensorInfo::new(TensorShape::new(&[2, 2, 1]), dt));
        let output = GcTensor::new(TensorInfo::new(TensorShape::new(&[2, 2, 2]), dt));
        assert!(matches!(
            GcDepthConcatenateLayer::configure(&[a], &output),
            Err(BackendError::ShapeMismatch(_))
        ));
    }
}
