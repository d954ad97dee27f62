use gles_gemm::{DataType, Fixed, Qs16, Qs8, TensorView};
use tracing::debug;

use crate::error::{BackendError, Result};
use crate::layer_info::ConvertPolicy;
use crate::tensor::GcTensor;

use super::{check_same_shape, check_same_type, launch_elements, Function};

fn validate_binary(a: &GcTensor, b: &GcTensor, output: &GcTensor) -> Result<()> {
    if matches!(a.data_type(), DataType::S32) {
        return Err(BackendError::UnsupportedDataType(a.data_type()));
    }
    check_same_type(a.info(), b.info())?;
    check_same_type(a.info(), output.info())?;
    check_same_shape("element-wise input", a.info(), b.info())?;
    check_same_shape("element-wise output", a.info(), output.info())?;
    Ok(())
}

#[inline(always)]
unsafe fn load_fixed(view: &TensorView, offset: usize) -> Fixed {
    match view.data_type() {
        DataType::Qs8 { frac_bits } => view.load::<Qs8>(offset).fixed(frac_bits),
        DataType::Qs16 { frac_bits } => view.load::<Qs16>(offset).fixed(frac_bits),
        other => unreachable!("{} is not fixed point", other),
    }
}

#[inline(always)]
unsafe fn store_fixed(view: &TensorView, offset: usize, value: Fixed) {
    match view.data_type() {
        DataType::Qs8 { .. } => view.store(offset, Qs8::from_fixed(value)),
        DataType::Qs16 { .. } => view.store(offset, Qs16::from_fixed(value)),
        other => unreachable!("{} is not fixed point", other),
    }
}

/// `output = a + b`; fixed-point sums wrap or saturate per [`ConvertPolicy`].
#[derive(Debug)]
pub struct GcArithmeticAddition {
    a: GcTensor,
    b: GcTensor,
    output: GcTensor,
    policy: ConvertPolicy,
}

impl GcArithmeticAddition {
    pub fn configure(a: &GcTensor, b: &GcTensor, output: &GcTensor, policy: ConvertPolicy) -> Result<Self> {
        validate_binary(a, b, output)?;
        debug!(shape = %a.shape(), ?policy, "configured arithmetic addition");

        Ok(Self {
            a: a.clone(),
            b: b.clone(),
            output: output.clone(),
            policy,
        })
    }
}

impl Function for GcArithmeticAddition {
    fn name(&self) -> &'static str {
        "GCArithmeticAddition"
    }

    fn run(&mut self) {
        let (a, b, dst) = (self.a.view(), self.b.view(), self.output.view());
        let fixed_point = a.data_type().is_fixed_point();
        let policy = self.policy;

        launch_elements("arithmetic_add", self.a.shape(), move |x, y, z, w| unsafe {
            let (ao, bo, d) = (a.offset_4d(x, y, z, w), b.offset_4d(x, y, z, w), dst.offset_4d(x, y, z, w));
            if fixed_point {
                let (lhs, rhs) = (load_fixed(&a, ao), load_fixed(&b, bo));
                let sum = match policy {
                    ConvertPolicy::Saturate => lhs.saturating_add(rhs),
                    ConvertPolicy::Wrap => lhs.wrapping_add(rhs),
                };
                store_fixed(&dst, d, sum);
            } else {
                dst.store_f32(d, a.load_f32(ao) + b.load_f32(bo));
            }
        });
    }
}

/// `output = a · b · scale`. Fixed-point products saturate and need a
/// scale of 1.
#[derive(Debug)]
pub struct GcPixelWiseMultiplication {
    a: GcTensor,
    b: GcTensor,
    output: GcTensor,
    scale: f32,
}

impl GcPixelWiseMultiplication {
    pub fn configure(a: &GcTensor, b: &GcTensor, output: &GcTensor, scale: f32) -> Result<Self> {
        validate_binary(a, b, output)?;
        if a.data_type().is_fixed_point() && scale != 1.0 {
            return Err(BackendError::Unsupported(format!(
                "fixed-point multiplication with scale {}",
                scale
            )));
        }
        debug!(shape = %a.shape(), scale, "configured pixel-wise multiplication");

        Ok(Self {
            a: a.clone(),
            b: b.clone(),
            output: output.clone(),
            scale,
        })
    }
}

impl Function for GcPixelWiseMultiplication {
    fn name(&self) -> &'static str {
        "GCPixelWiseMultiplication"
    }

    fn run(&mut self) {
        let (a, b, dst) = (self.a.view(), self.b.view(), self.output.view());
        let fixed_point = a.data_type().is_fixed_point();
        let scale = self.scale;

        launch_elements("pixelwise_mul", self.a.shape(), move |x, y, z, w| unsafe {
            let (ao, bo, d) = (a.offset_4d(x, y, z, w), b.offset_4d(x, y, z, w), dst.offset_4d(x, y, z, w));
            if fixed_point {
                store_fixed(&dst, d, load_fixed(&a, ao).saturating_mul(load_fixed(&b, bo)));
            } else {
                dst.store_f32(d, a.load_f32(ao) * b.load_f32(bo) * scale);
            }
        });
    }
}
