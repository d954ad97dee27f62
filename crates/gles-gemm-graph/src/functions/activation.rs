use tracing::debug;

use crate::error::Result;
use crate::layer_info::ActivationLayerInfo;
use crate::tensor::GcTensor;

use super::{check_float, check_same_shape, check_same_type, launch_elements, Function};

/// Element-wise activation, optionally in place.
#[derive(Debug)]
pub struct GcActivationLayer {
    input: GcTensor,
    output: Option<GcTensor>,
    info: ActivationLayerInfo,
}

impl GcActivationLayer {
    /// `output` of `None` runs in place on `input`.
    pub fn configure(input: &GcTensor, output: Option<&GcTensor>, info: ActivationLayerInfo) -> Result<Self> {
        check_float(input.info())?;
        if let Some(output) = output {
            check_same_type(input.info(), output.info())?;
            check_same_shape("activation", input.info(), output.info())?;
        }
        debug!(function = ?info.function, shape = %input.shape(), "configured activation");

        Ok(Self {
            input: input.clone(),
            output: output.cloned(),
            info,
        })
    }
}

impl Function for GcActivationLayer {
    fn name(&self) -> &'static str {
        "GCActivationLayer"
    }

    fn run(&mut self) {
        let src = self.input.view();
        let dst = self.output.as_ref().map_or(src, GcTensor::view);
        let info = self.info;

        launch_elements("activation_layer", self.input.shape(), move |x, y, z, w| unsafe {
            let value = src.load_f32(src.offset_4d(x, y, z, w));
            dst.store_f32(dst.offset_4d(x, y, z, w), info.apply(value));
        });
    }
}
