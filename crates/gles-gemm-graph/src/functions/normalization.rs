use tracing::debug;

use crate::error::{BackendError, Result};
use crate::layer_info::{NormType, NormalizationLayerInfo};
use crate::tensor::GcTensor;

use super::{check_float, check_same_shape, check_same_type, launch_elements, Function};

/// Local response normalization:
/// `x · (kappa + coeff · Σ x²)^(−beta)` over the window of the norm type.
#[derive(Debug)]
pub struct GcNormalizationLayer {
    input: GcTensor,
    output: GcTensor,
    info: NormalizationLayerInfo,
}

impl GcNormalizationLayer {
    pub fn configure(input: &GcTensor, output: &GcTensor, info: NormalizationLayerInfo) -> Result<Self> {
        check_float(input.info())?;
        check_same_type(input.info(), output.info())?;
        check_same_shape("normalization", input.info(), output.info())?;
        if info.norm_size % 2 == 0 {
            return Err(BackendError::Unsupported(format!(
                "normalization size {} must be odd",
                info.norm_size
            )));
        }
        debug!(norm_type = ?info.norm_type, size = info.norm_size, "configured normalization");

        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            info,
        })
    }
}

impl Function for GcNormalizationLayer {
    fn name(&self) -> &'static str {
        "GCNormalizationLayer"
    }

    fn run(&mut self) {
        let (src, dst) = (self.input.view(), self.output.view());
        let info = self.info;
        let coeff = info.scale_coeff();
        let radius = info.norm_size / 2;
        let shape = *self.input.shape();

        let window = move |centre: usize, extent: usize| centre.saturating_sub(radius)..(centre + radius + 1).min(extent);

        launch_elements("normalization_layer", &shape, move |x, y, z, w| unsafe {
            let square = |x: usize, y: usize, z: usize| {
                let value = src.load_f32(src.offset_4d(x, y, z, w));
                value * value
            };
            let sum: f32 = match info.norm_type {
                NormType::CrossMap => window(z, shape.z()).map(|c| square(x, y, c)).sum(),
                NormType::InMap1D => window(x, shape.x()).map(|i| square(i, y, z)).sum(),
                NormType::InMap2D => window(y, shape.y())
                    .flat_map(|j| window(x, shape.x()).map(move |i| (i, j)))
                    .map(|(i, j)| square(i, j, z))
                    .sum(),
            };
            let value = src.load_f32(src.offset_4d(x, y, z, w));
            let normalized = value * (info.kappa + coeff * sum).powf(-info.beta);
            dst.store_f32(dst.offset_4d(x, y, z, w), normalized);
        });
    }
}
