//! GPU generation detection.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::GemmError;

/// Environment variable overriding the detected target.
///
/// Accepts a generation name (`midgard`, `bifrost`) or a GPU name such as
/// `Mali-G71`.
pub const TARGET_ENV: &str = "GLES_GEMM_TARGET";

/// Mali GPU generation the kernels are scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum GpuTarget {
    /// Mali-T6xx/T7xx/T8xx. Vector ALUs, separate multiply and add.
    #[default]
    Midgard,
    /// Mali-G5x/G7x. Scalar quad-based ALUs with fused multiply-add.
    Bifrost,
}

impl GpuTarget {
    /// Parse a renderer string such as `"Mali-T860"` or `"ARM Mali-G71 MP8"`.
    pub fn from_gpu_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let model = &upper[upper.find("MALI-")? + "MALI-".len()..];
        match model.chars().next()? {
            'T' => Some(GpuTarget::Midgard),
            'G' => Some(GpuTarget::Bifrost),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GpuTarget::Midgard => "Midgard",
            GpuTarget::Bifrost => "Bifrost",
        }
    }
}

impl fmt::Display for GpuTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GpuTarget {
    type Err = GemmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "midgard" => Ok(GpuTarget::Midgard),
            "bifrost" => Ok(GpuTarget::Bifrost),
            other => GpuTarget::from_gpu_name(other).ok_or_else(|| {
                GemmError::InvalidConfig(format!("unknown GPU target '{}'", s))
            }),
        }
    }
}

static DETECTED: Lazy<GpuTarget> = Lazy::new(|| {
    let target = std::env::var(TARGET_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    debug!(target = %target, "detected GPU target");
    target
});

/// The target for this process: `GLES_GEMM_TARGET` if set and valid,
/// otherwise Midgard. Read once and cached.
pub fn gpu_target() -> GpuTarget {
    *DETECTED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gpu_name() {
        assert_eq!(GpuTarget::from_gpu_name("Mali-T860"), Some(GpuTarget::Midgard));
        assert_eq!(
            GpuTarget::from_gpu_name("ARM Mali-G71 MP8"),
            Some(GpuTarget::Bifrost)
        );
        assert_eq!(GpuTarget::from_gpu_name("Adreno 540"), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("bifrost".parse::<GpuTarget>().unwrap(), GpuTarget::Bifrost);
        assert_eq!(" Midgard ".parse::<GpuTarget>().unwrap(), GpuTarget::Midgard);
        assert_eq!("mali-g72".parse::<GpuTarget>().unwrap(), GpuTarget::Bifrost);
        assert!("volta".parse::<GpuTarget>().is_err());
    }
}
