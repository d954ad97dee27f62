//! Tuning table for the multiply kernels.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::core::{ReshapeInfo, TileShape};
use crate::types::{DataType, ElementKind};

use super::detect::GpuTarget;

/// Environment variable forcing the reshaped path for every problem size.
pub const FORCE_RESHAPE_ENV: &str = "GLES_GEMM_FORCE_RESHAPE";

/// Problems with at most this many output rows use the direct kernel.
pub const SMALL_M_THRESHOLD: usize = 16;

/// Size bucket of a multiply problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeClass {
    /// Few output rows (matrix-vector style, fully connected at batch 1).
    Small,
    Large,
}

impl ShapeClass {
    pub fn classify(m: usize) -> Self {
        if m <= SMALL_M_THRESHOLD {
            ShapeClass::Small
        } else {
            ShapeClass::Large
        }
    }
}

/// Which multiply kernel to run and how its operands are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GemmPath {
    /// Interleave A, transpose B, then run the 4×W reshaped kernel.
    Reshaped {
        mult_transpose_width: usize,
        mult_interleave_height: usize,
    },
    /// Run the direct kernel on untouched operands.
    Direct(TileShape),
}

/// Resolved tuning for one multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmConfig {
    pub target: GpuTarget,
    pub path: GemmPath,
}

impl GemmConfig {
    pub fn reshaped(target: GpuTarget, mult_transpose_width: usize, mult_interleave_height: usize) -> Self {
        Self {
            target,
            path: GemmPath::Reshaped {
                mult_transpose_width,
                mult_interleave_height,
            },
        }
    }

    pub fn direct(target: GpuTarget, rows: usize, cols: usize) -> Self {
        Self {
            target,
            path: GemmPath::Direct(TileShape::new(rows, cols)),
        }
    }

    pub fn is_reshaped(&self) -> bool {
        matches!(self.path, GemmPath::Reshaped { .. })
    }

    /// Reshape layout for `data_type`, if this config takes the reshaped path.
    pub fn reshape_info(&self, data_type: DataType) -> Option<ReshapeInfo> {
        match self.path {
            GemmPath::Reshaped {
                mult_transpose_width,
                mult_interleave_height,
            } => Some(ReshapeInfo::new(data_type, mult_transpose_width, mult_interleave_height)),
            GemmPath::Direct(_) => None,
        }
    }
}

type RegistryKey = (ElementKind, ShapeClass, GpuTarget);

/// Table of [`GemmPath`]s keyed by element kind, shape class and target.
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    entries: HashMap<RegistryKey, GemmPath>,
    force_reshape: bool,
}

impl KernelRegistry {
    /// An empty registry. Lookups fall back to the reshaped path with unit
    /// multiplicities.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            force_reshape: false,
        }
    }

    /// The built-in table.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for kind in [ElementKind::F32, ElementKind::F16, ElementKind::Qs8, ElementKind::Qs16] {
            let w = kind.vector_width();

            registry.insert(
                kind,
                ShapeClass::Small,
                GpuTarget::Midgard,
                GemmPath::Direct(TileShape::new(2, w)),
            );
            registry.insert(
                kind,
                ShapeClass::Large,
                GpuTarget::Midgard,
                GemmPath::Reshaped {
                    mult_transpose_width: 1,
                    mult_interleave_height: 1,
                },
            );

            registry.insert(
                kind,
                ShapeClass::Small,
                GpuTarget::Bifrost,
                GemmPath::Direct(TileShape::new(4, w)),
            );
            let mult_transpose_width = if kind == ElementKind::F32 { 2 } else { 1 };
            registry.insert(
                kind,
                ShapeClass::Large,
                GpuTarget::Bifrost,
                GemmPath::Reshaped {
                    mult_transpose_width,
                    mult_interleave_height: 2,
                },
            );
        }
        registry
    }

    pub fn insert(&mut self, kind: ElementKind, class: ShapeClass, target: GpuTarget, path: GemmPath) {
        self.entries.insert((kind, class, target), path);
    }

    /// Always take the reshaped path, whatever the problem size.
    pub fn force_reshape(mut self, force: bool) -> Self {
        self.force_reshape = force;
        self
    }

    /// Resolve the config for an M-row multiply of `data_type` on `target`.
    pub fn lookup(&self, data_type: DataType, m: usize, target: GpuTarget) -> GemmConfig {
        let kind = data_type.kind();
        let class = if self.force_reshape {
            ShapeClass::Large
        } else {
            ShapeClass::classify(m)
        };

        let path = self
            .entries
            .get(&(kind, class, target))
            .or_else(|| self.entries.get(&(kind, ShapeClass::Large, target)))
            .copied()
            .unwrap_or(GemmPath::Reshaped {
                mult_transpose_width: 1,
                mult_interleave_height: 1,
            });

        debug!(data_type = %data_type, m, target = %target, ?class, ?path, "resolved gemm config");
        GemmConfig { target, path }
    }
}

impl Default for KernelRegistry {
    /// The built-in table, honouring `GLES_GEMM_FORCE_RESHAPE`.
    fn default() -> Self {
        let force = std::env::var(FORCE_RESHAPE_ENV)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);
        Self::with_defaults().force_reshape(force)
    }
}

static DEFAULT_REGISTRY: Lazy<KernelRegistry> = Lazy::new(KernelRegistry::default);

/// The process-wide registry, built on first use.
pub fn default_registry() -> &'static KernelRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let registry = KernelRegistry::with_defaults();

        let cfg = registry.lookup(DataType::F32, 4, GpuTarget::Bifrost);
        assert_eq!(cfg.path, GemmPath::Direct(TileShape::new(4, 4)));

        let cfg = registry.lookup(DataType::F32, 64, GpuTarget::Bifrost);
        assert_eq!(cfg.reshape_info(DataType::F32), Some(ReshapeInfo::new(DataType::F32, 2, 2)));

        let cfg = registry.lookup(DataType::F16, 64, GpuTarget::Bifrost);
        assert_eq!(cfg.reshape_info(DataType::F16), Some(ReshapeInfo::new(DataType::F16, 1, 2)));

        let cfg = registry.lookup(DataType::Qs8 { frac_bits: 4 }, 8, GpuTarget::Midgard);
        assert_eq!(cfg.path, GemmPath::Direct(TileShape::new(2, 16)));

        let cfg = registry.lookup(DataType::Qs16 { frac_bits: 4 }, 17, GpuTarget::Midgard);
        assert!(cfg.is_reshaped());
    }

    #[test]
    fn test_force_reshape() {
        let registry = KernelRegistry::with_defaults().force_reshape(true);
        assert!(registry.lookup(DataType::F32, 1, GpuTarget::Midgard).is_reshaped());
    }

    #[test]
    fn test_empty_registry_falls_back_to_reshaped() {
        let registry = KernelRegistry::empty();
        let cfg = registry.lookup(DataType::F16, 2, GpuTarget::Bifrost);
        assert_eq!(cfg, GemmConfig::reshaped(GpuTarget::Bifrost, 1, 1));
    }
}
