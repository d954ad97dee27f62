//! Graph execution context.

use std::collections::HashMap;
use std::sync::Arc;

use gles_gemm::{gpu_target, GpuTarget};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::memory::MemoryManager;
use crate::tensor::Target;

/// Context configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Pool transient buffers across functions.
    pub use_memory_manager: bool,
    /// Device generation; detected from the environment when unset.
    pub gpu_target: Option<GpuTarget>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            use_memory_manager: true,
            gpu_target: None,
        }
    }
}

/// Resources shared by every function created for one graph.
#[derive(Debug)]
pub struct GraphContext {
    config: GraphConfig,
    gpu_target: GpuTarget,
    memory_managers: HashMap<Target, Arc<MemoryManager>>,
}

impl GraphContext {
    pub fn new(config: GraphConfig) -> Self {
        let gpu_target = config.gpu_target.unwrap_or_else(gpu_target);
        let memory_managers = if config.use_memory_manager {
            [Target::Neon, Target::Cl, Target::Gc]
                .into_iter()
                .map(|target| (target, Arc::new(MemoryManager::new())))
                .collect()
        } else {
            HashMap::new()
        };
        debug!(
            %gpu_target,
            memory_manager = config.use_memory_manager,
            parallel = gles_gemm::launch::is_parallel(),
            "created graph context"
        );

        Self {
            config,
            gpu_target,
            memory_managers,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn gpu_target(&self) -> GpuTarget {
        self.gpu_target
    }

    /// Pooled memory manager of `target`, if memory management is enabled.
    pub fn memory_manager(&self, target: Target) -> Option<Arc<MemoryManager>> {
        self.memory_managers.get(&target).cloned()
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

static DEFAULT_CONTEXT: OnceCell<GraphContext> = OnceCell::new();

/// Process-wide context with the default configuration.
pub fn default_context() -> &'static GraphContext {
    DEFAULT_CONTEXT.get_or_init(GraphContext::default)
}
