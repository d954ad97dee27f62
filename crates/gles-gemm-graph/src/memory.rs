//! Pooled memory for transient tensors.
//!
//! Functions that need scratch tensors (reshaped GEMM operands, im2col
//! buffers, intermediate outputs) declare them on a [`MemoryGroup`] at
//! configure time. On every run the group acquires backing buffers from the
//! shared [`MemoryManager`] and hands them back when the run ends, so the
//! same few allocations serve every function of a graph.

use std::sync::{Arc, Mutex, MutexGuard};

use gles_gemm::TensorInfo;
use tracing::trace;

use crate::tensor::{GcBuffer, GcTensor};

#[derive(Debug, Default)]
struct Pool {
    free: Vec<Arc<GcBuffer>>,
    allocations: usize,
}

/// Thread-safe pool of GC buffers.
#[derive(Debug, Default)]
pub struct MemoryManager {
    pool: Mutex<Pool>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the smallest free buffer of at least `size` bytes, allocating a
    /// new one when none fits.
    pub fn acquire(&self, size: usize) -> Arc<GcBuffer> {
        let mut pool = self.pool();
        let best = pool
            .free
            .iter()
            .enumerate()
            .filter(|(_, buffer)| buffer.len() >= size)
            .min_by_key(|(_, buffer)| buffer.len())
            .map(|(i, _)| i);

        match best {
            Some(i) => pool.free.swap_remove(i),
            None => {
                pool.allocations += 1;
                trace!(size, allocations = pool.allocations, "allocating pooled buffer");
                Arc::new(GcBuffer::zeroed(size))
            }
        }
    }

    /// Return a buffer to the pool.
    pub fn release(&self, buffer: Arc<GcBuffer>) {
        self.pool().free.push(buffer);
    }

    /// Buffers allocated since the manager was created.
    pub fn num_allocations(&self) -> usize {
        self.pool().allocations
    }

    /// Buffers currently sitting in the pool.
    pub fn num_free(&self) -> usize {
        self.pool().free.len()
    }
}

/// Handle to a tensor managed by a [`MemoryGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

/// Transient tensors of one function.
///
/// Without a manager every managed tensor gets its own allocation up front
/// and keeps it for the life of the group.
#[derive(Debug)]
pub struct MemoryGroup {
    manager: Option<Arc<MemoryManager>>,
    infos: Vec<TensorInfo>,
    owned: Vec<Arc<GcBuffer>>,
}

impl MemoryGroup {
    pub fn new(manager: Option<Arc<MemoryManager>>) -> Self {
        Self {
            manager,
            infos: Vec::new(),
            owned: Vec::new(),
        }
    }

    pub fn is_managed(&self) -> bool {
        self.manager.is_some()
    }

    /// Register a transient tensor.
    pub fn manage(&mut self, info: TensorInfo) -> Slot {
        if self.manager.is_none() {
            self.owned.push(Arc::new(GcBuffer::zeroed(info.total_size())));
        }
        self.infos.push(info);
        Slot(self.infos.len() - 1)
    }

    pub fn info(&self, slot: Slot) -> &TensorInfo {
        &self.infos[slot.0]
    }

    /// Back every managed tensor for the duration of the returned scope.
    pub fn acquire(&self) -> MemoryScope<'_> {
        let buffers = match &self.manager {
            Some(manager) => self
                .infos
                .iter()
                .map(|info| manager.acquire(info.total_size()))
                .collect(),
            None => self.owned.clone(),
        };
        MemoryScope {
            group: self,
            buffers,
        }
    }
}

/// Buffers backing a [`MemoryGroup`] during one run.
#[derive(Debug)]
pub struct MemoryScope<'a> {
    group: &'a MemoryGroup,
    buffers: Vec<Arc<GcBuffer>>,
}

impl MemoryScope<'_> {
    /// The managed tensor behind `slot`.
    pub fn tensor(&self, slot: Slot) -> GcTensor {
        let info = *self.group.info(slot);
        let buffer = Arc::clone(&self.buffers[slot.0]);
        GcTensor::from_pooled(info, buffer)
    }
}

impl Drop for MemoryScope<'_> {
    fn drop(&mut self) {
        if let Some(manager) = &self.group.manager {
            for buffer in self.buffers.drain(..) {
                manager.release(buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gles_gemm::{DataType, TensorShape};

    fn info(x: usize) -> TensorInfo {
        TensorInfo::new(TensorShape::new(&[x]), DataType::F32)
    }

    #[test]
    fn test_manager_reuses_best_fit() {
        let manager = MemoryManager::new();
        let small = manager.acquire(16);
        let large = manager.acquire(64);
        manager.release(large);
        manager.release(small);
        assert_eq!(manager.num_free(), 2);

        let buffer = manager.acquire(8);
        assert_eq!(buffer.len(), 16);
        let buffer = manager.acquire(32);
        assert_eq!(buffer.len(), 64);
        assert_eq!(manager.num_allocations(), 2);

        manager.acquire(128);
        assert_eq!(manager.num_allocations(), 3);
    }

    #[test]
    fn test_group_releases_on_scope_end() {
        let manager = Arc::new(MemoryManager::new());
        let mut group = MemoryGroup::new(Some(Arc::clone(&manager)));
        let a = group.manage(info(4));
        let b = group.manage(info(8));

        for _ in 0..3 {
            let scope = group.acquire();
            assert_eq!(scope.tensor(a).shape().x(), 4);
            assert_eq!(scope.tensor(b).shape().x(), 8);
            assert_eq!(manager.num_free(), 0);
        }
        assert_eq!(manager.num_free(), 2);
        assert_eq!(manager.num_allocations(), 2);
    }

    #[test]
    fn test_unmanaged_group_owns_buffers() {
        let mut group = MemoryGroup::new(None);
        let slot = group.manage(info(3));
        let first = group.acquire().tensor(slot);
        let second = group.acquire().tensor(slot);
        assert!(Arc::ptr_eq(first.buffer(), second.buffer()));
        assert!(!group.is_managed());
    }
}
