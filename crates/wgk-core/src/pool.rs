use tracing::{trace, warn};

use crate::dtype::NumType;
use crate::error::Result;
use crate::handles::capture;
use crate::registry::Registry;
use crate::shape::Shape;
use crate::tensor::{aligned_size, byte_size, Array, Tensor, TensorId};

/// Owning registry of every live tensor buffer.
///
/// Buffers are destroyed either through [`TensorPool::free`] or, for whatever
/// is left, when the pool is dropped.
#[derive(Debug, Default)]
pub struct TensorPool {
    entries: Registry<Tensor>,
}

impl TensorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a buffer for `shape` elements of `dtype` and register it.
    ///
    /// The returned tensor aliases the pool's entry.
    pub fn create(
        &mut self,
        device: &wgpu::Device,
        shape: Shape,
        dtype: NumType,
        usage: wgpu::BufferUsages,
    ) -> Result<Tensor> {
        let size = byte_size(&shape, dtype);
        let buffer = capture(device, "tensor buffer creation", || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("wgk-tensor"),
                size: aligned_size(size),
                usage,
                mapped_at_creation: false,
            })
        })?;

        let (handle, tensor) = self.entries.insert_with(|handle| Tensor {
            id: TensorId(handle),
            data: Array {
                buffer,
                usage,
                size,
            },
            shape,
            dtype,
        });
        trace!(tensor = %TensorId(handle), shape = %shape, size, "created tensor");
        Ok(tensor.clone())
    }

    /// Destroy the tensor's buffer and drop its entry.
    ///
    /// Returns false (with a warning) when the tensor is not in the pool,
    /// e.g. it was already freed.
    pub fn free(&mut self, tensor: &Tensor) -> bool {
        self.free_id(tensor.id)
    }

    pub fn free_id(&mut self, id: TensorId) -> bool {
        match self.entries.remove(id.0) {
            Some(entry) => {
                entry.data.buffer.destroy();
                trace!(tensor = %id, "freed tensor");
                true
            }
            None => {
                warn!(tensor = %id, "tried to free tensor that was not in pool");
                false
            }
        }
    }

    /// Free every registered tensor.
    pub fn free_all(&mut self) {
        // Snapshot first so removal never races the iteration.
        for handle in self.entries.handles() {
            self.free_id(TensorId(handle));
        }
    }

    pub fn get(&self, id: TensorId) -> Option<&Tensor> {
        self.entries.get(id.0)
    }

    pub fn contains(&self, id: TensorId) -> bool {
        self.entries.contains(id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes held by live tensors.
    pub fn allocated_bytes(&self) -> u64 {
        self.entries.values().map(Tensor::size).sum()
    }
}

impl Drop for TensorPool {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            trace!(count = self.entries.len(), "releasing remaining tensors");
        }
        self.free_all();
    }
}
