use std::fmt;

use crate::dtype::NumType;
use crate::registry::Handle;
use crate::shape::Shape;

/// Default usage of tensor buffers: bindable as storage and copyable both ways.
pub const DEFAULT_TENSOR_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_DST)
    .union(wgpu::BufferUsages::COPY_SRC);

/// Generation-tagged reference to a tensor pool slot.
///
/// Kernels hold these instead of owning buffers, so a freed tensor is
/// detected rather than silently reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(pub Handle);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor#{}", self.0)
    }
}

/// A device buffer descriptor.
///
/// The buffer handle is a shared reference; the owning [`TensorPool`] is the
/// only place that destroys it.
///
/// [`TensorPool`]: crate::pool::TensorPool
#[derive(Debug, Clone)]
pub struct Array {
    pub buffer: wgpu::Buffer,
    pub usage: wgpu::BufferUsages,
    /// Logical size in bytes. The buffer itself is rounded up to
    /// [`aligned_size`].
    pub size: u64,
}

/// A device buffer with a shape and element type.
///
/// Cloning a tensor aliases the same device buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub(crate) id: TensorId,
    pub(crate) data: Array,
    pub(crate) shape: Shape,
    pub(crate) dtype: NumType,
}

impl Tensor {
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> NumType {
        self.dtype
    }

    pub fn array(&self) -> &Array {
        &self.data
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.data.buffer
    }

    /// Size of the underlying buffer in bytes.
    pub fn size(&self) -> u64 {
        self.data.size
    }
}

/// Number of bytes needed to store `shape` elements of `dtype`.
pub fn byte_size(shape: &Shape, dtype: NumType) -> u64 {
    (shape.numel() * dtype.size_in_bytes()) as u64
}

/// `bytes` rounded up to the copy alignment, the smallest size queue writes
/// and buffer copies accept.
pub fn aligned_size(bytes: u64) -> u64 {
    bytes.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        assert_eq!(byte_size(&Shape::from([2, 3, 4]), NumType::F32), 96);
        assert_eq!(byte_size(&Shape::from([2, 3, 4]), NumType::F16), 48);
        assert_eq!(byte_size(&Shape::new(&[]), NumType::F32), 4);
        assert_eq!(byte_size(&Shape::from([0, 16]), NumType::F32), 0);
    }

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(0), 0);
        assert_eq!(aligned_size(10), 12);
        assert_eq!(aligned_size(16), 16);
        // Five f16 elements need a padded buffer.
        assert_eq!(aligned_size(byte_size(&Shape::from([5]), NumType::F16)), 12);
    }

    #[test]
    fn test_default_usage() {
        assert!(DEFAULT_TENSOR_USAGE.contains(wgpu::BufferUsages::STORAGE));
        assert!(DEFAULT_TENSOR_USAGE.contains(wgpu::BufferUsages::COPY_DST));
        assert!(DEFAULT_TENSOR_USAGE.contains(wgpu::BufferUsages::COPY_SRC));
        assert!(!DEFAULT_TENSOR_USAGE.contains(wgpu::BufferUsages::MAP_READ));
    }

    #[test]
    fn test_id_display() {
        let id = TensorId(Handle {
            index: 3,
            generation: 1,
        });
        assert_eq!(id.to_string(), "tensor#3v1");
    }
}
