use wgk_core::registry::Handle;
use wgk_core::{GpuError, KernelId, TensorId};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WGKStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorNoAdapter = 2,
    ErrorDevice = 3,
    ErrorOutOfMemory = 4,
    ErrorStaleHandle = 5,
    ErrorCommandConsumed = 6,
    ErrorInternal = 7,
}

impl From<&GpuError> for WGKStatus {
    fn from(err: &GpuError) -> Self {
        match err {
            GpuError::NoAdapter => WGKStatus::ErrorNoAdapter,
            GpuError::DeviceRequest(_)
            | GpuError::Validation { .. }
            | GpuError::BufferMap(_) => WGKStatus::ErrorDevice,
            GpuError::OutOfMemory { .. } => WGKStatus::ErrorOutOfMemory,
            GpuError::StaleTensor(_) | GpuError::KernelNotFound(_) => WGKStatus::ErrorStaleHandle,
            GpuError::CommandBufferConsumed(_) => WGKStatus::ErrorCommandConsumed,
            GpuError::CompletionDropped => WGKStatus::ErrorInternal,
            GpuError::RankExceeded { .. }
            | GpuError::InvalidDispatchRank { .. }
            | GpuError::ZeroWorkgroupSize { .. }
            | GpuError::WorkgroupCountOverflow { .. }
            | GpuError::UnsupportedPrecision(_)
            | GpuError::DTypeMismatch { .. }
            | GpuError::SizeMismatch { .. }
            | GpuError::Misaligned(_) => WGKStatus::ErrorInvalidArgument,
        }
    }
}

/// Tensor handle as seen from C. Copyable; stays valid until freed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WGKTensor {
    pub index: u32,
    pub generation: u32,
}

impl From<TensorId> for WGKTensor {
    fn from(id: TensorId) -> Self {
        Self {
            index: id.0.index,
            generation: id.0.generation,
        }
    }
}

impl From<WGKTensor> for TensorId {
    fn from(t: WGKTensor) -> Self {
        TensorId(Handle {
            index: t.index,
            generation: t.generation,
        })
    }
}

/// Kernel handle as seen from C. Valid for the lifetime of its context.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WGKKernel {
    pub index: u32,
    pub generation: u32,
}

impl From<KernelId> for WGKKernel {
    fn from(id: KernelId) -> Self {
        Self {
            index: id.0.index,
            generation: id.0.generation,
        }
    }
}

impl From<WGKKernel> for KernelId {
    fn from(k: WGKKernel) -> Self {
        KernelId(Handle {
            index: k.index,
            generation: k.generation,
        })
    }
}
