use thiserror::Error;

use crate::kernel::KernelId;
use crate::tensor::TensorId;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("shape rank {rank} exceeds the maximum rank {max}")]
    RankExceeded { rank: usize, max: usize },
    #[error("{what} must be rank 3, got rank {rank}")]
    InvalidDispatchRank { what: &'static str, rank: usize },
    #[error("workgroup size is zero along axis {axis}")]
    ZeroWorkgroupSize { axis: usize },
    #[error("{groups} workgroups along axis {axis} exceed the u32 dispatch range")]
    WorkgroupCountOverflow { axis: usize, groups: usize },
    #[error("unsupported precision: {0}")]
    UnsupportedPrecision(String),
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: u64, got: u64 },
    #[error("transfer of {0} bytes is not a multiple of {align}", align = wgpu::COPY_BUFFER_ALIGNMENT)]
    Misaligned(u64),
    #[error("tensor {0} is not live in the tensor pool")]
    StaleTensor(TensorId),
    #[error("kernel {0} not found")]
    KernelNotFound(KernelId),
    #[error("command buffer of kernel {0} was consumed by a dispatch; reset it before dispatching again")]
    CommandBufferConsumed(KernelId),
    #[error("{stage} failed: {message}")]
    Validation { stage: &'static str, message: String },
    #[error("{stage} ran out of device memory: {message}")]
    OutOfMemory { stage: &'static str, message: String },
    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("completion was dropped before it resolved")]
    CompletionDropped,
}

pub type Result<T> = std::result::Result<T, GpuError>;
