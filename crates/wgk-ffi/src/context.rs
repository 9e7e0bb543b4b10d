use wgk_core::{Context, ContextOptions, GpuError, Result, Tensor, TensorId};

use crate::types::WGKTensor;

/// Opaque context handle that owns the device and every tensor and kernel
/// created through it.
pub struct WGKContext {
    pub inner: Context,
}

impl WGKContext {
    /// Build a context configured from `WGK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            inner: Context::with_options(ContextOptions::from_env())?,
        })
    }

    /// Resolve a C tensor handle to the live pool entry.
    pub fn tensor(&self, handle: WGKTensor) -> Result<Tensor> {
        let id = TensorId::from(handle);
        self.inner
            .tensor(id)
            .cloned()
            .ok_or(GpuError::StaleTensor(id))
    }
}
