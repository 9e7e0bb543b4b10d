//! Release guards for root handles and error-scope capture for device calls.

use std::ops::Deref;

use tracing::{debug, error, warn};

use crate::error::{GpuError, Result};

/// Owns one root wgpu handle and releases it on drop, then pumps the
/// instance so callbacks fired by the release are delivered immediately.
///
/// Declare guards in reverse acquisition order inside the owning struct; Rust
/// drops fields top to bottom, which yields queue → device → adapter →
/// instance however the owner goes out of scope.
pub(crate) struct Scoped<T> {
    label: &'static str,
    handle: Option<T>,
    pump: wgpu::Instance,
}

impl<T> Scoped<T> {
    pub(crate) fn new(label: &'static str, handle: T, pump: &wgpu::Instance) -> Self {
        Scoped {
            label,
            handle: Some(handle),
            pump: pump.clone(),
        }
    }
}

impl<T> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the handle out.
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("{} accessed after release", self.label),
        }
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        match self.handle.take() {
            Some(handle) => {
                drop(handle);
                self.pump.poll_all(false);
                debug!(handle = self.label, "released");
            }
            None => warn!(handle = self.label, "handle is already released"),
        }
    }
}

/// Run `f` inside validation and out-of-memory error scopes, turning any error
/// the device reports into a `GpuError` tagged with `stage`.
pub(crate) fn capture<R>(
    device: &wgpu::Device,
    stage: &'static str,
    f: impl FnOnce() -> R,
) -> Result<R> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());

    match validation.or(oom) {
        None => Ok(value),
        Some(err @ wgpu::Error::OutOfMemory { .. }) => {
            error!(stage, error = %err, "device out of memory");
            Err(GpuError::OutOfMemory {
                stage,
                message: err.to_string(),
            })
        }
        Some(err) => {
            error!(stage, error = %err, "device rejected call");
            Err(GpuError::Validation {
                stage,
                message: err.to_string(),
            })
        }
    }
}
