//! `wgk-core` - GPU tensors and compute kernels on top of wgpu.
//!
//! This crate provides:
//! - A `Context` owning the instance, adapter, device and queue
//! - A `TensorPool` of device buffers tagged with shape and dtype
//! - A `KernelPool` of compiled pipelines with their bind groups
//! - WGSL shader templating over workgroup size and precision
//! - Blocking host ↔ device transfers
//!
//! All operations run on the thread that owns the `Context`. Asynchronous
//! device work completes only while that thread waits on a `Completion`.

pub mod completion;
pub mod config;
pub mod context;
mod dispatch;
pub mod dtype;
pub mod error;
mod handles;
pub mod kernel;
pub mod pool;
pub mod registry;
pub mod shader;
pub mod shape;
pub mod tensor;
mod transfer;

// Re-export primary types at the crate root for convenience.
pub use completion::Completion;
pub use config::ContextOptions;
pub use context::Context;
pub use dtype::{Element, NumType};
pub use error::{GpuError, Result};
pub use kernel::{Kernel, KernelId, KernelPool};
pub use pool::TensorPool;
pub use shader::{create_shader, create_shader_1d, ShaderCode};
pub use shape::Shape;
pub use tensor::{Tensor, TensorId};
