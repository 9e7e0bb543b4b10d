//! Kernel construction and dispatch on a [`Context`].

use tracing::{debug, trace, warn};

use crate::completion::{completion, Completion};
use crate::context::Context;
use crate::error::{GpuError, Result};
use crate::kernel::{Kernel, KernelId};
use crate::shader::ShaderCode;
use crate::shape::Shape;
use crate::tensor::Tensor;

impl Context {
    /// Compile `shader`, bind `inputs` at indices `0..n` (and `params`, if
    /// present and non-empty, at index `n`) and encode the first dispatch of
    /// `threads` invocations.
    ///
    /// The kernel is owned by the context; the returned id stays valid until
    /// the context is dropped.
    pub fn create_kernel(
        &mut self,
        shader: &ShaderCode,
        inputs: &[&Tensor],
        threads: impl Into<Shape>,
        params: Option<&[u8]>,
    ) -> Result<KernelId> {
        for tensor in inputs {
            self.ensure_live(tensor.id())?;
        }
        if self.options().log_shader_source {
            debug!("building kernel from shader:\n{}", shader.source());
        }
        let kernel = Kernel::build(
            self.device(),
            self.queue(),
            shader,
            inputs,
            threads.into(),
            params,
        )?;
        let id = self.kernels.insert(kernel);
        debug!(kernel = %id, inputs = inputs.len(), "kernel created");
        Ok(id)
    }

    /// [`create_kernel`](Self::create_kernel) for a parameter block that is a
    /// plain-old-data struct.
    pub fn create_kernel_with_params<P: bytemuck::Pod>(
        &mut self,
        shader: &ShaderCode,
        inputs: &[&Tensor],
        threads: impl Into<Shape>,
        params: &P,
    ) -> Result<KernelId> {
        self.create_kernel(shader, inputs, threads, Some(bytemuck::bytes_of(params)))
    }

    pub fn kernel(&self, id: KernelId) -> Option<&Kernel> {
        self.kernels.get(id)
    }

    /// Encode a fresh command buffer so the kernel can be dispatched again.
    ///
    /// Resetting a kernel that has not been dispatched replaces its pending
    /// command buffer.
    pub fn reset_command_buffer(&mut self, id: KernelId) -> Result<()> {
        let device = self.device().clone();
        let kernel = self.kernels.get_mut(id)?;
        if kernel.is_ready() {
            warn!(kernel = %id, "resetting a command buffer that was never submitted");
        }
        kernel.encode(&device)?;
        trace!(kernel = %id, "command buffer reset");
        Ok(())
    }

    /// Submit the kernel's encoded command buffer.
    ///
    /// The returned completion resolves once the queue finishes the work; pass
    /// it to [`wait`](Self::wait). A kernel dispatches once per encoded
    /// command buffer: dispatching again without
    /// [`reset_command_buffer`](Self::reset_command_buffer) fails with
    /// [`GpuError::CommandBufferConsumed`].
    pub fn dispatch_kernel(&mut self, id: KernelId) -> Result<Completion> {
        let inputs = self
            .kernels
            .get(id)
            .ok_or(GpuError::KernelNotFound(id))?
            .inputs()
            .to_vec();
        for tensor in inputs {
            self.ensure_live(tensor)?;
        }

        let command = self
            .kernels
            .get_mut(id)?
            .take_command()
            .ok_or(GpuError::CommandBufferConsumed(id))?;

        let (promise, done) = completion();
        self.queue().submit(Some(command));
        self.queue()
            .on_submitted_work_done(move || promise.resolve(()));
        trace!(kernel = %id, "kernel submitted");
        Ok(done)
    }

    /// Dispatch and block until the queue drains the work.
    pub fn run_kernel(&mut self, id: KernelId) -> Result<()> {
        let done = self.dispatch_kernel(id)?;
        self.wait(done)
    }
}
