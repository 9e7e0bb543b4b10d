//! Host ↔ device copies.
//!
//! Uploads are single queue writes. Readback goes through a mappable staging
//! buffer in three steps: copy and submit, wait for the queue, then map and
//! copy out. Tensor transfers round lengths up to the copy alignment; the
//! pool allocates that slack, so odd-length f16 tensors transfer too.

use tracing::trace;

use crate::completion::completion;
use crate::context::Context;
use crate::dtype::Element;
use crate::error::{GpuError, Result};
use crate::handles::capture;
use crate::tensor::{aligned_size, Tensor};

fn check_aligned(len: u64) -> Result<()> {
    if len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(GpuError::Misaligned(len));
    }
    Ok(())
}

fn check_dtype<T: Element>(tensor: &Tensor) -> Result<()> {
    if tensor.dtype() != T::NUM_TYPE {
        return Err(GpuError::DTypeMismatch {
            expected: tensor.dtype().to_string(),
            got: T::NUM_TYPE.to_string(),
        });
    }
    Ok(())
}

fn check_fits(len: u64, capacity: u64) -> Result<()> {
    if len > capacity {
        return Err(GpuError::SizeMismatch {
            expected: capacity,
            got: len,
        });
    }
    Ok(())
}

impl Context {
    /// Write raw bytes to the start of `buffer`. The length must be a
    /// multiple of the copy alignment.
    pub fn to_gpu_buffer(&self, bytes: &[u8], buffer: &wgpu::Buffer) -> Result<()> {
        let len = bytes.len() as u64;
        check_aligned(len)?;
        check_fits(len, buffer.size())?;
        capture(self.device(), "buffer write", || {
            self.queue().write_buffer(buffer, 0, bytes)
        })?;
        trace!(bytes = len, "queued buffer write");
        Ok(())
    }

    /// Upload exactly `tensor.size()` bytes. Lengths off the copy alignment
    /// are zero-padded into the buffer's tail.
    pub fn to_gpu_bytes(&self, bytes: &[u8], tensor: &Tensor) -> Result<()> {
        let len = bytes.len() as u64;
        if len != tensor.size() {
            return Err(GpuError::SizeMismatch {
                expected: tensor.size(),
                got: len,
            });
        }
        self.ensure_live(tensor.id())?;
        let padded = aligned_size(len);
        if padded == len {
            return self.to_gpu_buffer(bytes, tensor.buffer());
        }
        let mut staged = bytes.to_vec();
        staged.resize(padded as usize, 0);
        self.to_gpu_buffer(&staged, tensor.buffer())
    }

    /// Upload `data` into `tensor`. The element type must match the tensor's
    /// dtype and `data` must cover the tensor exactly.
    pub fn to_gpu<T: Element>(&self, data: &[T], tensor: &Tensor) -> Result<()> {
        check_dtype::<T>(tensor)?;
        self.to_gpu_bytes(bytemuck::cast_slice(data), tensor)
    }

    /// Copy the first `out.len()` bytes of `tensor` into `out`, blocking until
    /// the copy lands.
    pub fn to_cpu_bytes(&self, tensor: &Tensor, out: &mut [u8]) -> Result<()> {
        let len = out.len() as u64;
        check_fits(len, tensor.size())?;
        self.ensure_live(tensor.id())?;
        if len == 0 {
            return Ok(());
        }
        // The tensor buffer is allocated aligned, so the padded copy stays
        // inside it.
        let copy_len = aligned_size(len);

        let device = self.device();
        let queue = self.queue();
        let readback = capture(device, "readback buffer creation", || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("wgk-readback"),
                size: copy_len,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        capture(device, "readback copy", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("wgk-readback-encoder"),
            });
            encoder.copy_buffer_to_buffer(tensor.buffer(), 0, &readback, 0, copy_len);
            queue.submit(Some(encoder.finish()));
        })?;

        let (copied, copy_done) = completion();
        queue.on_submitted_work_done(move || copied.resolve(()));
        self.wait(copy_done)?;
        trace!(tensor = %tensor.id(), bytes = len, "readback copy finished");

        let slice = readback.slice(..);
        let (mapped, map_done) = completion();
        slice.map_async(wgpu::MapMode::Read, move |status| mapped.resolve(status));
        self.wait(map_done)??;

        out.copy_from_slice(&slice.get_mapped_range()[..len as usize]);
        readback.unmap();
        readback.destroy();
        trace!(tensor = %tensor.id(), bytes = len, "readback mapped and copied");
        Ok(())
    }

    /// Read the whole tensor into `out`. `out` may be shorter than the tensor,
    /// in which case only its prefix is copied.
    pub fn to_cpu<T: Element>(&self, tensor: &Tensor, out: &mut [T]) -> Result<()> {
        check_dtype::<T>(tensor)?;
        self.to_cpu_bytes(tensor, bytemuck::cast_slice_mut(out))
    }

    /// Read the whole tensor into a new vector.
    pub fn read_tensor<T: Element>(&self, tensor: &Tensor) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); tensor.shape().numel()];
        self.to_cpu(tensor, &mut out)?;
        Ok(out)
    }
}
