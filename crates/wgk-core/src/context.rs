use tracing::{debug, error, info};

use crate::completion::{Completion, Poll};
use crate::config::ContextOptions;
use crate::dtype::{Element, NumType};
use crate::error::{GpuError, Result};
use crate::handles::Scoped;
use crate::kernel::KernelPool;
use crate::pool::TensorPool;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorId, DEFAULT_TENSOR_USAGE};

/// Root of every GPU resource: the instance, adapter, device and queue plus
/// the tensor and kernel pools.
///
/// Field order is the teardown order. Kernels and tensors go first, then the
/// handles in reverse acquisition order (queue, device, adapter, instance).
pub struct Context {
    pub(crate) kernels: KernelPool,
    pub(crate) tensors: TensorPool,
    queue: Scoped<wgpu::Queue>,
    device: Scoped<wgpu::Device>,
    adapter: Scoped<wgpu::Adapter>,
    instance: wgpu::Instance,
    options: ContextOptions,
}

impl Context {
    /// Create a context with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(ContextOptions::default())
    }

    /// Run the instance → adapter → device handshake, blocking the caller
    /// until each request completes.
    pub fn with_options(options: ContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        info!("requesting adapter");
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))
        .ok_or_else(|| {
            error!(backends = ?options.backends, "no adapter satisfies the request");
            GpuError::NoAdapter
        })?;
        let adapter_info = adapter.get_info();
        info!(
            backend = ?adapter_info.backend,
            device = %adapter_info.name,
            "selected adapter"
        );

        let mut required_features = wgpu::Features::empty();
        if adapter.features().contains(wgpu::Features::SHADER_F16) {
            required_features |= wgpu::Features::SHADER_F16;
        }

        info!("requesting device");
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some(&options.device_label),
                required_features,
                required_limits: options.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| {
            error!(error = %e, "device request failed");
            GpuError::from(e)
        })?;
        install_device_error_handlers(&device);
        info!(features = ?required_features, "device ready");

        Ok(Context {
            kernels: KernelPool::new(),
            tensors: TensorPool::new(),
            queue: Scoped::new("queue", queue, &instance),
            device: Scoped::new("device", device, &instance),
            adapter: Scoped::new("adapter", adapter, &instance),
            instance,
            options,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn tensor_pool(&self) -> &TensorPool {
        &self.tensors
    }

    pub fn kernel_pool(&self) -> &KernelPool {
        &self.kernels
    }

    /// Whether f16 shaders can be compiled on this device.
    pub fn supports_f16(&self) -> bool {
        self.device.features().contains(wgpu::Features::SHADER_F16)
    }

    /// Allocate a tensor with the default storage/copy usage.
    pub fn create_tensor(&mut self, shape: impl Into<Shape>, dtype: NumType) -> Result<Tensor> {
        self.create_tensor_with_usage(shape, dtype, DEFAULT_TENSOR_USAGE)
    }

    pub fn create_tensor_with_usage(
        &mut self,
        shape: impl Into<Shape>,
        dtype: NumType,
        usage: wgpu::BufferUsages,
    ) -> Result<Tensor> {
        self.tensors.create(&self.device, shape.into(), dtype, usage)
    }

    /// Allocate a tensor and upload `data` into it.
    ///
    /// `data.len()` must equal the shape's element count. On failure no
    /// tensor stays registered.
    pub fn create_tensor_with<T: Element>(&mut self, shape: impl Into<Shape>, data: &[T]) -> Result<Tensor> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(GpuError::SizeMismatch {
                expected: (shape.numel() * std::mem::size_of::<T>()) as u64,
                got: std::mem::size_of_val(data) as u64,
            });
        }
        let tensor = self.create_tensor(shape, T::NUM_TYPE)?;
        if let Err(e) = self.to_gpu(data, &tensor) {
            self.tensors.free(&tensor);
            return Err(e);
        }
        Ok(tensor)
    }

    /// Release a tensor's buffer. Unknown or already-freed tensors only log a
    /// warning.
    ///
    /// Kernels bound to the tensor keep their reference; dispatching them
    /// afterwards fails with [`GpuError::StaleTensor`].
    pub fn free_tensor(&mut self, tensor: &Tensor) -> bool {
        self.tensors.free(tensor)
    }

    pub fn tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id)
    }

    pub(crate) fn ensure_live(&self, id: TensorId) -> Result<()> {
        if self.tensors.contains(id) {
            Ok(())
        } else {
            Err(GpuError::StaleTensor(id))
        }
    }

    /// Drive the device until `completion` resolves.
    ///
    /// Callbacks only fire while this thread pumps the instance; each pump
    /// blocks in the driver until submitted work progresses.
    pub fn wait<T>(&self, mut completion: Completion<T>) -> Result<T> {
        loop {
            match completion.try_take() {
                Poll::Ready(value) => return Ok(value),
                Poll::Dropped => return Err(GpuError::CompletionDropped),
                Poll::Pending => {
                    self.instance.poll_all(true);
                }
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        info!(
            tensors = self.tensors.len(),
            kernels = self.kernels.len(),
            "destroying context"
        );
        self.kernels.clear();
        self.tensors.free_all();
        debug!("pools released");
    }
}

fn install_device_error_handlers(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|err| {
        error!(error = %err, "device uncaptured error");
        panic!("device uncaptured error: {err}");
    }));
    device.set_device_lost_callback(|reason, message| match reason {
        wgpu::DeviceLostReason::Destroyed => info!("device destroyed: {}", message),
        _ => error!(?reason, "device lost: {}", message),
    });
}
