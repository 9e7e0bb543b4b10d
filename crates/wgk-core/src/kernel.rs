//! Kernel construction: binding layout derivation, bind group and pipeline
//! assembly, workgroup counts and command-buffer encoding.

use std::fmt;
use std::num::NonZeroU64;

use tracing::{debug, error, trace};

use crate::error::{GpuError, Result};
use crate::handles::capture;
use crate::registry::{Handle, Registry};
use crate::shader::{ShaderCode, ENTRY_POINT};
use crate::shape::Shape;
use crate::tensor::{aligned_size, Tensor, TensorId};

/// Owned handle to a kernel living in the context's [`KernelPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(pub Handle);

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Read-write storage buffer backed by an input tensor.
    Storage,
    /// Uniform buffer holding the parameter block.
    Uniform,
}

/// One slot of a kernel's bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSpec {
    pub binding: u32,
    pub kind: BindingKind,
    /// Minimum binding size in bytes.
    pub min_size: u64,
}

impl BindingSpec {
    fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let ty = match self.kind {
            BindingKind::Storage => wgpu::BufferBindingType::Storage { read_only: false },
            BindingKind::Uniform => wgpu::BufferBindingType::Uniform,
        };
        wgpu::BindGroupLayoutEntry {
            binding: self.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(self.min_size),
            },
            count: None,
        }
    }
}

/// Derive the binding layout for `input_sizes` storage buffers plus an
/// optional parameter block of `params_size` bytes.
///
/// Inputs occupy indices `0..n` in order; the parameter block, when present,
/// takes index `n` and is the only uniform binding.
pub fn binding_plan(input_sizes: &[u64], params_size: Option<u64>) -> Vec<BindingSpec> {
    let mut plan: Vec<BindingSpec> = input_sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| BindingSpec {
            binding: i as u32,
            kind: BindingKind::Storage,
            min_size: size,
        })
        .collect();
    if let Some(size) = params_size {
        plan.push(BindingSpec {
            binding: input_sizes.len() as u32,
            kind: BindingKind::Uniform,
            min_size: size,
        });
    }
    plan
}

/// Per-axis workgroup counts covering `threads` with groups of
/// `workgroup_size`: `ceil(threads[axis] / workgroup_size[axis])`.
///
/// Both shapes must be rank 3 and the workgroup size nonzero on every axis.
pub fn workgroup_counts(threads: &Shape, workgroup_size: &Shape) -> Result<[u32; 3]> {
    if threads.rank() != 3 {
        return Err(GpuError::InvalidDispatchRank {
            what: "thread count",
            rank: threads.rank(),
        });
    }
    if workgroup_size.rank() != 3 {
        return Err(GpuError::InvalidDispatchRank {
            what: "workgroup size",
            rank: workgroup_size.rank(),
        });
    }
    let mut counts = [0u32; 3];
    for (axis, count) in counts.iter_mut().enumerate() {
        let group = workgroup_size[axis];
        if group == 0 {
            return Err(GpuError::ZeroWorkgroupSize { axis });
        }
        let groups = threads[axis].div_ceil(group);
        *count = u32::try_from(groups)
            .map_err(|_| GpuError::WorkgroupCountOverflow { axis, groups })?;
    }
    Ok(counts)
}

/// Holds at most one encoded command buffer; submission takes it out.
#[derive(Debug)]
pub struct CommandSlot<T> {
    armed: Option<T>,
}

impl<T> CommandSlot<T> {
    pub fn empty() -> Self {
        CommandSlot { armed: None }
    }

    /// Store a freshly encoded buffer, replacing any unsubmitted one.
    pub fn arm(&mut self, command: T) {
        self.armed = Some(command);
    }

    pub fn take(&mut self) -> Option<T> {
        self.armed.take()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

/// A compiled, bound, reusable compute kernel.
///
/// Pipeline, bind group and workgroup counts persist across dispatches; the
/// command buffer is consumed by each dispatch.
#[derive(Debug)]
pub struct Kernel {
    inputs: Vec<TensorId>,
    bindings: Vec<BindingSpec>,
    threads: Shape,
    workgroups: [u32; 3],
    params: Option<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::ComputePipeline,
    command: CommandSlot<wgpu::CommandBuffer>,
}

impl Kernel {
    /// Build a kernel and encode its first command buffer.
    ///
    /// `params` of `None` or an empty slice means the kernel takes no
    /// parameter block.
    pub(crate) fn build(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shader: &ShaderCode,
        inputs: &[&Tensor],
        threads: Shape,
        params: Option<&[u8]>,
    ) -> Result<Self> {
        let workgroups = workgroup_counts(&threads, shader.workgroup_size()).map_err(|e| {
            error!(error = %e, threads = %threads, "invalid dispatch geometry");
            e
        })?;
        let params = params.filter(|p| !p.is_empty());

        let sizes: Vec<u64> = inputs.iter().map(|t| t.size()).collect();
        let bindings = binding_plan(&sizes, params.map(|p| p.len() as u64));
        trace!(num_bindings = bindings.len(), "derived binding layout");

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> =
            bindings.iter().map(BindingSpec::layout_entry).collect();
        let bind_group_layout = capture(device, "bind group layout creation", || {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("wgk-bind-group-layout"),
                entries: &layout_entries,
            })
        })?;

        let params_buffer = match params {
            Some(bytes) => Some(create_params_buffer(device, queue, bytes)?),
            None => None,
        };

        let mut entries: Vec<wgpu::BindGroupEntry> = inputs
            .iter()
            .enumerate()
            .map(|(i, t)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: t.buffer().as_entire_binding(),
            })
            .collect();
        if let Some(buffer) = &params_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: inputs.len() as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = capture(device, "bind group creation", || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("wgk-bind-group"),
                layout: &bind_group_layout,
                entries: &entries,
            })
        })?;

        let pipeline = capture(device, "compute pipeline creation", || {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("wgk-pipeline-layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("wgk-shader"),
                source: wgpu::ShaderSource::Wgsl(shader.source().into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("wgk-compute-pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let mut kernel = Kernel {
            inputs: inputs.iter().map(|t| t.id()).collect(),
            bindings,
            threads,
            workgroups,
            params: params_buffer,
            bind_group,
            pipeline,
            command: CommandSlot::empty(),
        };
        kernel.encode(device)?;
        debug!(
            num_bindings = kernel.num_bindings(),
            workgroups = ?kernel.workgroups,
            "compiled kernel"
        );
        Ok(kernel)
    }

    /// Encode a fresh command buffer: set pipeline, bind group, dispatch.
    pub(crate) fn encode(&mut self, device: &wgpu::Device) -> Result<()> {
        trace!(threads = %self.threads, workgroups = ?self.workgroups, "encoding command buffer");
        let command = capture(device, "command buffer encoding", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("wgk-dispatch-encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("wgk-compute-pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.bind_group, &[]);
                let [x, y, z] = self.workgroups;
                pass.dispatch_workgroups(x, y, z);
            }
            encoder.finish()
        })?;
        self.command.arm(command);
        Ok(())
    }

    pub(crate) fn take_command(&mut self) -> Option<wgpu::CommandBuffer> {
        self.command.take()
    }

    /// Tensors bound at indices `0..num_inputs`.
    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn bindings(&self) -> &[BindingSpec] {
        &self.bindings
    }

    pub fn num_bindings(&self) -> usize {
        self.bindings.len()
    }

    pub fn has_params(&self) -> bool {
        self.params.is_some()
    }

    pub fn threads(&self) -> &Shape {
        &self.threads
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    /// Whether a command buffer is encoded and ready for dispatch.
    pub fn is_ready(&self) -> bool {
        self.command.is_armed()
    }
}

fn create_params_buffer(device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) -> Result<wgpu::Buffer> {
    // Queue writes must cover whole 4-byte words.
    let padded = aligned_size(bytes.len() as u64);
    let buffer = capture(device, "params buffer creation", || {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wgk-params"),
            size: padded,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    })?;
    let mut staged = bytes.to_vec();
    staged.resize(padded as usize, 0);
    queue.write_buffer(&buffer, 0, &staged);
    trace!(size = bytes.len(), "params buffer written");
    Ok(buffer)
}

/// Registry of live kernels.
///
/// Kernels are only dropped, never explicitly destroyed: submitted command
/// buffers are reclaimed by the queue, and the remaining objects release
/// themselves when their last reference goes.
#[derive(Debug, Default)]
pub struct KernelPool {
    entries: Registry<Kernel>,
}

impl KernelPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, kernel: Kernel) -> KernelId {
        KernelId(self.entries.insert(kernel))
    }

    pub fn get(&self, id: KernelId) -> Option<&Kernel> {
        self.entries.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: KernelId) -> Result<&mut Kernel> {
        self.entries.get_mut(id.0).ok_or(GpuError::KernelNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
