use super::ComputeBackend;
use super::kernel::{ArgKind, IndexSpace, Kernel, KernelArg};
use super::utils::{buffer_entry, create_uniform_buffer, div_ceil_uniform, uniform_entry};
use crate::error::BackendError;

use bytemuck::cast_slice;
use log::{debug, trace};
use pollster::block_on;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, mpsc};
use wgpu::util::DeviceExt;

use mobilenet_utils::gpu::GpuContext;

/// Side of the cubic workgroup used by the spatial kernels.
const VOLUME_WORKGROUP: u32 = 4;
/// Workgroup size of the element-wise kernels.
const LINEAR_WORKGROUP: u32 = 64;

fn shader_source(kernel: Kernel) -> &'static str {
    match kernel {
        Kernel::ZeroPadding2d => include_str!("shaders/zeropadding2d.wgsl"),
        Kernel::Conv2d9Valid => include_str!("shaders/conv2d_kernel_9_valid.wgsl"),
        Kernel::Conv2d1Same => include_str!("shaders/conv2d_kernel_1_same.wgsl"),
        Kernel::DepthwiseConv2d9Valid => include_str!("shaders/depthwise_conv2d_kernel_9_valid.wgsl"),
        Kernel::DepthwiseConv2d9Same => include_str!("shaders/depthwise_conv2d_kernel_9_same.wgsl"),
        Kernel::Relu => include_str!("shaders/relu.wgsl"),
        Kernel::SumByChannels => include_str!("shaders/sum_by_channels.wgsl"),
        Kernel::ApplyReduction => include_str!("shaders/apply_reduction.wgsl"),
        Kernel::MatrixMultiplication => include_str!("shaders/matrix_multiplication.wgsl"),
        Kernel::MatrixMultiplicationBias => include_str!("shaders/matrix_multiplication_bias.wgsl"),
        Kernel::MaxValue => include_str!("shaders/max_value.wgsl"),
        Kernel::Softmax => include_str!("shaders/softmax.wgsl"),
        Kernel::PreprocessImage => include_str!("shaders/preprocess_image.wgsl"),
    }
}

struct KernelPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    has_uniforms: bool,
}

impl KernelPipeline {
    fn new(device: &wgpu::Device, kernel: Kernel) -> Self {
        let name = kernel.name();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("mobilenet_{name}_shader")),
            source: wgpu::ShaderSource::Wgsl(shader_source(kernel).into()),
        });

        let signature = kernel.signature();
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = signature
            .iter()
            .filter(|kind| kind.is_buffer())
            .enumerate()
            .map(|(binding, kind)| {
                let read_only = !kind.is_writable();
                buffer_entry(binding as u32, wgpu::BufferBindingType::Storage { read_only })
            })
            .collect();
        let has_uniforms = signature.iter().any(|kind| !kind.is_buffer());
        if has_uniforms {
            entries.push(uniform_entry(entries.len() as u32));
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("mobilenet_{name}_bgl")),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("mobilenet_{name}_pipeline_layout")),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("mobilenet_{name}_pipeline")),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        Self {
            pipeline,
            bind_group_layout,
            has_uniforms,
        }
    }
}

/// Executes kernels as WGSL compute shaders on a `wgpu` device.
///
/// Every kernel is compiled once in [`WgpuBackend::new`]. Each dispatch uploads
/// its host slices into fresh storage buffers, runs, and copies writable
/// buffers back before returning.
pub struct WgpuBackend {
    context: Arc<GpuContext>,
    pipelines: HashMap<Kernel, KernelPipeline>,
}

impl WgpuBackend {
    /// Compile every kernel on `context`'s device.
    pub fn new(context: Arc<GpuContext>) -> Result<Self, BackendError> {
        let device = context.device();
        let mut pipelines = HashMap::with_capacity(Kernel::ALL.len());
        for kernel in Kernel::ALL {
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = KernelPipeline::new(device, kernel);
            if let Some(err) = block_on(device.pop_error_scope()) {
                return Err(BackendError::Build {
                    kernel: kernel.name(),
                    detail: err.to_string(),
                });
            }
            pipelines.insert(kernel, pipeline);
        }
        debug!(
            target: "mobilenet::backend",
            "compiled {} kernels for '{}'",
            pipelines.len(),
            context.adapter_info().name
        );
        Ok(Self { context, pipelines })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    fn workgroups(&self, kernel: Kernel, space: IndexSpace) -> Result<[u32; 3], BackendError> {
        let limit = self.context.limits().max_compute_workgroups_per_dimension;
        let too_large = |detail: String| BackendError::IndexSpace {
            kernel: kernel.name(),
            space: space.dims(),
            detail,
        };
        let to_u32 = |value: usize| {
            u32::try_from(value).map_err(|_| too_large(format!("{value} exceeds u32")))
        };

        if kernel.is_reduction() {
            return Ok([1, 1, 1]);
        }
        let groups = match kernel {
            Kernel::ZeroPadding2d
            | Kernel::Conv2d9Valid
            | Kernel::Conv2d1Same
            | Kernel::DepthwiseConv2d9Valid
            | Kernel::DepthwiseConv2d9Same => {
                let [x, y, z] = space.dims();
                [
                    div_ceil_uniform(to_u32(x)?, VOLUME_WORKGROUP),
                    div_ceil_uniform(to_u32(y)?, VOLUME_WORKGROUP),
                    div_ceil_uniform(to_u32(z)?, VOLUME_WORKGROUP),
                ]
            }
            _ => {
                // Long 1-D spaces fold into a second grid dimension; shaders
                // recover the flat index from `num_workgroups`.
                let total = div_ceil_uniform(to_u32(space.len())?, LINEAR_WORKGROUP);
                let x = total.min(limit);
                [x, div_ceil_uniform(total, x), 1]
            }
        };
        if groups.iter().any(|&count| count > limit) {
            return Err(too_large(format!(
                "needs {groups:?} workgroups, device allows {limit} per dimension"
            )));
        }
        Ok(groups)
    }
}

impl fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.context.adapter_info().name)
            .field("kernels", &self.pipelines.len())
            .finish()
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn dispatch(
        &self,
        kernel: Kernel,
        args: &mut [KernelArg<'_>],
        space: IndexSpace,
    ) -> Result<(), BackendError> {
        kernel.validate(args, space)?;
        let name = kernel.name();
        let pipeline = self
            .pipelines
            .get(&kernel)
            .ok_or_else(|| BackendError::UnknownKernel(name.to_string()))?;
        let groups = self.workgroups(kernel, space)?;
        let device = self.context.device();
        let queue = self.context.queue();
        let max_binding = u64::from(self.context.limits().max_storage_buffer_binding_size);
        trace!(target: "mobilenet::backend", "gpu dispatch {kernel} over {:?} as {groups:?}", space.dims());

        for (position, arg) in args.iter().enumerate() {
            let size = arg.as_slice().map_or(0, |data| std::mem::size_of_val(data) as u64);
            if size > max_binding {
                return Err(BackendError::Dispatch {
                    kernel: name,
                    detail: format!(
                        "argument {position} needs {size} bytes, binding limit is {max_binding}"
                    ),
                });
            }
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        // Storage buffers in positional order, remembering which ones come back.
        let mut buffers = Vec::new();
        let mut readbacks = Vec::new();
        let mut words = Vec::new();
        for (position, arg) in args.iter().enumerate() {
            let Some(data) = arg.as_slice() else {
                words.extend(arg.scalar_bits());
                continue;
            };
            let size = std::mem::size_of_val(data) as u64;
            let label = format!("mobilenet_{name}_arg{position}");
            let buffer = match arg.kind() {
                ArgKind::Output => device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&label),
                    size,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                kind => {
                    let mut usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
                    if kind.is_writable() {
                        usage |= wgpu::BufferUsages::COPY_SRC;
                    }
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&label),
                        contents: cast_slice(data),
                        usage,
                    })
                }
            };
            if arg.kind().is_writable() {
                readbacks.push((position, buffers.len(), size));
            }
            buffers.push(buffer);
        }
        let uniforms = pipeline
            .has_uniforms
            .then(|| create_uniform_buffer(device, &format!("mobilenet_{name}_uniforms"), &words));

        let mut entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        if let Some(uniforms) = &uniforms {
            entries.push(wgpu::BindGroupEntry {
                binding: buffers.len() as u32,
                resource: uniforms.as_entire_binding(),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("mobilenet_{name}_bg")),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&format!("mobilenet_{name}_encoder")),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&format!("mobilenet_{name}_pass")),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }

        let staging: Vec<(usize, wgpu::Buffer)> = readbacks
            .iter()
            .map(|&(position, index, size)| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("mobilenet_{name}_readback{position}")),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(&buffers[index], 0, &buffer, 0, size);
                (position, buffer)
            })
            .collect();
        queue.submit(Some(encoder.finish()));

        let validation = block_on(device.pop_error_scope());
        let out_of_memory = block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            return Err(BackendError::Dispatch {
                kernel: name,
                detail: err.to_string(),
            });
        }

        read_back(device, kernel, args, &staging)
    }
}

/// Map every staging buffer, wait for the device, and copy results into the
/// writable host slices they were created for.
fn read_back(
    device: &wgpu::Device,
    kernel: Kernel,
    args: &mut [KernelArg<'_>],
    staging: &[(usize, wgpu::Buffer)],
) -> Result<(), BackendError> {
    let readback_error = |detail: String| BackendError::Readback {
        kernel: kernel.name(),
        detail,
    };

    let receivers: Vec<_> = staging
        .iter()
        .map(|(_, buffer)| {
            let (sender, receiver) = mpsc::channel();
            buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
            receiver
        })
        .collect();
    device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .map_err(|e| readback_error(format!("device poll failed: {e}")))?;

    for ((position, buffer), receiver) in staging.iter().zip(receivers) {
        receiver
            .recv()
            .map_err(|_| readback_error("map callback dropped".to_string()))?
            .map_err(|e| readback_error(format!("failed to map buffer: {e}")))?;
        let mapped = buffer.slice(..).get_mapped_range();
        let values: &[f32] = cast_slice(&mapped);
        let target = args[*position]
            .as_mut_slice()
            .ok_or_else(|| readback_error(format!("argument {position} is not a buffer")))?;
        if values.len() != target.len() {
            return Err(readback_error(format!(
                "returned {} values, expected {}",
                values.len(),
                target.len()
            )));
        }
        target.copy_from_slice(values);
        drop(mapped);
        buffer.unmap();
    }
    Ok(())
}
