//! Self-contained compute dispatch units.
//!
//! A [`Task`] owns everything one dispatch needs: the kernel module, a source
//! and a destination buffer, the binding table wiring them to slots 0 and 1,
//! the execution plan, a command list and the completion fence of its last
//! run. The four `set_*` functions below are the setup steps the
//! [`TaskBuilder`](crate::TaskBuilder) runs in order; each returns owned
//! resources, so a failing step releases whatever the earlier ones acquired.

use crate::buffer::Buffer;
use crate::context::AcceleratorContext;
use crate::error::{Result, RuntimeError};
use crate::handle::{Device, Owned};
use crate::shader::{ENTRY_POINT, ShaderModule};
use crate::specification::{BufferSpecification, PipelineSpecification};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Descriptor set and the pool it was allocated from.
pub(crate) struct BindingTable {
    set: vk::DescriptorSet,
    _pool: Owned<vk::DescriptorPool>,
}

/// Compute pipeline plus the layouts and cache it was built with.
pub(crate) struct ExecutionPlan {
    pipeline: Owned<vk::Pipeline>,
    _cache: Owned<vk::PipelineCache>,
    layout: Owned<vk::PipelineLayout>,
    _set_layout: Owned<vk::DescriptorSetLayout>,
}

/// Primary command buffer and its pool.
pub(crate) struct CommandList {
    buffer: vk::CommandBuffer,
    pool: Owned<vk::CommandPool>,
}

/// Outcome of one [`Task::execute`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub workgroups: [u32; 3],
    /// Wall-clock time from submission until the fence signalled.
    pub elapsed: Duration,
    pub source: Vec<u64>,
    pub destination: Vec<u64>,
}

/// A fully set-up dispatch.
///
/// Fields drop top to bottom, which is the reverse of the order the setup
/// steps acquired them.
pub struct Task {
    fence: Option<Owned<vk::Fence>>,
    commands: CommandList,
    bindings: BindingTable,
    plan: ExecutionPlan,
    dst: Buffer,
    src: Buffer,
    shader: ShaderModule,
    device: Arc<Device>,
    workgroups: [u32; 3],
}

impl Task {
    pub(crate) fn assemble(
        shader: ShaderModule,
        (src, dst): (Buffer, Buffer),
        (plan, bindings): (ExecutionPlan, BindingTable),
        commands: CommandList,
        workgroups: [u32; 3],
    ) -> Self {
        let device = Arc::clone(commands.pool.device());
        Self {
            fence: None,
            commands,
            bindings,
            plan,
            dst,
            src,
            shader,
            device,
            workgroups,
        }
    }

    /// Record, submit and wait for one dispatch, then read both buffers back.
    ///
    /// Blocks until the fence signals. A task can be executed again; each run
    /// re-records the command list and replaces the previous fence.
    ///
    /// # Errors
    /// `DeviceMismatch` if `context` is not the context the task was built
    /// against; `Vulkan` or `CommandError` if recording or submission fails.
    #[tracing::instrument(skip_all, fields(kernel = %self.kernel_path().display()))]
    pub fn execute(&mut self, context: &AcceleratorContext) -> Result<ExecutionReport> {
        if !Arc::ptr_eq(&self.device, context.device()) {
            return Err(RuntimeError::DeviceMismatch);
        }
        let device = Arc::clone(&self.device);
        let cmd = self.commands.buffer;
        let [x, y, z] = self.workgroups;

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the command buffer is not pending; any previous submission
        // was waited on before `execute` returned.
        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(RuntimeError::vulkan("vkBeginCommandBuffer"))?;
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.plan.pipeline.raw());
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.plan.layout.raw(),
                0,
                &[self.bindings.set],
                &[],
            );
            device.cmd_dispatch(cmd, x, y, z);
            device
                .end_command_buffer(cmd)
                .map_err(RuntimeError::vulkan("vkEndCommandBuffer"))?;
        }

        self.fence = None;
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(RuntimeError::vulkan("vkCreateFence"))?;
        let fence = Owned::new(&device, fence);

        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let started = Instant::now();
        unsafe { device.queue_submit(context.compute_queue(), &[submit], fence.raw()) }
            .map_err(|e| RuntimeError::CommandError(format!("vkQueueSubmit: {e}")))?;
        if let Err(result) = unsafe { device.wait_for_fences(&[fence.raw()], true, u64::MAX) } {
            tracing::warn!(%result, "Waiting for the task fence failed");
        }
        let elapsed = started.elapsed();
        self.fence = Some(fence);

        let source = self.src.read_elements()?;
        tracing::debug!(?source, "Source buffer");
        let destination = self.dst.read_elements()?;
        tracing::debug!(?destination, "Destination buffer");

        tracing::info!(
            elapsed_us = elapsed.as_micros() as u64,
            workgroups = ?self.workgroups,
            "Task executed"
        );

        Ok(ExecutionReport {
            workgroups: self.workgroups,
            elapsed,
            source,
            destination,
        })
    }

    pub fn source(&self) -> &Buffer {
        &self.src
    }

    pub fn destination(&self) -> &Buffer {
        &self.dst
    }

    pub fn read_source(&self) -> Result<Vec<u64>> {
        self.src.read_elements()
    }

    pub fn read_destination(&self) -> Result<Vec<u64>> {
        self.dst.read_elements()
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    pub fn kernel_path(&self) -> &Path {
        self.shader.path()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("kernel", &self.shader.path())
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("workgroups", &self.workgroups)
            .finish_non_exhaustive()
    }
}

/// Workgroup counts covering `invocations` with groups of `local_size_x`.
///
/// # Errors
/// `InvalidSpecification` if the count exceeds `max_groups_x`.
pub(crate) fn workgroup_count(invocations: u32, local_size_x: u32, max_groups_x: u32) -> Result<[u32; 3]> {
    if local_size_x == 0 {
        return Err(RuntimeError::InvalidSpecification(
            "workgroup size must be non-zero".to_string(),
        ));
    }
    let groups = invocations.div_ceil(local_size_x);
    if groups > max_groups_x {
        return Err(RuntimeError::InvalidSpecification(format!(
            "{invocations} invocations need {groups} workgroups, device allows {max_groups_x}"
        )));
    }
    Ok([groups, 1, 1])
}

/// Load the kernel module.
pub(crate) fn set_shader(context: &AcceleratorContext, path: &Path) -> Result<ShaderModule> {
    ShaderModule::load(context.device(), path)
}

/// Allocate the source and destination buffers and fill the source with `0..count`.
#[tracing::instrument(skip(context))]
pub(crate) fn set_buffers(
    context: &AcceleratorContext,
    spec: &BufferSpecification,
) -> Result<(Buffer, Buffer)> {
    let memory_properties = context.memory_properties();
    let src = Buffer::new(context.device(), memory_properties, spec.src_count, spec.src_size)?;
    src.fill_sequence()?;
    let dst = Buffer::new(context.device(), memory_properties, spec.dst_count, spec.dst_size)?;
    Ok((src, dst))
}

/// Build the execution plan and a binding table wiring `src` to slot 0 and `dst` to slot 1.
#[tracing::instrument(skip_all, fields(bindings = spec.bindings.len()))]
pub(crate) fn set_pipeline(
    context: &AcceleratorContext,
    spec: &PipelineSpecification,
    shader: &ShaderModule,
    src: &Buffer,
    dst: &Buffer,
) -> Result<(ExecutionPlan, BindingTable)> {
    let device = context.device();

    let layout_bindings: Vec<_> = spec.bindings.iter().map(|b| b.layout_binding()).collect();
    let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
    let set_layout = unsafe { device.create_descriptor_set_layout(&set_layout_info, None) }
        .map_err(RuntimeError::vulkan("vkCreateDescriptorSetLayout"))?;
    let set_layout = Owned::new(device, set_layout);
    let set_layouts = [set_layout.raw()];

    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(RuntimeError::vulkan("vkCreatePipelineLayout"))?;
    let layout = Owned::new(device, layout);

    let cache = unsafe { device.create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None) }
        .map_err(RuntimeError::vulkan("vkCreatePipelineCache"))?;
    let cache = Owned::new(device, cache);

    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader.raw())
        .name(ENTRY_POINT);
    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(layout.raw());
    let pipeline = match unsafe { device.create_compute_pipelines(cache.raw(), &[pipeline_info], None) } {
        Ok(pipelines) => pipelines.into_iter().next().ok_or_else(|| {
            RuntimeError::PipelineCreation("driver returned no pipeline".to_string())
        })?,
        Err((partial, result)) => {
            for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                unsafe { device.destroy_pipeline(pipeline, None) };
            }
            return Err(RuntimeError::PipelineCreation(format!(
                "{}: {result}",
                shader.path().display()
            )));
        }
    };
    let pipeline = Owned::new(device, pipeline);

    let pool_sizes = spec.pool_sizes();
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&pool_sizes);
    let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
        .map_err(RuntimeError::vulkan("vkCreateDescriptorPool"))?;
    let pool = Owned::new(device, pool);

    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool.raw())
        .set_layouts(&set_layouts);
    let set = unsafe { device.allocate_descriptor_sets(&alloc_info) }
        .map_err(RuntimeError::vulkan("vkAllocateDescriptorSets"))?
        .into_iter()
        .next()
        .ok_or_else(|| RuntimeError::AllocationError("no descriptor set allocated".to_string()))?;

    let descriptor_type = |slot: u32| {
        spec.binding(slot)
            .map(|b| b.kind.descriptor_type())
            .ok_or_else(|| RuntimeError::InvalidSpecification(format!("slot {slot} is not declared")))
    };
    let src_info = [vk::DescriptorBufferInfo::default()
        .buffer(src.raw())
        .offset(0)
        .range(vk::WHOLE_SIZE)];
    let dst_info = [vk::DescriptorBufferInfo::default()
        .buffer(dst.raw())
        .offset(0)
        .range(vk::WHOLE_SIZE)];
    let writes = [
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(descriptor_type(0)?)
            .buffer_info(&src_info),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(1)
            .descriptor_type(descriptor_type(1)?)
            .buffer_info(&dst_info),
    ];
    unsafe { device.update_descriptor_sets(&writes, &[]) };

    tracing::debug!("Pipeline ready");
    Ok((
        ExecutionPlan {
            pipeline,
            _cache: cache,
            layout,
            _set_layout: set_layout,
        },
        BindingTable { set, _pool: pool },
    ))
}

/// Create a resettable command pool on the compute family and one primary command buffer.
#[tracing::instrument(skip_all, fields(family = context.compute_queue_family()))]
pub(crate) fn set_command_pool(context: &AcceleratorContext) -> Result<CommandList> {
    let device = context.device();
    let pool_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(context.compute_queue_family());
    let pool = unsafe { device.create_command_pool(&pool_info, None) }
        .map_err(RuntimeError::vulkan("vkCreateCommandPool"))?;
    let pool = Owned::new(device, pool);

    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool.raw())
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(RuntimeError::vulkan("vkAllocateCommandBuffers"))?
        .into_iter()
        .next()
        .ok_or_else(|| RuntimeError::AllocationError("no command buffer allocated".to_string()))?;

    Ok(CommandList { buffer, pool })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(28, 64, 65_535).unwrap(), [1, 1, 1]);
        assert_eq!(workgroup_count(64, 64, 65_535).unwrap(), [1, 1, 1]);
        assert_eq!(workgroup_count(65, 64, 65_535).unwrap(), [2, 1, 1]);
        assert_eq!(workgroup_count(1000, 1, 65_535).unwrap(), [1000, 1, 1]);
    }

    #[test]
    fn test_workgroup_count_limits() {
        assert!(matches!(
            workgroup_count(1 << 20, 1, 65_535),
            Err(RuntimeError::InvalidSpecification(_))
        ));
        assert!(workgroup_count(16, 0, 65_535).is_err());
        assert_eq!(workgroup_count(u32::MAX, 1 << 16, 1 << 16).unwrap(), [1 << 16, 1, 1]);
    }
}
