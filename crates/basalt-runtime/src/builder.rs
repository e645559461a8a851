//! Declarative task construction.

use crate::context::AcceleratorContext;
use crate::error::{Result, RuntimeError};
use crate::specification::{BufferSpecification, PipelineSpecification};
use crate::task::{self, Task};
use std::fmt;
use std::path::{Path, PathBuf};

/// Workgroup size assumed when the kernel does not declare one.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// One of the four ordered task setup steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Shader,
    Buffers,
    Pipeline,
    CommandPool,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shader => "set_shader",
            Self::Buffers => "set_buffers",
            Self::Pipeline => "set_pipeline",
            Self::CommandPool => "set_command_pool",
        };
        f.write_str(name)
    }
}

fn failed_at(stage: SetupStage) -> impl FnOnce(RuntimeError) -> RuntimeError {
    move |source| {
        tracing::warn!(%stage, error = %source, "Task setup failed, releasing earlier resources");
        RuntimeError::Build {
            stage,
            source: Box::new(source),
        }
    }
}

/// `local_size_x` the dispatch is sized with: the kernel's own, else `fallback`.
fn dispatch_local_size(declared: Option<[u32; 3]>, fallback: u32) -> u32 {
    match declared {
        Some([x, _, _]) if x > 0 => x,
        _ => {
            tracing::warn!(
                fallback,
                "Kernel declares no workgroup size, sizing the dispatch with the fallback"
            );
            fallback
        }
    }
}

/// Builds [`Task`]s against a borrowed context.
///
/// The builder is reusable: every call to [`create`](Self::create) produces an
/// independent task from the current configuration.
///
/// # Example
/// ```no_run
/// # use basalt_runtime::{AcceleratorContext, BufferSpecification, PipelineSpecification, TaskBuilder};
/// # fn main() -> basalt_runtime::Result<()> {
/// let mut context = AcceleratorContext::new()?;
/// let task = TaskBuilder::new(&context)
///     .shader("shaders/copy.comp.spv")
///     .buffers(BufferSpecification::symmetric(28, 4))
///     .pipeline(PipelineSpecification::storage_pair())
///     .create()?;
/// context.push_task(task);
/// let reports = context.execute_tasks()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskBuilder<'ctx> {
    context: &'ctx AcceleratorContext,
    shader: PathBuf,
    buffers: BufferSpecification,
    pipeline: PipelineSpecification,
    workgroup_size: u32,
}

impl<'ctx> TaskBuilder<'ctx> {
    /// Empty configuration: no kernel, zero-sized buffers and an empty layout.
    pub fn new(context: &'ctx AcceleratorContext) -> Self {
        Self {
            context,
            shader: PathBuf::new(),
            buffers: BufferSpecification::default(),
            pipeline: PipelineSpecification::default(),
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
        }
    }

    pub fn shader(mut self, path: impl Into<PathBuf>) -> Self {
        self.shader = path.into();
        self
    }

    pub fn buffers(mut self, spec: BufferSpecification) -> Self {
        self.buffers = spec;
        self
    }

    pub fn pipeline(mut self, spec: PipelineSpecification) -> Self {
        self.pipeline = spec;
        self
    }

    /// Fallback workgroup size for kernels that do not declare one.
    pub fn workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = size;
        self
    }

    pub fn set_shader(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.shader = path.into();
        self
    }

    pub fn set_buffers(&mut self, spec: BufferSpecification) -> &mut Self {
        self.buffers = spec;
        self
    }

    pub fn set_pipeline(&mut self, spec: PipelineSpecification) -> &mut Self {
        self.pipeline = spec;
        self
    }

    pub fn set_workgroup_size(&mut self, size: u32) -> &mut Self {
        self.workgroup_size = size;
        self
    }

    pub fn shader_path(&self) -> &Path {
        &self.shader
    }

    pub fn buffer_spec(&self) -> &BufferSpecification {
        &self.buffers
    }

    pub fn pipeline_spec(&self) -> &PipelineSpecification {
        &self.pipeline
    }

    /// Check the configuration without touching the device.
    pub fn validate(&self) -> Result<()> {
        if self.shader.as_os_str().is_empty() {
            return Err(RuntimeError::InvalidSpecification(
                "no kernel path set".to_string(),
            ));
        }
        if self.workgroup_size == 0 {
            return Err(RuntimeError::InvalidSpecification(
                "workgroup size must be non-zero".to_string(),
            ));
        }
        self.buffers.validate()?;
        self.pipeline.validate()
    }

    /// Run `set_shader → set_buffers → set_pipeline → set_command_pool`.
    ///
    /// # Errors
    /// `InvalidSpecification` if [`validate`](Self::validate) fails or a buffer
    /// exceeds the device's storage-buffer range. Otherwise a
    /// failing step yields `RuntimeError::Build` naming it, after every
    /// resource the earlier steps created has been released.
    #[tracing::instrument(skip_all, fields(kernel = %self.shader.display()))]
    pub fn create(&self) -> Result<Task> {
        self.validate()?;
        let context = self.context;
        self.buffers
            .check_storage_range(context.limits().max_storage_buffer_range)?;

        let shader = task::set_shader(context, &self.shader).map_err(failed_at(SetupStage::Shader))?;
        let buffers =
            task::set_buffers(context, &self.buffers).map_err(failed_at(SetupStage::Buffers))?;

        let local_size_x = dispatch_local_size(shader.local_size(), self.workgroup_size);
        let max_groups_x = context.limits().max_compute_work_group_count[0];
        let workgroups = task::workgroup_count(self.buffers.invocations(), local_size_x, max_groups_x)
            .map_err(failed_at(SetupStage::Pipeline))?;
        let plan = task::set_pipeline(context, &self.pipeline, &shader, &buffers.0, &buffers.1)
            .map_err(failed_at(SetupStage::Pipeline))?;

        let commands = task::set_command_pool(context).map_err(failed_at(SetupStage::CommandPool))?;

        tracing::debug!(?workgroups, local_size_x, "Task created");
        Ok(Task::assemble(shader, buffers, plan, commands, workgroups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(SetupStage::Shader.to_string(), "set_shader");
        assert_eq!(SetupStage::Buffers.to_string(), "set_buffers");
        assert_eq!(SetupStage::Pipeline.to_string(), "set_pipeline");
        assert_eq!(SetupStage::CommandPool.to_string(), "set_command_pool");
    }

    #[test]
    fn test_dispatch_local_size() {
        assert_eq!(dispatch_local_size(Some([16, 1, 1]), 64), 16);
        assert_eq!(dispatch_local_size(None, 64), 64);
        assert_eq!(dispatch_local_size(Some([0, 1, 1]), 32), 32);
    }

    #[test]
    fn test_build_error_carries_stage() {
        let err = failed_at(SetupStage::Buffers)(RuntimeError::NoSuitableMemoryType {
            type_bits: 0b11,
            flags: ash::vk::MemoryPropertyFlags::HOST_VISIBLE,
        });
        assert_eq!(err.stage(), Some(SetupStage::Buffers));
        assert!(err.to_string().starts_with("task setup failed at set_buffers"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(RuntimeError::DeviceMismatch.stage(), None);
    }
}
