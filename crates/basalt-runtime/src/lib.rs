//! Synchronous Vulkan compute dispatch.
//!
//! This crate runs single-kernel compute tasks on a Vulkan device through
//! `ash`. Each task owns two host-visible buffers, a kernel module and the
//! pipeline state that wires them together, and is executed to completion
//! before the next one starts.
//!
//! # Architecture
//!
//! 1. **Bring-up** - [`AcceleratorContext`] creates the instance, picks a
//!    device and a compute queue family, and owns the logical device
//! 2. **Setup** - [`TaskBuilder`] turns a kernel path, a
//!    [`BufferSpecification`] and a [`PipelineSpecification`] into a [`Task`]
//! 3. **Execution** - tasks are pushed onto the context's FIFO queue and
//!    drained with [`AcceleratorContext::execute_tasks`]
//!
//! # Example
//!
//! ```no_run
//! use basalt_runtime::{AcceleratorContext, BufferSpecification, PipelineSpecification, TaskBuilder};
//!
//! fn main() -> basalt_runtime::Result<()> {
//!     let mut context = AcceleratorContext::new()?;
//!
//!     let task = TaskBuilder::new(&context)
//!         .shader("shaders/copy.comp.spv")
//!         .buffers(BufferSpecification::new(28, 4, 28, 4))
//!         .pipeline(PipelineSpecification::storage_pair())
//!         .create()?;
//!
//!     context.push_task(task);
//!     for report in context.execute_tasks()? {
//!         println!("{:?}", report.destination);
//!     }
//!     Ok(())
//! }
//! ```

mod buffer;
mod builder;
mod config;
mod context;
mod diagnostics;
mod error;
mod handle;
mod queue;
mod selection;
mod shader;
mod specification;
mod spirv;
mod task;

// Public exports
pub use buffer::Buffer;
pub use builder::{DEFAULT_WORKGROUP_SIZE, SetupStage, TaskBuilder};
pub use config::ContextConfig;
pub use context::{AcceleratorContext, DeviceInfo};
pub use diagnostics::{MessageSink, Severity, TracingSink};
pub use error::{Result, RuntimeError};
pub use handle::Device;
pub use queue::TaskQueue;
pub use selection::{find_memory_type, select_compute_queue_family, select_physical_device};
pub use shader::{ENTRY_POINT, ShaderLibrary, ShaderModule};
pub use specification::{
    BindingDescriptor, BufferSpecification, PipelineSpecification, ResourceKind, ShaderStage,
};
pub use spirv::local_size;
pub use task::{ExecutionReport, Task};

pub use ash::vk;
