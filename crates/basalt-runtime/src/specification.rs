//! Declarative inputs to the task builder.

use crate::error::{Result, RuntimeError};
use ash::vk;

/// Element counts and per-element byte widths of a task's two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferSpecification {
    pub src_count: u32,
    pub src_size: u32,
    pub dst_count: u32,
    pub dst_size: u32,
}

impl BufferSpecification {
    pub fn new(src_count: u32, src_size: u32, dst_count: u32, dst_size: u32) -> Self {
        Self {
            src_count,
            src_size,
            dst_count,
            dst_size,
        }
    }

    /// Same count and element width on both sides.
    pub fn symmetric(count: u32, size: u32) -> Self {
        Self::new(count, size, count, size)
    }

    pub fn src_bytes(&self) -> vk::DeviceSize {
        u64::from(self.src_count) * u64::from(self.src_size)
    }

    pub fn dst_bytes(&self) -> vk::DeviceSize {
        u64::from(self.dst_count) * u64::from(self.dst_size)
    }

    /// Number of invocations a dispatch has to cover.
    pub fn invocations(&self) -> u32 {
        self.src_count.max(self.dst_count)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("src_count", self.src_count),
            ("src_size", self.src_size),
            ("dst_count", self.dst_count),
            ("dst_size", self.dst_size),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(RuntimeError::InvalidSpecification(format!(
                "{name} must be non-zero"
            ))),
            None => Ok(()),
        }
    }
}

impl BufferSpecification {
    /// Both buffers are bound with their full extent, so each must fit in
    /// one storage-buffer descriptor.
    pub fn check_storage_range(&self, max_range: u32) -> Result<()> {
        for (name, bytes) in [("source", self.src_bytes()), ("destination", self.dst_bytes())] {
            if bytes > u64::from(max_range) {
                return Err(RuntimeError::InvalidSpecification(format!(
                    "{name} buffer is {bytes} bytes, device storage-buffer range is {max_range}"
                )));
            }
        }
        Ok(())
    }
}

/// Kind of resource bound at a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    StorageBuffer,
    UniformBuffer,
}

impl ResourceKind {
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        }
    }
}

/// Pipeline stages a binding is visible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Compute,
    All,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
            Self::All => vk::ShaderStageFlags::ALL,
        }
    }
}

/// One entry of a binding-table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDescriptor {
    pub slot: u32,
    pub kind: ResourceKind,
    pub stage: ShaderStage,
}

impl BindingDescriptor {
    pub fn new(slot: u32, kind: ResourceKind, stage: ShaderStage) -> Self {
        Self { slot, kind, stage }
    }

    pub(crate) fn layout_binding(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.slot)
            .descriptor_type(self.kind.descriptor_type())
            .descriptor_count(1)
            .stage_flags(self.stage.flags())
    }
}

/// Ordered binding layout of a task's kernel.
///
/// Slot 0 is always wired to the source buffer and slot 1 to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineSpecification {
    pub bindings: Vec<BindingDescriptor>,
}

impl PipelineSpecification {
    pub fn new(bindings: Vec<BindingDescriptor>) -> Self {
        Self { bindings }
    }

    /// Two compute-visible storage buffers at slots 0 and 1.
    pub fn storage_pair() -> Self {
        Self::new(vec![
            BindingDescriptor::new(0, ResourceKind::StorageBuffer, ShaderStage::Compute),
            BindingDescriptor::new(1, ResourceKind::StorageBuffer, ShaderStage::Compute),
        ])
    }

    pub fn binding(&self, slot: u32) -> Option<&BindingDescriptor> {
        self.bindings.iter().find(|b| b.slot == slot)
    }

    /// Descriptor counts per kind, for sizing the binding-table pool.
    pub(crate) fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let ty = binding.kind.descriptor_type();
            match sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += 1,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: 1,
                }),
            }
        }
        sizes
    }

    pub fn validate(&self) -> Result<()> {
        if self.bindings.len() < 2 {
            return Err(RuntimeError::InvalidSpecification(format!(
                "layout declares {} binding(s), at least 2 are required",
                self.bindings.len()
            )));
        }
        for (i, binding) in self.bindings.iter().enumerate() {
            if self.bindings[..i].iter().any(|b| b.slot == binding.slot) {
                return Err(RuntimeError::InvalidSpecification(format!(
                    "slot {} declared twice",
                    binding.slot
                )));
            }
        }
        for (slot, role) in [(0, "source"), (1, "destination")] {
            // Task buffers are created with storage usage only.
            match self.binding(slot) {
                Some(b) if b.kind == ResourceKind::StorageBuffer => {}
                Some(b) => {
                    return Err(RuntimeError::InvalidSpecification(format!(
                        "slot {slot} ({role}) must be a storage buffer, found {:?}",
                        b.kind
                    )));
                }
                None => {
                    return Err(RuntimeError::InvalidSpecification(format!(
                        "slot {slot} ({role}) is not declared"
                    )));
                }
            }
        }
        Ok(())
    }
}
