//! Owning wrappers around raw Vulkan handles.
//!
//! Every object created from the logical device is wrapped in [`Owned`],
//! which destroys it exactly once on drop. Each wrapper keeps the device
//! alive through an `Arc`, and the device keeps the instance alive, so a
//! child can never outlive the device that created it.

use crate::diagnostics::SinkSlot;
use ash::vk;
use std::ops::Deref;
use std::sync::Arc;

/// API instance plus the debug messenger and the sink it calls into.
pub(crate) struct Instance {
    // Field order matters: the loader must stay mapped until the instance is gone.
    raw: ash::Instance,
    messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    sink: SinkSlot,
    entry: ash::Entry,
}

impl Instance {
    pub(crate) fn new(entry: ash::Entry, raw: ash::Instance, sink: SinkSlot) -> Self {
        Self {
            raw,
            messenger: None,
            sink,
            entry,
        }
    }

    pub(crate) fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub(crate) fn sink(&self) -> &SinkSlot {
        &self.sink
    }

    pub(crate) fn set_messenger(
        &mut self,
        loader: ash::ext::debug_utils::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
    ) {
        self.messenger = Some((loader, messenger));
    }
}

impl Deref for Instance {
    type Target = ash::Instance;

    fn deref(&self) -> &ash::Instance {
        &self.raw
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: every device created from this instance holds an `Arc` to
        // it, so nothing derived from the instance is alive here.
        unsafe {
            if let Some((loader, messenger)) = self.messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

/// Logical device shared by the context and every object created from it.
pub struct Device {
    raw: ash::Device,
    instance: Arc<Instance>,
}

impl Device {
    pub(crate) fn new(raw: ash::Device, instance: Arc<Instance>) -> Self {
        Self { raw, instance }
    }

    pub(crate) fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &ash::Device {
        &self.raw
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: all `Owned` children hold an `Arc<Device>`, so they are gone.
        unsafe {
            if let Err(result) = self.raw.device_wait_idle() {
                tracing::warn!(%result, "device_wait_idle failed during teardown");
            }
            self.raw.destroy_device(None);
        }
    }
}

/// A device-level handle that can be destroyed with the device that made it.
pub(crate) trait DeviceObject: Copy {
    /// # Safety
    /// `self` must have been created from `device` and must not be in use.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_object {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceObject for $ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    unsafe { device.$destroy(self, None) }
                }
            }
        )*
    };
}

device_object! {
    vk::ShaderModule => destroy_shader_module,
    vk::Buffer => destroy_buffer,
    vk::DeviceMemory => free_memory,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::PipelineCache => destroy_pipeline_cache,
    vk::Pipeline => destroy_pipeline,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::CommandPool => destroy_command_pool,
    vk::Fence => destroy_fence,
}

/// Exclusive owner of one device object.
pub(crate) struct Owned<T: DeviceObject> {
    raw: T,
    device: Arc<Device>,
}

impl<T: DeviceObject> Owned<T> {
    /// Take ownership of `raw`, which must have been created from `device`.
    pub(crate) fn new(device: &Arc<Device>, raw: T) -> Self {
        Self {
            raw,
            device: Arc::clone(device),
        }
    }

    pub(crate) fn raw(&self) -> T {
        self.raw
    }

    pub(crate) fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl<T: DeviceObject> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: `raw` came from `device` (see `new`) and is dropped exactly once.
        unsafe { self.raw.destroy(&self.device) }
    }
}
