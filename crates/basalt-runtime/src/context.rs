//! Accelerator bring-up and device ownership.

use crate::config::ContextConfig;
use crate::diagnostics::{MessageSink, SinkSlot, TracingSink};
use crate::error::{Result, RuntimeError};
use crate::handle::{Device, Instance};
use crate::queue::TaskQueue;
use crate::selection::{select_compute_queue_family, select_physical_device};
use crate::shader::{ShaderLibrary, ShaderModule};
use crate::task::{ExecutionReport, Task};
use ash::vk;
use std::ffi::{CStr, CString, c_char};
use std::path::Path;
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"basalt";

/// Summary of one physical device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the driver's enumeration order.
    pub index: usize,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
}

impl DeviceInfo {
    fn from_properties(index: usize, properties: &vk::PhysicalDeviceProperties) -> Self {
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("device {index}"));
        Self {
            index,
            name,
            device_type: properties.device_type,
        }
    }
}

/// One connection to a compute-capable accelerator.
///
/// Owns the API instance, the logical device, the shader library and the
/// task queue. Fields drop top to bottom: queued tasks first, then the
/// library, then the last context-held reference to the device.
///
/// # Example
/// ```no_run
/// # use basalt_runtime::AcceleratorContext;
/// let context = AcceleratorContext::new()?;
/// println!("GPU: {} ({:?})", context.device_properties().name, context.device_properties().device_type);
/// # Ok::<(), basalt_runtime::RuntimeError>(())
/// ```
pub struct AcceleratorContext {
    tasks: TaskQueue<Task>,
    shaders: ShaderLibrary<ShaderModule>,
    device: Arc<Device>,
    queue: vk::Queue,
    physical_device: vk::PhysicalDevice,
    info: DeviceInfo,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    compute_queue_family: u32,
}

impl AcceleratorContext {
    /// Bring up the preferred device with the default configuration.
    ///
    /// # Errors
    /// Returns an error if no Vulkan loader or device is available, or any
    /// bring-up call fails.
    pub fn new() -> Result<Self> {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Result<Self> {
        Self::with_sink(config, TracingSink)
    }

    /// Bring up a device, routing validation messages to `sink`.
    #[tracing::instrument(skip_all, fields(app = %config.application_name))]
    pub fn with_sink(config: ContextConfig, sink: impl MessageSink + 'static) -> Result<Self> {
        let instance = Arc::new(create_instance(&config, SinkSlot::new(Box::new(sink)))?);

        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(RuntimeError::vulkan("vkEnumeratePhysicalDevices"))?;
        let all_properties: Vec<vk::PhysicalDeviceProperties> = physical_devices
            .iter()
            .map(|&pd| unsafe { instance.get_physical_device_properties(pd) })
            .collect();
        let device_types: Vec<_> = all_properties.iter().map(|p| p.device_type).collect();
        let index = select_physical_device(&device_types).ok_or(RuntimeError::NoSuitableDevice)?;

        let physical_device = physical_devices[index];
        let properties = all_properties[index];
        let info = DeviceInfo::from_properties(index, &properties);
        tracing::info!(name = %info.name, device_type = ?info.device_type, index, "Selected device");

        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let compute_queue_family = select_compute_queue_family(&families, &info.name)?;
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(compute_queue_family)
            .queue_priorities(&priorities)];
        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);
        let raw = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(|e| RuntimeError::InitError(format!("Failed to create device: {e}")))?;
        let device = Arc::new(Device::new(raw, instance));
        let queue = unsafe { device.get_device_queue(compute_queue_family, 0) };

        tracing::debug!(compute_queue_family, "Logical device ready");
        Ok(Self {
            tasks: TaskQueue::new(),
            shaders: ShaderLibrary::new(),
            device,
            queue,
            physical_device,
            info,
            properties,
            memory_properties,
            compute_queue_family,
        })
    }

    /// List every physical device the instance can see.
    pub fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        let instance = self.device.instance();
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(RuntimeError::vulkan("vkEnumeratePhysicalDevices"))?;
        Ok(physical_devices
            .iter()
            .enumerate()
            .map(|(i, &pd)| {
                let properties = unsafe { instance.get_physical_device_properties(pd) };
                DeviceInfo::from_properties(i, &properties)
            })
            .collect())
    }

    /// Append a task at the tail of the queue.
    pub fn push_task(&mut self, task: Task) {
        tracing::debug!(kernel = %task.kernel_path().display(), "Queued task");
        self.tasks.push(task);
    }

    /// Run queued tasks in FIFO order until the queue is empty.
    ///
    /// Each task is removed from the queue right before it executes and is
    /// released once it has finished.
    ///
    /// # Errors
    /// The first failing task's error; tasks behind it stay queued.
    pub fn execute_tasks(&mut self) -> Result<Vec<ExecutionReport>> {
        let mut tasks = std::mem::take(&mut self.tasks);
        let context: &Self = self;
        let result = tasks.drain(|mut task| task.execute(context));
        self.tasks = tasks;
        result
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Load the kernel at `path` into the shader library.
    ///
    /// Returns `Ok(false)` and logs if the path is already loaded or the file
    /// cannot be read as SPIR-V.
    ///
    /// # Errors
    /// `Vulkan` if the driver rejects the module.
    pub fn add_shader(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let device = &self.device;
        self.shaders
            .insert_with(path, |p| ShaderModule::load(device, p))
    }

    /// Drop the library entry for `path`; logs a warning if there is none.
    pub fn remove_shader(&mut self, path: impl AsRef<Path>) -> bool {
        self.shaders.remove(path).is_some()
    }

    pub fn contains_shader(&self, path: impl AsRef<Path>) -> bool {
        self.shaders.contains(path)
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn compute_queue_family(&self) -> u32 {
        self.compute_queue_family
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.queue
    }

    /// Name and type of the selected device.
    pub fn device_properties(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }
}

impl std::fmt::Debug for AcceleratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceleratorContext")
            .field("device", &self.info)
            .field("compute_queue_family", &self.compute_queue_family)
            .field("pending_tasks", &self.tasks.len())
            .field("shaders", &self.shaders.len())
            .finish_non_exhaustive()
    }
}

/// Layers and extensions that are both wanted and available.
fn instance_layers(
    entry: &ash::Entry,
    config: &ContextConfig,
) -> Result<(Vec<*const c_char>, Vec<*const c_char>)> {
    if !config.enable_validation {
        return Ok((Vec::new(), Vec::new()));
    }

    let available_layers = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(RuntimeError::vulkan("vkEnumerateInstanceLayerProperties"))?;
    let has_validation = available_layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
    let layers = if has_validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        tracing::warn!("Validation layer not available, continuing without it");
        Vec::new()
    };

    let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(RuntimeError::vulkan("vkEnumerateInstanceExtensionProperties"))?;
    let debug_utils = ash::ext::debug_utils::NAME;
    let extensions = if available_extensions
        .iter()
        .any(|ext| ext.extension_name_as_c_str() == Ok(debug_utils))
    {
        vec![debug_utils.as_ptr()]
    } else {
        tracing::warn!("VK_EXT_debug_utils not available, validation messages will be dropped");
        Vec::new()
    };

    Ok((layers, extensions))
}

fn create_instance(config: &ContextConfig, sink: SinkSlot) -> Result<Instance> {
    let entry = unsafe { ash::Entry::load() }.map_err(|e| RuntimeError::Loader(e.to_string()))?;

    let app_name = CString::new(config.application_name.as_str())
        .map_err(|e| RuntimeError::InitError(format!("invalid application name: {e}")))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(config.application_version)
        .engine_name(ENGINE_NAME)
        .engine_version(1)
        .api_version(vk::API_VERSION_1_0);

    let (layers, extensions) = instance_layers(&entry, config)?;
    let messenger_wanted = !extensions.is_empty();

    // Also chained into instance creation so create/destroy are covered.
    let mut messenger_info = sink.messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions);
    if messenger_wanted {
        create_info = create_info.push_next(&mut messenger_info);
    }

    let raw = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| RuntimeError::InitError(format!("Failed to create instance: {e}")))?;
    let mut instance = Instance::new(entry, raw, sink);

    if messenger_wanted {
        let loader = ash::ext::debug_utils::Instance::new(instance.entry(), &instance);
        let info = instance.sink().messenger_create_info();
        let messenger = unsafe { loader.create_debug_utils_messenger(&info, None) }
            .map_err(RuntimeError::vulkan("vkCreateDebugUtilsMessengerEXT"))?;
        instance.set_messenger(loader, messenger);
    }

    tracing::debug!(layers = layers.len(), extensions = extensions.len(), "Instance created");
    Ok(instance)
}
