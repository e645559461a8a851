//! Device, queue-family and memory-type selection.
//!
//! These are pure functions over the property structs the driver reports,
//! kept apart from bring-up so the policies can be exercised without a GPU.

use crate::error::{Result, RuntimeError};
use ash::vk;

/// Pick the first discrete GPU, or the first device if there is none.
///
/// Returns `None` only for an empty list.
pub fn select_physical_device(device_types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    if device_types.is_empty() {
        return None;
    }
    device_types
        .iter()
        .position(|&ty| ty == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or(Some(0))
}

/// Index of the first queue family advertising compute.
///
/// `device_name` only feeds the error message.
pub fn select_compute_queue_family(
    families: &[vk::QueueFamilyProperties],
    device_name: &str,
) -> Result<u32> {
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::COMPUTE))
        .map(|index| index as u32)
        .ok_or_else(|| RuntimeError::NoComputeQueueFamily(device_name.to_string()))
}

/// Find the first memory type allowed by `type_bits` that has every flag in `required`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    memory_properties
        .memory_types_as_slice()
        .iter()
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1u32 << *i) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
        .ok_or(RuntimeError::NoSuitableMemoryType {
            type_bits,
            flags: required,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCRETE: vk::PhysicalDeviceType = vk::PhysicalDeviceType::DISCRETE_GPU;
    const INTEGRATED: vk::PhysicalDeviceType = vk::PhysicalDeviceType::INTEGRATED_GPU;

    #[test]
    fn test_discrete_gpu_wins_regardless_of_position() {
        for position in 0..4 {
            let mut types = vec![INTEGRATED; 4];
            types[position] = DISCRETE;
            assert_eq!(select_physical_device(&types), Some(position));
        }
    }

    #[test]
    fn test_first_discrete_gpu_wins_ties() {
        let types = [INTEGRATED, DISCRETE, DISCRETE];
        assert_eq!(select_physical_device(&types), Some(1));
    }

    #[test]
    fn test_falls_back_to_first_device() {
        let types = [
            INTEGRATED,
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
        ];
        assert_eq!(select_physical_device(&types), Some(0));
        assert_eq!(select_physical_device(&[]), None);
    }

    #[test]
    fn test_compute_family_selection() {
        let families = [
            vk::QueueFamilyProperties::default().queue_flags(vk::QueueFlags::TRANSFER),
            vk::QueueFamilyProperties::default()
                .queue_flags(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            vk::QueueFamilyProperties::default().queue_flags(vk::QueueFlags::COMPUTE),
        ];
        assert_eq!(select_compute_queue_family(&families, "gpu").unwrap(), 1);
    }

    #[test]
    fn test_missing_compute_family_is_an_error() {
        let families = [
            vk::QueueFamilyProperties::default().queue_flags(vk::QueueFlags::GRAPHICS),
            vk::QueueFamilyProperties::default().queue_flags(vk::QueueFlags::TRANSFER),
        ];
        let err = select_compute_queue_family(&families, "render-only").unwrap_err();
        assert!(matches!(err, RuntimeError::NoComputeQueueFamily(ref name) if name == "render-only"));
        assert!(select_compute_queue_family(&[], "empty").is_err());
    }

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let types: Vec<vk::MemoryType> = flags
            .iter()
            .map(|&f| vk::MemoryType::default().property_flags(f))
            .collect();
        vk::PhysicalDeviceMemoryProperties::default().memory_types(&types)
    }

    #[test]
    fn test_find_host_coherent_memory() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
            host,
        ]);

        assert_eq!(find_memory_type(&props, u32::MAX, host).unwrap(), 2);
        // Requirement mask excludes type 2.
        assert_eq!(find_memory_type(&props, 0b1011, host).unwrap(), 3);
    }

    #[test]
    fn test_find_memory_type_no_match() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(
            result,
            Err(RuntimeError::NoSuitableMemoryType { type_bits: u32::MAX, .. })
        ));

        let empty = vk::PhysicalDeviceMemoryProperties::default();
        assert!(find_memory_type(&empty, u32::MAX, vk::MemoryPropertyFlags::empty()).is_err());
    }
}
