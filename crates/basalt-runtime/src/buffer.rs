//! Host-visible device buffers.

use crate::error::{Result, RuntimeError};
use crate::handle::{Device, Owned};
use crate::selection::find_memory_type;
use ash::vk;
use std::sync::Arc;

/// A storage buffer backed by its own host-visible, host-coherent allocation.
pub struct Buffer {
    buffer: Owned<vk::Buffer>,
    memory: Owned<vk::DeviceMemory>,
    element_size: u32,
    element_count: u32,
}

impl Buffer {
    /// Create a `count × size` byte buffer and bind fresh memory to it at offset 0.
    ///
    /// # Errors
    /// `NoSuitableMemoryType` if no memory type allowed for the buffer is both
    /// host-visible and host-coherent.
    pub(crate) fn new(
        device: &Arc<Device>,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        element_count: u32,
        element_size: u32,
    ) -> Result<Self> {
        let size = u64::from(element_count) * u64::from(element_size);
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&info, None) }
            .map_err(|e| RuntimeError::AllocationError(format!("vkCreateBuffer({size} bytes): {e}")))?;
        let buffer = Owned::new(device, buffer);

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer.raw()) };
        let memory_type_index = find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.map_err(|e| {
            RuntimeError::AllocationError(format!(
                "vkAllocateMemory({} bytes, type {memory_type_index}): {e}",
                requirements.size
            ))
        })?;
        let memory = Owned::new(device, memory);

        unsafe { device.bind_buffer_memory(buffer.raw(), memory.raw(), 0) }
            .map_err(RuntimeError::vulkan("vkBindBufferMemory"))?;

        tracing::debug!(
            size,
            element_count,
            element_size,
            memory_type_index,
            "Allocated buffer"
        );

        Ok(Self {
            buffer,
            memory,
            element_size,
            element_count,
        })
    }

    pub(crate) fn raw(&self) -> vk::Buffer {
        self.buffer.raw()
    }

    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        u64::from(self.element_count) * u64::from(self.element_size)
    }

    /// Fill with `0..count`, each value little-endian in `element_size` bytes.
    pub(crate) fn fill_sequence(&self) -> Result<()> {
        let bytes = encode_sequence(self.element_count, self.element_size);
        self.with_mapped(|mapped| mapped.copy_from_slice(&bytes))
    }

    /// Read every element back, widened to `u64`.
    pub fn read_elements(&self) -> Result<Vec<u64>> {
        let mut bytes = vec![0u8; self.size_in_bytes() as usize];
        self.with_mapped(|mapped| bytes.copy_from_slice(mapped))?;
        Ok(decode_elements(&bytes, self.element_size))
    }

    /// Map the whole allocation, run `f` over it, unmap.
    fn with_mapped<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let device = self.memory.device();
        let len = self.size_in_bytes() as usize;
        // SAFETY: the memory is host-visible, not currently mapped, and at
        // least `len` bytes long.
        unsafe {
            let ptr = device
                .map_memory(self.memory.raw(), 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(RuntimeError::vulkan("vkMapMemory"))?;
            let result = f(std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len));
            device.unmap_memory(self.memory.raw());
            Ok(result)
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("element_size", &self.element_size)
            .field("element_count", &self.element_count)
            .finish_non_exhaustive()
    }
}

/// Bytes of `0..count`, each truncated (or zero-extended) to `element_size` bytes.
pub(crate) fn encode_sequence(count: u32, element_size: u32) -> Vec<u8> {
    let width = element_size as usize;
    let mut bytes = vec![0u8; count as usize * width];
    for (i, element) in bytes.chunks_exact_mut(width).enumerate() {
        let value = (i as u64).to_le();
        let value = bytemuck::bytes_of(&value);
        let n = width.min(value.len());
        element[..n].copy_from_slice(&value[..n]);
    }
    bytes
}

/// Inverse of [`encode_sequence`]: little-endian elements, low eight bytes kept.
pub(crate) fn decode_elements(bytes: &[u8], element_size: u32) -> Vec<u64> {
    bytes
        .chunks_exact(element_size as usize)
        .map(|element| {
            let mut wide = [0u8; 8];
            let n = element.len().min(8);
            wide[..n].copy_from_slice(&element[..n]);
            u64::from_le(bytemuck::pod_read_unaligned(&wide))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_u32() {
        let bytes = encode_sequence(4, 4);
        assert_eq!(bytes, [0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(decode_elements(&bytes, 4), [0, 1, 2, 3]);
    }

    #[test]
    fn test_sequence_truncates_to_element_width() {
        let bytes = encode_sequence(300, 1);
        assert_eq!(bytes.len(), 300);
        assert_eq!(bytes[255], 255);
        assert_eq!(bytes[256], 0);
        assert_eq!(bytes[299], 43);

        let values = decode_elements(&encode_sequence(70_000, 2), 2);
        assert_eq!(values[65_535], 65_535);
        assert_eq!(values[65_536], 0);
    }

    #[test]
    fn test_sequence_widens_beyond_eight_bytes() {
        let bytes = encode_sequence(3, 12);
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[12..24], &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_elements(&bytes, 12), [0, 1, 2]);
    }

    #[test]
    fn test_decode_odd_width() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(decode_elements(&bytes, 3), [0x03_02_01, 0x06_05_04]);
    }
}
