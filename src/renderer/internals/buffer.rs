use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::eyre::Result;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::internals::transfer_ctx::TransferContext;

pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_loc: MemoryLocation,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = mem_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))
            .and_then(|mut allocator| {
                Ok(allocator.allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: mem_loc,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })?)
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        // From here on `Drop` releases both the buffer and its memory
        let buffer = Self {
            buffer,
            size,

            allocation: Some(allocation),
            memory_allocator: mem_allocator,
            device,
        };

        let allocation = buffer.allocation.as_ref().ok_or_eyre("Buffer has no allocation")?;
        unsafe {
            buffer.device.bind_buffer_memory(
                buffer.buffer,
                allocation.memory(),
                allocation.offset(),
            )?;
        }

        Ok(buffer)
    }

    /// Creates a device-local buffer holding `data`, copied in through a host-visible staging
    /// buffer that is released once the transfer has completed
    pub fn new_device_local<T: Copy>(
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as u64;
        if size == 0 {
            return Err(eyre!("Cannot upload empty buffer {name}"));
        }

        let mut staging_buffer = Self::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{name} staging buffer"),
            MemoryLocation::CpuToGpu,
            mem_allocator.clone(),
            device.clone(),
        )?;
        staging_buffer.write(data, 0)?;

        let buffer = Self::new(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
            MemoryLocation::GpuOnly,
            mem_allocator,
            device,
        )?;

        transfer_context.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy::default().size(size);
            unsafe {
                device.cmd_copy_buffer(cmd, staging_buffer.buffer, buffer.buffer, &[region]);
            }
            Ok(())
        })?;

        Ok(buffer)
    }

    /// Copies `data` into the host-visible memory of this buffer
    pub fn write<T: Copy>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord> {
        let mut slab = self.allocation
            .as_mut()
            .and_then(|allocation| allocation.try_as_mapped_slab())
            .ok_or_eyre("Cannot write to buffer that is not host-visible")?;
        write_slice(data, &mut slab, start_offset)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free buffer memory: {err}");
                    }
                }
                Err(err) => log::error!("Memory allocator lock poisoned: {err}"),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Copies `data` into `slab` at exactly `start_offset`. Fails instead of silently shifting
/// the data when the offset is not suitably aligned for `T`.
pub fn write_slice<T: Copy, S: presser::Slab>(
    data: &[T],
    slab: &mut S,
    start_offset: usize,
) -> Result<presser::CopyRecord> {
    let record = presser::copy_from_slice_to_offset(data, slab, start_offset)?;
    if record.copy_start_offset != start_offset {
        return Err(eyre!(
            "Write requested at offset {start_offset} landed at {}",
            record.copy_start_offset,
        ));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::NonNull;
    use crate::renderer::resources::mesh::Mesh;
    use crate::renderer::resources::vertex::Vertex;

    /// Host memory standing in for a mapped staging allocation. The u64 backing keeps the base
    /// pointer aligned the way a real mapping would be.
    fn with_host_slab<R>(
        len: usize,
        f: impl FnOnce(&mut presser::BorrowedRawAllocation<'_>) -> R,
    ) -> (R, Vec<u64>) {
        let mut backing = vec![0u64; len.div_ceil(8)];
        let ptr = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();
        let result = unsafe {
            let mut raw = presser::RawAllocation::from_raw_parts(ptr, len);
            let mut slab = raw.borrow_as_slab();
            f(&mut slab)
        };
        (result, backing)
    }

    fn bytes(backing: &[u64], len: usize) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(backing)[..len]
    }

    #[test]
    fn quad_vertices_survive_the_staging_write() {
        let mesh = Mesh::quad();
        let size = std::mem::size_of_val(mesh.vertices.as_slice());

        let (record, backing) = with_host_slab(size, |slab| write_slice(&mesh.vertices, slab, 0));
        let record = record.unwrap();
        assert_eq!(record.copy_start_offset, 0);
        assert_eq!(record.copy_end_offset, size);

        let read_back: &[Vertex] = bytemuck::cast_slice(bytes(&backing, size));
        assert_eq!(read_back, mesh.vertices.as_slice());
    }

    #[test]
    fn quad_indices_survive_the_staging_write() {
        let mesh = Mesh::quad();
        let size = std::mem::size_of_val(mesh.indices.as_slice());

        let (record, backing) = with_host_slab(size, |slab| write_slice(&mesh.indices, slab, 0));
        record.unwrap();

        let read_back: &[u16] = bytemuck::cast_slice(bytes(&backing, size));
        assert_eq!(read_back, mesh.indices.as_slice());
    }

    #[test]
    fn oversized_write_is_rejected() {
        let data = [7u32; 8];
        let (record, backing) = with_host_slab(16, |slab| write_slice(&data, slab, 0));
        assert!(record.is_err());
        assert!(backing.iter().all(|word| *word == 0));
    }

    #[test]
    fn misaligned_offset_is_rejected() {
        let data = [1.0f32, 2.0];
        let (record, _) = with_host_slab(32, |slab| write_slice(&data, slab, 2));
        assert!(record.is_err());
    }
}
