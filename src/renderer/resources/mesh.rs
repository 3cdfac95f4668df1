use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use crate::renderer::internals::buffer::Buffer;
use crate::renderer::internals::transfer_ctx::TransferContext;
use crate::renderer::resources::vertex::Vertex;

/// CPU-side geometry drawn with a single indexed draw call
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl Mesh {
    /// Checks that the indices form whole triangles over existing vertices
    pub fn validate(&self) -> Result<()> {
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(eyre!("Mesh needs whole triangles, got {} indices", self.indices.len()));
        }
        if let Some(index) = self.indices.iter().find(|index| **index as usize >= self.vertices.len()) {
            return Err(eyre!(
                "Mesh index {index} is out of range for {} vertices",
                self.vertices.len(),
            ));
        }
        Ok(())
    }

    /// Textured quad centered in clip space, clockwise as seen on screen
    pub fn quad() -> Self {
        let vertices = vec![
            Vertex { // Top left
                position: [-0.5, -0.5].into(),
                color: [1.0, 0.0, 0.0].into(),
                texcoord: [1.0, 0.0].into(),
            },
            Vertex { // Top right
                position: [0.5, -0.5].into(),
                color: [0.0, 1.0, 0.0].into(),
                texcoord: [0.0, 0.0].into(),
            },
            Vertex { // Bottom right
                position: [0.5, 0.5].into(),
                color: [0.0, 0.0, 1.0].into(),
                texcoord: [0.0, 1.0].into(),
            },
            Vertex { // Bottom left
                position: [-0.5, 0.5].into(),
                color: [1.0, 1.0, 1.0].into(),
                texcoord: [1.0, 1.0].into(),
            },
        ];

        let indices = vec![
            0, 1, 2, // Upper right triangle
            2, 3, 0, // Lower left triangle
        ];

        Self { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Device-local copies of a mesh's vertex and index data
pub struct MeshBuffers {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

impl MeshBuffers {
    pub fn upload(
        mesh: &Mesh,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self> {
        mesh.validate()?;

        let vertex_buffer = Buffer::new_device_local(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Vertex buffer",
            memory_allocator.clone(),
            device.clone(),
            transfer_context,
        )?;
        let index_buffer = Buffer::new_device_local(
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "Index buffer",
            memory_allocator,
            device,
            transfer_context,
        )?;

        log::debug!(
            "Uploaded mesh: {} vertices ({} bytes), {} indices ({} bytes)",
            mesh.vertices.len(),
            vertex_buffer.size,
            mesh.indices.len(),
            index_buffer.size,
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }
}
