use std::mem::offset_of;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, texcoord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed_floats() {
        assert_eq!(size_of::<Vertex>(), 7 * size_of::<f32>());
        assert_eq!(Vertex::binding_description().stride as usize, size_of::<Vertex>());

        let offsets = Vertex::attribute_descriptions().map(|attr| attr.offset as usize);
        assert_eq!(offsets, [0, 2 * size_of::<f32>(), 5 * size_of::<f32>()]);
    }

    #[test]
    fn attributes_match_shader_locations() {
        let attributes = Vertex::attribute_descriptions();
        for (location, attr) in attributes.iter().enumerate() {
            assert_eq!(attr.location as usize, location);
            assert_eq!(attr.binding, Vertex::binding_description().binding);
        }
    }

    #[test]
    fn vertex_bytes_are_plain_data() {
        let vertex = Vertex {
            position: Vec2::new(-0.5, 0.5),
            color: Vec3::new(1.0, 0.0, 0.0),
            texcoord: Vec2::new(0.0, 1.0),
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&vertex));
        assert_eq!(floats, &[-0.5, 0.5, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
