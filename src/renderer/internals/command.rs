use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::core::queue::Queue;
use crate::renderer::internals::render_pass::{Framebuffers, RenderPass};

/// Pool the per-image draw command buffers are allocated from. Outlives every swapchain.
pub struct CommandPool {
    pub handle: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl CommandPool {
    pub fn new(queue: &Queue, device: Arc<ash::Device>) -> Result<Self> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family_index);
        let handle = unsafe { device.create_command_pool(&command_pool_info, None)? };

        Ok(Self { handle, device })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}

/// Handles and parameters of the one draw every command buffer repeats
#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub clear_color: [f32; 4],
}

/// Pre-recorded command buffers, indexed by swapchain image
pub struct DrawCommands {
    pub buffers: Vec<vk::CommandBuffer>,
    pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl DrawCommands {
    /// Records the same draw once per framebuffer. Nothing here changes from frame to frame,
    /// so the buffers are only re-recorded when the swapchain is rebuilt.
    pub fn record(
        pool: &CommandPool,
        render_pass: &RenderPass,
        framebuffers: &Framebuffers,
        extent: vk::Extent2D,
        draw: &DrawCall,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);
        let buffers = unsafe { device.allocate_command_buffers(&allocate_info)? };
        let commands = Self {
            buffers,
            pool: pool.handle,
            device,
        };

        for (cmd, framebuffer) in commands.buffers.iter().zip(&framebuffers.handles) {
            commands.record_one(*cmd, render_pass, *framebuffer, extent, draw)?;
        }

        Ok(commands)
    }

    pub fn get(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index as usize).copied()
    }

    fn record_one(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: &RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        draw: &DrawCall,
    ) -> Result<()> {
        let device = &self.device;
        let begin_info = vk::CommandBufferBeginInfo::default();
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: draw.clear_color },
        }];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle)
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        unsafe {
            device.begin_command_buffer(cmd, &begin_info)?;
            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(extent)]);

            device.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, draw.index_buffer, 0, vk::IndexType::UINT16);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                draw.pipeline_layout,
                0,
                &[draw.descriptor_set],
                &[],
            );
            device.cmd_draw_indexed(cmd, draw.index_count, 1, 0, 0, 0);

            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

impl Drop for DrawCommands {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.pool, &self.buffers);
        }
    }
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
