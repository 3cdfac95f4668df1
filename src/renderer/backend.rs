use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::surface::Surface;
use crate::renderer::core::target::RenderTarget;
use crate::renderer::frame::error::{acquire_result, present_result, PresentStatus, SurfaceError};
use crate::renderer::frame::FrameBackend;
use crate::renderer::internals::command::{CommandPool, DrawCall, DrawCommands};
use crate::renderer::internals::sync::FrameSlots;
use crate::renderer::internals::transfer_ctx::TransferContext;
use crate::renderer::resources::mesh::MeshBuffers;
use crate::renderer::resources::pipeline::{StaticPipeline, TextureBinding};
use crate::renderer::resources::texture::Texture;

/// Every Vulkan object the renderer owns.
///
/// Fields drop in declaration order, which is the teardown order: swapchain-dependent objects,
/// frame slots, static resources, pipeline, command pool, then the device (with its allocator),
/// the surface and the instance.
pub struct VulkanBackend {
    draw_commands: Option<DrawCommands>,
    target: Option<RenderTarget>,
    frame_slots: FrameSlots,

    mesh: MeshBuffers,
    texture_binding: TextureBinding,
    texture: Texture,
    pipeline: StaticPipeline,

    command_pool: CommandPool,
    device: RenderDevice,
    surface: Surface,
    instance: RenderInstance,

    window: Arc<Window>,
    config: RenderConfig,
}

impl VulkanBackend {
    pub fn new(window: Arc<Window>, config: &RenderConfig) -> Result<Self> {
        let instance = RenderInstance::new(&window, config.validation)?;
        let surface = Surface::new(&instance, &window)?;
        let device = RenderDevice::new(&instance, &surface)?;
        let logical = Arc::clone(&device.logical);

        let (mesh, texture) = {
            // Only needed for the uploads, released before the first frame
            let transfer_context = TransferContext::new(device.graphics_queue, logical.clone())?;
            let mesh = MeshBuffers::upload(
                &config.mesh,
                device.memory_allocator(),
                logical.clone(),
                &transfer_context,
            )?;
            let texture = Texture::from_file(
                &config.texture,
                device.memory_allocator(),
                logical.clone(),
                &transfer_context,
            )?;
            (mesh, texture)
        };
        let texture_binding = TextureBinding::new(&texture, logical.clone())?;

        let target = RenderTarget::new(&window, &surface, &instance, &device)?
            .ok_or_eyre("Window surface has no area")?;
        let pipeline = StaticPipeline::new(
            &config.vertex_shader,
            &config.fragment_shader,
            &target.render_pass,
            &texture_binding,
            logical.clone(),
        )?;

        let command_pool = CommandPool::new(&device.graphics_queue, logical.clone())?;
        let frame_slots = FrameSlots::new(logical)?;

        let mut backend = Self {
            draw_commands: None,
            target: Some(target),
            frame_slots,

            mesh,
            texture_binding,
            texture,
            pipeline,

            command_pool,
            device,
            surface,
            instance,

            window,
            config: config.clone(),
        };
        backend.draw_commands = Some(backend.record_draw_commands()?);

        log::info!(
            "Renderer ready: {} indices, {}x{} texture, {} swapchain images",
            backend.mesh.index_count,
            backend.texture.image.extent.width,
            backend.texture.image.extent.height,
            backend.image_count(),
        );

        Ok(backend)
    }

    pub fn image_count(&self) -> usize {
        self.target.as_ref().map_or(0, RenderTarget::image_count)
    }

    fn target(&self) -> Result<&RenderTarget> {
        self.target.as_ref().ok_or_eyre("Render target is missing")
    }

    fn record_draw_commands(&self) -> Result<DrawCommands> {
        let target = self.target()?;
        let draw = DrawCall {
            pipeline: self.pipeline.pipeline,
            pipeline_layout: self.pipeline.layout,
            descriptor_set: self.texture_binding.set,
            vertex_buffer: self.mesh.vertex_buffer.buffer,
            index_buffer: self.mesh.index_buffer.buffer,
            index_count: self.mesh.index_count,
            clear_color: self.config.clear_color,
        };
        DrawCommands::record(
            &self.command_pool,
            &target.render_pass,
            &target.framebuffers,
            target.extent(),
            &draw,
            Arc::clone(&self.device.logical),
        )
    }
}

impl FrameBackend for VulkanBackend {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.frame_slots.get(slot)?.in_flight;
        unsafe {
            self.device.logical.wait_for_fences(&[fence], true, u64::MAX)?;
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<(u32, PresentStatus), SurfaceError> {
        // Without a swapchain there is nothing to acquire from, which the rebuild path repairs
        let Some(target) = self.target.as_ref() else {
            return Err(SurfaceError::OutOfDate);
        };
        let Ok(frame_slot) = self.frame_slots.get(slot) else {
            return Err(SurfaceError::Device(vk::Result::ERROR_UNKNOWN));
        };

        let result = unsafe {
            target.swapchain.swapchain_loader.acquire_next_image(
                target.swapchain.swapchain,
                u64::MAX,
                frame_slot.image_acquired,
                vk::Fence::null(),
            )
        };
        acquire_result(result)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.frame_slots.get(slot)?.in_flight;
        unsafe {
            self.device.logical.reset_fences(&[fence])?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let frame_slot = self.frame_slots.get(slot)?;
        let cmd = self.draw_commands
            .as_ref()
            .and_then(|commands| commands.get(image_index))
            .ok_or_eyre(format!("No commands recorded for swapchain image {image_index}"))?;

        let wait_semaphores = [frame_slot.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [frame_slot.render_complete];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.logical.queue_submit(
                self.device.graphics_queue.handle,
                &[submit_info],
                frame_slot.in_flight,
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus, SurfaceError> {
        let Some(target) = self.target.as_ref() else {
            return Err(SurfaceError::OutOfDate);
        };
        let Ok(frame_slot) = self.frame_slots.get(slot) else {
            return Err(SurfaceError::Device(vk::Result::ERROR_UNKNOWN));
        };

        let wait_semaphores = [frame_slot.render_complete];
        let swapchains = [target.swapchain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            target.swapchain.swapchain_loader.queue_present(
                self.device.present_queue.handle,
                &present_info,
            )
        };
        present_result(result)
    }

    fn rebuild(&mut self) -> Result<usize> {
        self.device.wait_idle()?;

        // Consumers before producers: command buffers, then framebuffers, render pass,
        // image views and the swapchain itself
        self.draw_commands = None;
        self.target = None;

        let Some(target) = RenderTarget::new(
            &self.window,
            &self.surface,
            &self.instance,
            &self.device,
        )? else {
            // Acquiring without a target reports out of date, so the next tick tries again
            log::debug!("Surface has no area, deferring swapchain creation");
            return Ok(0);
        };
        if target.format() != self.pipeline.format {
            log::info!(
                "Surface format changed from {:?} to {:?}, rebuilding pipeline",
                self.pipeline.format,
                target.format(),
            );
            self.pipeline = StaticPipeline::new(
                &self.config.vertex_shader,
                &self.config.fragment_shader,
                &target.render_pass,
                &self.texture_binding,
                Arc::clone(&self.device.logical),
            )?;
        }
        self.target = Some(target);
        self.draw_commands = Some(self.record_draw_commands()?);

        let image_count = self.image_count();
        log::info!("Rebuilt swapchain with {image_count} images");
        Ok(image_count)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still uses it
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {err:?}");
        }
    }
}
