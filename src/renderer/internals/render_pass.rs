use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::internals::swapchain::SwapchainImageViews;

/// Single-subpass pass that clears one color attachment and leaves it ready to present
pub struct RenderPass {
    pub handle: vk::RenderPass,
    pub format: vk::Format,
    device: Arc<ash::Device>,
}

impl RenderPass {
    pub fn new(format: vk::Format, device: Arc<ash::Device>) -> Result<Self> {
        let color_attachment = vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);
        let color_attachment_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_refs);

        // The layout transition at the start of the pass must wait for the acquire semaphore,
        // which the submission only waits on at the color attachment output stage
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let attachments = [color_attachment];
        let subpasses = [subpass];
        let dependencies = [dependency];
        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe { device.create_render_pass(&render_pass_info, None)? };

        Ok(Self { handle, format, device })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

/// One framebuffer per swapchain image view, all bound to the same render pass
pub struct Framebuffers {
    pub handles: Vec<vk::Framebuffer>,
    device: Arc<ash::Device>,
}

impl Framebuffers {
    pub fn new(
        render_pass: &RenderPass,
        image_views: &SwapchainImageViews,
        extent: vk::Extent2D,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let mut framebuffers = Self {
            handles: Vec::with_capacity(image_views.views.len()),
            device,
        };

        for view in &image_views.views {
            let attachments = [*view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                framebuffers.device.create_framebuffer(&framebuffer_info, None)?
            };
            framebuffers.handles.push(framebuffer);
        }

        Ok(framebuffers)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.handles.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
