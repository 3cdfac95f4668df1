use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::surface::Surface;
use crate::renderer::internals::render_pass::{Framebuffers, RenderPass};
use crate::renderer::internals::swapchain::{Swapchain, SwapchainConfig, SwapchainImageViews};

/// Presentation target of the renderer: the swapchain and everything created from its images.
///
/// Built and destroyed as one unit. Fields drop in declaration order, so consumers go before
/// the objects they were created from.
pub struct RenderTarget {
    pub framebuffers: Framebuffers,
    pub render_pass: RenderPass,
    // Held for the framebuffers that reference the views
    _image_views: SwapchainImageViews,
    pub swapchain: Swapchain,
}

impl RenderTarget {
    /// Returns `None` while the surface has no area, since a swapchain cannot be created for it
    pub fn new(
        window: &Window,
        surface: &Surface,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Option<Self>> {
        let support = surface.query_support(dev.physical)?;
        let window_size = window.inner_size();
        let config = SwapchainConfig::negotiate(
            &support,
            (window_size.width, window_size.height),
            &dev.queue_families,
        )?;
        if config.extent.width == 0 || config.extent.height == 0 {
            return Ok(None);
        }

        let swapchain = Swapchain::new(&config, surface, ins, dev)?;
        let image_views = SwapchainImageViews::new(&swapchain, Arc::clone(&dev.logical))?;
        let render_pass = RenderPass::new(swapchain.format, Arc::clone(&dev.logical))?;
        let framebuffers = Framebuffers::new(
            &render_pass,
            &image_views,
            swapchain.extent,
            Arc::clone(&dev.logical),
        )?;

        Ok(Some(Self {
            framebuffers,
            render_pass,
            _image_views: image_views,
            swapchain,
        }))
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }
}
