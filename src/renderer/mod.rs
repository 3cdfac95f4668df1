pub mod config;

mod backend;
mod core;
mod frame;
mod internals;
mod resources;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::backend::VulkanBackend;
use crate::renderer::config::RenderConfig;
use crate::renderer::frame::{FrameSynchronizer, TickOutcome};

pub struct Renderer {
    frames: FrameSynchronizer,
    gpu: VulkanBackend,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &RenderConfig) -> Result<Self> {
        let gpu = VulkanBackend::new(window, config)?;
        let frames = FrameSynchronizer::new(gpu.image_count());

        Ok(Self { frames, gpu })
    }

    pub fn request_resize(&mut self) {
        self.frames.request_resize();
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        self.frames.set_minimized(minimized);
    }

    /// Draws one frame, rebuilding the swapchain first or afterwards when the surface changed
    pub fn draw(&mut self) -> Result<()> {
        let slot = self.frames.current_frame();
        let outcome = self.frames.advance(&mut self.gpu)?;
        if outcome != TickOutcome::Presented {
            log::debug!("Frame slot {slot}: {outcome:?}");
        }
        Ok(())
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.frames_submitted()
    }

    pub fn swapchain_rebuilds(&self) -> u64 {
        self.frames.rebuilds()
    }
}
