mod window_state;

use super::renderer::Renderer;
use color_eyre::Result;
use color_eyre::eyre::Report;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::app::window_state::{SurfaceSignal, WindowState};
use crate::renderer::config::RenderConfig;

pub struct App {
    config: RenderConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    // State
    window_state: WindowState,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Result<Self> {
        Ok(Self {
            config,
            window: None,
            renderer: None,

            window_state: WindowState::default(),
            error: None,
        })
    }

    /// Runs the event loop until the window is closed or a fatal error occurs
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("Fatal renderer error: {err:?}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (width, height) = self.config.window_size;
        let attributes = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);
        let window = Arc::new(event_loop.create_window(attributes)?);

        self.renderer = Some(Renderer::new(window.clone(), &self.config)?);
        self.window = Some(window);

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_none() {
            if let Err(err) = self.create_renderer(event_loop) {
                self.fail(event_loop, err);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        if let Some(signal) = self.window_state.process_window_events(&event) {
            if let Some(renderer) = self.renderer.as_mut() {
                match signal {
                    SurfaceSignal::Resized => renderer.request_resize(),
                    SurfaceSignal::Minimized => renderer.set_minimized(true),
                    SurfaceSignal::Restored => {
                        renderer.set_minimized(false);
                        renderer.request_resize();
                    }
                }
            }
        }

        match event {
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(err) = renderer.draw() {
                        self.fail(event_loop, err);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.window_state.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_state.close_requested {
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear the renderer down while the window it presents to is still alive
        if let Some(renderer) = self.renderer.take() {
            log::info!(
                "Shutting down after {} frames and {} swapchain rebuilds",
                renderer.frames_drawn(),
                renderer.swapchain_rebuilds(),
            );
        }
    }
}
