use winit::event::WindowEvent;

/// Edge-triggered notifications the renderer consumes from window events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// The client area changed size and still has a non-zero area
    Resized,
    /// The client area collapsed to zero (minimized)
    Minimized,
    /// The client area came back from zero; the swapchain must be rebuilt as well
    Restored,
}

#[derive(Default)]
pub struct WindowState {
    pub minimized: bool,
    pub close_requested: bool,
}

impl WindowState {
    pub fn process_window_events(&mut self, event: &WindowEvent) -> Option<SurfaceSignal> {
        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
                None
            }
            WindowEvent::Resized(size) => {
                let zero_area = size.width == 0 || size.height == 0;
                match (self.minimized, zero_area) {
                    (false, true) => {
                        self.minimized = true;
                        Some(SurfaceSignal::Minimized)
                    }
                    (true, false) => {
                        self.minimized = false;
                        Some(SurfaceSignal::Restored)
                    }
                    (false, false) => Some(SurfaceSignal::Resized),
                    (true, true) => None,
                }
            }
            WindowEvent::ScaleFactorChanged { .. } if !self.minimized => {
                Some(SurfaceSignal::Resized)
            }
            _ => None,
        }
    }
}
