use ash::vk;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use crate::renderer::core::instance::RenderInstance;

/// Presentation surface of the window
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

/// Capability report of a physical device for a surface
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

impl Surface {
    pub fn new(ins: &RenderInstance, window: &Window) -> Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                &ins.entry,
                &ins.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        let loader = ash::khr::surface::Instance::new(&ins.entry, &ins.instance);
        Ok(Self { handle, loader })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
                .unwrap_or(false)
        }
    }

    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.loader
                    .get_physical_device_surface_capabilities(physical_device, self.handle)?,
                self.loader
                    .get_physical_device_surface_formats(physical_device, self.handle)?,
                self.loader
                    .get_physical_device_surface_present_modes(physical_device, self.handle)?,
            )
        };

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
