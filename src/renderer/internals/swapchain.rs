use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::queue::QueueFamilies;
use crate::renderer::core::surface::{Surface, SurfaceSupport};

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Everything negotiated with the presentation engine before a swapchain is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

impl SwapchainConfig {
    pub fn negotiate(
        support: &SurfaceSupport,
        window_size: (u32, u32),
        queue_families: &QueueFamilies,
    ) -> Result<Self> {
        let capabilities = &support.capabilities;
        let surface_format = choose_surface_format(&support.formats)
            .ok_or_eyre("Surface reports no formats")?;

        // Swapchain images are touched by both queues, so share them unless one family does both
        let (sharing_mode, queue_family_indices) = if queue_families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (vk::SharingMode::CONCURRENT, queue_families.unique())
        };

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(capabilities, window_size),
            min_image_count: choose_image_count(capabilities),
            pre_transform: capabilities.current_transform,
            sharing_mode,
            queue_family_indices,
        })
    }
}

/// Picks the 8-bit sRGB format with a nonlinear color space, or the first format listed
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| **format == PREFERRED_SURFACE_FORMAT)
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox when available, otherwise FIFO which every implementation must support
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|mode| *mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, unless the surface lets the swapchain decide
/// (`u32::MAX`), in which case the window size clamped to the supported bounds
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_size.0.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_size.1.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    // Recommended to request at least one more image than the minimum
    // to prevent having to wait on driver to complete internal operations
    // before another image can be acquired. A max of 0 means unbounded.
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(
        config: &SwapchainConfig,
        surface: &Surface,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(
            &ins.instance,
            &dev.logical,
        );
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(config.min_image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing_mode)
            .queue_family_indices(&config.queue_family_indices)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        // Owned by the presentation engine and released with the swapchain
        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)?
        };

        log::info!(
            "Created swapchain: {} images, {:?}, {:?}, {:?}, {}x{}",
            images.len(),
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
        );

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            format: config.surface_format.format,
            extent: config.extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// One color view per swapchain image
pub struct SwapchainImageViews {
    pub views: Vec<vk::ImageView>,
    device: Arc<ash::Device>,
}

impl SwapchainImageViews {
    pub fn new(swapchain: &Swapchain, device: Arc<ash::Device>) -> Result<Self> {
        let mut image_views = Self {
            views: Vec::with_capacity(swapchain.images.len()),
            device,
        };

        for image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(swapchain.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(*image);
            // Views created so far are released by `Drop` if a later one fails
            let view = unsafe {
                image_views.device.create_image_view(&view_info, None)?
            };
            image_views.views.push(view);
        }

        Ok(image_views)
    }
}

impl Drop for SwapchainImageViews {
    fn drop(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2160 },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn preferred_format_wins_wherever_it_is_listed() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_SURFACE_FORMAT,
        ];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_SURFACE_FORMAT));
    }

    #[test]
    fn preferred_format_needs_matching_color_space() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
    }

    #[test]
    fn rgba_srgb_beats_an_earlier_unorm_format() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn no_formats_means_no_choice() {
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_is_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn defined_current_extent_is_used_as_is() {
        let caps = capabilities((1280, 720));
        assert_eq!(
            choose_extent(&caps, (1, 1)),
            vk::Extent2D { width: 1280, height: 720 },
        );
    }

    #[test]
    fn undefined_current_extent_clamps_window_size() {
        let caps = capabilities((u32::MAX, u32::MAX));
        assert_eq!(
            choose_extent(&caps, (800, 600)),
            vk::Extent2D { width: 800, height: 600 },
        );
        assert_eq!(
            choose_extent(&caps, (10, 9000)),
            vk::Extent2D { width: 64, height: 2160 },
        );
    }

    #[test]
    fn image_count_is_one_above_minimum_within_maximum() {
        let mut caps = capabilities((800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        caps.min_image_count = 5;
        assert_eq!(choose_image_count(&caps), 6);
    }

    #[test]
    fn sharing_mode_follows_queue_families() {
        let support = SurfaceSupport {
            capabilities: capabilities((800, 600)),
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let shared = QueueFamilies { graphics: 0, present: 0 };
        let config = SwapchainConfig::negotiate(&support, (800, 600), &shared).unwrap();
        assert_eq!(config.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert!(config.queue_family_indices.is_empty());

        let split = QueueFamilies { graphics: 0, present: 2 };
        let config = SwapchainConfig::negotiate(&support, (800, 600), &split).unwrap();
        assert_eq!(config.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(config.queue_family_indices, vec![0, 2]);
    }

    #[test]
    fn swapchain_keeps_the_surface_transform() {
        let mut caps = capabilities((600, 800));
        caps.supported_transforms =
            vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        let support = SurfaceSupport {
            capabilities: caps,
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let families = QueueFamilies { graphics: 0, present: 0 };
        let config = SwapchainConfig::negotiate(&support, (600, 800), &families).unwrap();
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn negotiation_fails_without_formats() {
        let support = SurfaceSupport {
            capabilities: capabilities((800, 600)),
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilies { graphics: 0, present: 0 };
        assert!(SwapchainConfig::negotiate(&support, (800, 600), &families).is_err());
    }
}
