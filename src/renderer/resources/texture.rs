use std::path::Path;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use crate::renderer::internals::image::Image;
use crate::renderer::internals::transfer_ctx::TransferContext;

/// Decoded pixels, four bytes per texel in row-major order
#[derive(Debug, Clone)]
pub struct RgbaPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaPixels {
    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .wrap_err_with(|| format!("Failed to load texture {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();

        Ok(Self {
            width,
            height,
            data: image.into_raw(),
        })
    }
}

/// Sampled color texture: the device-local image, its view, and the sampler reading it
pub struct Texture {
    pub image: Image,
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Texture {
    pub fn from_file(
        path: &Path,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self> {
        let pixels = RgbaPixels::load(path)?;
        log::debug!("Loaded texture {} ({}x{})", path.display(), pixels.width, pixels.height);
        Self::from_pixels(&pixels, memory_allocator, device, transfer_context)
    }

    pub fn from_pixels(
        pixels: &RgbaPixels,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self> {
        let image = Image::new_color_image(
            &pixels.data,
            pixels.width,
            pixels.height,
            "Texture",
            memory_allocator,
            device.clone(),
            transfer_context,
        )?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(0.0);
        let sampler = unsafe { device.create_sampler(&sampler_info, None)? };

        Ok(Self {
            image,
            sampler,
            device,
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
