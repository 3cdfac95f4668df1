use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::queue::{Queue, QueueFamilies};
use crate::renderer::core::surface::Surface;

/// Logical device, its queues, and the memory allocator that sub-allocates for it
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,

    pub graphics_queue: Queue,
    pub present_queue: Queue,

    // Dropped by hand so every allocation block is released before the device goes away
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
}

impl RenderDevice {
    pub fn new(
        ins: &RenderInstance,
        surface: &Surface,
    ) -> Result<Self> {
        let (physical_device, queue_families) = Self::select_physical_device(&ins.instance, surface)?;

        let props = unsafe { ins.instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Using device {:?} ({:?}), graphics queue family {}, present queue family {}",
            props.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            props.device_type,
            queue_families.graphics,
            queue_families.present,
        );

        let logical_device = Self::create_logical_device(
            &ins.instance,
            physical_device,
            &queue_families,
        )?;

        let graphics_queue = unsafe {
            let queue = logical_device.get_device_queue(queue_families.graphics, 0);
            Queue::new(queue_families.graphics, queue)
        };
        let present_queue = unsafe {
            let queue = logical_device.get_device_queue(queue_families.present, 0);
            Queue::new(queue_families.present, queue)
        };

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ins.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,
            queue_families,

            graphics_queue,
            present_queue,

            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
        })
    }

    pub fn memory_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let req_device_exts = Self::get_required_device_extensions();

        let devices = unsafe { instance.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(eyre!("No GPUs with Vulkan support found"));
        }

        devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default()
                };

                req_device_exts.iter().all(|req_ext| {
                    let req_ext_supported = supported_extensions
                        .iter()
                        .any(|sup_ext| {
                            sup_ext.extension_name_as_c_str().map_or(false, |name| name == *req_ext)
                        });
                    if !req_ext_supported {
                        log::warn!("Device extension not supported: {:?}", req_ext);
                    }
                    req_ext_supported
                })
            })
            // Filter out devices that do not contain the required queues
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                QueueFamilies::select(&props, |i| surface.supports_present(device, i))
                    .map(|families| (device, families))
            })
            // Filter out devices that cannot present anything to the surface
            .filter(|(device, _)| {
                surface
                    .query_support(*device)
                    .map_or(false, |support| support.is_adequate())
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilies,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        Ok(unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        })
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}
