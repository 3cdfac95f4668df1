use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::frame::MAX_FRAMES_IN_FLIGHT;

/// Synchronization objects of one frame slot
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    // Signals when the swapchain image can be rendered to
    pub image_acquired: vk::Semaphore,

    // Signals when rendering has finished and the image can be presented
    pub render_complete: vk::Semaphore,

    // Signals when all of the slot's submitted commands have finished execution
    pub in_flight: vk::Fence,
}

/// The fixed pool of frame slots. Lives as long as the device and survives swapchain rebuilds.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    device: Arc<ash::Device>,
}

impl FrameSlots {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let mut frame_slots = Self {
            slots: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            device,
        };

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let slot = frame_slots.create_slot()?;
            frame_slots.slots.push(slot);
        }

        Ok(frame_slots)
    }

    pub fn get(&self, slot: usize) -> Result<FrameSlot> {
        self.slots
            .get(slot)
            .copied()
            .ok_or_eyre(format!("Frame slot {slot} does not exist"))
    }

    fn create_slot(&self) -> Result<FrameSlot> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Created signaled so the first wait on every slot returns immediately
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_acquired = self.device.create_semaphore(&semaphore_info, None)?;
            let render_complete = match self.device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    self.device.destroy_semaphore(image_acquired, None);
                    return Err(err.into());
                }
            };
            let in_flight = match self.device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(err) => {
                    self.device.destroy_semaphore(render_complete, None);
                    self.device.destroy_semaphore(image_acquired, None);
                    return Err(err.into());
                }
            };

            Ok(FrameSlot {
                image_acquired,
                render_complete,
                in_flight,
            })
        }
    }
}

impl Drop for FrameSlots {
    fn drop(&mut self) {
        unsafe {
            for slot in self.slots.drain(..) {
                self.device.destroy_fence(slot.in_flight, None);
                self.device.destroy_semaphore(slot.render_complete, None);
                self.device.destroy_semaphore(slot.image_acquired, None);
            }
        }
    }
}
