use ash::vk;

#[derive(Debug, Clone, Copy)]
pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family_index: u32,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family_index,
            handle,
        }
    }
}

/// Queue families chosen on a physical device. Graphics and present may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Picks the graphics and present families from per-family capabilities, preferring a
    /// single family that supports both
    pub fn select(
        properties: &[vk::QueueFamilyProperties],
        supports_present: impl Fn(u32) -> bool,
    ) -> Option<Self> {
        let graphics_families = properties
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(i, _)| i as u32)
            .collect::<Vec<u32>>();

        if let Some(&shared) = graphics_families.iter().find(|&&i| supports_present(i)) {
            return Some(Self {
                graphics: shared,
                present: shared,
            });
        }

        let graphics = *graphics_families.first()?;
        let present = (0..properties.len() as u32).find(|&i| supports_present(i))?;
        Some(Self {
            graphics,
            present,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one device queue is created for each
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}
