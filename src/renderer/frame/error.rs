use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

/// Whether the presentation engine still matches the surface exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
}

impl From<bool> for PresentStatus {
    fn from(suboptimal: bool) -> Self {
        if suboptimal {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Optimal
        }
    }
}

/// Failure of an acquire or present call.
///
/// `OutOfDate` is always recovered by rebuilding the swapchain and never leaves the frame
/// synchronizer. Everything else is fatal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("presentation surface is out of date")]
    OutOfDate,
    #[error("presentation engine returned {0}")]
    Device(vk::Result),
}

impl From<vk::Result> for SurfaceError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => SurfaceError::OutOfDate,
            other => SurfaceError::Device(other),
        }
    }
}

/// Normalizes the result of `vkAcquireNextImageKHR`
pub fn acquire_result(result: VkResult<(u32, bool)>) -> Result<(u32, PresentStatus), SurfaceError> {
    result
        .map(|(image_index, suboptimal)| (image_index, suboptimal.into()))
        .map_err(SurfaceError::from)
}

/// Normalizes the result of `vkQueuePresentKHR`
pub fn present_result(result: VkResult<bool>) -> Result<PresentStatus, SurfaceError> {
    result
        .map(PresentStatus::from)
        .map_err(SurfaceError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_is_classified_the_same_for_acquire_and_present() {
        assert_eq!(
            acquire_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(SurfaceError::OutOfDate),
        );
        assert_eq!(
            present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Err(SurfaceError::OutOfDate),
        );
    }

    #[test]
    fn suboptimal_flag_becomes_status() {
        assert_eq!(acquire_result(Ok((2, true))), Ok((2, PresentStatus::Suboptimal)));
        assert_eq!(acquire_result(Ok((0, false))), Ok((0, PresentStatus::Optimal)));
        assert_eq!(present_result(Ok(true)), Ok(PresentStatus::Suboptimal));
        assert_eq!(present_result(Ok(false)), Ok(PresentStatus::Optimal));
    }

    #[test]
    fn other_failures_are_fatal() {
        assert_eq!(
            acquire_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(SurfaceError::Device(vk::Result::ERROR_DEVICE_LOST)),
        );
        assert_eq!(
            present_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(SurfaceError::Device(vk::Result::ERROR_SURFACE_LOST_KHR)),
        );
    }
}
