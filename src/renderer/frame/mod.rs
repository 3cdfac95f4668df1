pub mod error;

use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr};
use crate::renderer::frame::error::{PresentStatus, SurfaceError};

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Which frame slot's completion fence last guarded a swapchain image
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ImageFence {
    #[default]
    Unset,
    Pending(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Submitting,
    Presenting,
    Rebuilding,
}

/// What a single call to [`FrameSynchronizer::advance`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The surface is not displayable; no GPU work was issued
    Skipped,
    /// The frame was submitted and presented
    Presented,
    /// The frame was submitted and presented, then the swapchain was rebuilt
    PresentedThenRebuilt,
    /// Acquisition found the surface out of date; the swapchain was rebuilt instead of drawing
    Rebuilt,
}

/// GPU-side operations the frame synchronizer sequences.
///
/// `slot` is always in `0..MAX_FRAMES_IN_FLIGHT` and names the slot's image-acquired semaphore,
/// render-complete semaphore and completion fence.
pub trait FrameBackend {
    /// Blocks without timeout until the completion fence of `slot` is signaled
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Requests the next presentable image, signaling the image-acquired semaphore of `slot`
    fn acquire_image(&mut self, slot: usize) -> Result<(u32, PresentStatus), SurfaceError>;

    /// Returns the completion fence of `slot` to the unsignaled state
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Submits the pre-recorded commands of `image_index`, waiting on the image-acquired
    /// semaphore and signaling the render-complete semaphore plus the completion fence of `slot`
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Queues `image_index` for presentation once the render-complete semaphore of `slot` fires
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus, SurfaceError>;

    /// Waits for the device to go idle, tears down every swapchain-dependent resource and
    /// recreates it against the current surface. Returns the new swapchain image count.
    fn rebuild(&mut self) -> Result<usize>;
}

/// Coordinates CPU submission and GPU completion across the frame slots and owns the
/// swapchain rebuild protocol
pub struct FrameSynchronizer {
    current_frame: usize,
    images_in_flight: Vec<ImageFence>,
    state: FrameState,

    resize_pending: bool,
    minimized: bool,

    frames_submitted: u64,
    rebuilds: u64,
}

impl FrameSynchronizer {
    pub fn new(image_count: usize) -> Self {
        Self {
            current_frame: 0,
            images_in_flight: vec![ImageFence::Unset; image_count],
            state: FrameState::Idle,

            resize_pending: false,
            minimized: false,

            frames_submitted: 0,
            rebuilds: 0,
        }
    }

    pub fn request_resize(&mut self) {
        self.resize_pending = true;
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        self.minimized = minimized;
    }

    #[cfg(test)]
    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[cfg(test)]
    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn image_fence(&self, image_index: usize) -> Option<ImageFence> {
        self.images_in_flight.get(image_index).copied()
    }

    #[cfg(test)]
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Runs one visual frame: wait, acquire, submit, present, and rebuild when the surface asks
    /// for it
    pub fn advance<B: FrameBackend>(&mut self, backend: &mut B) -> Result<TickOutcome> {
        if self.minimized {
            return Ok(TickOutcome::Skipped);
        }

        let slot = self.current_frame;

        self.transition(FrameState::Acquiring);
        backend.wait_for_slot(slot)?;

        let (image_index, acquire_status) = match backend.acquire_image(slot) {
            Ok(acquired) => acquired,
            Err(SurfaceError::OutOfDate) => {
                log::debug!("Swapchain out of date during acquire");
                self.rebuild(backend)?;
                self.advance_slot();
                return Ok(TickOutcome::Rebuilt);
            }
            Err(err) => return Err(err).wrap_err("Failed to acquire swapchain image"),
        };

        let image = image_index as usize;
        let previous = self
            .image_fence(image)
            .ok_or_eyre(format!("Acquired image index {image} is outside the swapchain"))?;
        if let ImageFence::Pending(owner) = previous {
            if owner != slot {
                backend.wait_for_slot(owner)?;
            }
        }
        self.images_in_flight[image] = ImageFence::Pending(slot);

        self.transition(FrameState::Submitting);
        backend.reset_slot(slot)?;
        backend.submit(slot, image_index)?;
        self.frames_submitted += 1;

        self.transition(FrameState::Presenting);
        let needs_rebuild = match backend.present(slot, image_index) {
            Ok(present_status) => {
                present_status == PresentStatus::Suboptimal
                    || acquire_status == PresentStatus::Suboptimal
                    || self.resize_pending
            }
            Err(SurfaceError::OutOfDate) => true,
            Err(err) => return Err(err).wrap_err("Failed to present swapchain image"),
        };

        let outcome = if needs_rebuild {
            self.rebuild(backend)?;
            TickOutcome::PresentedThenRebuilt
        } else {
            TickOutcome::Presented
        };

        self.advance_slot();
        self.transition(FrameState::Idle);

        Ok(outcome)
    }

    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        self.transition(FrameState::Rebuilding);

        let image_count = backend.rebuild().wrap_err("Failed to rebuild swapchain")?;

        // The device is idle after a rebuild, so no image is guarded by a pending fence
        self.images_in_flight = vec![ImageFence::Unset; image_count];
        self.resize_pending = false;
        self.rebuilds += 1;

        self.transition(FrameState::Idle);
        Ok(())
    }

    fn advance_slot(&mut self) {
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!("Frame {}: {:?} -> {:?}", self.current_frame, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use color_eyre::eyre::eyre;
    use std::collections::VecDeque;

    /// Models the GPU as strictly as possible: submitted work stays pending until the CPU
    /// waits on the slot's fence, and every reuse of a slot or an image is checked against
    /// that pending work.
    struct RecordingBackend {
        image_count: usize,
        next_image: u32,
        acquire_script: VecDeque<Result<(u32, PresentStatus), SurfaceError>>,
        present_script: VecDeque<Result<PresentStatus, SurfaceError>>,
        rebuild_image_counts: VecDeque<usize>,

        // Image whose commands each slot's unfinished submission executes
        slot_pending: [Option<u32>; MAX_FRAMES_IN_FLIGHT],
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],

        submissions: Vec<(usize, u32)>,
        presentations: usize,
        rebuilds: usize,
        cross_slot_waits: usize,
        // Slot that acquired an image not yet submitted
        acquiring_slot: Option<usize>,

        live_render_targets: usize,
        created_render_targets: usize,
        destroyed_render_targets: usize,
    }

    impl RecordingBackend {
        fn new(image_count: usize) -> Self {
            Self {
                image_count,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                rebuild_image_counts: VecDeque::new(),

                slot_pending: [None; MAX_FRAMES_IN_FLIGHT],
                // Fences start signaled so the first wait on each slot returns immediately
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],

                submissions: Vec::new(),
                presentations: 0,
                rebuilds: 0,
                cross_slot_waits: 0,
                acquiring_slot: None,

                live_render_targets: image_count,
                created_render_targets: image_count,
                destroyed_render_targets: 0,
            }
        }

        fn complete(&mut self, slot: usize) {
            self.slot_pending[slot] = None;
            self.fence_signaled[slot] = true;
        }
    }

    impl FrameBackend for RecordingBackend {
        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            if self.acquiring_slot.is_some_and(|acquiring| acquiring != slot) {
                self.cross_slot_waits += 1;
            }
            self.complete(slot);
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<(u32, PresentStatus), SurfaceError> {
            let acquired = match self.acquire_script.pop_front() {
                Some(scripted) => scripted,
                None => {
                    let image = self.next_image;
                    self.next_image = (self.next_image + 1) % self.image_count as u32;
                    Ok((image, PresentStatus::Optimal))
                }
            };
            if acquired.is_ok() {
                self.acquiring_slot = Some(slot);
            }
            acquired
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            assert!(self.fence_signaled[slot], "reset of slot {slot} fence while still pending");
            self.fence_signaled[slot] = false;
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
            assert!(
                self.slot_pending[slot].is_none(),
                "slot {slot} reused before its fence signaled",
            );
            for (other, pending) in self.slot_pending.iter().enumerate() {
                assert_ne!(
                    *pending,
                    Some(image_index),
                    "image {image_index} still executing for slot {other}",
                );
            }
            self.slot_pending[slot] = Some(image_index);
            self.submissions.push((slot, image_index));
            self.acquiring_slot = None;
            Ok(())
        }

        fn present(&mut self, _slot: usize, _image_index: u32) -> Result<PresentStatus, SurfaceError> {
            self.presentations += 1;
            self.present_script.pop_front().unwrap_or(Ok(PresentStatus::Optimal))
        }

        fn rebuild(&mut self) -> Result<usize> {
            self.acquiring_slot = None;
            for slot in 0..MAX_FRAMES_IN_FLIGHT {
                self.complete(slot);
            }
            self.destroyed_render_targets += self.live_render_targets;

            if let Some(image_count) = self.rebuild_image_counts.pop_front() {
                if image_count == 0 {
                    return Err(eyre!("No surface formats available"));
                }
                self.image_count = image_count;
            }
            self.next_image = 0;
            self.live_render_targets = self.image_count;
            self.created_render_targets += self.image_count;
            self.rebuilds += 1;
            Ok(self.image_count)
        }
    }

    #[test]
    fn stable_surface_draws_without_rebuilding() {
        let mut backend = RecordingBackend::new(3);
        let mut frames = FrameSynchronizer::new(3);

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Presented);
        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Presented);

        assert_eq!(backend.rebuilds, 0);
        assert_eq!(backend.submissions.len(), 2);
        assert_eq!(backend.presentations, 2);
        assert_eq!(frames.frames_submitted(), 2);
        assert_eq!(frames.state(), FrameState::Idle);
    }

    #[test]
    fn out_of_date_acquire_rebuilds_without_submitting() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Err(SurfaceError::OutOfDate));
        let mut frames = FrameSynchronizer::new(3);

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Rebuilt);

        assert!(backend.submissions.is_empty());
        assert_eq!(backend.presentations, 0);
        assert_eq!(backend.rebuilds, 1);
        assert_eq!(frames.current_frame(), 1);
        assert_eq!(frames.state(), FrameState::Idle);
    }

    #[test]
    fn suboptimal_present_rebuilds_once_after_drawing() {
        let mut backend = RecordingBackend::new(3);
        backend.present_script.push_back(Ok(PresentStatus::Suboptimal));
        let mut frames = FrameSynchronizer::new(3);

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::PresentedThenRebuilt);
        assert_eq!(backend.submissions.len(), 1);
        assert_eq!(backend.presentations, 1);
        assert_eq!(backend.rebuilds, 1);

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Presented);
        assert_eq!(backend.rebuilds, 1);
    }

    #[test]
    fn suboptimal_acquire_draws_then_rebuilds() {
        let mut backend = RecordingBackend::new(2);
        backend.acquire_script.push_back(Ok((0, PresentStatus::Suboptimal)));
        let mut frames = FrameSynchronizer::new(2);

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::PresentedThenRebuilt);
        assert_eq!(backend.submissions, vec![(0, 0)]);
        assert_eq!(backend.rebuilds, 1);
    }

    #[test]
    fn out_of_date_present_rebuilds_and_clears_resize() {
        let mut backend = RecordingBackend::new(3);
        backend.present_script.push_back(Err(SurfaceError::OutOfDate));
        let mut frames = FrameSynchronizer::new(3);
        frames.request_resize();

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::PresentedThenRebuilt);
        assert_eq!(backend.rebuilds, 1);
        assert!(!frames.resize_pending());
    }

    #[test]
    fn pending_resize_rebuilds_after_present() {
        let mut backend = RecordingBackend::new(3);
        let mut frames = FrameSynchronizer::new(3);

        frames.request_resize();
        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::PresentedThenRebuilt);
        assert!(!frames.resize_pending());

        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Presented);
        assert_eq!(backend.rebuilds, 1);
    }

    #[test]
    fn minimized_surface_issues_no_work() {
        let mut backend = RecordingBackend::new(3);
        let mut frames = FrameSynchronizer::new(3);

        frames.set_minimized(true);
        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Skipped);
        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Skipped);
        assert!(backend.submissions.is_empty());
        assert_eq!(backend.presentations, 0);
        assert_eq!(frames.current_frame(), 0);

        frames.set_minimized(false);
        assert_eq!(frames.advance(&mut backend).unwrap(), TickOutcome::Presented);
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn fatal_acquire_error_propagates() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Err(SurfaceError::Device(vk::Result::ERROR_DEVICE_LOST)));
        let mut frames = FrameSynchronizer::new(3);

        assert!(frames.advance(&mut backend).is_err());
        assert!(backend.submissions.is_empty());
        assert_eq!(backend.rebuilds, 0);
    }

    #[test]
    fn fatal_present_error_propagates() {
        let mut backend = RecordingBackend::new(3);
        backend.present_script.push_back(Err(SurfaceError::Device(vk::Result::ERROR_SURFACE_LOST_KHR)));
        let mut frames = FrameSynchronizer::new(3);

        assert!(frames.advance(&mut backend).is_err());
        assert_eq!(backend.rebuilds, 0);
    }

    #[test]
    fn failed_rebuild_is_fatal() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Err(SurfaceError::OutOfDate));
        backend.rebuild_image_counts.push_back(0);
        let mut frames = FrameSynchronizer::new(3);

        assert!(frames.advance(&mut backend).is_err());
    }

    #[test]
    fn image_reacquired_by_other_slot_waits_for_its_fence() {
        let mut backend = RecordingBackend::new(3);
        backend.acquire_script.push_back(Ok((0, PresentStatus::Optimal)));
        backend.acquire_script.push_back(Ok((0, PresentStatus::Optimal)));
        let mut frames = FrameSynchronizer::new(3);

        frames.advance(&mut backend).unwrap();
        assert_eq!(frames.image_fence(0), Some(ImageFence::Pending(0)));
        assert_eq!(backend.cross_slot_waits, 0);

        // Slot 1 acquires image 0 while slot 0's work on it is still pending; the mock
        // panics on submit unless slot 0's fence was waited first
        frames.advance(&mut backend).unwrap();
        assert_eq!(frames.image_fence(0), Some(ImageFence::Pending(1)));
        assert_eq!(backend.cross_slot_waits, 1);
        assert_eq!(backend.submissions, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn slots_rotate_round_robin_through_rebuilds() {
        let mut backend = RecordingBackend::new(3);
        let mut frames = FrameSynchronizer::new(3);
        backend.acquire_script.extend([
            Ok((0, PresentStatus::Optimal)),
            Err(SurfaceError::OutOfDate),
            Ok((1, PresentStatus::Optimal)),
        ]);
        backend.present_script.extend([
            Ok(PresentStatus::Optimal),
            Ok(PresentStatus::Suboptimal),
        ]);

        let mut expected = 0;
        for _ in 0..7 {
            assert_eq!(frames.current_frame(), expected);
            frames.advance(&mut backend).unwrap();
            expected = (expected + 1) % MAX_FRAMES_IN_FLIGHT;
        }
        assert_eq!(backend.rebuilds, 2);
        assert_eq!(backend.submissions.len(), 6);
    }

    #[test]
    fn rebuild_replaces_every_render_target_once() {
        let mut backend = RecordingBackend::new(3);
        backend.rebuild_image_counts.push_back(4);
        backend.present_script.push_back(Ok(PresentStatus::Suboptimal));
        let mut frames = FrameSynchronizer::new(3);

        frames.advance(&mut backend).unwrap();

        assert_eq!(backend.destroyed_render_targets, 3);
        assert_eq!(backend.live_render_targets, 4);
        assert_eq!(backend.created_render_targets, 3 + 4);
        assert_eq!(frames.image_count(), 4);
        assert!((0..4).all(|image| frames.image_fence(image) == Some(ImageFence::Unset)));

        for _ in 0..8 {
            frames.advance(&mut backend).unwrap();
        }
        assert_eq!(backend.rebuilds, 1);
    }

    #[test]
    fn many_frames_never_reuse_pending_work() {
        // Image counts both equal to and above the slot count go through the mock's reuse checks
        for image_count in [2, 3, 5] {
            let mut backend = RecordingBackend::new(image_count);
            let mut frames = FrameSynchronizer::new(image_count);
            for tick in 0..50 {
                if tick % 17 == 0 {
                    frames.request_resize();
                }
                frames.advance(&mut backend).unwrap();
            }
            assert_eq!(backend.submissions.len(), 50);
            assert_eq!(frames.frames_submitted(), 50);
        }
    }
}
