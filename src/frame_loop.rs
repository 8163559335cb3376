// =============================================================================
// FRAME LOOP - frames-in-flight state machine
// =============================================================================
//
// One draw_frame call, strictly in order:
//
//   wait slot fence -> acquire image -> reconcile image owner -> reset
//     -> record -> submit -> present -> advance cursor
//
// The loop itself only owns two pieces of state: the frame cursor and the
// per-image owner table. Everything that touches the GPU goes through
// `FrameBackend`, so the ordering rules can be exercised without a device.
//
// =============================================================================

use ash::prelude::VkResult;
use ash::vk;

use crate::error::{Error, Result, VkResultExt};

/// Default number of frame slots (double buffering).
pub const FRAMES_IN_FLIGHT: usize = 2;

/// What a successful `draw_frame` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and queued for presentation.
    Presented { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface at acquire. Nothing was presented.
    OutOfDate,
}

/// GPU-facing half of a frame, addressed by frame slot and swapchain image.
///
/// Implementations map each call onto exactly one Vulkan operation (recording
/// excepted) and return the raw status; the loop decides what is fatal.
pub trait FrameBackend {
    /// Block until the slot's in-flight fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> VkResult<()>;

    /// Acquire the next swapchain image, signaling the slot's
    /// image-available semaphore. Returns `(image_index, suboptimal)`.
    fn acquire_image(&mut self, slot: usize) -> VkResult<(u32, bool)>;

    fn reset_fence(&mut self, slot: usize) -> VkResult<()>;

    fn reset_command_pool(&mut self, slot: usize) -> VkResult<()>;

    /// Record the slot's command buffer against the image's framebuffer.
    fn record(&mut self, slot: usize, image_index: u32) -> VkResult<()>;

    /// Submit to the graphics queue: wait image-available, signal the
    /// image's render-finished semaphore, arm the slot fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> VkResult<()>;

    /// Queue the image for presentation after its render-finished semaphore.
    /// Returns whether the swapchain is suboptimal.
    fn present(&mut self, slot: usize, image_index: u32) -> VkResult<bool>;
}

#[derive(Debug)]
pub struct FrameLoop {
    frames_in_flight: usize,
    cursor: usize,
    /// Which slot's fence last covered each swapchain image.
    image_owners: Vec<Option<usize>>,
}

impl FrameLoop {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InvalidFramesInFlight);
        }
        Ok(Self {
            frames_in_flight,
            cursor: 0,
            image_owners: vec![None; image_count],
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next `draw_frame` will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.image_owners.get(image_index as usize).copied().flatten()
    }

    /// Run one acquire -> submit -> present cycle.
    ///
    /// An out-of-date swapchain at acquire is not an error: the frame is
    /// skipped and `FrameStatus::OutOfDate` returned. Any other failure,
    /// present included, returns early without advancing the cursor.
    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<FrameStatus> {
        let slot = self.cursor;

        backend.wait_for_slot(slot).vk("vkWaitForFences")?;

        let (image_index, acquire_suboptimal) = match backend.acquire_image(slot) {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date, skipping frame (slot {})", slot);
                self.advance();
                return Ok(FrameStatus::OutOfDate);
            }
            Err(e) => return Err(e).vk("vkAcquireNextImageKHR"),
        };

        self.claim_image(backend, slot, image_index)?;

        backend.reset_fence(slot).vk("vkResetFences")?;
        backend.reset_command_pool(slot).vk("vkResetCommandPool")?;
        backend.record(slot, image_index).vk("command buffer recording")?;
        backend.submit(slot, image_index).vk("vkQueueSubmit")?;

        let present_suboptimal = backend.present(slot, image_index).vk("vkQueuePresentKHR")?;

        self.advance();
        Ok(FrameStatus::Presented {
            image_index,
            suboptimal: acquire_suboptimal || present_suboptimal,
        })
    }

    /// Make `slot` the owner of `image_index`, first waiting out a different
    /// slot that may still be rendering to it.
    fn claim_image<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        slot: usize,
        image_index: u32,
    ) -> Result<()> {
        let owner = self
            .image_owners
            .get_mut(image_index as usize)
            .ok_or(Error::Vulkan {
                call: "vkAcquireNextImageKHR",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        if let Some(previous) = *owner {
            if previous != slot {
                log::trace!("Image {} still owned by slot {}, waiting", image_index, previous);
                backend.wait_for_slot(previous).vk("vkWaitForFences")?;
            }
        }
        *owner = Some(slot);
        Ok(())
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.frames_in_flight;
    }
}
