// Synchronization primitives
//
// Fences, semaphores and the command pool for each frame in flight, plus the
// Vulkan implementation of the frame loop's backend.
//
// Render-finished semaphores are kept per swapchain image: a present waits on
// the image's semaphore, and the same image may come back under another slot
// before that present has retired.

use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::{Device, RenderTargets, Swapchain};
use crate::error::{Result, VkResultExt};
use crate::frame_loop::FrameBackend;

const WAIT_STAGES: [vk::PipelineStageFlags; 1] = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

/// Per-frame-in-flight resources. Created once, reused every F frames.
pub struct FrameSlot {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    /// Indexed by swapchain image, not by slot.
    pub render_finished: Vec<vk::Semaphore>,
    pub in_flight_fence: vk::Fence,
    device: Arc<Device>,
}

impl FrameSlot {
    pub fn new(device: &Arc<Device>, image_count: usize) -> Result<Self> {
        // Null handles are valid to destroy, so a half-built slot cleans up
        // through Drop if any step below fails
        let mut slot = Self {
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: Vec::with_capacity(image_count),
            in_flight_fence: vk::Fence::null(),
            device: Arc::clone(device),
        };
        let vk_device = &device.device;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics)
            // TRANSIENT: re-recorded every frame
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        slot.command_pool = unsafe { vk_device.create_command_pool(&pool_info, None) }
            .vk("vkCreateCommandPool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(slot.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        slot.command_buffer = unsafe { vk_device.allocate_command_buffers(&alloc_info) }
            .vk("vkAllocateCommandBuffers")?[0];

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        slot.image_available = unsafe { vk_device.create_semaphore(&semaphore_info, None) }
            .vk("vkCreateSemaphore")?;
        for _ in 0..image_count {
            let semaphore = unsafe { vk_device.create_semaphore(&semaphore_info, None) }
                .vk("vkCreateSemaphore")?;
            slot.render_finished.push(semaphore);
        }

        // Start signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        slot.in_flight_fence = unsafe { vk_device.create_fence(&fence_info, None) }
            .vk("vkCreateFence")?;

        Ok(slot)
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            device.destroy_fence(self.in_flight_fence, None);
            for &semaphore in &self.render_finished {
                device.destroy_semaphore(semaphore, None);
            }
            device.destroy_semaphore(self.image_available, None);
            // also frees the command buffer
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Borrowed view of everything one frame touches on the GPU.
pub struct FrameResources<'a> {
    pub device: &'a Device,
    pub swapchain: &'a Swapchain,
    pub targets: &'a RenderTargets,
    pub slots: &'a [FrameSlot],
    pub clear_color: [f32; 4],
}

impl FrameBackend for FrameResources<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> VkResult<()> {
        let fences = [self.slots[slot].in_flight_fence];
        unsafe { self.device.device.wait_for_fences(&fences, true, u64::MAX) }
    }

    fn acquire_image(&mut self, slot: usize) -> VkResult<(u32, bool)> {
        self.swapchain
            .acquire_next_image(u64::MAX, self.slots[slot].image_available)
    }

    fn reset_fence(&mut self, slot: usize) -> VkResult<()> {
        let fences = [self.slots[slot].in_flight_fence];
        unsafe { self.device.device.reset_fences(&fences) }
    }

    fn reset_command_pool(&mut self, slot: usize) -> VkResult<()> {
        unsafe {
            self.device
                .device
                .reset_command_pool(self.slots[slot].command_pool, vk::CommandPoolResetFlags::empty())
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> VkResult<()> {
        let device = &self.device.device;
        let cmd = self.slots[slot].command_buffer;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.targets.render_pass)
            .framebuffer(self.targets.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            // Empty pass: the attachment is cleared on load and transitioned
            // to PRESENT_SRC on end
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd)
        }
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> VkResult<()> {
        let frame = &self.slots[slot];
        let wait_semaphores = [frame.image_available];
        let signal_semaphores = [frame.render_finished[image_index as usize]];
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&WAIT_STAGES)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                frame.in_flight_fence,
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VkResult<bool> {
        let wait_semaphores = [self.slots[slot].render_finished[image_index as usize]];
        self.swapchain
            .present(self.device.present_queue, image_index, &wait_semaphores)
    }
}
