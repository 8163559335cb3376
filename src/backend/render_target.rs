// Render targets - one render pass, one framebuffer per swapchain image
//
// The pass clears a single color attachment and leaves it ready for
// presentation. Nothing is drawn inside it; that is the caller's business.

use ash::vk;
use std::sync::Arc;

use super::{Device, Swapchain};
use crate::error::{Result, VkResultExt};

pub struct RenderTargets {
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    device: Arc<Device>,
}

impl RenderTargets {
    pub fn new(device: Arc<Device>, swapchain: &Swapchain) -> Result<Self> {
        let attachments = [color_attachment(swapchain.surface_format.format)];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .build()];
        let dependencies = [external_dependency()];

        let pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.device.create_render_pass(&pass_info, None) }
            .vk("vkCreateRenderPass")?;

        let mut this = Self {
            render_pass,
            framebuffers: Vec::with_capacity(swapchain.image_views.len()),
            device,
        };

        for (i, &view) in swapchain.image_views.iter().enumerate() {
            let views = [view];
            let fb_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&views)
                .width(swapchain.extent.width)
                .height(swapchain.extent.height)
                .layers(1);

            let framebuffer = unsafe { this.device.device.create_framebuffer(&fb_info, None) }
                .vk("vkCreateFramebuffer")?;
            this.framebuffers.push(framebuffer);

            log::trace!("Initialized framebuffer for swapchain image view {}", i);
        }

        log::debug!("Initialized render pass and {} framebuffers", this.framebuffers.len());

        Ok(this)
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Cleared on load, kept on store, UNDEFINED -> PRESENT_SRC.
fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

// Color writes in the subpass wait for whatever still touches the image
// (the presentation engine included) at the same stage.
fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_clears_and_ends_presentable() {
        let a = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(a.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn dependency_orders_color_output_against_external_work() {
        let d = external_dependency();
        assert_eq!(d.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(d.dst_subpass, 0);
        assert_eq!(d.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(d.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(d.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }
}
