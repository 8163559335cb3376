// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Format, present mode, extent and image count are negotiated against what
// the surface reports; the swapchain is built once and never recreated.

use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::device::QueueFamilies;
use super::{Device, Surface};
use crate::error::{Error, Result, VkResultExt};

/// Everything the surface told us about itself for one physical device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query capabilities, formats and present modes. All three must succeed.
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let loader = &surface.surface_loader;
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface.surface)
                    .vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface.surface)
                    .vk("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface.surface)
                    .vk("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }

    /// BGRA8 sRGB if offered, otherwise whatever the surface lists first.
    pub fn surface_format(&self) -> Result<vk::SurfaceFormatKHR> {
        self.formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| self.formats.first())
            .copied()
            .ok_or(Error::NoSurfaceFormat)
    }

    /// `preferred` if supported, else FIFO (which every surface must support).
    pub fn present_mode(&self, preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
        self.present_modes
            .iter()
            .copied()
            .find(|&mode| mode == preferred)
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// A `u32::MAX` current extent means the window system lets us pick;
    /// anything else is already fixed by the platform.
    pub fn extent(&self, width: u32, height: u32) -> vk::Extent2D {
        let caps = &self.capabilities;
        if caps.current_extent.width != u32::MAX {
            return caps.current_extent;
        }
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    /// One more than the minimum; a zero maximum means unbounded.
    pub fn image_count(&self) -> u32 {
        let caps = &self.capabilities;
        let count = caps.min_image_count + 1;
        if caps.max_image_count > 0 && count > caps.max_image_count {
            caps.max_image_count
        } else {
            count
        }
    }
}

/// Images shared by two distinct families must be created CONCURRENT.
pub fn sharing_mode(queue_families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if queue_families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, queue_families.unique())
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    device: Arc<Device>,
}

impl Swapchain {
    pub fn new(
        device: Arc<Device>,
        surface: &Surface,
        preferred_present_mode: vk::PresentModeKHR,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        log::debug!("Creating swapchain: {}x{}", width, height);

        let support = SurfaceSupport::query(surface, device.physical_device)?;

        let surface_format = support.surface_format()?;
        let present_mode = support.present_mode(preferred_present_mode);
        let extent = support.extent(width, height);
        let image_count = support.image_count();
        let (sharing, family_indices) = sharing_mode(&device.queue_families);

        log::info!(
            "Present mode: {:?}, format: {:?}, extent: {}x{}",
            present_mode,
            surface_format.format,
            extent.width,
            extent.height
        );

        let swapchain_loader = ash::extensions::khr::Swapchain::new(&device.instance.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .vk("vkCreateSwapchainKHR")?;

        // From here on Drop owns cleanup, including views created before a failure
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format,
            present_mode,
            extent,
            device,
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }
            .vk("vkGetSwapchainImagesKHR")?;

        for (i, &image) in this.images.iter().enumerate() {
            let view = unsafe {
                this.device
                    .device
                    .create_image_view(&color_view_info(image, surface_format.format), None)
            }
            .map_err(|e| {
                log::error!("Failed to create image view for swapchain image {}", i);
                e
            })
            .vk("vkCreateImageView")?;
            this.image_views.push(view);
        }

        log::info!("Created swapchain with {} images", this.images.len());

        Ok(this)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering
    ///
    /// Errors, including ERROR_OUT_OF_DATE_KHR, are returned untouched so the
    /// frame loop can tell a stale swapchain from a real failure.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> VkResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn color_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn support(formats: &[vk::SurfaceFormatKHR], modes: &[vk::PresentModeKHR]) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: bounded_caps(),
            formats: formats.to_vec(),
            present_modes: modes.to_vec(),
        }
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn prefers_bgra8_srgb_nonlinear() {
        let wanted = fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let s = support(
            &[
                fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
                wanted,
            ],
            &[],
        );
        let chosen = s.surface_format().unwrap();
        assert_eq!(chosen.format, wanted.format);
        assert_eq!(chosen.color_space, wanted.color_space);
    }

    #[test]
    fn falls_back_to_first_format() {
        let first = fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let s = support(
            &[first, fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            &[],
        );
        assert_eq!(s.surface_format().unwrap().format, first.format);
    }

    #[test]
    fn no_formats_is_an_error() {
        assert!(matches!(support(&[], &[]).surface_format(), Err(Error::NoSurfaceFormat)));
    }

    #[test]
    fn mailbox_when_available() {
        let s = support(&[], &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]);
        assert_eq!(s.present_mode(vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let s = support(&[], &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]);
        assert_eq!(s.present_mode(vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::FIFO);

        // even a surface listing nothing still yields a mode
        assert_eq!(support(&[], &[]).present_mode(vk::PresentModeKHR::MAILBOX), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn undefined_extent_is_clamped_per_axis() {
        let s = support(&[], &[]);
        assert_eq!(s.extent(10, 10), vk::Extent2D { width: 64, height: 64 });
        assert_eq!(s.extent(8000, 8000), vk::Extent2D { width: 4096, height: 4096 });
        assert_eq!(s.extent(800, 600), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(s.extent(10, 8000), vk::Extent2D { width: 64, height: 4096 });
    }

    #[test]
    fn fixed_current_extent_is_used_verbatim() {
        let mut s = support(&[], &[]);
        s.capabilities.current_extent = vk::Extent2D { width: 640, height: 480 };
        assert_eq!(s.extent(8000, 10), vk::Extent2D { width: 640, height: 480 });
    }

    #[test]
    fn image_count_is_min_plus_one_clamped_to_max() {
        let mut s = support(&[], &[]);
        assert_eq!(s.image_count(), 3);

        s.capabilities.max_image_count = 2;
        assert_eq!(s.image_count(), 2);

        s.capabilities.max_image_count = 0;
        s.capabilities.min_image_count = 4;
        assert_eq!(s.image_count(), 5);
    }

    #[test]
    fn sharing_is_concurrent_only_across_families() {
        let (mode, indices) = sharing_mode(&QueueFamilies { graphics: 1, present: 1 });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let (mode, indices) = sharing_mode(&QueueFamilies { graphics: 0, present: 2 });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, [0, 2]);
    }

    #[test]
    fn views_cover_one_color_mip_and_layer() {
        let info = color_view_info(vk::Image::null(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(info.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(info.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(info.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(info.subresource_range.level_count, 1);
        assert_eq!(info.subresource_range.layer_count, 1);
    }
}
