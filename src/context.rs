// =============================================================================
// CONTEXT - instance, surface, device, swapchain and frame loop in one place
// =============================================================================
//
// CREATION ORDER:
//   logging -> instance -> surface (caller callback) -> device -> swapchain
//     -> render targets -> frame slots -> frame loop
//
// Teardown runs the same list backwards. Every piece is an RAII wrapper, so
// a failure halfway through creation releases whatever was already built.
//
// =============================================================================

use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

use crate::backend::{
    Device, FrameResources, FrameSlot, Instance, QueueFamilies, RenderTargets, Surface,
    SurfaceDesc, Swapchain,
};
use crate::error::{Error, Result};
use crate::frame_loop::{FrameLoop, FrameStatus, FRAMES_IN_FLIGHT};
use crate::logging::{self, LogSettings};

/// Everything needed to bring up a context, minus the surface callback.
#[derive(Debug, Clone)]
pub struct ContextInfo {
    /// Instance extensions, typically whatever the window system requires.
    pub extensions: Vec<CString>,
    pub layers: Vec<CString>,
    /// Enables `layers` and the validation messenger.
    pub enable_validation: bool,
    pub log: LogSettings,
    pub frames_in_flight: usize,
    /// Used when the surface supports it, FIFO otherwise.
    pub preferred_present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
}

impl Default for ContextInfo {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            layers: Vec::new(),
            enable_validation: false,
            log: LogSettings::default(),
            frames_in_flight: FRAMES_IN_FLIGHT,
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            clear_color: [0.1, 0.1, 0.1, 1.0],
        }
    }
}

/// A running presentation context.
///
/// IMPORTANT: Field order matters for Drop! Fields drop top to bottom, which
/// must be the reverse of creation order.
pub struct Context {
    frame_loop: FrameLoop,
    frame_slots: Vec<FrameSlot>,
    render_targets: RenderTargets,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    _instance: Arc<Instance>,
    clear_color: [f32; 4],
}

impl Context {
    /// Bring up the whole context.
    ///
    /// `create_surface` gets the loader entry and the freshly created
    /// instance and must return the platform surface with its pixel size.
    pub fn new<F>(info: &ContextInfo, create_surface: F) -> Result<Self>
    where
        F: FnOnce(&ash::Entry, &ash::Instance) -> anyhow::Result<SurfaceDesc>,
    {
        logging::try_init(&info.log)?;
        log::info!("Creating rendering context");

        if info.frames_in_flight == 0 {
            return Err(Error::InvalidFramesInFlight);
        }

        let instance = Arc::new(Instance::new(
            &info.extensions,
            &info.layers,
            info.enable_validation,
        )?);

        let surface = Surface::create(&instance, create_surface)?;
        let device = Device::new(&instance, Some(&surface))?;

        let swapchain = Swapchain::new(
            Arc::clone(&device),
            &surface,
            info.preferred_present_mode,
            surface.width,
            surface.height,
        )?;
        let render_targets = RenderTargets::new(Arc::clone(&device), &swapchain)?;

        let image_count = swapchain.image_count();
        let frame_slots = (0..info.frames_in_flight)
            .map(|i| {
                log::trace!("Initializing frame slot {}", i);
                FrameSlot::new(&device, image_count)
            })
            .collect::<Result<Vec<_>>>()?;
        let frame_loop = FrameLoop::new(info.frames_in_flight, image_count)?;

        log::info!(
            "Rendering context ready ({} frames in flight, {} swapchain images)",
            info.frames_in_flight,
            image_count
        );

        Ok(Self {
            frame_loop,
            frame_slots,
            render_targets,
            swapchain,
            device,
            surface,
            _instance: instance,
            clear_color: info.clear_color,
        })
    }

    /// Draw and present one (empty, cleared) frame.
    ///
    /// Blocks on the current slot's fence and on image acquisition. A stale
    /// swapchain at acquire yields `Ok(FrameStatus::OutOfDate)`; recreation is
    /// up to the caller tearing the context down.
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        let mut resources = FrameResources {
            device: &self.device,
            swapchain: &self.swapchain,
            targets: &self.render_targets,
            slots: &self.frame_slots,
            clear_color: self.clear_color,
        };
        self.frame_loop.draw_frame(&mut resources)
    }

    /// Wait for the GPU to go idle, then release everything.
    ///
    /// Dropping a context does the same but cannot report the idle-wait
    /// failure.
    pub fn destroy(self) -> Result<()> {
        log::info!("Destroying rendering context");
        let idle = self.device.wait_idle();
        drop(self);
        idle
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.swapchain.surface_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.device.queue_families
    }

    /// Frame slot the next `draw_frame` will use.
    pub fn frame_cursor(&self) -> usize {
        self.frame_loop.cursor()
    }

    /// Size reported by the surface callback.
    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Nothing below may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device did not go idle before teardown: {}", e);
        }
    }
}
