// Surface - the platform drawing target handed to us by the caller
//
// The window system is not our business: the caller's callback creates the
// VkSurfaceKHR and reports its size. We own it from then on and destroy it
// after the swapchain is gone.

use ash::vk;
use std::sync::Arc;

use super::Instance;
use crate::error::{Error, Result};

/// What the surface callback hands back.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDesc {
    pub surface: vk::SurfaceKHR,
    pub width: u32,
    pub height: u32,
}

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
    pub width: u32,
    pub height: u32,
    _instance: Arc<Instance>,
}

impl Surface {
    /// Run the caller's callback and take ownership of the surface it makes.
    pub fn create<F>(instance: &Arc<Instance>, create_fn: F) -> Result<Self>
    where
        F: FnOnce(&ash::Entry, &ash::Instance) -> anyhow::Result<SurfaceDesc>,
    {
        let desc = create_fn(&instance.entry, &instance.instance).map_err(Error::SurfaceCreation)?;
        let surface_loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.instance);

        if desc.surface == vk::SurfaceKHR::null() {
            return Err(Error::SurfaceCreation(anyhow::anyhow!(
                "callback returned a null surface"
            )));
        }

        log::debug!("Platform surface created: {}x{}", desc.width, desc.height);

        Ok(Self {
            surface: desc.surface,
            surface_loader,
            width: desc.width,
            height: desc.height,
            _instance: Arc::clone(instance),
        })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> ash::prelude::VkResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(physical_device, queue_family, self.surface)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}
