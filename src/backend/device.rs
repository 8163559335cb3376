// Vulkan Device - physical device selection and logical device
//
// Responsibilities:
// - Physical device selection (first fit: graphics + present family)
// - Logical device + queue creation
//
// Selection is first-fit on purpose: the first device in enumeration order
// that has both queue families wins. Device type is not ranked.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::{Instance, Surface};
use crate::error::{Error, Result, VkResultExt};

/// Queue family indices picked for a physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Scan queue families in order, remembering the *last* graphics family and
/// the *last* present-capable family.
///
/// `present_support` is `None` when there is no surface; the present family
/// then falls back to the graphics family.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut present_support: Option<F>,
) -> Option<QueueFamilies>
where
    F: FnMut(u32) -> bool,
{
    let mut graphics = None;
    let mut present = None;

    for (index, props) in families.iter().enumerate() {
        let index = index as u32;
        if props.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        match present_support.as_mut() {
            Some(supports) => {
                if supports(index) {
                    present = Some(index);
                }
            }
            None => present = graphics,
        }
    }

    graphics.zip(present).map(|(graphics, present)| QueueFamilies { graphics, present })
}

/// A failed present-support query counts as "not supported" so selection
/// can move on to the next family or device.
fn present_supported(query: VkResult<bool>, family: u32) -> bool {
    query.unwrap_or_else(|e| {
        log::warn!("Present support query for queue family {} failed: {:?}", family, e);
        false
    })
}

/// First candidate for which `probe` yields queue families.
pub fn first_suitable<T, F>(candidates: &[T], mut probe: F) -> Result<(T, QueueFamilies)>
where
    T: Copy,
    F: FnMut(T) -> Result<Option<QueueFamilies>>,
{
    for &candidate in candidates {
        if let Some(families) = probe(candidate)? {
            return Ok((candidate, families));
        }
    }
    Err(Error::NoSuitableDevice)
}

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub instance: Arc<Instance>,
}

impl Device {
    /// Pick a physical device and create the logical device on it.
    ///
    /// `surface` decides whether present support is checked and whether the
    /// swapchain extension gets enabled.
    pub fn new(instance: &Arc<Instance>, surface: Option<&Surface>) -> Result<Arc<Self>> {
        let (physical_device, queue_families) = Self::pick_physical_device(instance, surface)?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::debug!(
            "API version {}.{}.{}, driver version {}, graphics queue {}, present queue {}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            properties.driver_version,
            queue_families.graphics,
            queue_families.present
        );

        let device = Self::create_logical_device(instance, physical_device, &queue_families, surface.is_some())?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            queue_families,
            graphics_queue,
            present_queue,
            instance: Arc::clone(instance),
        }))
    }

    fn pick_physical_device(
        instance: &Instance,
        surface: Option<&Surface>,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .vk("vkEnumeratePhysicalDevices")?;

        if devices.is_empty() {
            log::error!("No Vulkan-capable GPU found");
            return Err(Error::NoSuitableDevice);
        }

        first_suitable(&devices, |device| {
            let queue_families =
                unsafe { instance.instance.get_physical_device_queue_family_properties(device) };
            let present_support = surface.map(|surface| {
                move |family: u32| present_supported(surface.supports_present(device, family), family)
            });
            Ok(find_queue_families(&queue_families, present_support))
        })
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilies,
        with_swapchain: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = device_extensions(with_swapchain);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.instance.create_device(physical_device, &create_info, None) }
            .vk("vkCreateDevice")?;

        log::debug!(
            "Initialized Vulkan logical device ({} queue family request(s))",
            queue_create_infos.len()
        );

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.vk("vkDeviceWaitIdle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan device");
        if let Err(e) = self.wait_idle() {
            log::warn!("Device not idle before destroy: {}", e);
        }
        unsafe { self.device.destroy_device(None) };
    }
}

fn device_extensions(with_swapchain: bool) -> Vec<*const std::os::raw::c_char> {
    if with_swapchain {
        vec![ash::extensions::khr::Swapchain::name().as_ptr()]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn no_surface() -> Option<fn(u32) -> bool> {
        None
    }

    #[test]
    fn last_graphics_and_last_present_family_win() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
        ];

        let found = find_queue_families(&families, Some(|i: u32| i < 2));
        assert_eq!(found, Some(QueueFamilies { graphics: 2, present: 1 }));
    }

    #[test]
    fn without_surface_present_follows_graphics() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::GRAPHICS)];

        let found = find_queue_families(&families, no_surface());
        assert_eq!(found, Some(QueueFamilies { graphics: 1, present: 1 }));
    }

    #[test]
    fn missing_graphics_or_present_is_unsuitable() {
        let compute_only = [family(vk::QueueFlags::COMPUTE)];
        assert_eq!(find_queue_families(&compute_only, no_surface()), None);

        let graphics = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(find_queue_families(&graphics, Some(|_: u32| false)), None);
    }

    #[test]
    fn failed_present_query_skips_to_the_next_device() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        // device 0 lost its surface, device 1 can present
        let query = |device: u32| {
            if device == 0 {
                Err(vk::Result::ERROR_SURFACE_LOST_KHR)
            } else {
                Ok(true)
            }
        };

        let selected = first_suitable(&[0u32, 1], |device| {
            Ok(find_queue_families(
                &families,
                Some(|f: u32| present_supported(query(device), f)),
            ))
        })
        .unwrap();

        assert_eq!(selected, (1, QueueFamilies { graphics: 0, present: 0 }));
    }

    #[test]
    fn selection_is_first_fit_and_deterministic() {
        // device 0 has no present support, devices 1 and 2 both qualify
        let probe = |device: u32| {
            Ok(match device {
                0 => None,
                1 => Some(QueueFamilies { graphics: 0, present: 1 }),
                _ => Some(QueueFamilies { graphics: 0, present: 0 }),
            })
        };

        let first = first_suitable(&[0u32, 1, 2], probe).unwrap();
        let second = first_suitable(&[0u32, 1, 2], probe).unwrap();
        assert_eq!(first, (1, QueueFamilies { graphics: 0, present: 1 }));
        assert_eq!(first, second);
    }

    #[test]
    fn no_candidate_is_a_selection_failure() {
        let result = first_suitable(&[0u32, 1], |_| Ok(None));
        assert!(matches!(result, Err(Error::NoSuitableDevice)));
    }

    #[test]
    fn distinct_families_get_one_queue_request_each() {
        assert_eq!(QueueFamilies { graphics: 0, present: 0 }.unique(), [0]);
        assert_eq!(QueueFamilies { graphics: 0, present: 2 }.unique(), [0, 2]);
    }

    #[test]
    fn swapchain_extension_only_with_surface() {
        assert!(device_extensions(false).is_empty());
        assert_eq!(device_extensions(true).len(), 1);
    }
}
