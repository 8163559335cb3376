// Vulkan Instance - loader, instance, validation messenger
//
// Responsibilities:
// - Load the Vulkan library
// - Create the instance from caller-supplied extensions and layers
// - Route validation messages into `log` (when validation is enabled)

use ash::{vk, Entry};
use std::ffi::{CStr, CString};

use crate::error::{Result, VkResultExt};

pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Create the Vulkan instance
    ///
    /// # Arguments
    /// * `extensions` - Instance extensions the surface callback will need
    /// * `layers` - Layers to enable, only honoured when `enable_validation` is set
    /// * `enable_validation` - Enable layers and hook up the debug messenger
    pub fn new(extensions: &[CString], layers: &[CString], enable_validation: bool) -> Result<Self> {
        let entry = unsafe { Entry::load() }?;

        let app_name = CString::new(env!("CARGO_PKG_NAME")).unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&app_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let enabled_extensions = instance_extensions(extensions, enable_validation);
        let extension_ptrs: Vec<_> = enabled_extensions.iter().map(|e| e.as_ptr()).collect();

        let layer_ptrs: Vec<_> = if enable_validation {
            layers.iter().map(|l| l.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.vk("vkCreateInstance")?;

        log::debug!(
            "Initialized Vulkan instance ({} {}, extensions: {}, layers: {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            extension_ptrs.len(),
            layer_ptrs.len()
        );

        let mut this = Self {
            entry,
            instance,
            debug_utils: None,
        };

        if enable_validation {
            this.debug_utils = Some(this.setup_debug_messenger()?);
        }

        Ok(this)
    }

    fn setup_debug_messenger(
        &self,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(&self.entry, &self.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .vk("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Caller extensions, plus debug utils when validation needs it.
fn instance_extensions(extensions: &[CString], enable_validation: bool) -> Vec<CString> {
    let mut enabled = extensions.to_vec();
    let debug_utils = ash::extensions::ext::DebugUtils::name();
    if enable_validation && !enabled.iter().any(|e| e.as_c_str() == debug_utils) {
        enabled.push(debug_utils.to_owned());
    }
    enabled
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[CString]) -> Vec<&str> {
        list.iter().map(|c| c.to_str().unwrap()).collect()
    }

    #[test]
    fn validation_adds_debug_utils_once() {
        let requested = vec![CString::new("VK_KHR_surface").unwrap()];

        let enabled = instance_extensions(&requested, true);
        assert_eq!(names(&enabled), ["VK_KHR_surface", "VK_EXT_debug_utils"]);

        let again = instance_extensions(&enabled, true);
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn no_validation_keeps_extensions_verbatim() {
        let requested = vec![CString::new("VK_KHR_surface").unwrap()];
        assert_eq!(names(&instance_extensions(&requested, false)), ["VK_KHR_surface"]);
    }
}
