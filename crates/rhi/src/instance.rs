//! Vulkan instance management.
//!
//! The [`Instance`] loads the Vulkan library, enables the surface extensions
//! the window system asks for, and optionally installs the validation layer
//! with a debug messenger that forwards driver messages to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use vkpack_rhi::instance::Instance;
//!
//! let surface_extensions = [ash::khr::surface::NAME];
//! let instance = Instance::new("demo", &surface_extensions, cfg!(debug_assertions))
//!     .expect("Failed to create Vulkan instance");
//! assert_eq!(instance.has_validation(), cfg!(debug_assertions));
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{error, info, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance extension list: what the window system requires, plus debug
/// utils when validation is on. Duplicates are dropped.
fn instance_extensions(required: &[&CStr], validation: bool) -> Vec<*const c_char> {
    let mut names: Vec<&CStr> = Vec::with_capacity(required.len() + 1);
    for &name in required {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if validation && !names.contains(&ash::ext::debug_utils::NAME) {
        names.push(ash::ext::debug_utils::NAME);
    }
    names.iter().map(|name| name.as_ptr()).collect()
}

/// Vulkan instance with an optional debug messenger.
pub struct Instance {
    /// Vulkan loader, kept alive for as long as the instance
    entry: Entry,
    instance: ash::Instance,
    /// Debug utils loader, present only with validation
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Messenger forwarding validation output to `tracing`
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates an instance with `surface_extensions` enabled.
    ///
    /// Validation is enabled only if requested and the layer is installed.
    pub fn new(
        application_name: &str,
        surface_extensions: &[&CStr],
        enable_validation: bool,
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let application_name = CString::new(application_name)
            .unwrap_or_else(|_| CString::from(c"vkpack"));
        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkpack")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let extensions = instance_extensions(surface_extensions, validation_available);
        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(|result| RhiError::vulkan("vkCreateInstance", result))?
        };

        info!(
            "Vulkan instance created with {} extension(s)",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            info!("Validation layers enabled");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        });

        Ok(found)
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(|result| RhiError::vulkan("vkCreateDebugUtilsMessengerEXT", result))?
        };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            info!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pointers: &[*const c_char]) -> Vec<&'static CStr> {
        pointers
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect()
    }

    #[test]
    fn test_extensions_follow_window_system() {
        let required = [ash::khr::surface::NAME, ash::khr::xlib_surface::NAME];
        let list = instance_extensions(&required, false);
        assert_eq!(names(&list), required.to_vec());
    }

    #[test]
    fn test_validation_adds_debug_utils_once() {
        let required = [ash::khr::surface::NAME, ash::ext::debug_utils::NAME];
        let list = instance_extensions(&required, true);
        assert_eq!(list.len(), 2);

        let list = instance_extensions(&[ash::khr::surface::NAME], true);
        assert!(names(&list).contains(&ash::ext::debug_utils::NAME));
    }

    #[test]
    fn test_duplicate_extensions_are_dropped() {
        let required = [ash::khr::surface::NAME, ash::khr::surface::NAME];
        assert_eq!(instance_extensions(&required, false).len(), 1);
    }
}
