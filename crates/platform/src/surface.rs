//! Vulkan surface ownership and the instance extensions a surface needs.

use std::ffi::CStr;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use vkpack_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// This struct owns a `vk::SurfaceKHR` handle and destroys it when dropped.
///
/// # Ownership
/// The caller must ensure that the Vulkan instance outlives this surface, and
/// that every device using the surface is destroyed before it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates a surface for a native window.
    ///
    /// # Safety
    /// `display` and `window` must refer to a live native window that outlives
    /// the returned surface.
    pub unsafe fn from_raw_handles(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        // SAFETY: handle validity is the caller's contract; the surface is
        // destroyed in Drop with a loader created from the same instance.
        let handle = unsafe { ash_window::create_surface(entry, instance, display, window, None) }
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {e}")))?;

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Self {
            handle,
            surface_loader,
        })
    }

    /// The raw surface handle, valid as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle came from ash_window::create_surface and is
        // destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Instance extensions required to create a surface on `display`.
///
/// # Errors
/// Returns [`Error::Vulkan`] if the platform has no Vulkan surface support.
pub fn required_surface_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| Error::Vulkan(format!("Failed to enumerate required extensions: {e}")))?;

    let names: Vec<&'static CStr> = extensions
        .iter()
        // SAFETY: ash_window returns pointers to static, null-terminated
        // extension name constants.
        .map(|&ext| unsafe { CStr::from_ptr(ext) })
        .collect();

    tracing::debug!("Required Vulkan extensions for surface: {:?}", names);

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Surface>();
    }
}
