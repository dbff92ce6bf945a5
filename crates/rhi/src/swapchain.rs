//! Swapchain negotiation and the objects built on top of swapchain images.
//!
//! # Overview
//!
//! - [`SwapchainSupportDetails`] and the `choose_*` helpers negotiate surface
//!   format, present mode, extent and image count for the ash device
//! - [`SwapchainTargets`] owns the swapchain together with everything that
//!   depends on its images: one image view and one framebuffer per image, and
//!   the color render pass
//!
//! Recreation tears the dependents down in reverse order, creates the new
//! swapchain from the old one, and rebuilds.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, SwapchainDesc, SwapchainInfo};

/// What a surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image count limits, current and allowed extents, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Picks `preferred` if the surface offers it, else B8G8R8A8_UNORM/SRGB_NONLINEAR,
/// else the first format. Returns `None` only for an empty list.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    let exact = formats
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space);

    if let Some(&format) = exact {
        debug!("Selected preferred surface format: {:?}", format.format);
        return Some(format);
    }

    let alternative = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = alternative {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return Some(format);
    }

    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("Using first available surface format: {:?}", format.format);
    }
    first
}

/// Picks `preferred` if available; FIFO otherwise, which every surface supports.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        debug!("Selected {:?} present mode", preferred);
        return preferred;
    }

    debug!("{:?} unavailable, selected FIFO present mode (vsync)", preferred);
    vk::PresentModeKHR::FIFO
}

/// The surface's current extent, or `width`×`height` clamped to its limits
/// when the surface reports the undefined extent (`u32::MAX`).
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    extent
}

/// One image more than the minimum, capped by the maximum (0 = no maximum).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// The swapchain and everything built on its images.
pub struct SwapchainTargets {
    device: Arc<dyn GpuDevice>,
    /// Handle, format and extent of the current swapchain
    info: SwapchainInfo,
    /// Presentable images, owned by the swapchain
    images: Vec<vk::Image>,
    /// One color view per image
    image_views: Vec<vk::ImageView>,
    /// Single color attachment pass every framebuffer is built against
    render_pass: vk::RenderPass,
    /// One framebuffer per image view
    framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainTargets {
    /// Creates a swapchain and its views, render pass and framebuffers.
    pub fn new(device: Arc<dyn GpuDevice>, desc: &SwapchainDesc) -> RhiResult<Self> {
        let info = device.create_swapchain(desc, vk::SwapchainKHR::null())?;
        let mut targets = Self {
            device,
            info,
            images: Vec::new(),
            image_views: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        };
        targets.build_dependents()?;
        Ok(targets)
    }

    /// Replaces the swapchain, passing the old one to the driver, and rebuilds
    /// every dependent object. The device must be idle.
    pub fn recreate(&mut self, desc: &SwapchainDesc) -> RhiResult<()> {
        self.destroy_dependents();

        let old = self.info.handle;
        let info = self.device.create_swapchain(desc, old)?;
        self.device.destroy_swapchain(old);
        self.info = info;

        info!(
            "Swapchain recreated: {}x{}, {:?}",
            info.extent.width, info.extent.height, info.present_mode
        );

        self.build_dependents()
    }

    fn build_dependents(&mut self) -> RhiResult<()> {
        self.images = self.device.swapchain_images(self.info.handle)?;
        if self.images.is_empty() {
            return Err(RhiError::SwapchainError("swapchain has no images".to_string()));
        }

        for &image in &self.images {
            let view =
                self.device
                    .create_image_view(image, self.info.format, vk::ImageAspectFlags::COLOR)?;
            self.image_views.push(view);
        }

        self.render_pass = self.device.create_render_pass(self.info.format)?;

        for &view in &self.image_views {
            let framebuffer =
                self.device
                    .create_framebuffer(self.render_pass, &[view], self.info.extent)?;
            self.framebuffers.push(framebuffer);
        }

        debug!(
            "Built {} image views and framebuffers",
            self.image_views.len()
        );
        Ok(())
    }

    fn destroy_dependents(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        self.images.clear();
    }

    #[inline]
    pub fn info(&self) -> &SwapchainInfo {
        &self.info
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.info.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.info.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

impl Drop for SwapchainTargets {
    fn drop(&mut self) {
        self.destroy_dependents();
        self.device.destroy_swapchain(self.info.handle);
        info!(
            "Swapchain destroyed (was {}x{})",
            self.info.extent.width, self.info.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, ObjectKind};

    fn srgb() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn desc() -> SwapchainDesc {
        SwapchainDesc {
            surface_format: srgb(),
            present_mode: vk::PresentModeKHR::MAILBOX,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_requested() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            srgb(),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats, srgb()).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let selected = choose_surface_format(&formats, srgb()).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[], srgb()).is_none());
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );

        let fifo_only = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&fifo_only, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!((extent.width, extent.height), (2000, 2000));

        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!((extent.width, extent.height), (100, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 3);
    }

    #[test]
    fn test_targets_build_one_view_and_framebuffer_per_image() {
        let device = Arc::new(FakeDevice::new());
        let targets = SwapchainTargets::new(device.clone(), &desc()).unwrap();

        assert_eq!(targets.image_count(), 3);
        assert_eq!(device.live_count(ObjectKind::ImageView), 3);
        assert_eq!(device.live_count(ObjectKind::Framebuffer), 3);
        assert_eq!(device.live_count(ObjectKind::RenderPass), 1);
        assert!(targets.framebuffer(2).is_some());
        assert!(targets.framebuffer(3).is_none());
    }

    #[test]
    fn test_recreate_leaves_no_duplicates() {
        let device = Arc::new(FakeDevice::new());
        let mut targets = SwapchainTargets::new(device.clone(), &desc()).unwrap();
        let old = targets.handle();

        device.set_surface_extent(1024, 768);
        targets.recreate(&desc()).unwrap();

        assert_ne!(targets.handle(), old);
        assert_eq!(targets.extent().width, 1024);
        assert_eq!(device.live_count(ObjectKind::Swapchain), 1);
        assert_eq!(device.live_count(ObjectKind::ImageView), 3);
        assert_eq!(device.live_count(ObjectKind::Framebuffer), 3);
        assert_eq!(device.live_count(ObjectKind::RenderPass), 1);

        drop(targets);
        assert!(!device.has_live_objects());
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..adequate.clone()
        };
        assert!(!no_formats.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
