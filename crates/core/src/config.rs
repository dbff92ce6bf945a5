//! Engine configuration.
//!
//! [`Config`] is a plain value assembled once at startup (from defaults and
//! command line overrides) and handed to the render context and event loop.

use ash::vk;

use crate::error::{Error, Result};

/// Smallest device-memory block or buffer created by the resource manager.
pub const DEFAULT_MIN_ALLOCATION_SIZE: u64 = 16 * 1024 * 1024;

/// Preferred presentation mode. The driver may not offer it; FIFO is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentModePreference {
    /// Low latency without tearing.
    #[default]
    Mailbox,
    /// Strict vsync.
    Fifo,
    /// No vsync, may tear.
    Immediate,
}

impl PresentModePreference {
    /// The Vulkan present mode this preference asks for.
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// Configuration for the render context, memory manager and event loop.
#[derive(Debug, Clone)]
pub struct Config {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Frames per second the event loop paces `update`/`render` to.
    pub target_fps: f64,
    /// Seconds a resize must stay quiet before the swapchain is rebuilt.
    /// Zero applies every resize on the next tick.
    pub resize_timeout: f64,
    /// Lower bound for new memory blocks and buffers, in bytes.
    pub min_allocation_size: u64,
    pub present_mode: PresentModePreference,
    pub surface_format: vk::SurfaceFormatKHR,
    pub clear_color: [f32; 4],
    /// Descriptor pools created up front in every frame slot's batch.
    pub descriptor_pools_per_frame: u32,
    pub enable_validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_title: "vkpack".to_string(),
            window_width: 640,
            window_height: 480,
            target_fps: 60.0,
            resize_timeout: 0.1,
            min_allocation_size: DEFAULT_MIN_ALLOCATION_SIZE,
            present_mode: PresentModePreference::default(),
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            clear_color: [0.0, 0.0, 0.0, 1.0],
            descriptor_pools_per_frame: 1,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl Config {
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }

    pub fn with_target_fps(mut self, fps: f64) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_resize_timeout(mut self, seconds: f64) -> Self {
        self.resize_timeout = seconds;
        self
    }

    pub fn with_min_allocation_size(mut self, bytes: u64) -> Self {
        self.min_allocation_size = bytes;
        self
    }

    pub fn with_present_mode(mut self, mode: PresentModePreference) -> Self {
        self.present_mode = mode;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Seconds between two paced ticks.
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.target_fps
    }

    /// Checks the values that would otherwise fail deep inside the frame loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.target_fps.is_nan() || self.target_fps <= 0.0 {
            return Err(Error::Config(format!(
                "target_fps must be positive, got {}",
                self.target_fps
            )));
        }
        if self.resize_timeout.is_nan() || self.resize_timeout < 0.0 {
            return Err(Error::Config(format!(
                "resize_timeout must not be negative, got {}",
                self.resize_timeout
            )));
        }
        if self.min_allocation_size == 0 {
            return Err(Error::Config("min_allocation_size must be non-zero".to_string()));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window_width, self.window_height
            )));
        }
        if self.descriptor_pools_per_frame == 0 {
            return Err(Error::Config(
                "descriptor_pools_per_frame must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_allocation_size, 16_777_216);
        assert_eq!(config.target_fps, 60.0);
        assert_eq!((config.window_width, config.window_height), (640, 480));
        assert_eq!(config.present_mode.to_vk(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::default()
            .with_window_size(1280, 720)
            .with_target_fps(120.0)
            .with_resize_timeout(0.0)
            .with_present_mode(PresentModePreference::Fifo);

        assert_eq!(config.window_width, 1280);
        assert!((config.frame_interval() - 1.0 / 120.0).abs() < 1e-12);
        assert_eq!(config.resize_timeout, 0.0);
        assert_eq!(config.present_mode.to_vk(), vk::PresentModeKHR::FIFO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::default().with_target_fps(0.0).validate().is_err());
        assert!(Config::default().with_target_fps(f64::NAN).validate().is_err());
        assert!(Config::default().with_resize_timeout(-1.0).validate().is_err());
        assert!(Config::default().with_min_allocation_size(0).validate().is_err());
        assert!(Config::default().with_window_size(0, 10).validate().is_err());
    }
}
