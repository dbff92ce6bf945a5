//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - The [`gpu::GpuDevice`] seam every other module talks to the driver through
//! - Sub-allocated device memory, buffers and images
//! - Swapchain negotiation, render pass and framebuffers
//! - Command pools, descriptor pool batches and synchronization primitives

mod error;

pub mod command;
pub mod descriptor;
pub mod device;
pub mod gpu;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod swapchain;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
