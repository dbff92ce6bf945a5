//! Platform abstraction layer for vkpack.
//!
//! This crate provides platform-specific functionality:
//! - The [`WindowSystem`] capability and its winit implementation
//! - Vulkan surface creation from raw window handles
//! - The paced event loop that drives a [`FrameHandler`]

mod event_loop;
mod surface;
mod window;
mod winit_backend;

pub use event_loop::{FrameHandler, ResizeDebounce, run_event_loop};
pub use surface::{Surface, required_surface_extensions};
pub use window::{WindowEvents, WindowSystem};
pub use winit_backend::WinitWindowSystem;
