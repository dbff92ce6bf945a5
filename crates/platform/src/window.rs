//! The window system capability consumed by the event loop and render context.

use std::ffi::CStr;

use vkpack_core::Result;

use crate::surface::Surface;

/// What happened since the previous poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowEvents {
    /// The user asked to close the window.
    pub quit: bool,
    /// Latest pixel size reported by a resize, if any.
    pub resized: Option<(u32, u32)>,
}

/// An owned window and the event source attached to it.
///
/// One implementation exists per windowing backend; everything above this
/// trait is backend-agnostic.
pub trait WindowSystem {
    /// Drains pending events without blocking.
    fn poll_events(&mut self) -> WindowEvents;

    /// Current drawable size in pixels.
    fn size(&self) -> (u32, u32);

    /// Instance extensions needed by [`create_surface`](Self::create_surface).
    fn required_extensions(&self) -> Result<Vec<&'static CStr>>;

    /// Creates a surface for this window. The window must outlive it.
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface>;
}
