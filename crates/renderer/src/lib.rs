//! Frame pipeline and upload path.
//!
//! This crate orchestrates per-frame GPU work on top of `vkpack-rhi`:
//! - The frame slot ring and swapchain recreation ([`FramePipeline`])
//! - Deferred host-to-device copies ([`UploadQueue`])
//! - The [`RenderContext`] that owns all of it

mod context;
mod frame_pipeline;
mod frame_slot;
mod upload;

pub use context::RenderContext;
pub use frame_pipeline::FramePipeline;
pub use frame_slot::{DESCRIPTOR_SETS_PER_POOL, FrameSlot, SlotState};
pub use upload::{ImageRegion, UploadQueue};

pub use vkpack_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use vkpack_rhi::RhiError;

/// Asserts in debug builds, then hands the error back for the caller to return.
pub(crate) fn precondition_failed(err: RhiError) -> RhiError {
    debug_assert!(false, "precondition violated: {}", err);
    err
}
