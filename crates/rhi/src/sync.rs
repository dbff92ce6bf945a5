//! Synchronization primitives.
//!
//! - [`Semaphore`] orders queue operations on the GPU
//! - [`Fence`] lets the host wait for submitted work
//! - [`FrameSync`] groups the objects one frame slot needs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpack_rhi::gpu::GpuDevice;
//! use vkpack_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), vkpack_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! // Returns at once, the fence starts signaled.
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::error::RhiResult;
use crate::gpu::GpuDevice;

/// Number of frame slots the frame pipeline rotates through.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// GPU-to-GPU semaphore, destroyed on drop.
pub struct Semaphore {
    device: Arc<dyn GpuDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled semaphore.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let semaphore = device.create_semaphore()?;
        trace!("Created semaphore {:?}", semaphore);
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
        trace!("Destroyed semaphore {:?}", self.semaphore);
    }
}

/// GPU-to-CPU fence, destroyed on drop.
pub struct Fence {
    device: Arc<dyn GpuDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait
    /// returns immediately.
    pub fn new(device: Arc<dyn GpuDevice>, signaled: bool) -> RhiResult<Self> {
        let fence = device.create_fence(signaled)?;
        trace!(
            "Created fence {:?} ({})",
            fence,
            if signaled { "signaled" } else { "unsignaled" }
        );
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns the driver error, including `vk::Result::TIMEOUT`.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        self.device.wait_for_fences(&[self.fence], timeout)
    }

    /// Returns the fence to the unsignaled state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_fences(&[self.fence])
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        matches!(self.device.fence_status(self.fence), Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
        trace!("Destroyed fence {:?}", self.fence);
    }
}

/// Semaphores and fence owned by one frame slot.
///
/// ```text
/// 1. wait in_flight_fence            (slot's previous submission done)
/// 2. acquire image                   (signals image_available)
/// 3. reset in_flight_fence, submit   (waits image_available,
///                                     signals render_finished + fence)
/// 4. present                         (waits render_finished)
/// ```
pub struct FrameSync {
    image_available_semaphore: Semaphore,
    render_finished_semaphore: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// The fence starts signaled so the first frame does not block.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        debug!("Created frame synchronization primitives");

        Ok(Self {
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    #[inline]
    pub fn image_available_handle(&self) -> vk::Semaphore {
        self.image_available_semaphore.handle()
    }

    #[inline]
    pub fn render_finished_handle(&self) -> vk::Semaphore {
        self.render_finished_semaphore.handle()
    }

    #[inline]
    pub fn in_flight_fence_handle(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}
