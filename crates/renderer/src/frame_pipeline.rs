//! Frames in flight: acquire, record, submit, present, recreate.
//!
//! # Overview
//!
//! [`FramePipeline`] cycles [`MAX_FRAMES_IN_FLIGHT`] [`FrameSlot`]s over a
//! [`SwapchainTargets`]. Each slot's fence bounds how far the CPU can run
//! ahead of the GPU; the two semaphores order acquire, render and present on
//! the GPU without a CPU wait.
//!
//! ```text
//! begin_frame   wait slot fence, reset descriptors, acquire image,
//!               wait the fence of the slot that last used the image,
//!               begin command buffer and render pass
//! end_frame     end render pass and command buffer, reset fence, submit
//! present       present, recreate if stale or resized, advance slot
//! ```
//!
//! A stale swapchain (`ERROR_OUT_OF_DATE_KHR`, `SUBOPTIMAL_KHR`) or a
//! requested resize is handled by recreation, never reported as an error.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpack_core::Config;
//! use vkpack_rhi::gpu::GpuDevice;
//! use vkpack_renderer::FramePipeline;
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), vkpack_rhi::RhiError> {
//! let mut frames = FramePipeline::new(device, &Config::default())?;
//!
//! if frames.begin_frame()? {
//!     // Record into frames.current_command_buffer() ...
//!     frames.end_frame()?;
//!     frames.present()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace};

use vkpack_core::Config;
use vkpack_rhi::command::CommandBuffer;
use vkpack_rhi::descriptor::DescriptorPoolBatch;
use vkpack_rhi::gpu::{GpuDevice, Submission, SwapchainDesc};
use vkpack_rhi::swapchain::{SwapchainTargets, choose_extent};
use vkpack_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use vkpack_rhi::{RhiError, RhiResult};

use crate::frame_slot::{FrameSlot, SlotState};
use crate::precondition_failed;

/// Orchestrates the frame slot ring and swapchain recreation.
///
/// Slots are declared before the swapchain targets so they drop first.
pub struct FramePipeline {
    device: Arc<dyn GpuDevice>,
    slots: Vec<FrameSlot>,
    targets: SwapchainTargets,
    /// Slot that last rendered to each swapchain image.
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
    image_index: u32,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
    descriptor_pools_per_frame: u32,
    render_extent: vk::Extent2D,
    resize_requested: bool,
    extent_changed: bool,
}

impl FramePipeline {
    /// Creates the swapchain targets and the slot ring.
    ///
    /// `config.window_width`/`window_height` is the requested extent, used
    /// when the surface leaves the size to the application.
    pub fn new(device: Arc<dyn GpuDevice>, config: &Config) -> RhiResult<Self> {
        let surface_format = config.surface_format;
        let present_mode = config.present_mode.to_vk();
        let requested = vk::Extent2D {
            width: config.window_width,
            height: config.window_height,
        };

        let targets = SwapchainTargets::new(
            device.clone(),
            &SwapchainDesc {
                surface_format,
                present_mode,
                extent: requested,
            },
        )?;

        let slots = Self::build_slots(
            &device,
            targets.image_count(),
            config.descriptor_pools_per_frame,
        )?;
        let render_extent = targets.extent();

        info!(
            "Frame pipeline created: {} frames in flight, {} swapchain images, {}x{}",
            MAX_FRAMES_IN_FLIGHT,
            targets.image_count(),
            render_extent.width,
            render_extent.height
        );

        Ok(Self {
            device,
            images_in_flight: vec![None; targets.image_count()],
            slots,
            targets,
            current_frame: 0,
            image_index: 0,
            surface_format,
            present_mode,
            clear_color: config.clear_color,
            descriptor_pools_per_frame: config.descriptor_pools_per_frame,
            render_extent,
            resize_requested: false,
            extent_changed: false,
        })
    }

    fn build_slots(
        device: &Arc<dyn GpuDevice>,
        image_count: usize,
        descriptor_pools: u32,
    ) -> RhiResult<Vec<FrameSlot>> {
        (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSlot::new(device.clone(), image_count, descriptor_pools))
            .collect()
    }

    /// Starts a frame.
    ///
    /// Returns `false` when the swapchain had to be recreated instead; the
    /// caller skips this frame and tries again next tick.
    pub fn begin_frame(&mut self) -> RhiResult<bool> {
        let current = self.current_frame;
        let state = self.slots[current].state();
        if state != SlotState::Idle {
            return Err(precondition_failed(RhiError::SwapchainError(format!(
                "begin_frame on slot {current} while {state}"
            ))));
        }

        self.slots[current].wait()?;
        self.slots[current].descriptors().reset_all()?;

        if self.resize_requested {
            debug!("Resize pending, recreating swapchain instead of rendering");
            self.recreate_swapchain()?;
            return Ok(false);
        }

        self.slots[current].set_state(SlotState::Acquiring);
        let semaphore = self.slots[current].sync().image_available_handle();
        let image_index = match self
            .device
            .acquire_next_image(self.targets.handle(), semaphore)
        {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    trace!("Acquired suboptimal image {}", index);
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                self.slots[current].set_state(SlotState::Idle);
                self.recreate_swapchain()?;
                return Ok(false);
            }
            Err(e) => {
                self.slots[current].set_state(SlotState::Idle);
                return Err(RhiError::vulkan("vkAcquireNextImageKHR", e));
            }
        };

        if let Err(err) = self.start_recording(current, image_index) {
            self.slots[current].set_state(SlotState::Idle);
            return Err(err);
        }

        self.slots[current].set_state(SlotState::Recording);
        trace!("Frame slot {} recording image {}", current, image_index);
        Ok(true)
    }

    /// Waits out the image's previous owner and opens the render pass.
    fn start_recording(&mut self, current: usize, image_index: u32) -> RhiResult<()> {
        let Some(in_flight) = self.images_in_flight.get_mut(image_index as usize) else {
            return Err(RhiError::SwapchainError(format!(
                "acquired image {image_index} of {}",
                self.targets.image_count()
            )));
        };
        let previous = in_flight.replace(current);
        if let Some(previous) = previous
            && previous != current
        {
            trace!(
                "Image {} last used by slot {}, waiting on its fence",
                image_index, previous
            );
            self.slots[previous].wait()?;
        }

        self.image_index = image_index;

        let framebuffer = self.targets.framebuffer(image_index).ok_or_else(|| {
            RhiError::SwapchainError(format!("no framebuffer for image {image_index}"))
        })?;
        let cmd = self.slots[current].command_buffer(image_index).ok_or_else(|| {
            RhiError::SwapchainError(format!("no command buffer for image {image_index}"))
        })?;

        cmd.begin()?;
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        cmd.begin_render_pass(
            self.targets.render_pass(),
            framebuffer,
            self.targets.extent(),
            &clear_values,
        );
        Ok(())
    }

    /// Closes the recording and submits it.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        let current = self.current_frame;
        let slot = &mut self.slots[current];
        if slot.state() != SlotState::Recording {
            return Err(precondition_failed(RhiError::SwapchainError(format!(
                "end_frame on slot {current} while {}",
                slot.state()
            ))));
        }

        let cmd = slot.command_buffer(self.image_index).ok_or_else(|| {
            RhiError::SwapchainError(format!("no command buffer for image {}", self.image_index))
        })?;
        cmd.end_render_pass();
        cmd.end()?;

        slot.fence().reset()?;

        let wait_semaphores = [slot.sync().image_available_handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd.handle()];
        let signal_semaphores = [slot.sync().render_finished_handle()];

        self.device.submit_graphics(
            &Submission {
                wait_semaphores: &wait_semaphores,
                wait_stages: &wait_stages,
                command_buffers: &command_buffers,
                signal_semaphores: &signal_semaphores,
            },
            slot.sync().in_flight_fence_handle(),
        )?;

        slot.set_state(SlotState::Submitted);
        trace!("Frame slot {} submitted", current);
        Ok(())
    }

    /// Presents the submitted image and moves to the next slot.
    ///
    /// Recreates the swapchain first when the present reports it stale, a
    /// resize was requested, or the render size changed.
    pub fn present(&mut self) -> RhiResult<()> {
        let current = self.current_frame;
        let slot = &mut self.slots[current];
        if slot.state() != SlotState::Submitted {
            return Err(precondition_failed(RhiError::SwapchainError(format!(
                "present on slot {current} while {}",
                slot.state()
            ))));
        }

        slot.set_state(SlotState::Presenting);
        let result = self.device.queue_present(
            self.targets.handle(),
            self.image_index,
            slot.sync().render_finished_handle(),
        );
        slot.set_state(SlotState::Idle);

        let stale = match result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => true,
            Err(e) => return Err(RhiError::vulkan("vkQueuePresentKHR", e)),
        };

        if stale || self.resize_requested || self.extent_changed {
            debug!(
                "Recreating after present (stale: {}, resize: {}, extent changed: {})",
                stale, self.resize_requested, self.extent_changed
            );
            self.recreate_swapchain()?;
        }

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(())
    }

    /// Rebuilds the swapchain and everything that depends on it.
    ///
    /// Waits for the device to go idle, drops the slots (command pools and
    /// buffers), then the framebuffers, render pass, image views and the old
    /// swapchain, and builds them again. A surface with a zero extent
    /// (minimized window) leaves the resize pending.
    pub fn recreate_swapchain(&mut self) -> RhiResult<()> {
        let capabilities = self.device.surface_capabilities()?;
        if capabilities.current_extent.width == 0 || capabilities.current_extent.height == 0 {
            debug!("Surface has zero extent, deferring swapchain recreation");
            self.resize_requested = true;
            return Ok(());
        }

        self.device.wait_idle()?;

        self.slots.clear();
        let desc = self.swapchain_desc();
        self.targets.recreate(&desc)?;
        self.slots = Self::build_slots(
            &self.device,
            self.targets.image_count(),
            self.descriptor_pools_per_frame,
        )?;

        self.images_in_flight = vec![None; self.targets.image_count()];
        self.render_extent = self.targets.extent();
        self.resize_requested = false;
        self.extent_changed = false;

        info!(
            "Frame pipeline rebuilt at {}x{}",
            self.render_extent.width, self.render_extent.height
        );
        Ok(())
    }

    /// Flags a resize to `width`x`height`; applied at the next frame boundary.
    pub fn request_resize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.set_render_size(width, height)?;
        self.resize_requested = true;
        debug!("Resize requested: {}x{}", width, height);
        Ok(())
    }

    /// Sets the render extent from a window size.
    ///
    /// The surface's current extent wins when it reports one; otherwise the
    /// size is clamped to the surface limits. A new extent makes the next
    /// present recreate the swapchain.
    pub fn set_render_size(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let capabilities = self.device.surface_capabilities()?;
        let extent = choose_extent(&capabilities, width, height);

        self.render_extent = extent;
        if extent != self.targets.extent() {
            self.extent_changed = true;
        }
        Ok(())
    }

    fn swapchain_desc(&self) -> SwapchainDesc {
        SwapchainDesc {
            surface_format: self.surface_format,
            present_mode: self.present_mode,
            extent: self.render_extent,
        }
    }

    /// The command buffer being recorded, between `begin_frame` and `end_frame`.
    pub fn current_command_buffer(&self) -> Option<&CommandBuffer> {
        let slot = &self.slots[self.current_frame];
        if slot.state() == SlotState::Recording {
            slot.command_buffer(self.image_index)
        } else {
            None
        }
    }

    /// Descriptor pools of the current slot, reset at every `begin_frame`.
    pub fn current_descriptors_mut(&mut self) -> &mut DescriptorPoolBatch {
        self.slots[self.current_frame].descriptors_mut()
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    #[inline]
    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    #[inline]
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    #[inline]
    pub fn swapchain(&self) -> &SwapchainTargets {
        &self.targets
    }

    #[inline]
    pub fn render_extent(&self) -> vk::Extent2D {
        self.render_extent
    }

    #[inline]
    pub fn is_resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Full-extent viewport with depth range 0..1.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.render_extent.width as f32,
            height: self.render_extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.render_extent,
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle before frame pipeline teardown: {}", e);
        }
        self.slots.clear();
        debug!("Frame pipeline destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkpack_rhi::testing::{FakeDevice, ObjectKind, RecordedCommand};

    fn pipeline() -> (Arc<FakeDevice>, FramePipeline) {
        let fake = Arc::new(FakeDevice::new());
        let frames = FramePipeline::new(fake.clone(), &Config::default()).unwrap();
        (fake, frames)
    }

    fn run_frame(frames: &mut FramePipeline) -> bool {
        if !frames.begin_frame().unwrap() {
            return false;
        }
        frames.end_frame().unwrap();
        frames.present().unwrap();
        true
    }

    #[test]
    fn test_frame_records_render_pass_and_submits() {
        let (fake, mut frames) = pipeline();

        assert!(frames.begin_frame().unwrap());
        assert!(frames.current_command_buffer().is_some());
        frames.end_frame().unwrap();
        assert!(frames.current_command_buffer().is_none());
        frames.present().unwrap();

        let commands = fake.commands();
        assert!(matches!(commands[0], RecordedCommand::Begin(_)));
        assert!(matches!(
            &commands[1],
            RecordedCommand::BeginRenderPass { extent, .. } if extent.width == 640 && extent.height == 480
        ));
        assert!(matches!(commands[2], RecordedCommand::EndRenderPass(_)));
        assert!(matches!(commands[3], RecordedCommand::End(_)));

        let submissions = fake.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].wait_semaphores.len(), 1);
        assert_eq!(submissions[0].signal_semaphores.len(), 1);
        assert_ne!(submissions[0].fence, vk::Fence::null());
        assert_eq!(fake.presents(), vec![0]);
    }

    #[test]
    fn test_slots_cycle_modulo_two() {
        let (_fake, mut frames) = pipeline();

        for expected in [0, 1, 0, 1] {
            assert_eq!(frames.current_frame(), expected);
            assert!(run_frame(&mut frames));
        }
    }

    #[test]
    fn test_begin_frame_resets_descriptor_batch() {
        let (fake, mut frames) = pipeline();
        assert!(run_frame(&mut frames));
        assert!(run_frame(&mut frames));
        assert_eq!(fake.descriptor_pool_resets(), 2);
    }

    #[test]
    fn test_out_of_date_acquire_recreates_and_skips() {
        let (fake, mut frames) = pipeline();
        fake.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert!(!frames.begin_frame().unwrap());
        assert_eq!(fake.created_count(ObjectKind::Swapchain), 2);
        assert_eq!(fake.live_count(ObjectKind::Swapchain), 1);
        assert_eq!(fake.device_wait_idle_count(), 1);
        assert!(fake.submissions().is_empty());

        assert!(run_frame(&mut frames));
    }

    #[test]
    fn test_acquire_failure_is_reported() {
        let (fake, mut frames) = pipeline();
        fake.script_acquire(Err(vk::Result::ERROR_DEVICE_LOST));

        let err = frames.begin_frame().unwrap_err();
        assert!(matches!(
            err,
            RhiError::Vulkan {
                op: "vkAcquireNextImageKHR",
                result: vk::Result::ERROR_DEVICE_LOST
            }
        ));
        assert_eq!(frames.slots()[0].state(), SlotState::Idle);
    }

    #[test]
    fn test_failed_wait_on_previous_owner_returns_slot_to_idle() {
        let (fake, mut frames) = pipeline();
        assert!(run_frame(&mut frames));

        // Slot 1 gets image 0, still owned by slot 0, and that wait fails.
        fake.script_acquire(Ok((0, false)));
        fake.script_fence_wait(None);
        fake.script_fence_wait(Some(vk::Result::ERROR_DEVICE_LOST));
        let err = frames.begin_frame().unwrap_err();
        assert!(matches!(
            err,
            RhiError::Vulkan {
                result: vk::Result::ERROR_DEVICE_LOST,
                ..
            }
        ));
        assert_eq!(frames.slots()[1].state(), SlotState::Idle);

        assert_eq!(frames.current_frame(), 1);
        assert!(run_frame(&mut frames));
    }

    #[test]
    fn test_suboptimal_present_recreates() {
        let (fake, mut frames) = pipeline();
        fake.script_present(Ok(true));

        assert!(run_frame(&mut frames));
        assert_eq!(fake.created_count(ObjectKind::Swapchain), 2);
        assert_eq!(frames.current_frame(), 1);
    }

    #[test]
    fn test_present_error_is_reported() {
        let (fake, mut frames) = pipeline();
        fake.script_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR));

        assert!(frames.begin_frame().unwrap());
        frames.end_frame().unwrap();
        assert!(frames.present().is_err());
    }

    #[test]
    fn test_requested_resize_applies_before_next_frame() {
        let (fake, mut frames) = pipeline();
        fake.set_surface_extent(800, 600);

        frames.request_resize(800, 600).unwrap();
        assert!(frames.is_resize_requested());
        assert!(!frames.begin_frame().unwrap());
        assert!(!frames.is_resize_requested());
        assert_eq!(frames.swapchain().extent(), vk::Extent2D { width: 800, height: 600 });

        assert!(run_frame(&mut frames));
    }

    #[test]
    fn test_render_size_clamped_with_undefined_surface_extent() {
        let (fake, mut frames) = pipeline();
        fake.set_undefined_surface_extent(true);

        frames.set_render_size(10_000, 300).unwrap();
        assert_eq!(frames.render_extent(), vk::Extent2D { width: 4096, height: 300 });
        assert_eq!(frames.scissor().extent.width, 4096);

        assert!(run_frame(&mut frames));
        assert_eq!(frames.swapchain().extent(), vk::Extent2D { width: 4096, height: 300 });
    }

    #[test]
    fn test_unchanged_render_size_does_not_recreate() {
        let (fake, mut frames) = pipeline();
        frames.set_render_size(640, 480).unwrap();
        assert!(run_frame(&mut frames));
        assert_eq!(fake.created_count(ObjectKind::Swapchain), 1);
    }

    #[test]
    fn test_minimized_surface_defers_recreation() {
        let (fake, mut frames) = pipeline();
        fake.set_surface_extent(0, 0);
        frames.request_resize(0, 0).unwrap();

        assert!(!frames.begin_frame().unwrap());
        assert!(frames.is_resize_requested());
        assert_eq!(fake.created_count(ObjectKind::Swapchain), 1);

        fake.set_surface_extent(320, 240);
        assert!(!frames.begin_frame().unwrap());
        assert_eq!(frames.swapchain().extent(), vk::Extent2D { width: 320, height: 240 });
    }

    #[test]
    fn test_images_in_flight_track_slots() {
        let (_fake, mut frames) = pipeline();

        assert!(run_frame(&mut frames));
        assert!(run_frame(&mut frames));
        assert_eq!(frames.images_in_flight(), &[Some(0), Some(1), None]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "precondition violated")]
    fn test_end_frame_without_begin_panics() {
        let (_fake, mut frames) = pipeline();
        let _ = frames.end_frame();
    }

    #[test]
    fn test_drop_releases_all_objects() {
        let (fake, frames) = pipeline();
        drop(frames);
        assert!(!fake.has_live_objects());
    }
}
