//! Command pool and command buffer wrappers.
//!
//! - [`CommandPool`] owns a `VkCommandPool` on the graphics queue family
//! - [`CommandBuffer`] records the commands the frame pipeline and the upload
//!   queue need
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpack_rhi::gpu::GpuDevice;
//! use vkpack_rhi::command::{CommandBuffer, CommandPool};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), vkpack_rhi::RhiError> {
//! let pool = CommandPool::new_transient(device.clone())?;
//! let cmd = CommandBuffer::new(device, &pool)?;
//!
//! cmd.begin()?;
//! // ... record copies ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Graphics-family command pool, destroyed on drop together with its buffers.
pub struct CommandPool {
    device: Arc<dyn GpuDevice>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Pool whose buffers can be reset one by one.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        Self::with_flags(device, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    /// Pool for short-lived buffers recorded once, such as upload batches.
    pub fn new_transient(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        Self::with_flags(
            device,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
    }

    fn with_flags(device: Arc<dyn GpuDevice>, flags: vk::CommandPoolCreateFlags) -> RhiResult<Self> {
        let pool = device.create_command_pool(flags)?;
        debug!("Command pool created ({:?})", flags);
        Ok(Self { device, pool })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates one primary command buffer.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        self.allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or(RhiError::vulkan(
                "vkAllocateCommandBuffers",
                vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            ))
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        self.device.allocate_command_buffers(self.pool, count)
    }

    /// Returns `buffers` to the pool.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        self.device.free_command_buffers(self.pool, buffers);
    }

    /// Resets every buffer allocated from this pool.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_command_pool(self.pool)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
        debug!("Command pool destroyed");
    }
}

/// Pipeline stages and access masks for an image layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

/// Chooses stages and access masks for `old_layout -> new_layout`.
///
/// Unknown pairs fall back to a full `ALL_COMMANDS` barrier.
pub fn transition_masks(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> TransitionMasks {
    let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
        ),
        (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::empty(),
        ),
        _ => {
            warn!(
                "Unhandled layout transition: {:?} -> {:?}",
                old_layout, new_layout
            );
            (
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            )
        }
    };

    TransitionMasks {
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    }
}

/// A primary command buffer.
///
/// Does not own the handle; it is freed with its [`CommandPool`].
pub struct CommandBuffer {
    device: Arc<dyn GpuDevice>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a new command buffer from `pool`.
    pub fn new(device: Arc<dyn GpuDevice>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self { device, buffer })
    }

    /// Wraps an already allocated handle.
    pub fn from_handle(device: Arc<dyn GpuDevice>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        self.device
            .begin_command_buffer(self.buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    pub fn end(&self) -> RhiResult<()> {
        self.device.end_command_buffer(self.buffer)
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.buffer, src, dst, regions);
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device
            .cmd_copy_buffer_to_image(self.buffer, src, dst, dst_layout, regions);
    }

    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        self.device
            .cmd_pipeline_barrier(self.buffer, src_stage, dst_stage, image_barriers);
    }

    /// Records a layout transition over all mip levels and array layers of `image`.
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        subresource_range: vk::ImageSubresourceRange,
    ) {
        let masks = transition_masks(old_layout, new_layout);

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        self.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
    }

    /// Begins `render_pass` on `framebuffer`, clearing the whole render area.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        self.device
            .cmd_begin_render_pass(self.buffer, render_pass, framebuffer, extent, clear_values);
    }

    pub fn end_render_pass(&self) {
        self.device.cmd_end_render_pass(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::testing::{FakeDevice, ObjectKind, RecordedCommand};

    fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1)
    }

    #[test]
    fn test_upload_transition_masks() {
        let to_dst = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let to_read = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(to_read.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_unknown_transition_uses_full_barrier() {
        let masks = transition_masks(
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::ALL_COMMANDS);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::ALL_COMMANDS);
    }

    #[test]
    fn test_recording_goes_through_device() {
        let device = Arc::new(FakeDevice::new());
        let pool = CommandPool::new_transient(device.clone()).unwrap();
        let cmd = CommandBuffer::new(device.clone(), &pool).unwrap();
        let image = vk::Image::from_raw(42);

        cmd.begin().unwrap();
        cmd.transition_image_layout(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            color_range(),
        );
        cmd.end().unwrap();

        let commands = device.commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], RecordedCommand::Begin(c) if c == cmd.handle()));
        match &commands[1] {
            RecordedCommand::ImageBarrier {
                image: barrier_image,
                old_layout,
                new_layout,
                ..
            } => {
                assert_eq!(*barrier_image, image);
                assert_eq!(*old_layout, vk::ImageLayout::UNDEFINED);
                assert_eq!(*new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(matches!(commands[2], RecordedCommand::End(_)));
    }

    #[test]
    fn test_pool_drop_destroys_pool() {
        let device = Arc::new(FakeDevice::new());
        let pool = CommandPool::new(device.clone()).unwrap();
        let buffers = pool.allocate_command_buffers(2).unwrap();
        assert_eq!(buffers.len(), 2);
        assert_ne!(buffers[0], buffers[1]);
        assert_eq!(device.live_count(ObjectKind::CommandPool), 1);

        drop(pool);
        assert_eq!(device.live_count(ObjectKind::CommandPool), 0);
    }
}
