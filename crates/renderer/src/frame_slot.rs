//! One element of the frame-in-flight ring.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use vkpack_rhi::RhiResult;
use vkpack_rhi::command::{CommandBuffer, CommandPool};
use vkpack_rhi::descriptor::{DescriptorPoolBatch, default_pool_sizes};
use vkpack_rhi::gpu::GpuDevice;
use vkpack_rhi::sync::{Fence, FrameSync};

/// Descriptor sets per pool in a slot's batch.
pub const DESCRIPTOR_SETS_PER_POOL: u32 = 64;

/// Where a slot is in its acquire, record, submit, present cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Recording => "recording",
            Self::Submitted => "submitted",
            Self::Presenting => "presenting",
        };
        f.write_str(name)
    }
}

/// Per-frame resources: synchronization, a command pool with one command
/// buffer per swapchain image, and a descriptor pool batch.
///
/// Field order is drop order: the command pool goes before the buffers
/// allocated from it are forgotten.
pub struct FrameSlot {
    sync: FrameSync,
    command_pool: CommandPool,
    command_buffers: Vec<CommandBuffer>,
    descriptors: DescriptorPoolBatch,
    state: SlotState,
}

impl FrameSlot {
    /// Creates a slot for a swapchain of `image_count` images with
    /// `descriptor_pools` pools in its batch.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        image_count: usize,
        descriptor_pools: u32,
    ) -> RhiResult<Self> {
        let sync = FrameSync::new(device.clone())?;
        let command_pool = CommandPool::new(device.clone())?;
        let command_buffers = command_pool
            .allocate_command_buffers(image_count as u32)?
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();

        let mut descriptors = DescriptorPoolBatch::new(device);
        let pool_sizes = default_pool_sizes(DESCRIPTOR_SETS_PER_POOL);
        for _ in 0..descriptor_pools {
            descriptors.create_pool(DESCRIPTOR_SETS_PER_POOL, &pool_sizes)?;
        }

        debug!(
            "Frame slot created: {} command buffers, {} descriptor pools",
            image_count, descriptor_pools
        );

        Ok(Self {
            sync,
            command_pool,
            command_buffers,
            descriptors,
            state: SlotState::Idle,
        })
    }

    /// Blocks until the slot's last submission has finished on the GPU.
    pub fn wait(&self) -> RhiResult<()> {
        self.sync.in_flight_fence().wait(u64::MAX)
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        self.sync.in_flight_fence()
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Recording target for swapchain image `image_index`.
    pub fn command_buffer(&self, image_index: u32) -> Option<&CommandBuffer> {
        self.command_buffers.get(image_index as usize)
    }

    #[inline]
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    #[inline]
    pub fn descriptors(&self) -> &DescriptorPoolBatch {
        &self.descriptors
    }

    #[inline]
    pub fn descriptors_mut(&mut self) -> &mut DescriptorPoolBatch {
        &mut self.descriptors
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }
}
