//! Per-frame descriptor pool batches.
//!
//! Descriptor sets written during a frame are allocated from pools owned by
//! that frame's slot. Once the slot's fence proves the GPU has finished
//! reading them, [`DescriptorPoolBatch::reset_all`] reclaims every set at once
//! instead of freeing them one by one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpack_rhi::gpu::GpuDevice;
//! use vkpack_rhi::descriptor::{DescriptorPoolBatch, default_pool_sizes};
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), vkpack_rhi::RhiError> {
//! let mut batch = DescriptorPoolBatch::new(device);
//! batch.create_pool(64, &default_pool_sizes(64))?;
//!
//! // Next use of this frame slot, after its fence wait:
//! batch.reset_all()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::error::RhiResult;
use crate::gpu::GpuDevice;

/// Pool sizes covering uniform buffers, storage buffers and sampled images,
/// `count` descriptors each.
pub fn default_pool_sizes(count: u32) -> [vk::DescriptorPoolSize; 3] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(count),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(count),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(count),
    ]
}

/// Descriptor pools owned by one frame slot.
pub struct DescriptorPoolBatch {
    device: Arc<dyn GpuDevice>,
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorPoolBatch {
    /// An empty batch.
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            pools: Vec::new(),
        }
    }

    /// Creates a pool owned by this batch and returns its handle.
    pub fn create_pool(
        &mut self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<vk::DescriptorPool> {
        let pool = self.device.create_descriptor_pool(max_sets, pool_sizes)?;
        self.pools.push(pool);

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(pool)
    }

    /// Resets every pool, returning all of their sets.
    ///
    /// No set from these pools may still be in use by the GPU.
    pub fn reset_all(&self) -> RhiResult<()> {
        for &pool in &self.pools {
            self.device.reset_descriptor_pool(pool)?;
        }
        trace!("Reset {} descriptor pool(s)", self.pools.len());
        Ok(())
    }

    #[inline]
    pub fn pools(&self) -> &[vk::DescriptorPool] {
        &self.pools
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl Drop for DescriptorPoolBatch {
    fn drop(&mut self) {
        for pool in self.pools.drain(..) {
            self.device.destroy_descriptor_pool(pool);
        }
        debug!("Destroyed descriptor pool batch");
    }
}
