//! Two-tier GPU memory management.
//!
//! # Overview
//!
//! A few large device-memory blocks are carved into bindings for many buffers
//! and images, and every buffer is in turn carved into sub-buffers handed to
//! application code:
//!
//! - [`DeviceMemoryAllocator`] owns the [`MemoryBlock`]s and resolves memory types
//! - [`ResourceManager`] owns every [`Buffer`] and [`Image`], finds or creates
//!   capacity, and binds objects to blocks
//! - [`RangeList`] is the first-fit free-space search both tiers share
//!
//! Children refer to their parents by id ([`BufferId`], [`MemoryBlockId`]),
//! never by pointer; a parent always outlives its children.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkpack_rhi::gpu::GpuDevice;
//! use vkpack_rhi::memory::ResourceManager;
//!
//! # fn example(device: Arc<dyn GpuDevice>) -> Result<(), vkpack_rhi::RhiError> {
//! let mut resources = ResourceManager::new(device, 16 * 1024 * 1024);
//!
//! let uniforms = resources.get_host_coherent_sub_buffer(
//!     256,
//!     vk::BufferUsageFlags::UNIFORM_BUFFER,
//!     vk::SharingMode::EXCLUSIVE,
//! )?;
//! resources.write_buffer(uniforms, &[0u8; 256])?;
//! resources.destroy_sub_buffer(uniforms)?;
//! # Ok(())
//! # }
//! ```

mod allocator;
mod block;
mod buffer;
mod image;
mod manager;
mod range;
mod range_list;

pub use allocator::DeviceMemoryAllocator;
pub use block::{BindingKind, BindingOwner, MemoryBlock, MemoryBlockId};
pub use buffer::{Buffer, BufferId, SubBuffer};
pub use image::{Image, ImageId};
pub use manager::{ResourceManager, SUB_BUFFER_ALIGNMENT};
pub use range::{Range, align_next};
pub use range_list::{RangeEntry, RangeList};
