//! Buffer and image ownership on top of the memory allocator.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace, warn};

use super::allocator::DeviceMemoryAllocator;
use super::block::{BindingKind, BindingOwner, MemoryBlockId};
use super::buffer::{Buffer, BufferId, SubBuffer};
use super::image::{Image, ImageId};
use crate::error::{RhiError, RhiResult, precondition};
use crate::gpu::{BufferDesc, GpuDevice, ImageDesc};

/// Alignment of every sub-buffer inside its parent buffer.
pub const SUB_BUFFER_ALIGNMENT: u64 = 16;

const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Owns every buffer and image and the allocator backing them.
///
/// Requests for sub-buffers are served from existing buffers when one has a
/// compatible usage, sharing mode and memory, otherwise a new buffer of at
/// least `min_allocation_size` bytes is created. Binding follows the same
/// pattern one tier down with memory blocks.
pub struct ResourceManager {
    device: Arc<dyn GpuDevice>,
    allocator: DeviceMemoryAllocator,
    buffers: Vec<Buffer>,
    images: Vec<Image>,
    min_allocation_size: u64,
    next_buffer_id: u64,
    next_image_id: u64,
}

impl ResourceManager {
    pub fn new(device: Arc<dyn GpuDevice>, min_allocation_size: u64) -> Self {
        let allocator = DeviceMemoryAllocator::new(device.clone());
        debug!(
            "Resource manager created (min allocation {} bytes)",
            min_allocation_size
        );

        Self {
            device,
            allocator,
            buffers: Vec::new(),
            images: Vec::new(),
            min_allocation_size,
            next_buffer_id: 0,
            next_image_id: 0,
        }
    }

    #[inline]
    pub fn allocator(&self) -> &DeviceMemoryAllocator {
        &self.allocator
    }

    #[inline]
    pub fn min_allocation_size(&self) -> u64 {
        self.min_allocation_size
    }

    #[inline]
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    #[inline]
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.iter().find(|buffer| buffer.id() == id)
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|image| image.id() == id)
    }

    fn buffer_index(&self, id: BufferId) -> RhiResult<usize> {
        self.buffers
            .iter()
            .position(|buffer| buffer.id() == id)
            .ok_or_else(|| RhiError::UnknownResource(id.to_string()))
    }

    fn image_index(&self, id: ImageId) -> RhiResult<usize> {
        self.images
            .iter()
            .position(|image| image.id() == id)
            .ok_or_else(|| RhiError::UnknownResource(id.to_string()))
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    /// Creates an unbound buffer of exactly `size` bytes.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> RhiResult<BufferId> {
        if size == 0 {
            return Err(RhiError::InvalidSize("buffer of 0 bytes".to_string()));
        }

        let handle = self.device.create_buffer(&BufferDesc {
            size,
            usage,
            sharing_mode,
        })?;

        self.next_buffer_id += 1;
        let id = BufferId(self.next_buffer_id);
        self.buffers
            .push(Buffer::new(id, handle, size, usage, sharing_mode));

        debug!("Created {}: {} bytes, {:?}", id, size, usage);
        Ok(id)
    }

    /// Sub-buffer from any compatible buffer, bound or not.
    ///
    /// A new unbound buffer of `max(size, min_allocation_size)` bytes is
    /// created when no existing buffer has room.
    pub fn get_sub_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> RhiResult<SubBuffer> {
        if size == 0 {
            return Err(RhiError::InvalidSize("sub-buffer of 0 bytes".to_string()));
        }

        let existing = self.buffers.iter().position(|buffer| {
            buffer.supports(usage, sharing_mode)
                && buffer.has_space_for(size, SUB_BUFFER_ALIGNMENT)
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let id = self.create_buffer(size.max(self.min_allocation_size), usage, sharing_mode)?;
                self.buffer_index(id)?
            }
        };

        let sub = self.buffers[index].create_sub_buffer(size, SUB_BUFFER_ALIGNMENT)?;
        trace!("Handed out {}", sub);
        Ok(sub)
    }

    /// Sub-buffer from a buffer bound to memory with at least `flags`.
    ///
    /// A newly created buffer is bound straight away.
    pub fn get_bound_sub_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
        sharing_mode: vk::SharingMode,
    ) -> RhiResult<SubBuffer> {
        if size == 0 {
            return Err(RhiError::InvalidSize("sub-buffer of 0 bytes".to_string()));
        }

        let allocator = &self.allocator;
        let existing = self.buffers.iter().position(|buffer| {
            buffer.supports(usage, sharing_mode)
                && buffer.has_space_for(size, SUB_BUFFER_ALIGNMENT)
                && buffer
                    .memory()
                    .and_then(|block| allocator.block(block))
                    .is_some_and(|block| block.has_property_flags(flags))
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let id = self.create_buffer(size.max(self.min_allocation_size), usage, sharing_mode)?;
                if let Err(err) = self.auto_bind_buffer(id, flags) {
                    self.destroy_buffer(id)?;
                    return Err(err);
                }
                self.buffer_index(id)?
            }
        };

        let sub = self.buffers[index].create_sub_buffer(size, SUB_BUFFER_ALIGNMENT)?;
        trace!("Handed out {} ({:?})", sub, flags);
        Ok(sub)
    }

    pub fn get_device_local_sub_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> RhiResult<SubBuffer> {
        self.get_bound_sub_buffer(size, usage, vk::MemoryPropertyFlags::DEVICE_LOCAL, sharing_mode)
    }

    pub fn get_host_sub_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> RhiResult<SubBuffer> {
        self.get_bound_sub_buffer(size, usage, vk::MemoryPropertyFlags::HOST_VISIBLE, sharing_mode)
    }

    pub fn get_host_coherent_sub_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> RhiResult<SubBuffer> {
        self.get_bound_sub_buffer(size, usage, HOST_COHERENT, sharing_mode)
    }

    /// Binds buffer `id` to a block with at least `flags`, allocating one if needed.
    pub fn auto_bind_buffer(&mut self, id: BufferId, flags: vk::MemoryPropertyFlags) -> RhiResult<()> {
        let index = self.buffer_index(id)?;
        if self.buffers[index].is_bound() {
            precondition!(RhiError::AlreadyBound(id.to_string()));
        }

        let handle = self.buffers[index].handle();
        let requirements = self.device.buffer_memory_requirements(handle);
        let owner = BindingOwner::Buffer(id);
        let (block, offset) = self.reserve_binding(owner, requirements, flags)?;

        let memory = self.block_handle(block)?;
        if let Err(err) = self.device.bind_buffer_memory(handle, memory, offset) {
            self.release_binding(block, owner);
            return Err(err);
        }
        self.buffers[index].set_binding(block, offset);

        debug!("Bound {} to {} at offset {}", id, block, offset);
        Ok(())
    }

    pub fn auto_bind_buffer_device_local(&mut self, id: BufferId) -> RhiResult<()> {
        self.auto_bind_buffer(id, vk::MemoryPropertyFlags::DEVICE_LOCAL)
    }

    pub fn auto_bind_buffer_host(&mut self, id: BufferId) -> RhiResult<()> {
        self.auto_bind_buffer(id, vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn auto_bind_buffer_host_coherent(&mut self, id: BufferId) -> RhiResult<()> {
        self.auto_bind_buffer(id, HOST_COHERENT)
    }

    /// Returns the range of `sub` to its buffer. The buffer itself stays alive.
    pub fn destroy_sub_buffer(&mut self, sub: SubBuffer) -> RhiResult<()> {
        let index = match self.buffer_index(sub.buffer()) {
            Ok(index) => index,
            Err(err) => precondition!(err),
        };
        self.buffers[index].destroy_sub_buffer(sub)?;
        trace!("Released {}", sub);
        Ok(())
    }

    /// Unbinds and destroys buffer `id` together with all of its sub-buffers.
    pub fn destroy_buffer(&mut self, id: BufferId) -> RhiResult<()> {
        let index = self.buffer_index(id)?;
        let mut buffer = self.buffers.remove(index);
        if let Some(block) = buffer.clear_binding() {
            self.release_binding(block, BindingOwner::Buffer(id));
        }
        self.device.destroy_buffer(buffer.handle());
        debug!("Destroyed {}", id);
        Ok(())
    }

    pub fn destroy_all_buffers(&mut self) {
        let ids: Vec<BufferId> = self.buffers.iter().map(Buffer::id).collect();
        for id in ids {
            if let Err(err) = self.destroy_buffer(id) {
                warn!("Failed to destroy {}: {}", id, err);
            }
        }
    }

    /// Whether the buffer behind `sub` is bound to host-visible, host-coherent memory.
    pub fn is_host_coherent(&self, sub: SubBuffer) -> bool {
        self.buffer(sub.buffer())
            .and_then(Buffer::memory)
            .and_then(|block| self.allocator.block(block))
            .is_some_and(|block| block.is_host_coherent())
    }

    /// Copies `data` into `sub` through the host mapping of its memory.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidSize`] when `data` is larger than the sub-buffer
    /// - [`RhiError::NotHostCoherent`] when the buffer is unbound or its memory
    ///   is not host-visible and host-coherent
    pub fn write_buffer(&mut self, sub: SubBuffer, data: &[u8]) -> RhiResult<()> {
        if data.len() as u64 > sub.size() {
            precondition!(RhiError::InvalidSize(format!(
                "{} bytes do not fit in {sub}",
                data.len()
            )));
        }

        let index = self.buffer_index(sub.buffer())?;
        let buffer = &self.buffers[index];
        let block = buffer
            .memory()
            .and_then(|block| self.allocator.block(block))
            .filter(|block| block.is_host_coherent());
        let Some(block) = block else {
            precondition!(RhiError::NotHostCoherent(sub.to_string()));
        };

        let offset = buffer.memory_offset() + sub.offset();
        self.device.write_memory(block.handle(), offset, data)?;
        trace!("Wrote {} bytes to {}", data.len(), sub);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Creates an unbound image.
    pub fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageId> {
        if desc.extent.width == 0 || desc.extent.height == 0 || desc.extent.depth == 0 {
            return Err(RhiError::InvalidSize(format!(
                "image extent {}x{}x{}",
                desc.extent.width, desc.extent.height, desc.extent.depth
            )));
        }

        let handle = self.device.create_image(desc)?;
        self.next_image_id += 1;
        let id = ImageId(self.next_image_id);
        self.images.push(Image::new(id, handle, *desc));

        debug!(
            "Created {}: {}x{} {:?}",
            id, desc.extent.width, desc.extent.height, desc.format
        );
        Ok(id)
    }

    /// Binds image `id` to a block with at least `flags`, allocating one if needed.
    pub fn auto_bind_image(&mut self, id: ImageId, flags: vk::MemoryPropertyFlags) -> RhiResult<()> {
        let index = self.image_index(id)?;
        if self.images[index].is_bound() {
            precondition!(RhiError::AlreadyBound(id.to_string()));
        }

        let handle = self.images[index].handle();
        let requirements = self.device.image_memory_requirements(handle);
        let owner = BindingOwner::Image(id);
        let (block, offset) = self.reserve_binding(owner, requirements, flags)?;

        let memory = self.block_handle(block)?;
        if let Err(err) = self.device.bind_image_memory(handle, memory, offset) {
            self.release_binding(block, owner);
            return Err(err);
        }
        self.images[index].set_binding(block, offset);

        debug!("Bound {} to {} at offset {}", id, block, offset);
        Ok(())
    }

    pub fn auto_bind_image_device_local(&mut self, id: ImageId) -> RhiResult<()> {
        self.auto_bind_image(id, vk::MemoryPropertyFlags::DEVICE_LOCAL)
    }

    pub fn auto_bind_image_host(&mut self, id: ImageId) -> RhiResult<()> {
        self.auto_bind_image(id, vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn auto_bind_image_host_coherent(&mut self, id: ImageId) -> RhiResult<()> {
        self.auto_bind_image(id, HOST_COHERENT)
    }

    /// Records the layout the image was transitioned to.
    pub fn set_image_layout(&mut self, id: ImageId, layout: vk::ImageLayout) -> RhiResult<()> {
        let index = self.image_index(id)?;
        self.images[index].set_layout(layout);
        Ok(())
    }

    pub fn destroy_image(&mut self, id: ImageId) -> RhiResult<()> {
        let index = self.image_index(id)?;
        let mut image = self.images.remove(index);
        if let Some(block) = image.clear_binding() {
            self.release_binding(block, BindingOwner::Image(id));
        }
        self.device.destroy_image(image.handle());
        debug!("Destroyed {}", id);
        Ok(())
    }

    pub fn destroy_all_images(&mut self) {
        let ids: Vec<ImageId> = self.images.iter().map(Image::id).collect();
        for id in ids {
            if let Err(err) = self.destroy_image(id) {
                warn!("Failed to destroy {}: {}", id, err);
            }
        }
    }

    /// Destroys every buffer and image, then frees all memory blocks.
    pub fn destroy_all(&mut self) {
        self.destroy_all_buffers();
        self.destroy_all_images();
        self.allocator.free_all();
    }

    // ------------------------------------------------------------------
    // Binding helpers
    // ------------------------------------------------------------------

    /// Finds or allocates a block for `owner` and records the binding in it.
    fn reserve_binding(
        &mut self,
        owner: BindingOwner,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> RhiResult<(MemoryBlockId, u64)> {
        let kind = owner.kind();
        let type_index = self
            .allocator
            .find_memory_type_index(flags, requirements.memory_type_bits)
            .ok_or(RhiError::NoCompatibleMemoryType {
                flags,
                filter: requirements.memory_type_bits,
            })?;

        let block = match self.allocator.find_block_with_space(
            type_index,
            kind,
            requirements.size,
            requirements.alignment,
        ) {
            Some(block) => block,
            None => self.allocator.allocate_by_type_index(
                requirements.size.max(self.min_allocation_size),
                kind,
                type_index,
            )?,
        };

        let range = self
            .allocator
            .block_mut(block)
            .ok_or_else(|| RhiError::UnknownResource(block.to_string()))?
            .bind(owner, requirements.size, requirements.alignment)?;
        Ok((block, range.offset))
    }

    fn release_binding(&mut self, block: MemoryBlockId, owner: BindingOwner) {
        match self.allocator.block_mut(block) {
            Some(block) => {
                if let Err(err) = block.unbind(owner) {
                    warn!("Failed to unbind {}: {}", owner, err);
                }
            }
            None => warn!("{} was bound to missing {}", owner, block),
        }
    }

    fn block_handle(&self, block: MemoryBlockId) -> RhiResult<vk::DeviceMemory> {
        self.allocator
            .block(block)
            .map(|block| block.handle())
            .ok_or_else(|| RhiError::UnknownResource(block.to_string()))
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
