//! Device-memory block allocator.
//!
//! # Overview
//!
//! [`DeviceMemoryAllocator`] owns every [`MemoryBlock`] of a device. It resolves
//! a memory type index from property flags and a type filter, performs the real
//! allocation, and keeps blocks sorted ascending by size so smaller blocks are
//! offered for reuse before larger ones.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace, warn};

use super::block::{BindingKind, MemoryBlock, MemoryBlockId};
use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Which memory types count as a match for a set of property flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagMatch {
    /// The type has exactly the requested flags.
    Exact,
    /// The type has at least the requested flags.
    Contains,
}

/// First memory type index allowed by `filter` whose flags match.
fn find_type_index(
    properties: &vk::PhysicalDeviceMemoryProperties,
    flags: vk::MemoryPropertyFlags,
    filter: u32,
    matching: FlagMatch,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&index| {
        let allowed = filter & (1 << index) != 0;
        let type_flags = properties.memory_types[index as usize].property_flags;
        let matches = match matching {
            FlagMatch::Exact => type_flags == flags,
            FlagMatch::Contains => type_flags.contains(flags),
        };
        allowed && matches
    })
}

/// Owner of all device-memory blocks.
pub struct DeviceMemoryAllocator {
    device: Arc<dyn GpuDevice>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Sorted ascending by size.
    blocks: Vec<MemoryBlock>,
    next_id: u64,
}

impl DeviceMemoryAllocator {
    /// Creates an allocator and caches the device's memory properties.
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        let memory_properties = device.memory_properties();
        debug!(
            "Memory allocator created with {} memory type(s)",
            memory_properties.memory_type_count
        );

        Self {
            device,
            memory_properties,
            blocks: Vec::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Blocks in ascending size order.
    #[inline]
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    pub fn block(&self, id: MemoryBlockId) -> Option<&MemoryBlock> {
        self.blocks.iter().find(|block| block.id() == id)
    }

    pub fn block_mut(&mut self, id: MemoryBlockId) -> Option<&mut MemoryBlock> {
        self.blocks.iter_mut().find(|block| block.id() == id)
    }

    /// First memory type in `filter` that has at least `flags`.
    pub fn find_memory_type_index(&self, flags: vk::MemoryPropertyFlags, filter: u32) -> Option<u32> {
        find_type_index(&self.memory_properties, flags, filter, FlagMatch::Contains)
    }

    /// First memory type in `filter` whose flags equal `flags`.
    pub fn find_exact_memory_type_index(
        &self,
        flags: vk::MemoryPropertyFlags,
        filter: u32,
    ) -> Option<u32> {
        find_type_index(&self.memory_properties, flags, filter, FlagMatch::Exact)
    }

    /// Allocates a block from the memory type whose flags are exactly `flags`.
    ///
    /// # Errors
    ///
    /// [`RhiError::NoCompatibleMemoryType`] when no type in `filter` matches,
    /// or the driver error from the allocation.
    pub fn allocate(
        &mut self,
        size: u64,
        flags: vk::MemoryPropertyFlags,
        kind: BindingKind,
        filter: u32,
    ) -> RhiResult<MemoryBlockId> {
        let index = self
            .find_exact_memory_type_index(flags, filter)
            .ok_or(RhiError::NoCompatibleMemoryType { flags, filter })?;
        self.allocate_by_type_index(size, kind, index)
    }

    /// Allocates a host-visible block.
    pub fn allocate_host(
        &mut self,
        size: u64,
        kind: BindingKind,
        filter: u32,
    ) -> RhiResult<MemoryBlockId> {
        self.allocate_compatible(size, vk::MemoryPropertyFlags::HOST_VISIBLE, kind, filter)
    }

    /// Allocates a host-visible, host-coherent block.
    pub fn allocate_host_coherent(
        &mut self,
        size: u64,
        kind: BindingKind,
        filter: u32,
    ) -> RhiResult<MemoryBlockId> {
        self.allocate_compatible(
            size,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            kind,
            filter,
        )
    }

    /// Allocates a device-local block.
    pub fn allocate_local(
        &mut self,
        size: u64,
        kind: BindingKind,
        filter: u32,
    ) -> RhiResult<MemoryBlockId> {
        self.allocate_compatible(size, vk::MemoryPropertyFlags::DEVICE_LOCAL, kind, filter)
    }

    fn allocate_compatible(
        &mut self,
        size: u64,
        flags: vk::MemoryPropertyFlags,
        kind: BindingKind,
        filter: u32,
    ) -> RhiResult<MemoryBlockId> {
        let index = self
            .find_memory_type_index(flags, filter)
            .ok_or(RhiError::NoCompatibleMemoryType { flags, filter })?;
        self.allocate_by_type_index(size, kind, index)
    }

    /// Allocates `size` bytes from memory type `index` and records a new block.
    ///
    /// The block is inserted before the first existing block that is larger.
    pub fn allocate_by_type_index(
        &mut self,
        size: u64,
        kind: BindingKind,
        index: u32,
    ) -> RhiResult<MemoryBlockId> {
        if index >= self.memory_properties.memory_type_count {
            return Err(RhiError::UnknownResource(format!("memory type {index}")));
        }
        if size == 0 {
            return Err(RhiError::InvalidSize("memory block of 0 bytes".to_string()));
        }

        let memory = self.device.allocate_memory(size, index)?;
        let flags = self.memory_properties.memory_types[index as usize].property_flags;

        self.next_id += 1;
        let id = MemoryBlockId(self.next_id);
        let position = self
            .blocks
            .iter()
            .position(|block| block.size() > size)
            .unwrap_or(self.blocks.len());
        self.blocks
            .insert(position, MemoryBlock::new(id, memory, size, flags, index, kind));

        debug!(
            "Allocated {}: {} bytes, type {} ({:?}), {:?} bindings",
            id, size, index, flags, kind
        );

        Ok(id)
    }

    /// First block (smallest first) of type `index` and `kind` with room for
    /// `size` bytes at `alignment`.
    pub fn find_block_with_space(
        &self,
        index: u32,
        kind: BindingKind,
        size: u64,
        alignment: u64,
    ) -> Option<MemoryBlockId> {
        let found = self
            .blocks
            .iter()
            .find(|block| {
                block.memory_type_index() == index
                    && block.kind() == kind
                    && block.has_space_for(size, alignment)
            })
            .map(MemoryBlock::id);

        trace!(
            "Block search for {} bytes (type {}, {:?}): {:?}",
            size, index, kind, found
        );
        found
    }

    /// Releases one block's device memory and drops its record.
    ///
    /// # Errors
    ///
    /// [`RhiError::UnknownResource`] when no block has that id.
    pub fn free_block(&mut self, id: MemoryBlockId) -> RhiResult<()> {
        let position = self
            .blocks
            .iter()
            .position(|block| block.id() == id)
            .ok_or_else(|| RhiError::UnknownResource(id.to_string()))?;
        let block = self.blocks.remove(position);
        if !block.bindings().is_empty() {
            warn!("Freeing {} with {} live binding(s)", id, block.bindings().len());
        }
        self.device.free_memory(block.handle());
        debug!("Freed {} ({} bytes)", id, block.size());
        Ok(())
    }

    /// Releases every block.
    pub fn free_all(&mut self) {
        for block in self.blocks.drain(..) {
            self.device.free_memory(block.handle());
        }
        debug!("Freed all memory blocks");
    }
}

impl Drop for DeviceMemoryAllocator {
    fn drop(&mut self) {
        if !self.blocks.is_empty() {
            self.free_all();
        }
    }
}
