//! Buffers and the sub-buffers carved out of them.

use std::fmt;

use ash::vk;

use super::block::MemoryBlockId;
use super::range::Range;
use super::range_list::{RangeEntry, RangeList};
use crate::error::{RhiError, RhiResult, precondition};

/// Stable identifier of a [`Buffer`] inside its resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer #{}", self.0)
    }
}

/// A range of a [`Buffer`] handed to application code.
///
/// Only the parent's id is stored; the sub-buffer is invalid once its parent
/// buffer is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubBuffer {
    buffer: BufferId,
    range: Range,
}

impl SubBuffer {
    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[inline]
    pub fn range(&self) -> Range {
        self.range
    }

    /// Offset inside the parent buffer.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.range.offset
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.range.size
    }
}

impl fmt::Display for SubBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.buffer, self.range)
    }
}

/// A real buffer object, optionally bound to a memory block, split into sub-buffers.
#[derive(Debug)]
pub struct Buffer {
    id: BufferId,
    handle: vk::Buffer,
    usage: vk::BufferUsageFlags,
    sharing_mode: vk::SharingMode,
    memory: Option<MemoryBlockId>,
    memory_offset: u64,
    sub_ranges: RangeList<()>,
}

impl Buffer {
    pub(crate) fn new(
        id: BufferId,
        handle: vk::Buffer,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> Self {
        Self {
            id,
            handle,
            usage,
            sharing_mode,
            memory: None,
            memory_offset: 0,
            sub_ranges: RangeList::new(size),
        }
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.sub_ranges.capacity()
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.sharing_mode
    }

    /// Block backing this buffer; `None` until it is bound.
    #[inline]
    pub fn memory(&self) -> Option<MemoryBlockId> {
        self.memory
    }

    /// Offset of this buffer inside its memory block.
    #[inline]
    pub fn memory_offset(&self) -> u64 {
        self.memory_offset
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.memory.is_some()
    }

    #[inline]
    pub fn sub_buffers(&self) -> &[RangeEntry<()>] {
        self.sub_ranges.entries()
    }

    #[inline]
    pub fn total_free_space(&self) -> u64 {
        self.sub_ranges.total_free()
    }

    #[inline]
    pub fn largest_free_space(&self) -> u64 {
        self.sub_ranges.largest_free()
    }

    /// Whether the buffer was created with at least `usage` and exactly `sharing_mode`.
    pub fn supports(&self, usage: vk::BufferUsageFlags, sharing_mode: vk::SharingMode) -> bool {
        self.usage.contains(usage) && self.sharing_mode == sharing_mode
    }

    pub fn has_space_for(&self, size: u64, alignment: u64) -> bool {
        self.sub_ranges.find_free_space(size, alignment).is_some()
    }

    /// Carves `size` bytes from the first gap that fits.
    ///
    /// # Errors
    ///
    /// [`RhiError::OutOfSpace`] when no gap is large enough.
    pub fn create_sub_buffer(&mut self, size: u64, alignment: u64) -> RhiResult<SubBuffer> {
        let range = self
            .sub_ranges
            .allocate(size, alignment, ())
            .ok_or_else(|| RhiError::out_of_space(size, alignment, self.id.to_string()))?;

        Ok(SubBuffer {
            buffer: self.id,
            range,
        })
    }

    /// Returns the range of `sub` to the free space.
    ///
    /// # Errors
    ///
    /// [`RhiError::UnknownResource`] when `sub` does not belong to this buffer
    /// or was already destroyed.
    pub fn destroy_sub_buffer(&mut self, sub: SubBuffer) -> RhiResult<()> {
        if sub.buffer != self.id {
            precondition!(RhiError::UnknownResource(format!(
                "{sub} does not belong to {}",
                self.id
            )));
        }
        if self.sub_ranges.remove_range(sub.range).is_none() {
            precondition!(RhiError::UnknownResource(format!("{sub} is not live")));
        }
        Ok(())
    }

    pub fn destroy_all_sub_buffers(&mut self) {
        self.sub_ranges.clear();
    }

    pub(crate) fn set_binding(&mut self, block: MemoryBlockId, offset: u64) {
        debug_assert!(self.memory.is_none(), "{} bound twice", self.id);
        self.memory = Some(block);
        self.memory_offset = offset;
    }

    pub(crate) fn clear_binding(&mut self) -> Option<MemoryBlockId> {
        self.memory_offset = 0;
        self.memory.take()
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.sub_ranges.is_consistent()
    }
}
