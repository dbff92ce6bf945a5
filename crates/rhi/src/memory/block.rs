//! One real device-memory allocation shared by many buffers or images.

use std::fmt;

use ash::vk;

use super::buffer::BufferId;
use super::image::ImageId;
use super::range::Range;
use super::range_list::{RangeEntry, RangeList};
use crate::error::{RhiError, RhiResult, precondition};

/// Stable identifier of a [`MemoryBlock`] inside its allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryBlockId(pub(crate) u64);

impl fmt::Display for MemoryBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory block #{}", self.0)
    }
}

/// Which kind of object a block accepts. Fixed when the block is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Buffer,
    Image,
}

/// The object occupying a binding range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingOwner {
    Buffer(BufferId),
    Image(ImageId),
}

impl BindingOwner {
    pub fn kind(&self) -> BindingKind {
        match self {
            Self::Buffer(_) => BindingKind::Buffer,
            Self::Image(_) => BindingKind::Image,
        }
    }
}

impl fmt::Display for BindingOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(id) => id.fmt(f),
            Self::Image(id) => id.fmt(f),
        }
    }
}

/// A device-memory allocation and the bindings carved out of it.
///
/// Bindings are kept sorted by offset and never overlap. The block only does
/// the bookkeeping; the real `vkBind*Memory` call is made by the
/// [`ResourceManager`](super::ResourceManager).
#[derive(Debug)]
pub struct MemoryBlock {
    id: MemoryBlockId,
    memory: vk::DeviceMemory,
    property_flags: vk::MemoryPropertyFlags,
    memory_type_index: u32,
    kind: BindingKind,
    bindings: RangeList<BindingOwner>,
}

impl MemoryBlock {
    pub(crate) fn new(
        id: MemoryBlockId,
        memory: vk::DeviceMemory,
        size: u64,
        property_flags: vk::MemoryPropertyFlags,
        memory_type_index: u32,
        kind: BindingKind,
    ) -> Self {
        Self {
            id,
            memory,
            property_flags,
            memory_type_index,
            kind,
            bindings: RangeList::new(size),
        }
    }

    #[inline]
    pub fn id(&self) -> MemoryBlockId {
        self.id
    }

    #[inline]
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.bindings.capacity()
    }

    /// Property flags of the memory type the block was allocated from.
    #[inline]
    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    #[inline]
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    #[inline]
    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    #[inline]
    pub fn bindings(&self) -> &[RangeEntry<BindingOwner>] {
        self.bindings.entries()
    }

    #[inline]
    pub fn total_free_space(&self) -> u64 {
        self.bindings.total_free()
    }

    #[inline]
    pub fn largest_free_space(&self) -> u64 {
        self.bindings.largest_free()
    }

    /// True when the block's memory type has at least `flags`.
    pub fn has_property_flags(&self, flags: vk::MemoryPropertyFlags) -> bool {
        self.property_flags.contains(flags)
    }

    pub fn is_host_coherent(&self) -> bool {
        self.has_property_flags(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// First-fit offset for `size` bytes at `alignment`, if any gap fits.
    pub fn find_free_space(&self, size: u64, alignment: u64) -> Option<u64> {
        self.bindings.find_free_space(size, alignment)
    }

    pub fn has_space_for(&self, size: u64, alignment: u64) -> bool {
        self.find_free_space(size, alignment).is_some()
    }

    /// Range occupied by `owner`, if it is bound here.
    pub fn binding_of(&self, owner: BindingOwner) -> Option<Range> {
        self.bindings
            .find_by(|bound| *bound == owner)
            .map(|entry| entry.range)
    }

    /// Records `owner` in the first gap that fits.
    ///
    /// # Errors
    ///
    /// - [`RhiError::KindMismatch`] when the owner's kind differs from the block's
    /// - [`RhiError::AlreadyBound`] when the owner already has a range here
    /// - [`RhiError::OutOfSpace`] when no gap is large enough
    pub fn bind(&mut self, owner: BindingOwner, size: u64, alignment: u64) -> RhiResult<Range> {
        if owner.kind() != self.kind {
            precondition!(RhiError::KindMismatch(format!(
                "{owner} cannot bind to {} which holds {:?} bindings",
                self.id, self.kind
            )));
        }
        if self.binding_of(owner).is_some() {
            precondition!(RhiError::AlreadyBound(format!("{owner} in {}", self.id)));
        }

        self.bindings
            .allocate(size, alignment, owner)
            .ok_or_else(|| RhiError::out_of_space(size, alignment, self.id.to_string()))
    }

    /// Removes the binding of `owner` and returns the range it occupied.
    ///
    /// # Errors
    ///
    /// [`RhiError::NotBound`] when `owner` has no binding in this block.
    pub fn unbind(&mut self, owner: BindingOwner) -> RhiResult<Range> {
        match self.bindings.remove_by(|bound| *bound == owner) {
            Some(entry) => Ok(entry.range),
            None => precondition!(RhiError::NotBound(format!("{owner} in {}", self.id))),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.bindings.is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn block(kind: BindingKind) -> MemoryBlock {
        MemoryBlock::new(
            MemoryBlockId(1),
            vk::DeviceMemory::from_raw(1),
            1024,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            0,
            kind,
        )
    }

    fn buffer(id: u64) -> BindingOwner {
        BindingOwner::Buffer(BufferId(id))
    }

    #[test]
    fn test_scenario_first_gap_then_tail() {
        let mut block = block(BindingKind::Buffer);
        assert_eq!(block.bind(buffer(1), 100, 1).unwrap(), Range::new(0, 100));
        assert_eq!(block.bind(buffer(2), 200, 1).unwrap(), Range::new(100, 200));
        assert_eq!(block.bind(buffer(3), 100, 1).unwrap(), Range::new(300, 100));
        block.unbind(buffer(2)).unwrap();

        // bindings are now [0,100) and [300,400)
        assert_eq!(block.find_free_space(150, 1), Some(100));
        assert_eq!(block.find_free_space(250, 1), Some(400));
        assert_eq!(block.largest_free_space(), 624);
        assert_eq!(block.total_free_space(), 824);

        assert_eq!(block.bind(buffer(4), 250, 1).unwrap(), Range::new(400, 250));
        assert_eq!(block.bind(buffer(5), 150, 1).unwrap(), Range::new(100, 150));
        assert!(block.is_consistent());
    }

    #[test]
    fn test_out_of_space_reports_context() {
        let mut block = block(BindingKind::Buffer);
        block.bind(buffer(1), 1000, 1).unwrap();

        let err = block.bind(buffer(2), 100, 64).unwrap_err();
        match err {
            RhiError::OutOfSpace {
                requested,
                alignment,
                container,
            } => {
                assert_eq!(requested, 100);
                assert_eq!(alignment, 64);
                assert_eq!(container, "memory block #1");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(block.bindings().len(), 1);
    }

    #[test]
    fn test_binding_of_and_unbind() {
        let mut block = block(BindingKind::Image);
        let owner = BindingOwner::Image(ImageId(9));
        let range = block.bind(owner, 512, 256).unwrap();

        assert_eq!(block.binding_of(owner), Some(range));
        assert_eq!(block.unbind(owner).unwrap(), range);
        assert_eq!(block.binding_of(owner), None);
        assert_eq!(block.total_free_space(), 1024);
    }

    #[test]
    fn test_property_flag_checks() {
        let coherent = MemoryBlock::new(
            MemoryBlockId(2),
            vk::DeviceMemory::from_raw(2),
            64,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            1,
            BindingKind::Buffer,
        );
        assert!(coherent.is_host_coherent());
        assert!(coherent.has_property_flags(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(!block(BindingKind::Buffer).is_host_coherent());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "precondition violated")]
    fn test_kind_mismatch_is_fatal_in_debug() {
        let mut block = block(BindingKind::Image);
        let _ = block.bind(buffer(1), 16, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "precondition violated")]
    fn test_double_bind_is_fatal_in_debug() {
        let mut block = block(BindingKind::Buffer);
        block.bind(buffer(1), 16, 1).unwrap();
        let _ = block.bind(buffer(1), 16, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "precondition violated")]
    fn test_unbind_unknown_is_fatal_in_debug() {
        let mut block = block(BindingKind::Buffer);
        let _ = block.unbind(buffer(3));
    }
}
