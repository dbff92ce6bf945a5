//! Image records. Images are bound whole and never subdivided.

use std::fmt;

use ash::vk;

use super::block::MemoryBlockId;
use crate::gpu::ImageDesc;

/// Stable identifier of an [`Image`] inside its resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub(crate) u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image #{}", self.0)
    }
}

/// A real image object and its (at most one) memory binding.
#[derive(Debug)]
pub struct Image {
    id: ImageId,
    handle: vk::Image,
    desc: ImageDesc,
    memory: Option<MemoryBlockId>,
    memory_offset: u64,
    layout: vk::ImageLayout,
}

impl Image {
    pub(crate) fn new(id: ImageId, handle: vk::Image, desc: ImageDesc) -> Self {
        Self {
            id,
            handle,
            layout: desc.initial_layout,
            desc,
            memory: None,
            memory_offset: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> ImageId {
        self.id
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.desc.array_layers
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.desc.usage
    }

    #[inline]
    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.desc.sharing_mode
    }

    /// Layout the image was last transitioned to.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    #[inline]
    pub fn memory(&self) -> Option<MemoryBlockId> {
        self.memory
    }

    #[inline]
    pub fn memory_offset(&self) -> u64 {
        self.memory_offset
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.memory.is_some()
    }

    pub(crate) fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
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
}
