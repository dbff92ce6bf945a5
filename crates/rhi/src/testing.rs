//! Driverless [`GpuDevice`] for unit and integration tests.
//!
//! [`FakeDevice`] hands out synthetic handles, keeps a ledger of live objects
//! per kind, completes GPU work instantly on submit, and records the commands
//! and submissions it sees so tests can assert on them. Swapchain acquire and
//! present results can be scripted to exercise recreation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use ash::vk::{self, Handle};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{BufferDesc, GpuDevice, ImageDesc, Submission, SwapchainDesc, SwapchainInfo};
use crate::memory::align_next;

/// Alignment reported in buffer memory requirements.
pub const FAKE_BUFFER_ALIGNMENT: u64 = 256;
/// Alignment reported in image memory requirements.
pub const FAKE_IMAGE_ALIGNMENT: u64 = 1024;

/// Object categories tracked by the live-object ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Memory,
    Buffer,
    Image,
    ImageView,
    Fence,
    Semaphore,
    CommandPool,
    DescriptorPool,
    Swapchain,
    RenderPass,
    Framebuffer,
}

/// A command recorded into some command buffer.
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    Begin(vk::CommandBuffer),
    End(vk::CommandBuffer),
    CopyBuffer {
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    CopyBufferToImage {
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: Vec<vk::BufferImageCopy>,
    },
    ImageBarrier {
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    BeginRenderPass {
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    EndRenderPass(vk::CommandBuffer),
}

impl RecordedCommand {
    /// Command buffer this command was recorded into.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        match self {
            Self::Begin(cmd) | Self::End(cmd) | Self::EndRenderPass(cmd) => *cmd,
            Self::CopyBuffer { cmd, .. }
            | Self::CopyBufferToImage { cmd, .. }
            | Self::ImageBarrier { cmd, .. }
            | Self::BeginRenderPass { cmd, .. } => *cmd,
        }
    }
}

/// A graphics queue submission as seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub fence: vk::Fence,
}

#[derive(Debug, Default)]
struct FakeState {
    next_handle: u64,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    live: HashMap<ObjectKind, HashSet<u64>>,
    created: HashMap<ObjectKind, usize>,
    memory: HashMap<u64, Vec<u8>>,
    buffer_sizes: HashMap<u64, u64>,
    images: HashMap<u64, ImageDesc>,
    bound: HashSet<u64>,
    fences: HashMap<u64, bool>,
    fence_waits: usize,
    fence_wait_script: VecDeque<Option<vk::Result>>,
    command_pools: HashMap<u64, Vec<u64>>,
    commands: Vec<RecordedCommand>,
    submissions: Vec<RecordedSubmission>,
    queue_wait_idle_count: usize,
    device_wait_idle_count: usize,
    descriptor_pool_resets: usize,
    swapchain_images: HashMap<u64, Vec<vk::Image>>,
    swapchain_image_count: u32,
    surface_extent: vk::Extent2D,
    undefined_extent: bool,
    next_image_index: u32,
    acquire_script: VecDeque<Result<(u32, bool), vk::Result>>,
    present_script: VecDeque<Result<bool, vk::Result>>,
    presents: Vec<u32>,
    fail_allocations: bool,
}

/// In-memory stand-in for a Vulkan device.
#[derive(Debug)]
pub struct FakeDevice {
    state: Mutex<FakeState>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    /// Four memory types: device-local, host-visible coherent, host-visible
    /// cached, and device-local host-visible coherent. Three swapchain images
    /// at 640x480.
    pub fn new() -> Self {
        let flags = [
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ];
        Self::with_memory_types(&flags)
    }

    /// Device exposing exactly the given memory types, all in heap 0.
    pub fn with_memory_types(flags: &[vk::MemoryPropertyFlags]) -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        for (slot, &property_flags) in memory_properties.memory_types.iter_mut().zip(flags) {
            *slot = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: 1 << 32,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        Self {
            state: Mutex::new(FakeState {
                next_handle: 0x1000,
                memory_properties,
                swapchain_image_count: 3,
                surface_extent: vk::Extent2D {
                    width: 640,
                    height: 480,
                },
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live objects of `kind`.
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state().live.get(&kind).map_or(0, HashSet::len)
    }

    /// Number of objects of `kind` ever created.
    pub fn created_count(&self, kind: ObjectKind) -> usize {
        self.state().created.get(&kind).copied().unwrap_or(0)
    }

    /// Whether any object is still alive.
    pub fn has_live_objects(&self) -> bool {
        self.state().live.values().any(|set| !set.is_empty())
    }

    /// Bytes written so far to an allocation.
    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.state().memory.get(&memory.as_raw()).cloned()
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state().submissions.clone()
    }

    pub fn presents(&self) -> Vec<u32> {
        self.state().presents.clone()
    }

    pub fn fence_waits(&self) -> usize {
        self.state().fence_waits
    }

    pub fn queue_wait_idle_count(&self) -> usize {
        self.state().queue_wait_idle_count
    }

    pub fn device_wait_idle_count(&self) -> usize {
        self.state().device_wait_idle_count
    }

    pub fn descriptor_pool_resets(&self) -> usize {
        self.state().descriptor_pool_resets
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state().fences.get(&fence.as_raw()).copied().unwrap_or(false)
    }

    /// Queues the result of a future `acquire_next_image` call.
    pub fn script_acquire(&self, result: Result<(u32, bool), vk::Result>) {
        self.state().acquire_script.push_back(result);
    }

    /// Queues the outcome of a future `wait_for_fences` call: `None` waits
    /// normally, `Some(err)` fails with `err`.
    pub fn script_fence_wait(&self, result: Option<vk::Result>) {
        self.state().fence_wait_script.push_back(result);
    }

    /// Queues the result of a future `queue_present` call.
    pub fn script_present(&self, result: Result<bool, vk::Result>) {
        self.state().present_script.push_back(result);
    }

    /// Changes what the surface reports; the next swapchain picks it up.
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state().surface_extent = vk::Extent2D { width, height };
    }

    /// Makes the surface report an undefined current extent, leaving the size to the caller.
    pub fn set_undefined_surface_extent(&self, undefined: bool) {
        self.state().undefined_extent = undefined;
    }

    pub fn set_swapchain_image_count(&self, count: u32) {
        self.state().swapchain_image_count = count;
    }

    /// Makes every following `allocate_memory` fail with out-of-device-memory.
    pub fn fail_allocations(&self, fail: bool) {
        self.state().fail_allocations = fail;
    }
}

impl FakeState {
    fn create(&mut self, kind: ObjectKind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.entry(kind).or_default().insert(raw);
        *self.created.entry(kind).or_default() += 1;
        raw
    }

    fn destroy(&mut self, kind: ObjectKind, raw: u64) {
        if raw == 0 {
            return;
        }
        let removed = self.live.get_mut(&kind).is_some_and(|set| set.remove(&raw));
        assert!(removed, "{kind:?} {raw:#x} destroyed twice or never created");
    }

    fn is_live(&self, kind: ObjectKind, raw: u64) -> bool {
        self.live.get(&kind).is_some_and(|set| set.contains(&raw))
    }

    fn record(&mut self, command: RecordedCommand) {
        self.commands.push(command);
    }

    fn current_extent(&self) -> vk::Extent2D {
        self.surface_extent
    }
}

fn requirements(size: u64, alignment: u64, type_count: u32) -> vk::MemoryRequirements {
    vk::MemoryRequirements {
        size: align_next(size, alignment),
        alignment,
        memory_type_bits: (1u32 << type_count) - 1,
    }
}

impl GpuDevice for FakeDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.state().memory_properties
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> RhiResult<vk::DeviceMemory> {
        let mut state = self.state();
        if state.fail_allocations {
            return Err(RhiError::vulkan(
                "vkAllocateMemory",
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            ));
        }
        assert!(memory_type_index < state.memory_properties.memory_type_count);
        let raw = state.create(ObjectKind::Memory);
        state.memory.insert(raw, vec![0; size as usize]);
        Ok(vk::DeviceMemory::from_raw(raw))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state();
        state.destroy(ObjectKind::Memory, memory.as_raw());
        state.memory.remove(&memory.as_raw());
    }

    fn write_memory(&self, memory: vk::DeviceMemory, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut state = self.state();
        let bytes = state
            .memory
            .get_mut(&memory.as_raw())
            .ok_or(RhiError::vulkan("vkMapMemory", vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(RhiError::vulkan("vkMapMemory", vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<vk::Buffer> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::Buffer);
        state.buffer_sizes.insert(raw, desc.size);
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state();
        state.destroy(ObjectKind::Buffer, buffer.as_raw());
        state.buffer_sizes.remove(&buffer.as_raw());
        state.bound.remove(&buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let state = self.state();
        let size = state.buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0);
        requirements(
            size,
            FAKE_BUFFER_ALIGNMENT,
            state.memory_properties.memory_type_count,
        )
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> RhiResult<()> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::Memory, memory.as_raw()));
        assert_eq!(offset % FAKE_BUFFER_ALIGNMENT, 0, "misaligned buffer bind");
        assert!(state.bound.insert(buffer.as_raw()), "buffer bound twice");
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<vk::Image> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::Image);
        state.images.insert(raw, *desc);
        Ok(vk::Image::from_raw(raw))
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state();
        state.destroy(ObjectKind::Image, image.as_raw());
        state.images.remove(&image.as_raw());
        state.bound.remove(&image.as_raw());
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let state = self.state();
        let size = state.images.get(&image.as_raw()).map_or(0, |desc| {
            u64::from(desc.extent.width)
                * u64::from(desc.extent.height)
                * u64::from(desc.extent.depth)
                * u64::from(desc.array_layers)
                * 4
        });
        requirements(
            size,
            FAKE_IMAGE_ALIGNMENT,
            state.memory_properties.memory_type_count,
        )
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> RhiResult<()> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::Memory, memory.as_raw()));
        assert_eq!(offset % FAKE_IMAGE_ALIGNMENT, 0, "misaligned image bind");
        assert!(state.bound.insert(image.as_raw()), "image bound twice");
        Ok(())
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state().create(ObjectKind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().destroy(ObjectKind::ImageView, view.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::Fence);
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.destroy(ObjectKind::Fence, fence.as_raw());
        state.fences.remove(&fence.as_raw());
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout: u64) -> RhiResult<()> {
        let mut state = self.state();
        state.fence_waits += 1;
        if let Some(Some(err)) = state.fence_wait_script.pop_front() {
            return Err(RhiError::vulkan("vkWaitForFences", err));
        }
        // Work completes on submit, so an unsignaled fence would never signal.
        if fences
            .iter()
            .all(|fence| state.fences.get(&fence.as_raw()).copied().unwrap_or(false))
        {
            Ok(())
        } else {
            Err(RhiError::vulkan("vkWaitForFences", vk::Result::TIMEOUT))
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> RhiResult<()> {
        let mut state = self.state();
        for fence in fences {
            state.fences.insert(fence.as_raw(), false);
        }
        Ok(())
    }

    fn fence_status(&self, fence: vk::Fence) -> RhiResult<bool> {
        Ok(self.is_fence_signaled(fence))
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state().create(ObjectKind::Semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().destroy(ObjectKind::Semaphore, semaphore.as_raw());
    }

    fn create_command_pool(
        &self,
        _flags: vk::CommandPoolCreateFlags,
    ) -> RhiResult<vk::CommandPool> {
        let mut state = self.state();
        let raw = state.create(ObjectKind::CommandPool);
        state.command_pools.insert(raw, Vec::new());
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state();
        state.destroy(ObjectKind::CommandPool, pool.as_raw());
        state.command_pools.remove(&pool.as_raw());
    }

    fn reset_command_pool(&self, _pool: vk::CommandPool) -> RhiResult<()> {
        Ok(())
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> RhiResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::CommandPool, pool.as_raw()));
        let buffers: Vec<u64> = (0..count)
            .map(|_| {
                state.next_handle += 1;
                state.next_handle
            })
            .collect();
        if let Some(owned) = state.command_pools.get_mut(&pool.as_raw()) {
            owned.extend(&buffers);
        }
        Ok(buffers.into_iter().map(vk::CommandBuffer::from_raw).collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        if let Some(owned) = state.command_pools.get_mut(&pool.as_raw()) {
            owned.retain(|raw| !buffers.iter().any(|cmd| cmd.as_raw() == *raw));
        }
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        self.state().record(RecordedCommand::Begin(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        self.state().record(RecordedCommand::End(cmd));
        Ok(())
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.state().record(RecordedCommand::CopyBuffer {
            cmd,
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.state().record(RecordedCommand::CopyBufferToImage {
            cmd,
            src,
            dst,
            layout: dst_layout,
            regions: regions.to_vec(),
        });
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let mut state = self.state();
        for barrier in image_barriers {
            state.record(RecordedCommand::ImageBarrier {
                cmd,
                image: barrier.image,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
            });
        }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        _clear_values: &[vk::ClearValue],
    ) {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::RenderPass, render_pass.as_raw()));
        assert!(state.is_live(ObjectKind::Framebuffer, framebuffer.as_raw()));
        state.record(RecordedCommand::BeginRenderPass {
            cmd,
            framebuffer,
            extent,
        });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state().record(RecordedCommand::EndRenderPass(cmd));
    }

    fn submit_graphics(&self, submission: &Submission<'_>, fence: vk::Fence) -> RhiResult<()> {
        let mut state = self.state();
        if fence != vk::Fence::null() {
            assert!(
                !state.fences.get(&fence.as_raw()).copied().unwrap_or(true),
                "submitted with a fence that is still signaled"
            );
            state.fences.insert(fence.as_raw(), true);
        }
        state.submissions.push(RecordedSubmission {
            wait_semaphores: submission.wait_semaphores.to_vec(),
            command_buffers: submission.command_buffers.to_vec(),
            signal_semaphores: submission.signal_semaphores.to_vec(),
            fence,
        });
        Ok(())
    }

    fn graphics_queue_wait_idle(&self) -> RhiResult<()> {
        self.state().queue_wait_idle_count += 1;
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.state().device_wait_idle_count += 1;
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        _max_sets: u32,
        _pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<vk::DescriptorPool> {
        Ok(vk::DescriptorPool::from_raw(
            self.state().create(ObjectKind::DescriptorPool),
        ))
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> RhiResult<()> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::DescriptorPool, pool.as_raw()));
        state.descriptor_pool_resets += 1;
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state().destroy(ObjectKind::DescriptorPool, pool.as_raw());
    }

    fn surface_capabilities(&self) -> RhiResult<vk::SurfaceCapabilitiesKHR> {
        let state = self.state();
        let current_extent = if state.undefined_extent {
            vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            }
        } else {
            state.current_extent()
        };
        Ok(vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        })
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<SwapchainInfo> {
        let mut state = self.state();
        if old_swapchain != vk::SwapchainKHR::null() {
            assert!(state.is_live(ObjectKind::Swapchain, old_swapchain.as_raw()));
        }
        let raw = state.create(ObjectKind::Swapchain);
        let images: Vec<vk::Image> = (0..state.swapchain_image_count)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect();
        state.swapchain_images.insert(raw, images);
        state.next_image_index = 0;

        let extent = if state.undefined_extent {
            desc.extent
        } else {
            state.current_extent()
        };
        Ok(SwapchainInfo {
            handle: vk::SwapchainKHR::from_raw(raw),
            format: desc.surface_format.format,
            extent,
            present_mode: desc.present_mode,
        })
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        self.state()
            .swapchain_images
            .get(&swapchain.as_raw())
            .cloned()
            .ok_or(RhiError::vulkan(
                "vkGetSwapchainImagesKHR",
                vk::Result::ERROR_SURFACE_LOST_KHR,
            ))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.destroy(ObjectKind::Swapchain, swapchain.as_raw());
        state.swapchain_images.remove(&swapchain.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _semaphore: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::Swapchain, swapchain.as_raw()));
        if let Some(result) = state.acquire_script.pop_front() {
            return result;
        }
        let index = state.next_image_index;
        state.next_image_index = (index + 1) % state.swapchain_image_count.max(1);
        Ok((index, false))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::Swapchain, swapchain.as_raw()));
        state.presents.push(image_index);
        state.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn create_render_pass(&self, _color_format: vk::Format) -> RhiResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(
            self.state().create(ObjectKind::RenderPass),
        ))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state()
            .destroy(ObjectKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer> {
        let mut state = self.state();
        assert!(state.is_live(ObjectKind::RenderPass, render_pass.as_raw()));
        for view in attachments {
            assert!(state.is_live(ObjectKind::ImageView, view.as_raw()));
        }
        Ok(vk::Framebuffer::from_raw(
            state.create(ObjectKind::Framebuffer),
        ))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state()
            .destroy(ObjectKind::Framebuffer, framebuffer.as_raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_tracked() {
        let device = FakeDevice::new();
        let a = device.create_semaphore().unwrap();
        let b = device.create_semaphore().unwrap();
        assert_ne!(a, b);
        assert_eq!(device.live_count(ObjectKind::Semaphore), 2);

        device.destroy_semaphore(a);
        device.destroy_semaphore(b);
        assert!(!device.has_live_objects());
        assert_eq!(device.created_count(ObjectKind::Semaphore), 2);
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_double_destroy_panics() {
        let device = FakeDevice::new();
        let fence = device.create_fence(true).unwrap();
        device.destroy_fence(fence);
        device.destroy_fence(fence);
    }

    #[test]
    fn test_submit_signals_fence() {
        let device = FakeDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert!(device.wait_for_fences(&[fence], u64::MAX).is_err());

        device
            .submit_graphics(&Submission::default(), fence)
            .unwrap();
        assert!(device.wait_for_fences(&[fence], u64::MAX).is_ok());
        device.destroy_fence(fence);
    }

    #[test]
    fn test_scripted_acquire() {
        let device = FakeDevice::new();
        let desc = SwapchainDesc {
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
        };
        let info = device.create_swapchain(&desc, vk::SwapchainKHR::null()).unwrap();
        device.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let semaphore = vk::Semaphore::null();
        assert_eq!(
            device.acquire_next_image(info.handle, semaphore),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR)
        );
        assert_eq!(device.acquire_next_image(info.handle, semaphore), Ok((0, false)));
        assert_eq!(device.acquire_next_image(info.handle, semaphore), Ok((1, false)));
        device.destroy_swapchain(info.handle);
    }

    #[test]
    fn test_write_memory_bounds() {
        let device = FakeDevice::new();
        let memory = device.allocate_memory(16, 1).unwrap();
        device.write_memory(memory, 4, &[1, 2, 3, 4]).unwrap();
        assert!(device.write_memory(memory, 14, &[0; 4]).is_err());
        assert_eq!(
            device.memory_contents(memory).unwrap()[..8],
            [0, 0, 0, 0, 1, 2, 3, 4]
        );
        device.free_memory(memory);
    }
}
