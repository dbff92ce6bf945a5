//! The render context: one object owning the whole GPU resource layer.
//!
//! [`RenderContext`] ties together the instance, surface and device with the
//! resource manager, upload queue and frame pipeline, and exposes the calls
//! application code makes once per tick: [`update`](RenderContext::update),
//! then [`begin_frame`](RenderContext::begin_frame) /
//! [`end_frame`](RenderContext::end_frame) / [`present`](RenderContext::present).

use std::sync::Arc;

use tracing::{error, info};

use vkpack_core::{Config, TimeData};
use vkpack_platform::{Surface, WindowSystem};
use vkpack_rhi::device::Device;
use vkpack_rhi::gpu::GpuDevice;
use vkpack_rhi::instance::Instance;
use vkpack_rhi::memory::{ImageId, ResourceManager, SubBuffer};
use vkpack_rhi::physical_device::select_physical_device;
use vkpack_rhi::{RhiError, RhiResult};

use crate::frame_pipeline::FramePipeline;
use crate::upload::{ImageRegion, UploadQueue};

/// Owner of every GPU object the application uses.
///
/// Fields drop in declaration order: everything holding device objects,
/// then the device, the surface, and finally the instance.
pub struct RenderContext {
    uploads: UploadQueue,
    frames: FramePipeline,
    resources: ResourceManager,
    device: Arc<dyn GpuDevice>,
    surface: Option<Surface>,
    instance: Option<Instance>,
    time: TimeData,
}

impl RenderContext {
    /// Creates the Vulkan instance, surface and device for `window` and
    /// builds the context on top of them.
    ///
    /// # Errors
    ///
    /// Window and surface failures are reported as [`RhiError::SurfaceError`].
    pub fn new(window: &dyn WindowSystem, config: &Config) -> RhiResult<Self> {
        let extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(&config.window_title, &extensions, config.enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!(
            "Selected GPU: {} ({}), {} MiB device-local memory",
            gpu.device_name(),
            gpu.device_type_name(),
            gpu.device_local_memory() / (1024 * 1024)
        );

        let device: Arc<dyn GpuDevice> = Device::new(&instance, &gpu, surface.handle())?;

        let (width, height) = window.size();
        let config = config.clone().with_window_size(width, height);

        Self::assemble(device, Some(surface), Some(instance), &config)
    }

    /// Builds a context on an existing device with no owned instance or surface.
    pub fn with_device(device: Arc<dyn GpuDevice>, config: &Config) -> RhiResult<Self> {
        Self::assemble(device, None, None, config)
    }

    fn assemble(
        device: Arc<dyn GpuDevice>,
        surface: Option<Surface>,
        instance: Option<Instance>,
        config: &Config,
    ) -> RhiResult<Self> {
        let resources = ResourceManager::new(device.clone(), config.min_allocation_size);
        let uploads = UploadQueue::new(device.clone())?;
        let frames = FramePipeline::new(device.clone(), config)?;

        info!("Render context initialized");

        Ok(Self {
            uploads,
            frames,
            resources,
            device,
            surface,
            instance,
            time: TimeData::default(),
        })
    }

    /// Advances time by `dt` seconds and flushes pending uploads.
    pub fn update(&mut self, dt: f32) -> RhiResult<()> {
        self.time.advance(dt);
        self.uploads.flush(&mut self.resources)
    }

    /// See [`FramePipeline::begin_frame`].
    pub fn begin_frame(&mut self) -> RhiResult<bool> {
        self.frames.begin_frame()
    }

    pub fn end_frame(&mut self) -> RhiResult<()> {
        self.frames.end_frame()
    }

    /// Presents the frame and counts it.
    pub fn present(&mut self) -> RhiResult<()> {
        self.frames.present()?;
        self.time.count_frame();
        Ok(())
    }

    pub fn request_resize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.frames.request_resize(width, height)
    }

    pub fn set_render_size(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.frames.set_render_size(width, height)
    }

    pub fn queue_buffer_upload(&mut self, destination: SubBuffer, data: &[u8]) -> RhiResult<()> {
        self.uploads
            .queue_buffer_upload(&mut self.resources, destination, data)
    }

    pub fn queue_buffer_upload_pod<T: bytemuck::Pod>(
        &mut self,
        destination: SubBuffer,
        data: &[T],
    ) -> RhiResult<()> {
        self.uploads
            .queue_buffer_upload_pod(&mut self.resources, destination, data)
    }

    pub fn queue_image_upload(
        &mut self,
        image: ImageId,
        data: &[u8],
        region: ImageRegion,
    ) -> RhiResult<()> {
        self.uploads
            .queue_image_upload(&mut self.resources, image, data, region)
    }

    #[inline]
    pub fn time(&self) -> TimeData {
        self.time
    }

    #[inline]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[inline]
    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    #[inline]
    pub fn frames(&self) -> &FramePipeline {
        &self.frames
    }

    #[inline]
    pub fn frames_mut(&mut self) -> &mut FramePipeline {
        &mut self.frames
    }

    #[inline]
    pub fn uploads(&self) -> &UploadQueue {
        &self.uploads
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    #[inline]
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }
        info!(
            "Render context shutting down after {} frames",
            self.time.total_frame_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use vkpack_rhi::testing::FakeDevice;

    fn context() -> (Arc<FakeDevice>, RenderContext) {
        let fake = Arc::new(FakeDevice::new());
        let config = Config::default().with_min_allocation_size(64 * 1024);
        let context = RenderContext::with_device(fake.clone(), &config).unwrap();
        (fake, context)
    }

    #[test]
    fn test_time_data_advances() {
        let (_fake, mut context) = context();

        context.update(0.25).unwrap();
        context.update(0.25).unwrap();
        assert!(context.begin_frame().unwrap());
        context.end_frame().unwrap();
        context.present().unwrap();

        let time = context.time();
        assert_eq!(time.elapsed_time, 0.5);
        assert_eq!(time.total_frame_count, 1);
    }

    #[test]
    fn test_update_flushes_uploads() {
        let (fake, mut context) = context();
        let vertices = context
            .resources_mut()
            .get_device_local_sub_buffer(
                48,
                vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
                vk::SharingMode::EXCLUSIVE,
            )
            .unwrap();

        context
            .queue_buffer_upload_pod(vertices, &[[0.0f32; 3]; 4])
            .unwrap();
        assert!(!context.uploads().is_empty());

        context.update(0.016).unwrap();
        assert!(context.uploads().is_empty());
        assert_eq!(fake.submissions().len(), 1);
    }

    #[test]
    fn test_drop_releases_all_objects() {
        let (fake, mut context) = context();
        context
            .resources_mut()
            .get_host_coherent_sub_buffer(
                256,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::SharingMode::EXCLUSIVE,
            )
            .unwrap();

        drop(context);
        assert!(!fake.has_live_objects());
    }

    #[test]
    fn test_context_has_no_surface_without_window() {
        let (_fake, context) = context();
        assert!(context.surface().is_none());
        assert!(context.instance().is_none());
    }
}
