//! Deferred host-to-device copies, flushed once per update tick.
//!
//! Data for a destination that is not host-coherent is written into a
//! host-coherent staging sub-buffer and queued. [`UploadQueue::flush`] records
//! every queued copy into one command buffer, submits it, waits for the
//! graphics queue to drain, and only then destroys the staging sub-buffers.
//! Destinations that are already host-coherent are written directly.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use vkpack_rhi::command::{CommandBuffer, CommandPool};
use vkpack_rhi::gpu::{GpuDevice, Submission};
use vkpack_rhi::memory::{ImageId, ResourceManager, SubBuffer};
use vkpack_rhi::{RhiError, RhiResult};

use crate::precondition_failed;

/// Part of an image written by an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRegion {
    /// Texel offset of the region's corner.
    pub offset: vk::Offset3D,
    /// Size in texels. The staged data is tightly packed at this size.
    pub extent: vk::Extent3D,
    pub mip_level: u32,
}

impl ImageRegion {
    /// Mip level 0 from the origin, covering `extent`.
    pub fn whole(extent: vk::Extent3D) -> Self {
        Self {
            offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            extent,
            mip_level: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferUpload {
    staging: SubBuffer,
    destination: SubBuffer,
    size: u64,
}

#[derive(Debug, Clone, Copy)]
struct ImageUpload {
    staging: SubBuffer,
    image: ImageId,
    region: ImageRegion,
}

/// Pending uploads and the transient pool their command buffer comes from.
pub struct UploadQueue {
    device: Arc<dyn GpuDevice>,
    command_pool: CommandPool,
    buffer_uploads: Vec<BufferUpload>,
    image_uploads: Vec<ImageUpload>,
}

impl UploadQueue {
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let command_pool = CommandPool::new_transient(device.clone())?;
        Ok(Self {
            device,
            command_pool,
            buffer_uploads: Vec::new(),
            image_uploads: Vec::new(),
        })
    }

    /// Writes `data` to the start of `destination`.
    ///
    /// Host-coherent destinations are written immediately; anything else is
    /// staged and copied at the next [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidSize`] for empty data or data larger than `destination`.
    pub fn queue_buffer_upload(
        &mut self,
        resources: &mut ResourceManager,
        destination: SubBuffer,
        data: &[u8],
    ) -> RhiResult<()> {
        if data.is_empty() {
            return Err(RhiError::InvalidSize(format!("empty upload to {destination}")));
        }
        let size = data.len() as u64;
        if size > destination.size() {
            return Err(precondition_failed(RhiError::InvalidSize(format!(
                "{size} bytes do not fit in {destination}"
            ))));
        }

        if resources.is_host_coherent(destination) {
            trace!("Direct write of {} bytes to {}", size, destination);
            return resources.write_buffer(destination, data);
        }

        let staging = Self::stage(resources, data)?;
        self.buffer_uploads.push(BufferUpload {
            staging,
            destination,
            size,
        });
        trace!("Queued {} byte upload to {}", size, destination);
        Ok(())
    }

    /// [`queue_buffer_upload`](Self::queue_buffer_upload) for plain-old-data slices.
    pub fn queue_buffer_upload_pod<T: bytemuck::Pod>(
        &mut self,
        resources: &mut ResourceManager,
        destination: SubBuffer,
        data: &[T],
    ) -> RhiResult<()> {
        self.queue_buffer_upload(resources, destination, bytemuck::cast_slice(data))
    }

    /// Stages `data` for `region` of a bound image.
    ///
    /// At flush the image moves from its current layout to
    /// `TRANSFER_DST_OPTIMAL`, receives the copy, and ends up in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidSize`] for empty data, or for data shorter than the
    /// region when the image format has a known texel size.
    pub fn queue_image_upload(
        &mut self,
        resources: &mut ResourceManager,
        image: ImageId,
        data: &[u8],
        region: ImageRegion,
    ) -> RhiResult<()> {
        if data.is_empty() {
            return Err(RhiError::InvalidSize(format!("empty upload to {image}")));
        }
        let Some(target) = resources.image(image) else {
            return Err(precondition_failed(RhiError::UnknownResource(image.to_string())));
        };
        if !target.is_bound() {
            return Err(precondition_failed(RhiError::NotBound(image.to_string())));
        }
        if let Some(required) = region_size(target.format(), region, target.array_layers()) {
            if (data.len() as u64) < required {
                return Err(precondition_failed(RhiError::InvalidSize(format!(
                    "{} bytes for a {}x{}x{} region of {image} that needs {required}",
                    data.len(),
                    region.extent.width,
                    region.extent.height,
                    region.extent.depth
                ))));
            }
        }

        let staging = Self::stage(resources, data)?;
        self.image_uploads.push(ImageUpload {
            staging,
            image,
            region,
        });
        trace!("Queued {} byte upload to {}", data.len(), image);
        Ok(())
    }

    fn stage(resources: &mut ResourceManager, data: &[u8]) -> RhiResult<SubBuffer> {
        let staging = resources.get_host_coherent_sub_buffer(
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::SharingMode::EXCLUSIVE,
        )?;
        resources.write_buffer(staging, data)?;
        Ok(staging)
    }

    #[inline]
    pub fn pending_buffer_uploads(&self) -> usize {
        self.buffer_uploads.len()
    }

    #[inline]
    pub fn pending_image_uploads(&self) -> usize {
        self.image_uploads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer_uploads.is_empty() && self.image_uploads.is_empty()
    }

    /// Records, submits and waits for every pending upload, then releases
    /// the staging sub-buffers. Does nothing when the queue is empty.
    pub fn flush(&mut self, resources: &mut ResourceManager) -> RhiResult<()> {
        if self.is_empty() {
            return Ok(());
        }

        let cmd = CommandBuffer::new(self.device.clone(), &self.command_pool)?;
        let result = self.record_and_submit(&cmd, resources);
        self.command_pool.free_command_buffers(&[cmd.handle()]);
        result?;

        for upload in &self.image_uploads {
            resources.set_image_layout(upload.image, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        }

        let staging = self
            .buffer_uploads
            .drain(..)
            .map(|upload| upload.staging)
            .chain(self.image_uploads.drain(..).map(|upload| upload.staging));
        let mut released = 0;
        for sub in staging {
            resources.destroy_sub_buffer(sub)?;
            released += 1;
        }

        debug!("Upload flush complete, {} staging buffers released", released);
        Ok(())
    }

    fn record_and_submit(&self, cmd: &CommandBuffer, resources: &ResourceManager) -> RhiResult<()> {
        cmd.begin()?;

        for upload in &self.buffer_uploads {
            let src = buffer_handle(resources, upload.staging)?;
            let dst = buffer_handle(resources, upload.destination)?;
            let region = vk::BufferCopy {
                src_offset: upload.staging.offset(),
                dst_offset: upload.destination.offset(),
                size: upload.size,
            };
            cmd.copy_buffer(src, dst, &[region]);
        }

        // Layouts as of the commands recorded so far; an image may be
        // written more than once per flush.
        let mut layouts: HashMap<ImageId, vk::ImageLayout> = HashMap::new();
        for upload in &self.image_uploads {
            let src = buffer_handle(resources, upload.staging)?;
            let image = resources
                .image(upload.image)
                .ok_or_else(|| RhiError::UnknownResource(upload.image.to_string()))?;

            let subresource_range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: upload.region.mip_level,
                level_count: 1,
                base_array_layer: 0,
                layer_count: image.array_layers(),
            };

            let current = layouts.get(&upload.image).copied().unwrap_or(image.layout());
            cmd.transition_image_layout(
                image.handle(),
                current,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                subresource_range,
            );

            let copy = vk::BufferImageCopy {
                buffer_offset: upload.staging.offset(),
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: upload.region.mip_level,
                    base_array_layer: 0,
                    layer_count: image.array_layers(),
                },
                image_offset: upload.region.offset,
                image_extent: upload.region.extent,
            };
            cmd.copy_buffer_to_image(
                src,
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );

            cmd.transition_image_layout(
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                subresource_range,
            );
            layouts.insert(upload.image, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }

        cmd.end()?;

        let command_buffers = [cmd.handle()];
        self.device.submit_graphics(
            &Submission {
                command_buffers: &command_buffers,
                ..Default::default()
            },
            vk::Fence::null(),
        )?;
        self.device.graphics_queue_wait_idle()?;

        debug!(
            "Flushed {} buffer and {} image uploads",
            self.buffer_uploads.len(),
            self.image_uploads.len()
        );
        Ok(())
    }
}

/// Bytes per texel for uncompressed color formats.
fn texel_size(format: vk::Format) -> Option<u64> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB | vk::Format::R8_UINT => 1,
        vk::Format::R8G8_UNORM | vk::Format::R16_SFLOAT | vk::Format::R16_UINT => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => return None,
    };
    Some(size)
}

fn region_size(format: vk::Format, region: ImageRegion, layers: u32) -> Option<u64> {
    let texels = u64::from(region.extent.width)
        * u64::from(region.extent.height)
        * u64::from(region.extent.depth)
        * u64::from(layers);
    texel_size(format).map(|size| texels * size)
}

fn buffer_handle(resources: &ResourceManager, sub: SubBuffer) -> RhiResult<vk::Buffer> {
    resources
        .buffer(sub.buffer())
        .map(|buffer| buffer.handle())
        .ok_or_else(|| RhiError::UnknownResource(sub.buffer().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkpack_rhi::gpu::ImageDesc;
    use vkpack_rhi::testing::{FakeDevice, RecordedCommand};

    const MIN: u64 = 64 * 1024;

    fn setup() -> (Arc<FakeDevice>, ResourceManager, UploadQueue) {
        let fake = Arc::new(FakeDevice::new());
        let resources = ResourceManager::new(fake.clone(), MIN);
        let uploads = UploadQueue::new(fake.clone()).unwrap();
        (fake, resources, uploads)
    }

    fn device_local(resources: &mut ResourceManager, size: u64) -> SubBuffer {
        resources
            .get_device_local_sub_buffer(
                size,
                vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
                vk::SharingMode::EXCLUSIVE,
            )
            .unwrap()
    }

    #[test]
    fn test_host_coherent_destination_bypasses_queue() {
        let (fake, mut resources, mut uploads) = setup();
        let uniforms = resources
            .get_host_coherent_sub_buffer(
                16,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::SharingMode::EXCLUSIVE,
            )
            .unwrap();

        uploads
            .queue_buffer_upload(&mut resources, uniforms, &[7; 16])
            .unwrap();

        assert!(uploads.is_empty());
        let buffer = resources.buffer(uniforms.buffer()).unwrap();
        let block = resources.allocator().block(buffer.memory().unwrap()).unwrap();
        let bytes = fake.memory_contents(block.handle()).unwrap();
        let start = (buffer.memory_offset() + uniforms.offset()) as usize;
        assert_eq!(&bytes[start..start + 16], &[7; 16]);
    }

    #[test]
    fn test_device_local_destination_is_staged() {
        let (fake, mut resources, mut uploads) = setup();
        let vertices = device_local(&mut resources, 64);

        uploads
            .queue_buffer_upload_pod(&mut resources, vertices, &[1.0f32, 2.0, 3.0])
            .unwrap();

        assert_eq!(uploads.pending_buffer_uploads(), 1);
        assert!(fake.submissions().is_empty());
    }

    #[test]
    fn test_flush_copies_and_releases_staging() {
        let (fake, mut resources, mut uploads) = setup();
        let vertices = device_local(&mut resources, 64);
        uploads
            .queue_buffer_upload(&mut resources, vertices, &[1; 12])
            .unwrap();

        uploads.flush(&mut resources).unwrap();

        assert!(uploads.is_empty());
        assert_eq!(fake.submissions().len(), 1);
        assert_eq!(fake.queue_wait_idle_count(), 1);

        let copies: Vec<_> = fake
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                RecordedCommand::CopyBuffer { dst, regions, .. } => Some((dst, regions)),
                _ => None,
            })
            .collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].0, resources.buffer(vertices.buffer()).unwrap().handle());
        assert_eq!(copies[0].1[0].size, 12);
        assert_eq!(copies[0].1[0].dst_offset, vertices.offset());

        let staging_buffers = resources
            .buffers()
            .iter()
            .filter(|buffer| buffer.usage() == vk::BufferUsageFlags::TRANSFER_SRC);
        for buffer in staging_buffers {
            assert!(buffer.sub_buffers().is_empty());
        }
    }

    #[test]
    fn test_empty_flush_submits_nothing() {
        let (fake, mut resources, mut uploads) = setup();
        uploads.flush(&mut resources).unwrap();
        assert!(fake.submissions().is_empty());
        assert_eq!(fake.queue_wait_idle_count(), 0);
    }

    #[test]
    fn test_image_upload_transitions_layouts() {
        let (fake, mut resources, mut uploads) = setup();
        let image = resources
            .create_image(&ImageDesc::texture_2d(4, 4, vk::Format::R8G8B8A8_UNORM))
            .unwrap();
        resources.auto_bind_image_device_local(image).unwrap();
        let extent = resources.image(image).unwrap().extent();

        uploads
            .queue_image_upload(&mut resources, image, &[255; 64], ImageRegion::whole(extent))
            .unwrap();
        uploads.flush(&mut resources).unwrap();

        let layouts: Vec<_> = fake
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                RecordedCommand::ImageBarrier {
                    old_layout,
                    new_layout,
                    ..
                } => Some((old_layout, new_layout)),
                _ => None,
            })
            .collect();
        assert_eq!(
            layouts,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                ),
            ]
        );
        assert_eq!(
            resources.image(image).unwrap().layout(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn test_repeated_image_upload_keeps_layout_chain() {
        let (fake, mut resources, mut uploads) = setup();
        let image = resources
            .create_image(&ImageDesc::texture_2d(4, 4, vk::Format::R8G8B8A8_UNORM))
            .unwrap();
        resources.auto_bind_image_device_local(image).unwrap();

        let half = vk::Extent3D {
            width: 4,
            height: 2,
            depth: 1,
        };
        let top = ImageRegion::whole(half);
        let bottom = ImageRegion {
            offset: vk::Offset3D { x: 0, y: 2, z: 0 },
            ..top
        };
        uploads.queue_image_upload(&mut resources, image, &[1; 32], top).unwrap();
        uploads.queue_image_upload(&mut resources, image, &[2; 32], bottom).unwrap();
        uploads.flush(&mut resources).unwrap();

        let layouts: Vec<_> = fake
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                RecordedCommand::ImageBarrier {
                    old_layout,
                    new_layout,
                    ..
                } => Some((old_layout, new_layout)),
                _ => None,
            })
            .collect();
        assert_eq!(
            layouts,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                ),
                (
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL
                ),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                ),
            ]
        );
    }

    #[test]
    fn test_region_size_by_format() {
        let region = ImageRegion::whole(vk::Extent3D {
            width: 64,
            height: 64,
            depth: 1,
        });
        assert_eq!(region_size(vk::Format::R8G8B8A8_UNORM, region, 1), Some(16384));
        assert_eq!(region_size(vk::Format::R32G32B32A32_SFLOAT, region, 2), Some(131072));
        assert_eq!(region_size(vk::Format::BC1_RGB_UNORM_BLOCK, region, 1), None);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "precondition violated")]
    fn test_short_image_data_panics() {
        let (_fake, mut resources, mut uploads) = setup();
        let image = resources
            .create_image(&ImageDesc::texture_2d(64, 64, vk::Format::R8G8B8A8_UNORM))
            .unwrap();
        resources.auto_bind_image_device_local(image).unwrap();
        let extent = resources.image(image).unwrap().extent();
        let _ = uploads.queue_image_upload(&mut resources, image, &[0; 4], ImageRegion::whole(extent));
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        let (_fake, mut resources, mut uploads) = setup();
        let vertices = device_local(&mut resources, 64);
        assert!(matches!(
            uploads.queue_buffer_upload(&mut resources, vertices, &[]),
            Err(RhiError::InvalidSize(_))
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "precondition violated")]
    fn test_oversized_upload_panics() {
        let (_fake, mut resources, mut uploads) = setup();
        let vertices = device_local(&mut resources, 16);
        let _ = uploads.queue_buffer_upload(&mut resources, vertices, &[0; 17]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "precondition violated")]
    fn test_unbound_image_upload_panics() {
        let (_fake, mut resources, mut uploads) = setup();
        let image = resources
            .create_image(&ImageDesc::texture_2d(2, 2, vk::Format::R8G8B8A8_UNORM))
            .unwrap();
        let _ = uploads.queue_image_upload(
            &mut resources,
            image,
            &[0; 16],
            ImageRegion::whole(vk::Extent3D {
                width: 2,
                height: 2,
                depth: 1,
            }),
        );
    }
}
