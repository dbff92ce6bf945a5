//! Frame pipeline and upload queue driven end to end through `FakeDevice`.

use std::collections::VecDeque;
use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use vkpack_core::{Config, Error, Result};
use vkpack_platform::{FrameHandler, Surface, WindowEvents, WindowSystem, run_event_loop};
use vkpack_renderer::{FramePipeline, ImageRegion, RenderContext};
use vkpack_rhi::gpu::ImageDesc;
use vkpack_rhi::sync::Fence;
use vkpack_rhi::testing::{FakeDevice, ObjectKind, RecordedCommand};

const MIN_ALLOCATION: u64 = 64 * 1024;

fn config() -> Config {
    Config::default().with_min_allocation_size(MIN_ALLOCATION)
}

fn render_one(frames: &mut FramePipeline) -> bool {
    if !frames.begin_frame().unwrap() {
        return false;
    }
    frames.end_frame().unwrap();
    frames.present().unwrap();
    true
}

#[test]
fn test_flush_batches_all_uploads_into_one_submission() {
    let fake = Arc::new(FakeDevice::new());
    let mut context = RenderContext::with_device(fake.clone(), &config()).unwrap();

    let usage = vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::STORAGE_BUFFER;
    let resources = context.resources_mut();
    let first = resources
        .get_device_local_sub_buffer(64, usage, vk::SharingMode::EXCLUSIVE)
        .unwrap();
    let second = resources
        .get_device_local_sub_buffer(32, usage, vk::SharingMode::EXCLUSIVE)
        .unwrap();
    let image = resources
        .create_image(&ImageDesc::texture_2d(8, 8, vk::Format::R8G8B8A8_UNORM))
        .unwrap();
    resources.auto_bind_image_device_local(image).unwrap();
    let extent = resources.image(image).unwrap().extent();

    context.queue_buffer_upload(first, &[1; 64]).unwrap();
    context.queue_buffer_upload(second, &[2; 32]).unwrap();
    context
        .queue_image_upload(image, &[3; 256], ImageRegion::whole(extent))
        .unwrap();
    assert_eq!(context.uploads().pending_buffer_uploads(), 2);
    assert_eq!(context.uploads().pending_image_uploads(), 1);

    context.update(0.016).unwrap();

    assert!(context.uploads().is_empty());
    let submissions = fake.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].command_buffers.len(), 1);
    assert_eq!(submissions[0].fence, vk::Fence::null());
    assert_eq!(fake.queue_wait_idle_count(), 1);

    let commands = fake.commands();
    let upload_cmd = submissions[0].command_buffers[0];
    assert!(commands.iter().all(|c| c.command_buffer() == upload_cmd));
    let copies = commands
        .iter()
        .filter(|c| {
            matches!(
                c,
                RecordedCommand::CopyBuffer { .. } | RecordedCommand::CopyBufferToImage { .. }
            )
        })
        .count();
    assert_eq!(copies, 3);

    let staging: Vec<_> = context
        .resources()
        .buffers()
        .iter()
        .filter(|b| b.usage() == vk::BufferUsageFlags::TRANSFER_SRC)
        .collect();
    assert_eq!(staging.len(), 1);
    assert!(staging[0].sub_buffers().is_empty());
    let staging_id = staging[0].id();
    let buffer_count = context.resources().buffers().len();

    // Freed staging space is reused by the next request of the same size.
    context.queue_buffer_upload(first, &[4; 64]).unwrap();
    let staging = context.resources().buffer(staging_id).unwrap();
    assert_eq!(staging.sub_buffers().len(), 1);
    assert_eq!(staging.sub_buffers()[0].range.offset, 0);
    assert_eq!(context.resources().buffers().len(), buffer_count);
}

#[test]
fn test_recreation_mid_frame_leaves_no_duplicates() {
    let fake = Arc::new(FakeDevice::new());
    let mut frames = FramePipeline::new(fake.clone(), &config()).unwrap();
    assert!(render_one(&mut frames));

    fake.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(!frames.begin_frame().unwrap());

    assert_eq!(fake.live_count(ObjectKind::Swapchain), 1);
    assert_eq!(fake.live_count(ObjectKind::RenderPass), 1);
    assert_eq!(fake.live_count(ObjectKind::ImageView), 3);
    assert_eq!(fake.live_count(ObjectKind::Framebuffer), 3);
    assert_eq!(fake.live_count(ObjectKind::CommandPool), 2);
    assert_eq!(fake.live_count(ObjectKind::Fence), 2);
    assert_eq!(fake.live_count(ObjectKind::Semaphore), 4);
    assert_eq!(fake.created_count(ObjectKind::ImageView), 6);

    // A second recreation in a row is just as clean.
    fake.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
    assert!(!frames.begin_frame().unwrap());
    assert_eq!(fake.live_count(ObjectKind::Framebuffer), 3);
    assert_eq!(fake.live_count(ObjectKind::ImageView), 3);

    assert!(render_one(&mut frames));
    drop(frames);
    assert!(!fake.has_live_objects());
}

#[test]
fn test_signaled_fence_wait_returns_immediately() {
    let fake = Arc::new(FakeDevice::new());
    let fence = Fence::new(fake.clone(), true).unwrap();
    fence.wait(u64::MAX).unwrap();

    let mut frames = FramePipeline::new(fake.clone(), &config()).unwrap();
    let waits = fake.fence_waits();
    assert!(frames.begin_frame().unwrap());
    assert_eq!(fake.fence_waits(), waits + 1);
}

#[test]
fn test_image_reused_by_other_slot_waits_on_its_fence() {
    let fake = Arc::new(FakeDevice::new());
    let mut frames = FramePipeline::new(fake.clone(), &config()).unwrap();

    fake.script_acquire(Ok((0, false)));
    assert!(render_one(&mut frames));
    assert_eq!(frames.images_in_flight()[0], Some(0));
    let waits = fake.fence_waits();

    // Slot 1 gets image 0, still owned by slot 0.
    fake.script_acquire(Ok((0, false)));
    assert!(render_one(&mut frames));
    assert_eq!(fake.fence_waits(), waits + 2);
    assert_eq!(frames.images_in_flight()[0], Some(1));

    // Slot 0 gets image 1, never used before: only its own fence.
    let waits = fake.fence_waits();
    fake.script_acquire(Ok((1, false)));
    assert!(render_one(&mut frames));
    assert_eq!(fake.fence_waits(), waits + 1);
}

struct ScriptedWindow {
    script: VecDeque<WindowEvents>,
    polls_left: usize,
}

impl WindowSystem for ScriptedWindow {
    fn poll_events(&mut self) -> WindowEvents {
        if let Some(events) = self.script.pop_front() {
            return events;
        }
        if self.polls_left == 0 {
            return WindowEvents {
                quit: true,
                resized: None,
            };
        }
        self.polls_left -= 1;
        WindowEvents::default()
    }

    fn size(&self) -> (u32, u32) {
        (640, 480)
    }

    fn required_extensions(&self) -> Result<Vec<&'static CStr>> {
        Ok(Vec::new())
    }

    fn create_surface(&self, _entry: &ash::Entry, _instance: &ash::Instance) -> Result<Surface> {
        Err(Error::Window("no surface in tests".to_string()))
    }
}

struct Demo {
    context: RenderContext,
}

impl FrameHandler for Demo {
    fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.context
            .request_resize(width, height)
            .map_err(|e| Error::Vulkan(e.to_string()))
    }

    fn update(&mut self, dt: f64) -> Result<()> {
        self.context
            .update(dt as f32)
            .map_err(|e| Error::Vulkan(e.to_string()))
    }

    fn render(&mut self, _dt: f64) -> Result<()> {
        let context = &mut self.context;
        let rendered = context.begin_frame().map_err(|e| Error::Vulkan(e.to_string()))?;
        if rendered {
            context.end_frame().map_err(|e| Error::Vulkan(e.to_string()))?;
            context.present().map_err(|e| Error::Vulkan(e.to_string()))?;
        }
        Ok(())
    }
}

#[test]
fn test_window_resize_rebuilds_swapchain_at_new_size() {
    let fake = Arc::new(FakeDevice::new());
    let config = config().with_target_fps(1_000_000.0).with_resize_timeout(0.0);
    let mut demo = Demo {
        context: RenderContext::with_device(fake.clone(), &config).unwrap(),
    };
    let mut window = ScriptedWindow {
        script: VecDeque::from([WindowEvents {
            quit: false,
            resized: Some((800, 600)),
        }]),
        polls_left: 10_000,
    };
    fake.set_surface_extent(800, 600);

    run_event_loop(&mut window, &mut demo, &config).unwrap();

    assert_eq!(
        demo.context.frames().swapchain().extent(),
        vk::Extent2D {
            width: 800,
            height: 600
        }
    );
    assert_eq!(fake.live_count(ObjectKind::Swapchain), 1);
    assert_eq!(fake.live_count(ObjectKind::Framebuffer), 3);
}
