//! vkpack demo.
//!
//! Opens a window, uploads a vertex buffer and a small texture through the
//! upload queue, rewrites a host-coherent uniform block every tick, and
//! clears and presents frames until the window is closed.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use clap::{Parser, ValueEnum};
use tracing::info;

use vkpack_core::{Config, Error, PresentModePreference};
use vkpack_platform::{FrameHandler, WinitWindowSystem, run_event_loop};
use vkpack_renderer::{ImageRegion, RenderContext};
use vkpack_rhi::{RhiError, vk};
use vkpack_rhi::gpu::ImageDesc;
use vkpack_rhi::memory::{ImageId, SubBuffer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresentMode {
    Mailbox,
    Fifo,
    Immediate,
}

impl From<PresentMode> for PresentModePreference {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Mailbox => Self::Mailbox,
            PresentMode::Fifo => Self::Fifo,
            PresentMode::Immediate => Self::Immediate,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "vkpack", about = "Vulkan resource layer demo")]
struct Args {
    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Update and render rate.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Seconds a resize must settle before the swapchain is rebuilt.
    #[arg(long, default_value_t = 0.1)]
    resize_timeout: f64,

    #[arg(long, value_enum, default_value_t = PresentMode::Mailbox)]
    present_mode: PresentMode,

    /// Smallest memory block and buffer, in MiB.
    #[arg(long, default_value_t = 16)]
    min_allocation_mib: u64,

    /// Enable the Khronos validation layer.
    #[arg(long)]
    validation: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config::default()
            .with_title("vkpack demo")
            .with_window_size(self.width, self.height)
            .with_target_fps(self.fps)
            .with_resize_timeout(self.resize_timeout)
            .with_present_mode(self.present_mode.into())
            .with_min_allocation_size(self.min_allocation_mib * 1024 * 1024)
            .with_validation(self.validation || cfg!(debug_assertions))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniforms {
    elapsed_time: f32,
    frame: u32,
    extent: [u32; 2],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

const TEXTURE_SIZE: u32 = 64;

fn gpu_error(e: RhiError) -> Error {
    Error::Vulkan(e.to_string())
}

struct Demo {
    context: RenderContext,
    uniforms: SubBuffer,
    _vertices: SubBuffer,
    _texture: ImageId,
}

impl Demo {
    fn new(mut context: RenderContext) -> std::result::Result<Self, RhiError> {
        let resources = context.resources_mut();

        let vertices = resources.get_device_local_sub_buffer(
            std::mem::size_of_val(&TRIANGLE) as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
        )?;
        let uniforms = resources.get_host_coherent_sub_buffer(
            std::mem::size_of::<FrameUniforms>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
        )?;
        let texture = resources.create_image(&ImageDesc::texture_2d(
            TEXTURE_SIZE,
            TEXTURE_SIZE,
            vk::Format::R8G8B8A8_UNORM,
        ))?;
        resources.auto_bind_image_device_local(texture)?;
        let extent = resources
            .image(texture)
            .map(|image| image.extent())
            .ok_or_else(|| RhiError::UnknownResource(texture.to_string()))?;

        context.queue_buffer_upload_pod(vertices, &TRIANGLE)?;
        context.queue_image_upload(texture, &checkerboard(TEXTURE_SIZE), ImageRegion::whole(extent))?;

        info!(
            "Demo resources created: {} buffers in {} memory blocks",
            context.resources().buffers().len(),
            context.resources().allocator().blocks().len()
        );

        Ok(Self {
            context,
            uniforms,
            _vertices: vertices,
            _texture: texture,
        })
    }
}

fn checkerboard(size: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / 8 + y / 8) % 2 == 0 {
                [255, 255, 255, 255]
            } else {
                [32, 32, 32, 255]
            }
        })
        .collect()
}

impl FrameHandler for Demo {
    fn on_resize(&mut self, width: u32, height: u32) -> vkpack_core::Result<()> {
        info!("Window settled at {}x{}", width, height);
        self.context.request_resize(width, height).map_err(gpu_error)
    }

    fn update(&mut self, dt: f64) -> vkpack_core::Result<()> {
        let time = self.context.time();
        let extent = self.context.frames().render_extent();
        let uniforms = FrameUniforms {
            elapsed_time: time.elapsed_time,
            frame: time.total_frame_count as u32,
            extent: [extent.width, extent.height],
        };
        self.context
            .queue_buffer_upload_pod(self.uniforms, &[uniforms])
            .map_err(gpu_error)?;
        self.context.update(dt as f32).map_err(gpu_error)
    }

    fn render(&mut self, _dt: f64) -> vkpack_core::Result<()> {
        if !self.context.begin_frame().map_err(gpu_error)? {
            return Ok(());
        }
        self.context.end_frame().map_err(gpu_error)?;
        self.context.present().map_err(gpu_error)
    }
}

fn main() -> Result<()> {
    vkpack_core::init_logging();

    let config = Args::parse().into_config();
    config.validate()?;
    info!("Starting vkpack demo");

    let mut window = WinitWindowSystem::new(&config)?;
    let context = RenderContext::new(&window, &config)?;
    let mut demo = Demo::new(context)?;

    run_event_loop(&mut window, &mut demo, &config)?;

    info!(
        "Exiting after {} frames ({:.1}s)",
        demo.context.time().total_frame_count,
        demo.context.time().elapsed_time
    );
    Ok(())
}
