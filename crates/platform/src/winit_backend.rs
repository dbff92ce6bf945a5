//! [`WindowSystem`] backed by winit, driven with `pump_app_events`.
//!
//! winit normally owns the main loop through `run_app`. Pumping instead keeps
//! the loop in our hands: each [`poll_events`](WindowSystem::poll_events)
//! call dispatches whatever is queued and returns immediately.

use std::ffi::CStr;
use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

use vkpack_core::{Config, Error, Result};

use crate::surface::{Surface, required_surface_extensions};
use crate::window::{WindowEvents, WindowSystem};

/// Pumps allowed while waiting for the platform to hand us a window.
const WINDOW_CREATION_PUMPS: usize = 64;

/// Event handler state shared with winit during a pump.
struct WinitState {
    attributes: WindowAttributes,
    window: Option<Arc<Window>>,
    size: (u32, u32),
    events: WindowEvents,
    creation_error: Option<String>,
}

impl ApplicationHandler for WinitState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                self.size = (size.width, size.height);
                tracing::info!("Window created: {}x{}", size.width, size.height);
                self.window = Some(Arc::new(window));
            }
            Err(e) => {
                self.creation_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested");
                self.events.quit = true;
            }
            WindowEvent::Resized(size) => {
                tracing::debug!("Window resized: {}x{}", size.width, size.height);
                self.size = (size.width, size.height);
                self.events.resized = Some(self.size);
            }
            _ => {}
        }
    }
}

/// A single winit window plus its event loop.
pub struct WinitWindowSystem {
    event_loop: EventLoop<()>,
    state: WinitState,
}

impl WinitWindowSystem {
    /// Creates the event loop and a resizable window titled and sized per `config`.
    ///
    /// # Errors
    /// Returns [`Error::Window`] if the event loop cannot start or the window
    /// is never created.
    pub fn new(config: &Config) -> Result<Self> {
        let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let attributes = WindowAttributes::default()
            .with_title(config.window_title.clone())
            .with_inner_size(PhysicalSize::new(config.window_width, config.window_height))
            .with_resizable(true);

        let mut system = Self {
            event_loop,
            state: WinitState {
                attributes,
                window: None,
                size: (config.window_width, config.window_height),
                events: WindowEvents::default(),
                creation_error: None,
            },
        };

        for _ in 0..WINDOW_CREATION_PUMPS {
            let status = system
                .event_loop
                .pump_app_events(Some(Duration::ZERO), &mut system.state);

            if let Some(e) = system.state.creation_error.take() {
                return Err(Error::Window(format!("Failed to create window: {e}")));
            }
            if system.state.window.is_some() {
                return Ok(system);
            }
            if let PumpStatus::Exit(code) = status {
                return Err(Error::Window(format!(
                    "Event loop exited with code {code} before a window was created"
                )));
            }
        }

        Err(Error::Window("Platform never resumed the application".to_string()))
    }

    /// The underlying winit window.
    pub fn window(&self) -> Option<&Arc<Window>> {
        self.state.window.as_ref()
    }

    fn window_or_err(&self) -> Result<&Arc<Window>> {
        self.state
            .window
            .as_ref()
            .ok_or_else(|| Error::Window("Window is not created".to_string()))
    }
}

impl WindowSystem for WinitWindowSystem {
    fn poll_events(&mut self) -> WindowEvents {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);

        let mut events = std::mem::take(&mut self.state.events);
        if let PumpStatus::Exit(code) = status {
            tracing::debug!("Event loop exited with code {}", code);
            events.quit = true;
        }
        events
    }

    fn size(&self) -> (u32, u32) {
        self.state.size
    }

    fn required_extensions(&self) -> Result<Vec<&'static CStr>> {
        let display = self
            .window_or_err()?
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {e}")))?;
        required_surface_extensions(display.as_raw())
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let window = self.window_or_err()?;
        let display = window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {e}")))?;
        let handle = window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {e}")))?;

        // SAFETY: both handles come from the window owned by `self`, which the
        // caller keeps alive for the lifetime of the surface.
        unsafe { Surface::from_raw_handles(entry, instance, display.as_raw(), handle.as_raw()) }
    }
}
