//! Paced update/render loop with debounced resizes.
//!
//! # Overview
//!
//! [`run_event_loop`] polls the window every iteration and ticks the
//! [`FrameHandler`] at most `target_fps` times per second. Resize events go
//! through a [`ResizeDebounce`] so an interactive drag rebuilds the swapchain
//! once, after the size has been quiet for `resize_timeout` seconds. Ticks are
//! skipped while a resize is pending.

use std::time::Duration;

use vkpack_core::{Config, Result, Timer};

use crate::window::WindowSystem;

/// Remaining time below which the loop yields instead of sleeping.
const SLEEP_THRESHOLD: f64 = 0.01;

/// Receives resize, update and render calls from [`run_event_loop`].
pub trait FrameHandler {
    /// The window settled at a new size.
    fn on_resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// One simulation step of `dt` seconds.
    fn update(&mut self, dt: f64) -> Result<()>;

    /// Draws the frame that follows the last `update`.
    fn render(&mut self, dt: f64) -> Result<()>;
}

/// Holds back resize notifications until they stop arriving.
#[derive(Debug, Clone)]
pub struct ResizeDebounce {
    timeout: f64,
    remaining: f64,
    pending: Option<(u32, u32)>,
}

impl ResizeDebounce {
    pub fn new(timeout: f64) -> Self {
        Self {
            timeout,
            remaining: 0.0,
            pending: None,
        }
    }

    /// Records a resize and restarts the timeout.
    ///
    /// With a zero timeout nothing is held back and the size is returned
    /// immediately.
    pub fn notify(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        if self.timeout <= 0.0 {
            self.pending = None;
            return Some((width, height));
        }

        self.pending = Some((width, height));
        self.remaining = self.timeout;
        None
    }

    /// Advances the timeout; returns the latest size once it expires.
    pub fn tick(&mut self, dt: f64) -> Option<(u32, u32)> {
        self.pending?;

        self.remaining -= dt;
        if self.remaining < 0.0 {
            self.pending.take()
        } else {
            None
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Runs until the window reports a quit or the handler fails.
///
/// # Errors
/// Returns the first error from [`Config::validate`] or from the handler.
pub fn run_event_loop<W, H>(window: &mut W, handler: &mut H, config: &Config) -> Result<()>
where
    W: WindowSystem + ?Sized,
    H: FrameHandler + ?Sized,
{
    config.validate()?;

    let interval = config.frame_interval();
    let mut debounce = ResizeDebounce::new(config.resize_timeout);
    let mut timer = Timer::new();

    tracing::info!(
        "Entering event loop: {} fps, resize timeout {}s",
        config.target_fps,
        config.resize_timeout
    );

    loop {
        let events = window.poll_events();
        if events.quit {
            tracing::info!("Quit requested, leaving event loop");
            break;
        }

        if let Some((width, height)) = events.resized
            && let Some((width, height)) = debounce.notify(width, height)
        {
            handler.on_resize(width, height)?;
        }

        let since_tick = timer.since_tick().as_secs_f64();
        if since_tick < interval {
            let left = interval - since_tick;
            if left >= SLEEP_THRESHOLD {
                std::thread::sleep(Duration::from_secs_f64(left));
            } else {
                std::thread::yield_now();
            }
            continue;
        }

        let dt = timer.delta_secs();

        if let Some((width, height)) = debounce.tick(dt) {
            tracing::debug!("Resize settled at {}x{}", width, height);
            handler.on_resize(width, height)?;
        }

        if debounce.is_pending() {
            tracing::trace!("Resize pending, skipping tick");
            continue;
        }

        handler.update(dt)?;
        handler.render(dt)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;
    use crate::window::WindowEvents;
    use std::collections::VecDeque;
    use std::ffi::CStr;
    use vkpack_core::Error;

    /// Replays scripted events, then keeps reporting quiet polls until its
    /// budget runs out and it reports a quit.
    struct ScriptedWindow {
        script: VecDeque<WindowEvents>,
        polls_left: usize,
    }

    impl ScriptedWindow {
        fn new(script: Vec<WindowEvents>, polls: usize) -> Self {
            Self {
                script: script.into(),
                polls_left: polls,
            }
        }
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
            Err(Error::Window("scripted window has no surface".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        resizes: Vec<(u32, u32)>,
        updates: usize,
        renders: usize,
        fail_update: bool,
    }

    impl FrameHandler for CountingHandler {
        fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
            self.resizes.push((width, height));
            Ok(())
        }

        fn update(&mut self, _dt: f64) -> Result<()> {
            if self.fail_update {
                return Err(Error::Internal("update failed".to_string()));
            }
            self.updates += 1;
            Ok(())
        }

        fn render(&mut self, _dt: f64) -> Result<()> {
            self.renders += 1;
            Ok(())
        }
    }

    fn resize(width: u32, height: u32) -> WindowEvents {
        WindowEvents {
            quit: false,
            resized: Some((width, height)),
        }
    }

    fn fast_config() -> Config {
        Config::default().with_target_fps(1_000_000.0)
    }

    #[test]
    fn test_debounce_restarts_on_each_event() {
        let mut debounce = ResizeDebounce::new(0.1);

        assert_eq!(debounce.notify(100, 100), None);
        assert_eq!(debounce.tick(0.06), None);
        assert_eq!(debounce.notify(200, 150), None);
        assert_eq!(debounce.tick(0.06), None);
        assert!(debounce.is_pending());
        assert_eq!(debounce.tick(0.06), Some((200, 150)));
        assert!(!debounce.is_pending());
        assert_eq!(debounce.tick(1.0), None);
    }

    #[test]
    fn test_debounce_zero_timeout_is_immediate() {
        let mut debounce = ResizeDebounce::new(0.0);
        assert_eq!(debounce.notify(800, 600), Some((800, 600)));
        assert!(!debounce.is_pending());
    }

    #[test]
    fn test_quit_on_first_poll_runs_nothing() {
        let mut window = ScriptedWindow::new(Vec::new(), 0);
        let mut handler = CountingHandler::default();

        run_event_loop(&mut window, &mut handler, &fast_config()).unwrap();

        assert_eq!(handler.updates, 0);
        assert_eq!(handler.renders, 0);
    }

    #[test]
    fn test_ticks_update_then_render() {
        let mut window = ScriptedWindow::new(Vec::new(), 10_000);
        let mut handler = CountingHandler::default();

        run_event_loop(&mut window, &mut handler, &fast_config()).unwrap();

        assert!(handler.updates > 0);
        assert_eq!(handler.updates, handler.renders);
    }

    #[test]
    fn test_immediate_resize_without_timeout() {
        let mut window = ScriptedWindow::new(vec![resize(1024, 768)], 10);
        let mut handler = CountingHandler::default();
        let config = fast_config().with_resize_timeout(0.0);

        run_event_loop(&mut window, &mut handler, &config).unwrap();

        assert_eq!(handler.resizes, vec![(1024, 768)]);
    }

    #[test]
    fn test_pending_resize_skips_ticks() {
        let mut window = ScriptedWindow::new(vec![resize(300, 200), resize(320, 240)], 10_000);
        let mut handler = CountingHandler::default();
        let config = fast_config().with_resize_timeout(3600.0);

        run_event_loop(&mut window, &mut handler, &config).unwrap();

        assert!(handler.resizes.is_empty());
        assert_eq!(handler.updates, 0);
        assert_eq!(handler.renders, 0);
    }

    #[test]
    fn test_handler_error_stops_loop() {
        let mut window = ScriptedWindow::new(Vec::new(), 10_000);
        let mut handler = CountingHandler {
            fail_update: true,
            ..Default::default()
        };

        let result = run_event_loop(&mut window, &mut handler, &fast_config());

        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(handler.renders, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut window = ScriptedWindow::new(Vec::new(), 0);
        let mut handler = CountingHandler::default();
        let config = Config::default().with_target_fps(-1.0);

        assert!(matches!(
            run_event_loop(&mut window, &mut handler, &config),
            Err(Error::Config(_))
        ));
    }
}
