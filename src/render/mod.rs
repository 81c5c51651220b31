//! Render thread: the per-frame loop tying input, the marcher and the
//! compositor together.
//!
//! ```text
//!            Arc<GameState>
//!   logic ──────────────────────┐
//!   thread                      ▼
//!                      ┌──────────────────┐
//!                      │   RenderLoop     │
//!                      │  begin_frame()   │
//!                      │  pump events     │
//!                      │  fill raster ────┼──▶ Dispatcher (CPU / device)
//!                      │  build overlay   │
//!                      │  draw ───────────┼──▶ Compositor ──▶ terminal
//!                      └──────────────────┘
//! ```

pub mod menu;

pub use menu::{build_overlay, hit_test, install_menu_handlers, MenuInput};

use crate::accel::{Dispatcher, Frame};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::input::EventSource;
use crate::raster::Raster;
use crate::scene::SceneDescription;
use crate::state::GameState;
use crate::terminal::{self, Compositor};
use glam::UVec2;
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Writer the compositor draws to.
pub type FrameWriter = Box<dyn Write + Send>;

/// Reports the terminal size in cells.
pub type SizeQuery = Box<dyn FnMut() -> UVec2 + Send>;

/// Everything the render thread owns.
pub struct EngineContext {
    /// Engine settings.
    pub config: EngineConfig,
    /// State shared with the logic thread.
    pub state: Arc<GameState>,
    /// Input events and calibration.
    pub events: EventSource,
    /// Raster fill paths.
    pub dispatcher: Dispatcher,
    /// Frame output.
    pub compositor: Compositor<FrameWriter>,
    /// Terminal size source.
    pub size_query: SizeQuery,
}

impl EngineContext {
    /// Context drawing to standard output and probing the real terminal.
    ///
    /// The compositor shares the event source's resize flag, so a resize
    /// reported while a frame is being rendered drops that frame.
    pub fn new(config: EngineConfig, state: Arc<GameState>, events: EventSource, dispatcher: Dispatcher) -> Self {
        let resize = events.resize_flag();
        Self {
            config,
            state,
            events,
            dispatcher,
            compositor: Compositor::new(Box::new(std::io::stdout()), resize),
            size_query: Box::new(terminal::terminal_size),
        }
    }
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Exit was requested.
    Exit,
    /// Nothing drawn: not running or waiting for a resize to settle.
    Idle,
    /// A frame reached the terminal.
    Drawn,
    /// A frame was composed but dropped because the terminal resized while
    /// it was being produced.
    Suppressed,
}

/// The per-frame loop.
pub struct RenderLoop {
    ctx: EngineContext,
    raster: Raster,
    terminal: UVec2,
    device_names: Vec<String>,
}

impl RenderLoop {
    /// Prepare the loop; the first frame does not wait for resize settling.
    pub fn new(mut ctx: EngineContext) -> Self {
        let terminal = (ctx.size_query)();
        ctx.events.set_terminal_size(terminal);
        let settled = ctx.config.resize_settle_frames.saturating_add(1);
        ctx.state.update(|s| s.resize_settle = s.resize_settle.max(settled));
        let device_names = ctx.dispatcher.devices().names();
        Self {
            ctx,
            raster: Raster::new(0, 0),
            terminal,
            device_names,
        }
    }

    /// Owned context.
    pub const fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Run one iteration without sleeping.
    pub fn frame(&mut self) -> Result<FrameOutcome> {
        if self.ctx.state.begin_frame().exit {
            return Ok(FrameOutcome::Exit);
        }

        self.ctx.events.pump()?;

        let terminal = (self.ctx.size_query)();
        if terminal != self.terminal {
            debug!(columns = terminal.x, rows = terminal.y, "terminal resized");
            self.terminal = terminal;
            self.ctx.events.set_terminal_size(terminal);
            self.ctx.state.reset_resize_settle();
            // Nothing was rendered for the old size, so a pending flag is stale.
            self.ctx.compositor.resize_flag().take();
            return Ok(FrameOutcome::Idle);
        }

        let snapshot = self.ctx.state.snapshot();
        if snapshot.exit {
            return Ok(FrameOutcome::Exit);
        }
        if !snapshot.running || snapshot.resize_settle <= self.ctx.config.resize_settle_frames {
            return Ok(FrameOutcome::Idle);
        }

        let resolution = terminal::raster_resolution(terminal);
        self.raster.resize(resolution.x, resolution.y);
        let frame = Frame {
            scene: SceneDescription::from(&snapshot),
            char_height: self.ctx.events.calibration().cell_aspect(),
        };
        self.ctx
            .dispatcher
            .fill_raster_or_cpu(&mut self.raster, &frame, snapshot.selected_accelerator)?;

        let overlay = build_overlay(&snapshot, &self.device_names);
        if (self.ctx.size_query)() != terminal {
            self.ctx.compositor.resize_flag().raise();
        }
        if self.ctx.compositor.draw(&self.raster, Some(&overlay))? {
            Ok(FrameOutcome::Drawn)
        } else {
            Ok(FrameOutcome::Suppressed)
        }
    }

    /// Loop until exit is requested or a fatal error occurs.
    pub fn run(&mut self) -> Result<()> {
        let interval = self.ctx.config.frame_interval();
        info!(fps = self.ctx.config.target_fps, "render loop started");
        loop {
            match self.frame() {
                Ok(FrameOutcome::Exit) => break,
                Ok(_) => thread::sleep(interval),
                Err(e) => {
                    error!(error = %e, "render loop stopped");
                    self.ctx.state.request_exit();
                    return Err(e);
                }
            }
        }
        info!(frames = self.ctx.compositor.stats().frames, "render loop finished");
        Ok(())
    }
}

/// Render loop on its own thread.
pub struct RenderActor {
    handle: Option<JoinHandle<Result<()>>>,
    state: Arc<GameState>,
}

impl RenderActor {
    /// Spawn the render thread.
    pub fn spawn(render_loop: RenderLoop) -> Self {
        let state = Arc::clone(&render_loop.ctx.state);
        let mut render_loop = render_loop;
        let handle = thread::Builder::new()
            .name("termarch-render".to_string())
            .spawn(move || render_loop.run())
            .expect("Failed to spawn render thread");

        Self {
            handle: Some(handle),
            state,
        }
    }

    /// Ask the loop to stop after the current frame.
    pub fn request_exit(&self) {
        self.state.request_exit();
    }

    /// Wait for the thread and return its result.
    pub fn join(mut self) -> Result<()> {
        self.wait()
    }

    fn wait(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| EngineError::Io(std::io::Error::other("render thread panicked")))?,
            None => Ok(()),
        }
    }
}

impl Drop for RenderActor {
    fn drop(&mut self) {
        self.state.request_exit();
        let _ = self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::DeviceList;
    use crate::input::{Backend, BridgeBackend};
    use crate::state::{GameStateSnapshot, PlayerMode};
    use crossbeam_channel::unbounded;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<u8>>>);

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        render_loop: RenderLoop,
        state: Arc<GameState>,
        screen: Recorder,
        size: Arc<Mutex<UVec2>>,
        // Sizes reported by the next size checks, before falling back to `size`.
        scripted: Arc<Mutex<VecDeque<UVec2>>>,
    }

    fn harness(snapshot: GameStateSnapshot) -> Harness {
        let (_, query_rx) = unbounded();
        let (_, events_rx) = unbounded();
        let bridge = BridgeBackend::from_channels(
            Box::new(std::io::sink()),
            query_rx,
            Box::new(std::io::sink()),
            events_rx,
            Duration::from_millis(1),
        );
        let events = EventSource::with_backend(Backend::Bridge(bridge), None, Box::new(std::io::sink()), UVec2::new(80, 24));
        let state = Arc::new(GameState::new(snapshot));
        let screen = Recorder::default();
        let size = Arc::new(Mutex::new(UVec2::new(80, 24)));
        let scripted = Arc::new(Mutex::new(VecDeque::new()));
        let current = Arc::clone(&size);
        let queued = Arc::clone(&scripted);

        let ctx = EngineContext {
            config: EngineConfig::default(),
            state: Arc::clone(&state),
            events,
            dispatcher: Dispatcher::new(DeviceList::cpu_only(), "shaders/frag.wgsl"),
            compositor: Compositor::new(Box::new(screen.clone()), terminal::ResizeFlag::new()),
            size_query: Box::new(move || {
                let next = queued.lock().unwrap().pop_front();
                match next {
                    Some(size) => {
                        *current.lock().unwrap() = size;
                        size
                    }
                    None => *current.lock().unwrap(),
                }
            }),
        };
        Harness {
            render_loop: RenderLoop::new(ctx),
            state,
            screen,
            size,
            scripted,
        }
    }

    fn playing() -> GameStateSnapshot {
        GameStateSnapshot {
            player: PlayerMode::PlayerOne,
            running: true,
            ..GameStateSnapshot::default()
        }
    }

    #[test]
    fn test_first_frame_draws_without_settling() {
        let mut h = harness(playing());
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Drawn);

        let written = h.screen.0.lock().unwrap().clone();
        assert!(!written.is_empty());
        assert!(written.ends_with(b"\x1b[0m\x1b[0;0H"));

        let mut parser = vt100::Parser::new(24, 80, 0);
        parser.process(&written);
        let first_row = parser.screen().contents_between(0, 0, 0, 80);
        assert!(first_row.starts_with("Select hardware accelerator"));
    }

    #[test]
    fn test_idle_while_not_running() {
        let mut h = harness(GameStateSnapshot::default());
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Idle);
        assert!(h.screen.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exit_flag_stops() {
        let mut h = harness(playing());
        h.state.request_exit();
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Exit);
        assert!(h.render_loop.run().is_ok());
    }

    fn rows_written(h: &Harness) -> usize {
        let written = h.screen.0.lock().unwrap().clone();
        written.windows(2).filter(|w| w == b"\r\n").count()
    }

    #[test]
    fn test_resize_waits_then_draws_at_new_size() {
        let mut h = harness(playing());
        *h.size.lock().unwrap() = UVec2::new(40, 12);
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Idle);
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Idle);
        assert!(h.screen.0.lock().unwrap().is_empty());

        h.state.update(|s| s.resize_settle = 100);
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Drawn);
        assert_eq!(rows_written(&h), 11);
    }

    #[test]
    fn test_size_change_during_frame_suppresses_it() {
        let mut h = harness(playing());
        h.scripted
            .lock()
            .unwrap()
            .extend([UVec2::new(80, 24), UVec2::new(40, 12)]);
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Suppressed);
        assert!(h.screen.0.lock().unwrap().is_empty());

        // The next frame notices the new size and waits for it to settle.
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Idle);
        h.state.update(|s| s.resize_settle = 100);
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Drawn);
        assert_eq!(rows_written(&h), 11);
    }

    #[test]
    fn test_resize_event_drops_frame_in_flight() {
        let mut h = harness(playing());
        h.render_loop.context().compositor.resize_flag().raise();
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Suppressed);
        assert!(h.screen.0.lock().unwrap().is_empty());
        assert_eq!(h.render_loop.frame().unwrap(), FrameOutcome::Drawn);
    }

    #[test]
    fn test_actor_joins_after_exit() {
        let h = harness(GameStateSnapshot::default());
        let actor = RenderActor::spawn(h.render_loop);
        h.state.request_exit();
        assert!(actor.join().is_ok());
    }
}
