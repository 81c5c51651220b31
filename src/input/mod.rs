//! Event source: native window events, bridge events and terminal mouse
//! reports normalized into one handler-registration model.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Terminal- ┌─────────────────────────────────────┐
//! │ crossterm    │  Input     │                                     │
//! │ event thread │ ─────────▶ │            EventSource              │
//! └──────────────┘            │                                     │
//! ┌──────────────┐  String    │  pump(): drain ─▶ handler           │
//! │ bridge pipes │ ─────────▶ │                                     │
//! └──────────────┘            │  calibration updated on each click  │
//! ┌──────────────┐  poll      │                                     │
//! │ X11 socket   │ ◀───────── │                                     │
//! └──────────────┘            └─────────────────────────────────────┘
//! ```
//!
//! Pumping never blocks: every blocking source is read by a reader thread
//! into a channel, and the X11 connection is polled.

pub mod bridge;
mod event;
pub mod native;
pub mod reader;
mod registry;
pub mod terminal_events;

pub use bridge::BridgeBackend;
pub use event::{EventKind, InputEvent, Key, KeyCode, KeyModifiers, MouseButton, MouseEvent, Subscription};
pub use native::NativeBackend;
pub use registry::{Handler, HandlerRegistry};

use crate::calibration::CoordinateModel;
use crate::config::{BackendPreference, EngineConfig};
use crate::error::{EngineError, Result};
use crate::terminal::{ResizeFlag, DISABLE_MOUSE_TRACKING, ENABLE_MOUSE_TRACKING};
use crossbeam_channel::{unbounded, Receiver};
use glam::{IVec2, UVec2, Vec2};
use std::io::Write;
use std::time::Duration;
use terminal_events::{MouseReport, TerminalEventActor, TerminalInput};
use tracing::{debug, info, warn};

const TERMINAL_POLL_TIMEOUT: Duration = Duration::from_millis(50);


/// The windowing backend selected at startup.
pub enum Backend {
    /// X11 connection.
    Native(NativeBackend),
    /// Helper processes.
    Bridge(BridgeBackend),
}

impl Backend {
    /// Open a backend according to `preference`.
    pub fn open(preference: BackendPreference, config: &EngineConfig) -> Result<Self> {
        match preference {
            BackendPreference::Native => NativeBackend::connect().map(Self::Native),
            BackendPreference::Bridge => BridgeBackend::spawn(&config.bridge).map(Self::Bridge),
            BackendPreference::Auto => match NativeBackend::connect() {
                Ok(native) => Ok(Self::Native(native)),
                Err(native_err) => {
                    info!(
                        error = %native_err,
                        wsl_interop = bridge::wsl_interop_available(),
                        "native backend unavailable, trying bridge"
                    );
                    BridgeBackend::spawn(&config.bridge)
                        .map(Self::Bridge)
                        .map_err(|bridge_err| EngineError::NoBackend {
                            native: native_err.to_string(),
                            bridge: bridge_err.to_string(),
                        })
                }
            },
        }
    }

    /// Short backend name for logs and errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Bridge(_) => "bridge",
        }
    }

    /// Pointer relative to the terminal window.
    pub fn pointer(&mut self) -> Option<IVec2> {
        match self {
            Self::Native(native) => native.pointer(),
            Self::Bridge(bridge) => bridge.pointer(),
        }
    }

    /// Window top-left corner in screen pixels.
    pub fn window_origin(&mut self) -> Option<IVec2> {
        match self {
            Self::Native(native) => native.window_origin(),
            Self::Bridge(bridge) => bridge.window_origin(),
        }
    }

    /// Window size in pixels.
    pub fn window_size(&mut self) -> Option<IVec2> {
        match self {
            Self::Native(native) => native.window_size(),
            Self::Bridge(bridge) => bridge.window_size(),
        }
    }

    fn unsupported(&self, operation: &'static str) -> EngineError {
        EngineError::Unsupported {
            operation,
            backend: self.name(),
        }
    }

    /// Route all keyboard input to this process.
    pub fn grab_keyboard(&mut self) -> Result<()> {
        match self {
            Self::Native(native) => native.grab_keyboard(),
            Self::Bridge(_) => Err(self.unsupported("grab_keyboard")),
        }
    }

    /// Release the keyboard grab.
    pub fn ungrab_keyboard(&mut self) -> Result<()> {
        match self {
            Self::Native(native) => native.ungrab_keyboard(),
            Self::Bridge(_) => Err(self.unsupported("ungrab_keyboard")),
        }
    }

    /// Route all pointer input to this process.
    pub fn grab_mouse(&mut self) -> Result<()> {
        match self {
            Self::Native(native) => native.grab_mouse(),
            Self::Bridge(_) => Err(self.unsupported("grab_mouse")),
        }
    }

    /// Release the pointer grab.
    pub fn ungrab_mouse(&mut self) -> Result<()> {
        match self {
            Self::Native(native) => native.ungrab_mouse(),
            Self::Bridge(_) => Err(self.unsupported("ungrab_mouse")),
        }
    }

    fn set_subscriptions(&mut self, subscriptions: Subscription) -> Result<()> {
        let windowing = subscriptions - Subscription::MOUSE_TRACKING;
        match self {
            Self::Native(native) => native.set_subscriptions(windowing),
            Self::Bridge(bridge) => bridge.set_subscriptions(windowing),
        }
    }

    fn poll(&mut self, out: &mut Vec<InputEvent>) -> Result<()> {
        match self {
            Self::Native(native) => native.poll(out),
            Self::Bridge(bridge) => {
                bridge.poll(out);
                Ok(())
            }
        }
    }
}

/// What a handler may touch while it runs.
pub struct InputControl<'a> {
    backend: &'a mut Backend,
    calibration: &'a CoordinateModel,
}

impl InputControl<'_> {
    /// Current calibration model.
    pub const fn calibration(&self) -> &CoordinateModel {
        self.calibration
    }

    /// Pointer relative to the terminal window.
    pub fn pointer(&mut self) -> Option<IVec2> {
        self.backend.pointer()
    }

    /// Pointer position mapped to fractional cells.
    pub fn pointer_cell(&mut self) -> Option<Vec2> {
        let pixel = self.backend.pointer()?;
        Some(self.calibration.pixel_to_cell(pixel.as_vec2()))
    }

    /// See [`Backend::grab_keyboard`].
    pub fn grab_keyboard(&mut self) -> Result<()> {
        self.backend.grab_keyboard()
    }

    /// See [`Backend::ungrab_keyboard`].
    pub fn ungrab_keyboard(&mut self) -> Result<()> {
        self.backend.ungrab_keyboard()
    }

    /// See [`Backend::grab_mouse`].
    pub fn grab_mouse(&mut self) -> Result<()> {
        self.backend.grab_mouse()
    }

    /// See [`Backend::ungrab_mouse`].
    pub fn ungrab_mouse(&mut self) -> Result<()> {
        self.backend.ungrab_mouse()
    }
}

/// Event source owned by the render thread.
pub struct EventSource {
    backend: Backend,
    registry: HandlerRegistry,
    calibration: CoordinateModel,
    terminal: UVec2,
    terminal_input: Option<Receiver<TerminalInput>>,
    _terminal_actor: Option<TerminalEventActor>,
    resize: ResizeFlag,
    tty: Box<dyn Write + Send>,
    active: Subscription,
    pending: Vec<InputEvent>,
}

impl EventSource {
    /// Open the configured backend and start polling terminal events.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let backend = Backend::open(config.backend, config)?;
        info!(backend = backend.name(), "event source opened");
        let (tx, rx) = unbounded();
        let terminal = crate::terminal::terminal_size();
        let mut source = Self::with_backend(backend, Some(rx), Box::new(std::io::stdout()), terminal);
        source._terminal_actor = Some(TerminalEventActor::spawn(
            tx,
            source.resize.clone(),
            TERMINAL_POLL_TIMEOUT,
        ));
        Ok(source)
    }

    /// Assemble from parts; `tty` receives mouse-tracking escapes.
    pub fn with_backend(
        backend: Backend,
        terminal_input: Option<Receiver<TerminalInput>>,
        tty: Box<dyn Write + Send>,
        terminal: UVec2,
    ) -> Self {
        Self {
            backend,
            registry: HandlerRegistry::new(),
            calibration: CoordinateModel::new(terminal),
            terminal,
            terminal_input,
            _terminal_actor: None,
            resize: ResizeFlag::new(),
            tty,
            active: Subscription::empty(),
            pending: Vec::new(),
        }
    }

    /// Active backend.
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Calibration model fed by mouse clicks.
    pub const fn calibration(&self) -> &CoordinateModel {
        &self.calibration
    }

    /// Flag raised by the terminal event thread whenever the terminal resizes.
    pub fn resize_flag(&self) -> ResizeFlag {
        self.resize.clone()
    }

    /// Terminal size in cells as last reported.
    pub const fn terminal_size(&self) -> UVec2 {
        self.terminal
    }

    /// Record a new terminal size; discards calibration if it changed.
    pub fn set_terminal_size(&mut self, terminal: UVec2) {
        self.terminal = terminal;
        self.calibration.ensure_terminal(terminal);
    }

    /// Install, replace (`Some`) or remove (`None`) the handler for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Option<Handler>) -> Result<()> {
        self.registry.set(kind, handler);
        self.apply_subscriptions()
    }

    /// Shorthand for registering a closure.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Result<()>
    where
        F: FnMut(&InputEvent, &mut InputControl<'_>) + Send + 'static,
    {
        self.register(kind, Some(Box::new(handler)))
    }

    fn apply_subscriptions(&mut self) -> Result<()> {
        let wanted = self.registry.subscriptions();
        let tracking = Subscription::MOUSE_TRACKING;
        if wanted.contains(tracking) != self.active.contains(tracking) {
            let escapes = if wanted.contains(tracking) {
                ENABLE_MOUSE_TRACKING
            } else {
                DISABLE_MOUSE_TRACKING
            };
            self.tty.write_all(escapes)?;
            self.tty.flush()?;
            debug!(enabled = wanted.contains(tracking), "terminal mouse tracking");
        }
        self.backend.set_subscriptions(wanted)?;
        self.active = wanted;
        Ok(())
    }

    /// Drain every source and run handlers; returns how many ran.
    pub fn pump(&mut self) -> Result<usize> {
        let mut events = std::mem::take(&mut self.pending);
        events.clear();

        self.drain_terminal(&mut events);
        self.backend.poll(&mut events)?;

        for event in &events {
            if let InputEvent::WindowResize { origin, size } = event {
                self.calibration.set_window(Some(*origin), Some(*size));
            }
        }

        let mut control = InputControl {
            backend: &mut self.backend,
            calibration: &self.calibration,
        };
        let dispatched = events
            .iter()
            .filter(|event| self.registry.dispatch(event, &mut control))
            .count();

        self.pending = events;
        Ok(dispatched)
    }

    // Keystrokes from the terminal are only used on the bridge; the native
    // backend reports keys itself.
    fn drain_terminal(&mut self, events: &mut Vec<InputEvent>) {
        let Some(terminal_input) = &self.terminal_input else { return };
        let keys = matches!(self.backend, Backend::Bridge(_));
        let inputs: Vec<TerminalInput> = terminal_input.try_iter().collect();
        for input in inputs {
            match input {
                TerminalInput::Key(key) if keys => events.push(InputEvent::KeyDown(key)),
                TerminalInput::Key(_) => {}
                TerminalInput::Mouse(report) => {
                    let event = self.resolve_click(report);
                    events.push(event);
                }
            }
        }
    }

    // Pair a terminal click with the pointer pixel and feed calibration.
    fn resolve_click(&mut self, report: MouseReport) -> InputEvent {
        let pixel = self.backend.pointer();
        let window = self.backend.window_size();
        if let Some(pixel) = pixel {
            self.calibration.observe(self.terminal, window, report.cell, pixel);
        } else {
            self.calibration.set_window(None, window);
        }
        let mouse = MouseEvent {
            cell: report.cell,
            button: report.button,
            pixel,
        };
        if report.pressed {
            InputEvent::MousePress(mouse)
        } else {
            InputEvent::MouseRelease(mouse)
        }
    }

    /// Pointer relative to the terminal window.
    pub fn pointer(&mut self) -> Option<IVec2> {
        self.backend.pointer()
    }

    /// Window origin in screen pixels.
    pub fn window_origin(&mut self) -> Option<IVec2> {
        self.backend.window_origin()
    }

    /// Window size in pixels.
    pub fn window_size(&mut self) -> Option<IVec2> {
        self.backend.window_size()
    }

    /// See [`Backend::grab_keyboard`].
    pub fn grab_keyboard(&mut self) -> Result<()> {
        self.backend.grab_keyboard()
    }

    /// See [`Backend::ungrab_keyboard`].
    pub fn ungrab_keyboard(&mut self) -> Result<()> {
        self.backend.ungrab_keyboard()
    }

    /// See [`Backend::grab_mouse`].
    pub fn grab_mouse(&mut self) -> Result<()> {
        self.backend.grab_mouse()
    }

    /// See [`Backend::ungrab_mouse`].
    pub fn ungrab_mouse(&mut self) -> Result<()> {
        self.backend.ungrab_mouse()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if self.active.contains(Subscription::MOUSE_TRACKING) {
            let _ = self.tty.write_all(DISABLE_MOUSE_TRACKING);
            let _ = self.tty.flush();
        }
        if let Err(e) = self.backend.set_subscriptions(Subscription::empty()) {
            warn!(error = %e, "failed to clear event subscriptions");
        }
    }
}
