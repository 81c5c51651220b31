//! # Termarch
//!
//! A ray-marched 3D renderer and input engine for text terminals.
//!
//! Termarch renders a small signed-distance-field scene (a ball, two paddles
//! and a glass court) into an RGBA raster, then packs every 2x2 block of
//! samples into one quadrant-block glyph with a foreground and background
//! color. Input comes from the terminal itself plus a window-system backend
//! that reports pixel-accurate pointer positions.
//!
//! ## Core Concepts
//!
//! - **Shared state**: one mutex-guarded snapshot read by the render thread
//!   and written by game logic and input handlers
//! - **Fill paths**: a rayon CPU marcher, and an optional wgpu compute device
//! - **Quadrant compositor**: one `write_all` per frame, suppressed across resizes
//! - **Calibration**: terminal click reports paired with pointer pixels to fit
//!   the cell grid inside the window
//!
//! ## Example
//!
//! ```rust,ignore
//! use termarch::{accel::{DeviceList, Dispatcher}, EngineConfig, EngineContext, EventSource,
//!                GameState, RenderActor, RenderLoop};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let state = Arc::new(GameState::default());
//! let events = EventSource::open(&config)?;
//! let dispatcher = Dispatcher::new(DeviceList::enumerate(), &config.program_path);
//! let ctx = EngineContext::new(config, Arc::clone(&state), events, dispatcher);
//! let actor = RenderActor::spawn(RenderLoop::new(ctx));
//! state.set_running(true);
//! actor.join()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod accel;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod raster;
pub mod render;
pub mod scene;
pub mod state;
pub mod terminal;

// Re-exports for convenience
pub use calibration::CoordinateModel;
pub use config::{BackendPreference, BridgeConfig, EngineConfig};
pub use error::{EngineError, Result};
pub use input::{EventKind, EventSource, InputEvent, KeyCode, KeyModifiers};
pub use raster::Raster;
pub use render::{EngineContext, FrameOutcome, RenderActor, RenderLoop};
pub use scene::SceneDescription;
pub use state::{GameState, GameStateSnapshot, MenuState, PlayerMode};
pub use terminal::{Compositor, TerminalSession};
