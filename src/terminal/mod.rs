//! Terminal output: frame composition, the output buffer and mode setup.

mod compositor;
mod output;
mod session;

pub use compositor::{quantize, Block, Compositor, CompositorStats, ResizeFlag, GLYPHS};
pub use output::{OutputBuffer, Rgb};
pub use session::{
    raster_resolution, terminal_size, TerminalSession, DISABLE_MOUSE_TRACKING, ENABLE_MOUSE_TRACKING,
};
