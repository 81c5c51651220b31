//! Terminal mode setup and teardown.

use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use glam::UVec2;
use std::io::{self, Write};

/// Turn on button reports in the urxvt encoding.
pub const ENABLE_MOUSE_TRACKING: &[u8] = b"\x1b[?1000h\x1b[?1015h";
/// Turn button reports off again.
pub const DISABLE_MOUSE_TRACKING: &[u8] = b"\x1b[?1000l\x1b[?1015l";

/// Terminal size in cells, or 80x24 when it cannot be queried.
pub fn terminal_size() -> UVec2 {
    terminal::size().map_or(UVec2::new(80, 24), |(columns, rows)| {
        UVec2::new(u32::from(columns), u32::from(rows))
    })
}

/// Raster resolution for a terminal of `cells`: two samples per cell each way.
pub const fn raster_resolution(cells: UVec2) -> UVec2 {
    UVec2::new(cells.x * 2, cells.y * 2)
}

/// Raw mode, hidden cursor and optionally the alternate screen for as long
/// as the session lives.
pub struct TerminalSession {
    alternate_screen: bool,
}

impl TerminalSession {
    /// Put the terminal in drawing mode.
    pub fn enter(alternate_screen: bool) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let session = Self { alternate_screen };

        let mut stdout = io::stdout();
        if alternate_screen {
            execute!(stdout, EnterAlternateScreen)?;
        }
        execute!(stdout, cursor::Hide)?;
        Ok(session)
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(DISABLE_MOUSE_TRACKING);
        let _ = stdout.write_all(b"\x1b[0m");
        let _ = execute!(stdout, cursor::Show);
        if self.alternate_screen {
            let _ = execute!(stdout, LeaveAlternateScreen);
        }
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_samples_per_cell() {
        assert_eq!(raster_resolution(UVec2::new(80, 24)), UVec2::new(160, 48));
        assert_eq!(raster_resolution(UVec2::ZERO), UVec2::ZERO);
    }
}
