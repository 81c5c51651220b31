//! Half-block compositor.
//!
//! Every terminal cell shows a 2x2 block of raster samples with one glyph,
//! a foreground and a background color. Samples are split into a bright and
//! a dark group, each group is averaged, and the glyph covering the bright
//! quadrants is picked from [`GLYPHS`].
//!
//! An optional overlay string (plain text with SGR color escapes) replaces
//! glyphs cell by cell; `\n` in the overlay ends the text for that row.

use super::output::{OutputBuffer, Rgb};
use crate::raster::Raster;
use glam::{Vec3, Vec4};
use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Glyph for each quadrant mask; bit 0 top-left, 1 top-right, 2 bottom-left,
/// 3 bottom-right.
pub const GLYPHS: [char; 16] = [
    ' ', '▘', '▝', '▀', '▖', '▌', '▞', '▛', '▗', '▚', '▐', '▜', '▄', '▙', '▟', '█',
];

const ROW_SEPARATOR: &[u8] = b"\r\n";

/// Shared "terminal size changed" flag.
///
/// Raised by whoever notices the resize; the compositor clears it and skips
/// the frame that was rendered for the old size.
#[derive(Debug, Clone, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    /// Lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the next frame as stale.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a resize is pending.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// One quantized cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Quadrant glyph.
    pub glyph: char,
    /// Color of the covered quadrants.
    pub fg: Rgb,
    /// Color of the rest.
    pub bg: Rgb,
}

#[inline]
fn to_rgb(color: Vec3) -> Rgb {
    let c = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    [c.x as u8, c.y as u8, c.z as u8]
}

/// Quantize samples ordered top-left, top-right, bottom-left, bottom-right.
pub fn quantize(samples: [Vec4; 4]) -> Block {
    let colors = samples.map(|s| s.truncate().clamp(Vec3::ZERO, Vec3::ONE));
    let values = colors.map(|c| c.element_sum() / 3.0);
    let max = values.iter().copied().fold(f32::MIN, f32::max);
    let min = values.iter().copied().fold(f32::MAX, f32::min);

    let mut mask = 0;
    let (mut front, mut back) = (Vec3::ZERO, Vec3::ZERO);
    let (mut front_count, mut back_count) = (0u8, 0u8);
    for (i, (color, value)) in colors.iter().zip(values).enumerate() {
        if max - value <= value - min {
            mask |= 1 << i;
            front += *color;
            front_count += 1;
        } else {
            back += *color;
            back_count += 1;
        }
    }

    let front = (front_count > 0).then(|| front / f32::from(front_count));
    let back = (back_count > 0).then(|| back / f32::from(back_count));
    let (fg, bg) = match (front, back) {
        (Some(f), Some(b)) => (f, b),
        (Some(f), None) => (f, f),
        (None, Some(b)) => (b, b),
        (None, None) => (Vec3::ZERO, Vec3::ZERO),
    };
    Block {
        glyph: GLYPHS[mask],
        fg: to_rgb(fg),
        bg: to_rgb(bg),
    }
}

/// Counters for profiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositorStats {
    /// Frames written.
    pub frames: u64,
    /// Frames dropped because of a pending resize.
    pub suppressed: u64,
    /// Bytes handed to the terminal.
    pub bytes_written: u64,
    /// Last compose time in microseconds.
    pub last_compose_us: u64,
}

/// Turns rasters into terminal frames.
pub struct Compositor<W: Write = Stdout> {
    out: W,
    buffer: OutputBuffer,
    resize: ResizeFlag,
    stats: CompositorStats,
}

impl Compositor<Stdout> {
    /// Compositor drawing to standard output.
    pub fn stdout(resize: ResizeFlag) -> Self {
        Self::new(io::stdout(), resize)
    }
}

impl<W: Write> Compositor<W> {
    /// Compositor drawing to `out`.
    pub fn new(out: W, resize: ResizeFlag) -> Self {
        Self {
            out,
            buffer: OutputBuffer::new(),
            resize,
            stats: CompositorStats::default(),
        }
    }

    /// Handle to the pending-resize flag.
    pub fn resize_flag(&self) -> ResizeFlag {
        self.resize.clone()
    }

    /// Profiling counters.
    pub const fn stats(&self) -> &CompositorStats {
        &self.stats
    }

    /// Underlying writer.
    pub const fn writer(&self) -> &W {
        &self.out
    }

    /// Build the frame bytes without writing them.
    pub fn compose(&mut self, raster: &Raster, overlay: Option<&str>) -> &[u8] {
        let start = Instant::now();
        self.buffer.clear();
        let columns = raster.width() / 2;
        let rows = raster.height() / 2;
        let mut text = overlay.unwrap_or("");

        for row in 0..rows {
            if row > 0 {
                self.buffer.write_raw(ROW_SEPARATOR);
            }
            if !text.is_empty() {
                self.buffer.reset_attrs();
            }
            let mut line_ended = false;
            let mut covered = 0;
            for column in 0..columns {
                if covered > 0 {
                    covered -= 1;
                    continue;
                }
                if !line_ended {
                    text = self.copy_escapes(text);
                    if let Some(rest) = text.strip_prefix('\n') {
                        line_ended = true;
                        text = rest;
                    }
                }
                if !line_ended {
                    if let Some(grapheme) = text.graphemes(true).next() {
                        self.buffer.write_str(grapheme);
                        text = &text[grapheme.len()..];
                        covered = grapheme.width().saturating_sub(1);
                        continue;
                    }
                }
                self.write_block(raster, column, row);
            }
        }

        self.buffer.reset_attrs();
        self.buffer.cursor_home();
        self.stats.last_compose_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.buffer.as_bytes()
    }

    // Copy leading `ESC ... m` sequences into the frame.
    fn copy_escapes<'t>(&mut self, mut text: &'t str) -> &'t str {
        while text.starts_with('\x1b') {
            let end = text.find('m').map_or(text.len(), |i| i + 1);
            self.buffer.write_str(&text[..end]);
            text = &text[end..];
        }
        text
    }

    fn write_block(&mut self, raster: &Raster, column: u32, row: u32) {
        let (x, y) = (column * 2, row * 2);
        let sample = |dx, dy| raster.get(x + dx, y + dy).unwrap_or(Vec4::ZERO);
        let block = quantize([sample(0, 0), sample(1, 0), sample(0, 1), sample(1, 1)]);
        self.buffer.set_fg(block.fg);
        self.buffer.set_bg(block.bg);
        self.buffer.write_char(block.glyph);
    }

    /// Compose and write the frame with one `write_all`.
    ///
    /// Returns `false` without writing when a resize was pending, since the
    /// raster was sized for the old terminal.
    pub fn draw(&mut self, raster: &Raster, overlay: Option<&str>) -> io::Result<bool> {
        self.compose(raster, overlay);
        if self.resize.take() {
            self.stats.suppressed += 1;
            return Ok(false);
        }
        self.buffer.flush_to(&mut self.out)?;
        self.stats.frames += 1;
        self.stats.bytes_written += self.buffer.len() as u64;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, color: Vec4) -> Raster {
        let mut raster = Raster::new(width, height);
        raster.fill(color);
        raster
    }

    fn text(bytes: &[u8]) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_uniform_block_is_full() {
        let block = quantize([Vec4::new(0.5, 0.25, 1.0, 1.0); 4]);
        assert_eq!(block.glyph, '█');
        assert_eq!(block.fg, block.bg);
        assert_eq!(block.fg, [127, 63, 255]);
    }

    #[test]
    fn test_bright_top_half() {
        let white = Vec4::ONE;
        let black = Vec4::new(0.0, 0.0, 0.0, 1.0);
        let block = quantize([white, white, black, black]);
        assert_eq!(block.glyph, '▀');
        assert_eq!(block.fg, [255, 255, 255]);
        assert_eq!(block.bg, [0, 0, 0]);
    }

    #[test]
    fn test_single_bright_quadrant() {
        let dark = Vec4::new(0.1, 0.1, 0.1, 1.0);
        let block = quantize([dark, dark, dark, Vec4::ONE]);
        assert_eq!(block.glyph, '▗');
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let block = quantize([Vec4::new(4.0, -1.0, 0.5, 1.0); 4]);
        assert_eq!(block.fg, [255, 0, 127]);
    }

    #[test]
    fn test_frame_layout() {
        let raster = uniform(6, 4, Vec4::ONE);
        let mut compositor = Compositor::new(Vec::new(), ResizeFlag::new());
        let frame = text(compositor.compose(&raster, None)).to_string();
        let cell = "\x1b[38;2;255;255;255m\x1b[48;2;255;255;255m█";
        let row = cell.repeat(3);
        assert_eq!(frame, format!("{row}\r\n{row}\x1b[0m\x1b[0;0H"));
    }

    #[test]
    fn test_overlay_replaces_glyphs() {
        let raster = uniform(8, 4, Vec4::ONE);
        let mut compositor = Compositor::new(Vec::new(), ResizeFlag::new());
        let frame = text(compositor.compose(&raster, Some("\x1b[0;36mHi\nX"))).to_string();
        let cell = "\x1b[38;2;255;255;255m\x1b[48;2;255;255;255m█";
        let expected = format!(
            "\x1b[0m\x1b[0;36mHi{}\r\n\x1b[0mX{}\x1b[0m\x1b[0;0H",
            cell.repeat(2),
            cell.repeat(3)
        );
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_resize_suppresses_write() {
        let raster = uniform(4, 4, Vec4::ONE);
        let flag = ResizeFlag::new();
        let mut compositor = Compositor::new(Vec::new(), flag.clone());

        flag.raise();
        assert!(!compositor.draw(&raster, None).unwrap());
        assert!(compositor.writer().is_empty());
        assert!(!flag.is_raised());

        assert!(compositor.draw(&raster, None).unwrap());
        assert!(compositor.writer().ends_with(b"\x1b[0m\x1b[0;0H"));
        assert_eq!(compositor.stats().frames, 1);
        assert_eq!(compositor.stats().suppressed, 1);
    }

    #[test]
    fn test_emulated_screen() {
        let mut raster = uniform(8, 4, Vec4::new(0.0, 0.0, 0.0, 1.0));
        raster.set(6, 2, Vec4::ONE);
        let mut compositor = Compositor::new(Vec::new(), ResizeFlag::new());
        compositor.draw(&raster, Some("\x1b[0;31mEx\n")).unwrap();

        let mut parser = vt100::Parser::new(2, 4, 0);
        parser.process(compositor.writer());
        let screen = parser.screen();
        assert_eq!(screen.cell(0, 0).unwrap().contents(), "E");
        assert_eq!(screen.cell(0, 1).unwrap().contents(), "x");
        assert_eq!(screen.cell(0, 0).unwrap().fgcolor(), vt100::Color::Idx(1));
        assert_eq!(screen.cell(1, 3).unwrap().contents(), "▘");
        assert_eq!(screen.cell(1, 3).unwrap().fgcolor(), vt100::Color::Rgb(255, 255, 255));
        assert_eq!(screen.cursor_position(), (0, 0));
    }
}
