//! `OutputBuffer`: one frame of escape sequences, flushed in a single write.

use std::io::Write;

/// 24-bit color as written in SGR sequences.
pub type Rgb = [u8; 3];

/// Reused byte buffer for a whole frame.
///
/// Everything is accumulated here and handed to the terminal with one
/// `write_all`, so a frame is never shown half drawn.
pub struct OutputBuffer {
    data: Vec<u8>,
}

impl OutputBuffer {
    /// Buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Buffer sized for a small terminal; grows to fit the first frame.
    pub fn new() -> Self {
        Self::with_capacity(64 * 1024)
    }

    /// Clear the buffer for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Get the buffer contents.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the buffer length.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if buffer is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write raw bytes.
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a string.
    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Write one `char` as UTF-8.
    #[inline]
    pub fn write_char(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.data.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    /// Set foreground color (true color).
    #[inline]
    pub fn set_fg(&mut self, [r, g, b]: Rgb) {
        let _ = write!(self.data, "\x1b[38;2;{r};{g};{b}m");
    }

    /// Set background color (true color).
    #[inline]
    pub fn set_bg(&mut self, [r, g, b]: Rgb) {
        let _ = write!(self.data, "\x1b[48;2;{r};{g};{b}m");
    }

    /// Reset all attributes.
    #[inline]
    pub fn reset_attrs(&mut self) {
        self.data.extend_from_slice(b"\x1b[0m");
    }

    /// Park the cursor at the top-left corner.
    #[inline]
    pub fn cursor_home(&mut self) {
        self.data.extend_from_slice(b"\x1b[0;0H");
    }

    /// Flush to a writer in a single syscall.
    pub fn flush_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.data)?;
        writer.flush()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_sequences() {
        let mut out = OutputBuffer::with_capacity(64);
        out.set_fg([255, 0, 7]);
        out.set_bg([1, 2, 3]);
        out.write_char('▀');
        out.reset_attrs();
        assert_eq!(
            std::str::from_utf8(out.as_bytes()).unwrap(),
            "\x1b[38;2;255;0;7m\x1b[48;2;1;2;3m▀\x1b[0m"
        );
    }

    #[test]
    fn test_flush_writes_everything_once() {
        let mut out = OutputBuffer::new();
        out.write_str("abc");
        out.cursor_home();
        let mut sink = Vec::new();
        out.flush_to(&mut sink).unwrap();
        assert_eq!(sink, b"abc\x1b[0;0H");
        out.clear();
        assert!(out.is_empty());
    }
}
