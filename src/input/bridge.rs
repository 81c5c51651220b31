//! Compatibility bridge backend.
//!
//! When no X server is reachable (typically WSL), two helper processes proxy
//! the host windowing system over pipes:
//!
//! - the query helper answers `m` with `m X Y` (screen pointer) and `w` with
//!   `w L T R B` (window rectangle), or `m error` on failure;
//! - the events helper streams `m X Y` (window-relative pointer),
//!   `w L T R B`, `enter` and `leave`. Control lines `M`/`m`, `W`/`w` and
//!   `E`/`e` switch each stream on and off.
//!
//! Helper stdout is read by [`LineReader`] actors so neither pumping nor
//! queries block longer than the configured response timeout.

use super::event::{InputEvent, Subscription};
use super::reader::LineReader;
use crate::config::BridgeConfig;
use crate::error::{EngineError, Result};
use crossbeam_channel::Receiver;
use glam::IVec2;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Marker file present when running under WSL with Windows interop.
pub const WSL_INTEROP: &str = "/proc/sys/fs/binfmt_misc/WSLInterop";

/// Whether Windows executables can be launched from here.
pub fn wsl_interop_available() -> bool {
    Path::new(WSL_INTEROP).exists()
}

/// One helper: request pipe plus line channel of its replies.
struct Helper {
    input: Box<dyn Write + Send>,
    output: Receiver<String>,
    child: Option<Child>,
    reader: Option<LineReader>,
}

impl Helper {
    fn spawn(path: &Path, name: &str) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Bridge(format!("spawning {}: {e}", path.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Bridge(format!("{name}: no stdin pipe")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Bridge(format!("{name}: no stdout pipe")))?;
        let (reader, output) = LineReader::spawn(name, stdout);
        Ok(Self {
            input: Box::new(stdin),
            output,
            child: Some(child),
            reader: Some(reader),
        })
    }

    fn send(&mut self, line: &str) -> Result<()> {
        self.input.write_all(line.as_bytes())?;
        self.input.write_all(b"\n")?;
        self.input.flush()?;
        Ok(())
    }
}

// Closing stdin lets the helper exit on its own; the kill covers helpers
// that ignore EOF. Either way its stdout closes and the reader ends.
impl Drop for Helper {
    fn drop(&mut self) {
        self.input = Box::new(std::io::sink());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            reader.join();
        }
    }
}

/// Window rectangle as reported by the helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (exclusive).
    pub bottom: i32,
}

impl WindowRect {
    /// Top-left corner.
    pub const fn origin(&self) -> IVec2 {
        IVec2::new(self.left, self.top)
    }

    /// Width and height.
    pub const fn size(&self) -> IVec2 {
        IVec2::new(self.right - self.left, self.bottom - self.top)
    }
}

fn parse_ints<const N: usize>(fields: &[&str]) -> Option<[i32; N]> {
    if fields.len() != N {
        return None;
    }
    let mut out = [0; N];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field.parse().ok()?;
    }
    Some(out)
}

/// Parse `m X Y`.
pub fn parse_pointer(line: &str) -> Option<IVec2> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.split_first() {
        Some((&"m", rest)) => parse_ints::<2>(rest).map(IVec2::from_array),
        _ => None,
    }
}

/// Parse `w L T R B`.
pub fn parse_window(line: &str) -> Option<WindowRect> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.split_first() {
        Some((&"w", rest)) => parse_ints::<4>(rest).map(|[left, top, right, bottom]| WindowRect {
            left,
            top,
            right,
            bottom,
        }),
        _ => None,
    }
}

/// Parse one events-helper line.
pub fn parse_event_line(line: &str) -> Option<InputEvent> {
    match line.trim() {
        "enter" => Some(InputEvent::WindowEnter),
        "leave" => Some(InputEvent::WindowLeave),
        other if other.starts_with("m ") => parse_pointer(other).map(|pixel| InputEvent::MouseMove { pixel }),
        other if other.starts_with("w ") => parse_window(other).map(|rect| InputEvent::WindowResize {
            origin: rect.origin(),
            size: rect.size(),
        }),
        _ => None,
    }
}

/// Helper-process backend.
pub struct BridgeBackend {
    query: Helper,
    events: Helper,
    timeout: Duration,
    subscriptions: Subscription,
}

impl BridgeBackend {
    /// Spawn both helpers.
    pub fn spawn(config: &BridgeConfig) -> Result<Self> {
        let query = Helper::spawn(&config.query_helper, "termarch-bridge-query")?;
        let events = Helper::spawn(&config.events_helper, "termarch-bridge-events")?;
        info!(
            query = %config.query_helper.display(),
            events = %config.events_helper.display(),
            "bridge helpers started"
        );
        Ok(Self {
            query,
            events,
            timeout: config.response_timeout,
            subscriptions: Subscription::empty(),
        })
    }

    /// Build over existing pipes instead of child processes.
    pub fn from_channels(
        query_input: Box<dyn Write + Send>,
        query_output: Receiver<String>,
        events_input: Box<dyn Write + Send>,
        events_output: Receiver<String>,
        timeout: Duration,
    ) -> Self {
        let helper = |input, output| Helper {
            input,
            output,
            child: None,
            reader: None,
        };
        Self {
            query: helper(query_input, query_output),
            events: helper(events_input, events_output),
            timeout,
            subscriptions: Subscription::empty(),
        }
    }

    // Stale replies from timed-out queries are drained first so answers
    // always pair with their request.
    fn request(&mut self, request: &str) -> Option<String> {
        while self.query.output.try_recv().is_ok() {}
        if let Err(e) = self.query.send(request) {
            warn!(error = %e, "bridge query failed");
            return None;
        }
        self.query.output.recv_timeout(self.timeout).ok()
    }

    /// Pointer position in screen pixels.
    pub fn global_pointer(&mut self) -> Option<IVec2> {
        let reply = self.request("m")?;
        parse_pointer(&reply)
    }

    /// Terminal window rectangle in screen pixels.
    pub fn window_rect(&mut self) -> Option<WindowRect> {
        let reply = self.request("w")?;
        parse_window(&reply)
    }

    /// Window top-left corner.
    pub fn window_origin(&mut self) -> Option<IVec2> {
        self.window_rect().map(|rect| rect.origin())
    }

    /// Window size in pixels.
    pub fn window_size(&mut self) -> Option<IVec2> {
        self.window_rect().map(|rect| rect.size())
    }

    /// Pointer relative to the window.
    pub fn pointer(&mut self) -> Option<IVec2> {
        let global = self.global_pointer()?;
        Some(global - self.window_origin()?)
    }

    /// Toggle helper streams to match `subscriptions`.
    pub fn set_subscriptions(&mut self, subscriptions: Subscription) -> Result<()> {
        let enter_leave = Subscription::ENTER | Subscription::LEAVE;
        let toggles = [
            (self.subscriptions.contains(Subscription::POINTER_MOTION), subscriptions.contains(Subscription::POINTER_MOTION), "M", "m"),
            (self.subscriptions.contains(Subscription::STRUCTURE), subscriptions.contains(Subscription::STRUCTURE), "W", "w"),
            (self.subscriptions.intersects(enter_leave), subscriptions.intersects(enter_leave), "E", "e"),
        ];
        for (was, now, on, off) in toggles {
            if was != now {
                let line = if now { on } else { off };
                self.events
                    .send(line)
                    .map_err(|e| EngineError::Bridge(format!("events helper: {e}")))?;
                debug!(line, "bridge stream toggled");
            }
        }
        self.subscriptions = subscriptions;
        Ok(())
    }

    /// Drain pushed lines into `out`.
    pub fn poll(&mut self, out: &mut Vec<InputEvent>) {
        while let Ok(line) = self.events.output.try_recv() {
            match parse_event_line(&line) {
                Some(event) => out.push(event),
                None => warn!(line, "dropping malformed bridge line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::{Arc, Mutex};

    /// Writer that records everything into a shared buffer.
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

    #[test]
    fn test_parse_lines() {
        assert_eq!(parse_pointer("m 10 -3"), Some(IVec2::new(10, -3)));
        assert_eq!(parse_pointer("m error"), None);
        let rect = parse_window("w 100 50 740 530").unwrap();
        assert_eq!(rect.origin(), IVec2::new(100, 50));
        assert_eq!(rect.size(), IVec2::new(640, 480));
        assert_eq!(parse_event_line("enter"), Some(InputEvent::WindowEnter));
        assert_eq!(parse_event_line("bogus"), None);
    }

    #[test]
    fn test_query_pairs_with_latest_reply() {
        let (query_tx, query_rx) = unbounded();
        let (_events_tx, events_rx) = unbounded();
        let written = Recorder::default();
        let mut bridge = BridgeBackend::from_channels(
            Box::new(written.clone()),
            query_rx,
            Box::new(Recorder::default()),
            events_rx,
            Duration::from_millis(200),
        );

        // A stale answer left over from an earlier timeout.
        query_tx.send("m 1 1".to_string()).unwrap();
        let responder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            query_tx.send("m 300 200".to_string()).unwrap();
        });
        assert_eq!(bridge.global_pointer(), Some(IVec2::new(300, 200)));
        responder.join().unwrap();
        assert_eq!(written.0.lock().unwrap().as_slice(), b"m\n");
    }

    #[test]
    fn test_query_timeout_is_none() {
        let (_query_tx, query_rx) = unbounded();
        let (_events_tx, events_rx) = unbounded();
        let mut bridge = BridgeBackend::from_channels(
            Box::new(Recorder::default()),
            query_rx,
            Box::new(Recorder::default()),
            events_rx,
            Duration::from_millis(10),
        );
        assert_eq!(bridge.window_size(), None);
    }

    #[test]
    fn test_subscription_toggles() {
        let (_query_tx, query_rx) = unbounded();
        let (_events_tx, events_rx) = unbounded();
        let control = Recorder::default();
        let mut bridge = BridgeBackend::from_channels(
            Box::new(Recorder::default()),
            query_rx,
            Box::new(control.clone()),
            events_rx,
            Duration::from_millis(10),
        );
        bridge
            .set_subscriptions(Subscription::POINTER_MOTION | Subscription::ENTER)
            .unwrap();
        bridge.set_subscriptions(Subscription::ENTER | Subscription::LEAVE).unwrap();
        assert_eq!(control.0.lock().unwrap().as_slice(), b"M\nE\nm\n");
    }

    #[test]
    fn test_poll_drops_malformed() {
        let (_query_tx, query_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let mut bridge = BridgeBackend::from_channels(
            Box::new(Recorder::default()),
            query_rx,
            Box::new(Recorder::default()),
            events_rx,
            Duration::from_millis(10),
        );
        for line in ["m 5 6", "w 1 2", "leave"] {
            events_tx.send(line.to_string()).unwrap();
        }
        let mut events = Vec::new();
        bridge.poll(&mut events);
        assert_eq!(
            events,
            vec![
                InputEvent::MouseMove {
                    pixel: IVec2::new(5, 6)
                },
                InputEvent::WindowLeave
            ]
        );
    }
}
