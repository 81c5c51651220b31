//! Line reader actor: a dedicated thread turning blocking pipe reads into
//! channel messages, so pumping events never blocks the render thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};
use tracing::trace;

/// Thread forwarding text lines (without the trailing newline).
///
/// The thread ends on EOF, on a read error, or when the receiver is dropped.
pub struct LineReader {
    handle: Option<JoinHandle<()>>,
}

impl LineReader {
    /// Spawn a line reader thread named `name`.
    pub fn spawn<R>(name: &str, reader: R) -> (Self, Receiver<String>)
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run_loop(BufReader::new(reader), &tx))
            .expect("Failed to spawn reader thread");

        (
            Self {
                handle: Some(handle),
            },
            rx,
        )
    }

    fn run_loop<R: BufRead>(reader: R, tx: &Sender<String>) {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            let line = line.trim_end_matches('\r').to_string();
            if tx.send(line).is_err() {
                break;
            }
        }
        trace!("line reader finished");
    }

    /// Wait for the thread; returns once the writing end of the pipe closed.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_line_reader_strips_newlines() {
        let (_reader, rx) = LineReader::spawn("test-lines", Cursor::new(b"m 1 2\r\nenter\n".to_vec()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "m 1 2");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "enter");
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_join_returns_at_eof() {
        let (reader, rx) = LineReader::spawn("test-join", Cursor::new(b"leave\n".to_vec()));
        reader.join();
        assert_eq!(rx.try_recv().unwrap(), "leave");
        assert!(rx.try_recv().is_err());
    }
}
