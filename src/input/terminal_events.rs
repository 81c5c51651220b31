//! Terminal events: a dedicated thread polling crossterm for mouse reports,
//! keystrokes and resizes.
//!
//! crossterm parses the normal, urxvt (`?1015h`) and SGR mouse encodings and
//! holds incomplete escape sequences until the rest arrives, so a report
//! split across reads still comes out as one event.

use super::event::{Key, KeyCode, KeyModifiers, MouseButton};
use crate::terminal::ResizeFlag;
use crossbeam_channel::Sender;
use crossterm::event::{self, Event, KeyEventKind, MouseEventKind};
use glam::IVec2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// A mouse button report resolved to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseReport {
    /// 0-based cell.
    pub cell: IVec2,
    /// Button involved.
    pub button: MouseButton,
    /// Press or release.
    pub pressed: bool,
}

/// One unit of terminal input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalInput {
    /// Mouse button report.
    Mouse(MouseReport),
    /// Keystroke.
    Key(Key),
}

/// Thread polling terminal events.
pub struct TerminalEventActor {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl TerminalEventActor {
    /// Spawn the polling thread.
    ///
    /// Converted input goes to `sender`; terminal resizes raise `resize`
    /// straight from this thread so a frame in flight can be dropped.
    /// `poll_timeout` bounds how long shutdown waits.
    pub fn spawn(sender: Sender<TerminalInput>, resize: ResizeFlag, poll_timeout: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("termarch-terminal".to_string())
            .spawn(move || Self::run_loop(&sender, &resize, &shutdown_clone, poll_timeout))
            .expect("Failed to spawn terminal input thread");

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Signal the thread to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn run_loop(sender: &Sender<TerminalInput>, resize: &ResizeFlag, shutdown: &AtomicBool, poll_timeout: Duration) {
        while !shutdown.load(Ordering::Relaxed) {
            match event::poll(poll_timeout) {
                Ok(true) => match event::read() {
                    Ok(Event::Resize(columns, rows)) => {
                        debug!(columns, rows, "terminal resize event");
                        resize.raise();
                    }
                    Ok(event) => {
                        if let Some(input) = convert_event(&event) {
                            if sender.send(input).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "terminal event read failed"),
                },
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "terminal event poll failed");
                    break;
                }
            }
        }
    }
}

impl Drop for TerminalEventActor {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Convert a crossterm event; anything other than key presses and mouse
/// button reports is ignored.
pub fn convert_event(event: &Event) -> Option<TerminalInput> {
    match event {
        Event::Key(key_event) => {
            if key_event.kind != KeyEventKind::Press {
                return None;
            }
            Some(TerminalInput::Key(Key {
                code: convert_key_code(key_event.code)?,
                modifiers: convert_modifiers(key_event.modifiers),
            }))
        }
        Event::Mouse(mouse) => {
            let (button, pressed) = match mouse.kind {
                MouseEventKind::Down(button) => (button, true),
                MouseEventKind::Up(button) => (button, false),
                _ => return None,
            };
            Some(TerminalInput::Mouse(MouseReport {
                cell: IVec2::new(i32::from(mouse.column), i32::from(mouse.row)),
                button: convert_mouse_button(button),
                pressed,
            }))
        }
        _ => None,
    }
}

fn convert_key_code(code: event::KeyCode) -> Option<KeyCode> {
    Some(match code {
        event::KeyCode::Char(c) => KeyCode::Char(c),
        event::KeyCode::F(n) => KeyCode::F(n),
        event::KeyCode::Backspace => KeyCode::Backspace,
        event::KeyCode::Enter => KeyCode::Enter,
        event::KeyCode::Left => KeyCode::Left,
        event::KeyCode::Right => KeyCode::Right,
        event::KeyCode::Up => KeyCode::Up,
        event::KeyCode::Down => KeyCode::Down,
        event::KeyCode::Home => KeyCode::Home,
        event::KeyCode::End => KeyCode::End,
        event::KeyCode::PageUp => KeyCode::PageUp,
        event::KeyCode::PageDown => KeyCode::PageDown,
        event::KeyCode::Tab => KeyCode::Tab,
        event::KeyCode::Delete => KeyCode::Delete,
        event::KeyCode::Insert => KeyCode::Insert,
        event::KeyCode::Esc => KeyCode::Esc,
        _ => return None,
    })
}

fn convert_modifiers(mods: event::KeyModifiers) -> KeyModifiers {
    KeyModifiers {
        shift: mods.contains(event::KeyModifiers::SHIFT),
        control: mods.contains(event::KeyModifiers::CONTROL),
        alt: mods.contains(event::KeyModifiers::ALT),
        super_key: mods.contains(event::KeyModifiers::SUPER),
    }
}

const fn convert_mouse_button(button: event::MouseButton) -> MouseButton {
    match button {
        event::MouseButton::Left => MouseButton::Left,
        event::MouseButton::Right => MouseButton::Right,
        event::MouseButton::Middle => MouseButton::Middle,
    }
}
