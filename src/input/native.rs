//! Native X11 backend.
//!
//! Events are selected on the window that owns input focus, which is the
//! terminal emulator. GNOME and LX terminals focus a 1x1 proxy child; for
//! those the parent is used instead and pointer motion is polled, since the
//! proxy never receives motion events.

use super::event::{InputEvent, Key, KeyCode, KeyModifiers, Subscription};
use crate::error::{EngineError, Result};
use glam::IVec2;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConnectionExt as _, EventMask, GrabMode, GrabStatus, KeyButMask,
    Keycode, Window,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

fn native_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Native(e.to_string())
}

/// Keysym table fetched once at connect.
struct KeyboardMap {
    min_keycode: u8,
    per_keycode: usize,
    keysyms: Vec<u32>,
}

impl KeyboardMap {
    // Unshifted keysym, like XLookupKeysym(ev, 0).
    fn keysym(&self, keycode: Keycode) -> Option<u32> {
        let row = usize::from(keycode.checked_sub(self.min_keycode)?);
        self.keysyms.get(row * self.per_keycode).copied().filter(|&k| k != 0)
    }
}

/// X11 connection bound to the terminal window.
pub struct NativeBackend {
    conn: RustConnection,
    root: Window,
    window: Window,
    proxy_focus: bool,
    mask: EventMask,
    keyboard: KeyboardMap,
    last_polled_pointer: Option<IVec2>,
}

impl NativeBackend {
    /// Connect to the display named by `$DISPLAY` and find the terminal window.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(native_error)?;
        let setup = conn.setup();
        let root = setup
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| EngineError::Native(format!("screen {screen_num} missing")))?;
        let (min_keycode, max_keycode) = (setup.min_keycode, setup.max_keycode);

        let mut window = conn
            .get_input_focus()
            .map_err(native_error)?
            .reply()
            .map_err(native_error)?
            .focus;
        let geometry = conn
            .get_geometry(window)
            .map_err(native_error)?
            .reply()
            .map_err(native_error)?;

        let proxy_focus = geometry.width == 1 && geometry.height == 1;
        if proxy_focus {
            window = conn
                .query_tree(window)
                .map_err(native_error)?
                .reply()
                .map_err(native_error)?
                .parent;
            debug!(window, "focus is a 1x1 proxy, using parent window");
        }

        let mapping = conn
            .get_keyboard_mapping(min_keycode, max_keycode.saturating_sub(min_keycode).saturating_add(1))
            .map_err(native_error)?
            .reply()
            .map_err(native_error)?;
        let keyboard = KeyboardMap {
            min_keycode,
            per_keycode: usize::from(mapping.keysyms_per_keycode).max(1),
            keysyms: mapping.keysyms,
        };

        info!(window, proxy_focus, "connected to X11");
        Ok(Self {
            conn,
            root,
            window,
            proxy_focus,
            mask: EventMask::NO_EVENT,
            keyboard,
            last_polled_pointer: None,
        })
    }

    /// Apply the windowing-layer part of `subscriptions`.
    pub fn set_subscriptions(&mut self, subscriptions: Subscription) -> Result<()> {
        let mut mask = EventMask::NO_EVENT;
        for (flag, event_mask) in [
            (Subscription::KEY_PRESS, EventMask::KEY_PRESS),
            (Subscription::KEY_RELEASE, EventMask::KEY_RELEASE),
            (Subscription::POINTER_MOTION, EventMask::POINTER_MOTION),
            (Subscription::ENTER, EventMask::ENTER_WINDOW),
            (Subscription::LEAVE, EventMask::LEAVE_WINDOW),
            (Subscription::STRUCTURE, EventMask::STRUCTURE_NOTIFY),
        ] {
            if subscriptions.contains(flag) {
                mask = mask | event_mask;
            }
        }
        if mask == self.mask {
            return Ok(());
        }
        self.conn
            .change_window_attributes(self.window, &ChangeWindowAttributesAux::new().event_mask(mask))
            .map_err(native_error)?
            .check()
            .map_err(native_error)?;
        debug!(mask = u32::from(mask), "X11 event mask updated");
        self.mask = mask;
        Ok(())
    }

    /// Drain queued X11 events into `out`.
    pub fn poll(&mut self, out: &mut Vec<InputEvent>) -> Result<()> {
        while let Some(event) = self.conn.poll_for_event().map_err(native_error)? {
            if let Some(event) = self.convert_event(&event) {
                out.push(event);
            }
        }

        if self.proxy_focus && u32::from(self.mask) & u32::from(EventMask::POINTER_MOTION) != 0 {
            let pointer = self.pointer();
            if let Some(pixel) = pointer.filter(|p| Some(*p) != self.last_polled_pointer) {
                out.push(InputEvent::MouseMove { pixel });
            }
            self.last_polled_pointer = pointer;
        }
        Ok(())
    }

    fn convert_event(&self, event: &Event) -> Option<InputEvent> {
        match event {
            Event::KeyPress(e) => self.convert_key(e.detail, e.state).map(InputEvent::KeyDown),
            Event::KeyRelease(e) => self.convert_key(e.detail, e.state).map(InputEvent::KeyUp),
            Event::MotionNotify(e) => Some(InputEvent::MouseMove {
                pixel: IVec2::new(i32::from(e.event_x), i32::from(e.event_y)),
            }),
            Event::EnterNotify(_) => Some(InputEvent::WindowEnter),
            Event::LeaveNotify(_) => Some(InputEvent::WindowLeave),
            Event::ConfigureNotify(e) => Some(InputEvent::WindowResize {
                origin: IVec2::new(i32::from(e.x), i32::from(e.y)),
                size: IVec2::new(i32::from(e.width), i32::from(e.height)),
            }),
            _ => None,
        }
    }

    fn convert_key(&self, keycode: Keycode, state: KeyButMask) -> Option<Key> {
        let code = keysym_to_key(self.keyboard.keysym(keycode)?)?;
        let state = u16::from(state);
        let has = |mask: KeyButMask| state & u16::from(mask) != 0;
        Some(Key {
            code,
            modifiers: KeyModifiers {
                shift: has(KeyButMask::SHIFT),
                control: has(KeyButMask::CONTROL),
                alt: has(KeyButMask::MOD1),
                super_key: has(KeyButMask::MOD4),
            },
        })
    }

    /// Pointer position in screen pixels.
    pub fn global_pointer(&self) -> Option<IVec2> {
        let reply = self.conn.query_pointer(self.root).ok()?.reply().ok()?;
        Some(IVec2::new(i32::from(reply.root_x), i32::from(reply.root_y)))
    }

    /// Terminal window's top-left corner in screen pixels.
    pub fn window_origin(&self) -> Option<IVec2> {
        let reply = self
            .conn
            .translate_coordinates(self.window, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        Some(IVec2::new(i32::from(reply.dst_x), i32::from(reply.dst_y)))
    }

    /// Terminal window size in pixels.
    pub fn window_size(&self) -> Option<IVec2> {
        let reply = self.conn.get_geometry(self.window).ok()?.reply().ok()?;
        Some(IVec2::new(i32::from(reply.width), i32::from(reply.height)))
    }

    /// Pointer position relative to the terminal window.
    pub fn pointer(&self) -> Option<IVec2> {
        Some(self.global_pointer()? - self.window_origin()?)
    }

    /// Route every key event to us, regardless of focus.
    pub fn grab_keyboard(&self) -> Result<()> {
        let reply = self
            .conn
            .grab_keyboard(
                false,
                self.root,
                x11rb::CURRENT_TIME,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(native_error)?
            .reply()
            .map_err(native_error)?;
        if reply.status == GrabStatus::SUCCESS {
            Ok(())
        } else {
            Err(EngineError::Native(format!("keyboard grab refused: {:?}", reply.status)))
        }
    }

    /// Release a keyboard grab.
    pub fn ungrab_keyboard(&self) -> Result<()> {
        self.conn
            .ungrab_keyboard(x11rb::CURRENT_TIME)
            .map_err(native_error)?;
        self.conn.flush().map_err(native_error)
    }

    /// Route every pointer event to us.
    pub fn grab_mouse(&self) -> Result<()> {
        let reply = self
            .conn
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )
            .map_err(native_error)?
            .reply()
            .map_err(native_error)?;
        if reply.status == GrabStatus::SUCCESS {
            Ok(())
        } else {
            Err(EngineError::Native(format!("pointer grab refused: {:?}", reply.status)))
        }
    }

    /// Release a pointer grab.
    pub fn ungrab_mouse(&self) -> Result<()> {
        self.conn
            .ungrab_pointer(x11rb::CURRENT_TIME)
            .map_err(native_error)?;
        self.conn.flush().map_err(native_error)
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        let _ = self.conn.ungrab_keyboard(x11rb::CURRENT_TIME);
        let _ = self.conn.ungrab_pointer(x11rb::CURRENT_TIME);
        if self.mask != EventMask::NO_EVENT {
            let _ = self.conn.change_window_attributes(
                self.window,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
            );
        }
        let _ = self.conn.flush();
    }
}

/// Map an X11 keysym to a key code.
pub fn keysym_to_key(keysym: u32) -> Option<KeyCode> {
    Some(match keysym {
        0xff08 => KeyCode::Backspace,
        0xff09 => KeyCode::Tab,
        0xff0d | 0xff8d => KeyCode::Enter,
        0xff1b => KeyCode::Esc,
        0xff50 => KeyCode::Home,
        0xff51 => KeyCode::Left,
        0xff52 => KeyCode::Up,
        0xff53 => KeyCode::Right,
        0xff54 => KeyCode::Down,
        0xff55 => KeyCode::PageUp,
        0xff56 => KeyCode::PageDown,
        0xff57 => KeyCode::End,
        0xff63 => KeyCode::Insert,
        0xffff => KeyCode::Delete,
        0xffbe..=0xffc9 => KeyCode::F((keysym - 0xffbe + 1) as u8),
        0x20..=0x7e | 0xa0..=0xff => KeyCode::Char(char::from_u32(keysym)?),
        _ => return None,
    })
}
