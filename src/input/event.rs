//! Input event types.
//!
//! Both backends and the terminal report decoder normalize into these.

use bitflags::bitflags;
use glam::IVec2;

/// Key codes for keyboard input.
///
/// A subset covering what games and menus need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character.
    Char(char),
    /// Function key (F1-F12).
    F(u8),
    /// Backspace key.
    Backspace,
    /// Enter/Return key.
    Enter,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Home key.
    Home,
    /// End key.
    End,
    /// Page Up.
    PageUp,
    /// Page Down.
    PageDown,
    /// Tab key.
    Tab,
    /// Delete key.
    Delete,
    /// Insert key.
    Insert,
    /// Escape key.
    Esc,
}

/// Key modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyModifiers {
    /// Shift key held.
    pub shift: bool,
    /// Control key held.
    pub control: bool,
    /// Alt/Option key held.
    pub alt: bool,
    /// Super/Command/Windows key held.
    pub super_key: bool,
}

impl KeyModifiers {
    /// No modifiers.
    pub const NONE: Self = Self {
        shift: false,
        control: false,
        alt: false,
        super_key: false,
    };

    /// Only Control.
    pub const CONTROL: Self = Self {
        shift: false,
        control: true,
        alt: false,
        super_key: false,
    };
}

/// A key with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    /// The key code.
    pub code: KeyCode,
    /// Modifiers held during the event.
    pub modifiers: KeyModifiers,
}

impl Key {
    /// Key without modifiers.
    pub const fn plain(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }
}

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Middle mouse button.
    Middle,
    /// Right mouse button.
    Right,
    /// Release report; legacy terminal encodings do not say which button.
    Unknown,
}

/// A button press or release resolved to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// 0-based cell reported by the terminal.
    pub cell: IVec2,
    /// Button involved.
    pub button: MouseButton,
    /// Window-relative pointer position, if the backend could query it.
    pub pixel: Option<IVec2>,
}

/// Closed set of event kinds; one handler slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Key pressed.
    KeyDown,
    /// Key released.
    KeyUp,
    /// Pointer moved.
    MouseMove,
    /// Mouse button pressed.
    MousePress,
    /// Mouse button released.
    MouseRelease,
    /// Pointer entered the terminal window.
    WindowEnter,
    /// Pointer left the terminal window.
    WindowLeave,
    /// Terminal window moved or resized.
    WindowResize,
}

impl EventKind {
    /// Number of kinds.
    pub const COUNT: usize = 8;

    /// Every kind, in slot order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::KeyDown,
        Self::KeyUp,
        Self::MouseMove,
        Self::MousePress,
        Self::MouseRelease,
        Self::WindowEnter,
        Self::WindowLeave,
        Self::WindowResize,
    ];

    /// Slot index in the handler table.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Windowing-layer subscription needed to receive this kind.
    pub const fn subscription(self) -> Subscription {
        match self {
            Self::KeyDown => Subscription::KEY_PRESS,
            Self::KeyUp => Subscription::KEY_RELEASE,
            Self::MouseMove => Subscription::POINTER_MOTION,
            Self::MousePress | Self::MouseRelease => Subscription::MOUSE_TRACKING,
            Self::WindowEnter => Subscription::ENTER,
            Self::WindowLeave => Subscription::LEAVE,
            Self::WindowResize => Subscription::STRUCTURE,
        }
    }
}

bitflags! {
    /// Event classes enabled at the windowing layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Subscription: u8 {
        /// Key presses.
        const KEY_PRESS      = 0b0000_0001;
        /// Key releases.
        const KEY_RELEASE    = 0b0000_0010;
        /// Pointer motion.
        const POINTER_MOTION = 0b0000_0100;
        /// Pointer entering the window.
        const ENTER          = 0b0000_1000;
        /// Pointer leaving the window.
        const LEAVE          = 0b0001_0000;
        /// Window geometry changes.
        const STRUCTURE      = 0b0010_0000;
        /// Terminal mouse button reports.
        const MOUSE_TRACKING = 0b0100_0000;
    }
}

/// A normalized input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key was pressed.
    KeyDown(Key),
    /// A key was released.
    KeyUp(Key),
    /// Pointer moved; window-relative pixels.
    MouseMove {
        /// Pointer position.
        pixel: IVec2,
    },
    /// Mouse button pressed.
    MousePress(MouseEvent),
    /// Mouse button released.
    MouseRelease(MouseEvent),
    /// Pointer entered the window.
    WindowEnter,
    /// Pointer left the window.
    WindowLeave,
    /// Window geometry changed.
    WindowResize {
        /// Top-left corner in screen pixels.
        origin: IVec2,
        /// Size in pixels.
        size: IVec2,
    },
}

impl InputEvent {
    /// Which handler slot receives this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::KeyDown(_) => EventKind::KeyDown,
            Self::KeyUp(_) => EventKind::KeyUp,
            Self::MouseMove { .. } => EventKind::MouseMove,
            Self::MousePress(_) => EventKind::MousePress,
            Self::MouseRelease(_) => EventKind::MouseRelease,
            Self::WindowEnter => EventKind::WindowEnter,
            Self::WindowLeave => EventKind::WindowLeave,
            Self::WindowResize { .. } => EventKind::WindowResize,
        }
    }
}
