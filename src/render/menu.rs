//! Menu overlay and the engine's default input handlers.
//!
//! The overlay is plain text with basic SGR colors, drawn over the top-left
//! corner of the frame by the compositor. Pointer hit-testing goes through
//! the calibration model so highlighted rows follow the estimated cell under
//! the pointer rather than the last terminal-reported click.

use crate::error::{EngineError, Result};
use crate::input::{EventKind, EventSource, InputControl, InputEvent, MouseEvent};
use crate::state::{GameState, GameStateSnapshot, MenuState};
use glam::Vec2;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// Root menu labels.
pub const ROOT_ITEMS: [&str; 2] = ["Select hardware accelerator", "Exit"];
/// Root menu column count; every label is padded to it.
pub const ROOT_MENU_WIDTH: usize = 27;
/// Accelerator menu column count.
pub const ACCELERATOR_MENU_WIDTH: usize = 40;

const RESET: &str = "\x1b[0m";
const CYAN_ON_BLACK: &str = "\x1b[0;36m\x1b[40m";
const RED_ON_BLACK: &str = "\x1b[0;31m\x1b[40m";
const BLACK_ON_RED: &str = "\x1b[0;30m\x1b[41m";
const SELECTED: &str = "\x1b[48;2;122;122;122m";

/// Overlay text for `snapshot`; `devices` lists menu labels, CPU first.
pub fn build_overlay(snapshot: &GameStateSnapshot, devices: &[String]) -> String {
    let mut text = String::with_capacity(256);
    match snapshot.menu {
        MenuState::Root => {
            for (row, label) in ROOT_ITEMS.iter().enumerate() {
                let style = match (snapshot.hovered == Some(row), row) {
                    (true, _) => BLACK_ON_RED,
                    (false, 0) => CYAN_ON_BLACK,
                    (false, _) => RED_ON_BLACK,
                };
                let _ = writeln!(text, "{style}{label:<ROOT_MENU_WIDTH$}{RESET}");
            }
        }
        MenuState::AcceleratorSelect => {
            let selected = if snapshot.selected_accelerator < devices.len() {
                snapshot.selected_accelerator
            } else {
                0
            };
            for (row, name) in devices.iter().enumerate() {
                let style = if snapshot.hovered == Some(row) {
                    BLACK_ON_RED
                } else if row == selected {
                    SELECTED
                } else {
                    CYAN_ON_BLACK
                };
                let _ = writeln!(
                    text,
                    "{style}{name:<ACCELERATOR_MENU_WIDTH$.ACCELERATOR_MENU_WIDTH$}{RESET}"
                );
            }
        }
    }
    text
}

/// Menu row at fractional cell `cell`, if any.
pub fn hit_test(menu: MenuState, cell: Vec2, items: usize) -> Option<usize> {
    if cell.x < 0.0 || cell.y < 0.0 {
        return None;
    }
    let (width, rows) = match menu {
        MenuState::Root => (ROOT_MENU_WIDTH, ROOT_ITEMS.len()),
        MenuState::AcceleratorSelect => (ACCELERATOR_MENU_WIDTH, items),
    };
    let row = cell.y as usize;
    (cell.x < width as f32 && row < rows).then_some(row)
}

/// Pointer and focus behaviour of the menu.
#[derive(Debug, Clone)]
pub struct MenuInput {
    state: Arc<GameState>,
    devices: usize,
}

impl MenuInput {
    /// Menu over `state` listing `devices` accelerator entries (CPU included).
    pub const fn new(state: Arc<GameState>, devices: usize) -> Self {
        Self { state, devices }
    }

    /// Update the hovered row for a pointer at `cell`.
    pub fn hover(&self, cell: Vec2) {
        let devices = self.devices;
        self.state.update(|s| {
            if s.running {
                s.hovered = hit_test(s.menu, cell, devices);
            }
        });
    }

    /// Apply a click at `cell`.
    pub fn press(&self, cell: Vec2) {
        let devices = self.devices;
        self.state.update(|s| {
            if !s.running {
                return;
            }
            let hit = hit_test(s.menu, cell, devices);
            match s.menu {
                MenuState::Root => match hit {
                    Some(0) => {
                        s.menu = MenuState::AcceleratorSelect;
                        s.hovered = None;
                    }
                    Some(_) => s.running = false,
                    None => {}
                },
                MenuState::AcceleratorSelect => {
                    if let Some(ordinal) = hit {
                        s.selected_accelerator = ordinal;
                        debug!(ordinal, "accelerator selected");
                    }
                    s.menu = MenuState::Root;
                    s.hovered = None;
                }
            }
        });
    }

    /// Pointer moved to window pixel `pixel`.
    pub fn on_move(&self, pixel: glam::IVec2, control: &InputControl<'_>) {
        self.hover(control.calibration().pixel_to_cell(pixel.as_vec2()));
    }

    /// Button pressed; hit-tests the live pointer, or the reported cell when
    /// the pointer cannot be queried.
    pub fn on_press(&self, event: &MouseEvent, control: &mut InputControl<'_>) {
        let cell = control
            .pointer_cell()
            .unwrap_or_else(|| event.cell.as_vec2());
        self.press(cell);
    }

    /// Pointer entered the window: take the keyboard while a game runs.
    pub fn on_enter(&self, control: &mut InputControl<'_>) {
        if self.state.snapshot().running {
            log_grab(control.grab_keyboard(), "grab_keyboard");
        }
    }

    /// Pointer left the window.
    pub fn on_leave(&self, control: &mut InputControl<'_>) {
        log_grab(control.ungrab_keyboard(), "ungrab_keyboard");
    }
}

fn log_grab(result: Result<()>, operation: &str) {
    match result {
        Ok(()) => debug!(operation, "keyboard focus changed"),
        Err(EngineError::Unsupported { .. }) => {}
        Err(e) => warn!(operation, error = %e, "keyboard grab failed"),
    }
}

/// Register the menu's move, press, enter and leave handlers on `source`.
pub fn install_menu_handlers(source: &mut EventSource, menu: &MenuInput) -> Result<()> {
    let on_move = menu.clone();
    source.on(EventKind::MouseMove, move |event, control| {
        if let InputEvent::MouseMove { pixel } = event {
            on_move.on_move(*pixel, control);
        }
    })?;
    let on_press = menu.clone();
    source.on(EventKind::MousePress, move |event, control| {
        if let InputEvent::MousePress(mouse) = event {
            on_press.on_press(mouse, control);
        }
    })?;
    let on_enter = menu.clone();
    source.on(EventKind::WindowEnter, move |_, control| on_enter.on_enter(control))?;
    let on_leave = menu.clone();
    source.on(EventKind::WindowLeave, move |_, control| on_leave.on_leave(control))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> Arc<GameState> {
        Arc::new(GameState::new(GameStateSnapshot {
            running: true,
            ..GameStateSnapshot::default()
        }))
    }

    fn names() -> Vec<String> {
        vec!["Default (CPU)".to_string(), "Card A".to_string()]
    }

    #[test]
    fn test_root_overlay_rows() {
        let snapshot = GameStateSnapshot {
            hovered: Some(1),
            ..GameStateSnapshot::default()
        };
        let text = build_overlay(&snapshot, &names());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "\x1b[0;36m\x1b[40mSelect hardware accelerator\x1b[0m");
        assert_eq!(lines[1], "\x1b[0;30m\x1b[41mExit                       \x1b[0m");
    }

    #[test]
    fn test_accelerator_overlay_marks_selection() {
        let snapshot = GameStateSnapshot {
            menu: MenuState::AcceleratorSelect,
            selected_accelerator: 1,
            ..GameStateSnapshot::default()
        };
        let text = build_overlay(&snapshot, &names());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with(CYAN_ON_BLACK));
        assert!(lines[1].starts_with(SELECTED));
        assert!(lines[1].contains(&format!("{:<40}", "Card A")));
    }

    #[test]
    fn test_hit_test_bounds() {
        assert_eq!(hit_test(MenuState::Root, Vec2::new(3.5, 1.2), 5), Some(1));
        assert_eq!(hit_test(MenuState::Root, Vec2::new(27.0, 0.0), 5), None);
        assert_eq!(hit_test(MenuState::Root, Vec2::new(1.0, 2.0), 5), None);
        assert_eq!(hit_test(MenuState::Root, Vec2::new(-0.5, 0.0), 5), None);
        assert_eq!(hit_test(MenuState::AcceleratorSelect, Vec2::new(39.9, 1.0), 2), Some(1));
        assert_eq!(hit_test(MenuState::AcceleratorSelect, Vec2::new(5.0, 2.0), 2), None);
    }

    #[test]
    fn test_press_walks_menus() {
        let state = running();
        let menu = MenuInput::new(Arc::clone(&state), 2);

        menu.press(Vec2::new(2.0, 0.5));
        assert_eq!(state.snapshot().menu, MenuState::AcceleratorSelect);

        menu.press(Vec2::new(2.0, 1.5));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.menu, MenuState::Root);
        assert_eq!(snapshot.selected_accelerator, 1);

        menu.press(Vec2::new(2.0, 1.5));
        assert!(!state.snapshot().running);
    }

    #[test]
    fn test_press_outside_accelerator_menu_returns_to_root() {
        let state = running();
        state.update(|s| {
            s.menu = MenuState::AcceleratorSelect;
            s.selected_accelerator = 1;
        });
        MenuInput::new(Arc::clone(&state), 2).press(Vec2::new(45.0, 0.0));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.menu, MenuState::Root);
        assert_eq!(snapshot.selected_accelerator, 1);
    }

    #[test]
    fn test_ignored_while_not_running() {
        let state = Arc::new(GameState::default());
        let menu = MenuInput::new(Arc::clone(&state), 2);
        menu.hover(Vec2::new(1.0, 0.0));
        menu.press(Vec2::new(1.0, 0.0));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.hovered, None);
        assert_eq!(snapshot.menu, MenuState::Root);
    }
}
