//! Shared game-state snapshot.
//!
//! The logic/network thread writes, the render thread copies once per frame.
//! The lock is only held for copies and writes, never across I/O.

use glam::{Vec2, Vec3};
use std::sync::{Mutex, MutexGuard};

/// Whose perspective the scene is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum PlayerMode {
    /// Waiting for a match; the camera sits at player one's end.
    #[default]
    Waiting,
    /// Local player controls the near paddle.
    PlayerOne,
    /// Local player controls the far paddle; the camera is flipped.
    PlayerTwo,
    /// Two viewports side by side, one per end.
    SplitScreen,
    /// Computer opponent match.
    Ai,
}

impl PlayerMode {
    /// Integer code used by the device program uniform.
    pub const fn code(self) -> i32 {
        match self {
            Self::Ai => -1,
            Self::Waiting => 0,
            Self::PlayerOne => 1,
            Self::PlayerTwo => 2,
            Self::SplitScreen => 3,
        }
    }
}

/// Which menu the overlay shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum MenuState {
    /// Top-level menu.
    #[default]
    Root,
    /// Accelerator list.
    AcceleratorSelect,
}

/// A copy of everything the renderer needs from the game.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GameStateSnapshot {
    /// Ball centre.
    pub ball: Vec3,
    /// Near paddle (x, y).
    pub player_one: Vec2,
    /// Far paddle (x, y).
    pub player_two: Vec2,
    /// Active perspective.
    pub player: PlayerMode,
    /// Current menu.
    pub menu: MenuState,
    /// Menu row under the pointer.
    pub hovered: Option<usize>,
    /// Accelerator ordinal, 0 = CPU.
    pub selected_accelerator: usize,
    /// Whether a game is on screen (frames are drawn only while running).
    pub running: bool,
    /// Cooperative shutdown request.
    pub exit: bool,
    /// Frames since the last terminal resize.
    pub resize_settle: u64,
}

/// Mutex-guarded snapshot shared between threads.
#[derive(Debug, Default)]
pub struct GameState {
    inner: Mutex<GameStateSnapshot>,
}

impl GameState {
    /// Wrap an initial snapshot.
    pub const fn new(initial: GameStateSnapshot) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    // The snapshot is plain data, so a poisoned lock still holds a usable value.
    fn lock(&self) -> MutexGuard<'_, GameStateSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Copy the current snapshot.
    pub fn snapshot(&self) -> GameStateSnapshot {
        *self.lock()
    }

    /// Copy the snapshot and advance the resize-settle counter in the same
    /// critical section.
    pub fn begin_frame(&self) -> GameStateSnapshot {
        let mut guard = self.lock();
        let copy = *guard;
        guard.resize_settle = guard.resize_settle.saturating_add(1);
        copy
    }

    /// Mutate the snapshot under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut GameStateSnapshot) -> R) -> R {
        f(&mut self.lock())
    }

    /// Ask every thread to stop.
    pub fn request_exit(&self) {
        self.update(|s| s.exit = true);
    }

    /// Whether exit was requested.
    pub fn exit_requested(&self) -> bool {
        self.lock().exit
    }

    /// Start or stop frame production.
    pub fn set_running(&self, running: bool) {
        self.update(|s| s.running = running);
    }

    /// Restart the resize-settle countdown.
    pub fn reset_resize_settle(&self) {
        self.update(|s| s.resize_settle = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_begin_frame_increments_settle() {
        let state = GameState::default();
        let first = state.begin_frame();
        let second = state.begin_frame();
        assert_eq!(first.resize_settle, 0);
        assert_eq!(second.resize_settle, 1);
        assert_eq!(state.snapshot().resize_settle, 2);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let state = GameState::default();
        let mut copy = state.snapshot();
        copy.ball = Vec3::ONE;
        assert_eq!(state.snapshot().ball, Vec3::ZERO);
    }

    #[test]
    fn test_player_codes() {
        assert_eq!(PlayerMode::Ai.code(), -1);
        assert_eq!(PlayerMode::Waiting.code(), 0);
        assert_eq!(PlayerMode::SplitScreen.code(), 3);
    }

    #[test]
    fn test_exit_visible_across_threads() {
        let state = Arc::new(GameState::default());
        let writer = Arc::clone(&state);
        thread::spawn(move || writer.request_exit())
            .join()
            .unwrap();
        assert!(state.exit_requested());
    }

    #[test]
    fn test_poisoned_lock_recovers() {
        let state = Arc::new(GameState::default());
        let poisoner = Arc::clone(&state);
        let _ = thread::spawn(move || {
            poisoner.update(|s| {
                s.running = true;
                panic!("poison");
            })
        })
        .join();
        assert!(state.snapshot().running);
    }
}
