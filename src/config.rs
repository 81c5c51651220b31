//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Which event backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendPreference {
    /// Try the native backend, fall back to the bridge.
    #[default]
    Auto,
    /// Native windowing events only.
    Native,
    /// Subprocess bridge only.
    Bridge,
}

/// Settings for the subprocess bridge backend.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Helper answering pointer/window queries.
    pub query_helper: PathBuf,
    /// Helper streaming pointer/window/enter/leave events.
    pub events_helper: PathBuf,
    /// How long to wait for a query answer.
    pub response_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            query_helper: PathBuf::from("./helpers/wslquery.exe"),
            events_helper: PathBuf::from("./helpers/wslevents.exe"),
            response_timeout: Duration::from_millis(50),
        }
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target frames per second.
    pub target_fps: u32,
    /// Frames to wait after a terminal resize before drawing again.
    pub resize_settle_frames: u64,
    /// Path of the device program (compute shader source).
    pub program_path: PathBuf,
    /// Event backend selection.
    pub backend: BackendPreference,
    /// Whether to use alternate screen buffer.
    pub alternate_screen: bool,
    /// Bridge helper settings.
    pub bridge: BridgeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            resize_settle_frames: 30,
            program_path: PathBuf::from("shaders/frag.wgsl"),
            backend: BackendPreference::Auto,
            alternate_screen: true,
            bridge: BridgeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Sleep between frames derived from `target_fps`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        let config = EngineConfig::default();
        assert_eq!(config.frame_interval(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn test_zero_fps_does_not_divide_by_zero() {
        let config = EngineConfig {
            target_fps: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
    }
}
