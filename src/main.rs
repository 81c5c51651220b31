//! Termarch demo: a ray-marched court with an AI rally, drawn in the terminal.
//!
//! Press 'q' or Escape to quit, Tab for split screen, '1'/'2' to switch ends.

use clap::{Parser, ValueEnum};
use glam::{Vec2, Vec3};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use termarch::accel::{DeviceList, Dispatcher};
use termarch::render::{install_menu_handlers, MenuInput};
use termarch::scene::{BALL_SIZE, COURT_LENGTH, PADDLE_SIZE};
use termarch::{
    clock, BackendPreference, EngineConfig, EngineContext, EventKind, EventSource, GameState,
    GameStateSnapshot, InputEvent, KeyCode, PlayerMode, RenderActor, RenderLoop, TerminalSession,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ray-marched 3D in the terminal
#[derive(Parser)]
#[command(name = "termarch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Accelerator ordinal (0 = CPU)
    #[arg(short, long, default_value = "0")]
    device: usize,

    /// Target frames per second
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Event backend
    #[arg(long, value_enum, default_value = "auto")]
    backend: BackendArg,

    /// Device program source
    #[arg(long, default_value = "shaders/frag.wgsl")]
    program: PathBuf,

    /// Print the accelerator list and exit
    #[arg(long)]
    list_devices: bool,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Draw on the main screen instead of the alternate screen
    #[arg(long)]
    no_alt_screen: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Native,
    Bridge,
}

impl From<BackendArg> for BackendPreference {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => Self::Auto,
            BackendArg::Native => Self::Native,
            BackendArg::Bridge => Self::Bridge,
        }
    }
}

impl Cli {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            target_fps: self.fps,
            program_path: self.program.clone(),
            backend: self.backend.into(),
            alternate_screen: !self.no_alt_screen,
            ..EngineConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.list_devices {
        for (ordinal, name) in DeviceList::enumerate().names().iter().enumerate() {
            println!("{ordinal}: {name}");
        }
        return ExitCode::SUCCESS;
    }

    if let Some(path) = &cli.log_file {
        if let Err(e) = init_logging(path) {
            eprintln!("termarch: cannot open log file {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "termarch stopped");
            eprintln!("termarch: {e}");
            ExitCode::FAILURE
        }
    }
}

// Logs never go to the terminal being drawn on.
fn init_logging(path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .init();
    Ok(())
}

fn run(cli: &Cli) -> termarch::Result<()> {
    let config = cli.config();
    let devices = DeviceList::enumerate();
    let state = Arc::new(GameState::new(GameStateSnapshot {
        player: PlayerMode::Ai,
        selected_accelerator: cli.device,
        running: true,
        ..GameStateSnapshot::default()
    }));

    let _session = TerminalSession::enter(config.alternate_screen)?;
    let mut events = EventSource::open(&config)?;
    install_menu_handlers(&mut events, &MenuInput::new(Arc::clone(&state), devices.len()))?;
    install_key_handlers(&mut events, &state)?;

    let dispatcher = Dispatcher::new(devices, config.program_path.clone());
    let ctx = EngineContext::new(config, Arc::clone(&state), events, dispatcher);
    let actor = RenderActor::spawn(RenderLoop::new(ctx));
    let logic = spawn_logic(Arc::clone(&state));
    info!(device = cli.device, "termarch started");

    let result = actor.join();
    state.request_exit();
    let _ = logic.join();
    result
}

fn install_key_handlers(events: &mut EventSource, state: &Arc<GameState>) -> termarch::Result<()> {
    let state = Arc::clone(state);
    events.on(EventKind::KeyDown, move |event, _| {
        let InputEvent::KeyDown(key) = event else { return };
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => state.request_exit(),
            KeyCode::Char('c') if key.modifiers.control => state.request_exit(),
            KeyCode::Tab => state.update(|s| {
                s.player = if s.player == PlayerMode::SplitScreen {
                    PlayerMode::Ai
                } else {
                    PlayerMode::SplitScreen
                };
            }),
            KeyCode::Char('1') => state.update(|s| s.player = PlayerMode::PlayerOne),
            KeyCode::Char('2') => state.update(|s| s.player = PlayerMode::PlayerTwo),
            _ => {}
        }
    })
}

/// Ball and paddle positions at time `t` of the stand-in rally.
fn rally(t: f32) -> (Vec3, Vec2, Vec2) {
    let reach = 1.0 - BALL_SIZE;
    let depth = COURT_LENGTH - PADDLE_SIZE.z - BALL_SIZE;
    let ball = Vec3::new(
        reach * (t * 0.9).sin(),
        reach * 0.7 * (t * 1.3).cos(),
        depth * (t * 0.8).sin(),
    );
    let limit = 1.0 - PADDLE_SIZE.x;
    let follow = |lag: f32| {
        let target = Vec2::new(
            reach * ((t - lag) * 0.9).sin(),
            reach * 0.7 * ((t - lag) * 1.3).cos(),
        );
        target.clamp(Vec2::splat(-limit), Vec2::splat(limit))
    };
    (ball, follow(0.15), follow(0.3))
}

// Stand-in for the game/network thread. Choosing "Exit" in the menu stops
// the game, which ends the demo.
fn spawn_logic(state: Arc<GameState>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("termarch-logic".to_string())
        .spawn(move || loop {
            let snapshot = state.snapshot();
            if snapshot.exit {
                break;
            }
            if !snapshot.running {
                state.request_exit();
                break;
            }
            let (ball, player_one, player_two) = rally(clock::elapsed_time() as f32);
            state.update(|s| {
                s.ball = ball;
                s.player_one = player_one;
                s.player_two = player_two;
            });
            thread::sleep(Duration::from_millis(16));
        })
        .expect("Failed to spawn logic thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rally_stays_inside_arena() {
        for step in 0..1000 {
            let (ball, one, two) = rally(step as f32 * 0.05);
            assert!(ball.x.abs() <= 1.0 && ball.y.abs() <= 1.0);
            assert!(ball.z.abs() < COURT_LENGTH);
            assert!(one.abs().max_element() <= 1.0 - PADDLE_SIZE.x);
            assert!(two.abs().max_element() <= 1.0 - PADDLE_SIZE.x);
        }
    }

    #[test]
    fn test_cli_maps_onto_config() {
        let cli = Cli::parse_from(["termarch", "--fps", "30", "--backend", "bridge", "--no-alt-screen"]);
        let config = cli.config();
        assert_eq!(config.target_fps, 30);
        assert_eq!(config.backend, BackendPreference::Bridge);
        assert!(!config.alternate_screen);
    }
}
