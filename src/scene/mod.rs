//! Signed-distance scene and ray marcher.
//!
//! The scene is a fixed arena: a hollow tube for the walls, a ball, and two
//! paddle frames whose glass interiors let rays pass with a little fog.
//! Everything here is pure math on [`glam`] vectors so the same code runs
//! per sample on the CPU path and mirrors the device program.

mod march;
mod sdf;

pub use march::{background, main_image, phong, ray_march, shade_sample, trace, Camera, MarchResult, Trace};
pub use sdf::{sdf_box, sdf_box_rounded, sdf_sphere};

use crate::state::{GameStateSnapshot, PlayerMode};
use glam::{Vec2, Vec3};

/// Ball radius.
pub const BALL_SIZE: f32 = 0.125;
/// Half length of the court along z; paddles sit at `∓COURT_LENGTH`.
pub const COURT_LENGTH: f32 = 3.0;
/// Paddle half extents.
pub const PADDLE_SIZE: Vec3 = Vec3::new(0.25, 0.25, 0.025);

/// Distance below which a ray counts as touching a surface.
pub const MIN_DISTANCE: f32 = 0.025;
/// Distance above which a ray has left the arena.
pub const MAX_DISTANCE: f32 = 2.0;
/// Step cap per ray.
pub const MAX_ITERATIONS: u32 = 64;
/// Finite-difference step for normals.
pub const NORMAL_EPSILON: f32 = 0.001;
/// Horizontal field of view in degrees.
pub const FIELD_OF_VIEW: f32 = 70.0;

/// Per-frame scene derived from a game snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneDescription {
    /// Ball centre.
    pub ball: Vec3,
    /// Near paddle centre, `z = -COURT_LENGTH`.
    pub player_one: Vec3,
    /// Far paddle centre, `z = +COURT_LENGTH`.
    pub player_two: Vec3,
    /// Perspective to render.
    pub player: PlayerMode,
}

impl SceneDescription {
    /// Build the scene from paddle offsets and the ball position.
    pub const fn new(ball: Vec3, player_one: Vec2, player_two: Vec2, player: PlayerMode) -> Self {
        Self {
            ball,
            player_one: Vec3::new(player_one.x, player_one.y, -COURT_LENGTH),
            player_two: Vec3::new(player_two.x, player_two.y, COURT_LENGTH),
            player,
        }
    }

    /// Ball and paddles centred.
    pub const fn centered(player: PlayerMode) -> Self {
        Self::new(Vec3::ZERO, Vec2::ZERO, Vec2::ZERO, player)
    }

    /// Distance from `p` to the nearest opaque surface.
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        sdf::walls(p).min(self.ball_distance(p)).min(self.paddles_distance(p))
    }

    /// Distance to the ball.
    pub fn ball_distance(&self, p: Vec3) -> f32 {
        sdf_sphere(self.ball - p, BALL_SIZE)
    }

    /// Distance to the paddle frames (outer rounded boxes minus glass).
    pub fn paddles_distance(&self, p: Vec3) -> f32 {
        const ROUNDING: f32 = 0.75;
        let outsides = sdf_box_rounded(self.player_one - p, PADDLE_SIZE, ROUNDING)
            .min(sdf_box_rounded(self.player_two - p, PADDLE_SIZE, ROUNDING));
        outsides.max(-self.glass_distance(p))
    }

    /// Distance to the translucent paddle interiors.
    pub fn glass_distance(&self, p: Vec3) -> f32 {
        let size = (PADDLE_SIZE.truncate() * 0.9).extend(PADDLE_SIZE.z + 0.01);
        sdf_box(self.player_one - p, size).min(sdf_box(self.player_two - p, size))
    }

    /// Surface normal by central differences.
    pub fn normal(&self, p: Vec3) -> Vec3 {
        let e = NORMAL_EPSILON;
        let dx = Vec3::new(e, 0.0, 0.0);
        let dy = Vec3::new(0.0, e, 0.0);
        let dz = Vec3::new(0.0, 0.0, e);
        Vec3::new(
            self.signed_distance(p + dx) - self.signed_distance(p - dx),
            self.signed_distance(p + dy) - self.signed_distance(p - dy),
            self.signed_distance(p + dz) - self.signed_distance(p - dz),
        )
        .normalize_or_zero()
    }
}

impl From<&GameStateSnapshot> for SceneDescription {
    fn from(snapshot: &GameStateSnapshot) -> Self {
        Self::new(
            snapshot.ball,
            snapshot.player_one,
            snapshot.player_two,
            snapshot.player,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paddles_placed_at_court_ends() {
        let scene = SceneDescription::new(Vec3::ZERO, Vec2::new(0.5, 0.1), Vec2::ZERO, PlayerMode::Ai);
        assert_eq!(scene.player_one, Vec3::new(0.5, 0.1, -COURT_LENGTH));
        assert_eq!(scene.player_two.z, COURT_LENGTH);
    }

    #[test]
    fn test_ball_surface_distance() {
        let scene = SceneDescription::centered(PlayerMode::PlayerOne);
        let d = scene.ball_distance(Vec3::new(0.5, 0.0, 0.0));
        assert!((d - (0.5 - BALL_SIZE)).abs() < 1e-6);
    }

    #[test]
    fn test_inside_arena_is_free_space() {
        let scene = SceneDescription::centered(PlayerMode::PlayerOne);
        // Halfway between ball and wall.
        assert!(scene.signed_distance(Vec3::new(0.6, 0.0, 1.0)) > MIN_DISTANCE);
    }

    #[test]
    fn test_paddle_centre_is_glass_not_frame() {
        let scene = SceneDescription::centered(PlayerMode::PlayerOne);
        let centre = scene.player_one;
        assert!(scene.glass_distance(centre) < 0.0);
        assert!(scene.paddles_distance(centre) > 0.0);
    }

    #[test]
    fn test_normal_on_ball_points_outward() {
        let scene = SceneDescription::centered(PlayerMode::PlayerOne);
        let n = scene.normal(Vec3::new(0.0, BALL_SIZE, 0.0));
        assert!(n.dot(Vec3::Y) > 0.99);
    }
}
