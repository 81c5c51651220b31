//! Sphere tracing, shading and the per-sample camera.

use super::{
    SceneDescription, COURT_LENGTH, FIELD_OF_VIEW, MAX_DISTANCE, MAX_ITERATIONS, MIN_DISTANCE,
    PADDLE_SIZE,
};
use crate::state::PlayerMode;
use glam::{UVec2, Vec2, Vec3, Vec4};

const GLASS_FOG: f32 = 0.1;
const GAMMA: f32 = 1.0 / 2.2;

/// How a ray ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarchResult {
    /// Touched an opaque surface.
    Hit {
        /// Point on the surface.
        position: Vec3,
        /// Iterations used.
        steps: u32,
    },
    /// Left the arena.
    Escaped,
    /// Ran out of iterations.
    Exhausted,
}

/// Outcome of one march including glass fog picked up on the way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// Termination.
    pub result: MarchResult,
    /// Accumulated fog from paddle glass.
    pub fog: f32,
}

/// Step a ray through the scene.
pub fn trace(scene: &SceneDescription, mut origin: Vec3, dir: Vec3) -> Trace {
    let mut fog = 0.0;
    for step in 0..MAX_ITERATIONS {
        let glass = scene.glass_distance(origin);
        let d = scene.signed_distance(origin).min(glass);
        if d >= MAX_DISTANCE {
            return Trace {
                result: MarchResult::Escaped,
                fog,
            };
        }
        if d >= MIN_DISTANCE {
            origin += dir * d;
            continue;
        }
        if glass <= MIN_DISTANCE {
            fog += GLASS_FOG;
            origin += dir * (2.0 * PADDLE_SIZE.z);
            continue;
        }
        return Trace {
            result: MarchResult::Hit {
                position: origin,
                steps: step + 1,
            },
            fog,
        };
    }
    Trace {
        result: MarchResult::Exhausted,
        fog,
    }
}

/// Ambient sky/floor gradient with a vignette away from the court axis.
pub fn background(dir: Vec3) -> Vec3 {
    let floor = Vec3::new(0.02, 0.01, 0.04);
    let sky = Vec3::new(0.10, 0.04, 0.20);
    let t = 0.5 * (dir.y + 1.0);
    floor.lerp(sky, t.clamp(0.0, 1.0)) * dir.z.abs().powi(4)
}

/// Three-light Phong; the ball light gets a sharpened diffuse term.
pub fn phong(scene: &SceneDescription, position: Vec3, dir: Vec3, normal: Vec3) -> Vec3 {
    let base = Vec3::new(0.55, 0.1, 0.85);
    let material = Vec3::new(
        base.x + 0.2 * 0.5 * position.z,
        base.y,
        base.z - 0.2 * position.z,
    );
    let lights = [
        scene.ball,
        scene.player_one + Vec3::new(0.0, 0.0, -0.5),
        scene.player_two - Vec3::new(0.0, 0.0, -0.5),
    ];

    let mut color = Vec3::ZERO;
    for (i, light) in lights.into_iter().enumerate() {
        let to_light = (light - position).normalize_or_zero();
        let reflection = reflect(to_light, normal);
        let mut diffuse = to_light.dot(normal).max(0.0);
        if i == 0 {
            diffuse *= 3.0 * diffuse * diffuse;
        }
        let specular = dir.dot(reflection).max(0.0).powf(512.0);
        color += material * (0.5 * diffuse) + Vec3::ONE * (0.1 * specular);
    }
    color
}

#[inline]
fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

/// Shaded color for one ray, before gamma.
pub fn ray_march(scene: &SceneDescription, origin: Vec3, dir: Vec3) -> Vec3 {
    let traced = trace(scene, origin, dir);
    let surface = match traced.result {
        MarchResult::Hit { position, .. } => phong(scene, position, dir, scene.normal(position)),
        MarchResult::Escaped | MarchResult::Exhausted => background(dir),
    };
    surface + Vec3::splat(traced.fog)
}

/// Pinhole camera sitting behind one end of the court.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position.
    pub position: Vec3,
    /// Image plane distance.
    pub focal: f32,
    /// Whether the camera looks along -z from the far end.
    pub flipped: bool,
}

impl Camera {
    /// Camera at player one's end, or player two's when `flipped`.
    pub fn new(flipped: bool) -> Self {
        let focal = 1.0 / (std::f32::consts::PI / 360.0 * FIELD_OF_VIEW).tan();
        let z = -(COURT_LENGTH + focal + 0.4);
        Self {
            position: Vec3::new(0.0, 0.0, if flipped { -z } else { z }),
            focal,
            flipped,
        }
    }

    /// Normalized ray direction through image-plane point `uv`.
    pub fn ray(&self, uv: Vec2) -> Vec3 {
        let mut dir = uv.extend(self.focal).normalize();
        if self.flipped {
            dir.z = -dir.z;
        }
        dir
    }
}

/// Gamma-corrected color for fragment `coords` of a `resolution` image.
///
/// `aspect` is `resolution.x / resolution.y`; `char_height` is the cell
/// height over width, used to undo the stretch of non-square cells.
pub fn main_image(
    coords: Vec2,
    resolution: Vec2,
    aspect: f32,
    char_height: f32,
    scene: &SceneDescription,
) -> Vec4 {
    let mut uv = coords / resolution * 2.0 - 1.0;
    let mut second_view = false;

    if scene.player == PlayerMode::SplitScreen {
        uv.x *= char_height;
        uv *= 2.0;
        uv.x += 1.0;
        if uv.x >= 1.0 {
            uv.x -= 2.0;
            uv = -uv;
            second_view = true;
        }
        uv.x *= 0.5 * aspect;
        uv /= char_height;
        if 0.5 * resolution.x / char_height <= resolution.y {
            uv /= 0.5 * aspect / char_height;
        }
    } else if resolution.x / char_height > resolution.y {
        uv.x *= aspect;
    } else {
        uv.y /= aspect;
        uv *= char_height;
    }

    let camera = Camera::new(scene.player == PlayerMode::PlayerTwo || second_view);
    let color = ray_march(scene, camera.position, camera.ray(uv));
    color.max(Vec3::ZERO).powf(GAMMA).extend(1.0)
}

/// Color of raster sample `(x, y)`, top row first.
pub fn shade_sample(x: u32, y: u32, resolution: UVec2, char_height: f32, scene: &SceneDescription) -> Vec4 {
    let res = resolution.as_vec2();
    let mut coords = Vec2::new(x as f32, res.y - y as f32);
    coords.x /= char_height;
    coords.x -= 0.5 * (res.x / char_height - res.x);
    main_image(coords, res, res.x / res.y, char_height, scene)
}
