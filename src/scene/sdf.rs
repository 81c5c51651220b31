//! Distance primitives.

use super::{BALL_SIZE, COURT_LENGTH};
use glam::Vec3;

/// Sphere of `radius` centred at the origin.
#[inline]
pub fn sdf_sphere(p: Vec3, radius: f32) -> f32 {
    p.length() - radius
}

/// Axis-aligned box with half extents `size`.
#[inline]
pub fn sdf_box(p: Vec3, size: Vec3) -> f32 {
    let surface = p.abs() - size;
    let outside = surface.max(Vec3::ZERO).length();
    let inside = surface.max_element().min(0.0);
    outside + inside
}

/// Box with edges rounded by `rounding` times its smallest half extent.
#[inline]
pub fn sdf_box_rounded(p: Vec3, size: Vec3, rounding: f32) -> f32 {
    let rounding = rounding * size.min_element();
    sdf_box(p, size - rounding) - rounding
}

/// Arena walls: an outer box hollowed by a rounded tube, open at both ends.
pub fn walls(p: Vec3) -> f32 {
    let separation = 1.0 + BALL_SIZE - 0.05;
    let outside = sdf_box(p, Vec3::splat(COURT_LENGTH - 0.1));
    let inside = sdf_box_rounded(p, Vec3::new(separation, separation, COURT_LENGTH), 0.15);
    outside.max(-inside).max(p.z.abs() - COURT_LENGTH)
}
