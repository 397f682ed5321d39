// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Float32 math helpers for the display wall: 3-D vectors and affine 4×4
//! matrices.
//!
//! All arithmetic stays in `f32` so that the master and every render worker
//! round identically when they apply the same aggregate transform.
//! Matrices are stored column-major; the wire format uses row-major and
//! [`Mat4::to_row_major`] / [`Mat4::from_row_major`] convert at that seam.

use std::f32::consts::TAU;

mod mat4;
mod vec3;

pub use mat4::Mat4;
pub use vec3::Vec3;

/// Global epsilon used by math routines when detecting degenerate values.
pub const EPSILON: f32 = 1e-6;

/// Clamps `value` to the inclusive `[-limit, limit]` range.
///
/// A negative `limit` is treated as its magnitude.
pub fn clamp_symmetric(value: f32, limit: f32) -> f32 {
    let limit = limit.abs();
    value.max(-limit).min(limit)
}

/// Converts degrees to radians with float32 precision.
pub fn deg_to_rad(value: f32) -> f32 {
    value * (TAU / 360.0)
}

/// Converts radians to degrees with float32 precision.
pub fn rad_to_deg(value: f32) -> f32 {
    value * (360.0 / TAU)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn clamp_symmetric_limits_both_sides() {
        assert_eq!(clamp_symmetric(5.0, 2.0), 2.0);
        assert_eq!(clamp_symmetric(-5.0, 2.0), -2.0);
        assert_eq!(clamp_symmetric(1.5, 2.0), 1.5);
        assert_eq!(clamp_symmetric(-3.0, -1.0), -1.0);
    }

    #[test]
    fn degree_round_trip() {
        let r = deg_to_rad(90.0);
        assert!((r - std::f32::consts::FRAC_PI_2).abs() < EPSILON);
        assert!((rad_to_deg(r) - 90.0).abs() < 1e-4);
    }
}
