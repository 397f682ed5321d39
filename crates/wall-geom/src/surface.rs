// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use wall_math::{Mat4, Vec3, EPSILON};

/// Largest tolerated `|cos|` between the U and V edges of a surface.
const RECTANGLE_TOLERANCE: f32 = 1e-4;

/// Geometric validation failures for a single surface.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    /// Coincident corners along U or V.
    #[error("surface has a zero-length edge")]
    Degenerate,
    /// U and V edges are not perpendicular.
    #[error("surface corners are not perpendicular (cos = {cosine})")]
    NotRectangular {
        /// Cosine of the angle between the U and V edges.
        cosine: f32,
    },
}

/// A projection quad driven by one window.
///
/// Invariants:
/// - `u` (right), `v` (up) and `w = cross(v, u)` are unit length and mutually
///   orthogonal; they are recomputed whenever world corners change.
/// - The normalized pixel corners describe the same quad in window space,
///   `[0, 1]` on both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSurface {
    bottom_left: Vec3,
    bottom_right: Vec3,
    top_left: Vec3,
    top_right: Vec3,
    pixel_bottom_left: [u32; 2],
    pixel_top_right: [u32; 2],
    n_bottom_left: [f32; 2],
    n_bottom_right: [f32; 2],
    n_top_left: [f32; 2],
    n_top_right: [f32; 2],
    u: Vec3,
    v: Vec3,
    w: Vec3,
}

impl RenderSurface {
    /// Builds a surface from its world corners.
    ///
    /// `top_left` and `bottom_right` are optional; when absent they are
    /// derived as `(bl.x, tr.y, bl.z)` and `(tr.x, bl.y, tr.z)`, which always
    /// yields a rectangle. Pixel corners default to the full unit window.
    pub fn from_world_corners(
        bottom_left: Vec3,
        top_right: Vec3,
        top_left: Option<Vec3>,
        bottom_right: Option<Vec3>,
    ) -> Result<Self, SurfaceError> {
        let bottom_right = bottom_right
            .unwrap_or_else(|| Vec3::new(top_right.x(), bottom_left.y(), top_right.z()));
        let top_left =
            top_left.unwrap_or_else(|| Vec3::new(bottom_left.x(), top_right.y(), bottom_left.z()));
        let mut surface = Self {
            bottom_left,
            bottom_right,
            top_left,
            top_right,
            pixel_bottom_left: [0, 0],
            pixel_top_right: [1, 1],
            n_bottom_left: [0.0, 0.0],
            n_bottom_right: [1.0, 0.0],
            n_top_left: [0.0, 1.0],
            n_top_right: [1.0, 1.0],
            u: Vec3::UNIT_X,
            v: Vec3::UNIT_Y,
            w: Vec3::new(0.0, 0.0, -1.0),
        };
        surface.recompute_basis()?;
        Ok(surface)
    }

    /// Sets the pixel-space corners and derives the normalized window mapping
    /// as `p / (size - 1)` per axis.
    ///
    /// Callers guarantee `width, height >= 2`.
    #[must_use]
    pub fn with_pixel_corners(
        mut self,
        bottom_left: [u32; 2],
        top_right: [u32; 2],
        width: u32,
        height: u32,
    ) -> Self {
        let span_x = width.saturating_sub(1).max(1) as f32;
        let span_y = height.saturating_sub(1).max(1) as f32;
        self.pixel_bottom_left = bottom_left;
        self.pixel_top_right = top_right;
        self.n_bottom_left = [bottom_left[0] as f32 / span_x, bottom_left[1] as f32 / span_y];
        self.n_top_right = [top_right[0] as f32 / span_x, top_right[1] as f32 / span_y];
        self.n_bottom_right = [self.n_top_right[0], self.n_bottom_left[1]];
        self.n_top_left = [self.n_bottom_left[0], self.n_top_right[1]];
        self
    }

    fn recompute_basis(&mut self) -> Result<(), SurfaceError> {
        let u = self.bottom_right.sub(&self.bottom_left);
        let v = self.top_left.sub(&self.bottom_left);
        let (lu, lv) = (u.length(), v.length());
        if lu <= EPSILON || lv <= EPSILON {
            return Err(SurfaceError::Degenerate);
        }
        let cosine = u.dot(&v) / (lu * lv);
        if cosine.abs() > RECTANGLE_TOLERANCE {
            return Err(SurfaceError::NotRectangular { cosine });
        }
        self.u = u.normalize();
        self.v = v.normalize();
        self.w = self.v.cross(&self.u).normalize();
        Ok(())
    }

    /// Returns a copy with world corners and basis carried through `m`.
    ///
    /// Corners transform as points, the basis as directions; pixel corners are
    /// untouched. `m` is expected to be a rigid transform (rotation plus
    /// translation), which keeps the basis orthonormal.
    #[must_use]
    pub fn transformed(&self, m: &Mat4) -> Self {
        Self {
            bottom_left: m.transform_point(&self.bottom_left),
            bottom_right: m.transform_point(&self.bottom_right),
            top_left: m.transform_point(&self.top_left),
            top_right: m.transform_point(&self.top_right),
            u: m.transform_direction(&self.u),
            v: m.transform_direction(&self.v),
            w: m.transform_direction(&self.w),
            ..self.clone()
        }
    }

    /// World-space bottom-left corner.
    pub fn bottom_left(&self) -> Vec3 {
        self.bottom_left
    }

    /// World-space bottom-right corner.
    pub fn bottom_right(&self) -> Vec3 {
        self.bottom_right
    }

    /// World-space top-left corner.
    pub fn top_left(&self) -> Vec3 {
        self.top_left
    }

    /// World-space top-right corner.
    pub fn top_right(&self) -> Vec3 {
        self.top_right
    }

    /// The four world corners as `[bl, br, tl, tr]`.
    pub fn world_corners(&self) -> [Vec3; 4] {
        [
            self.bottom_left,
            self.bottom_right,
            self.top_left,
            self.top_right,
        ]
    }

    /// Pixel-space bottom-left and top-right corners.
    pub fn pixel_corners(&self) -> ([u32; 2], [u32; 2]) {
        (self.pixel_bottom_left, self.pixel_top_right)
    }

    /// Normalized window mapping in draw order `[bl, tl, tr, br]`.
    pub fn window_mapping(&self) -> [[f32; 2]; 4] {
        [
            self.n_bottom_left,
            self.n_top_left,
            self.n_top_right,
            self.n_bottom_right,
        ]
    }

    /// Unit vector pointing right along the surface.
    pub fn u(&self) -> Vec3 {
        self.u
    }

    /// Unit vector pointing up along the surface.
    pub fn v(&self) -> Vec3 {
        self.v
    }

    /// Unit normal `cross(v, u)`, pointing from the viewer into the screen.
    pub fn w(&self) -> Vec3 {
        self.w
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn front_wall() -> RenderSurface {
        RenderSurface::from_world_corners(
            Vec3::new(-4.0, 0.0, -4.0),
            Vec3::new(4.0, 8.0, -4.0),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn derives_missing_corners() {
        let s = front_wall();
        assert_eq!(s.bottom_right().to_array(), [4.0, 0.0, -4.0]);
        assert_eq!(s.top_left().to_array(), [-4.0, 8.0, -4.0]);
        assert_eq!(s.u(), Vec3::UNIT_X);
        assert_eq!(s.v(), Vec3::UNIT_Y);
        assert_eq!(s.w().to_array(), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn rejects_skewed_explicit_corners() {
        let err = RenderSurface::from_world_corners(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Some(Vec3::new(1.0, 2.0, 0.0)),
            Some(Vec3::new(2.0, 0.0, 0.0)),
        )
        .unwrap_err();
        assert!(matches!(err, SurfaceError::NotRectangular { .. }));
    }

    #[test]
    fn rejects_flat_surface() {
        let err = RenderSurface::from_world_corners(
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 5.0, 1.0),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, SurfaceError::Degenerate);
    }

    #[test]
    fn normalized_pixel_corners() {
        let s = front_wall().with_pixel_corners([0, 0], [1919, 539], 1920, 1080);
        let [bl, tl, tr, br] = s.window_mapping();
        assert_eq!(bl, [0.0, 0.0]);
        assert_eq!(tr, [1.0, 539.0 / 1079.0]);
        assert_eq!(tl, [0.0, tr[1]]);
        assert_eq!(br, [1.0, 0.0]);
    }
}
