// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replicated camera position and the per-surface view derived from it.

use std::path::Path;

use wall_geom::RenderSurface;
use wall_math::Vec3;
use wall_proto::{CameraBlob, CAMERA_MARSHAL_SIZE};

/// Failures persisting a camera.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not exactly one marshal blob.
    #[error("camera file holds {0} bytes, expected {CAMERA_MARSHAL_SIZE}")]
    BadSize(usize),
}

/// Camera state. Only the position crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Camera {
    /// World-space eye position.
    pub position: Vec3,
}

impl Camera {
    /// Camera at `position`.
    pub const fn new(position: Vec3) -> Self {
        Self { position }
    }

    /// Fixed-size blob embedded in every sync block.
    pub fn marshal(&self) -> CameraBlob {
        CameraBlob::from_position(self.position)
    }

    /// Overwrites the position from a blob.
    pub fn unmarshal(&mut self, blob: &CameraBlob) {
        self.position = blob.position();
    }

    /// Writes the marshal blob to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CameraError> {
        std::fs::write(path, self.marshal().0)?;
        Ok(())
    }

    /// Reads a camera written by [`Camera::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let bytes = std::fs::read(path)?;
        let blob: [u8; CAMERA_MARSHAL_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CameraError::BadSize(bytes.len()))?;
        let mut camera = Self::default();
        camera.unmarshal(&CameraBlob(blob));
        Ok(camera)
    }

    /// View through one already-transformed surface, with the eye shifted by
    /// `eye_offset`.
    pub fn view(&self, surface: &RenderSurface, eye_offset: Vec3) -> CameraView {
        CameraView {
            position: self.position.add(&eye_offset),
            bottom_left: surface.bottom_left(),
            bottom_right: surface.bottom_right(),
            top_left: surface.top_left(),
            top_right: surface.top_right(),
            u: surface.u(),
            v: surface.v(),
            w: surface.w(),
        }
    }
}

/// Off-axis view handed to the draw backend for one surface and eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// Eye position.
    pub position: Vec3,
    /// Image-plane bottom-left corner.
    pub bottom_left: Vec3,
    /// Image-plane bottom-right corner.
    pub bottom_right: Vec3,
    /// Image-plane top-left corner.
    pub top_left: Vec3,
    /// Image-plane top-right corner.
    pub top_right: Vec3,
    /// Right.
    pub u: Vec3,
    /// Up.
    pub v: Vec3,
    /// Surface normal, `cross(v, u)`.
    pub w: Vec3,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_keep_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.bin");
        let cam = Camera::new(Vec3::new(1.5, 10.0, -3.25));
        cam.save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 12);
        assert_eq!(Camera::load(&path).unwrap(), cam);
    }

    #[test]
    fn load_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.bin");
        std::fs::write(&path, [0u8; 7]).unwrap();
        assert!(matches!(Camera::load(&path), Err(CameraError::BadSize(7))));
    }

    #[test]
    fn view_offsets_eye_and_copies_surface() {
        let surface = RenderSurface::from_world_corners(
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 2.0, -1.0),
            None,
            None,
        )
        .unwrap();
        let cam = Camera::new(Vec3::new(0.0, 1.0, 0.0));
        let view = cam.view(&surface, Vec3::new(0.5, 0.0, 0.0));
        assert!(view.position.approx_eq(&Vec3::new(0.5, 1.0, 0.0), 1e-6));
        assert_eq!(view.bottom_right, surface.bottom_right());
        assert!(view.w.approx_eq(&Vec3::new(0.0, 0.0, -1.0), 1e-6));
    }
}
