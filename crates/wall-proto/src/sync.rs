// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use wall_math::{Mat4, Vec3};

use crate::cursor::Reader;
use crate::WireError;

/// Size of the opaque camera blob.
pub const CAMERA_MARSHAL_SIZE: usize = 12;
/// Size of an encoded [`SyncBlock`].
pub const SYNC_BLOCK_SIZE: usize = 4 + 8 + 8 + 4 + CAMERA_MARSHAL_SIZE + 16 * 4;

/// Opaque camera blob: the world position as three little-endian `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraBlob(pub [u8; CAMERA_MARSHAL_SIZE]);

impl CameraBlob {
    /// Packs a world position.
    pub fn from_position(position: Vec3) -> Self {
        let mut out = [0u8; CAMERA_MARSHAL_SIZE];
        for (chunk, v) in out.chunks_exact_mut(4).zip(position.to_array()) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        Self(out)
    }

    /// Unpacks the world position.
    pub fn position(&self) -> Vec3 {
        let mut xyz = [0.0f32; 3];
        for (v, chunk) in xyz.iter_mut().zip(self.0.chunks_exact(4)) {
            let mut le = [0u8; 4];
            le.copy_from_slice(chunk);
            *v = f32::from_le_bytes(le);
        }
        Vec3::from(xyz)
    }
}

/// Per-tick snapshot of the master's authoritative state.
///
/// Fixed size, no variable-length fields:
///
/// ```text
/// offset size  field
/// 0      4     frame            u32
/// 4      8     dt               f64 (seconds)
/// 12     8     time             f64 (seconds)
/// 20     4     cross_fade       i32 (-1 = none)
/// 24     12    camera           CameraBlob
/// 36     64    transform        16 x f32, row-major
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncBlock {
    /// Diagnostic frame counter; wraps.
    pub frame: u32,
    /// Seconds since the previous block.
    pub dt: f64,
    /// Seconds since the master started.
    pub time: f64,
    /// Alternate transfer function to cross-fade to, or -1.
    pub cross_fade_target: i32,
    /// Authoritative camera position.
    pub camera: CameraBlob,
    /// Aggregate cave transform applied to every surface.
    pub transform: Mat4,
}

impl Default for SyncBlock {
    fn default() -> Self {
        Self {
            frame: 0,
            dt: 0.0,
            time: 0.0,
            cross_fade_target: -1,
            camera: CameraBlob::default(),
            transform: Mat4::identity(),
        }
    }
}

impl SyncBlock {
    /// The cross-fade target as an index, when one is set.
    pub fn cross_fade(&self) -> Option<usize> {
        usize::try_from(self.cross_fade_target).ok()
    }

    /// Encodes the block.
    pub fn to_bytes(&self) -> [u8; SYNC_BLOCK_SIZE] {
        let mut out = [0u8; SYNC_BLOCK_SIZE];
        out[0..4].copy_from_slice(&self.frame.to_le_bytes());
        out[4..12].copy_from_slice(&self.dt.to_le_bytes());
        out[12..20].copy_from_slice(&self.time.to_le_bytes());
        out[20..24].copy_from_slice(&self.cross_fade_target.to_le_bytes());
        out[24..36].copy_from_slice(&self.camera.0);
        for (chunk, v) in out[36..]
            .chunks_exact_mut(4)
            .zip(self.transform.to_row_major())
        {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decodes a block; the input must be exactly [`SYNC_BLOCK_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let frame = r.u32()?;
        let dt = r.f64()?;
        let time = r.f64()?;
        let cross_fade_target = r.i32()?;
        let camera = CameraBlob(r.array()?);
        let mut rows = [0.0f32; 16];
        for v in &mut rows {
            *v = r.f32()?;
        }
        r.finish()?;
        Ok(Self {
            frame,
            dt,
            time,
            cross_fade_target,
            camera,
            transform: Mat4::from_row_major(rows),
        })
    }
}
