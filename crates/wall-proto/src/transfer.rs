// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::cursor::Reader;
use crate::WireError;

/// Most control points a transfer-function payload may carry.
pub const MAX_TF_POINTS: usize = 256;

/// One transfer-function control point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TfPoint {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Opacity.
    pub a: f32,
    /// Normalized position in `[0, 1]`.
    pub position: f32,
}

impl TfPoint {
    /// Builds a point.
    pub const fn new(r: f32, g: f32, b: f32, a: f32, position: f32) -> Self {
        Self {
            r,
            g,
            b,
            a,
            position,
        }
    }

    fn fields(self) -> [f32; 5] {
        [self.r, self.g, self.b, self.a, self.position]
    }
}

/// Encodes a full transfer function: `count:f32` then five `f32` per point.
pub fn encode_transfer_function(points: &[TfPoint]) -> Result<Vec<u8>, WireError> {
    if points.len() > MAX_TF_POINTS {
        return Err(WireError::InvalidCount {
            field: "transfer function points",
            value: i64::try_from(points.len()).unwrap_or(i64::MAX),
        });
    }
    let mut out = Vec::with_capacity(4 + points.len() * 20);
    #[allow(clippy::cast_precision_loss)]
    let count = points.len() as f32;
    out.extend_from_slice(&count.to_le_bytes());
    for v in points.iter().flat_map(|p| p.fields()) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

/// Decodes a full transfer function; point values are preserved bit for bit.
pub fn decode_transfer_function(bytes: &[u8]) -> Result<Vec<TfPoint>, WireError> {
    let mut r = Reader::new(bytes);
    let count = r.f32()?;
    #[allow(clippy::cast_precision_loss)]
    let limit = MAX_TF_POINTS as f32;
    if !(0.0..=limit).contains(&count) || count.fract() != 0.0 {
        return Err(WireError::InvalidPointCount(count));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = count as usize;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push(TfPoint::new(r.f32()?, r.f32()?, r.f32()?, r.f32()?, r.f32()?));
    }
    r.finish()?;
    Ok(points)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_function_is_four_bytes() {
        let bytes = encode_transfer_function(&[]).unwrap();
        assert_eq!(bytes, 0.0f32.to_le_bytes());
        assert!(decode_transfer_function(&bytes).unwrap().is_empty());
    }

    #[test]
    fn fractional_or_negative_counts_are_rejected() {
        for bad in [1.5f32, -1.0, f32::NAN, 1000.0] {
            let bytes = bad.to_le_bytes();
            assert!(matches!(
                decode_transfer_function(&bytes),
                Err(WireError::InvalidPointCount(_))
            ));
        }
    }

    #[test]
    fn count_must_match_payload() {
        let mut bytes = encode_transfer_function(&[TfPoint::new(1.0, 0.0, 0.0, 0.5, 0.25)]).unwrap();
        bytes[0..4].copy_from_slice(&2.0f32.to_le_bytes());
        assert!(matches!(
            decode_transfer_function(&bytes),
            Err(WireError::Truncated { .. })
        ));
    }
}
