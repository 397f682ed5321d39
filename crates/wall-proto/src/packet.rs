// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Checksummed packet framing.
//!
//! Packet layout (little-endian):
//!
//! ```text
//! offset size  field
//! 0      4     magic = ASCII "CAVE"
//! 4      2     version = u16 (1)
//! 6      2     kind = u16 (see PacketKind)
//! 8      4     payload_len = u32
//! 12     N     payload
//! 12+N   32    blake3(header || payload)
//! ```

use blake3::Hasher;

use crate::cursor::Reader;
use crate::WireError;

/// Protocol magic constant "CAVE".
pub const MAGIC: [u8; 4] = *b"CAVE";
/// Wire protocol version.
pub const VERSION: u16 = 1;
/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 12;
/// Trailing checksum size in bytes.
pub const CHECKSUM_SIZE: usize = 32;
/// Largest payload a peer will accept (1 MiB).
pub const MAX_PAYLOAD: u32 = 1024 * 1024;

/// Discriminates the payload carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketKind {
    /// Worker introduces itself.
    Hello = 1,
    /// Master assigns a rank.
    Welcome = 2,
    /// Per-tick state replication block.
    Sync = 3,
    /// Worker reached a barrier.
    BarrierArrive = 4,
    /// Master releases a barrier.
    BarrierRelease = 5,
    /// Full transfer-function replacement.
    TransferFunction = 6,
    /// Named-parameter command.
    Command = 7,
    /// Master is stopping in an orderly way.
    Shutdown = 8,
}

impl TryFrom<u16> for PacketKind {
    type Error = WireError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Ok(match raw {
            1 => Self::Hello,
            2 => Self::Welcome,
            3 => Self::Sync,
            4 => Self::BarrierArrive,
            5 => Self::BarrierRelease,
            6 => Self::TransferFunction,
            7 => Self::Command,
            8 => Self::Shutdown,
            other => return Err(WireError::UnknownKind(other)),
        })
    }
}

fn checksum(header: &[u8], payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Frames `payload` as a packet of `kind`.
pub fn encode_packet(kind: PacketKind, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|n| *n <= MAX_PAYLOAD)
        .ok_or(WireError::PayloadTooLarge(u32::MAX))?;
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header[6..8].copy_from_slice(&(kind as u16).to_le_bytes());
    header[8..12].copy_from_slice(&len.to_le_bytes());

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    out.extend_from_slice(&header);
    out.extend_from_slice(payload);
    out.extend_from_slice(&checksum(&header, payload));
    Ok(out)
}

/// Validates a header and returns the packet kind plus the total packet size
/// (header, payload and checksum).
///
/// Stream readers use this to learn how many more bytes to read after the
/// first [`HEADER_SIZE`] bytes.
pub fn frame_len(header: &[u8; HEADER_SIZE]) -> Result<(PacketKind, usize), WireError> {
    let mut r = Reader::new(header);
    let magic: [u8; 4] = r.array()?;
    if magic != MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let kind = PacketKind::try_from(r.u16()?)?;
    let len = r.u32()?;
    if len > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge(len));
    }
    Ok((kind, HEADER_SIZE + len as usize + CHECKSUM_SIZE))
}

/// Decodes one packet from the front of `bytes`.
///
/// Returns the kind, the verified payload and the number of bytes consumed.
pub fn decode_packet(bytes: &[u8]) -> Result<(PacketKind, &[u8], usize), WireError> {
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(bytes.get(..HEADER_SIZE).ok_or(WireError::Truncated {
        needed: HEADER_SIZE,
        got: bytes.len(),
    })?);
    let (kind, total) = frame_len(&header)?;
    if bytes.len() < total {
        return Err(WireError::Truncated {
            needed: total,
            got: bytes.len(),
        });
    }
    let payload = &bytes[HEADER_SIZE..total - CHECKSUM_SIZE];
    if bytes[total - CHECKSUM_SIZE..total] != checksum(&header, payload) {
        return Err(WireError::ChecksumMismatch);
    }
    Ok((kind, payload, total))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let bytes = encode_packet(PacketKind::BarrierArrive, &[1, 2, 3]).unwrap();
        assert_eq!(&bytes[0..4], b"CAVE");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..8], &[4, 0]);
        assert_eq!(&bytes[8..12], &[3, 0, 0, 0]);
        assert_eq!(bytes.len(), HEADER_SIZE + 3 + CHECKSUM_SIZE);
    }

    #[test]
    fn corruption_is_detected() {
        let mut bytes = encode_packet(PacketKind::Command, b"payload").unwrap();
        bytes[HEADER_SIZE] ^= 0xff;
        assert_eq!(decode_packet(&bytes), Err(WireError::ChecksumMismatch));
    }

    #[test]
    fn rejects_unknown_kind_and_version() {
        let mut bytes = encode_packet(PacketKind::Sync, &[]).unwrap();
        bytes[6] = 99;
        assert_eq!(decode_packet(&bytes), Err(WireError::UnknownKind(99)));
        bytes[6] = 3;
        bytes[4] = 2;
        assert_eq!(decode_packet(&bytes), Err(WireError::UnsupportedVersion(2)));
    }

    #[test]
    fn reports_consumed_length_with_trailing_data() {
        let mut bytes = encode_packet(PacketKind::Hello, b"ab").unwrap();
        let first = bytes.len();
        bytes.extend_from_slice(&encode_packet(PacketKind::Hello, b"cd").unwrap());
        let (kind, payload, used) = decode_packet(&bytes).unwrap();
        assert_eq!(kind, PacketKind::Hello);
        assert_eq!(payload, b"ab");
        assert_eq!(used, first);
    }
}
