// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire codecs for the display-wall cluster.
//!
//! Every message travels inside a checksummed packet (see [`packet`]). The
//! payload codecs are explicit encode/decode pairs, little-endian throughout,
//! so master and worker builds never depend on in-memory struct layout.

mod command;
mod cursor;
mod message;
pub mod packet;
mod sync;
mod transfer;

pub use command::{Command, WorkerCommand, MAX_COMMAND_ARGS, MAX_COMMAND_NAME};
pub use message::Message;
pub use packet::{PacketKind, HEADER_SIZE, MAGIC, VERSION};
pub use sync::{CameraBlob, SyncBlock, CAMERA_MARSHAL_SIZE, SYNC_BLOCK_SIZE};
pub use transfer::{decode_transfer_function, encode_transfer_function, TfPoint, MAX_TF_POINTS};

/// Decode/encode failures for every codec in this crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WireError {
    /// Input ended before a field could be read.
    #[error("truncated input: need {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required to finish the read.
        needed: usize,
        /// Bytes available.
        got: usize,
    },
    /// A fixed-size payload had extra bytes after its last field.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    /// Packet magic is not "CAVE".
    #[error("bad magic: {0:?}")]
    BadMagic([u8; 4]),
    /// Packet version is not [`VERSION`].
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u16),
    /// Packet kind is not one of [`PacketKind`].
    #[error("unknown packet kind {0}")]
    UnknownKind(u16),
    /// Declared payload length exceeds the packet limit.
    #[error("payload of {0} bytes exceeds the packet limit")]
    PayloadTooLarge(u32),
    /// BLAKE3 checksum over header and payload did not match.
    #[error("packet checksum mismatch")]
    ChecksumMismatch,
    /// A length or count field is negative or above its limit.
    #[error("invalid {field}: {value}")]
    InvalidCount {
        /// Name of the field.
        field: &'static str,
        /// Raw value read from the wire.
        value: i64,
    },
    /// A string field is not UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    /// The transfer-function point count is not a small non-negative integer.
    #[error("invalid transfer function point count {0}")]
    InvalidPointCount(f32),
    /// A command name no worker recognizes.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    /// A known command carried too few arguments.
    #[error("command '{name}' needs {ints} ints and {floats} floats")]
    CommandArity {
        /// Command name.
        name: String,
        /// Required integer arguments.
        ints: usize,
        /// Required float arguments.
        floats: usize,
    },
}
