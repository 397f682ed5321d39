// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::cursor::Reader;
use crate::packet::{decode_packet, encode_packet, PacketKind};
use crate::{
    decode_transfer_function, encode_transfer_function, Command, SyncBlock, TfPoint, WireError,
};

/// Longest accepted hostname in a `Hello`.
const MAX_HOSTNAME: usize = 255;

/// Every message exchanged between master and workers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Worker introduces itself (worker → master).
    Hello {
        /// Hostname used to select the worker's topology node.
        hostname: String,
    },
    /// Rank assignment (master → worker).
    Welcome {
        /// Rank in `1..=worker_count`; the master is rank 0.
        rank: u32,
        /// Number of workers in the cluster.
        worker_count: u32,
    },
    /// Per-tick state replication block (master → workers).
    Sync(SyncBlock),
    /// Worker reached barrier `epoch` (worker → master).
    BarrierArrive {
        /// Barrier sequence number.
        epoch: u64,
    },
    /// Every participant reached barrier `epoch` (master → workers).
    BarrierRelease {
        /// Barrier sequence number.
        epoch: u64,
    },
    /// Full transfer-function replacement (master → workers).
    TransferFunction(Vec<TfPoint>),
    /// Named-parameter command (master → workers).
    Command(Command),
    /// The master stopped between ticks; no further blocks follow.
    Shutdown,
}

impl Message {
    /// Packet kind carrying this message.
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Hello { .. } => PacketKind::Hello,
            Self::Welcome { .. } => PacketKind::Welcome,
            Self::Sync(_) => PacketKind::Sync,
            Self::BarrierArrive { .. } => PacketKind::BarrierArrive,
            Self::BarrierRelease { .. } => PacketKind::BarrierRelease,
            Self::TransferFunction(_) => PacketKind::TransferFunction,
            Self::Command(_) => PacketKind::Command,
            Self::Shutdown => PacketKind::Shutdown,
        }
    }

    /// Encodes the message as a complete packet.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let payload = match self {
            Self::Hello { hostname } => {
                let len = u16::try_from(hostname.len())
                    .ok()
                    .filter(|n| usize::from(*n) <= MAX_HOSTNAME)
                    .ok_or(WireError::InvalidCount {
                        field: "hostname length",
                        value: i64::try_from(hostname.len()).unwrap_or(i64::MAX),
                    })?;
                let mut out = len.to_le_bytes().to_vec();
                out.extend_from_slice(hostname.as_bytes());
                out
            }
            Self::Welcome { rank, worker_count } => {
                let mut out = rank.to_le_bytes().to_vec();
                out.extend_from_slice(&worker_count.to_le_bytes());
                out
            }
            Self::Sync(block) => block.to_bytes().to_vec(),
            Self::BarrierArrive { epoch } | Self::BarrierRelease { epoch } => {
                epoch.to_le_bytes().to_vec()
            }
            Self::TransferFunction(points) => encode_transfer_function(points)?,
            Self::Command(cmd) => cmd.to_bytes()?,
            Self::Shutdown => Vec::new(),
        };
        encode_packet(self.kind(), &payload)
    }

    /// Decodes one message from the front of `bytes`, returning it with the
    /// number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        let (kind, payload, used) = decode_packet(bytes)?;
        let msg = match kind {
            PacketKind::Hello => {
                let mut r = Reader::new(payload);
                let len = usize::from(r.u16()?);
                if len > MAX_HOSTNAME {
                    return Err(WireError::InvalidCount {
                        field: "hostname length",
                        value: i64::try_from(len).unwrap_or(i64::MAX),
                    });
                }
                let hostname = std::str::from_utf8(r.take(len)?)
                    .map_err(|_| WireError::InvalidUtf8)?
                    .to_owned();
                r.finish()?;
                Self::Hello { hostname }
            }
            PacketKind::Welcome => {
                let mut r = Reader::new(payload);
                let rank = r.u32()?;
                let worker_count = r.u32()?;
                r.finish()?;
                Self::Welcome { rank, worker_count }
            }
            PacketKind::Sync => Self::Sync(SyncBlock::from_bytes(payload)?),
            PacketKind::BarrierArrive | PacketKind::BarrierRelease => {
                let mut r = Reader::new(payload);
                let epoch = r.u64()?;
                r.finish()?;
                if kind == PacketKind::BarrierArrive {
                    Self::BarrierArrive { epoch }
                } else {
                    Self::BarrierRelease { epoch }
                }
            }
            PacketKind::TransferFunction => {
                Self::TransferFunction(decode_transfer_function(payload)?)
            }
            PacketKind::Command => Self::Command(Command::from_bytes(payload)?),
            PacketKind::Shutdown => {
                Reader::new(payload).finish()?;
                Self::Shutdown
            }
        };
        Ok((msg, used))
    }
}
