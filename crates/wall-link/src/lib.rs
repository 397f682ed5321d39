// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transport between the master and its render workers.
//!
//! Two links implement the same pair of traits:
//! - [`local::in_process`] wires a master to N workers over channels inside one
//!   process (tests and the single-host demo).
//! - [`tcp::TcpHub`] / [`tcp::TcpWorkerLink`] form a star over TCP: workers
//!   connect to the master, which assigns ranks and coordinates barriers.
//!
//! Both carry the checksummed packets of `wall-proto`, so every deployment
//! exercises the same codecs. Neither link times out: a silent peer stalls the
//! cluster, a closed one surfaces as [`LinkError::PeerLost`].

use std::future::Future;

use wall_proto::{Command, PacketKind, SyncBlock, TfPoint, WireError};

mod inbox;
pub mod local;
pub mod tcp;

/// Transport failures. All of them are fatal to the frame-locked loop.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A packet failed to decode.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    /// The peer with `rank` closed its connection (rank 0 is the master).
    #[error("peer rank {rank} disconnected")]
    PeerLost {
        /// Rank of the lost peer.
        rank: usize,
    },
    /// A packet arrived that the protocol does not allow at this point.
    #[error("unexpected {got:?} packet while {phase}")]
    Unexpected {
        /// What the receiver was doing.
        phase: &'static str,
        /// Kind of the offending packet.
        got: PacketKind,
    },
    /// A barrier message carried the wrong sequence number.
    #[error("barrier epoch mismatch from rank {rank}: expected {expected}, got {got}")]
    EpochMismatch {
        /// Sender rank.
        rank: usize,
        /// Epoch the receiver is waiting on.
        expected: u64,
        /// Epoch received.
        got: u64,
    },
    /// Rank assignment did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Master side of the cluster link.
pub trait MasterLink: Send {
    /// Number of connected workers.
    fn worker_count(&self) -> usize;

    /// Sends the same block to every worker.
    fn broadcast_sync(
        &mut self,
        block: &SyncBlock,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Waits until every worker reaches the barrier.
    fn barrier(&mut self) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Sends a full transfer-function replacement to every worker.
    fn push_transfer_function(
        &mut self,
        points: &[TfPoint],
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Sends one command to every worker.
    fn send_command(
        &mut self,
        command: &Command,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Tells every worker that no further blocks follow.
    fn shutdown(&mut self) -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// Worker side of the cluster link.
pub trait WorkerLink: Send {
    /// Rank assigned by the master, in `1..=worker_count`.
    fn rank(&self) -> usize;

    /// Number of workers in the cluster.
    fn worker_count(&self) -> usize;

    /// Waits for the next block. `Ok(None)` means the master shut down.
    ///
    /// Transfer functions and commands that arrive first are kept for the
    /// `try_recv_*` calls.
    fn recv_sync(&mut self) -> impl Future<Output = Result<Option<SyncBlock>, LinkError>> + Send;

    /// Waits until every participant reaches the barrier.
    fn barrier(&mut self) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Returns the most recent pending transfer function, if any.
    fn try_recv_transfer_function(&mut self) -> Result<Option<Vec<TfPoint>>, LinkError>;

    /// Returns the oldest pending command, if any.
    fn try_recv_command(&mut self) -> Result<Option<Command>, LinkError>;
}
